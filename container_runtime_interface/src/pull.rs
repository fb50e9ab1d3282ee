//! Draining of image pull progress.

use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::{PullStream, RuntimeError};

/// Outcome of a fully drained, successful pull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullSummary {
    pub events: usize,
    pub last_status: Option<String>,
}

/// Consume a pull stream to its end.
///
/// Never returns before the stream is exhausted, even after an error has
/// been seen. If any error was reported, the last one is returned as
/// [`RuntimeError::ImagePullFailed`].
pub async fn drain_pull(image: &str, mut stream: PullStream) -> Result<PullSummary, RuntimeError> {
    let mut summary = PullSummary::default();
    let mut last_error = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(progress) => {
                summary.events += 1;
                debug!(
                    image,
                    layer = progress.layer.as_deref().unwrap_or(""),
                    progress = progress.progress.as_deref().unwrap_or(""),
                    "{}",
                    progress.status
                );
                summary.last_status = Some(progress.status);
            }
            Err(err) => {
                warn!(image, error = %err, "Image pull reported an error");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err @ RuntimeError::ImagePullFailed { .. }) => Err(err),
        Some(other) => Err(RuntimeError::ImagePullFailed {
            image: image.to_string(),
            reason: other.to_string(),
        }),
        None => Ok(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PullProgress;
    use futures_util::stream;

    fn progress(status: &str) -> Result<PullProgress, RuntimeError> {
        Ok(PullProgress {
            status: status.to_string(),
            layer: None,
            progress: None,
        })
    }

    #[tokio::test]
    async fn test_drain_success_counts_events() {
        let events = vec![
            progress("Pulling from library/nginx"),
            progress("Download complete"),
            progress("Status: Downloaded newer image for nginx:latest"),
        ];
        let summary = drain_pull("nginx:latest", stream::iter(events).boxed())
            .await
            .unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!(
            summary.last_status.as_deref(),
            Some("Status: Downloaded newer image for nginx:latest")
        );
    }

    #[tokio::test]
    async fn test_drain_reports_last_error_after_exhausting_stream() {
        let events = vec![
            progress("Pulling from library/nginx"),
            Err(RuntimeError::ImagePullFailed {
                image: "nginx:latest".into(),
                reason: "first".into(),
            }),
            progress("Retrying"),
            Err(RuntimeError::ImagePullFailed {
                image: "nginx:latest".into(),
                reason: "unexpected EOF".into(),
            }),
        ];

        let err = drain_pull("nginx:latest", stream::iter(events).boxed())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ImagePullFailed {
                image: "nginx:latest".into(),
                reason: "unexpected EOF".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_drain_wraps_other_errors() {
        let events = vec![Err(RuntimeError::Unavailable("connection reset".into()))];
        let err = drain_pull("busybox", stream::iter(events).boxed())
            .await
            .unwrap_err();

        match err {
            RuntimeError::ImagePullFailed { image, reason } => {
                assert_eq!(image, "busybox");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drain_empty_stream_is_success() {
        let summary = drain_pull("busybox", stream::empty().boxed()).await.unwrap();
        assert_eq!(summary, PullSummary::default());
    }
}
