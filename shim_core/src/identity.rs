//! Mapping between pod identity and runtime container identity.
//!
//! Names are for humans and for uniqueness at creation time. Finding a
//! container again always goes through its labels: a name cannot be split
//! back into namespace, pod and container once those contain the
//! separator.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use container_runtime_interface::LabelSelector;
use shim_shared_types::PodKey;

pub const CONTAINER_NAME_PREFIX: &str = "VK";

pub const LABEL_POD_NAMESPACE: &str = "podNamespace";
pub const LABEL_POD_NAME: &str = "podName";
pub const LABEL_CONTAINER_NAME: &str = "containerName";
pub const LABEL_MANAGED_BY: &str = "managedBy";

/// Value of [`LABEL_MANAGED_BY`] on every container this shim creates.
pub const MANAGER_NAME: &str = "vk-web-shim";

const DIGEST_HEX_LEN: usize = 12;

/// Runtime name for a pod's container:
/// `VK_<namespace>_<pod>_<container>_<digest>`.
///
/// Components are reduced to the runtime's name alphabet; the digest is
/// taken over the raw components, so two different triples never share a
/// name even when they sanitize or join to the same text.
pub fn derive_name(namespace: &str, pod_name: &str, container_name: &str) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        CONTAINER_NAME_PREFIX,
        sanitize(namespace),
        sanitize(pod_name),
        sanitize(container_name),
        digest(&[namespace, pod_name, container_name])
    )
}

/// Labels attached to every container created for a pod.
pub fn labels_for(namespace: &str, pod_name: &str, container_name: &str) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGER_NAME.to_string()),
        (LABEL_POD_NAMESPACE.to_string(), namespace.to_string()),
        (LABEL_POD_NAME.to_string(), pod_name.to_string()),
        (LABEL_CONTAINER_NAME.to_string(), container_name.to_string()),
    ])
}

/// Every container managed by this shim.
pub fn managed_selector() -> LabelSelector {
    LabelSelector::new().with_label(LABEL_MANAGED_BY, MANAGER_NAME)
}

/// The containers of one pod.
pub fn pod_selector(key: &PodKey) -> LabelSelector {
    managed_selector()
        .with_label(LABEL_POD_NAMESPACE, key.namespace.as_str())
        .with_label(LABEL_POD_NAME, key.name.as_str())
}

/// Recover the owning pod from a container's labels.
pub fn pod_key_from_labels(labels: &HashMap<String, String>) -> Option<PodKey> {
    let namespace = labels.get(LABEL_POD_NAMESPACE)?;
    let name = labels.get(LABEL_POD_NAME)?;
    Some(PodKey::new(namespace.clone(), name.clone()))
}

pub fn container_name_from_labels(labels: &HashMap<String, String>) -> Option<&str> {
    labels.get(LABEL_CONTAINER_NAME).map(String::as_str)
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn digest(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for component in components {
        // Length prefix keeps ("a_b", "c") and ("a", "b_c") apart.
        hasher.update((component.len() as u64).to_be_bytes());
        hasher.update(component.as_bytes());
    }
    let mut encoded = hex::encode(hasher.finalize());
    encoded.truncate(DIGEST_HEX_LEN);
    encoded
}
