use k8s_openapi::api::core::v1::Pod;

/// A pod is ready once it reports container statuses and every container is ready.
pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .map(|containers| !containers.is_empty() && containers.iter().all(|c| c.ready))
        .unwrap_or(false)
}
