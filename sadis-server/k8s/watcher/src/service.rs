use crate::ResolveBackends;
use anyhow::Result;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    Client, ResourceExt,
};
use tracing::debug;

/// A service fronting a BBSim instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    pub namespace: String,

    /// The service's cluster-internal `host:port`.
    pub endpoint: String,
}

/// Resolves backends by listing the services that carry the BBSim app label and the pod's
/// release label.
#[derive(Clone)]
pub struct ServiceResolver {
    client: Client,
    app: String,
    release_label: String,
    cluster_domain: String,
    port: u16,
}

// === impl Backend ===

impl Backend {
    pub fn new(
        name: impl ToString,
        namespace: impl ToString,
        cluster_domain: &str,
        port: u16,
    ) -> Self {
        let name = name.to_string();
        let namespace = namespace.to_string();
        let endpoint = format!("{name}.{namespace}.svc.{cluster_domain}:{port}");
        Self {
            name,
            namespace,
            endpoint,
        }
    }
}

// === impl ServiceResolver ===

impl ServiceResolver {
    pub fn new(
        client: Client,
        app: impl ToString,
        release_label: impl ToString,
        cluster_domain: impl ToString,
        port: u16,
    ) -> Self {
        Self {
            client,
            app: app.to_string(),
            release_label: release_label.to_string(),
            cluster_domain: cluster_domain.to_string(),
            port,
        }
    }

    fn selector(&self, release: &str) -> String {
        selector(&self.app, &self.release_label, release)
    }
}

#[async_trait::async_trait]
impl ResolveBackends for ServiceResolver {
    async fn resolve(&self, namespace: &str, release: &str) -> Result<Vec<Backend>> {
        let selector = self.selector(release);
        let services = Api::<Service>::namespaced(self.client.clone(), namespace)
            .list(&ListParams::default().labels(&selector))
            .await?;
        debug!(%selector, services = services.items.len(), "Resolved services");

        Ok(services
            .items
            .iter()
            .map(|svc| Backend::new(svc.name_any(), namespace, &self.cluster_domain, self.port))
            .collect())
    }
}

fn selector(app: &str, release_label: &str, release: &str) -> String {
    format!("app={app},{release_label}={release}")
}
