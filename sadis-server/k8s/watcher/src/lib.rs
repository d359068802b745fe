//! Discovers BBSim instances as their pods become ready.
//!
//! BBSim pods are watched cluster-wide. Whenever a pod is reported with all of its containers
//! ready, the services that share the pod's release label are resolved and each one is queried
//! for its SADIS configuration on a task of its own. Nothing is done when a pod is removed, so
//! cached entries outlive the instance that served them.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod pod;
mod service;
#[cfg(test)]
mod tests;

pub use self::{
    pod::is_ready,
    service::{Backend, ServiceResolver},
};
use anyhow::{bail, Result};
use bbsim_sadis_server_fetch::Fetcher;
use futures::prelude::*;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client, ResourceExt,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Finds the services that front the pods of a release.
#[async_trait::async_trait]
pub trait ResolveBackends: Clone + Send + Sync + 'static {
    async fn resolve(&self, namespace: &str, release: &str) -> Result<Vec<Backend>>;
}

/// Loads a backend's SADIS configuration into the store.
#[async_trait::async_trait]
pub trait FetchBackend: Clone + Send + Sync + 'static {
    async fn fetch(&self, backend: &Backend) -> Result<()>;
}

/// Reacts to BBSim pod events.
#[derive(Clone)]
pub struct Watcher<R, F> {
    resolve: R,
    fetch: F,
    release_label: String,
}

/// Watches all pods labeled `app=<app>`.
pub fn pods(
    client: Client,
    app: &str,
) -> impl Stream<Item = Result<watcher::Event<Pod>, watcher::Error>> + Send + 'static {
    let config = watcher::Config::default().labels(&format!("app={app}"));
    watcher(Api::<Pod>::all(client), config).default_backoff()
}

// === impl Watcher ===

impl<R, F> Watcher<R, F>
where
    R: ResolveBackends,
    F: FetchBackend,
{
    pub fn new(resolve: R, fetch: F, release_label: impl ToString) -> Self {
        Self {
            resolve,
            fetch,
            release_label: release_label.to_string(),
        }
    }

    /// Processes pod events until the stream ends.
    ///
    /// The watch is established once the initial list completes. An error before that means the
    /// watch could not be established and is returned. Later errors are logged while the stream
    /// recovers on its own.
    pub async fn run<S, E>(self, events: S) -> Result<()>
    where
        S: Stream<Item = Result<watcher::Event<Pod>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        futures::pin_mut!(events);
        let mut established = false;
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    // The watcher emits `Init` before it issues the initial list request.
                    if !matches!(event, watcher::Event::Init) {
                        established = true;
                    }
                    self.handle(event);
                }
                Err(error) if established => {
                    warn!(%error, "Pod watch failed; restarting");
                }
                Err(error) => {
                    return Err(anyhow::Error::new(error).context("failed to watch pods"));
                }
            }
        }
        bail!("pod watch terminated")
    }

    fn handle(&self, event: watcher::Event<Pod>) {
        match event {
            watcher::Event::Apply(pod) | watcher::Event::InitApply(pod) => self.apply(pod),
            watcher::Event::Delete(pod) => self.delete(pod),
            watcher::Event::Init => debug!("Listing pods"),
            watcher::Event::InitDone => debug!("Listed pods"),
        }
    }

    fn apply(&self, pod: Pod) {
        let name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_default();
        let release = pod.labels().get(&self.release_label).cloned();
        let ready = is_ready(&pod);
        let pod_ip = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref());
        debug!(pod = %name, %namespace, ?release, ready, ?pod_ip, "Received event for BBSim pod");

        if !ready {
            return;
        }

        let Some(release) = release else {
            warn!(pod = %name, %namespace, label = %self.release_label, "Ready pod has no release label");
            return;
        };

        let span = info_span!("pod", %namespace, %name, %release);
        let resolve = self.resolve.clone();
        let fetch = self.fetch.clone();
        tokio::spawn(
            async move {
                let backends = match resolve.resolve(&namespace, &release).await {
                    Ok(backends) => backends,
                    Err(error) => {
                        error!(%error, "Failed to resolve services");
                        return;
                    }
                };
                if backends.is_empty() {
                    warn!("No services found for pod");
                }

                for backend in backends {
                    let span = info_span!("fetch", service = %backend.name);
                    let fetch = fetch.clone();
                    tokio::spawn(
                        async move {
                            if let Err(error) = fetch.fetch(&backend).await {
                                error!(%error, "Failed to load SADIS config from BBSim");
                            }
                        }
                        .instrument(span),
                    );
                }
            }
            .instrument(span),
        );
    }

    fn delete(&self, pod: Pod) {
        // Entries served by the pod are kept.
        info!(
            pod = %pod.name_any(),
            namespace = ?pod.namespace(),
            "Pod has been removed",
        );
    }
}

#[async_trait::async_trait]
impl FetchBackend for Fetcher {
    async fn fetch(&self, backend: &Backend) -> Result<()> {
        Fetcher::fetch(self, &backend.endpoint).await?;
        Ok(())
    }
}
