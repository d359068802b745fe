use crate::{
    core::Store,
    fetch::{self, Fetcher, RetryPolicy},
    http::{self, Lookup},
    watcher::{self, ServiceResolver, Watcher},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "bbsim-sadis-server",
    about = "Serves the SADIS configuration of all BBSim instances in a cluster"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "bbsim_sadis=info,warn",
        env = "BBSIM_SADIS_SERVER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "json")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Serves liveness, readiness, and metrics.
    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    /// Serves SADIS lookups.
    #[clap(long, default_value = "0.0.0.0:8080")]
    server_addr: SocketAddr,

    /// The port on which BBSim services expose their SADIS configuration.
    #[clap(long, default_value = "50074")]
    bbsim_sadis_port: u16,

    /// The `app` label value that selects BBSim pods and services.
    #[clap(long, default_value = "bbsim")]
    app: String,

    /// The label that associates BBSim pods with their services.
    #[clap(long, default_value = "release")]
    release_label: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    /// The total number of requests issued to an unreachable BBSim service.
    #[clap(long, default_value = "10")]
    fetch_attempts: u32,

    #[clap(long, default_value = "1000")]
    fetch_retry_interval_ms: u64,

    #[clap(long, default_value = "5000")]
    fetch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin_addr,
            server_addr,
            bbsim_sadis_port,
            app,
            release_label,
            cluster_domain,
            fetch_attempts,
            fetch_retry_interval_ms,
            fetch_timeout_ms,
        } = self;

        let retry = RetryPolicy {
            attempts: fetch_attempts,
            interval: Duration::from_millis(fetch_retry_interval_ms),
            timeout: Duration::from_millis(fetch_timeout_ms),
        };

        let mut prom = <Registry>::default();
        let fetch_metrics = fetch::Metrics::register(prom.sub_registry_with_prefix("fetch"));
        let lookup_metrics = http::Metrics::register(prom.sub_registry_with_prefix("lookup"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let admin = kubert::AdminArgs { admin_addr };
        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // The store is shared by the fetchers, which write to it, and the lookup server, which
        // reads from it.
        let store = Store::default();

        let fetcher = Fetcher::new(store.clone(), retry, fetch_metrics);
        let resolver = ServiceResolver::new(
            runtime.client(),
            &app,
            &release_label,
            &cluster_domain,
            bbsim_sadis_port,
        );
        let pods = watcher::pods(runtime.client(), &app);
        let mut watch = tokio::spawn(
            Watcher::new(resolver, fetcher, &release_label)
                .run(pods)
                .instrument(info_span!("pods")),
        );

        let mut server = tokio::spawn(
            http::serve(
                server_addr,
                Lookup::new(store, lookup_metrics),
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("lookup", port = %server_addr.port())),
        );

        info!(%app, %release_label, ?retry, "Watching BBSim pods");

        // Block the main thread on the shutdown signal. The pod watch never completes on its own,
        // so its completion is fatal, as is a lookup server that stops before shutdown.
        let shutdown = runtime.run();
        tokio::pin!(shutdown);
        tokio::select! {
            res = &mut shutdown => {
                if res.is_err() {
                    bail!("Aborted");
                }
                return Ok(());
            }
            res = &mut watch => {
                res.context("pod watch panicked")??;
                bail!("pod watch stopped");
            }
            res = &mut server => {
                res.context("lookup server panicked")??;
            }
        }

        // The lookup server only stops cleanly once shutdown has begun.
        if shutdown.await.is_err() {
            bail!("Aborted");
        }
        Ok(())
    }
}
