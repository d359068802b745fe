#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;

pub use self::metrics::Metrics;
use bbsim_sadis_server_core::{Kind, SadisConfig, Store, Subscriber};
use bytes::Bytes;
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info, warn};

/// The path at which BBSim serves its SADIS configuration.
pub const CONFIG_PATH: &str = "/v2/static";

/// Controls how a fetch reacts to unreachable backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of requests issued before giving up.
    pub attempts: u32,

    /// How long to wait between two requests.
    pub interval: time::Duration,

    /// Bounds each request, including reading the response body.
    pub timeout: time::Duration,
}

/// Fetches SADIS configurations from BBSim instances and caches their entries.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client<HttpConnector, Empty<Bytes>>,
    store: Store,
    retry: RetryPolicy,
    metrics: Metrics,
}

/// Counts the entries stored from a single document.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub olts: usize,
    pub onus: usize,
    pub bandwidth_profiles: usize,
    pub dropped: usize,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("{endpoint} is unreachable after {attempts} attempts: {source}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        #[source]
        source: AttemptError,
    },

    #[error("{endpoint} responded with {status}")]
    Status {
        endpoint: String,
        status: StatusCode,
    },

    #[error("cannot decode SADIS config from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The reason a single request failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("request timed out after {0:?}")]
    Timeout(time::Duration),
}

// === impl RetryPolicy ===

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: time::Duration::from_secs(1),
            timeout: time::Duration::from_secs(5),
        }
    }
}

// === impl Fetcher ===

impl Fetcher {
    pub fn new(store: Store, retry: RetryPolicy, metrics: Metrics) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(retry.timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            store,
            retry,
            metrics,
        }
    }

    /// Fetches the SADIS configuration served at `endpoint` (a `host:port` pair) and stores its
    /// entries.
    ///
    /// Only failures to get a response are retried. A response that isn't a decodable
    /// configuration fails immediately. Nothing is stored unless the document decodes.
    pub async fn fetch(&self, endpoint: &str) -> Result<Summary, Error> {
        let uri = format!("http://{endpoint}{CONFIG_PATH}")
            .parse::<Uri>()
            .map_err(|source| Error::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        let (status, body) = loop {
            attempt += 1;
            info!(%endpoint, attempt, "Querying service");
            self.metrics.attempt();
            match self.request(uri.clone()).await {
                Ok(rsp) => break rsp,
                Err(error) if attempt < attempts => {
                    warn!(%endpoint, attempt, %error, "Error while reading from service, retrying");
                    time::sleep(self.retry.interval).await;
                }
                Err(error) => {
                    error!(%endpoint, attempts, %error, "Giving up on service");
                    self.metrics.unreachable();
                    return Err(Error::Unreachable {
                        endpoint: endpoint.to_string(),
                        attempts,
                        source: error,
                    });
                }
            }
        };

        if !status.is_success() {
            error!(%endpoint, %status, "Unexpected response status");
            self.metrics.bad_status();
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }

        let config = match serde_json::from_slice::<SadisConfig>(&body) {
            Ok(config) => config,
            Err(source) => {
                error!(%endpoint, error = %source, "Cannot decode SADIS response");
                self.metrics.malformed();
                return Err(Error::Malformed {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };
        debug!(
            %endpoint,
            entries = config.sadis.entries.len(),
            bandwidth_profiles = config.bandwidth_profile.entries.len(),
            integration = ?config.sadis.integration,
            "Fetched SADIS config",
        );

        let summary = self.apply(config);
        self.metrics.ok();
        info!(
            %endpoint,
            olts = summary.olts,
            onus = summary.onus,
            bandwidth_profiles = summary.bandwidth_profiles,
            dropped = summary.dropped,
            "Stored SADIS config",
        );
        Ok(summary)
    }

    /// Classifies the document's entries and stores them in document order.
    pub fn apply(&self, config: SadisConfig) -> Summary {
        let mut summary = Summary::default();
        let (subscribers, bandwidth_profiles) = config.into_parts();

        for subscriber in subscribers {
            match subscriber {
                Ok(subscriber) => {
                    let kind = match subscriber {
                        Subscriber::Olt(_) => {
                            summary.olts += 1;
                            Kind::Olt
                        }
                        Subscriber::Onu(_) => {
                            summary.onus += 1;
                            Kind::Onu
                        }
                    };
                    debug!(id = %subscriber.id(), %kind, "Adding subscriber");
                    self.store.upsert(subscriber);
                    self.metrics.stored(kind);
                }
                Err(unclassified) => {
                    warn!(id = %unclassified.id, "Unknown entity");
                    self.metrics.dropped();
                    summary.dropped += 1;
                }
            }
        }

        for bp in bandwidth_profiles {
            debug!(id = %bp.id, "Adding bandwidth profile");
            self.store.upsert(bp);
            self.metrics.stored(Kind::BandwidthProfile);
            summary.bandwidth_profiles += 1;
        }

        summary
    }

    async fn request(&self, uri: Uri) -> Result<(StatusCode, Bytes), AttemptError> {
        let rsp = async {
            let rsp = self.client.get(uri).await?;
            let status = rsp.status();
            let body = rsp.into_body().collect().await?.to_bytes();
            Ok::<_, AttemptError>((status, body))
        };
        time::timeout(self.retry.timeout, rsp)
            .await
            .map_err(|_| AttemptError::Timeout(self.retry.timeout))?
    }
}
