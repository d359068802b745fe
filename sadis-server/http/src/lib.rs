//! Serves cached SADIS entries by ID.
//!
//! * `/subscribers/{id}` returns the OLT with the ID or, failing that, the ONU with the ID.
//! * `/profiles/{id}` returns the bandwidth profile with the ID.
//!
//! Misses are answered with a JSON body describing the missing entry.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;

pub use self::metrics::Metrics;
use bbsim_sadis_server_core::{Kind, Store};
use http::{header, Method, Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::{future, net::SocketAddr, task};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

pub type Body = http_body_util::Full<bytes::Bytes>;

/// Answers lookups against the store.
#[derive(Clone, Debug)]
pub struct Lookup {
    store: Store,
    metrics: Metrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route<'p> {
    Subscriber(&'p str),
    Profile(&'p str),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Missing {
    status_code: u16,
    message: String,
}

// === impl Lookup ===

impl Lookup {
    pub fn new(store: Store, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    fn handle(&self, method: &Method, path: &str) -> Result<Response<Body>, Error> {
        // Routes match the decoded path, so an encoded `/` cannot appear inside an ID.
        let path = percent_decode_str(path).decode_utf8_lossy();
        let Some(route) = Route::parse(&path) else {
            debug!(%path, "Unknown path");
            return Ok(empty(StatusCode::NOT_FOUND));
        };

        if method != Method::GET && method != Method::HEAD {
            return Ok(empty(StatusCode::METHOD_NOT_ALLOWED));
        }

        match route {
            Route::Subscriber(id) => self.subscriber(id),
            Route::Profile(id) => self.profile(id),
        }
    }

    fn subscriber(&self, id: &str) -> Result<Response<Body>, Error> {
        debug!(%id, "Received SADIS entry request");
        let found = self
            .store
            .lookup(Kind::Olt, id)
            .or_else(|_| self.store.lookup(Kind::Onu, id));
        match found {
            Ok(entity) => {
                self.metrics.found("subscribers");
                info!(%id, kind = %entity.kind(), "Responded to SADIS entry request");
                json(StatusCode::OK, &entity)
            }
            Err(_) => {
                self.metrics.not_found("subscribers");
                warn!(%id, "SADIS entry not found");
                json(
                    StatusCode::NOT_FOUND,
                    &Missing::new(format!("Entry with ID {id} not found.")),
                )
            }
        }
    }

    fn profile(&self, id: &str) -> Result<Response<Body>, Error> {
        debug!(%id, "Received bandwidth profile request");
        match self.store.lookup(Kind::BandwidthProfile, id) {
            Ok(entity) => {
                self.metrics.found("profiles");
                info!(%id, "Responded to bandwidth profile request");
                json(StatusCode::OK, &entity)
            }
            Err(_) => {
                self.metrics.not_found("profiles");
                warn!(%id, "Bandwidth profile not found");
                json(
                    StatusCode::NOT_FOUND,
                    &Missing::new(format!("BandwidthProfile with ID {id} not found.")),
                )
            }
        }
    }
}

impl<B> tower::Service<Request<B>> for Lookup {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::Ready<Result<Response<Body>, Error>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        future::ready(self.handle(req.method(), req.uri().path()))
    }
}

// === impl Route ===

impl<'p> Route<'p> {
    fn parse(path: &'p str) -> Option<Self> {
        fn id(rest: Option<&str>) -> Option<&str> {
            rest.filter(|id| !id.is_empty() && !id.contains('/'))
        }

        if let Some(id) = id(path.strip_prefix("/subscribers/")) {
            return Some(Self::Subscriber(id));
        }
        id(path.strip_prefix("/profiles/")).map(Self::Profile)
    }
}

// === impl Missing ===

impl Missing {
    fn new(message: String) -> Self {
        Self {
            status_code: StatusCode::NOT_FOUND.as_u16(),
            message,
        }
    }
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("json response must be valid"))
}

fn empty(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::default())
        .expect("empty response must be valid")
}

/// Serves lookups on `addr` until the drain signal fires.
pub async fn serve(addr: SocketAddr, lookup: Lookup, drain: drain::Watch) -> Result<(), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;
    info!(%addr, "SADIS lookup server listening");
    accept(listener, lookup, drain).await;
    Ok(())
}

#[instrument(skip_all)]
async fn accept(listener: TcpListener, lookup: Lookup, drain: drain::Watch) {
    let signaled = drain.clone().signaled();
    tokio::pin!(signaled);

    loop {
        let (io, client) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            release = &mut signaled => {
                info!("Stopped accepting lookups");
                drop(release);
                return;
            }
        };

        debug!(%client, "Accepted connection");
        tokio::spawn(
            connection(io, lookup.clone(), drain.clone()).instrument(info_span!("conn", %client)),
        );
    }
}

async fn connection(io: TcpStream, lookup: Lookup, drain: drain::Watch) {
    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(lookup));
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        release = drain.signaled() => {
            conn.as_mut().graceful_shutdown();
            release.release_after(conn).await
        }
    };
    if let Err(error) = res {
        debug!(%error, "Connection closed");
    }
}
