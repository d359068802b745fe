use super::*;
use k8s_openapi::{
    api::core::v1::{ContainerStatus, PodStatus},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use maplit::btreemap;
use std::{
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{sync::mpsc, time};

/// Returns one backend per service name, for every release.
#[derive(Clone)]
struct FakeResolver {
    services: Vec<&'static str>,
    calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct FakeFetch(mpsc::UnboundedSender<Backend>);

#[async_trait::async_trait]
impl ResolveBackends for FakeResolver {
    async fn resolve(&self, namespace: &str, release: &str) -> Result<Vec<Backend>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .services
            .iter()
            .map(|svc| Backend::new(format!("{release}-{svc}"), namespace, "cluster.local", 50074))
            .collect())
    }
}

#[async_trait::async_trait]
impl FetchBackend for FakeFetch {
    async fn fetch(&self, backend: &Backend) -> Result<()> {
        self.0.send(backend.clone())?;
        Ok(())
    }
}

fn mk_watcher(
    services: Vec<&'static str>,
) -> (
    Watcher<FakeResolver, FakeFetch>,
    Arc<AtomicUsize>,
    mpsc::UnboundedReceiver<Backend>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::unbounded_channel();
    let resolver = FakeResolver {
        services,
        calls: calls.clone(),
    };
    (Watcher::new(resolver, FakeFetch(tx), "release"), calls, rx)
}

fn mk_pod(ns: &str, name: &str, release: Option<&str>, containers: Vec<bool>) -> Pod {
    let mut labels = btreemap! { "app".to_string() => "bbsim".to_string() };
    if let Some(release) = release {
        labels.insert("release".to_string(), release.to_string());
    }
    Pod {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            pod_ip: Some("192.0.2.10".to_string()),
            container_statuses: Some(
                containers
                    .into_iter()
                    .enumerate()
                    .map(|(i, ready)| ContainerStatus {
                        name: format!("bbsim-{i}"),
                        ready,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn events(
    events: Vec<Result<watcher::Event<Pod>, io::Error>>,
) -> impl Stream<Item = Result<watcher::Event<Pod>, io::Error>> {
    futures::stream::iter(events)
}

async fn next_fetch(rx: &mut mpsc::UnboundedReceiver<Backend>) -> Backend {
    time::timeout(time::Duration::from_secs(5), rx.recv())
        .await
        .expect("fetch must be scheduled")
        .expect("fetch channel must be open")
}

/// Lets spawned tasks run so that anything they would schedule has been scheduled.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn ready_pod_fetches_every_service() {
    let (watcher, calls, mut fetches) = mk_watcher(vec!["a", "b"]);

    let pod = mk_pod("voltha", "bbsim0-0", Some("bbsim0"), vec![true]);
    let error = watcher
        .run(events(vec![
            Ok(watcher::Event::Init),
            Ok(watcher::Event::InitApply(pod)),
            Ok(watcher::Event::InitDone),
        ]))
        .await
        .expect_err("a finite watch must fail");
    assert!(error.to_string().contains("terminated"), "{error}");

    let mut endpoints = vec![
        next_fetch(&mut fetches).await.endpoint,
        next_fetch(&mut fetches).await.endpoint,
    ];
    endpoints.sort();
    assert_eq!(
        endpoints,
        vec![
            "bbsim0-a.voltha.svc.cluster.local:50074",
            "bbsim0-b.voltha.svc.cluster.local:50074",
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_ready_event_fetches_again() {
    let (watcher, calls, mut fetches) = mk_watcher(vec!["svc"]);

    let ready = mk_pod("voltha", "bbsim0-0", Some("bbsim0"), vec![true]);
    let unready = mk_pod("voltha", "bbsim0-0", Some("bbsim0"), vec![false]);
    let _ = watcher
        .run(events(vec![
            Ok(watcher::Event::Apply(ready.clone())),
            Ok(watcher::Event::Apply(unready)),
            Ok(watcher::Event::Apply(ready)),
        ]))
        .await;

    next_fetch(&mut fetches).await;
    next_fetch(&mut fetches).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unready_pods_are_ignored() {
    let (watcher, calls, mut fetches) = mk_watcher(vec!["svc"]);

    let _ = watcher
        .run(events(vec![
            Ok(watcher::Event::Apply(mk_pod(
                "voltha",
                "starting",
                Some("bbsim0"),
                vec![true, false],
            ))),
            Ok(watcher::Event::Apply(mk_pod(
                "voltha",
                "empty",
                Some("bbsim1"),
                vec![],
            ))),
        ]))
        .await;

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(fetches.try_recv().is_err());
}

#[tokio::test]
async fn ready_pod_without_release_is_skipped() {
    let (watcher, calls, mut fetches) = mk_watcher(vec!["svc"]);

    let _ = watcher
        .run(events(vec![Ok(watcher::Event::Apply(mk_pod(
            "voltha",
            "bbsim0-0",
            None,
            vec![true],
        )))]))
        .await;

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(fetches.try_recv().is_err());
}

#[tokio::test]
async fn deleted_pods_are_only_logged() {
    let (watcher, calls, mut fetches) = mk_watcher(vec!["svc"]);

    let _ = watcher
        .run(events(vec![Ok(watcher::Event::Delete(mk_pod(
            "voltha",
            "bbsim0-0",
            Some("bbsim0"),
            vec![true],
        )))]))
        .await;

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(fetches.try_recv().is_err());
}

#[tokio::test]
async fn failure_to_establish_watch_is_fatal() {
    let (watcher, calls, _fetches) = mk_watcher(vec!["svc"]);

    let error = watcher
        .run(events(vec![
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "forbidden")),
            Ok(watcher::Event::Apply(mk_pod(
                "voltha",
                "bbsim0-0",
                Some("bbsim0"),
                vec![true],
            ))),
        ]))
        .await
        .expect_err("watch must fail");
    assert!(error.to_string().contains("failed to watch pods"), "{error}");

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_initial_list_is_fatal() {
    let (watcher, calls, _fetches) = mk_watcher(vec!["svc"]);

    let error = watcher
        .run(events(vec![
            Ok(watcher::Event::Init),
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
            Ok(watcher::Event::InitDone),
        ]))
        .await
        .expect_err("watch must fail");
    assert!(error.to_string().contains("failed to watch pods"), "{error}");

    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn established_watch_survives_errors() {
    let (watcher, _calls, mut fetches) = mk_watcher(vec!["svc"]);

    let error = watcher
        .run(events(vec![
            Ok(watcher::Event::Init),
            Ok(watcher::Event::InitDone),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(watcher::Event::Apply(mk_pod(
                "voltha",
                "bbsim0-0",
                Some("bbsim0"),
                vec![true],
            ))),
        ]))
        .await
        .expect_err("a finite watch must fail");
    assert!(error.to_string().contains("terminated"), "{error}");

    let backend = next_fetch(&mut fetches).await;
    assert_eq!(backend.name, "bbsim0-svc");
    assert_eq!(backend.namespace, "voltha");
}
