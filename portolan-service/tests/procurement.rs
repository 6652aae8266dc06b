//! End-to-end procurement tests against in-memory gateway/probe/oracle fakes
//! and a real temp-dir store: single-flight, idempotence, cleanup, and the
//! read path on top of procured documents.

use async_trait::async_trait;
use portolan_clients::gateway::{GatewayAdmin, GatewayRoute, GatewayService, RouteService};
use portolan_clients::policy::PolicyOracle;
use portolan_clients::probe::DocProbe;
use portolan_core::model::arg_key;
use portolan_core::PortolanError;
use portolan_service::procurement::storage_id;
use portolan_service::{Discovery, SwaggerService};
use portolan_store::FsStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

struct FakeGateway {
    routes: Mutex<Vec<GatewayRoute>>,
    services: Mutex<Vec<GatewayService>>,
}

impl FakeGateway {
    fn new(routes: Vec<GatewayRoute>, services: Vec<GatewayService>) -> Self {
        Self {
            routes: Mutex::new(routes),
            services: Mutex::new(services),
        }
    }

    async fn set(&self, routes: Vec<GatewayRoute>, services: Vec<GatewayService>) {
        *self.routes.lock().await = routes;
        *self.services.lock().await = services;
    }
}

#[async_trait]
impl GatewayAdmin for FakeGateway {
    async fn get_routes(&self) -> Result<Vec<GatewayRoute>, PortolanError> {
        Ok(self.routes.lock().await.clone())
    }

    async fn get_services(&self) -> Result<Vec<GatewayService>, PortolanError> {
        Ok(self.services.lock().await.clone())
    }
}

/// Serves a fixed document per host, after an optional artificial delay.
struct FakeProbe {
    docs: HashMap<String, Vec<u8>>,
    delay: Duration,
}

#[async_trait]
impl DocProbe for FakeProbe {
    async fn get_doc(
        &self,
        _protocol: &str,
        host: &str,
        _port: u16,
    ) -> Result<Vec<u8>, PortolanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.docs
            .get(host)
            .cloned()
            .ok_or_else(|| PortolanError::Internal("no doc".to_string()))
    }
}

/// Allows everything.
struct AllowAllOracle;

#[async_trait]
impl PolicyOracle for AllowAllOracle {
    async fn get_role_access_policy(
        &self,
        _role: &str,
        _path: &str,
        _method: &str,
    ) -> Result<bool, PortolanError> {
        Ok(true)
    }

    async fn get_user_access_policy(
        &self,
        _token: &str,
        path_methods: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, PortolanError> {
        Ok(path_methods.clone())
    }
}

/// Denies everything.
struct DenyAllOracle;

#[async_trait]
impl PolicyOracle for DenyAllOracle {
    async fn get_role_access_policy(
        &self,
        _role: &str,
        _path: &str,
        _method: &str,
    ) -> Result<bool, PortolanError> {
        Ok(false)
    }

    async fn get_user_access_policy(
        &self,
        _token: &str,
        path_methods: &HashMap<String, Vec<String>>,
    ) -> Result<HashMap<String, Vec<String>>, PortolanError> {
        Ok(path_methods.keys().map(|p| (p.clone(), Vec::new())).collect())
    }
}

fn route(id: &str, paths: &[&str], service_id: &str) -> GatewayRoute {
    GatewayRoute {
        id: id.to_string(),
        name: String::new(),
        paths: Some(paths.iter().map(|p| p.to_string()).collect()),
        service: Some(RouteService {
            id: service_id.to_string(),
        }),
    }
}

fn gateway_service(id: &str, host: &str, port: u16) -> GatewayService {
    GatewayService {
        id: id.to_string(),
        host: host.to_string(),
        port,
        protocol: "http".to_string(),
    }
}

fn device_doc() -> Vec<u8> {
    br#"{"swagger":"2.0","info":{"title":"Device API","version":"1.0","description":"devices"},"paths":{"/state":{"get":{}},"/cmd":{"post":{}}}}"#.to_vec()
}

struct Fixture {
    service: Arc<SwaggerService>,
    store: Arc<FsStore>,
    gateway: Arc<FakeGateway>,
    _tmp: tempfile::TempDir,
}

async fn fixture(oracle: Arc<dyn PolicyOracle>, probe_delay: Duration) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(tmp.path(), "swagger"));
    store.init().await.unwrap();

    let gateway = Arc::new(FakeGateway::new(
        vec![route("r1", &["/devices"], "s1")],
        vec![gateway_service("s1", "api.srv-a", 8000)],
    ));
    let probe = Arc::new(FakeProbe {
        docs: [("api.srv-a".to_string(), device_doc())].into_iter().collect(),
        delay: probe_delay,
    });

    let discovery = Discovery::new(
        Arc::clone(&gateway) as Arc<dyn GatewayAdmin>,
        Duration::from_secs(5),
        vec![],
    );
    let service = Arc::new(SwaggerService::new(
        Arc::clone(&store),
        discovery,
        probe,
        oracle,
        Duration::from_secs(5),
        "gw.example.org",
        "admin",
    ));
    Fixture {
        service,
        store,
        gateway,
        _tmp: tmp,
    }
}

#[tokio::test]
async fn refresh_stores_one_entry_per_mount_with_route_args() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::ZERO).await;
    fx.gateway
        .set(
            vec![route("r1", &["/devices", "/devices/v2"], "s1")],
            vec![gateway_service("s1", "api.srv-a", 8000)],
        )
        .await;

    fx.service.refresh_docs().await.unwrap();

    let mut ids: Vec<String> = fx.store.list().await.into_iter().map(|d| d.id).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            storage_id("api.srv-a8000", "/devices"),
            storage_id("api.srv-a8000", "/devices/v2"),
        ]
    );

    let data = fx
        .store
        .list()
        .await
        .into_iter()
        .find(|d| d.id == storage_id("api.srv-a8000", "/devices"))
        .unwrap();
    assert_eq!(data.args.first(arg_key::TITLE), Some("Device API"));
    assert_eq!(data.args.first(arg_key::BASE_PATH), Some("/devices"));
    let routes: Vec<&str> = data.args.all(arg_key::ROUTE).collect();
    assert_eq!(routes, vec!["/devices/cmd|post", "/devices/state|get"]);

    // The stored body already carries the gateway view.
    let body = fx.store.read(&data.id).await.unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc["host"], "gw.example.org");
    assert_eq!(doc["basePath"], "/devices");
    assert_eq!(doc["schemes"], serde_json::json!(["https"]));
}

#[tokio::test]
async fn concurrent_refresh_is_single_flight() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::from_millis(100)).await;

    let (first, second) = tokio::join!(fx.service.refresh_docs(), fx.service.refresh_docs());
    let outcomes = [first, second];
    let busy = outcomes
        .iter()
        .filter(|r| matches!(r, Err(PortolanError::ResourceBusy(_))))
        .count();
    let ok = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "exactly one cycle must win");
    assert_eq!(busy, 1, "the loser must fail fast with ResourceBusy");
}

#[tokio::test]
async fn repeated_refresh_is_idempotent_and_cleans_up_removed_services() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::ZERO).await;
    fx.gateway
        .set(
            vec![route("r1", &["/devices"], "s1"), route("r2", &["/things"], "s2")],
            vec![
                gateway_service("s1", "api.srv-a", 8000),
                gateway_service("s2", "api.srv-a", 8000),
            ],
        )
        .await;

    fx.service.refresh_docs().await.unwrap();
    let first: std::collections::BTreeMap<String, Vec<u8>> = {
        let mut snapshot = std::collections::BTreeMap::new();
        for data in fx.store.list().await {
            snapshot.insert(data.id.clone(), fx.store.read(&data.id).await.unwrap());
        }
        snapshot
    };

    fx.service.refresh_docs().await.unwrap();
    let second: std::collections::BTreeMap<String, Vec<u8>> = {
        let mut snapshot = std::collections::BTreeMap::new();
        for data in fx.store.list().await {
            snapshot.insert(data.id.clone(), fx.store.read(&data.id).await.unwrap());
        }
        snapshot
    };
    assert_eq!(first, second);

    // Drop the /things mount; its entry must disappear, /devices must stay.
    fx.gateway
        .set(
            vec![route("r1", &["/devices"], "s1")],
            vec![gateway_service("s1", "api.srv-a", 8000)],
        )
        .await;
    fx.service.refresh_docs().await.unwrap();

    let ids: Vec<String> = fx.store.list().await.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![storage_id("api.srv-a8000", "/devices")]);
}

#[tokio::test]
async fn failed_probe_keeps_the_previous_revision() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::ZERO).await;
    fx.service.refresh_docs().await.unwrap();
    assert_eq!(fx.store.list().await.len(), 1);

    // Same inventory, but the upstream stops answering: the stored revision
    // survives because the service is still discovered.
    let dead_probe = Arc::new(FakeProbe {
        docs: HashMap::new(),
        delay: Duration::ZERO,
    });
    let discovery = Discovery::new(
        Arc::clone(&fx.gateway) as Arc<dyn GatewayAdmin>,
        Duration::from_secs(5),
        vec![],
    );
    let service = SwaggerService::new(
        Arc::clone(&fx.store),
        discovery,
        dead_probe,
        Arc::new(AllowAllOracle),
        Duration::from_secs(5),
        "gw.example.org",
        "admin",
    );
    service.refresh_docs().await.unwrap();
    assert_eq!(fx.store.list().await.len(), 1);
}

#[tokio::test]
async fn get_docs_transforms_and_sorts_for_admin() {
    let fx = fixture(Arc::new(DenyAllOracle), Duration::ZERO).await;
    fx.gateway
        .set(
            vec![route("r1", &["/b", "/a"], "s1")],
            vec![gateway_service("s1", "api.srv-a", 8000)],
        )
        .await;
    fx.service.refresh_docs().await.unwrap();

    // Admin bypasses the (deny-all) filter entirely.
    let docs = fx
        .service
        .get_docs("", &["admin".to_string()])
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["basePath"], "/a");
    assert_eq!(docs[1]["basePath"], "/b");
}

#[tokio::test]
async fn get_docs_is_empty_without_identity_and_filtered_for_others() {
    let fx = fixture(Arc::new(DenyAllOracle), Duration::ZERO).await;
    fx.service.refresh_docs().await.unwrap();

    assert!(fx.service.get_docs("", &[]).await.unwrap().is_empty());
    // Deny-all oracle suppresses every doc for a normal user.
    let docs = fx
        .service
        .get_docs("", &["user".to_string()])
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn get_doc_is_forbidden_when_filter_empties_it() {
    let fx = fixture(Arc::new(DenyAllOracle), Duration::ZERO).await;
    fx.service.refresh_docs().await.unwrap();
    let id = storage_id("api.srv-a8000", "/devices");

    let err = fx
        .service
        .get_doc(&id, "", &["user".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, PortolanError::Forbidden(_)));

    // The admin still gets the full document.
    let body = fx
        .service
        .get_doc(&id, "", &["admin".to_string()])
        .await
        .unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc["basePath"], "/devices");
}

#[tokio::test]
async fn list_storage_respects_the_oracle_for_non_admins() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::ZERO).await;
    fx.service.refresh_docs().await.unwrap();

    let all = fx
        .service
        .list_storage("", &["admin".to_string()])
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].base_path, "/devices");

    let allowed = fx
        .service
        .list_storage("", &["user".to_string()])
        .await
        .unwrap();
    assert_eq!(allowed.len(), 1);

    let denied_fx = fixture(Arc::new(DenyAllOracle), Duration::ZERO).await;
    denied_fx.service.refresh_docs().await.unwrap();
    let hidden = denied_fx
        .service
        .list_storage("", &["user".to_string()])
        .await
        .unwrap();
    assert!(hidden.is_empty());
}

#[tokio::test]
async fn periodic_loop_runs_a_cycle_then_stops_on_shutdown() {
    let fx = fixture(Arc::new(AllowAllOracle), Duration::ZERO).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(
        Arc::clone(&fx.service).run_periodic(Duration::from_secs(3600), shutdown_rx),
    );
    // The first cycle fires almost immediately after startup.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fx.store.list().await.len(), 1);

    shutdown_tx.send(true).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop must stop on shutdown")
        .unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn periodic_loop_surfaces_a_panicking_cycle_as_an_error() {
    struct PanickingGateway;

    #[async_trait]
    impl GatewayAdmin for PanickingGateway {
        async fn get_routes(&self) -> Result<Vec<GatewayRoute>, PortolanError> {
            panic!("boom");
        }

        async fn get_services(&self) -> Result<Vec<GatewayService>, PortolanError> {
            Ok(vec![])
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(tmp.path(), "swagger"));
    store.init().await.unwrap();
    let discovery = Discovery::new(Arc::new(PanickingGateway), Duration::from_secs(5), vec![]);
    let service = Arc::new(SwaggerService::new(
        store,
        discovery,
        Arc::new(FakeProbe {
            docs: HashMap::new(),
            delay: Duration::ZERO,
        }),
        Arc::new(AllowAllOracle),
        Duration::from_secs(5),
        "gw",
        "admin",
    ));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        service.run_periodic(Duration::from_secs(3600), shutdown_rx),
    )
    .await
    .expect("loop must end after the panic");
    assert!(matches!(outcome, Err(PortolanError::Internal(_))));
}
