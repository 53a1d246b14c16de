//! Integration tests for the mixnet directory
//!
//! These tests drive the directory end to end on the in-memory store with a
//! manual clock: observation handling, reputation, registration admission,
//! topology caching, background jobs and the HTTP API.

use mixnet_directory::clock::NANOS_PER_MINUTE;
use mixnet_directory::{
    BatchNodeStatus, ConflictReason, DirectoryConfig, DirectoryError, DirectoryService,
    GatewayRegistrationInfo, IpVersion, ManualClock, MemoryStore, MixRegistrationInfo, NodeInfo,
    NodeKind, NodeState, NodeStatus, Observation, StatusStore, Uptime, UptimeWindow,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

const START: i64 = 1_000_000 * NANOS_PER_MINUTE;

struct Harness {
    service: Arc<DirectoryService>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness_with(config: DirectoryConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(START));
    let service = Arc::new(DirectoryService::new(store.clone(), clock.clone(), &config));
    Harness {
        service,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(DirectoryConfig::default())
}

fn node_info(identity: &str, host: &str, version: &str) -> NodeInfo {
    NodeInfo {
        mix_host: host.to_string(),
        identity_key: identity.to_string(),
        sphinx_key: format!("sphinx-{}", identity),
        version: version.to_string(),
        location: "Earth".to_string(),
        incentives_address: String::new(),
    }
}

fn mix(identity: &str, host: &str) -> MixRegistrationInfo {
    MixRegistrationInfo {
        node: node_info(identity, host, "0.9.2"),
        layer: 1,
    }
}

fn gateway(identity: &str, host: &str) -> GatewayRegistrationInfo {
    GatewayRegistrationInfo {
        node: node_info(identity, host, "0.9.2"),
        clients_host: "clients.example.org:9000".to_string(),
    }
}

async fn seed(store: &MemoryStore, identity: &str, ip_version: IpVersion, up: bool, at: i64) {
    store
        .add_observation(&Observation::new(identity, ip_version, up, at))
        .await
        .unwrap();
}

// ============================================================================
// Observation pipeline
// ============================================================================

mod observation_pipeline {
    use super::*;
    use mixnet_directory::config::UptimeConfig;
    use mixnet_directory::{ReportBuilder, UptimeCalculator};

    #[tokio::test]
    async fn test_key1_windows() {
        let store = Arc::new(MemoryStore::new());
        let now = START;
        seed(&store, "key1", IpVersion::V4, false, now - 15 * NANOS_PER_MINUTE).await;
        seed(&store, "key1", IpVersion::V4, true, now - 10 * NANOS_PER_MINUTE).await;
        seed(&store, "key1", IpVersion::V4, true, now - 5 * NANOS_PER_MINUTE).await;

        let uptime = Arc::new(UptimeCalculator::new(store.clone(), UptimeConfig::default()));
        let window = UptimeWindow::Since(now - 15 * NANOS_PER_MINUTE);
        assert_eq!(uptime.compute("key1", IpVersion::V4, window).await, Uptime::Percent(66));
        assert_eq!(
            uptime.compute("key1", IpVersion::V6, window).await,
            Uptime::Empty
        );

        // The newest observation anchors the windows: only the two ups are
        // within five minutes of it
        let builder = ReportBuilder::new(uptime);
        let newest = Observation::new("key1", IpVersion::V4, true, now - 5 * NANOS_PER_MINUTE);
        let mut report = Default::default();
        builder.apply_observation(&mut report, &newest).await;

        assert_eq!(report.identity, "key1");
        assert!(report.most_recent_ipv4);
        assert_eq!(report.last_5_minutes_ipv4, 100);
        assert_eq!(report.last_hour_ipv4, 66);
        assert_eq!(report.last_5_minutes_ipv6, 0);
        assert!(!report.most_recent_ipv6);
    }

    #[tokio::test]
    async fn test_batch_down_presums_reputation_then_sweep_evicts() {
        let h = harness();
        h.service.register_mix(mix("key1", "1.1.1.1:1789")).await.unwrap();
        h.service.register_mix(mix("key2", "2.2.2.2:1789")).await.unwrap();
        h.service.set_reputation("key1", 10).await.unwrap();
        h.service.set_reputation("key2", 10).await.unwrap();

        let batch = BatchNodeStatus {
            status: vec![
                NodeStatus::new("key1", IpVersion::V4, false),
                NodeStatus::new("key1", IpVersion::V6, false),
                NodeStatus::new("key2", IpVersion::V4, true),
            ],
        };
        let reports = h.service.submit_observation_batch(batch).await.unwrap();
        assert_eq!(reports.report.len(), 2);

        // No daily uptime yet, so nothing is evicted on the request path
        let (state, node) = h.store.resolve_node("key1").await.unwrap().unwrap();
        assert_eq!(node.reputation, 6);
        assert_eq!(state, NodeState::Active);

        h.service.refresh_last_day_reports().await;

        let (state, _) = h.store.resolve_node("key1").await.unwrap().unwrap();
        assert_eq!(state, NodeState::Removed);
        let (state, node) = h.store.resolve_node("key2").await.unwrap().unwrap();
        assert_eq!(node.reputation, 11);
        assert_eq!(state, NodeState::Active);
        assert_eq!(h.service.current_mix_count(), 1);
    }

    #[tokio::test]
    async fn test_mostly_up_fresh_node_survives_first_down() {
        let h = harness();
        h.service.register_mix(mix("key1", "1.1.1.1:1789")).await.unwrap();

        let mut status = vec![NodeStatus::new("key1", IpVersion::V4, true); 19];
        status.push(NodeStatus::new("key1", IpVersion::V4, false));
        let reports = h
            .service
            .submit_observation_batch(BatchNodeStatus { status })
            .await
            .unwrap();
        assert_eq!(reports.report[0].last_hour_ipv4, 95);
        assert_eq!(reports.report[0].last_day_ipv4, 0);

        let (state, node) = h.store.resolve_node("key1").await.unwrap().unwrap();
        assert_eq!(state, NodeState::Active);
        assert_eq!(node.reputation, 17);
    }

    #[tokio::test]
    async fn test_batch_with_invalid_entry_is_rejected_whole() {
        let h = harness();
        let mut bad = NodeStatus::new("key2", IpVersion::V4, true);
        bad.up = None;
        let batch = BatchNodeStatus {
            status: vec![NodeStatus::new("key1", IpVersion::V4, true), bad],
        };

        let err = h.service.submit_observation_batch(batch).await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidInput(_)));
        assert_eq!(h.store.observation_count(), 0);
    }

    #[tokio::test]
    async fn test_ipv6_never_reported_does_not_count_as_down() {
        let h = harness();
        h.service.register_mix(mix("v4only", "3.3.3.3:1789")).await.unwrap();

        for _ in 0..3 {
            h.service
                .submit_observation(NodeStatus::new("v4only", IpVersion::V4, true))
                .await
                .unwrap();
            h.clock.advance(Duration::from_secs(60));
        }
        let refreshed = h.service.refresh_last_day_reports().await;
        assert_eq!(refreshed.report.len(), 1);
        assert_eq!(refreshed.report[0].last_day_ipv4, 100);
        assert_eq!(refreshed.report[0].last_day_ipv6, 0);

        let (state, _) = h.store.resolve_node("v4only").await.unwrap().unwrap();
        assert_eq!(state, NodeState::Active);
    }

    #[tokio::test]
    async fn test_fullreport_lists_only_non_stale() {
        let h = harness();
        seed(&h.store, "alive", IpVersion::V4, true, START).await;
        seed(&h.store, "dead", IpVersion::V4, false, START).await;
        h.service
            .submit_observation(NodeStatus::new("alive", IpVersion::V4, true))
            .await
            .unwrap();
        h.service
            .submit_observation(NodeStatus::new("dead", IpVersion::V4, false))
            .await
            .unwrap();

        h.service.refresh_last_day_reports().await;
        let full = h.service.get_non_stale_report_batch().await;
        let identities: Vec<&str> = full.report.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(identities, vec!["alive"]);
    }
}

// ============================================================================
// Registration and admission
// ============================================================================

mod registration {
    use super::*;

    #[tokio::test]
    async fn test_reregistration_single_row_later_timestamp() {
        let h = harness();
        let first = h.service.register_mix(mix("id1", "1.2.3.4:1789")).await.unwrap();
        h.clock.advance(Duration::from_millis(5));
        let second = h.service.register_mix(mix("id1", "1.2.3.4:1789")).await.unwrap();

        assert!(second.registered_at > first.registered_at);
        let topology = h.service.get_topology().await;
        assert_eq!(topology.mix_nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_two_identities_two_rows() {
        let h = harness();
        h.service.register_mix(mix("id1", "1.2.3.4:1789")).await.unwrap();
        h.service.register_gateway(gateway("id2", "5.6.7.8:1789")).await.unwrap();

        let topology = h.service.get_topology().await;
        assert_eq!(topology.mix_nodes.len(), 1);
        assert_eq!(topology.gateways.len(), 1);
        assert_eq!(h.service.current_mix_count(), 1);
        assert_eq!(h.service.current_gateway_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_then_unregister() {
        let mut config = DirectoryConfig::default();
        config.admission.max_gateways = 1;
        let h = harness_with(config);

        h.service.register_gateway(gateway("g1", "10.0.0.1")).await.unwrap();
        let err = h.service.register_gateway(gateway("g2", "10.0.0.2")).await.unwrap_err();
        match err {
            DirectoryError::Conflict(ConflictReason::AtCapacity { kind, ceiling }) => {
                assert_eq!(kind, NodeKind::Gateway);
                assert_eq!(ceiling, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        h.service.unregister_node("g1", "10.0.0.1").await.unwrap();
        h.service.register_gateway(gateway("g2", "10.0.0.2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_node_can_reregister() {
        let h = harness();
        h.service.register_mix(mix("id1", "1.2.3.4:1789")).await.unwrap();
        h.service.set_reputation("id1", 120).await.unwrap();
        h.service
            .submit_observation(NodeStatus::new("id1", IpVersion::V4, false))
            .await
            .unwrap();
        h.service.refresh_last_day_reports().await;
        assert!(h.service.get_removed_topology().await.contains("id1"));

        // The removed node no longer holds its address
        h.service.register_mix(mix("id1", "1.2.3.4:1789")).await.unwrap();
        let (state, node) = h.store.resolve_node("id1").await.unwrap().unwrap();
        assert_eq!(state, NodeState::Active);
        assert_eq!(node.reputation, 118);
    }

    #[tokio::test]
    async fn test_startup_purge_on_bootstrap() {
        let h = harness();
        let outdated = mixnet_directory::RegisteredNode::from_mix(
            MixRegistrationInfo {
                node: node_info("old", "9.9.9.9", "0.8.1"),
                layer: 2,
            },
            START,
        );
        h.store.upsert_registered_node(&outdated).await.unwrap();

        h.service.bootstrap().await.unwrap();

        assert!(h.service.get_removed_topology().await.contains("old"));
        assert!(!h.service.get_topology().await.contains("old"));
        assert_eq!(h.service.current_mix_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_set_reputation() {
        let h = harness();
        h.service.register_mix(mix("a", "10.0.0.1")).await.unwrap();
        h.service.register_mix(mix("b", "10.0.0.2")).await.unwrap();

        let mut values = HashMap::new();
        values.insert("a".to_string(), 150);
        values.insert("b".to_string(), 99);
        values.insert("ghost".to_string(), 500);
        assert_eq!(h.service.batch_set_reputation(&values).await.unwrap(), 2);

        let active = h.service.get_active_topology().await;
        assert!(active.contains("a"));
        assert!(!active.contains("b"));
    }
}

// ============================================================================
// Topology caching
// ============================================================================

mod topology_cache {
    use super::*;

    #[tokio::test]
    async fn test_topology_stale_within_ttl() {
        let h = harness();
        h.service.register_mix(mix("a", "10.0.0.1")).await.unwrap();
        assert!(h.service.get_active_topology().await.is_empty());

        // Reputation overrides do not invalidate the cache
        h.service.set_reputation("a", 100).await.unwrap();
        assert!(h.service.get_active_topology().await.is_empty());

        h.clock.advance(Duration::from_secs(31));
        assert!(h.service.get_active_topology().await.contains("a"));
    }
}

// ============================================================================
// Background jobs
// ============================================================================

mod background_jobs {
    use super::*;

    #[tokio::test]
    async fn test_daily_refresh_evicts_low_uptime() {
        let h = harness();
        h.service.register_mix(mix("flaky", "10.0.0.1")).await.unwrap();
        h.service.register_mix(mix("solid", "10.0.0.2")).await.unwrap();

        for i in 0..10 {
            seed(&h.store, "flaky", IpVersion::V4, i < 3, START - i * NANOS_PER_MINUTE).await;
            seed(&h.store, "solid", IpVersion::V4, true, START - i * NANOS_PER_MINUTE).await;
        }

        let refreshed = h.service.refresh_last_day_reports().await;
        assert_eq!(refreshed.report.len(), 2);

        let (flaky, _) = h.store.resolve_node("flaky").await.unwrap().unwrap();
        let (solid, _) = h.store.resolve_node("solid").await.unwrap().unwrap();
        assert_eq!(flaky, NodeState::Removed);
        assert_eq!(solid, NodeState::Active);
        assert_eq!(h.service.get_report("flaky").await.last_day_ipv4, 30);
    }

    #[tokio::test]
    async fn test_retention_purge() {
        let h = harness();
        seed(&h.store, "a", IpVersion::V4, true, START - 8 * 24 * 60 * NANOS_PER_MINUTE).await;
        seed(&h.store, "a", IpVersion::V4, true, START - 6 * 24 * 60 * NANOS_PER_MINUTE).await;

        assert_eq!(h.service.purge_old_observations().await.unwrap(), 1);
        assert_eq!(h.service.list_observations("a").await.len(), 1);
    }
}

// ============================================================================
// HTTP API
// ============================================================================

mod http_api {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use mixnet_directory::api::create_app;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app_from(service: Arc<DirectoryService>, caller: [u8; 4]) -> Router {
        create_app(service).layer(MockConnectInfo(SocketAddr::from((caller, 40000))))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn mix_body(identity: &str, host: &str, version: &str) -> Value {
        json!({
            "mixHost": host,
            "identityKey": identity,
            "sphinxKey": "sphinx",
            "version": version,
            "location": "<b>Lisbon</b>",
            "layer": 1
        })
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let h = harness();
        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(empty_request("GET", "/api/healthcheck"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_submission_is_local_only() {
        let h = harness();
        let status = json!({"pubKey": "key1", "ipVersion": "4", "up": true});

        let response = app_from(h.service.clone(), [203, 0, 113, 7])
            .oneshot(json_request("POST", "/api/mixmining", status.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(json_request("POST", "/api/mixmining", status))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app_from(h.service.clone(), [203, 0, 113, 7])
            .oneshot(empty_request("GET", "/api/mixmining/node/key1/report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["pubKey"], "key1");
        assert_eq!(report["mostRecentIPV4"], true);
        assert_eq!(report["last5MinutesIPV4"], 100);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(empty_request("GET", "/api/mixmining/node/nobody/report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_up_is_bad_request() {
        let h = harness();
        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(json_request(
                "POST",
                "/api/mixmining",
                json!({"pubKey": "key1", "ipVersion": "4"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.store.observation_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_and_history() {
        let h = harness();
        let batch = json!({"status": [
            {"pubKey": "key1", "ipVersion": "4", "up": true},
            {"pubKey": "key1", "ipVersion": "6", "up": true}
        ]});
        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(json_request("POST", "/api/mixmining/batch", batch))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(empty_request("GET", "/api/mixmining/node/key1/history"))
            .await
            .unwrap();
        let history = body_json(response).await;
        assert_eq!(history.as_array().map(|a| a.len()), Some(2));
    }

    #[tokio::test]
    async fn test_registration_flow() {
        let h = harness();
        let local = || app_from(h.service.clone(), [127, 0, 0, 1]);

        let response = local()
            .oneshot(json_request(
                "POST",
                "/api/mixmining/register/mix",
                mix_body("id1", "127.0.0.1:1789", "0.9.2"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let node = body_json(response).await;
        assert_eq!(node["location"], "Lisbon");

        let response = local()
            .oneshot(json_request(
                "POST",
                "/api/mixmining/register/mix",
                mix_body("id2", "127.0.0.1:1790", "0.9.2"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = local()
            .oneshot(json_request(
                "POST",
                "/api/mixmining/register/mix",
                mix_body("id3", "10.9.9.9:1789", "0.9.0"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error = body_json(response).await;
        assert!(error["error"].as_str().unwrap_or_default().contains("0.9.2"));

        let response = local()
            .oneshot(empty_request("GET", "/api/mixmining/topology"))
            .await
            .unwrap();
        let topology = body_json(response).await;
        assert_eq!(topology["mixNodes"][0]["identityKey"], "id1");

        let response = app_from(h.service.clone(), [198, 51, 100, 1])
            .oneshot(empty_request("DELETE", "/api/mixmining/register/id1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = local()
            .oneshot(empty_request("DELETE", "/api/mixmining/register/id1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.service.current_mix_count(), 0);
    }

    #[tokio::test]
    async fn test_reputation_override() {
        let h = harness();
        h.service.register_mix(mix("id1", "10.0.0.1:1789")).await.unwrap();

        let response = app_from(h.service.clone(), [198, 51, 100, 1])
            .oneshot(empty_request("PATCH", "/api/mixmining/reputation/id1?reputation=200"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(empty_request("PATCH", "/api/mixmining/reputation/id1?reputation=200"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(empty_request("PATCH", "/api/mixmining/reputation/ghost?reputation=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app_from(h.service.clone(), [127, 0, 0, 1])
            .oneshot(json_request("PATCH", "/api/mixmining/reputation", json!({"id1": 5})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["updated"], 1);

        let (_, node) = h.store.resolve_node("id1").await.unwrap().unwrap();
        assert_eq!(node.reputation, 5);
    }
}
