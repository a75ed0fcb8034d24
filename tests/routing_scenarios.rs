//! SqlRouter end-to-end scenarios

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use sqlroute::routing::{NodeState, RouteGroup, RuleHit};
use sqlroute::{
    ClusterConfig, FailBehavior, LocalTransaction, NodeAttribute, NodeConfig, NodeProbe,
    NodeType, RouteAttribute, RouteError, RouteInfo, RouteResult, RouterConfig, RoutingContext,
    RoutingListener, SqlAttribute, SqlRouter, Transaction,
};

fn node(name: &str, node_type: NodeType) -> NodeConfig {
    NodeConfig::builder(name, format!("mysql://{}/shop", name))
        .database_type("mysql")
        .node_type(node_type)
        .weight(1.0)
        .build()
}

/// write_0, write_1, read_0, read_1 (클러스터 없음)
fn flat_router() -> SqlRouter {
    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .node(node("write_1", NodeType::Write))
        .node(node("read_0", NodeType::Read))
        .node(node("read_1", NodeType::Read))
        .build()
        .unwrap();
    SqlRouter::new(config).unwrap()
}

/// 기본 클러스터 shop(write_0, read_0) + 클러스터 밖 archive
fn cluster_router() -> SqlRouter {
    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .node(node("read_0", NodeType::Read))
        .node(node("archive", NodeType::ReadWrite))
        .node(node("report_w", NodeType::Write))
        .node(node("report_r", NodeType::Read))
        .cluster(ClusterConfig::new("shop", ["write_0", "read_0"]).with_default())
        .cluster(ClusterConfig::new("report", ["report_w", "report_r"]))
        .build()
        .unwrap();
    SqlRouter::new(config).unwrap()
}

fn routed(router: &SqlRouter, sql: &str) -> String {
    router.route(Some(sql)).unwrap().node_name().to_string()
}

// ============================================================================
// 기본 시나리오
// ============================================================================

#[test]
fn test_single_node_routes_everything() {
    let config = RouterConfig::builder()
        .node(NodeConfig::builder("only", "mysql://only").node_type(NodeType::Read).build())
        .build()
        .unwrap();
    let router = SqlRouter::new(config).unwrap();

    for sql in ["select * from t", "insert into t values (1)", "delete from t", "show tables"] {
        let info = router.route(Some(sql)).unwrap();
        assert_eq!(info.node_name(), "only");
        assert_eq!(info.hit_rule().0, "SingleNodeRouteRule");
    }

    let info = router.route(None).unwrap();
    assert_eq!(info.node_name(), "only");
}

#[test]
fn test_hint_naming_missing_node_is_configuration_error() {
    let router = flat_router();
    let err = router
        .route(Some("/*!nodeName=write_9;*/ select * from t"))
        .unwrap_err();

    assert!(matches!(err, RouteError::Configuration(_)));
    assert!(err.to_string().contains("write_9"));
    assert_eq!(router.metrics().failed, 1);
}

#[test]
fn test_hint_routes_and_strips() {
    let router = flat_router();
    let info = router
        .route(Some("/*!nodeName=read_1;*/ update t set a = 1"))
        .unwrap();

    assert_eq!(info.node_name(), "read_1");
    assert_eq!(info.hit_rule(), ("NodeNameHintRule", 20));
    assert_eq!(info.sql().unwrap().native_sql(), "update t set a = 1");
}

#[test]
fn test_hint_text_inside_literal_is_ignored() {
    let router = flat_router();
    let sql = "update t set note = '/*!nodeName=ghost*/' where id = 1";
    let info = router.route(Some(sql)).unwrap();

    assert!(info.node_name().starts_with("write_"));
    assert_eq!(info.hit_rule().0, "ReadWriteSplittingRule");
    assert_eq!(info.sql().unwrap().native_sql(), sql);
    assert!(!info.sql().unwrap().has_hint());
}

#[test]
fn test_writes_never_hit_read_nodes() {
    let router = flat_router();
    let writes = [
        "insert into orders (id) values (1)",
        "update orders set state = 'PAID' where id = 1",
        "delete from orders where id = 1",
        "create table archive (id int)",
        "insert into archive select * from orders",
    ];
    for sql in writes {
        for _ in 0..50 {
            assert!(routed(&router, sql).starts_with("write_"), "{} went to a read node", sql);
        }
    }

    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.insert(routed(&router, "select * from orders"));
    }
    assert_eq!(seen, HashSet::from(["read_0".to_string(), "read_1".to_string()]));
}

#[test]
fn test_read_falls_back_to_write() {
    let router = flat_router();
    router.set_node_state("read_0", "DOWN").unwrap();
    router.set_node_state("read_1", "down").unwrap();

    for _ in 0..20 {
        assert!(routed(&router, "select 1").starts_with("write_"));
    }

    router.set_node_state("read_1", "up").unwrap();
    assert_eq!(routed(&router, "select 1"), "read_1");
}

#[test]
fn test_chain_exhaustion_is_route_error() {
    let router = flat_router();
    for name in ["write_0", "write_1", "read_0", "read_1"] {
        router.set_node_state(name, "DOWN").unwrap();
    }

    let err = router.route(Some("select * from t")).unwrap_err();
    assert!(err.is_route());
    assert!(err
        .to_string()
        .contains("Not routed to any available node, please check the health status of the nodes"));
    assert!(err.to_string().contains("select * from t"));
}

#[test]
fn test_default_node_as_last_resort() {
    let config = RouterConfig::builder()
        .node(node("read_0", NodeType::Read))
        .node(node("solo", NodeType::Independent))
        .default_node("read_0")
        .build()
        .unwrap();
    let router = SqlRouter::new(config).unwrap();

    router.set_node_state("solo", "DOWN").unwrap();
    // 쓰기 가능 노드가 모두 DOWN이면 기본 노드
    let info = router.route(Some("insert into t values (1)")).unwrap();
    assert_eq!(info.node_name(), "read_0");
    assert_eq!(info.hit_rule().0, "DefaultNodeRouteRule");
}

#[test]
fn test_unparseable_sql_fails_open_to_write() {
    let router = flat_router();
    for _ in 0..20 {
        let info = router.route(Some("selec * frm where")).unwrap();
        assert!(info.node_name().starts_with("write_"));
        assert!(info.sql().unwrap().is_write());
    }

    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .fail_behavior(FailBehavior::Failing)
        .build()
        .unwrap();
    let strict = SqlRouter::new(config).unwrap();
    assert!(strict.route(Some("selec * frm where")).unwrap_err().is_parse());
    assert!(strict.route(Some("/*!nodeName*/ select 1")).unwrap_err().is_parse());
}

// ============================================================================
// 강제 라우팅 / 컨텍스트
// ============================================================================

#[test]
fn test_force_rule_boundaries() {
    let router = flat_router();

    // 빈 노드 목록은 판단 보류
    RoutingContext::with_route(RouteAttribute::new(), || {
        assert!(routed(&router, "insert into t values (1)").starts_with("write_"));
    });

    // 노드 하나는 항상 같은 노드
    RoutingContext::with_route(RouteAttribute::with_nodes(["read_1"]), || {
        for _ in 0..30 {
            let info = router.route(Some("insert into t values (1)")).unwrap();
            assert_eq!(info.node_name(), "read_1");
            assert_eq!(info.hit_rule(), ("ForceRouteRule", 10));
        }
    });

    assert!(RoutingContext::current().is_none());
}

#[test]
fn test_force_with_cluster_intersects_writable() {
    let router = cluster_router();

    let attr = RouteAttribute::with_nodes(["report_r", "report_w"]).with_cluster("report");
    RoutingContext::with_route(attr, || {
        for _ in 0..30 {
            let info = router.route(Some("update t set a = 1")).unwrap();
            assert_eq!(info.node_name(), "report_w");
            assert_eq!(info.cluster(), Some("report"));
        }
    });

    let attr = RouteAttribute::with_nodes(["report_r"]).with_cluster("report");
    let err = RoutingContext::with_route(attr, || router.route(Some("delete from t"))).unwrap_err();
    assert!(err.is_route());
    assert!(err.to_string().contains("priority 10"));
}

#[test]
fn test_scoped_override_restores() {
    let router = cluster_router();

    let node = RoutingContext::execute_on(["archive"], || routed(&router, "select 1")).unwrap();
    assert_eq!(node, "archive");
    assert!(RoutingContext::current().is_none());
    assert_eq!(routed(&router, "select 1"), "read_0");

    let err = RoutingContext::execute_on(Vec::<String>::new(), || 0).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_cluster_selection() {
    let router = cluster_router();

    // 기본 클러스터
    let info = router.route(Some("select 1")).unwrap();
    assert_eq!(info.cluster(), Some("shop"));
    assert_eq!(info.node_name(), "read_0");

    // 컨텍스트 클러스터
    let info = RoutingContext::with_route(RouteAttribute::new().with_cluster("report"), || {
        router.route(Some("select 1")).unwrap()
    });
    assert_eq!(info.cluster(), Some("report"));
    assert_eq!(info.node_name(), "report_r");
    assert_eq!(info.hit_group(), Some("report"));

    // 없는 클러스터
    let err = RoutingContext::with_route(RouteAttribute::new().with_cluster("ghost"), || {
        router.route(Some("select 1"))
    })
    .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_cluster_routing_never_leaves_cluster() {
    let router = cluster_router();
    let report: HashSet<&str> = ["report_w", "report_r"].into_iter().collect();

    let in_report = |sql: &str| {
        RoutingContext::with_route(RouteAttribute::new().with_cluster("report"), || router.route(Some(sql)))
    };
    for _ in 0..20 {
        assert!(report.contains(in_report("select 1").unwrap().node_name()));
        assert!(report.contains(in_report("update t set a = 1").unwrap().node_name()));
    }

    // 기본 클러스터의 쓰기 노드 장애
    router.set_node_state("write_0", "DOWN").unwrap();
    let err = router.route(Some("insert into orders values (1)")).unwrap_err();
    assert!(err.is_route());
    assert!(err.to_string().contains("shop"));

    // 읽기는 클러스터 안의 쓰기 노드로만 대체
    router.set_node_state("write_0", "UP").unwrap();
    router.set_node_state("read_0", "DOWN").unwrap();
    assert_eq!(routed(&router, "select 1"), "write_0");
    router.set_node_state("write_0", "DOWN").unwrap();
    assert!(router.route(Some("select 1")).unwrap_err().is_route());
}

#[test]
fn test_cluster_transaction_is_not_bound_outside_cluster() {
    let router = cluster_router();
    router.set_node_state("report_w", "DOWN").unwrap();

    let _tx = LocalTransaction::begin(Some("report"), false);
    let in_report = |sql: &str| {
        RoutingContext::with_route(RouteAttribute::new().with_cluster("report"), || router.route(Some(sql)))
    };

    assert!(in_report("update t set a = 1").unwrap_err().is_route());
    assert!(LocalTransaction.current_node().is_none());

    router.set_node_state("report_w", "UP").unwrap();
    assert_eq!(in_report("update t set a = 1").unwrap().node_name(), "report_w");
    for _ in 0..5 {
        let info = in_report("select 1").unwrap();
        assert_eq!(info.node_name(), "report_w");
        assert_eq!(info.hit_rule().0, "TransactionRouteRule");
    }
}

#[test]
fn test_nested_propagation_through_router() {
    let router = cluster_router();

    let _a = RoutingContext::enter(RouteAttribute::new().with_cluster("report"));
    assert_eq!(routed(&router, "select 1"), "report_r");
    {
        let _b = RoutingContext::enter(RouteAttribute::with_nodes(["archive"]).with_propagation(false));
        {
            let _c = RoutingContext::enter(RouteAttribute::new());
            assert_eq!(routed(&router, "select 1"), "archive");
        }
        assert_eq!(routed(&router, "select 1"), "archive");
    }
    assert_eq!(routed(&router, "select 1"), "report_r");
    drop(_a);

    assert!(RoutingContext::current().is_none());
    assert_eq!(routed(&router, "select 1"), "read_0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_task_scopes_do_not_leak() {
    let router = Arc::new(cluster_router());

    let mut handles = Vec::new();
    for i in 0..16 {
        let router = router.clone();
        let forced = i % 2 == 0;
        let task = async move {
            tokio::task::yield_now().await;
            let node = router.route(Some("select 1")).unwrap().node_name().to_string();
            (forced, node)
        };
        handles.push(if forced {
            tokio::spawn(RoutingContext::scope_with(RouteAttribute::with_nodes(["archive"]), task))
        } else {
            tokio::spawn(RoutingContext::scope(task))
        });
    }

    for handle in handles {
        let (forced, node) = handle.await.unwrap();
        if forced {
            assert_eq!(node, "archive");
        } else {
            assert_eq!(node, "read_0");
        }
    }
}

// ============================================================================
// 트랜잭션
// ============================================================================

#[test]
fn test_transaction_is_sticky() {
    let router = flat_router();

    for _ in 0..10 {
        let tx = LocalTransaction::begin(Some("checkout"), false);
        let first = router.route(Some("insert into orders values (1)")).unwrap();
        assert!(first.in_transaction());
        assert_eq!(first.transaction_name(), Some("checkout"));

        for sql in ["select * from orders", "update stock set qty = 1", "select 1"] {
            for _ in 0..10 {
                let info = router.route(Some(sql)).unwrap();
                assert_eq!(info.node_name(), first.node_name());
                assert_eq!(info.transaction_id(), first.transaction_id());
            }
        }
        assert_eq!(LocalTransaction::statements().len(), 31);
        tx.commit();
    }

    assert!(!router.route(Some("select 1")).unwrap().in_transaction());
}

#[test]
fn test_transaction_binds_hinted_first_node() {
    let router = flat_router();
    let _tx = LocalTransaction::begin(None, false);

    let first = router.route(Some("/*!nodeName=read_1*/ select 1")).unwrap();
    assert_eq!(first.node_name(), "read_1");

    // 고정 후에는 힌트보다 트랜잭션이 우선
    let next = router.route(Some("/*!nodeName=write_0*/ update t set a = 1")).unwrap();
    assert_eq!(next.node_name(), "read_1");
    assert_eq!(next.hit_rule().0, "TransactionRouteRule");
}

#[test]
fn test_transaction_bound_node_down_fails() {
    let router = flat_router();
    let _tx = LocalTransaction::begin(None, false);

    let first = router.route(Some("insert into t values (1)")).unwrap();
    router.set_node_state(first.node_name(), "DOWN").unwrap();

    let err = router.route(Some("select 1")).unwrap_err();
    assert!(err.is_route());
    assert!(err.to_string().contains(first.node_name()));
}

/// 외부 트랜잭션 관리자를 흉내내는 구현
#[derive(Default)]
struct ManagedTransaction {
    active: std::sync::atomic::AtomicBool,
    node: Mutex<Option<Arc<NodeAttribute>>>,
    statements: Mutex<Vec<Arc<SqlAttribute>>>,
}

impl Transaction for ManagedTransaction {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn current_node(&self) -> Option<Arc<NodeAttribute>> {
        self.node.lock().clone()
    }

    fn register_node(&self, node: Arc<NodeAttribute>, sql: Option<Arc<SqlAttribute>>) {
        self.node.lock().get_or_insert(node);
        self.statements.lock().extend(sql);
    }

    fn add_sql(&self, sql: Option<Arc<SqlAttribute>>) {
        self.statements.lock().extend(sql);
    }
}

#[test]
fn test_injected_transaction() {
    let tx = Arc::new(ManagedTransaction::default());
    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .node(node("write_1", NodeType::Write))
        .build()
        .unwrap();
    let router = SqlRouter::builder(config).with_transaction(tx.clone()).build().unwrap();

    tx.active.store(true, Ordering::SeqCst);
    let first = routed(&router, "insert into t values (1)");
    for _ in 0..20 {
        assert_eq!(routed(&router, "update t set a = 2"), first);
    }
    assert_eq!(tx.statements.lock().len(), 21);
}

// ============================================================================
// 리스너 / 사용자 그룹
// ============================================================================

#[derive(Default)]
struct CountingListener {
    before: AtomicUsize,
    ok: AtomicUsize,
    failed: AtomicUsize,
}

impl RoutingListener for CountingListener {
    fn on_before_routing(&self, _sql: Option<&str>) {
        self.before.fetch_add(1, Ordering::SeqCst);
    }

    fn on_after_routing(&self, _sql: Option<&str>, result: Result<&RouteInfo, &RouteError>) {
        match result {
            Ok(_) => self.ok.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }
}

#[test]
fn test_listener_sees_every_route() {
    let listener = Arc::new(CountingListener::default());
    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .build()
        .unwrap();
    let router = SqlRouter::builder(config)
        .with_listener(listener.clone())
        .build()
        .unwrap();
    assert_eq!(router.listener_count(), 2);

    router.route(Some("select 1")).unwrap();
    router.route(None).unwrap();
    router.route(Some("/*!nodeName=nope*/ select 1")).unwrap_err();

    assert_eq!(listener.before.load(Ordering::SeqCst), 3);
    assert_eq!(listener.ok.load(Ordering::SeqCst), 2);
    assert_eq!(listener.failed.load(Ordering::SeqCst), 1);
}

/// 감사 테이블 쓰기를 archive로 보내는 사용자 그룹
struct AuditGroup {
    router_nodes: Vec<Arc<NodeAttribute>>,
}

impl RouteGroup for AuditGroup {
    fn name(&self) -> &str {
        "audit"
    }

    fn route(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<RuleHit>> {
        let Some(sql) = sql else {
            return Ok(None);
        };
        if sql.write_tables().iter().any(|t| t.name() == "audit_log") {
            return Ok(self.router_nodes.first().map(|node| RuleHit {
                node: node.clone(),
                rule: "AuditRule".to_string(),
                priority: 0,
            }));
        }
        Ok(None)
    }
}

#[test]
fn test_custom_group_runs_first() {
    let archive = Arc::new(NodeAttribute::new("archive", "mysql://archive"));
    let config = RouterConfig::builder()
        .node(node("write_0", NodeType::Write))
        .node(node("read_0", NodeType::Read))
        .cluster(ClusterConfig::new("shop", ["write_0", "read_0"]).with_default())
        .build()
        .unwrap();
    let router = SqlRouter::builder(config)
        .with_group(Arc::new(AuditGroup {
            router_nodes: vec![archive],
        }))
        .build()
        .unwrap();

    assert_eq!(router.chain_groups(Some("shop")).unwrap(), vec!["audit", "shop"]);

    let info = router.route(Some("insert into audit_log values (1)")).unwrap();
    assert_eq!(info.node_name(), "archive");
    assert_eq!(info.hit_group(), Some("audit"));

    assert_eq!(routed(&router, "insert into orders values (1)"), "write_0");
}

// ============================================================================
// 설정 / 관리 작업
// ============================================================================

#[test]
fn test_router_from_toml() {
    let config = RouterConfig::from_toml_str(
        r#"
default_node = "write_0"

[sql_parsing]
fail_behavior = "WARNING"

[[nodes]]
name = "write_0"
url = "mysql://10.0.0.1:3306/shop"
node_type = "WRITE"
weight = 1.0

[[nodes]]
name = "read_0"
url = "mysql://10.0.0.2:3306/shop"
node_type = "READ"
weight = 1.0

[[clusters]]
name = "shop"
nodes = ["write_0", "read_0"]
default = true
"#,
        "router.toml",
    )
    .unwrap();
    let router = SqlRouter::new(config).unwrap();

    assert_eq!(routed(&router, "select * from orders"), "read_0");
    assert_eq!(routed(&router, "insert into orders values (1)"), "write_0");

    let err = RouterConfig::from_toml_str("[[nodes]]\nname = 1\n", "broken.toml").unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_admin_changes_are_visible_to_routing() {
    let router = cluster_router();

    router.add_node(node("read_1", NodeType::Read)).unwrap();
    router.add_node_to_cluster("shop", "read_1").unwrap();
    router.set_node_state("read_0", "DOWN").unwrap();
    assert_eq!(routed(&router, "select 1"), "read_1");

    router.set_node_state("read_0", "UP").unwrap();
    router.set_node_weight("read_1", 0.0).unwrap();
    for _ in 0..50 {
        assert_eq!(routed(&router, "select 1"), "read_0");
    }

    router.remove_node("read_0").unwrap();
    assert_eq!(routed(&router, "select 1"), "read_1");
    assert!(router.nodes().iter().all(|n| n.name != "read_0"));

    let snapshot = router.nodes().into_iter().find(|n| n.name == "read_1").unwrap();
    assert_eq!(snapshot.state, NodeState::Up);
}

// ============================================================================
// 헬스 모니터
// ============================================================================

/// 이름으로 장애를 지정하는 프로브
#[derive(Default)]
struct NamedProbe {
    failing: Mutex<HashSet<String>>,
}

impl NodeProbe for NamedProbe {
    fn probe<'a>(&'a self, node: &'a NodeAttribute, _sql: &'a str) -> BoxFuture<'a, RouteResult<()>> {
        Box::pin(async move {
            if self.failing.lock().contains(node.name()) {
                Err(RouteError::probe(node.name(), "connection refused"))
            } else {
                Ok(())
            }
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_monitor_drives_routing() {
    let heartbeat = |config: NodeConfig| NodeConfig {
        heartbeat_sql: Some("SELECT 1".to_string()),
        heartbeat_interval_ms: 1_000,
        ..config
    };
    let probe = Arc::new(NamedProbe::default());
    probe.failing.lock().insert("read_0".to_string());

    let config = RouterConfig::builder()
        .node(heartbeat(node("write_0", NodeType::Write)))
        .node(heartbeat(node("read_0", NodeType::Read)))
        .probe_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let router = SqlRouter::builder(config).with_probe(probe.clone()).build().unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(router.node("read_0").unwrap().state(), NodeState::Down);
    assert_eq!(router.node("write_0").unwrap().state(), NodeState::Up);
    assert_eq!(routed(&router, "select 1"), "write_0");

    probe.failing.lock().clear();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(routed(&router, "select 1"), "read_0");

    router.remove_node("read_0").unwrap();
    let monitor = router.monitor().unwrap();
    assert!(!monitor.is_monitored("read_0"));
    assert!(monitor.is_monitored("write_0"));
    router.shutdown();
    assert!(monitor.monitored().is_empty());
}
