//! 라우팅 규칙
//!
//! 각 규칙은 분류된 문장을 받아 노드를 선택하거나 판단을 보류(`None`)합니다.
//! 보류한 규칙은 어떤 상태도 변경하지 않습니다.

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use super::balance::LoadBalancer;
use super::context::RoutingContext;
use super::error::{RouteError, RouteResult};
use super::group::RouteInfo;
use super::node::{NodeAttribute, NodeRegistry, NodeType};
use super::transaction::Transaction;
use crate::sql::{SqlAttribute, SqlClassifier};

/// 강제 라우팅 규칙 우선순위
pub const FORCE_PRIORITY: i32 = 10;
/// 노드 이름 힌트 규칙 우선순위
pub const NODE_NAME_HINT_PRIORITY: i32 = 20;
/// 라우팅 타입 힌트 규칙 우선순위
pub const ROUTING_TYPE_HINT_PRIORITY: i32 = 25;
/// 트랜잭션 규칙 우선순위
pub const TRANSACTION_PRIORITY: i32 = 30;
/// 단일 노드 규칙 우선순위
pub const SINGLE_NODE_PRIORITY: i32 = 35;
/// 읽기/쓰기 분리 규칙 우선순위
pub const READ_WRITE_SPLIT_PRIORITY: i32 = 40;
/// 속성 없는 문장 규칙 우선순위
pub const NULL_ATTRIBUTE_PRIORITY: i32 = 50;
/// 기본 노드 규칙 우선순위
pub const DEFAULT_NODE_PRIORITY: i32 = 60;

// ============================================================================
// RouteRule - 규칙 인터페이스
// ============================================================================

/// 라우팅 규칙
pub trait RouteRule: Send + Sync {
    /// 규칙 이름
    fn name(&self) -> &str;

    /// 우선순위 (낮을수록 먼저 평가)
    fn priority(&self) -> i32;

    /// 노드 선택
    ///
    /// `sql`이 `None`이면 문장 없이 라우팅하는 경우입니다.
    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>>;

    /// SQL 텍스트를 분류한 뒤 노드 선택
    fn route(&self, classifier: &SqlClassifier, sql: Option<&str>) -> RouteResult<Option<RouteInfo>> {
        let started = Instant::now();
        let attr = match sql {
            Some(sql) => classifier.classify(sql)?.map(Arc::new),
            None => None,
        };
        let node = self.routing(attr.as_ref())?;
        Ok(node.map(|node| RouteInfo::new(attr, node, self.name(), self.priority(), started)))
    }
}

/// 에러 메시지용 규칙 설명
fn describe(rule: &dyn RouteRule) -> String {
    format!("rule {}(priority {})", rule.name(), rule.priority())
}

/// 에러 메시지용 SQL 텍스트
fn sql_text(sql: Option<&Arc<SqlAttribute>>) -> &str {
    sql.map_or("", |s| s.sql())
}

/// 트랜잭션이 이미 노드에 고정되어 있는지
fn is_bound(transaction: &dyn Transaction) -> bool {
    transaction.is_active() && transaction.current_node().is_some()
}

// ============================================================================
// ForceRouteRule - 강제 라우팅
// ============================================================================

/// 라우팅 컨텍스트에 지정된 노드로 강제 라우팅
///
/// 문장에 힌트가 있거나 트랜잭션이 이미 노드에 고정되었으면 보류합니다.
pub struct ForceRouteRule {
    priority: i32,
    registry: Arc<NodeRegistry>,
    transaction: Arc<dyn Transaction>,
}

impl ForceRouteRule {
    /// 새 규칙 생성
    pub fn new(registry: Arc<NodeRegistry>, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            priority: FORCE_PRIORITY,
            registry,
            transaction,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for ForceRouteRule {
    fn name(&self) -> &str {
        "ForceRouteRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        let Some(attr) = RoutingContext::current() else {
            return Ok(None);
        };
        if attr.nodes().is_empty() || sql.map_or(false, |s| s.has_hint()) {
            return Ok(None);
        }
        if is_bound(self.transaction.as_ref()) {
            return Ok(None);
        }

        let mut candidates = Vec::with_capacity(attr.nodes().len());
        for name in attr.nodes() {
            let node = self.registry.get(name).ok_or_else(|| {
                RouteError::configuration(format!(
                    "{}: node '{}' named by the routing context does not exist, SQL [{}]",
                    describe(self),
                    name,
                    sql_text(sql)
                ))
            })?;
            candidates.push(node);
        }

        let is_write = sql.map_or(false, |s| s.is_write());
        if let (Some(cluster_name), true) = (attr.cluster(), is_write) {
            let cluster = self.registry.cluster(cluster_name).ok_or_else(|| {
                RouteError::configuration(format!(
                    "{}: cluster '{}' named by the routing context does not exist, SQL [{}]",
                    describe(self),
                    cluster_name,
                    sql_text(sql)
                ))
            })?;
            candidates.retain(|node| cluster.is_writable(node.name()));
            if candidates.is_empty() {
                return Err(RouteError::route(format!(
                    "{}: there are no available write nodes, cluster '{}' writable nodes {:?}, forced nodes {:?}, SQL [{}]",
                    describe(self),
                    cluster_name,
                    cluster.writable(),
                    attr.nodes(),
                    sql_text(sql)
                )));
            }
        }

        if candidates.len() == 1 {
            return Ok(candidates.pop());
        }

        let available: Vec<_> = candidates.iter().filter(|n| n.is_available()).cloned().collect();
        let pool = if available.is_empty() { candidates } else { available };
        let index = rand::thread_rng().gen_range(0..pool.len());
        Ok(pool.get(index).cloned())
    }
}

// ============================================================================
// NodeNameHintRule - 노드 이름 힌트
// ============================================================================

/// `nodeName` 힌트로 지정된 노드로 라우팅
pub struct NodeNameHintRule {
    priority: i32,
    registry: Arc<NodeRegistry>,
    transaction: Arc<dyn Transaction>,
}

impl NodeNameHintRule {
    /// 새 규칙 생성
    pub fn new(registry: Arc<NodeRegistry>, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            priority: NODE_NAME_HINT_PRIORITY,
            registry,
            transaction,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for NodeNameHintRule {
    fn name(&self) -> &str {
        "NodeNameHintRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        let Some(name) = sql.and_then(|s| s.hint()).and_then(|h| h.node_name()) else {
            return Ok(None);
        };

        let node = self.registry.get(name).ok_or_else(|| {
            RouteError::configuration(format!(
                "{}: node '{}' named by hint nodeName does not exist, SQL [{}]",
                describe(self),
                name,
                sql_text(sql)
            ))
        })?;

        if is_bound(self.transaction.as_ref()) {
            return Ok(None);
        }
        Ok(Some(node))
    }
}

// ============================================================================
// RoutingTypeHintRule - 라우팅 타입 힌트 (deprecated)
// ============================================================================

/// `routingType` 힌트에 해당하는 로드 밸런서로 라우팅
pub struct RoutingTypeHintRule {
    priority: i32,
    read_balancer: Arc<LoadBalancer>,
    write_balancer: Arc<LoadBalancer>,
    transaction: Arc<dyn Transaction>,
}

impl RoutingTypeHintRule {
    /// 새 규칙 생성
    pub fn new(
        read_balancer: Arc<LoadBalancer>,
        write_balancer: Arc<LoadBalancer>,
        transaction: Arc<dyn Transaction>,
    ) -> Self {
        Self {
            priority: ROUTING_TYPE_HINT_PRIORITY,
            read_balancer,
            write_balancer,
            transaction,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for RoutingTypeHintRule {
    fn name(&self) -> &str {
        "RoutingTypeHintRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        let Some(value) = sql.and_then(|s| s.hint()).and_then(|h| h.routing_type()) else {
            return Ok(None);
        };

        let node_type = NodeType::from_str(value).ok_or_else(|| {
            RouteError::configuration(format!(
                "{}: unknown routing type '{}' in hint routingType, SQL [{}]",
                describe(self),
                value,
                sql_text(sql)
            ))
        })?;

        if is_bound(self.transaction.as_ref()) {
            return Ok(None);
        }

        Ok(match node_type {
            NodeType::Read => self.read_balancer.choose(),
            NodeType::Write | NodeType::ReadWrite => self.write_balancer.choose(),
            NodeType::Independent => {
                tracing::warn!(sql = %sql_text(sql), "routingType INDEPENDENT has no load balancer, hint ignored");
                None
            }
        })
    }
}

// ============================================================================
// TransactionRouteRule - 트랜잭션 어피니티
// ============================================================================

/// 열린 트랜잭션의 모든 문장을 하나의 노드로 고정
pub struct TransactionRouteRule {
    priority: i32,
    write_balancer: Arc<LoadBalancer>,
    transaction: Arc<dyn Transaction>,
}

impl TransactionRouteRule {
    /// 새 규칙 생성
    pub fn new(write_balancer: Arc<LoadBalancer>, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            priority: TRANSACTION_PRIORITY,
            write_balancer,
            transaction,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for TransactionRouteRule {
    fn name(&self) -> &str {
        "TransactionRouteRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        if !self.transaction.is_active() {
            return Ok(None);
        }

        if let Some(bound) = self.transaction.current_node() {
            if !bound.is_available() {
                return Err(RouteError::route(format!(
                    "{}: transaction {:?} is bound to node '{}' whose state is {}, SQL [{}]",
                    describe(self),
                    self.transaction.id(),
                    bound.name(),
                    bound.state(),
                    sql_text(sql)
                )));
            }
            self.transaction.add_sql(sql.cloned());
            return Ok(Some(bound));
        }

        let Some(node) = self.write_balancer.choose() else {
            return Ok(None);
        };
        self.transaction.register_node(node.clone(), sql.cloned());
        Ok(Some(node))
    }
}

// ============================================================================
// ReadWriteSplittingRule - 읽기/쓰기 분리
// ============================================================================

/// 쓰기 문장은 쓰기 로드 밸런서로, 읽기 문장은 읽기 로드 밸런서로 라우팅
pub struct ReadWriteSplittingRule {
    priority: i32,
    read_balancer: Arc<LoadBalancer>,
    write_balancer: Arc<LoadBalancer>,
}

impl ReadWriteSplittingRule {
    /// 새 규칙 생성
    pub fn new(read_balancer: Arc<LoadBalancer>, write_balancer: Arc<LoadBalancer>) -> Self {
        Self {
            priority: READ_WRITE_SPLIT_PRIORITY,
            read_balancer,
            write_balancer,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for ReadWriteSplittingRule {
    fn name(&self) -> &str {
        "ReadWriteSplittingRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        let Some(sql) = sql else {
            return Ok(None);
        };

        if sql.is_write() {
            return Ok(self.write_balancer.choose());
        }

        match self.read_balancer.choose() {
            Some(node) => Ok(Some(node)),
            None => {
                tracing::warn!(
                    sql = %sql.sql(),
                    "no readable node available, falling back to a write node"
                );
                Ok(self.write_balancer.choose())
            }
        }
    }
}

// ============================================================================
// NullAttributeRouteRule - 속성 없는 문장
// ============================================================================

/// 분류 결과가 없는 문장을 쓰기 로드 밸런서로 라우팅
pub struct NullAttributeRouteRule {
    priority: i32,
    write_balancer: Arc<LoadBalancer>,
}

impl NullAttributeRouteRule {
    /// 새 규칙 생성
    pub fn new(write_balancer: Arc<LoadBalancer>) -> Self {
        Self {
            priority: NULL_ATTRIBUTE_PRIORITY,
            write_balancer,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for NullAttributeRouteRule {
    fn name(&self) -> &str {
        "NullAttributeRouteRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        if sql.is_some() {
            return Ok(None);
        }
        Ok(self.write_balancer.choose())
    }
}

// ============================================================================
// SingleNodeRouteRule - 단일 노드
// ============================================================================

/// 노드가 하나뿐이면 항상 그 노드로 라우팅
pub struct SingleNodeRouteRule {
    priority: i32,
    registry: Arc<NodeRegistry>,
}

impl SingleNodeRouteRule {
    /// 새 규칙 생성
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            priority: SINGLE_NODE_PRIORITY,
            registry,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for SingleNodeRouteRule {
    fn name(&self) -> &str {
        "SingleNodeRouteRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, _sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        let nodes = self.registry.nodes();
        if nodes.len() == 1 {
            return Ok(nodes.into_iter().next());
        }
        Ok(None)
    }
}

// ============================================================================
// DefaultNodeRouteRule - 기본 노드
// ============================================================================

/// 설정된 기본 노드로 라우팅
pub struct DefaultNodeRouteRule {
    priority: i32,
    registry: Arc<NodeRegistry>,
}

impl DefaultNodeRouteRule {
    /// 새 규칙 생성
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            priority: DEFAULT_NODE_PRIORITY,
            registry,
        }
    }

    /// 우선순위 변경
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl RouteRule for DefaultNodeRouteRule {
    fn name(&self) -> &str {
        "DefaultNodeRouteRule"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn routing(&self, _sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<Arc<NodeAttribute>>> {
        Ok(self.registry.default_node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::routing::cluster::Cluster;
    use crate::routing::config::{ClusterConfig, NodeConfig};
    use crate::routing::context::RouteAttribute;
    use crate::routing::node::NodeState;
    use crate::routing::transaction::LocalTransaction;

    fn registry() -> Arc<NodeRegistry> {
        let registry = Arc::new(NodeRegistry::new());
        for (name, node_type) in [
            ("write_0", NodeType::Write),
            ("write_1", NodeType::Write),
            ("read_0", NodeType::Read),
            ("read_1", NodeType::Read),
        ] {
            let config = NodeConfig::builder(name, format!("mysql://{}", name))
                .node_type(node_type)
                .weight(1.0)
                .build();
            registry.add(Arc::new(NodeAttribute::from_config(&config))).unwrap();
        }
        let cluster = Cluster::build(
            ClusterConfig::new("shop", ["write_0", "write_1", "read_0", "read_1"]),
            &registry,
        )
        .unwrap();
        registry.put_cluster(Arc::new(cluster));
        registry
    }

    fn balancers(registry: &NodeRegistry) -> (Arc<LoadBalancer>, Arc<LoadBalancer>) {
        let cluster = registry.cluster("shop").unwrap();
        (cluster.read_balancer().clone(), cluster.write_balancer().clone())
    }

    fn sql(text: &str) -> Option<Arc<SqlAttribute>> {
        SqlClassifier::default().classify(text).unwrap().map(Arc::new)
    }

    fn transaction() -> Arc<dyn Transaction> {
        Arc::new(LocalTransaction)
    }

    fn chosen(rule: &dyn RouteRule, text: &str) -> Option<String> {
        rule.routing(sql(text).as_ref())
            .unwrap()
            .map(|n| n.name().to_string())
    }

    #[test]
    fn test_force_rule_without_context() {
        let rule = ForceRouteRule::new(registry(), transaction());
        assert_eq!(chosen(&rule, "select 1"), None);
    }

    #[test]
    fn test_force_rule_empty_nodes_defers() {
        let rule = ForceRouteRule::new(registry(), transaction());
        RoutingContext::with_route(RouteAttribute::new(), || {
            assert_eq!(chosen(&rule, "select 1"), None);
        });
    }

    #[test]
    fn test_force_rule_single_node_deterministic() {
        let rule = ForceRouteRule::new(registry(), transaction());
        RoutingContext::with_route(RouteAttribute::with_nodes(["read_1"]), || {
            for _ in 0..20 {
                assert_eq!(chosen(&rule, "insert into t values (1)"), Some("read_1".to_string()));
            }
        });
    }

    #[test]
    fn test_force_rule_multiple_nodes_random() {
        let rule = ForceRouteRule::new(registry(), transaction());
        RoutingContext::with_route(RouteAttribute::with_nodes(["read_0", "read_1"]), || {
            let seen: HashSet<String> = (0..200).filter_map(|_| chosen(&rule, "select 1")).collect();
            assert_eq!(seen.len(), 2);
        });
    }

    #[test]
    fn test_force_rule_defers_to_hint() {
        let rule = ForceRouteRule::new(registry(), transaction());
        RoutingContext::with_route(RouteAttribute::with_nodes(["read_1"]), || {
            assert_eq!(chosen(&rule, "/*!nodeName=write_0*/ select 1"), None);
        });
    }

    #[test]
    fn test_force_rule_unknown_node() {
        let rule = ForceRouteRule::new(registry(), transaction());
        RoutingContext::with_route(RouteAttribute::with_nodes(["ghost"]), || {
            let err = rule.routing(sql("select 1").as_ref()).unwrap_err();
            assert!(err.is_configuration());
            assert!(err.to_string().contains("ghost"));
            assert!(err.to_string().contains("priority 10"));
        });
    }

    #[test]
    fn test_force_rule_write_intersects_cluster_writable() {
        let rule = ForceRouteRule::new(registry(), transaction());
        let attr = RouteAttribute::with_nodes(["read_0", "write_1"]).with_cluster("shop");
        RoutingContext::with_route(attr, || {
            for _ in 0..20 {
                assert_eq!(chosen(&rule, "update t set a = 1"), Some("write_1".to_string()));
            }
        });
    }

    #[test]
    fn test_force_rule_write_without_writable_fails() {
        let rule = ForceRouteRule::new(registry(), transaction());
        let attr = RouteAttribute::with_nodes(["read_0"]).with_cluster("shop");
        RoutingContext::with_route(attr, || {
            let err = rule.routing(sql("delete from t").as_ref()).unwrap_err();
            assert!(err.is_route());
            assert!(err.to_string().contains("no available write nodes"));

            // 읽기 문장은 교집합을 적용하지 않음
            assert_eq!(chosen(&rule, "select * from t"), Some("read_0".to_string()));
        });
    }

    #[test]
    fn test_node_name_hint_rule() {
        let rule = NodeNameHintRule::new(registry(), transaction());
        assert_eq!(
            chosen(&rule, "/*!nodeName=read_1;*/ update t set a = 1"),
            Some("read_1".to_string())
        );
        assert_eq!(chosen(&rule, "select 1"), None);
        assert!(rule.routing(None).unwrap().is_none());
    }

    #[test]
    fn test_node_name_hint_unknown_node() {
        let rule = NodeNameHintRule::new(registry(), transaction());
        let err = rule
            .routing(sql("/*!nodeName=write_9*/ select 1").as_ref())
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("write_9"));
    }

    #[test]
    fn test_routing_type_hint_rule() {
        let registry = registry();
        let (read, write) = balancers(&registry);
        let rule = RoutingTypeHintRule::new(read, write, transaction());

        for _ in 0..20 {
            let node = chosen(&rule, "/*!routingType=READ*/ update t set a = 1").unwrap();
            assert!(node.starts_with("read_"));
            let node = chosen(&rule, "/*!routingType=write*/ select 1").unwrap();
            assert!(node.starts_with("write_"));
        }

        let err = rule
            .routing(sql("/*!routingType=SIDEWAYS*/ select 1").as_ref())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_transaction_rule_inactive_defers() {
        let registry = registry();
        let (_, write) = balancers(&registry);
        let rule = TransactionRouteRule::new(write, transaction());
        assert_eq!(chosen(&rule, "select 1"), None);
    }

    #[test]
    fn test_transaction_rule_sticky() {
        let registry = registry();
        let (_, write) = balancers(&registry);
        let tx = transaction();
        let rule = TransactionRouteRule::new(write, tx.clone());

        let _guard = LocalTransaction::begin(Some("tx"), false);
        let first = chosen(&rule, "insert into t values (1)").unwrap();
        assert!(first.starts_with("write_"));

        for _ in 0..50 {
            assert_eq!(chosen(&rule, "select * from t").unwrap(), first);
        }
        assert_eq!(tx.current_node().unwrap().name(), first);
        assert_eq!(LocalTransaction::statements().len(), 51);
    }

    #[test]
    fn test_transaction_rule_bound_node_down() {
        let registry = registry();
        let (_, write) = balancers(&registry);
        let rule = TransactionRouteRule::new(write, transaction());

        let _guard = LocalTransaction::begin(None, false);
        let first = chosen(&rule, "insert into t values (1)").unwrap();
        registry.get(&first).unwrap().set_state(NodeState::Down);

        let err = rule.routing(sql("select 1").as_ref()).unwrap_err();
        assert!(err.is_route());
        assert!(err.to_string().contains(&first));
    }

    #[test]
    fn test_transaction_rule_empty_balancer_has_no_side_effect() {
        let rule = TransactionRouteRule::new(Arc::new(LoadBalancer::weight_random()), transaction());
        let _guard = LocalTransaction::begin(None, false);

        assert_eq!(chosen(&rule, "insert into t values (1)"), None);
        assert!(LocalTransaction.current_node().is_none());
        assert!(LocalTransaction::statements().is_empty());
    }

    #[test]
    fn test_read_write_split_never_reads_for_writes() {
        let registry = registry();
        let (read, write) = balancers(&registry);
        let rule = ReadWriteSplittingRule::new(read, write);

        for text in ["insert into t values (1)", "update t set a = 1", "delete from t", "create table x (id int)"] {
            for _ in 0..20 {
                assert!(chosen(&rule, text).unwrap().starts_with("write_"));
            }
        }
        for _ in 0..20 {
            assert!(chosen(&rule, "select * from t").unwrap().starts_with("read_"));
        }
    }

    #[test]
    fn test_read_write_split_read_falls_back_to_write() {
        let registry = registry();
        let (read, write) = balancers(&registry);
        for name in ["read_0", "read_1"] {
            registry.get(name).unwrap().set_state(NodeState::Down);
        }
        let rule = ReadWriteSplittingRule::new(read, write);

        assert!(chosen(&rule, "select 1").unwrap().starts_with("write_"));
        assert!(rule.routing(None).unwrap().is_none());
    }

    #[test]
    fn test_null_attribute_rule() {
        let registry = registry();
        let (_, write) = balancers(&registry);
        let rule = NullAttributeRouteRule::new(write);

        assert!(rule.routing(None).unwrap().unwrap().name().starts_with("write_"));
        assert_eq!(chosen(&rule, "select 1"), None);
    }

    #[test]
    fn test_single_node_rule() {
        let registry = Arc::new(NodeRegistry::new());
        let rule = SingleNodeRouteRule::new(registry.clone());
        assert!(rule.routing(None).unwrap().is_none());

        registry.add(Arc::new(NodeAttribute::new("only", "u"))).unwrap();
        assert_eq!(chosen(&rule, "select 1"), Some("only".to_string()));
        assert_eq!(chosen(&rule, "insert into t values (1)"), Some("only".to_string()));

        registry.add(Arc::new(NodeAttribute::new("second", "u"))).unwrap();
        assert_eq!(chosen(&rule, "select 1"), None);
    }

    #[test]
    fn test_default_node_rule() {
        let registry = registry();
        let rule = DefaultNodeRouteRule::new(registry.clone());
        assert_eq!(chosen(&rule, "select 1"), None);

        registry.set_default_node(Some("write_1".to_string()));
        assert_eq!(chosen(&rule, "select 1"), Some("write_1".to_string()));
    }

    #[test]
    fn test_rule_route_wrapper() {
        let registry = registry();
        let rule = NodeNameHintRule::new(registry, transaction()).with_priority(5);

        let info = rule
            .route(&SqlClassifier::default(), Some("/*!nodeName=read_0*/ select 1"))
            .unwrap()
            .unwrap();
        assert_eq!(info.hit_node().name(), "read_0");
        assert_eq!(info.hit_rule(), ("NodeNameHintRule", 5));
        assert_eq!(info.sql().unwrap().native_sql(), "select 1");

        assert!(rule.route(&SqlClassifier::default(), None).unwrap().is_none());
    }
}
