//! 라우팅 그룹
//!
//! 규칙을 우선순위 순으로 평가하는 그룹과, 여러 그룹을 순서대로 시도하는
//! 복합 그룹을 제공합니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::balance::LoadBalancer;
use super::cluster::Cluster;
use super::error::{RouteError, RouteResult};
use super::node::{NodeAttribute, NodeRegistry};
use super::rule::{
    DefaultNodeRouteRule, ForceRouteRule, NodeNameHintRule, NullAttributeRouteRule,
    ReadWriteSplittingRule, RouteRule, RoutingTypeHintRule, SingleNodeRouteRule,
    TransactionRouteRule,
};
use super::transaction::Transaction;
use crate::sql::SqlAttribute;

/// 클러스터 없이 라우팅하는 기본 그룹 이름
pub const DEFAULT_GROUP_NAME: &str = "default";

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// RouteInfo - 라우팅 결과
// ============================================================================

/// 라우팅 결과
#[derive(Clone)]
pub struct RouteInfo {
    pub(crate) route_id: u64,
    pub(crate) sql: Option<Arc<SqlAttribute>>,
    pub(crate) hit_node: Arc<NodeAttribute>,
    pub(crate) cluster: Option<String>,
    pub(crate) hit_group: Option<String>,
    pub(crate) hit_rule: String,
    pub(crate) hit_priority: i32,
    pub(crate) transaction_active: bool,
    pub(crate) transaction_name: Option<String>,
    pub(crate) transaction_id: Option<u64>,
    pub(crate) routed_at: DateTime<Utc>,
    pub(crate) started: Instant,
    pub(crate) finished: Instant,
}

impl RouteInfo {
    pub(crate) fn new(
        sql: Option<Arc<SqlAttribute>>,
        hit_node: Arc<NodeAttribute>,
        rule: &str,
        priority: i32,
        started: Instant,
    ) -> Self {
        Self {
            route_id: NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed),
            sql,
            hit_node,
            cluster: None,
            hit_group: None,
            hit_rule: rule.to_string(),
            hit_priority: priority,
            transaction_active: false,
            transaction_name: None,
            transaction_id: None,
            routed_at: Utc::now(),
            started,
            finished: Instant::now(),
        }
    }

    pub(crate) fn with_transaction(mut self, transaction: &dyn Transaction) -> Self {
        self.transaction_active = transaction.is_active();
        if self.transaction_active {
            self.transaction_name = transaction.name();
            self.transaction_id = transaction.id();
        }
        self
    }

    /// 라우팅 ID (프로세스 내 고유)
    pub fn route_id(&self) -> u64 {
        self.route_id
    }

    /// 분류된 문장 (문장 없이 라우팅했으면 `None`)
    pub fn sql(&self) -> Option<&Arc<SqlAttribute>> {
        self.sql.as_ref()
    }

    /// 선택된 노드
    pub fn hit_node(&self) -> &Arc<NodeAttribute> {
        &self.hit_node
    }

    /// 선택된 노드 이름
    pub fn node_name(&self) -> &str {
        self.hit_node.name()
    }

    /// 사용된 클러스터
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// 결정한 그룹
    pub fn hit_group(&self) -> Option<&str> {
        self.hit_group.as_deref()
    }

    /// 결정한 규칙 (이름, 우선순위)
    pub fn hit_rule(&self) -> (&str, i32) {
        (self.hit_rule.as_str(), self.hit_priority)
    }

    /// 트랜잭션 안에서 라우팅되었는지
    pub fn in_transaction(&self) -> bool {
        self.transaction_active
    }

    /// 트랜잭션 이름
    pub fn transaction_name(&self) -> Option<&str> {
        self.transaction_name.as_deref()
    }

    /// 트랜잭션 ID
    pub fn transaction_id(&self) -> Option<u64> {
        self.transaction_id
    }

    /// 라우팅 완료 시각
    pub fn routed_at(&self) -> DateTime<Utc> {
        self.routed_at
    }

    /// 라우팅 소요 시간
    pub fn elapsed(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }
}

impl fmt::Debug for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteInfo")
            .field("route_id", &self.route_id)
            .field("sql", &self.sql.as_ref().map(|s| s.sql()))
            .field("node", &self.hit_node.name())
            .field("cluster", &self.cluster)
            .field("group", &self.hit_group)
            .field("rule", &self.hit_rule)
            .field("priority", &self.hit_priority)
            .field("transaction_id", &self.transaction_id)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// 그룹 안에서 노드를 결정한 규칙
#[derive(Debug, Clone)]
pub struct RuleHit {
    /// 선택된 노드
    pub node: Arc<NodeAttribute>,
    /// 규칙 이름
    pub rule: String,
    /// 규칙 우선순위
    pub priority: i32,
}

// ============================================================================
// RouteGroup - 그룹 인터페이스
// ============================================================================

/// 라우팅 그룹
pub trait RouteGroup: Send + Sync {
    /// 그룹 이름
    fn name(&self) -> &str;

    /// 규칙을 평가하여 가용 노드를 결정
    fn route(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<RuleHit>>;
}

// ============================================================================
// RuleRouteGroup - 규칙 그룹
// ============================================================================

/// 우선순위 순으로 규칙을 평가하는 그룹
///
/// 규칙이 고른 노드가 가용하지 않으면 경고 후 다음 규칙으로 넘어갑니다.
/// 열린 트랜잭션의 첫 문장이면 선택된 노드를 트랜잭션에 고정합니다.
pub struct RuleRouteGroup {
    name: String,
    rules: Vec<Arc<dyn RouteRule>>,
    transaction: Option<Arc<dyn Transaction>>,
}

impl RuleRouteGroup {
    /// 빈 그룹 생성
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            transaction: None,
        }
    }

    /// 트랜잭션 연결
    pub fn with_transaction(mut self, transaction: Arc<dyn Transaction>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// 규칙 추가 (같은 우선순위는 추가 순서 유지)
    pub fn install(&mut self, rule: Arc<dyn RouteRule>) {
        let index = self
            .rules
            .iter()
            .position(|r| r.priority() > rule.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(index, rule);
    }

    /// 규칙 추가 (빌더)
    pub fn with_rule(mut self, rule: impl RouteRule + 'static) -> Self {
        self.install(Arc::new(rule));
        self
    }

    /// 평가 순서대로 규칙 (이름, 우선순위)
    pub fn rules(&self) -> Vec<(&str, i32)> {
        self.rules.iter().map(|r| (r.name(), r.priority())).collect()
    }

    fn bind_transaction(&self, node: &Arc<NodeAttribute>, sql: Option<&Arc<SqlAttribute>>) {
        if let Some(tx) = &self.transaction {
            if tx.is_active() && tx.current_node().is_none() {
                tx.register_node(node.clone(), sql.cloned());
            }
        }
    }
}

impl RouteGroup for RuleRouteGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn route(&self, sql: Option<&Arc<SqlAttribute>>) -> RouteResult<Option<RuleHit>> {
        for rule in &self.rules {
            let Some(node) = rule.routing(sql)? else {
                continue;
            };

            if !node.is_available() {
                tracing::warn!(
                    group = %self.name,
                    rule = %rule.name(),
                    priority = rule.priority(),
                    node = %node.name(),
                    state = %node.state(),
                    "selected node is not available, trying next rule"
                );
                continue;
            }

            self.bind_transaction(&node, sql);
            return Ok(Some(RuleHit {
                node,
                rule: rule.name().to_string(),
                priority: rule.priority(),
            }));
        }
        Ok(None)
    }
}

impl fmt::Debug for RuleRouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRouteGroup")
            .field("name", &self.name)
            .field("rules", &self.rules())
            .finish()
    }
}

// ============================================================================
// CompositeRouteGroup - 복합 그룹
// ============================================================================

/// 여러 그룹을 순서대로 시도하는 복합 그룹
///
/// 클러스터 체인은 사용자 그룹과 클러스터 그룹으로, 클러스터 없는 체인은 사용자 그룹과 기본 그룹으로 구성합니다.
#[derive(Default)]
pub struct CompositeRouteGroup {
    cluster: Option<String>,
    groups: Vec<Arc<dyn RouteGroup>>,
}

impl CompositeRouteGroup {
    /// 빈 복합 그룹 생성
    pub fn new(cluster: Option<String>) -> Self {
        Self {
            cluster,
            groups: Vec::new(),
        }
    }

    /// 대상 클러스터
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// 맨 앞에 그룹 추가
    pub fn install_first(&mut self, group: Arc<dyn RouteGroup>) {
        self.groups.insert(0, group);
    }

    /// 맨 뒤에 그룹 추가
    pub fn install_last(&mut self, group: Arc<dyn RouteGroup>) {
        self.groups.push(group);
    }

    /// 그룹 이름 (평가 순서)
    pub fn groups(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name()).collect()
    }

    /// 순서대로 그룹을 시도하여 라우팅 결과 생성
    ///
    /// 어떤 그룹도 가용 노드를 고르지 못하면 라우팅 에러입니다.
    pub fn route(
        &self,
        sql: Option<Arc<SqlAttribute>>,
        transaction: &dyn Transaction,
        started: Instant,
    ) -> RouteResult<RouteInfo> {
        for group in &self.groups {
            if let Some(hit) = group.route(sql.as_ref())? {
                let mut info = RouteInfo::new(sql, hit.node, &hit.rule, hit.priority, started)
                    .with_transaction(transaction);
                info.cluster = self.cluster.clone();
                info.hit_group = Some(group.name().to_string());
                return Ok(info);
            }
        }

        Err(RouteError::route(format!(
            "SQL [{}] Not routed to any available node, please check the health status of the nodes (cluster {:?}, groups {:?})",
            sql.as_ref().map_or("", |s| s.sql()),
            self.cluster,
            self.groups()
        )))
    }
}

impl fmt::Debug for CompositeRouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeRouteGroup")
            .field("cluster", &self.cluster)
            .field("groups", &self.groups())
            .finish()
    }
}

// ============================================================================
// 기본 그룹 구성
// ============================================================================

/// 클러스터 전용 규칙 그룹
///
/// 강제 라우팅, 힌트, 트랜잭션, 읽기/쓰기 분리, 속성 없는 문장 순입니다.
pub fn cluster_group(
    cluster: &Cluster,
    registry: Arc<NodeRegistry>,
    transaction: Arc<dyn Transaction>,
) -> RuleRouteGroup {
    let read = cluster.read_balancer().clone();
    let write = cluster.write_balancer().clone();
    RuleRouteGroup::new(cluster.name())
        .with_transaction(transaction.clone())
        .with_rule(ForceRouteRule::new(registry.clone(), transaction.clone()))
        .with_rule(NodeNameHintRule::new(registry, transaction.clone()))
        .with_rule(RoutingTypeHintRule::new(read.clone(), write.clone(), transaction.clone()))
        .with_rule(TransactionRouteRule::new(write.clone(), transaction))
        .with_rule(ReadWriteSplittingRule::new(read, write.clone()))
        .with_rule(NullAttributeRouteRule::new(write))
}

/// 클러스터 없이 전체 노드를 대상으로 하는 기본 그룹
///
/// 클러스터 그룹 규칙에 단일 노드 규칙과 기본 노드 규칙이 더해집니다.
pub fn default_group(
    registry: Arc<NodeRegistry>,
    read: Arc<LoadBalancer>,
    write: Arc<LoadBalancer>,
    transaction: Arc<dyn Transaction>,
) -> RuleRouteGroup {
    RuleRouteGroup::new(DEFAULT_GROUP_NAME)
        .with_transaction(transaction.clone())
        .with_rule(ForceRouteRule::new(registry.clone(), transaction.clone()))
        .with_rule(NodeNameHintRule::new(registry.clone(), transaction.clone()))
        .with_rule(RoutingTypeHintRule::new(read.clone(), write.clone(), transaction.clone()))
        .with_rule(TransactionRouteRule::new(write.clone(), transaction))
        .with_rule(SingleNodeRouteRule::new(registry.clone()))
        .with_rule(ReadWriteSplittingRule::new(read, write.clone()))
        .with_rule(NullAttributeRouteRule::new(write))
        .with_rule(DefaultNodeRouteRule::new(registry))
}
