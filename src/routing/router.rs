//! SQL 라우터
//!
//! 설정에서 노드/클러스터/로드 밸런서/규칙 체인을 구성하고, 문장마다
//! 클러스터를 고른 뒤 해당 체인으로 노드를 결정합니다.
//! 관리 작업(상태/가중치 변경, 노드/클러스터 추가/제거)도 제공합니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::balance::LoadBalancer;
use super::cluster::{Cluster, ClusterSnapshot};
use super::config::{ClusterConfig, NodeConfig, RouterConfig};
use super::context::RoutingContext;
use super::error::{RouteError, RouteResult};
use super::group::{self, CompositeRouteGroup, RouteGroup, RouteInfo};
use super::listener::{LoggingListener, RoutingListener};
use super::monitor::{HealthMonitor, NodeProbe, DEFAULT_PROBE_TIMEOUT};
use super::node::{NodeAttribute, NodeRegistry, NodeSnapshot, NodeState};
use super::transaction::{LocalTransaction, Transaction};
use crate::sql::SqlClassifier;

// ============================================================================
// RouterMetrics - 라우터 메트릭
// ============================================================================

/// 라우터 메트릭
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterMetrics {
    /// 라우팅 성공 횟수
    pub routed: u64,
    /// 라우팅 실패 횟수
    pub failed: u64,
    /// 규칙별 결정 횟수
    pub rule_hits: BTreeMap<String, u64>,
    /// 노드별 선택 횟수
    pub node_hits: BTreeMap<String, u64>,
    /// 노드 수
    pub node_count: usize,
    /// 클러스터 수
    pub cluster_count: usize,
}

// ============================================================================
// SqlRouterBuilder
// ============================================================================

/// 라우터 빌더
pub struct SqlRouterBuilder {
    config: RouterConfig,
    transaction: Option<Arc<dyn Transaction>>,
    listeners: Vec<Arc<dyn RoutingListener>>,
    logging: bool,
    groups: Vec<Arc<dyn RouteGroup>>,
    probe: Option<Arc<dyn NodeProbe>>,
}

impl SqlRouterBuilder {
    /// 트랜잭션 구현 지정 (기본값: [`LocalTransaction`])
    pub fn with_transaction(mut self, transaction: Arc<dyn Transaction>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// 리스너 추가
    pub fn with_listener(mut self, listener: Arc<dyn RoutingListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 기본 [`LoggingListener`] 제외
    pub fn without_logging(mut self) -> Self {
        self.logging = false;
        self
    }

    /// 사용자 그룹 추가 (모든 체인의 맨 앞에서 평가)
    pub fn with_group(mut self, group: Arc<dyn RouteGroup>) -> Self {
        self.groups.push(group);
        self
    }

    /// 헬스 프로브 지정
    ///
    /// 지정하면 하트비트 SQL이 있는 노드를 모니터링하므로 tokio 런타임 안에서
    /// `build()`를 호출해야 합니다.
    pub fn with_probe(mut self, probe: Arc<dyn NodeProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 라우터 생성
    pub fn build(self) -> RouteResult<SqlRouter> {
        let config = self.config;
        config.validate()?;

        let registry = Arc::new(NodeRegistry::new());
        let read_balancer = Arc::new(LoadBalancer::new(config.read_load_balance));
        let write_balancer = Arc::new(LoadBalancer::new(config.write_load_balance));

        for node_config in &config.nodes {
            let node = Arc::new(NodeAttribute::from_config(node_config));
            registry.add(node.clone())?;
            add_to_balancers(&node, &read_balancer, &write_balancer);
        }
        registry.set_default_node(config.default_node.clone());

        for cluster_config in &config.clusters {
            let cluster = Cluster::build(cluster_config.clone(), &registry)?;
            registry.put_cluster(Arc::new(cluster));
        }

        let transaction: Arc<dyn Transaction> = match self.transaction {
            Some(transaction) => transaction,
            None => Arc::new(LocalTransaction),
        };
        let default_group: Arc<dyn RouteGroup> = Arc::new(group::default_group(
            registry.clone(),
            read_balancer.clone(),
            write_balancer.clone(),
            transaction.clone(),
        ));

        let mut default_chain = CompositeRouteGroup::new(None);
        for custom in &self.groups {
            default_chain.install_last(custom.clone());
        }
        default_chain.install_last(default_group);

        let monitor = self.probe.map(|probe| {
            HealthMonitor::new(probe)
                .with_timeout(config.probe_timeout().unwrap_or(DEFAULT_PROBE_TIMEOUT))
        });

        let mut listeners = self.listeners;
        if self.logging {
            listeners.insert(0, Arc::new(LoggingListener));
        }

        let router = SqlRouter {
            classifier: SqlClassifier::new(config.sql_parsing.clone()),
            registry,
            read_balancer,
            write_balancer,
            transaction,
            listeners,
            custom_groups: self.groups,
            default_chain: Arc::new(default_chain),
            chains: RwLock::new(Arc::new(HashMap::new())),
            monitor,
            admin_lock: Mutex::new(()),
            routed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rule_hits: Mutex::new(BTreeMap::new()),
            node_hits: Mutex::new(BTreeMap::new()),
        };
        router.rebuild_chains();

        if let Some(monitor) = &router.monitor {
            for node in router.registry.nodes() {
                monitor.monitor(node)?;
            }
        }

        tracing::info!(
            nodes = router.registry.len(),
            clusters = router.registry.clusters().len(),
            "sql router built"
        );
        Ok(router)
    }
}

fn add_to_balancers(node: &Arc<NodeAttribute>, read: &LoadBalancer, write: &LoadBalancer) {
    if node.node_type().can_read() {
        read.add_option(node.clone());
    }
    if node.node_type().can_write() {
        write.add_option(node.clone());
    }
}

// ============================================================================
// SqlRouter
// ============================================================================

/// SQL 라우터
///
/// # 예시
///
/// ```rust
/// use sqlroute::{NodeConfig, NodeType, RouterConfig, SqlRouter};
///
/// let config = RouterConfig::builder()
///     .node(NodeConfig::builder("write_0", "mysql://10.0.0.1/shop").node_type(NodeType::Write).build())
///     .node(NodeConfig::builder("read_0", "mysql://10.0.0.2/shop").node_type(NodeType::Read).build())
///     .build()
///     .unwrap();
/// let router = SqlRouter::builder(config).build().unwrap();
///
/// assert_eq!(router.route(Some("insert into t values (1)")).unwrap().node_name(), "write_0");
/// assert_eq!(router.route(Some("select * from t")).unwrap().node_name(), "read_0");
/// ```
pub struct SqlRouter {
    classifier: SqlClassifier,
    registry: Arc<NodeRegistry>,
    /// 클러스터 없이 사용할 읽기 로드 밸런서
    read_balancer: Arc<LoadBalancer>,
    /// 클러스터 없이 사용할 쓰기 로드 밸런서
    write_balancer: Arc<LoadBalancer>,
    transaction: Arc<dyn Transaction>,
    listeners: Vec<Arc<dyn RoutingListener>>,
    custom_groups: Vec<Arc<dyn RouteGroup>>,
    /// 클러스터가 없을 때의 체인
    default_chain: Arc<CompositeRouteGroup>,
    /// 클러스터 이름별 체인
    chains: RwLock<Arc<HashMap<String, Arc<CompositeRouteGroup>>>>,
    monitor: Option<HealthMonitor>,
    /// 관리 작업 직렬화
    admin_lock: Mutex<()>,
    routed: AtomicU64,
    failed: AtomicU64,
    rule_hits: Mutex<BTreeMap<String, u64>>,
    node_hits: Mutex<BTreeMap<String, u64>>,
}

impl SqlRouter {
    /// 빌더 생성
    pub fn builder(config: RouterConfig) -> SqlRouterBuilder {
        SqlRouterBuilder {
            config,
            transaction: None,
            listeners: Vec::new(),
            logging: true,
            groups: Vec::new(),
            probe: None,
        }
    }

    /// 설정으로 바로 생성
    pub fn new(config: RouterConfig) -> RouteResult<Self> {
        Self::builder(config).build()
    }

    // ========================================================================
    // 라우팅
    // ========================================================================

    /// 문장 라우팅
    ///
    /// `sql`이 `None`이면 문장 없이 라우팅합니다 (연결을 먼저 얻는 경우).
    pub fn route(&self, sql: Option<&str>) -> RouteResult<RouteInfo> {
        let started = Instant::now();
        for listener in &self.listeners {
            listener.on_before_routing(sql);
        }

        let result = self.route_inner(sql, started);
        match &result {
            Ok(info) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                *self
                    .rule_hits
                    .lock()
                    .entry(info.hit_rule().0.to_string())
                    .or_insert(0) += 1;
                *self
                    .node_hits
                    .lock()
                    .entry(info.node_name().to_string())
                    .or_insert(0) += 1;
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        for listener in &self.listeners {
            listener.on_after_routing(sql, result.as_ref());
        }
        result
    }

    /// SQL 문장 라우팅
    pub fn route_sql(&self, sql: &str) -> RouteResult<RouteInfo> {
        self.route(Some(sql))
    }

    fn route_inner(&self, sql: Option<&str>, started: Instant) -> RouteResult<RouteInfo> {
        let attr = match sql {
            Some(sql) => self.classifier.classify(sql)?.map(Arc::new),
            None => None,
        };
        let chain = self.select_chain()?;
        chain.route(attr, self.transaction.as_ref(), started)
    }

    /// 컨텍스트 클러스터, 기본 클러스터, 클러스터 없음 순으로 체인 선택
    fn select_chain(&self) -> RouteResult<Arc<CompositeRouteGroup>> {
        let chains = self.chains.read().clone();

        if let Some(attr) = RoutingContext::current() {
            if let Some(name) = attr.cluster() {
                return chains.get(name).cloned().ok_or_else(|| {
                    RouteError::configuration(format!(
                        "cluster '{}' named by the routing context does not exist",
                        name
                    ))
                });
            }
        }

        if let Some(cluster) = self.registry.default_cluster() {
            if let Some(chain) = chains.get(cluster.name()) {
                return Ok(chain.clone());
            }
        }
        Ok(self.default_chain.clone())
    }

    /// 클러스터 구성에 맞춰 체인 재생성
    ///
    /// 클러스터 체인은 사용자 그룹과 클러스터 그룹으로만 구성됩니다.
    /// 클러스터 그룹이 판단을 보류하면 전역 기본 그룹으로 넘어가지 않고 실패합니다.
    fn rebuild_chains(&self) {
        let mut chains = HashMap::new();
        for cluster in self.registry.clusters() {
            let mut chain = CompositeRouteGroup::new(Some(cluster.name().to_string()));
            for custom in &self.custom_groups {
                chain.install_last(custom.clone());
            }
            chain.install_last(Arc::new(group::cluster_group(
                &cluster,
                self.registry.clone(),
                self.transaction.clone(),
            )));
            chains.insert(cluster.name().to_string(), Arc::new(chain));
        }
        *self.chains.write() = Arc::new(chains);
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// SQL 분류기
    pub fn classifier(&self) -> &SqlClassifier {
        &self.classifier
    }

    /// 등록된 리스너 수 (기본 [`LoggingListener`] 포함)
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 노드 레지스트리
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// 클러스터 없이 사용할 읽기 로드 밸런서
    pub fn read_balancer(&self) -> &Arc<LoadBalancer> {
        &self.read_balancer
    }

    /// 클러스터 없이 사용할 쓰기 로드 밸런서
    pub fn write_balancer(&self) -> &Arc<LoadBalancer> {
        &self.write_balancer
    }

    /// 헬스 모니터
    pub fn monitor(&self) -> Option<&HealthMonitor> {
        self.monitor.as_ref()
    }

    /// 이름으로 노드 조회
    pub fn node(&self, name: &str) -> Option<Arc<NodeAttribute>> {
        self.registry.get(name)
    }

    /// 모든 노드 스냅샷
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.registry.nodes().iter().map(|n| n.snapshot()).collect()
    }

    /// 모든 클러스터 스냅샷
    pub fn clusters(&self) -> Vec<ClusterSnapshot> {
        self.registry.clusters().iter().map(|c| c.snapshot()).collect()
    }

    /// 체인의 그룹 이름 (`None`이면 클러스터 없는 체인)
    pub fn chain_groups(&self, cluster: Option<&str>) -> Option<Vec<String>> {
        let to_names = |chain: &CompositeRouteGroup| -> Vec<String> {
            chain.groups().into_iter().map(str::to_string).collect()
        };
        match cluster {
            Some(name) => self.chains.read().get(name).map(|chain| to_names(chain.as_ref())),
            None => Some(to_names(&self.default_chain)),
        }
    }

    /// 라우터 메트릭
    pub fn metrics(&self) -> RouterMetrics {
        RouterMetrics {
            routed: self.routed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rule_hits: self.rule_hits.lock().clone(),
            node_hits: self.node_hits.lock().clone(),
            node_count: self.registry.len(),
            cluster_count: self.registry.clusters().len(),
        }
    }

    // ========================================================================
    // 관리 작업
    // ========================================================================

    /// 노드 상태 변경 (대소문자 무시)
    ///
    /// 이전 상태를 반환합니다. 다음 하트비트 결과가 이 값을 덮어씁니다.
    pub fn set_node_state(&self, name: &str, state: &str) -> RouteResult<NodeState> {
        let state = NodeState::from_str(state).ok_or_else(|| {
            let valid: Vec<&str> = NodeState::ALL.iter().map(|s| s.as_str()).collect();
            RouteError::configuration(format!(
                "invalid node state '{}', valid states are {}",
                state,
                valid.join(", ")
            ))
        })?;

        let _lock = self.admin_lock.lock();
        let node = self.registry.require(name)?;
        let previous = node.set_state(state);
        tracing::info!(node = %name, from = %previous, to = %state, "node state changed");
        Ok(previous)
    }

    /// 노드 가중치 변경
    pub fn set_node_weight(&self, name: &str, weight: f64) -> RouteResult<()> {
        let _lock = self.admin_lock.lock();
        let node = self.registry.require(name)?;
        let previous = node.weight();
        node.set_weight(weight)?;
        tracing::info!(node = %name, from = previous, to = weight, "node weight changed");
        Ok(())
    }

    /// 노드 추가
    ///
    /// 클러스터 없이 사용할 로드 밸런서에 등록되고, 프로브가 있으면 모니터링을 시작합니다.
    pub fn add_node(&self, config: NodeConfig) -> RouteResult<Arc<NodeAttribute>> {
        config.validate()?;

        let _lock = self.admin_lock.lock();
        let node = Arc::new(NodeAttribute::from_config(&config));
        self.registry.add(node.clone())?;
        add_to_balancers(&node, &self.read_balancer, &self.write_balancer);

        if let Some(monitor) = &self.monitor {
            if let Err(e) = monitor.monitor(node.clone()) {
                self.read_balancer.remove_option(node.name());
                self.write_balancer.remove_option(node.name());
                self.registry.remove(node.name());
                return Err(e);
            }
        }

        tracing::info!(node = %node.name(), node_type = %node.node_type().as_str(), "node added");
        Ok(node)
    }

    /// 노드 제거
    ///
    /// 모든 클러스터와 로드 밸런서에서 제외하고 모니터링을 중지합니다.
    /// 쓰기 가능 노드가 없는 클러스터가 남게 되면 거부합니다.
    pub fn remove_node(&self, name: &str) -> RouteResult<Arc<NodeAttribute>> {
        let _lock = self.admin_lock.lock();
        let node = self.registry.require(name)?;

        let mut rebuilt = Vec::new();
        for cluster in self.registry.clusters_of_node(name) {
            let shrunk = Cluster::build(cluster.config_without(name), &self.registry).map_err(|e| {
                RouteError::configuration(format!("node '{}' cannot be removed: {}", name, e))
            })?;
            rebuilt.push(Arc::new(shrunk));
        }

        let changed_clusters = !rebuilt.is_empty();
        for cluster in rebuilt {
            self.registry.put_cluster(cluster);
        }
        self.read_balancer.remove_option(name);
        self.write_balancer.remove_option(name);
        if let Some(monitor) = &self.monitor {
            monitor.stop(name);
        }
        self.registry.remove(name);
        if changed_clusters {
            self.rebuild_chains();
        }

        tracing::info!(
            node = %name,
            destroy_method = node.destroy_method().unwrap_or(""),
            "node removed"
        );
        Ok(node)
    }

    /// 클러스터 추가
    pub fn add_cluster(&self, config: ClusterConfig) -> RouteResult<()> {
        let _lock = self.admin_lock.lock();
        if self.registry.cluster(&config.name).is_some() {
            return Err(RouteError::configuration(format!(
                "cluster '{}' already exists",
                config.name
            )));
        }
        if config.default {
            if let Some(existing) = self.registry.default_cluster() {
                return Err(RouteError::configuration(format!(
                    "cluster '{}' cannot be default, '{}' is already the default cluster",
                    config.name,
                    existing.name()
                )));
            }
        }

        let cluster = Cluster::build(config, &self.registry)?;
        let name = cluster.name().to_string();
        self.registry.put_cluster(Arc::new(cluster));
        self.rebuild_chains();

        tracing::info!(cluster = %name, "cluster added");
        Ok(())
    }

    /// 클러스터 제거
    pub fn remove_cluster(&self, name: &str) -> RouteResult<()> {
        let _lock = self.admin_lock.lock();
        if self.registry.remove_cluster(name).is_none() {
            return Err(RouteError::configuration(format!(
                "cluster '{}' does not exist",
                name
            )));
        }
        self.rebuild_chains();

        tracing::info!(cluster = %name, "cluster removed");
        Ok(())
    }

    /// 클러스터에 노드 추가
    pub fn add_node_to_cluster(&self, cluster: &str, node: &str) -> RouteResult<()> {
        let _lock = self.admin_lock.lock();
        let current = self.require_cluster(cluster)?;
        if current.contains(node) {
            tracing::warn!(cluster = %cluster, node = %node, "node is already in the cluster");
            return Ok(());
        }

        let grown = Cluster::build(current.config_with(node), &self.registry)?;
        self.registry.put_cluster(Arc::new(grown));
        self.rebuild_chains();

        tracing::info!(cluster = %cluster, node = %node, "node added to cluster");
        Ok(())
    }

    /// 클러스터에서 노드 제외
    pub fn remove_node_from_cluster(&self, cluster: &str, node: &str) -> RouteResult<()> {
        let _lock = self.admin_lock.lock();
        let current = self.require_cluster(cluster)?;
        if !current.contains(node) {
            return Err(RouteError::configuration(format!(
                "cluster '{}' does not contain node '{}'",
                cluster, node
            )));
        }

        let shrunk = Cluster::build(current.config_without(node), &self.registry)?;
        self.registry.put_cluster(Arc::new(shrunk));
        self.rebuild_chains();

        tracing::info!(cluster = %cluster, node = %node, "node removed from cluster");
        Ok(())
    }

    fn require_cluster(&self, name: &str) -> RouteResult<Arc<Cluster>> {
        self.registry
            .cluster(name)
            .ok_or_else(|| RouteError::configuration(format!("cluster '{}' does not exist", name)))
    }

    /// 헬스 모니터링 중지
    pub fn shutdown(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.stop_all();
        }
    }
}

impl fmt::Debug for SqlRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clusters: Vec<String> = self.chains.read().keys().cloned().collect();
        f.debug_struct("SqlRouter")
            .field("nodes", &self.registry.len())
            .field("clusters", &clusters)
            .field("listeners", &self.listeners.len())
            .field("monitor", &self.monitor)
            .finish()
    }
}
