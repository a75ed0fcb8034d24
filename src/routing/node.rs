//! 노드 속성과 레지스트리
//!
//! 라우팅 대상 데이터베이스 노드의 식별 정보, 가중치, 상태를 관리합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::cluster::Cluster;
use super::config::NodeConfig;
use super::error::{RouteError, RouteResult};

/// 기본 하트비트 SQL
pub const DEFAULT_HEARTBEAT_SQL: &str = "SELECT 1";

// ============================================================================
// NodeState - 노드 상태
// ============================================================================

/// 노드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    /// 정상
    Up,
    /// 장애
    Down,
    /// 알 수 없음 (모니터링 시작 전)
    Unknown,
}

impl NodeState {
    /// 모든 상태
    pub const ALL: [NodeState; 3] = [Self::Up, Self::Down, Self::Unknown];

    /// 문자열에서 파싱 (대소문자 무시)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UP" => Some(Self::Up),
            "DOWN" => Some(Self::Down),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// 라우팅 가능 여부
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Up | Self::Unknown)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// NodeType - 노드 타입
// ============================================================================

/// 노드 타입 (읽기/쓰기 역할)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// 읽기 전용
    Read,
    /// 쓰기 전용
    Write,
    /// 읽기/쓰기 (기본값)
    #[default]
    ReadWrite,
    /// 클러스터에 속하지 않는 독립 노드
    Independent,
}

impl NodeType {
    /// 문자열에서 파싱 (대소문자 무시)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "READ" => Some(Self::Read),
            "WRITE" => Some(Self::Write),
            "READ_WRITE" => Some(Self::ReadWrite),
            "INDEPENDENT" => Some(Self::Independent),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ReadWrite => "READ_WRITE",
            Self::Independent => "INDEPENDENT",
        }
    }

    /// 쓰기 가능 여부
    pub fn can_write(&self) -> bool {
        !matches!(self, Self::Read)
    }

    /// 읽기 가능 여부
    pub fn can_read(&self) -> bool {
        !matches!(self, Self::Write)
    }
}

// ============================================================================
// NodeAttribute - 노드 속성
// ============================================================================

/// 노드 속성
///
/// 이름이 고유 키이며 동등성/해시는 이름만 사용합니다.
/// 상태와 가중치는 관리 작업과 헬스 모니터에 의해 변경됩니다.
pub struct NodeAttribute {
    name: String,
    url: String,
    database_type: Option<String>,
    database_name: Option<String>,
    node_type: NodeType,
    state: RwLock<NodeState>,
    weight: RwLock<f64>,
    heartbeat_sql: Option<String>,
    heartbeat_interval: Duration,
    destroy_method: Option<String>,
}

impl NodeAttribute {
    /// 이름과 URL로 노드 생성
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::from_config(&NodeConfig::builder(name, url).build())
    }

    /// 설정에서 노드 생성
    ///
    /// 하트비트가 설정된 노드는 `UNKNOWN`, 그 외는 `UP` 상태로 시작합니다.
    pub fn from_config(config: &NodeConfig) -> Self {
        let state = if config.heartbeat_sql.is_some() {
            NodeState::Unknown
        } else {
            NodeState::Up
        };

        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            database_type: config.database_type.clone(),
            database_name: config.database_name.clone(),
            node_type: config.node_type,
            state: RwLock::new(state),
            weight: RwLock::new(config.weight.max(0.0)),
            heartbeat_sql: config.heartbeat_sql.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            destroy_method: config.destroy_method.clone(),
        }
    }

    /// 노드 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 연결 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 데이터베이스 제품 종류
    pub fn database_type(&self) -> Option<&str> {
        self.database_type.as_deref()
    }

    /// 데이터베이스 이름
    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    /// 노드 타입
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// 현재 상태
    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// 상태 변경, 이전 상태 반환
    pub fn set_state(&self, state: NodeState) -> NodeState {
        std::mem::replace(&mut *self.state.write(), state)
    }

    /// 라우팅 가능 여부
    pub fn is_available(&self) -> bool {
        self.state().is_available()
    }

    /// 현재 가중치
    pub fn weight(&self) -> f64 {
        *self.weight.read()
    }

    /// 가중치 변경
    pub fn set_weight(&self, weight: f64) -> RouteResult<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(RouteError::configuration(format!(
                "node '{}': weight must be a finite number >= 0, got {}",
                self.name, weight
            )));
        }
        *self.weight.write() = weight;
        Ok(())
    }

    /// 하트비트 SQL (설정된 경우)
    pub fn heartbeat_sql(&self) -> Option<&str> {
        self.heartbeat_sql.as_deref()
    }

    /// 하트비트 주기
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// 정리 훅 이름
    pub fn destroy_method(&self) -> Option<&str> {
        self.destroy_method.as_deref()
    }

    /// 현재 상태 스냅샷
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.name.clone(),
            url: self.url.clone(),
            database_type: self.database_type.clone(),
            database_name: self.database_name.clone(),
            node_type: self.node_type,
            state: self.state(),
            weight: self.weight(),
            heartbeat_sql: self.heartbeat_sql.clone(),
            heartbeat_interval_ms: self.heartbeat_interval.as_millis() as u64,
        }
    }
}

impl PartialEq for NodeAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for NodeAttribute {}

impl Hash for NodeAttribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for NodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAttribute")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("node_type", &self.node_type)
            .field("state", &self.state())
            .field("weight", &self.weight())
            .finish()
    }
}

impl fmt::Display for NodeAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 노드 스냅샷 (관리 조회용)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    /// 노드 이름
    pub name: String,
    /// 연결 URL
    pub url: String,
    /// 데이터베이스 제품 종류
    pub database_type: Option<String>,
    /// 데이터베이스 이름
    pub database_name: Option<String>,
    /// 노드 타입
    pub node_type: NodeType,
    /// 상태
    pub state: NodeState,
    /// 가중치
    pub weight: f64,
    /// 하트비트 SQL
    pub heartbeat_sql: Option<String>,
    /// 하트비트 주기 (밀리초)
    pub heartbeat_interval_ms: u64,
}

// ============================================================================
// NodeRegistry - 노드 레지스트리
// ============================================================================

/// 노드 및 클러스터 레지스트리
///
/// 읽기 위주 구조입니다. 변경 시 맵을 복사해 교체하므로 라우팅 중인 호출은
/// 이전 스냅샷을 그대로 사용합니다.
#[derive(Default)]
pub struct NodeRegistry {
    /// 이름별 노드
    nodes: RwLock<Arc<BTreeMap<String, Arc<NodeAttribute>>>>,
    /// 이름별 클러스터
    clusters: RwLock<Arc<BTreeMap<String, Arc<Cluster>>>>,
    /// 기본 노드 이름
    default_node: RwLock<Option<String>>,
}

impl NodeRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 노드 등록
    pub fn add(&self, node: Arc<NodeAttribute>) -> RouteResult<()> {
        let mut guard = self.nodes.write();
        if guard.contains_key(node.name()) {
            return Err(RouteError::configuration(format!(
                "node '{}' already exists",
                node.name()
            )));
        }
        let mut nodes = (**guard).clone();
        nodes.insert(node.name().to_string(), node);
        *guard = Arc::new(nodes);
        Ok(())
    }

    /// 노드 제거
    pub fn remove(&self, name: &str) -> Option<Arc<NodeAttribute>> {
        let mut guard = self.nodes.write();
        if !guard.contains_key(name) {
            return None;
        }
        let mut nodes = (**guard).clone();
        let removed = nodes.remove(name);
        *guard = Arc::new(nodes);

        let mut default_node = self.default_node.write();
        if default_node.as_deref() == Some(name) {
            *default_node = None;
        }
        removed
    }

    /// 이름으로 노드 조회
    pub fn get(&self, name: &str) -> Option<Arc<NodeAttribute>> {
        self.nodes.read().get(name).cloned()
    }

    /// 이름으로 노드 조회, 없으면 설정 에러
    pub fn require(&self, name: &str) -> RouteResult<Arc<NodeAttribute>> {
        self.get(name)
            .ok_or_else(|| RouteError::configuration(format!("node '{}' does not exist", name)))
    }

    /// 노드 존재 여부
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// 노드 수
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// 모든 노드 (이름순)
    pub fn nodes(&self) -> Vec<Arc<NodeAttribute>> {
        let snapshot = self.nodes.read().clone();
        snapshot.values().cloned().collect()
    }

    /// 기본 노드 설정
    pub fn set_default_node(&self, name: Option<String>) {
        *self.default_node.write() = name;
    }

    /// 기본 노드
    pub fn default_node(&self) -> Option<Arc<NodeAttribute>> {
        let name = self.default_node.read().clone()?;
        self.get(&name)
    }

    /// 클러스터 등록 (같은 이름이면 교체)
    pub fn put_cluster(&self, cluster: Arc<Cluster>) {
        let mut guard = self.clusters.write();
        let mut clusters = (**guard).clone();
        clusters.insert(cluster.name().to_string(), cluster);
        *guard = Arc::new(clusters);
    }

    /// 클러스터 제거
    pub fn remove_cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        let mut guard = self.clusters.write();
        if !guard.contains_key(name) {
            return None;
        }
        let mut clusters = (**guard).clone();
        let removed = clusters.remove(name);
        *guard = Arc::new(clusters);
        removed
    }

    /// 이름으로 클러스터 조회
    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.read().get(name).cloned()
    }

    /// 모든 클러스터 (이름순)
    pub fn clusters(&self) -> Vec<Arc<Cluster>> {
        let snapshot = self.clusters.read().clone();
        snapshot.values().cloned().collect()
    }

    /// 기본 클러스터
    pub fn default_cluster(&self) -> Option<Arc<Cluster>> {
        let snapshot = self.clusters.read().clone();
        snapshot.values().find(|c| c.is_default()).cloned()
    }

    /// 클러스터 X의 모든 노드
    pub fn nodes_of_cluster(&self, name: &str) -> RouteResult<Vec<Arc<NodeAttribute>>> {
        let cluster = self
            .cluster(name)
            .ok_or_else(|| RouteError::configuration(format!("cluster '{}' does not exist", name)))?;
        Ok(cluster.nodes())
    }

    /// 노드가 속한 클러스터 목록
    pub fn clusters_of_node(&self, name: &str) -> Vec<Arc<Cluster>> {
        let snapshot = self.clusters.read().clone();
        snapshot
            .values()
            .filter(|c| c.contains(name))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.nodes.read().keys().collect::<Vec<_>>())
            .field("clusters", &self.clusters.read().keys().collect::<Vec<_>>())
            .field("default_node", &*self.default_node.read())
            .finish()
    }
}
