//! 라우터 설정
//!
//! 노드, 클러스터, SQL 파싱, 로드 밸런싱 설정과 TOML 로딩을 제공합니다.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::balance::BalancePolicy;
use super::error::{RouteError, RouteResult};
use super::node::NodeType;
use crate::sql::SqlType;

/// 기본 하트비트 주기 (밀리초)
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

// ============================================================================
// SqlParsingConfig - SQL 파싱 설정
// ============================================================================

/// SQL 분석 실패 시 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailBehavior {
    /// 조용히 쓰기 노드로 라우팅
    #[serde(alias = "ignore")]
    Ignore,
    /// 경고 로그 후 쓰기 노드로 라우팅 (기본값)
    #[default]
    #[serde(alias = "warning")]
    Warning,
    /// 파싱 에러 전파
    #[serde(alias = "failing")]
    Failing,
}

/// SQL 방언
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// 범용 (기본값)
    #[default]
    Generic,
    /// MySQL
    MySql,
    /// PostgreSQL
    #[serde(alias = "postgres")]
    PostgreSql,
}

/// SQL 파싱 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlParsingConfig {
    /// 분석 실패 시 동작
    pub fail_behavior: FailBehavior,
    /// 읽기로 분류할 문장 종류
    pub read_kinds: BTreeSet<SqlType>,
    /// SQL 방언
    pub dialect: SqlDialect,
}

impl Default for SqlParsingConfig {
    fn default() -> Self {
        Self {
            fail_behavior: FailBehavior::default(),
            read_kinds: [SqlType::Select, SqlType::Show, SqlType::Explain]
                .into_iter()
                .collect(),
            dialect: SqlDialect::default(),
        }
    }
}

// ============================================================================
// NodeConfig - 노드 설정
// ============================================================================

/// 노드 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 노드 이름 (고유)
    pub name: String,
    /// 연결 URL
    pub url: String,
    /// 데이터베이스 제품 종류
    #[serde(default)]
    pub database_type: Option<String>,
    /// 데이터베이스 이름
    #[serde(default)]
    pub database_name: Option<String>,
    /// 노드 타입
    #[serde(default)]
    pub node_type: NodeType,
    /// 가중치
    #[serde(default)]
    pub weight: f64,
    /// 하트비트 SQL (없으면 모니터링하지 않음)
    #[serde(default)]
    pub heartbeat_sql: Option<String>,
    /// 하트비트 주기 (밀리초)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// 정리 훅 이름
    #[serde(default)]
    pub destroy_method: Option<String>,
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

impl NodeConfig {
    /// 빌더 생성
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> NodeConfigBuilder {
        NodeConfigBuilder {
            config: NodeConfig {
                name: name.into(),
                url: url.into(),
                database_type: None,
                database_name: None,
                node_type: NodeType::default(),
                weight: 0.0,
                heartbeat_sql: None,
                heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
                destroy_method: None,
            },
        }
    }

    /// 하트비트 주기
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> RouteResult<()> {
        if self.name.trim().is_empty() {
            return Err(RouteError::configuration("node name must not be empty"));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(RouteError::configuration(format!(
                "node '{}': weight must be a finite number >= 0, got {}",
                self.name, self.weight
            )));
        }
        if self.heartbeat_sql.is_some() && self.heartbeat_interval_ms == 0 {
            return Err(RouteError::configuration(format!(
                "node '{}': heartbeat interval must be greater than 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// 노드 설정 빌더
#[derive(Debug, Clone)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    /// 데이터베이스 제품 종류 설정
    pub fn database_type(mut self, database_type: impl Into<String>) -> Self {
        self.config.database_type = Some(database_type.into());
        self
    }

    /// 데이터베이스 이름 설정
    pub fn database_name(mut self, database_name: impl Into<String>) -> Self {
        self.config.database_name = Some(database_name.into());
        self
    }

    /// 노드 타입 설정
    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.config.node_type = node_type;
        self
    }

    /// 가중치 설정
    pub fn weight(mut self, weight: f64) -> Self {
        self.config.weight = weight;
        self
    }

    /// 하트비트 설정
    pub fn heartbeat(mut self, sql: impl Into<String>, interval: Duration) -> Self {
        self.config.heartbeat_sql = Some(sql.into());
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// 정리 훅 이름 설정
    pub fn destroy_method(mut self, method: impl Into<String>) -> Self {
        self.config.destroy_method = Some(method.into());
        self
    }

    /// 설정 생성
    pub fn build(self) -> NodeConfig {
        self.config
    }
}

// ============================================================================
// ClusterConfig - 클러스터 설정
// ============================================================================

/// 클러스터 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// 클러스터 이름
    pub name: String,
    /// 소속 노드 이름
    pub nodes: BTreeSet<String>,
    /// 기본 클러스터 여부
    #[serde(default)]
    pub default: bool,
    /// 읽기 로드 밸런싱 정책
    #[serde(default)]
    pub read_load_balance: BalancePolicy,
    /// 쓰기 로드 밸런싱 정책
    #[serde(default)]
    pub write_load_balance: BalancePolicy,
}

impl ClusterConfig {
    /// 새 클러스터 설정 생성
    pub fn new<I, S>(name: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            default: false,
            read_load_balance: BalancePolicy::default(),
            write_load_balance: BalancePolicy::default(),
        }
    }

    /// 기본 클러스터로 지정
    pub fn with_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// 로드 밸런싱 정책 설정
    pub fn with_load_balance(mut self, read: BalancePolicy, write: BalancePolicy) -> Self {
        self.read_load_balance = read;
        self.write_load_balance = write;
        self
    }

    /// 노드 설정 목록을 기준으로 검증
    pub fn validate(&self, nodes: &[NodeConfig]) -> RouteResult<()> {
        if self.name.trim().is_empty() {
            return Err(RouteError::configuration("cluster name must not be empty"));
        }

        let mut members = Vec::with_capacity(self.nodes.len());
        for name in &self.nodes {
            let node = nodes.iter().find(|n| &n.name == name).ok_or_else(|| {
                RouteError::configuration(format!(
                    "cluster '{}': node '{}' does not exist",
                    self.name, name
                ))
            })?;
            members.push(node);
        }

        if !members.iter().any(|n| n.node_type.can_write()) {
            return Err(RouteError::configuration(format!(
                "cluster '{}': at least one writable node is required",
                self.name
            )));
        }
        if let Some(n) = members.iter().find(|n| n.node_type == NodeType::Independent) {
            return Err(RouteError::configuration(format!(
                "cluster '{}': independent node '{}' is not allowed in a cluster",
                self.name, n.name
            )));
        }

        let types: BTreeSet<&str> = members
            .iter()
            .filter_map(|n| n.database_type.as_deref())
            .collect();
        if types.len() > 1 {
            return Err(RouteError::configuration(format!(
                "cluster '{}': all nodes must have the same database type, found {}",
                self.name,
                types.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(())
    }
}

// ============================================================================
// RouterConfig - 라우터 설정
// ============================================================================

/// 라우터 설정
///
/// # 예시
///
/// ```toml
/// default_node = "write_0"
///
/// [sql_parsing]
/// fail_behavior = "WARNING"
///
/// [[nodes]]
/// name = "write_0"
/// url = "jdbc:mysql://10.0.0.1:3306/shop"
/// node_type = "WRITE"
/// weight = 1.0
/// heartbeat_sql = "SELECT 1"
///
/// [[nodes]]
/// name = "read_0"
/// url = "jdbc:mysql://10.0.0.2:3306/shop"
/// node_type = "READ"
///
/// [[clusters]]
/// name = "shop"
/// nodes = ["write_0", "read_0"]
/// default = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// 노드 목록
    pub nodes: Vec<NodeConfig>,
    /// 클러스터 목록
    pub clusters: Vec<ClusterConfig>,
    /// SQL 파싱 설정
    pub sql_parsing: SqlParsingConfig,
    /// 기본 노드 이름
    pub default_node: Option<String>,
    /// 클러스터 없이 사용할 읽기 로드 밸런싱 정책
    pub read_load_balance: BalancePolicy,
    /// 클러스터 없이 사용할 쓰기 로드 밸런싱 정책
    pub write_load_balance: BalancePolicy,
    /// 하트비트 프로브 타임아웃 (밀리초)
    pub probe_timeout_ms: Option<u64>,
}

impl RouterConfig {
    /// 빌더 패턴으로 설정 생성
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// TOML 파일에서 로딩
    pub fn from_file(path: impl AsRef<Path>) -> RouteResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// TOML 문자열에서 로딩
    ///
    /// `source_name`은 에러 메시지에 사용됩니다.
    pub fn from_toml_str(content: &str, source_name: &str) -> RouteResult<Self> {
        let config: RouterConfig = toml::from_str(content)
            .map_err(|e| RouteError::config_file(source_name, e.to_string()))?;
        config
            .validate()
            .map_err(|e| RouteError::config_file(source_name, e.to_string()))?;
        Ok(config)
    }

    /// 프로브 타임아웃
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_ms.map(Duration::from_millis)
    }

    /// 설정 검증
    pub fn validate(&self) -> RouteResult<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            node.validate()?;
            if !names.insert(node.name.as_str()) {
                return Err(RouteError::configuration(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        if let Some(default_node) = &self.default_node {
            if !names.contains(default_node.as_str()) {
                return Err(RouteError::configuration(format!(
                    "default node '{}' does not exist",
                    default_node
                )));
            }
        }

        let mut cluster_names = HashSet::new();
        for cluster in &self.clusters {
            cluster.validate(&self.nodes)?;
            if !cluster_names.insert(cluster.name.as_str()) {
                return Err(RouteError::configuration(format!(
                    "duplicate cluster name '{}'",
                    cluster.name
                )));
            }
        }

        let defaults: Vec<&str> = self
            .clusters
            .iter()
            .filter(|c| c.default)
            .map(|c| c.name.as_str())
            .collect();
        if defaults.len() > 1 {
            return Err(RouteError::configuration(format!(
                "only one default cluster is allowed, found {}",
                defaults.join(", ")
            )));
        }

        Ok(())
    }
}

/// 라우터 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    /// 노드 추가
    pub fn node(mut self, node: NodeConfig) -> Self {
        self.config.nodes.push(node);
        self
    }

    /// 클러스터 추가
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.config.clusters.push(cluster);
        self
    }

    /// 기본 노드 설정
    pub fn default_node(mut self, name: impl Into<String>) -> Self {
        self.config.default_node = Some(name.into());
        self
    }

    /// 분석 실패 동작 설정
    pub fn fail_behavior(mut self, behavior: FailBehavior) -> Self {
        self.config.sql_parsing.fail_behavior = behavior;
        self
    }

    /// SQL 방언 설정
    pub fn dialect(mut self, dialect: SqlDialect) -> Self {
        self.config.sql_parsing.dialect = dialect;
        self
    }

    /// 읽기 문장 종류 설정
    pub fn read_kinds(mut self, kinds: impl IntoIterator<Item = SqlType>) -> Self {
        self.config.sql_parsing.read_kinds = kinds.into_iter().collect();
        self
    }

    /// 전역 로드 밸런싱 정책 설정
    pub fn load_balance(mut self, read: BalancePolicy, write: BalancePolicy) -> Self {
        self.config.read_load_balance = read;
        self.config.write_load_balance = write;
        self
    }

    /// 프로브 타임아웃 설정
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 설정 생성 (검증 포함)
    pub fn build(self) -> RouteResult<RouterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
