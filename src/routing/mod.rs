//! 라우팅 모듈
//!
//! 분류된 SQL 문장과 실행 컨텍스트로 실행할 노드를 결정합니다.
//!
//! # 개요
//!
//! - 노드와 클러스터는 [`NodeRegistry`]에 등록되고, 역할별 [`LoadBalancer`]로 선택됩니다.
//! - 규칙([`RouteRule`])은 우선순위 순으로 평가되며 첫 결정이 채택됩니다.
//! - [`RoutingContext`]는 호출 코드가 선언한 라우팅 의도를 실행 단위로 보관합니다.
//! - [`Transaction`]은 열린 트랜잭션의 문장을 하나의 노드로 고정합니다.
//! - [`HealthMonitor`]는 하트비트로 노드 상태를 갱신합니다.
//!
//! # 예시
//!
//! ```ignore
//! use sqlroute::routing::{RouteAttribute, RoutingContext, SqlRouter};
//!
//! let router = SqlRouter::new(RouterConfig::from_file("router.toml")?)?;
//!
//! // 클러스터 지정
//! let info = RoutingContext::with_route(RouteAttribute::new().with_cluster("shop"), || {
//!     router.route(Some("select * from orders"))
//! })?;
//!
//! // 노드 강제
//! let info = RoutingContext::execute_on(["write_0"], || router.route(Some("select 1")))??;
//! ```

mod balance;
mod cluster;
mod config;
mod context;
mod error;
pub mod group;
mod listener;
mod monitor;
mod node;
mod router;
pub mod rule;
mod transaction;

pub use balance::{BalancePolicy, LoadBalancer};
pub use cluster::{Cluster, ClusterSnapshot};
pub use config::{
    ClusterConfig, FailBehavior, NodeConfig, NodeConfigBuilder, RouterConfig,
    RouterConfigBuilder, SqlDialect, SqlParsingConfig, DEFAULT_HEARTBEAT_INTERVAL_MS,
};
pub use context::{RouteAttribute, RouteScope, RoutingContext};
pub use error::{RouteError, RouteResult};
pub use group::{CompositeRouteGroup, RouteGroup, RouteInfo, RuleHit, RuleRouteGroup};
pub use listener::{LoggingListener, RoutingListener};
pub use monitor::{HealthMonitor, NodeProbe, DEFAULT_PROBE_TIMEOUT};
pub use node::{NodeAttribute, NodeRegistry, NodeSnapshot, NodeState, NodeType, DEFAULT_HEARTBEAT_SQL};
pub use router::{RouterMetrics, SqlRouter, SqlRouterBuilder};
pub use rule::RouteRule;
pub use transaction::{LocalTransaction, Transaction, TransactionGuard};
