//! 노드 헬스 모니터
//!
//! 하트비트 SQL이 설정된 노드마다 tokio 태스크를 하나씩 띄워 주기적으로 프로브하고
//! 결과에 따라 노드 상태를 `UP`/`DOWN`으로 전환합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::{RouteError, RouteResult};
use super::node::{NodeAttribute, NodeState};

/// 기본 프로브 타임아웃
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 최소 하트비트 주기
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// NodeProbe - 프로브 인터페이스
// ============================================================================

/// 노드 프로브
///
/// 실제 DB 연결로 하트비트 SQL을 실행하는 구현을 주입합니다.
/// `Ok(())`이면 노드가 정상입니다.
pub trait NodeProbe: Send + Sync + 'static {
    /// 하트비트 SQL 실행
    fn probe<'a>(&'a self, node: &'a NodeAttribute, sql: &'a str) -> BoxFuture<'a, RouteResult<()>>;
}

// ============================================================================
// HealthMonitor
// ============================================================================

/// 헬스 모니터
pub struct HealthMonitor {
    probe: Arc<dyn NodeProbe>,
    timeout: Duration,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HealthMonitor {
    /// 새 모니터 생성
    pub fn new(probe: Arc<dyn NodeProbe>) -> Self {
        Self {
            probe,
            timeout: DEFAULT_PROBE_TIMEOUT,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// 프로브 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 프로브 타임아웃
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 노드 모니터링 시작
    ///
    /// 모니터링을 시작했으면 `true`를 반환합니다. 이미 모니터링 중이거나
    /// 하트비트 SQL이 없는 노드는 경고만 남기고 `false`를 반환합니다.
    /// tokio 런타임 밖에서 호출하면 에러입니다.
    pub fn monitor(&self, node: Arc<NodeAttribute>) -> RouteResult<bool> {
        let Some(sql) = node.heartbeat_sql().map(str::to_string) else {
            tracing::warn!(node = %node.name(), "node has no heartbeat SQL, health monitoring skipped");
            return Ok(false);
        };

        let mut tasks = self.tasks.lock();
        if let Some(handle) = tasks.get(node.name()) {
            if !handle.is_finished() {
                tracing::warn!(node = %node.name(), "node is already monitored");
                return Ok(false);
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RouteError::internal(format!(
                "health monitoring of node '{}' requires a tokio runtime: {}",
                node.name(),
                e
            ))
        })?;

        let probe = self.probe.clone();
        let timeout = self.timeout;
        let period = node.heartbeat_interval().max(MIN_HEARTBEAT_INTERVAL);
        let name = node.name().to_string();

        tracing::info!(node = %name, interval_ms = period.as_millis() as u64, "health monitoring started");

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                check_node(probe.as_ref(), &node, &sql, timeout).await;
            }
        });
        tasks.insert(name, handle);
        Ok(true)
    }

    /// 노드 한 번 점검
    ///
    /// 하트비트 SQL이 없으면 상태를 바꾸지 않습니다.
    pub async fn check(&self, node: &NodeAttribute) -> NodeState {
        if let Some(sql) = node.heartbeat_sql() {
            check_node(self.probe.as_ref(), node, sql, self.timeout).await;
        }
        node.state()
    }

    /// 노드 모니터링 중지
    pub fn stop(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                tracing::info!(node = %name, "health monitoring stopped");
                true
            }
            None => false,
        }
    }

    /// 모든 모니터링 중지
    pub fn stop_all(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain().collect();
        for (name, handle) in tasks {
            handle.abort();
            tracing::debug!(node = %name, "health monitoring stopped");
        }
    }

    /// 모니터링 여부
    pub fn is_monitored(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .get(name)
            .map_or(false, |handle| !handle.is_finished())
    }

    /// 모니터링 중인 노드 이름
    pub fn monitored(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.get_mut().drain() {
            handle.abort();
        }
    }
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("timeout", &self.timeout)
            .field("monitored", &self.monitored())
            .finish()
    }
}

/// 프로브 한 번 실행 후 상태 전환
async fn check_node(probe: &dyn NodeProbe, node: &NodeAttribute, sql: &str, timeout: Duration) {
    let result = match tokio::time::timeout(timeout, probe.probe(node, sql)).await {
        Ok(result) => result,
        Err(_) => Err(RouteError::probe(
            node.name(),
            format!("heartbeat timed out after {}ms", timeout.as_millis()),
        )),
    };

    match result {
        Ok(()) => {
            let previous = node.set_state(NodeState::Up);
            if previous != NodeState::Up {
                tracing::info!(node = %node.name(), from = %previous, "node is UP");
            }
        }
        Err(e) => {
            let previous = node.set_state(NodeState::Down);
            if previous != NodeState::Down {
                tracing::error!(node = %node.name(), from = %previous, error = %e, "node is DOWN");
            } else {
                tracing::debug!(node = %node.name(), error = %e, "node is still DOWN");
            }
        }
    }
}
