//! 라우팅 리스너
//!
//! 라우팅 전후에 호출되는 관찰용 훅입니다.

use super::error::RouteError;
use super::group::RouteInfo;

/// 라우팅 리스너
///
/// 모든 메서드는 기본 구현이 비어 있으므로 필요한 것만 구현하면 됩니다.
pub trait RoutingListener: Send + Sync {
    /// 라우팅 직전
    fn on_before_routing(&self, _sql: Option<&str>) {}

    /// 라우팅 직후 (성공 또는 실패)
    fn on_after_routing(&self, _sql: Option<&str>, _result: Result<&RouteInfo, &RouteError>) {}
}

/// tracing으로 라우팅 결과를 남기는 리스너
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl RoutingListener for LoggingListener {
    fn on_before_routing(&self, sql: Option<&str>) {
        tracing::trace!(sql = sql.unwrap_or(""), "routing");
    }

    fn on_after_routing(&self, sql: Option<&str>, result: Result<&RouteInfo, &RouteError>) {
        match result {
            Ok(info) => {
                let (rule, priority) = info.hit_rule();
                tracing::debug!(
                    route_id = info.route_id(),
                    sql = sql.unwrap_or(""),
                    node = %info.node_name(),
                    cluster = info.cluster().unwrap_or(""),
                    rule = %rule,
                    priority,
                    elapsed_us = info.elapsed().as_micros() as u64,
                    "routed"
                );
            }
            Err(e) => {
                tracing::warn!(sql = sql.unwrap_or(""), error = %e, "routing failed");
            }
        }
    }
}
