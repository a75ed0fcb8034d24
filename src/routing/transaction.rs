//! 트랜잭션 어피니티
//!
//! 열린 트랜잭션의 첫 노드를 이후 모든 문장에 고정합니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::context::with_state;
use super::node::NodeAttribute;
use crate::sql::SqlAttribute;

// ============================================================================
// Transaction - 트랜잭션 인터페이스
// ============================================================================

/// 트랜잭션 어피니티 인터페이스
///
/// 외부 트랜잭션 관리자를 감싸 라우터에 주입합니다.
pub trait Transaction: Send + Sync {
    /// 트랜잭션 활성 여부
    fn is_active(&self) -> bool;

    /// 읽기 전용 여부
    fn is_read_only(&self) -> bool;

    /// 고정된 노드
    fn current_node(&self) -> Option<Arc<NodeAttribute>>;

    /// 노드 고정 및 첫 문장 기록
    fn register_node(&self, node: Arc<NodeAttribute>, sql: Option<Arc<SqlAttribute>>);

    /// 실행된 문장 기록
    fn add_sql(&self, sql: Option<Arc<SqlAttribute>>);

    /// 트랜잭션 이름
    fn name(&self) -> Option<String> {
        None
    }

    /// 트랜잭션 ID
    fn id(&self) -> Option<u64> {
        None
    }
}

// ============================================================================
// TransactionRecord - 트랜잭션 기록
// ============================================================================

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// 실행 로컬 트랜잭션 기록
#[derive(Clone)]
pub(crate) struct TransactionRecord {
    id: u64,
    name: Option<String>,
    read_only: bool,
    node: Option<Arc<NodeAttribute>>,
    statements: Vec<Arc<SqlAttribute>>,
    started_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn new(name: Option<String>, read_only: bool) -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            name,
            read_only,
            node: None,
            statements: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

// ============================================================================
// LocalTransaction - 기본 구현
// ============================================================================

/// 실행 로컬 트랜잭션
///
/// 트랜잭션 상태는 [`RoutingContext`](super::context::RoutingContext)와 같은
/// 실행 로컬 저장소에 보관되므로 다른 스레드/태스크에는 보이지 않습니다.
///
/// # 예시
///
/// ```rust
/// use sqlroute::{LocalTransaction, Transaction};
///
/// let tx = LocalTransaction;
/// {
///     let guard = LocalTransaction::begin(Some("transfer"), false);
///     assert!(tx.is_active());
///     guard.commit();
/// }
/// assert!(!tx.is_active());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransaction;

impl LocalTransaction {
    /// 트랜잭션 시작
    ///
    /// 이미 열린 트랜잭션이 있으면 그 트랜잭션에 참여하며, 반환된 가드는 종료하지 않습니다.
    #[must_use = "the transaction completes as soon as the guard is dropped"]
    pub fn begin(name: Option<&str>, read_only: bool) -> TransactionGuard {
        let owner = with_state(|state| {
            if state.transaction.is_some() {
                false
            } else {
                state.transaction = Some(TransactionRecord::new(
                    name.map(str::to_string),
                    read_only,
                ));
                true
            }
        });
        TransactionGuard { owner }
    }

    /// 현재 트랜잭션에서 실행된 문장
    pub fn statements() -> Vec<Arc<SqlAttribute>> {
        with_state(|state| {
            state
                .transaction
                .as_ref()
                .map(|tx| tx.statements.clone())
                .unwrap_or_default()
        })
    }

    /// 현재 트랜잭션 시작 시각
    pub fn started_at() -> Option<DateTime<Utc>> {
        with_state(|state| state.transaction.as_ref().map(|tx| tx.started_at))
    }
}

impl Transaction for LocalTransaction {
    fn is_active(&self) -> bool {
        with_state(|state| state.transaction.is_some())
    }

    fn is_read_only(&self) -> bool {
        with_state(|state| state.transaction.as_ref().map_or(false, |tx| tx.read_only))
    }

    fn current_node(&self) -> Option<Arc<NodeAttribute>> {
        with_state(|state| state.transaction.as_ref().and_then(|tx| tx.node.clone()))
    }

    fn register_node(&self, node: Arc<NodeAttribute>, sql: Option<Arc<SqlAttribute>>) {
        with_state(|state| {
            let Some(tx) = state.transaction.as_mut() else {
                return;
            };
            match &tx.node {
                Some(bound) if bound.name() != node.name() => {
                    tracing::warn!(
                        transaction_id = tx.id,
                        bound = %bound.name(),
                        requested = %node.name(),
                        "transaction is already bound to another node"
                    );
                    return;
                }
                Some(_) => {}
                None => tx.node = Some(node),
            }
            if let Some(sql) = sql {
                tx.statements.push(sql);
            }
        });
    }

    fn add_sql(&self, sql: Option<Arc<SqlAttribute>>) {
        with_state(|state| {
            if let (Some(tx), Some(sql)) = (state.transaction.as_mut(), sql) {
                tx.statements.push(sql);
            }
        });
    }

    fn name(&self) -> Option<String> {
        with_state(|state| state.transaction.as_ref().and_then(|tx| tx.name.clone()))
    }

    fn id(&self) -> Option<u64> {
        with_state(|state| state.transaction.as_ref().map(|tx| tx.id))
    }
}

/// 트랜잭션 가드
///
/// drop 시 트랜잭션 기록을 제거합니다.
pub struct TransactionGuard {
    owner: bool,
}

impl TransactionGuard {
    /// 트랜잭션 소유 여부 (중첩 참여가 아닌 경우)
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// 커밋
    pub fn commit(self) {}

    /// 롤백
    pub fn rollback(self) {}
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.owner {
            with_state(|state| state.transaction = None);
        }
    }
}

impl fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionGuard")
            .field("owner", &self.owner)
            .finish()
    }
}
