//! 라우팅 컨텍스트
//!
//! 실행 단위로 격리된 라우팅 의도(RouteAttribute) 스택을 관리합니다.
//!
//! # 저장 위치
//!
//! 기본적으로 스레드 로컬에 저장됩니다. 비동기 코드에서는 [`RoutingContext::scope`]로
//! 감싼 future마다 독립된 태스크 로컬 컨텍스트가 생깁니다.
//!
//! # 예시
//!
//! ```rust
//! use sqlroute::{RouteAttribute, RoutingContext};
//!
//! {
//!     let _outer = RoutingContext::enter(RouteAttribute::new());
//!     {
//!         let _inner = RoutingContext::enter(
//!             RouteAttribute::with_nodes(["read_1"]).with_propagation(false),
//!         );
//!         assert_eq!(RoutingContext::current().unwrap().nodes(), ["read_1"]);
//!     }
//!     assert!(RoutingContext::current().unwrap().nodes().is_empty());
//! }
//! assert!(RoutingContext::current().is_none());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::error::{RouteError, RouteResult};
use super::transaction::TransactionRecord;

// ============================================================================
// RouteAttribute - 라우팅 의도
// ============================================================================

/// 선언/강제된 라우팅 의도
#[derive(Clone)]
pub struct RouteAttribute {
    cluster: Option<String>,
    nodes: Vec<String>,
    propagation: bool,
    root: bool,
    prev: Option<Arc<RouteAttribute>>,
}

impl RouteAttribute {
    /// 빈 의도 생성 (전파 활성화)
    pub fn new() -> Self {
        Self {
            cluster: None,
            nodes: Vec::new(),
            propagation: true,
            root: false,
            prev: None,
        }
    }

    /// 노드 목록을 지정한 의도 생성
    pub fn with_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::new()
        }
    }

    /// 클러스터 지정
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// 전파 여부 지정
    pub fn with_propagation(mut self, propagation: bool) -> Self {
        self.propagation = propagation;
        self
    }

    /// 클러스터 이름
    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// 노드 이름 목록
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// 전파 여부
    pub fn propagation(&self) -> bool {
        self.propagation
    }

    /// 실행의 루트 프레임 여부
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// 이전에 활성화되어 있던 의도
    pub fn prev(&self) -> Option<&Arc<RouteAttribute>> {
        self.prev.as_ref()
    }
}

impl Default for RouteAttribute {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteAttribute")
            .field("cluster", &self.cluster)
            .field("nodes", &self.nodes)
            .field("propagation", &self.propagation)
            .field("root", &self.root)
            .field("has_prev", &self.prev.is_some())
            .finish()
    }
}

// ============================================================================
// ExecutionState - 실행 로컬 상태
// ============================================================================

/// 실행 하나에 속한 상태
#[derive(Default)]
pub(crate) struct ExecutionState {
    /// 진입한 프레임 (루트가 맨 앞)
    frames: Vec<Arc<RouteAttribute>>,
    /// 현재 활성 의도
    current: Option<Arc<RouteAttribute>>,
    /// 열린 트랜잭션
    pub(crate) transaction: Option<TransactionRecord>,
}

thread_local! {
    static THREAD_STATE: RefCell<ExecutionState> = RefCell::new(ExecutionState::default());
}

tokio::task_local! {
    static TASK_STATE: RefCell<ExecutionState>;
}

/// 현재 실행의 상태에 접근
///
/// 클로저 안에서 다시 호출하면 안 됩니다.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut ExecutionState) -> R) -> R {
    if TASK_STATE.try_with(|_| ()).is_ok() {
        TASK_STATE.with(|cell| f(&mut cell.borrow_mut()))
    } else {
        THREAD_STATE.with(|cell| f(&mut cell.borrow_mut()))
    }
}

// ============================================================================
// RoutingContext - 라우팅 컨텍스트
// ============================================================================

/// 실행 로컬 라우팅 컨텍스트
pub struct RoutingContext;

impl RoutingContext {
    /// 의도를 현재 의도로 강제
    pub fn force(attr: Arc<RouteAttribute>) {
        with_state(|state| state.current = Some(attr));
    }

    /// 현재 의도
    pub fn current() -> Option<Arc<RouteAttribute>> {
        with_state(|state| state.current.clone())
    }

    /// 의도 제거
    ///
    /// 현재 의도였다면 이전 의도로 돌아갑니다.
    pub fn remove(attr: &Arc<RouteAttribute>) {
        with_state(|state| {
            state.frames.retain(|frame| !Arc::ptr_eq(frame, attr));
            let is_current = state
                .current
                .as_ref()
                .map_or(false, |current| Arc::ptr_eq(current, attr));
            if is_current {
                state.current = attr.prev.clone();
            }
        });
    }

    /// 컨텍스트 전체 초기화
    pub fn clear() {
        with_state(|state| {
            state.frames.clear();
            state.current = None;
        });
    }

    /// 진입한 프레임 수
    pub fn depth() -> usize {
        with_state(|state| state.frames.len())
    }

    /// 의도를 선언한 스코프 진입
    ///
    /// 반환된 가드가 drop될 때 (패닉 포함) 스코프를 빠져나옵니다.
    /// - 첫 프레임은 루트가 되며, 루트가 빠져나가면 스택 전체가 비워집니다.
    /// - 전파가 꺼진 프레임은 자신을 현재 의도로 만들고, 나갈 때 이전 의도를 복원합니다.
    /// - 전파가 켜진 프레임은 호출자의 의도를 그대로 이어받습니다.
    #[must_use = "the scope is exited as soon as the guard is dropped"]
    pub fn enter(attr: RouteAttribute) -> RouteScope {
        with_state(|state| {
            if state.frames.is_empty() {
                let frame = Arc::new(RouteAttribute {
                    root: true,
                    prev: None,
                    ..attr
                });
                state.frames.push(frame.clone());
                state.current = Some(frame);
                RouteScope::new(ScopeExit::Root)
            } else if !attr.propagation {
                let prev = state
                    .current
                    .clone()
                    .or_else(|| state.frames.last().cloned());
                let frame = Arc::new(RouteAttribute {
                    root: false,
                    prev,
                    ..attr
                });
                state.frames.push(frame.clone());
                state.current = Some(frame.clone());
                RouteScope::new(ScopeExit::Isolated(frame))
            } else {
                let previous = state.current.clone();
                if state.current.is_none() {
                    state.current = state.frames.last().cloned();
                }
                RouteScope::new(ScopeExit::Joined(previous))
            }
        })
    }

    /// 의도를 선언한 스코프 안에서 클로저 실행
    pub fn with_route<F, R>(attr: RouteAttribute, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _scope = Self::enter(attr);
        f()
    }

    /// 지정한 노드로 라우팅을 강제한 채 클로저 실행
    ///
    /// 노드 목록이 비어있으면 클로저를 호출하지 않고 실패합니다.
    pub fn execute_on<I, S, F, R>(nodes: I, f: F) -> RouteResult<R>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce() -> R,
    {
        Self::execute_with(RouteAttribute::with_nodes(nodes), f)
    }

    /// 클러스터와 노드를 지정하여 라우팅을 강제한 채 클로저 실행
    pub fn execute_on_cluster<I, S, F, R>(cluster: &str, nodes: I, f: F) -> RouteResult<R>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce() -> R,
    {
        Self::execute_with(RouteAttribute::with_nodes(nodes).with_cluster(cluster), f)
    }

    fn execute_with<F, R>(attr: RouteAttribute, f: F) -> RouteResult<R>
    where
        F: FnOnce() -> R,
    {
        if attr.nodes.is_empty() {
            return Err(RouteError::configuration(
                "scoped override requires at least one node",
            ));
        }
        if let Some(blank) = attr.nodes.iter().find(|n| n.trim().is_empty()) {
            return Err(RouteError::configuration(format!(
                "scoped override contains a blank node name '{}'",
                blank
            )));
        }

        let previous = Self::current();
        Self::force(Arc::new(RouteAttribute {
            propagation: false,
            root: false,
            prev: previous.clone(),
            ..attr
        }));
        let _restore = OverrideGuard { previous };
        Ok(f())
    }

    /// future에 독립된 실행 컨텍스트 부여
    ///
    /// future 안에서의 라우팅 의도와 트랜잭션은 다른 태스크에 보이지 않습니다.
    pub async fn scope<F: Future>(future: F) -> F::Output {
        TASK_STATE
            .scope(RefCell::new(ExecutionState::default()), future)
            .await
    }

    /// 루트 의도를 선언한 독립 실행 컨텍스트로 future 실행
    ///
    /// [`RouteScope`]는 `.await`를 넘겨 다른 스레드로 옮길 수 없으므로, 태스크 전체에
    /// 걸친 의도는 이 함수로 선언합니다.
    pub async fn scope_with<F: Future>(attr: RouteAttribute, future: F) -> F::Output {
        let root = Arc::new(RouteAttribute {
            root: true,
            prev: None,
            ..attr
        });
        let state = ExecutionState {
            frames: vec![root.clone()],
            current: Some(root),
            transaction: None,
        };
        TASK_STATE.scope(RefCell::new(state), future).await
    }
}

// ============================================================================
// RouteScope - 스코프 가드
// ============================================================================

enum ScopeExit {
    /// 루트 프레임: 전체 정리
    Root,
    /// 전파가 꺼진 프레임: 이전 의도 복원
    Isolated(Arc<RouteAttribute>),
    /// 전파가 켜진 프레임: 진입 전 의도 재확인
    Joined(Option<Arc<RouteAttribute>>),
}

/// 스코프 가드
///
/// 진입한 실행(스레드 또는 [`RoutingContext::scope`] 태스크)에서 drop되어야 하므로
/// `Send`가 아닙니다.
///
/// ```compile_fail
/// use sqlroute::{RouteAttribute, RoutingContext};
///
/// let scope = RoutingContext::enter(RouteAttribute::with_nodes(["main"]));
/// std::thread::spawn(move || drop(scope));
/// ```
pub struct RouteScope {
    exit: ScopeExit,
    _not_send: PhantomData<*const ()>,
}

impl RouteScope {
    fn new(exit: ScopeExit) -> Self {
        Self {
            exit,
            _not_send: PhantomData,
        }
    }

    /// 루트 프레임 여부
    pub fn is_root(&self) -> bool {
        matches!(self.exit, ScopeExit::Root)
    }
}

impl Drop for RouteScope {
    fn drop(&mut self) {
        with_state(|state| match &self.exit {
            ScopeExit::Root => {
                state.frames.clear();
                state.current = None;
            }
            ScopeExit::Isolated(frame) => {
                state.frames.retain(|f| !Arc::ptr_eq(f, frame));
                state.current = frame.prev.clone();
            }
            ScopeExit::Joined(previous) => {
                state.current = previous.clone();
            }
        });
    }
}

impl fmt::Debug for RouteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.exit {
            ScopeExit::Root => "root",
            ScopeExit::Isolated(_) => "isolated",
            ScopeExit::Joined(_) => "joined",
        };
        f.debug_struct("RouteScope").field("kind", &kind).finish()
    }
}

/// 스코프 강제 해제 가드
struct OverrideGuard {
    previous: Option<Arc<RouteAttribute>>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => RoutingContext::force(previous),
            None => RoutingContext::clear(),
        }
    }
}
