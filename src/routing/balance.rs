//! 로드 밸런서
//!
//! 후보 노드 집합에서 가중치 기반으로 하나를 선택합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use super::node::NodeAttribute;

/// 로드 밸런싱 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// 가중치 랜덤 (기본값)
    #[default]
    WeightRandom,
    /// 가중치 라운드 로빈
    WeightRoundRobin,
    /// 균등 랜덤
    Random,
}

/// 로드 밸런서
///
/// 후보 목록은 교체 방식으로 갱신되므로 `choose()`는 잠금을 짧게만 잡습니다.
/// `DOWN` 상태 노드는 선택 시점에 후보에서 제외됩니다.
pub struct LoadBalancer {
    /// 정책
    policy: BalancePolicy,
    /// 후보 노드
    options: RwLock<Arc<Vec<Arc<NodeAttribute>>>>,
    /// 난수 생성기
    rng: Mutex<Box<dyn RngCore + Send>>,
    /// 라운드 로빈 현재 가중치 (노드 이름별)
    current_weights: Mutex<HashMap<String, f64>>,
    /// 가중치가 모두 0일 때 사용하는 순환 인덱스
    rotation: AtomicUsize,
}

impl LoadBalancer {
    /// 새 로드 밸런서 생성
    pub fn new(policy: BalancePolicy) -> Self {
        Self::with_rng(policy, StdRng::from_entropy())
    }

    /// 난수 생성기를 지정하여 생성
    pub fn with_rng(policy: BalancePolicy, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            policy,
            options: RwLock::new(Arc::new(Vec::new())),
            rng: Mutex::new(Box::new(rng)),
            current_weights: Mutex::new(HashMap::new()),
            rotation: AtomicUsize::new(0),
        }
    }

    /// 가중치 랜덤 로드 밸런서
    pub fn weight_random() -> Self {
        Self::new(BalancePolicy::WeightRandom)
    }

    /// 가중치 라운드 로빈 로드 밸런서
    pub fn weight_round_robin() -> Self {
        Self::new(BalancePolicy::WeightRoundRobin)
    }

    /// 현재 정책
    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// 후보 추가 (이미 있으면 무시)
    pub fn add_option(&self, node: Arc<NodeAttribute>) {
        let mut guard = self.options.write();
        if guard.iter().any(|n| n.name() == node.name()) {
            return;
        }
        let mut options = (**guard).clone();
        options.push(node);
        *guard = Arc::new(options);
    }

    /// 후보 제거
    pub fn remove_option(&self, name: &str) -> bool {
        let mut guard = self.options.write();
        if !guard.iter().any(|n| n.name() == name) {
            return false;
        }
        let options: Vec<_> = guard.iter().filter(|n| n.name() != name).cloned().collect();
        *guard = Arc::new(options);
        self.current_weights.lock().remove(name);
        true
    }

    /// 후보 목록
    pub fn options(&self) -> Vec<Arc<NodeAttribute>> {
        (**self.options.read()).clone()
    }

    /// 후보 포함 여부
    pub fn contains(&self, name: &str) -> bool {
        self.options.read().iter().any(|n| n.name() == name)
    }

    /// 후보 수
    pub fn len(&self) -> usize {
        self.options.read().len()
    }

    /// 비어있는지 확인
    pub fn is_empty(&self) -> bool {
        self.options.read().is_empty()
    }

    /// 노드 하나 선택
    ///
    /// 가용 후보가 없으면 `None`을 반환합니다.
    pub fn choose(&self) -> Option<Arc<NodeAttribute>> {
        let snapshot = self.options.read().clone();
        let candidates: Vec<&Arc<NodeAttribute>> =
            snapshot.iter().filter(|n| n.is_available()).collect();

        match candidates.len() {
            0 => None,
            1 => Some(candidates[0].clone()),
            _ => {
                let index = match self.policy {
                    BalancePolicy::WeightRandom => self.weighted_random(&candidates),
                    BalancePolicy::WeightRoundRobin => self.weighted_round_robin(&candidates),
                    BalancePolicy::Random => self.rng.lock().gen_range(0..candidates.len()),
                };
                Some(candidates[index].clone())
            }
        }
    }

    /// 누적 가중치 구간에서 균등 선택
    fn weighted_random(&self, candidates: &[&Arc<NodeAttribute>]) -> usize {
        let weights: Vec<f64> = candidates.iter().map(|n| n.weight()).collect();
        let total: f64 = weights.iter().sum();

        let mut rng = self.rng.lock();
        if total <= 0.0 {
            return rng.gen_range(0..candidates.len());
        }

        let point = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        for (index, weight) in weights.iter().enumerate() {
            cumulative += weight;
            if point < cumulative {
                return index;
            }
        }

        // 부동소수점 오차: 마지막 양수 가중치 후보
        weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
    }

    /// 부드러운 가중치 라운드 로빈
    fn weighted_round_robin(&self, candidates: &[&Arc<NodeAttribute>]) -> usize {
        let total: f64 = candidates.iter().map(|n| n.weight()).sum();
        if total <= 0.0 {
            return self.rotation.fetch_add(1, Ordering::Relaxed) % candidates.len();
        }

        let mut current = self.current_weights.lock();
        let mut best = 0;
        let mut best_weight = f64::MIN;
        for (index, node) in candidates.iter().enumerate() {
            let entry = current.entry(node.name().to_string()).or_insert(0.0);
            *entry += node.weight();
            if *entry > best_weight {
                best_weight = *entry;
                best = index;
            }
        }

        if let Some(entry) = current.get_mut(candidates[best].name()) {
            *entry -= total;
        }
        best
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::weight_random()
    }
}

impl fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .options
            .read()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        f.debug_struct("LoadBalancer")
            .field("policy", &self.policy)
            .field("options", &names)
            .finish()
    }
}
