//! 클러스터
//!
//! 노드 묶음과 쓰기/읽기 역할별 노드 목록, 역할별 로드 밸런서를 관리합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::balance::LoadBalancer;
use super::config::ClusterConfig;
use super::error::{RouteError, RouteResult};
use super::node::{NodeAttribute, NodeRegistry, NodeType};

/// 클러스터
///
/// 생성 후 변경되지 않으며, 구성 변경은 새 클러스터로 교체하는 방식으로 처리합니다.
pub struct Cluster {
    /// 클러스터 설정
    config: ClusterConfig,
    /// 소속 노드
    nodes: BTreeMap<String, Arc<NodeAttribute>>,
    /// 쓰기 가능 노드 이름
    writable: BTreeSet<String>,
    /// 읽기 가능 노드 이름
    readable: BTreeSet<String>,
    /// 읽기 로드 밸런서
    read_balancer: Arc<LoadBalancer>,
    /// 쓰기 로드 밸런서
    write_balancer: Arc<LoadBalancer>,
}

impl Cluster {
    /// 설정과 레지스트리에서 클러스터 생성
    pub fn build(config: ClusterConfig, registry: &NodeRegistry) -> RouteResult<Self> {
        if config.name.trim().is_empty() {
            return Err(RouteError::configuration("cluster name must not be empty"));
        }

        let mut nodes = BTreeMap::new();
        for name in &config.nodes {
            let node = registry.get(name).ok_or_else(|| {
                RouteError::configuration(format!(
                    "cluster '{}': node '{}' does not exist",
                    config.name, name
                ))
            })?;
            if node.node_type() == NodeType::Independent {
                return Err(RouteError::configuration(format!(
                    "cluster '{}': independent node '{}' is not allowed in a cluster",
                    config.name, name
                )));
            }
            nodes.insert(name.clone(), node);
        }

        let writable: BTreeSet<String> = nodes
            .values()
            .filter(|n| n.node_type().can_write())
            .map(|n| n.name().to_string())
            .collect();
        let readable: BTreeSet<String> = nodes
            .values()
            .filter(|n| n.node_type().can_read())
            .map(|n| n.name().to_string())
            .collect();

        if writable.is_empty() {
            return Err(RouteError::configuration(format!(
                "cluster '{}': at least one writable node is required",
                config.name
            )));
        }

        let types: BTreeSet<&str> = nodes.values().filter_map(|n| n.database_type()).collect();
        if types.len() > 1 {
            return Err(RouteError::configuration(format!(
                "cluster '{}': all nodes must have the same database type, found {}",
                config.name,
                types.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let read_balancer = Arc::new(LoadBalancer::new(config.read_load_balance));
        let write_balancer = Arc::new(LoadBalancer::new(config.write_load_balance));
        for node in nodes.values() {
            if readable.contains(node.name()) {
                read_balancer.add_option(node.clone());
            }
            if writable.contains(node.name()) {
                write_balancer.add_option(node.clone());
            }
        }

        Ok(Self {
            config,
            nodes,
            writable,
            readable,
            read_balancer,
            write_balancer,
        })
    }

    /// 클러스터 이름
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// 기본 클러스터 여부
    pub fn is_default(&self) -> bool {
        self.config.default
    }

    /// 클러스터 설정
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// 노드 포함 여부
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// 소속 노드 (이름순)
    pub fn nodes(&self) -> Vec<Arc<NodeAttribute>> {
        self.nodes.values().cloned().collect()
    }

    /// 쓰기 가능 노드 이름
    pub fn writable(&self) -> &BTreeSet<String> {
        &self.writable
    }

    /// 읽기 가능 노드 이름
    pub fn readable(&self) -> &BTreeSet<String> {
        &self.readable
    }

    /// 쓰기 가능 여부
    pub fn is_writable(&self, name: &str) -> bool {
        self.writable.contains(name)
    }

    /// 읽기 로드 밸런서
    pub fn read_balancer(&self) -> &Arc<LoadBalancer> {
        &self.read_balancer
    }

    /// 쓰기 로드 밸런서
    pub fn write_balancer(&self) -> &Arc<LoadBalancer> {
        &self.write_balancer
    }

    /// 노드를 추가한 설정
    pub fn config_with(&self, node: &str) -> ClusterConfig {
        let mut config = self.config.clone();
        config.nodes.insert(node.to_string());
        config
    }

    /// 노드를 제외한 설정
    pub fn config_without(&self, node: &str) -> ClusterConfig {
        let mut config = self.config.clone();
        config.nodes.remove(node);
        config
    }

    /// 현재 상태 스냅샷
    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            name: self.config.name.clone(),
            default: self.config.default,
            nodes: self.nodes.keys().cloned().collect(),
            writable: self.writable.iter().cloned().collect(),
            readable: self.readable.iter().cloned().collect(),
        }
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.config.name)
            .field("default", &self.config.default)
            .field("writable", &self.writable)
            .field("readable", &self.readable)
            .finish()
    }
}

/// 클러스터 스냅샷 (관리 조회용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    /// 클러스터 이름
    pub name: String,
    /// 기본 클러스터 여부
    pub default: bool,
    /// 소속 노드 이름
    pub nodes: Vec<String>,
    /// 쓰기 가능 노드 이름
    pub writable: Vec<String>,
    /// 읽기 가능 노드 이름
    pub readable: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::config::NodeConfig;

    fn registry() -> NodeRegistry {
        let registry = NodeRegistry::new();
        for (name, node_type) in [
            ("write_0", NodeType::Write),
            ("read_0", NodeType::Read),
            ("rw_0", NodeType::ReadWrite),
            ("solo", NodeType::Independent),
        ] {
            let config = NodeConfig::builder(name, format!("mysql://{}", name))
                .node_type(node_type)
                .build();
            registry.add(Arc::new(NodeAttribute::from_config(&config))).unwrap();
        }
        registry
    }

    #[test]
    fn test_cluster_partitions() {
        let registry = registry();
        let cluster = Cluster::build(
            ClusterConfig::new("shop", ["write_0", "read_0", "rw_0"]),
            &registry,
        )
        .unwrap();

        assert_eq!(
            cluster.writable().iter().collect::<Vec<_>>(),
            vec!["rw_0", "write_0"]
        );
        assert_eq!(
            cluster.readable().iter().collect::<Vec<_>>(),
            vec!["read_0", "rw_0"]
        );
        // 읽기/쓰기 노드는 양쪽에 모두 속함
        assert!(cluster.read_balancer().contains("rw_0"));
        assert!(cluster.write_balancer().contains("rw_0"));
        assert!(!cluster.write_balancer().contains("read_0"));
        assert!(cluster.is_writable("write_0"));
        assert!(!cluster.is_writable("read_0"));
    }

    #[test]
    fn test_cluster_requires_writable() {
        let registry = registry();
        let err = Cluster::build(ClusterConfig::new("ro", ["read_0"]), &registry).unwrap_err();
        assert!(err.to_string().contains("at least one writable node"));
    }

    #[test]
    fn test_cluster_rejects_unknown_and_independent() {
        let registry = registry();

        let err = Cluster::build(ClusterConfig::new("c", ["write_0", "ghost"]), &registry).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ghost"));

        let err = Cluster::build(ClusterConfig::new("c", ["write_0", "solo"]), &registry).unwrap_err();
        assert!(err.to_string().contains("independent node 'solo'"));
    }

    #[test]
    fn test_cluster_rejects_mixed_database_types() {
        let registry = NodeRegistry::new();
        for (name, database_type) in [("my", "mysql"), ("pg", "postgresql")] {
            let config = NodeConfig::builder(name, "u")
                .node_type(NodeType::Write)
                .database_type(database_type)
                .build();
            registry.add(Arc::new(NodeAttribute::from_config(&config))).unwrap();
        }

        let err = Cluster::build(ClusterConfig::new("c", ["my", "pg"]), &registry).unwrap_err();
        assert!(err.to_string().contains("same database type"));
    }

    #[test]
    fn test_cluster_config_with_without() {
        let registry = registry();
        let cluster = Cluster::build(ClusterConfig::new("c", ["write_0"]), &registry).unwrap();

        let grown = cluster.config_with("read_0");
        assert!(grown.nodes.contains("read_0"));

        let shrunk = cluster.config_without("write_0");
        assert!(shrunk.nodes.is_empty());
        // 원본은 변경되지 않음
        assert!(cluster.contains("write_0"));
    }

    #[test]
    fn test_cluster_snapshot() {
        let registry = registry();
        let cluster = Cluster::build(
            ClusterConfig::new("c", ["write_0", "read_0"]).with_default(),
            &registry,
        )
        .unwrap();

        let snapshot = cluster.snapshot();
        assert_eq!(snapshot.name, "c");
        assert!(snapshot.default);
        assert_eq!(snapshot.nodes, vec!["read_0", "write_0"]);
    }
}
