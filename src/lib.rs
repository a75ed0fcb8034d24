//! # sqlroute
//!
//! The decision core of a SQL-level database routing layer: given a SQL statement
//! and the ambient execution context, it decides which backend database node
//! (among read/write replicas, optionally grouped into clusters) executes it.
//!
//! ## Features
//!
//! - **SQL classification** - Statement kind, read/write flag and referenced tables via `sqlparser`
//! - **Inline hints** - `/*!nodeName=write_0;*/` comments route a statement directly
//! - **Read/write splitting** - Writes go to writable nodes, reads to readable nodes
//! - **Weighted load balancing** - Weighted random and smooth weighted round-robin
//! - **Transaction affinity** - Every statement of an open transaction hits one node
//! - **Routing context** - Execution-scoped, propagation-aware routing intent
//! - **Health monitoring** - Periodic heartbeat probes on Tokio flip node state
//!
//! ## Quick Start
//!
//! ```rust
//! use sqlroute::{ClusterConfig, NodeConfig, NodeType, RouterConfig, SqlRouter};
//!
//! let config = RouterConfig::builder()
//!     .node(NodeConfig::builder("write_0", "mysql://10.0.0.1/shop").node_type(NodeType::Write).build())
//!     .node(NodeConfig::builder("read_0", "mysql://10.0.0.2/shop").node_type(NodeType::Read).build())
//!     .cluster(ClusterConfig::new("shop", ["write_0", "read_0"]).with_default())
//!     .build()?;
//! let router = SqlRouter::new(config)?;
//!
//! let info = router.route(Some("update orders set state = 'PAID' where id = 1"))?;
//! assert_eq!(info.node_name(), "write_0");
//!
//! let info = router.route(Some("select * from orders"))?;
//! assert_eq!(info.node_name(), "read_0");
//! # Ok::<(), sqlroute::RouteError>(())
//! ```
//!
//! ## Hints
//!
//! A leading hint comment overrides the read/write split:
//!
//! ```rust
//! # use sqlroute::{NodeConfig, NodeType, RouterConfig, SqlRouter};
//! # let config = RouterConfig::builder()
//! #     .node(NodeConfig::builder("write_0", "u").node_type(NodeType::Write).build())
//! #     .node(NodeConfig::builder("read_0", "u").node_type(NodeType::Read).build())
//! #     .build()?;
//! # let router = SqlRouter::new(config)?;
//! let info = router.route(Some("/*!nodeName=write_0;*/ select * from orders"))?;
//! assert_eq!(info.node_name(), "write_0");
//! assert_eq!(info.sql().unwrap().native_sql(), "select * from orders");
//!
//! // Unknown nodes are configuration errors
//! let err = router.route(Some("/*!nodeName=write_9;*/ select 1")).unwrap_err();
//! assert!(err.is_configuration());
//! # Ok::<(), sqlroute::RouteError>(())
//! ```
//!
//! ## Routing Context
//!
//! Calling code declares routing intent for a scope:
//!
//! ```rust
//! # use sqlroute::{NodeConfig, NodeType, RouterConfig, SqlRouter};
//! use sqlroute::RoutingContext;
//! # let config = RouterConfig::builder()
//! #     .node(NodeConfig::builder("write_0", "u").node_type(NodeType::Write).build())
//! #     .node(NodeConfig::builder("read_0", "u").node_type(NodeType::Read).build())
//! #     .build()?;
//! # let router = SqlRouter::new(config)?;
//! let node = RoutingContext::execute_on(["read_0"], || {
//!     router.route(Some("insert into audit values (1)")).map(|i| i.node_name().to_string())
//! })??;
//! assert_eq!(node, "read_0");
//! # Ok::<(), sqlroute::RouteError>(())
//! ```
//!
//! ## Transactions
//!
//! ```rust
//! # use sqlroute::{NodeConfig, NodeType, RouterConfig, SqlRouter};
//! use sqlroute::LocalTransaction;
//! # let config = RouterConfig::builder()
//! #     .node(NodeConfig::builder("write_0", "u").node_type(NodeType::Write).weight(1.0).build())
//! #     .node(NodeConfig::builder("write_1", "u").node_type(NodeType::Write).weight(1.0).build())
//! #     .build()?;
//! # let router = SqlRouter::new(config)?;
//! let tx = LocalTransaction::begin(Some("checkout"), false);
//! let first = router.route(Some("insert into orders values (1)"))?;
//! for _ in 0..10 {
//!     let next = router.route(Some("update stock set qty = qty - 1"))?;
//!     assert_eq!(next.node_name(), first.node_name());
//! }
//! tx.commit();
//! # Ok::<(), sqlroute::RouteError>(())
//! ```
//!
//! ## Configuration
//!
//! Routers are usually built from a TOML file with [`RouterConfig::from_file`].
//!
//! ## Modules
//!
//! - [`routing`] - Nodes, clusters, load balancers, rules, context and the router
//! - [`sql`] - SQL classification and inline hints
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod routing;
pub mod sql;

// Re-exports for convenience
pub use routing::{
    BalancePolicy, ClusterConfig, FailBehavior, LoadBalancer, LocalTransaction, NodeAttribute,
    NodeConfig, NodeProbe, NodeState, NodeType, RouteAttribute, RouteError, RouteInfo,
    RouteResult, RouterConfig, RoutingContext, RoutingListener, SqlRouter, Transaction,
};

pub use sql::{SqlAttribute, SqlClassifier, SqlHint, SqlType};
