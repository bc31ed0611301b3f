//! redis-cluster is the routing and reliability engine of a Rust client
//! for Redis Cluster.  It discovers and maintains the cluster's slot
//! topology, routes every command to the node owning its key (honoring
//! hash-tag semantics and an optional replica-read policy), follows
//! `MOVED`/`ASK` redirects, retries `TRYAGAIN`/`CLUSTERDOWN` with
//! exponential backoff, splits multi-key commands that span slots, and
//! manages the per-node connection pool.
//!
//! The crate deliberately does not speak the wire protocol.  It is
//! generic over a node backend implementing [`ConnectionLike`] and
//! [`Connect`]: the backend dials a single node, pipelines commands
//! FIFO, and translates server error lines through
//! [`make_server_error`].  The same seam is what test doubles plug
//! into.
//!
//! Note that cluster support does not cover pubsub functionality.
//!
//! # Basic Operation
//!
//! ```rust,no_run
//! use redis_cluster::{Commands, ClusterClient};
//! # use redis_cluster::*;
//! # struct Backend;
//! # impl ConnectionLike for Backend {
//! #     fn req_command(&mut self, _: &Cmd) -> RedisResult<Value> { todo!() }
//! #     fn is_open(&self) -> bool { true }
//! #     fn check_connection(&mut self) -> bool { true }
//! # }
//! # impl Connect for Backend {
//! #     fn connect(_: &NodeAddr, _: &ConnectionParams) -> RedisResult<Self> { todo!() }
//! #     fn send_command(&mut self, _: &Cmd) -> RedisResult<()> { todo!() }
//! #     fn recv_response(&mut self) -> RedisResult<Value> { todo!() }
//! # }
//!
//! let nodes = vec!["127.0.0.1:6379", "127.0.0.1:6378", "127.0.0.1:6377"];
//! let client = ClusterClient::new(nodes).unwrap();
//! let mut connection = client.get_connection::<Backend>().unwrap();
//!
//! let _: () = connection.set("test", "test_data").unwrap();
//! let rv: String = connection.get("test").unwrap();
//!
//! assert_eq!(rv, "test_data");
//! ```
//!
//! # Pipelining
//!
//! [`cluster_pipe`] builds a batch that is grouped per destination
//! node, dispatched without waiting for intermediate replies, and
//! reassembled in submission order.
//!
//! # Events
//!
//! Besides per-call results, a [`ClusterConnection`] publishes
//! lifecycle notifications ([`ClusterEvent`]) to any subscriber:
//! `Ready` when the first node comes up, `Unready` when the last one
//! goes down, `ConnectionError` when a node connection breaks, and
//! `End` once `quit` has terminated everything.

#![deny(non_camel_case_types)]
#![warn(missing_docs)]

mod macros;

mod cluster;
mod cluster_client;
mod cluster_pipeline;
mod cluster_routing;
mod cluster_slotmap;
mod cluster_topology;
mod cmd;
mod commands;
mod connection;
mod events;
mod types;

pub use crate::cluster::ClusterConnection;
pub use crate::cluster_client::{ClusterClient, ClusterClientBuilder, QueuePolicy};
pub use crate::cluster_pipeline::{cluster_pipe, ClusterPipeline};
pub use crate::cluster_routing::{get_slot, ReadFromReplicas};
pub use crate::cmd::{cmd, Cmd};
pub use crate::commands::Commands;
pub use crate::connection::{
    Connect, ConnectionLike, ConnectionParams, IntoNodeAddr, NodeAddr,
};
pub use crate::events::ClusterEvent;
pub use crate::types::{
    from_owned_redis_value, from_redis_value, make_server_error, ErrorKind, FromRedisValue,
    RedisError, RedisResult, RedisWrite, ToRedisArgs, Value,
};
