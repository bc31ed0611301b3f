use std::fmt;
use std::time::Duration;

use crate::cmd::Cmd;
use crate::types::{ErrorKind, RedisResult, Value};

/// A cluster node endpoint.
///
/// The canonical textual form `host:port` (the `Display` impl) is the
/// key under which the node is tracked in the connection pool and in
/// the slot map; redirect targets arrive from the server in the same
/// form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    /// Hostname or IP of the node.
    pub host: String,
    /// Port of the node.
    pub port: u16,
}

impl NodeAddr {
    /// Creates a node address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> NodeAddr {
        NodeAddr {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The pool and the slot map key on the return value of this
        // function.
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Converts an object into a [`NodeAddr`].
pub trait IntoNodeAddr {
    /// Converts the object into a node address.
    fn into_node_addr(self) -> RedisResult<NodeAddr>;
}

impl IntoNodeAddr for NodeAddr {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        Ok(self)
    }
}

impl IntoNodeAddr for (&str, u16) {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        Ok(NodeAddr::new(self.0, self.1))
    }
}

impl IntoNodeAddr for (String, u16) {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        Ok(NodeAddr::new(self.0, self.1))
    }
}

impl IntoNodeAddr for &str {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        let addr = self
            .strip_prefix("redis://")
            .unwrap_or(self)
            .trim_end_matches('/');
        let (host, port) = match addr.rsplit_once(':') {
            Some(parts) => parts,
            None => fail!((
                ErrorKind::InvalidClientConfig,
                "Node address is missing a port",
                self.to_string()
            )),
        };
        let port: u16 = match port.parse() {
            Ok(port) => port,
            Err(_) => fail!((
                ErrorKind::InvalidClientConfig,
                "Node address has an invalid port",
                self.to_string()
            )),
        };
        if host.is_empty() {
            fail!((
                ErrorKind::InvalidClientConfig,
                "Node address has an empty host",
                self.to_string()
            ));
        }
        Ok(NodeAddr::new(host, port))
    }
}

impl IntoNodeAddr for String {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        self.as_str().into_node_addr()
    }
}

impl IntoNodeAddr for &String {
    fn into_node_addr(self) -> RedisResult<NodeAddr> {
        self.as_str().into_node_addr()
    }
}

/// Options the cluster forwards untouched to the connection factory.
///
/// The routing engine never interprets these; they exist so a backend
/// can authenticate and apply per-connection timeouts the same way on
/// every node the cluster discovers.
#[derive(Clone, Debug, Default)]
pub struct ConnectionParams {
    /// Username for ACL authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Time limit for establishing the connection.
    pub connect_timeout: Option<Duration>,
    /// Per-response read timeout.
    pub read_timeout: Option<Duration>,
    /// Per-command write timeout.
    pub write_timeout: Option<Duration>,
}

/// Implemented by any object that can dispatch a command and produce
/// its reply.
///
/// Node backends implement this for a single server; the cluster
/// connection implements it for the whole cluster, which is what lets
/// [`Cmd::query`](crate::Cmd::query) and the
/// [`Commands`](crate::Commands) helpers run against either.
pub trait ConnectionLike {
    /// Sends a command and waits for its reply.
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value>;

    /// Returns the connection status.
    fn is_open(&self) -> bool;

    /// Verifies the connection is still usable, for example by issuing
    /// a `PING`.
    fn check_connection(&mut self) -> bool;
}

/// The factory and pipelining seam a node backend provides to the
/// cluster.
///
/// `connect` stands in for the caller-supplied client factory: the
/// cluster invokes it for seed nodes, discovered nodes, and redirect
/// targets alike.  `send_command`/`recv_response` expose the backend's
/// FIFO pipelining so the cluster can batch several commands to one
/// node before reading any reply.
pub trait Connect: Sized {
    /// Connects to the given endpoint.
    fn connect(addr: &NodeAddr, params: &ConnectionParams) -> RedisResult<Self>;

    /// Queues a command without waiting for its reply.
    fn send_command(&mut self, cmd: &Cmd) -> RedisResult<()>;

    /// Reads the next pending reply, in the order commands were sent.
    fn recv_response(&mut self) -> RedisResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let addr = "127.0.0.1:7000".into_node_addr().unwrap();
        assert_eq!(addr, NodeAddr::new("127.0.0.1", 7000));
        assert_eq!(addr.to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_parse_redis_scheme() {
        let addr = "redis://10.0.0.1:6379/".into_node_addr().unwrap();
        assert_eq!(addr, NodeAddr::new("10.0.0.1", 6379));
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!("localhost".into_node_addr().is_err());
        assert!("localhost:notaport".into_node_addr().is_err());
        assert!(":6379".into_node_addr().is_err());
    }

    #[test]
    fn test_tuple_addrs() {
        let addr = ("node1", 6380).into_node_addr().unwrap();
        assert_eq!(addr.to_string(), "node1:6380");
    }
}
