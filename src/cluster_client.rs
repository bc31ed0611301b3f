use std::time::Duration;

use crate::cluster::ClusterConnection;
use crate::cluster_routing::ReadFromReplicas;
use crate::connection::{Connect, ConnectionLike, ConnectionParams, IntoNodeAddr, NodeAddr};
use crate::types::{ErrorKind, RedisResult};

/// What happens when another refresh request arrives while the
/// pending-refresh queue is already full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Evict the eldest queued waiter, failing it with
    /// `max slot queue length reached`, and admit the newcomer.  This
    /// is the default.
    #[default]
    EvictOldest,
    /// Reject the newcomer with `max slot queue length reached`;
    /// waiters already queued keep their place.
    RejectNew,
}

/// Redis cluster specific parameters.
#[derive(Clone)]
pub(crate) struct ClusterParams {
    pub(crate) retries: u32,
    pub(crate) read_from_replicas: ReadFromReplicas,
    pub(crate) slot_refresh_interval: Option<Duration>,
    pub(crate) ready_timeout: Option<Duration>,
    pub(crate) max_queue_length: usize,
    pub(crate) queue_policy: QueuePolicy,
    pub(crate) connection_params: ConnectionParams,
}

impl Default for ClusterParams {
    fn default() -> Self {
        const DEFAULT_RETRIES: u32 = 16;
        const DEFAULT_MAX_QUEUE_LENGTH: usize = 16;
        Self {
            retries: DEFAULT_RETRIES,
            read_from_replicas: ReadFromReplicas::Never,
            slot_refresh_interval: None,
            ready_timeout: None,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
            queue_policy: QueuePolicy::default(),
            connection_params: ConnectionParams::default(),
        }
    }
}

/// Used to configure and build a [`ClusterClient`].
pub struct ClusterClientBuilder {
    initial_nodes: RedisResult<Vec<NodeAddr>>,
    params: ClusterParams,
}

impl ClusterClientBuilder {
    /// Creates a new `ClusterClientBuilder` with the provided initial
    /// nodes.
    ///
    /// This is the same as `ClusterClient::builder(initial_nodes)`.
    pub fn new<T: IntoNodeAddr>(initial_nodes: impl IntoIterator<Item = T>) -> ClusterClientBuilder {
        ClusterClientBuilder {
            initial_nodes: initial_nodes
                .into_iter()
                .map(IntoNodeAddr::into_node_addr)
                .collect(),
            params: ClusterParams::default(),
        }
    }

    /// Creates a new [`ClusterClient`] from the parameters.
    ///
    /// This performs basic checks on the seed addresses but does not
    /// create any connection yet.
    ///
    /// # Errors
    ///
    /// Upon failure to parse the initial nodes or if no node was given,
    /// an error is returned.
    pub fn build(self) -> RedisResult<ClusterClient> {
        let initial_nodes = self.initial_nodes?;
        if initial_nodes.is_empty() {
            fail!((
                ErrorKind::InvalidClientConfig,
                "Initial nodes can't be empty"
            ));
        }

        Ok(ClusterClient {
            initial_nodes,
            params: self.params,
        })
    }

    /// Sets the total number of attempts (initial dispatch plus
    /// redirects and retries) allowed per command.  Defaults to 16.
    pub fn retries(mut self, retries: u32) -> ClusterClientBuilder {
        self.params.retries = retries.max(1);
        self
    }

    /// Sets the replica read policy (default: never read from
    /// replicas).
    pub fn read_from_replicas(mut self, policy: ReadFromReplicas) -> ClusterClientBuilder {
        self.params.read_from_replicas = policy;
        self
    }

    /// Re-runs slot discovery every `interval`, in addition to the
    /// refreshes triggered by redirects and connection errors.
    pub fn slot_refresh_interval(mut self, interval: Duration) -> ClusterClientBuilder {
        self.params.slot_refresh_interval = Some(interval);
        self
    }

    /// Caps how long discovery waits for a first usable node before
    /// failing with `ready timeout reached`.  Without it discovery
    /// keeps waiting for a node to come up.
    pub fn ready_timeout(mut self, timeout: Duration) -> ClusterClientBuilder {
        self.params.ready_timeout = Some(timeout);
        self
    }

    /// Bounds the queue of callers waiting on an in-flight slot
    /// refresh.  Defaults to 16.
    pub fn max_queue_length(mut self, len: usize) -> ClusterClientBuilder {
        self.params.max_queue_length = len;
        self
    }

    /// Selects the overflow behavior of the pending-refresh queue.
    pub fn queue_policy(mut self, policy: QueuePolicy) -> ClusterClientBuilder {
        self.params.queue_policy = policy;
        self
    }

    /// Sets the username forwarded to the connection factory.
    pub fn username(mut self, username: String) -> ClusterClientBuilder {
        self.params.connection_params.username = Some(username);
        self
    }

    /// Sets the password forwarded to the connection factory.
    pub fn password(mut self, password: String) -> ClusterClientBuilder {
        self.params.connection_params.password = Some(password);
        self
    }

    /// Sets the timeout for connecting to new nodes.
    pub fn connection_timeout(mut self, timeout: Duration) -> ClusterClientBuilder {
        self.params.connection_params.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-response read timeout forwarded to the connection
    /// factory.
    pub fn read_timeout(mut self, timeout: Duration) -> ClusterClientBuilder {
        self.params.connection_params.read_timeout = Some(timeout);
        self
    }

    /// Sets the write timeout forwarded to the connection factory.
    pub fn write_timeout(mut self, timeout: Duration) -> ClusterClientBuilder {
        self.params.connection_params.write_timeout = Some(timeout);
        self
    }
}

/// A redis cluster client: validated seed addresses plus the cluster
/// parameters.  Producing connections is cheap; all networking happens
/// in [`ClusterConnection`].
#[derive(Clone)]
pub struct ClusterClient {
    initial_nodes: Vec<NodeAddr>,
    params: ClusterParams,
}

impl ClusterClient {
    /// Creates a `ClusterClient` with the default parameters.
    ///
    /// This does not create connections to the cluster; it only
    /// performs basic checks on the seed addresses.
    pub fn new<T: IntoNodeAddr>(
        initial_nodes: impl IntoIterator<Item = T>,
    ) -> RedisResult<ClusterClient> {
        Self::builder(initial_nodes).build()
    }

    /// Creates a [`ClusterClientBuilder`] with the provided initial
    /// nodes.
    pub fn builder<T: IntoNodeAddr>(
        initial_nodes: impl IntoIterator<Item = T>,
    ) -> ClusterClientBuilder {
        ClusterClientBuilder::new(initial_nodes)
    }

    /// Connects to the cluster through the given node backend `C` and
    /// returns a [`ClusterConnection`].
    ///
    /// `C` is the connection factory of the cluster: it is invoked for
    /// seed nodes, discovered nodes, and redirect targets alike, which
    /// is also what test doubles hook into.
    ///
    /// # Errors
    ///
    /// An error is returned if no seed node becomes usable within the
    /// ready timeout or the initial slot discovery fails.
    pub fn get_connection<C>(&self) -> RedisResult<ClusterConnection<C>>
    where
        C: ConnectionLike + Connect + Send + 'static,
    {
        ClusterConnection::new(self.params.clone(), self.initial_nodes.clone())
    }
}
