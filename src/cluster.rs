//! The cluster routing and reliability engine.
//!
//! [`ClusterConnection`] owns the connection pool, the slot-map
//! snapshot, and the pending-refresh queue, and drives the per-command
//! redirect/retry state machine.  It is a cheap-to-clone handle; all
//! shared state lives behind one pool mutex plus an atomically swapped
//! slot-map snapshot, so clones can be used from multiple threads.
//!
//! # Example
//! ```rust,no_run
//! use redis_cluster::{Commands, ClusterClient};
//! # struct MyBackend;
//! # impl redis_cluster::ConnectionLike for MyBackend {
//! #     fn req_command(&mut self, _: &redis_cluster::Cmd) -> redis_cluster::RedisResult<redis_cluster::Value> { todo!() }
//! #     fn is_open(&self) -> bool { true }
//! #     fn check_connection(&mut self) -> bool { true }
//! # }
//! # impl redis_cluster::Connect for MyBackend {
//! #     fn connect(_: &redis_cluster::NodeAddr, _: &redis_cluster::ConnectionParams) -> redis_cluster::RedisResult<Self> { todo!() }
//! #     fn send_command(&mut self, _: &redis_cluster::Cmd) -> redis_cluster::RedisResult<()> { todo!() }
//! #     fn recv_response(&mut self) -> redis_cluster::RedisResult<redis_cluster::Value> { todo!() }
//! # }
//!
//! let client = ClusterClient::new(vec!["127.0.0.1:7000", "127.0.0.1:7001"]).unwrap();
//! let mut connection = client.get_connection::<MyBackend>().unwrap();
//!
//! let _: () = connection.set("test", "test_data").unwrap();
//! let rv: String = connection.get("test").unwrap();
//!
//! assert_eq!(rv, "test_data");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use log::{debug, trace, warn};
use rand::seq::IteratorRandom;
use rand::thread_rng;

use crate::cluster_client::{ClusterParams, QueuePolicy};
use crate::cluster_pipeline::ClusterPipeline;
use crate::cluster_routing::{node_index, RoutingInfo};
use crate::cluster_slotmap::SlotMap;
use crate::cluster_topology::parse_slots;
use crate::cmd::{cmd, Cmd};
use crate::commands::{multi_key_spec, MultiKeySpec};
use crate::connection::{Connect, ConnectionLike, IntoNodeAddr, NodeAddr};
use crate::events::{ClusterEvent, EventBus};
use crate::types::{ErrorKind, RedisError, RedisResult, Value};

/// How long to wait between reconnection sweeps while no node is
/// usable.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A pooled node client.
///
/// `read_mode_replica` tracks whether the last routing directive sent
/// to this node enabled replica reads, so redundant mode switches are
/// skipped.
struct Node<C> {
    conn: C,
    read_mode_replica: bool,
}

impl<C> Node<C> {
    fn new(conn: C) -> Node<C> {
        Node {
            conn,
            read_mode_replica: false,
        }
    }
}

/// The connection pool: at most one live client per `host:port`.
///
/// `None` marks a tombstone; the endpoint disconnected and is recreated
/// lazily by the next `get_or_connect`.  Tombstones are only dropped
/// when a slot refresh reveals the endpoint left the cluster.
struct NodePool<C> {
    nodes: HashMap<String, Option<Node<C>>>,
    ready: bool,
}

impl<C> NodePool<C> {
    fn new() -> NodePool<C> {
        NodePool {
            nodes: HashMap::new(),
            ready: false,
        }
    }

    fn live_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_some()).count()
    }

    fn get_live_mut(&mut self, addr: &str) -> Option<&mut Node<C>> {
        self.nodes.get_mut(addr).and_then(Option::as_mut)
    }

    fn random_live_addr(&self, excludes: &HashSet<String>) -> Option<String> {
        self.nodes
            .iter()
            .filter(|(addr, node)| node.is_some() && !excludes.contains(*addr))
            .map(|(addr, _)| addr)
            .choose(&mut thread_rng())
            .cloned()
    }
}

struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<Sender<RedisResult<()>>>,
}

struct ClusterInner<C> {
    params: ClusterParams,
    initial_nodes: Vec<NodeAddr>,
    pool: Mutex<NodePool<C>>,
    slots: ArcSwap<SlotMap>,
    refresh: Mutex<RefreshState>,
    quitting: AtomicBool,
    events: EventBus,
    // The periodic refresh thread parks here; quit flips the flag and
    // notifies.
    shutdown: (Mutex<bool>, Condvar),
}

/// A connection to a redis cluster, generic over the node backend `C`.
pub struct ClusterConnection<C> {
    inner: Arc<ClusterInner<C>>,
}

impl<C> Clone for ClusterConnection<C> {
    fn clone(&self) -> Self {
        ClusterConnection {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for ClusterConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection").finish()
    }
}

// Backoff before retrying after TRYAGAIN or CLUSTERDOWN:
// 10ms * 2^(16 - max(attempts_left, 9)), capped at 1280ms.
fn retry_wait(attempts_left: u32) -> Duration {
    let exp = 16u32.saturating_sub(attempts_left.max(9)).min(7);
    Duration::from_millis((1u64 << exp) * 10)
}

fn no_key_error(command: &Cmd) -> RedisError {
    let name = command
        .arg_idx(0)
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .unwrap_or_default();
    RedisError::from((
        ErrorKind::ClientError,
        "no key for command",
        name,
    ))
}

fn quitting_error() -> RedisError {
    RedisError::from((ErrorKind::ClientError, "cluster is quitting"))
}

fn queue_full_error() -> RedisError {
    RedisError::from((ErrorKind::ClientError, "max slot queue length reached"))
}

impl<C> ClusterConnection<C>
where
    C: ConnectionLike + Connect + Send + 'static,
{
    pub(crate) fn new(
        params: ClusterParams,
        initial_nodes: Vec<NodeAddr>,
    ) -> RedisResult<ClusterConnection<C>> {
        let connection = ClusterConnection {
            inner: Arc::new(ClusterInner {
                params,
                initial_nodes,
                pool: Mutex::new(NodePool::new()),
                slots: ArcSwap::from_pointee(SlotMap::new()),
                refresh: Mutex::new(RefreshState {
                    in_flight: false,
                    waiters: VecDeque::new(),
                }),
                quitting: AtomicBool::new(false),
                events: EventBus::new(),
                shutdown: (Mutex::new(false), Condvar::new()),
            }),
        };
        connection.create_initial_connections()?;
        connection.refresh_slots()?;

        if let Some(interval) = connection.inner.params.slot_refresh_interval {
            let weak = Arc::downgrade(&connection.inner);
            thread::Builder::new()
                .name("cluster-slot-refresh".to_string())
                .spawn(move || refresh_timer_loop(weak, interval))?;
        }

        Ok(connection)
    }

    /// Subscribes to lifecycle and error events of this cluster.
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<ClusterEvent> {
        self.inner.events.subscribe()
    }

    /// Dispatches a command, discarding its result.  Errors are routed
    /// to the cluster's event stream instead of being returned.
    pub fn execute(&mut self, command: &Cmd) {
        if let Err(err) = self.req_command(command) {
            self.inner.events.publish(ClusterEvent::Error(err));
        }
    }

    /// Terminates all pooled connections and shuts the cluster down.
    ///
    /// Commands submitted afterwards fail with `cluster is quitting`.
    /// The first error encountered while quitting individual nodes is
    /// returned after every node has been handled.
    pub fn quit(&mut self) -> RedisResult<()> {
        if self.inner.quitting.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let (lock, cvar) = &self.inner.shutdown;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }

        let quit_cmd = cmd("QUIT");
        let mut first_err = None;
        {
            let mut pool = self.inner.pool.lock().unwrap();
            let addrs: Vec<String> = pool.nodes.keys().cloned().collect();
            for addr in addrs {
                if let Some(mut node) = pool.nodes.get_mut(&addr).and_then(Option::take) {
                    if let Err(err) = node.conn.req_command(&quit_cmd) {
                        debug!("error quitting node {addr}: {err}");
                        first_err = first_err.or(Some(err));
                    }
                }
            }
            if pool.ready {
                pool.ready = false;
                self.inner.events.publish(ClusterEvent::Unready);
            }
        }
        self.inner.events.publish(ClusterEvent::End);

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Re-runs slot discovery and swaps in the freshly built slot map.
    ///
    /// At most one discovery is in flight at a time: callers arriving
    /// while one runs wait for its outcome on the pending queue, whose
    /// capacity and overflow behavior come from the cluster
    /// configuration.
    pub fn refresh_slots(&self) -> RedisResult<()> {
        if self.inner.quitting() {
            return Err(quitting_error());
        }

        let rx = {
            let mut state = self.inner.refresh.lock().unwrap();
            if state.in_flight {
                let (tx, rx) = channel();
                if state.waiters.len() >= self.inner.params.max_queue_length {
                    match self.inner.params.queue_policy {
                        QueuePolicy::EvictOldest => {
                            if let Some(evicted) = state.waiters.pop_front() {
                                let _ = evicted.send(Err(queue_full_error()));
                            }
                            state.waiters.push_back(tx);
                        }
                        QueuePolicy::RejectNew => return Err(queue_full_error()),
                    }
                } else {
                    state.waiters.push_back(tx);
                }
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = rx {
            return match rx.recv() {
                Ok(result) => result,
                // The discovery holder vanished without delivering.
                Err(_) => Err(queue_full_error()),
            };
        }

        let result = self.do_refresh();
        let mut state = self.inner.refresh.lock().unwrap();
        state.in_flight = false;
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
        result
    }

    // One full discovery: ask a random usable node for the slot
    // allocation, excluding nodes that already failed to answer.
    fn do_refresh(&self) -> RedisResult<()> {
        let slots_cmd = {
            let mut c = cmd("CLUSTER");
            c.arg("SLOTS");
            c
        };
        let mut excludes = HashSet::new();
        let mut node_errors: Vec<(String, RedisError)> = Vec::new();

        loop {
            if self.inner.quitting() {
                return Err(quitting_error());
            }

            let addr = {
                let pool = self.inner.pool.lock().unwrap();
                if pool.live_count() == 0 {
                    drop(pool);
                    // Nobody to ask yet; wait for a seed to come up.
                    self.create_initial_connections()?;
                    continue;
                }
                match pool.random_live_addr(&excludes) {
                    Some(addr) => addr,
                    // Every live node has been asked and failed.
                    None => break,
                }
            };

            let reply = {
                let mut pool = self.inner.pool.lock().unwrap();
                match pool.get_live_mut(&addr) {
                    Some(node) => node.conn.req_command(&slots_cmd),
                    None => {
                        excludes.insert(addr);
                        continue;
                    }
                }
            };

            let slots = reply.and_then(|value| {
                let slots = parse_slots(&value)?;
                if slots.is_empty() {
                    fail!((
                        ErrorKind::ResponseError,
                        "didn't get any slots from server"
                    ));
                }
                Ok(slots)
            });

            match slots {
                Ok(slots) => {
                    let new_map = SlotMap::from_slots(&slots);
                    let keep: HashSet<String> =
                        new_map.all_addresses().iter().map(|a| a.to_string()).collect();
                    {
                        let mut pool = self.inner.pool.lock().unwrap();
                        let quit_cmd = cmd("QUIT");
                        for (addr, entry) in pool.nodes.iter_mut() {
                            if !keep.contains(addr) {
                                if let Some(mut node) = entry.take() {
                                    debug!("node {addr} left the cluster, quitting it");
                                    let _ = node.conn.req_command(&quit_cmd);
                                }
                            }
                        }
                        self.check_unready(&mut pool);
                    }
                    self.inner.slots.store(Arc::new(new_map));
                    trace!("slot map refreshed from {addr} ({} ranges)", slots.len());
                    return Ok(());
                }
                Err(err) => {
                    warn!("slot discovery via {addr} failed: {err}");
                    node_errors.push((addr.clone(), err));
                    excludes.insert(addr);
                }
            }
        }

        let detail = node_errors
            .iter()
            .map(|(addr, err)| format!("{addr}: {err}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(RedisError::from((
            ErrorKind::ResponseError,
            "couldn't get slot allocation",
            detail,
        )))
    }

    // Fire-and-forget refresh; the caller never waits on the outcome.
    fn trigger_refresh(&self) {
        if self.inner.quitting() {
            return;
        }
        let connection = self.clone();
        let _ = thread::Builder::new()
            .name("cluster-refresh".to_string())
            .spawn(move || {
                if let Err(err) = connection.refresh_slots() {
                    debug!("background slot refresh failed: {err}");
                }
            });
    }

    // Connects the seed endpoints until at least one is usable, bounded
    // by the configured ready timeout.
    fn create_initial_connections(&self) -> RedisResult<()> {
        let deadline = self
            .inner
            .params
            .ready_timeout
            .map(|timeout| Instant::now() + timeout);

        loop {
            if self.inner.quitting() {
                return Err(quitting_error());
            }

            {
                let mut pool = self.inner.pool.lock().unwrap();
                for addr in &self.inner.initial_nodes {
                    let key = addr.to_string();
                    if pool.get_live_mut(&key).is_some() {
                        continue;
                    }
                    match C::connect(addr, &self.inner.params.connection_params) {
                        Ok(conn) => {
                            pool.nodes.insert(key, Some(Node::new(conn)));
                        }
                        Err(err) => {
                            debug!("seed node {key} is not connectable: {err}");
                        }
                    }
                }
                if pool.live_count() > 0 {
                    self.mark_ready(&mut pool);
                    return Ok(());
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    fail!((ErrorKind::ClientError, "ready timeout reached"));
                }
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn mark_ready(&self, pool: &mut NodePool<C>) {
        if !pool.ready {
            pool.ready = true;
            self.inner.events.publish(ClusterEvent::Ready);
        }
    }

    fn check_unready(&self, pool: &mut NodePool<C>) {
        if pool.ready && pool.live_count() == 0 {
            pool.ready = false;
            self.inner.events.publish(ClusterEvent::Unready);
        }
    }

    // Returns the live client for `addr`, creating it through the
    // backend factory if the entry is missing or tombstoned.
    fn get_or_connect<'a>(
        &self,
        pool: &'a mut NodePool<C>,
        addr: &str,
    ) -> RedisResult<&'a mut Node<C>> {
        if pool.get_live_mut(addr).is_none() {
            let node_addr = addr.into_node_addr()?;
            let conn = C::connect(&node_addr, &self.inner.params.connection_params)?;
            pool.nodes.insert(addr.to_string(), Some(Node::new(conn)));
            self.mark_ready(pool);
        }
        Ok(pool.get_live_mut(addr).unwrap())
    }

    // A broken or uncertain connection: tombstone the entry so the next
    // use recreates it, notify subscribers, and refresh the topology in
    // the background.
    fn handle_connection_error(&self, addr: &str, err: &RedisError) {
        {
            let mut pool = self.inner.pool.lock().unwrap();
            if let Some(entry) = pool.nodes.get_mut(addr) {
                entry.take();
            }
            self.check_unready(&mut pool);
        }
        self.inner.events.publish(ClusterEvent::ConnectionError {
            addr: addr.to_string(),
            err: err.clone(),
        });
        self.trigger_refresh();
    }

    // Sends the replica-read mode directive when the chosen node-list
    // index disagrees with the node's current mode.  The reply is read
    // back and discarded; a failure here must not affect the command's
    // own error path.
    fn reconcile_read_mode(node: &mut Node<C>, idx: usize) {
        let directive = if idx == 0 && node.read_mode_replica {
            node.read_mode_replica = false;
            cmd("READWRITE")
        } else if idx > 0 && !node.read_mode_replica {
            node.read_mode_replica = true;
            cmd("READONLY")
        } else {
            return;
        };
        if node.conn.send_command(&directive).is_ok() {
            let _ = node.conn.recv_response();
        }
    }

    // The per-command redirect/retry state machine, bounded by the
    // configured attempt budget.
    fn request(&self, command: &Cmd) -> RedisResult<Value> {
        if self.inner.quitting() {
            return Err(quitting_error());
        }

        let route = match RoutingInfo::for_routable(command) {
            Some(route) => route,
            None => return Err(no_key_error(command)),
        };

        if self.inner.slots.load().is_empty() {
            self.refresh_slots()?;
        }

        let mut attempts = self.inner.params.retries;
        let mut excludes: HashSet<String> = HashSet::new();
        let mut redirected: Option<String> = None;
        let mut asking = false;

        loop {
            let (addr, rv) = {
                let mut pool = self.inner.pool.lock().unwrap();
                let addr;
                let node = if let Some(target) = redirected.take() {
                    addr = target;
                    self.get_or_connect(&mut pool, &addr)?
                } else {
                    let slots = self.inner.slots.load();
                    let nodes = slots.nodes_for_slot(route.slot());
                    if nodes.is_empty() || excludes.contains(&nodes[0]) {
                        // Uncovered slot (or the owner just failed):
                        // fall back to any usable node; a wrong node
                        // will redirect us.
                        match pool.random_live_addr(&excludes) {
                            Some(random) => {
                                addr = random;
                                pool.get_live_mut(&addr).unwrap()
                            }
                            None => fail!((ErrorKind::ClientError, "couldn't get client")),
                        }
                    } else {
                        let idx = node_index(
                            route,
                            self.inner.params.read_from_replicas,
                            nodes.len(),
                        );
                        addr = nodes[idx].clone();
                        let node = self.get_or_connect(&mut pool, &addr)?;
                        Self::reconcile_read_mode(node, idx);
                        node
                    }
                };

                let rv = if asking {
                    asking = false;
                    let ask = cmd("ASKING");
                    node.conn
                        .req_command(&ask)
                        .and_then(|_| node.conn.req_command(command))
                } else {
                    node.conn.req_command(command)
                };
                (addr, rv)
            };

            match rv {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempts -= 1;
                    if attempts == 0 {
                        return Err(err);
                    }

                    match err.kind() {
                        ErrorKind::Moved => {
                            trace!("MOVED from {addr}: {err}");
                            // Follow the server's hint right away; the
                            // map refresh happens in the background.
                            self.trigger_refresh();
                            redirected = err.redirect_node().map(|(a, _)| a.to_string());
                            asking = false;
                            excludes.insert(addr);
                        }
                        ErrorKind::Ask => {
                            trace!("ASK from {addr}: {err}");
                            redirected = err.redirect_node().map(|(a, _)| a.to_string());
                            asking = true;
                        }
                        ErrorKind::TryAgain | ErrorKind::ClusterDown => {
                            thread::sleep(retry_wait(attempts));
                            excludes.clear();
                        }
                        _ if err.is_io_error() => {
                            self.handle_connection_error(&addr, &err);
                            return Err(err);
                        }
                        _ => return Err(err),
                    }
                }
            }
        }
    }

    // Splits a multi-key command into one sub-command per
    // `interval`-sized argument slice, runs them as a batch, and folds
    // the ordered sub-results back into a single reply.
    fn split_multi_key(
        &self,
        command: &Cmd,
        name: &[u8],
        spec: MultiKeySpec,
    ) -> RedisResult<Value> {
        let args: Vec<&[u8]> = command.args_iter().skip(1).collect();
        let mut pipe = ClusterPipeline::with_capacity(args.len() / spec.interval);
        for chunk in args.chunks(spec.interval) {
            let mut sub = Cmd::with_capacity(1 + chunk.len(), name.len() + chunk.len() * 16);
            sub.arg(name);
            for arg in chunk {
                sub.arg(*arg);
            }
            pipe.add_command(sub);
        }
        let results = self.execute_pipeline(&pipe)?;
        spec.merge.apply(results)
    }

    pub(crate) fn execute_pipeline(&self, pipe: &ClusterPipeline) -> RedisResult<Vec<Value>> {
        if self.inner.quitting() {
            return Err(quitting_error());
        }
        if self.inner.slots.load().is_empty() {
            self.refresh_slots()?;
        }

        let cmds = pipe.commands();
        // Results indexed by original submission position, so per-node
        // grouping cannot reorder them.
        let mut results = vec![Value::Nil; cmds.len()];
        let mut to_retry = Vec::new();
        let mut first_err = None;

        {
            let mut pool = self.inner.pool.lock().unwrap();
            let slots = self.inner.slots.load();

            // Group the commands per destination node, remembering the
            // original index and the chosen node-list position of each.
            let mut order: Vec<String> = Vec::new();
            let mut grouped: HashMap<String, Vec<(usize, usize)>> = HashMap::new();
            for (cmd_idx, command) in cmds.iter().enumerate() {
                let route = match RoutingInfo::for_routable(command) {
                    Some(route) => route,
                    None => return Err(no_key_error(command)),
                };
                let nodes = slots.nodes_for_slot(route.slot());
                let (addr, node_idx) = if nodes.is_empty() {
                    match pool.random_live_addr(&HashSet::new()) {
                        Some(addr) => (addr, 0),
                        None => fail!((ErrorKind::ClientError, "couldn't get client")),
                    }
                } else {
                    let idx =
                        node_index(route, self.inner.params.read_from_replicas, nodes.len());
                    (nodes[idx].clone(), idx)
                };
                if !grouped.contains_key(&addr) {
                    order.push(addr.clone());
                    grouped.insert(addr.clone(), Vec::new());
                }
                grouped.get_mut(&addr).unwrap().push((cmd_idx, node_idx));
            }

            // Send phase: pipeline each node's commands, interleaving
            // mode directives where the chosen index requires one.
            // `true` entries mark replies belonging to directives.
            let mut reply_plan: Vec<(String, Vec<Option<usize>>)> = Vec::new();
            for addr in &order {
                let node = self.get_or_connect(&mut pool, addr)?;
                let mut plan = Vec::new();
                for &(cmd_idx, node_idx) in &grouped[addr] {
                    let needs_toggle = (node_idx == 0 && node.read_mode_replica)
                        || (node_idx > 0 && !node.read_mode_replica);
                    if needs_toggle {
                        let directive = if node_idx == 0 {
                            node.read_mode_replica = false;
                            cmd("READWRITE")
                        } else {
                            node.read_mode_replica = true;
                            cmd("READONLY")
                        };
                        node.conn.send_command(&directive)?;
                        plan.push(None);
                    }
                    node.conn.send_command(&cmds[cmd_idx])?;
                    plan.push(Some(cmd_idx));
                }
                reply_plan.push((addr.clone(), plan));
            }

            // Receive phase: replies come back in send order per node.
            for (addr, plan) in reply_plan {
                let node = match pool.get_live_mut(&addr) {
                    Some(node) => node,
                    None => fail!((ErrorKind::ClientError, "couldn't get client")),
                };
                for entry in plan {
                    let reply = node.conn.recv_response();
                    match entry {
                        // Directive reply: discarded, never inspected.
                        None => {}
                        Some(cmd_idx) => match reply {
                            Ok(value) => results[cmd_idx] = value,
                            Err(err) if err.is_cluster_error() => to_retry.push(cmd_idx),
                            Err(err) => first_err = first_err.or(Some(err)),
                        },
                    }
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }

        if !to_retry.is_empty() {
            // Something moved under the batch; refresh once, then lean
            // on the single-command retry logic for the affected
            // entries.
            self.refresh_slots()?;
            for cmd_idx in to_retry {
                results[cmd_idx] = self.request(&cmds[cmd_idx])?;
            }
        }

        Ok(results)
    }
}

impl<C> ClusterInner<C> {
    fn quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }
}

fn refresh_timer_loop<C>(weak: Weak<ClusterInner<C>>, interval: Duration)
where
    C: ConnectionLike + Connect + Send + 'static,
{
    loop {
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };

        {
            let (lock, cvar) = &inner.shutdown;
            let guard = lock.lock().unwrap();
            let (guard, _) = cvar.wait_timeout(guard, interval).unwrap();
            if *guard {
                return;
            }
        }

        let connection = ClusterConnection { inner };
        if let Err(err) = connection.refresh_slots() {
            debug!("periodic slot refresh failed: {err}");
        }
    }
}

impl<C> ConnectionLike for ClusterConnection<C>
where
    C: ConnectionLike + Connect + Send + 'static,
{
    fn req_command(&mut self, command: &Cmd) -> RedisResult<Value> {
        if let Some(name) = command.command() {
            if let Some(spec) = multi_key_spec(&name) {
                let key_args = command.args_count().saturating_sub(1);
                if key_args > spec.interval {
                    return self.split_multi_key(command, &name, spec);
                }
            }
        }
        self.request(command)
    }

    fn is_open(&self) -> bool {
        let pool = self.inner.pool.lock().unwrap();
        let mut any = false;
        for node in pool.nodes.values().flatten() {
            if !node.conn.is_open() {
                return false;
            }
            any = true;
        }
        any
    }

    fn check_connection(&mut self) -> bool {
        let mut pool = self.inner.pool.lock().unwrap();
        let mut any = false;
        for node in pool.nodes.values_mut().flatten() {
            if !node.conn.check_connection() {
                return false;
            }
            any = true;
        }
        any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_wait_schedule() {
        // First retry (15 attempts left) waits 20ms, then the wait
        // doubles until it is capped at 1280ms.
        assert_eq!(retry_wait(15), Duration::from_millis(20));
        assert_eq!(retry_wait(14), Duration::from_millis(40));
        assert_eq!(retry_wait(13), Duration::from_millis(80));
        assert_eq!(retry_wait(10), Duration::from_millis(640));
        assert_eq!(retry_wait(9), Duration::from_millis(1280));
        assert_eq!(retry_wait(5), Duration::from_millis(1280));
        assert_eq!(retry_wait(1), Duration::from_millis(1280));
    }

    #[test]
    fn test_retry_wait_is_monotone_and_capped() {
        let mut last = Duration::ZERO;
        for attempts_left in (1..=15).rev() {
            let wait = retry_wait(attempts_left);
            assert!(wait >= last);
            assert!(wait <= Duration::from_millis(1280));
            last = wait;
        }
    }
}
