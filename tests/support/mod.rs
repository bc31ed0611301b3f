#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use redis_cluster::{
    ClusterClient, ClusterClientBuilder, ClusterConnection, Cmd, Connect, ConnectionLike,
    ConnectionParams, NodeAddr, RedisError, RedisResult, Value,
};

// Handlers answer `Err(response)`; `Ok(())` means "not handled" and is
// a test bug.
pub type Handler = Arc<dyn Fn(&Cmd, u16) -> Result<(), RedisResult<Value>> + Send + Sync>;

pub struct MockConnectionBehavior {
    pub id: String,
    pub handler: Handler,
    pub connection_id_provider: AtomicUsize,
    pub fail_connects: AtomicBool,
}

impl MockConnectionBehavior {
    fn new(id: &str, handler: Handler) -> Self {
        Self {
            id: id.to_string(),
            handler,
            connection_id_provider: AtomicUsize::new(0),
            fail_connects: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn register_new(id: &str, handler: Handler) -> RemoveHandler {
        get_behaviors().insert(id.to_string(), Self::new(id, handler));
        RemoveHandler(vec![id.to_string()])
    }
}

static MOCK_CONN_BEHAVIORS: Lazy<RwLock<HashMap<String, MockConnectionBehavior>>> =
    Lazy::new(Default::default);

fn get_behaviors() -> std::sync::RwLockWriteGuard<'static, HashMap<String, MockConnectionBehavior>>
{
    MOCK_CONN_BEHAVIORS.write().unwrap()
}

pub fn modify_mock_connection_behavior(name: &str, func: impl FnOnce(&mut MockConnectionBehavior)) {
    func(
        get_behaviors()
            .get_mut(name)
            .expect("Handler was not installed"),
    );
}

/// Number of connections the factory created for this cluster name so
/// far.
pub fn connect_count(name: &str) -> usize {
    MOCK_CONN_BEHAVIORS
        .read()
        .unwrap()
        .get(name)
        .expect("Handler was not installed")
        .connection_id_provider
        .load(Ordering::SeqCst)
}

pub struct RemoveHandler(Vec<String>);

impl Drop for RemoveHandler {
    fn drop(&mut self) {
        for id in &self.0 {
            get_behaviors().remove(id);
        }
    }
}

pub struct MockConnection {
    pub id: usize,
    pub handler: Handler,
    pub port: u16,
    // Queued replies for the send/recv pipelining split.
    pending: VecDeque<RedisResult<Value>>,
}

impl Connect for MockConnection {
    fn connect(addr: &NodeAddr, _params: &ConnectionParams) -> RedisResult<Self> {
        let binding = MOCK_CONN_BEHAVIORS.read().unwrap();
        let behavior = binding
            .get(&addr.host)
            .unwrap_or_else(|| panic!("MockConnectionBehavior for `{}` was not installed", addr.host));
        if behavior.fail_connects.load(Ordering::SeqCst) {
            return Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock-connect-refused",
            )));
        }
        Ok(MockConnection {
            id: behavior.connection_id_provider.fetch_add(1, Ordering::SeqCst),
            handler: behavior.handler.clone(),
            port: addr.port,
            pending: VecDeque::new(),
        })
    }

    fn send_command(&mut self, cmd: &Cmd) -> RedisResult<()> {
        let reply = (self.handler)(cmd, self.port).expect_err("Handler did not specify a response");
        self.pending.push_back(reply);
        Ok(())
    }

    fn recv_response(&mut self) -> RedisResult<Value> {
        self.pending
            .pop_front()
            .expect("recv_response without a pending reply")
    }
}

impl ConnectionLike for MockConnection {
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        (self.handler)(cmd, self.port).expect_err("Handler did not specify a response")
    }

    fn is_open(&self) -> bool {
        true
    }

    fn check_connection(&mut self) -> bool {
        true
    }
}

pub fn cmd_is(cmd: &Cmd, name: &str) -> bool {
    cmd.arg_idx(0)
        .is_some_and(|arg| arg.eq_ignore_ascii_case(name.as_bytes()))
}

pub fn arg_is(cmd: &Cmd, idx: usize, expected: &str) -> bool {
    cmd.arg_idx(idx)
        .is_some_and(|arg| arg.eq_ignore_ascii_case(expected.as_bytes()))
}

pub fn cmd_name(cmd: &Cmd) -> String {
    String::from_utf8_lossy(cmd.arg_idx(0).unwrap_or(b""))
        .to_ascii_uppercase()
}

#[derive(Clone, Debug)]
pub struct MockSlotRange {
    pub primary_port: u16,
    pub replica_ports: Vec<u16>,
    pub slot_range: std::ops::RangeInclusive<u16>,
}

pub fn create_topology_from_config(name: &str, slots_config: Vec<MockSlotRange>) -> Value {
    let slots_vec = slots_config
        .into_iter()
        .map(|slot_config| {
            let mut config = vec![
                Value::Int(*slot_config.slot_range.start() as i64),
                Value::Int(*slot_config.slot_range.end() as i64),
                Value::Bulk(vec![
                    Value::Data(name.as_bytes().to_vec()),
                    Value::Int(slot_config.primary_port as i64),
                ]),
            ];
            config.extend(slot_config.replica_ports.into_iter().map(|replica_port| {
                Value::Bulk(vec![
                    Value::Data(name.as_bytes().to_vec()),
                    Value::Int(replica_port as i64),
                ])
            }));
            Value::Bulk(config)
        })
        .collect();
    Value::Bulk(slots_vec)
}

/// Answers the handshake traffic every test needs: a single-node
/// topology owning all slots, plus the mode and lifecycle directives.
pub fn respond_startup(name: &str, cmd: &Cmd) -> Result<(), RedisResult<Value>> {
    respond_startup_with_config(name, cmd, None)
}

/// Same as [`respond_startup`] but with a two-shard topology,
/// `[0..=8191]` on port 6379 and `[8192..=16383]` on port 6380.
pub fn respond_startup_two_nodes(name: &str, cmd: &Cmd) -> Result<(), RedisResult<Value>> {
    respond_startup_with_config(
        name,
        cmd,
        Some(vec![
            MockSlotRange {
                primary_port: 6379,
                replica_ports: vec![],
                slot_range: 0..=8191,
            },
            MockSlotRange {
                primary_port: 6380,
                replica_ports: vec![],
                slot_range: 8192..=16383,
            },
        ]),
    )
}

pub fn respond_startup_with_config(
    name: &str,
    cmd: &Cmd,
    slots_config: Option<Vec<MockSlotRange>>,
) -> Result<(), RedisResult<Value>> {
    let slots_config = slots_config.unwrap_or(vec![MockSlotRange {
        primary_port: 6379,
        replica_ports: vec![],
        slot_range: 0..=16383,
    }]);
    if cmd_is(cmd, "PING") {
        Err(Ok(Value::Status("PONG".into())))
    } else if cmd_is(cmd, "CLUSTER") && arg_is(cmd, 1, "SLOTS") {
        Err(Ok(create_topology_from_config(name, slots_config)))
    } else if cmd_is(cmd, "READONLY") || cmd_is(cmd, "READWRITE") || cmd_is(cmd, "QUIT") {
        Err(Ok(Value::Okay))
    } else {
        Ok(())
    }
}

pub struct MockEnv {
    pub client: ClusterClient,
    pub connection: ClusterConnection<MockConnection>,
    #[allow(unused)]
    pub handler: RemoveHandler,
}

impl MockEnv {
    pub fn new(
        id: &str,
        handler: impl Fn(&Cmd, u16) -> Result<(), RedisResult<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_client_builder(
            ClusterClient::builder(vec![format!("{id}:6379")]),
            id,
            handler,
        )
    }

    pub fn with_client_builder(
        client_builder: ClusterClientBuilder,
        id: &str,
        handler: impl Fn(&Cmd, u16) -> Result<(), RedisResult<Value>> + Send + Sync + 'static,
    ) -> Self {
        let id = id.to_string();
        let handler =
            MockConnectionBehavior::register_new(&id, Arc::new(move |cmd, port| handler(cmd, port)));
        let client = client_builder.build().unwrap();
        let connection = client.get_connection().unwrap();
        MockEnv {
            client,
            connection,
            handler,
        }
    }
}
