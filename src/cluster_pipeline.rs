use std::collections::HashSet;

use crate::cluster::ClusterConnection;
use crate::cmd::{cmd, Cmd};
use crate::connection::{Connect, ConnectionLike};
use crate::types::{
    from_owned_redis_value, ErrorKind, FromRedisValue, RedisResult, ToRedisArgs, Value,
};

fn is_illegal_cmd(name: &str) -> bool {
    matches!(
        name,
        "BGREWRITEAOF" | "BGSAVE" | "BITOP" |
        // All commands that start with "CLIENT" or "CONFIG"
        "CLIENT" | "CONFIG" |
        "DBSIZE" |
        "ECHO" | "EVALSHA" |
        "FLUSHALL" | "FLUSHDB" |
        "INFO" |
        "KEYS" |
        "LASTSAVE" |
        // Multi-key commands are split outside of batches; inside one
        // they could cross slots.
        "MGET" | "MOVE" | "MSET" | "MSETNX" |
        "PFMERGE" | "PFCOUNT" | "PING" | "PUBLISH" |
        "RANDOMKEY" | "RENAME" | "RENAMENX" | "RPOPLPUSH" |
        "SAVE" | "SCAN" | "SCRIPT" |
        "SDIFF" | "SDIFFSTORE" |
        "SHUTDOWN" | "SINTER" | "SINTERSTORE" | "SLAVEOF" | "REPLICAOF" | "SLOWLOG" |
        "SMOVE" | "SORT" | "SUNION" | "SUNIONSTORE" |
        "TIME"
    )
}

/// Represents a redis cluster command pipeline: a set of commands
/// dispatched without waiting for intermediate replies, grouped per
/// destination node and reassembled in submission order.
///
/// A cluster pipeline does not support transactions, and commands that
/// cannot be routed by key (or that could cross slots server-side)
/// are rejected before anything is sent.
#[derive(Clone, Default)]
pub struct ClusterPipeline {
    commands: Vec<Cmd>,
    ignored_commands: HashSet<usize>,
}

/// Shortcut for creating a new cluster pipeline.
pub fn cluster_pipe() -> ClusterPipeline {
    ClusterPipeline::new()
}

impl ClusterPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> ClusterPipeline {
        Self::with_capacity(0)
    }

    /// Creates an empty pipeline with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> ClusterPipeline {
        ClusterPipeline {
            commands: Vec::with_capacity(capacity),
            ignored_commands: HashSet::new(),
        }
    }

    pub(crate) fn commands(&self) -> &Vec<Cmd> {
        &self.commands
    }

    /// Adds a command to the cluster pipeline.
    pub fn add_command(&mut self, command: Cmd) -> &mut ClusterPipeline {
        self.commands.push(command);
        self
    }

    /// Starts a new command.  Functions such as `arg` then become
    /// available to add more arguments to that command.
    pub fn cmd(&mut self, name: &str) -> &mut ClusterPipeline {
        self.add_command(cmd(name))
    }

    /// Adds an argument to the last started command.
    ///
    /// It's important to note that the argument is always applied to
    /// the last command.  If the pipeline is empty the argument is
    /// dropped silently.
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut ClusterPipeline {
        if let Some(cmd) = self.commands.last_mut() {
            cmd.arg(arg);
        }
        self
    }

    /// Instructs the pipeline to ignore the return value of the last
    /// command.  The return value is still fetched off the wire, it is
    /// just not part of the assembled result.
    pub fn ignore(&mut self) -> &mut ClusterPipeline {
        if !self.commands.is_empty() {
            self.ignored_commands.insert(self.commands.len() - 1);
        }
        self
    }

    /// Clears out all commands.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.ignored_commands.clear();
    }

    /// Returns the number of commands in the pipeline.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the pipeline contains no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn make_pipeline_results(&self, resp: Vec<Value>) -> Value {
        let mut rv = Vec::with_capacity(resp.len() - self.ignored_commands.len());
        for (idx, result) in resp.into_iter().enumerate() {
            if !self.ignored_commands.contains(&idx) {
                rv.push(result);
            }
        }
        Value::Bulk(rv)
    }

    /// Executes the pipeline and fetches the return values in
    /// submission order:
    ///
    /// ```rust,no_run
    /// # use redis_cluster::cluster_pipe;
    /// # fn run<C>(con: &mut redis_cluster::ClusterConnection<C>)
    /// # where C: redis_cluster::ConnectionLike + redis_cluster::Connect + Send + 'static {
    /// let values: Vec<i64> = cluster_pipe()
    ///     .cmd("SET").arg("key_1").arg(42).ignore()
    ///     .cmd("SET").arg("key_2").arg(43).ignore()
    ///     .cmd("GET").arg("key_1")
    ///     .cmd("GET").arg("key_2")
    ///     .query(con)
    ///     .unwrap();
    /// # }
    /// ```
    #[inline]
    pub fn query<T: FromRedisValue, C>(&self, con: &mut ClusterConnection<C>) -> RedisResult<T>
    where
        C: ConnectionLike + Connect + Send + 'static,
    {
        for command in &self.commands {
            let name = String::from_utf8_lossy(command.arg_idx(0).unwrap_or(b""))
                .trim()
                .to_ascii_uppercase();

            if is_illegal_cmd(&name) {
                fail!((
                    ErrorKind::ClientError,
                    "This command cannot be safely routed in cluster mode",
                    format!("Command '{name}' can't be executed in a cluster pipeline.")
                ))
            }
        }

        from_owned_redis_value(if self.commands.is_empty() {
            Value::Bulk(vec![])
        } else {
            self.make_pipeline_results(con.execute_pipeline(self)?)
        })
    }

    /// This is a shortcut to `query()` that does not return a value and
    /// will panic if the query of the pipeline fails.
    #[inline]
    pub fn execute<C>(&self, con: &mut ClusterConnection<C>)
    where
        C: ConnectionLike + Connect + Send + 'static,
    {
        self.query::<(), C>(con).unwrap();
    }

    /// Shortcut for adding a `GET` command to the pipeline.
    pub fn get<K: ToRedisArgs>(&mut self, key: K) -> &mut ClusterPipeline {
        self.cmd("GET").arg(key)
    }

    /// Shortcut for adding a `SET` command to the pipeline.
    pub fn set<K: ToRedisArgs, V: ToRedisArgs>(&mut self, key: K, value: V) -> &mut ClusterPipeline {
        self.cmd("SET").arg(key).arg(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_building() {
        let mut pipe = cluster_pipe();
        pipe.cmd("SET").arg("k").arg(1).ignore().get("k");
        assert_eq!(pipe.len(), 2);
        assert_eq!(pipe.commands()[0].arg_idx(0), Some(&b"SET"[..]));
        assert_eq!(pipe.commands()[1].arg_idx(1), Some(&b"k"[..]));
    }

    #[test]
    fn test_ignored_results_are_dropped() {
        let mut pipe = cluster_pipe();
        pipe.cmd("SET").arg("k").arg(1).ignore().get("k");
        let assembled =
            pipe.make_pipeline_results(vec![Value::Okay, Value::Data(b"1".to_vec())]);
        assert_eq!(assembled, Value::Bulk(vec![Value::Data(b"1".to_vec())]));
    }

    #[test]
    fn test_illegal_commands_are_detected() {
        assert!(is_illegal_cmd("KEYS"));
        assert!(is_illegal_cmd("MGET"));
        assert!(is_illegal_cmd("SCRIPT"));
        assert!(!is_illegal_cmd("GET"));
        assert!(!is_illegal_cmd("HSET"));
    }
}
