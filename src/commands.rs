use crate::cmd::cmd;
use crate::connection::ConnectionLike;
use crate::types::{ErrorKind, FromRedisValue, RedisResult, ToRedisArgs, Value};

/// Returns true if the command reads without writing and may therefore
/// be served by a replica.
pub(crate) fn is_readonly_cmd(cmd: &[u8]) -> bool {
    matches!(
        cmd,
        b"BITCOUNT"
            | b"BITPOS"
            | b"DUMP"
            | b"EXISTS"
            | b"EXPIRETIME"
            | b"GET"
            | b"GETBIT"
            | b"GETRANGE"
            | b"HEXISTS"
            | b"HGET"
            | b"HGETALL"
            | b"HKEYS"
            | b"HLEN"
            | b"HMGET"
            | b"HSTRLEN"
            | b"HVALS"
            | b"LINDEX"
            | b"LLEN"
            | b"LPOS"
            | b"LRANGE"
            | b"MGET"
            | b"PEXPIRETIME"
            | b"PTTL"
            | b"SCARD"
            | b"SISMEMBER"
            | b"SMEMBERS"
            | b"SMISMEMBER"
            | b"SRANDMEMBER"
            | b"STRLEN"
            | b"SUBSTR"
            | b"TTL"
            | b"TYPE"
            | b"ZCARD"
            | b"ZCOUNT"
            | b"ZMSCORE"
            | b"ZRANGE"
            | b"ZRANGEBYLEX"
            | b"ZRANGEBYSCORE"
            | b"ZRANK"
            | b"ZREVRANGE"
            | b"ZREVRANK"
            | b"ZSCORE"
    )
}

/// How the sub-results of a split multi-key command are folded back
/// into one reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Merge {
    /// Concatenate the per-shard arrays in submission order (MGET).
    Concat,
    /// Sum the per-shard integer replies (DEL, EXISTS, ...).
    Sum,
    /// Keep the first reply; all shards answer identically (MSET).
    First,
}

impl Merge {
    pub(crate) fn apply(&self, parts: Vec<Value>) -> RedisResult<Value> {
        match *self {
            Merge::Concat => {
                let mut items = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        Value::Bulk(sub) => items.extend(sub),
                        other => items.push(other),
                    }
                }
                Ok(Value::Bulk(items))
            }
            Merge::Sum => {
                let mut total = 0;
                for part in parts {
                    match part {
                        Value::Int(n) => total += n,
                        other => fail!((
                            ErrorKind::TypeError,
                            "Expected an integer sub-result",
                            format!("{other:?}")
                        )),
                    }
                }
                Ok(Value::Int(total))
            }
            Merge::First => Ok(parts.into_iter().next().unwrap_or(Value::Okay)),
        }
    }
}

/// Describes a command whose keys may span slots and must be split into
/// per-slot sub-commands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MultiKeySpec {
    /// Number of argument positions per logical sub-command: 1 for
    /// plain key lists, 2 for key/value pairs.
    pub(crate) interval: usize,
    pub(crate) merge: Merge,
}

pub(crate) fn multi_key_spec(cmd: &[u8]) -> Option<MultiKeySpec> {
    match cmd {
        b"MGET" => Some(MultiKeySpec {
            interval: 1,
            merge: Merge::Concat,
        }),
        b"DEL" | b"EXISTS" | b"TOUCH" | b"UNLINK" => Some(MultiKeySpec {
            interval: 1,
            merge: Merge::Sum,
        }),
        b"MSET" => Some(MultiKeySpec {
            interval: 2,
            merge: Merge::First,
        }),
        _ => None,
    }
}

/// Implements common redis commands over any [`ConnectionLike`] object,
/// so a node backend and the cluster connection share one call surface.
pub trait Commands: ConnectionLike + Sized {
    /// Get the value of a key.
    fn get<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> RedisResult<RV> {
        cmd("GET").arg(key).query(self)
    }

    /// Set the string value of a key.
    fn set<K: ToRedisArgs, V: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        value: V,
    ) -> RedisResult<RV> {
        cmd("SET").arg(key).arg(value).query(self)
    }

    /// Delete one or more keys.
    fn del<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> RedisResult<RV> {
        cmd("DEL").arg(key).query(self)
    }

    /// Determine how many of the given keys exist.
    fn exists<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> RedisResult<RV> {
        cmd("EXISTS").arg(key).query(self)
    }

    /// Get the values of all the given keys.
    fn mget<K: ToRedisArgs, RV: FromRedisValue>(&mut self, keys: K) -> RedisResult<RV> {
        cmd("MGET").arg(keys).query(self)
    }

    /// Set multiple keys to their values.
    fn mset<K: ToRedisArgs, V: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        items: &[(K, V)],
    ) -> RedisResult<RV> {
        cmd("MSET").arg(items).query(self)
    }

    /// Increment the numeric value of a key by the given amount.
    fn incr<K: ToRedisArgs, D: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        delta: D,
    ) -> RedisResult<RV> {
        cmd("INCRBY").arg(key).arg(delta).query(self)
    }

    /// Set a key's time to live in seconds.
    fn expire<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        seconds: i64,
    ) -> RedisResult<RV> {
        cmd("EXPIRE").arg(key).arg(seconds).query(self)
    }

    /// Get the time to live for a key in seconds.
    fn ttl<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> RedisResult<RV> {
        cmd("TTL").arg(key).query(self)
    }

    /// Set the value of a hash field.
    fn hset<K: ToRedisArgs, F: ToRedisArgs, V: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        field: F,
        value: V,
    ) -> RedisResult<RV> {
        cmd("HSET").arg(key).arg(field).arg(value).query(self)
    }

    /// Get the value of a hash field.
    fn hget<K: ToRedisArgs, F: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        field: F,
    ) -> RedisResult<RV> {
        cmd("HGET").arg(key).arg(field).query(self)
    }

    /// Prepend values to a list.
    fn lpush<K: ToRedisArgs, V: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        value: V,
    ) -> RedisResult<RV> {
        cmd("LPUSH").arg(key).arg(value).query(self)
    }

    /// Append values to a list.
    fn rpush<K: ToRedisArgs, V: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        value: V,
    ) -> RedisResult<RV> {
        cmd("RPUSH").arg(key).arg(value).query(self)
    }

    /// Get a range of elements from a list.
    fn lrange<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        start: isize,
        stop: isize,
    ) -> RedisResult<RV> {
        cmd("LRANGE").arg(key).arg(start).arg(stop).query(self)
    }

    /// Add members to a set.
    fn sadd<K: ToRedisArgs, M: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        member: M,
    ) -> RedisResult<RV> {
        cmd("SADD").arg(key).arg(member).query(self)
    }

    /// Get all the members of a set.
    fn smembers<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> RedisResult<RV> {
        cmd("SMEMBERS").arg(key).query(self)
    }
}

impl<T: ConnectionLike> Commands for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readonly_classification() {
        assert!(is_readonly_cmd(b"GET"));
        assert!(is_readonly_cmd(b"MGET"));
        assert!(is_readonly_cmd(b"SMEMBERS"));
        assert!(!is_readonly_cmd(b"SET"));
        assert!(!is_readonly_cmd(b"DEL"));
        assert!(!is_readonly_cmd(b"MSET"));
    }

    #[test]
    fn test_multi_key_table() {
        let mget = multi_key_spec(b"MGET").unwrap();
        assert_eq!(mget.interval, 1);
        assert_eq!(mget.merge, Merge::Concat);

        let mset = multi_key_spec(b"MSET").unwrap();
        assert_eq!(mset.interval, 2);
        assert_eq!(mset.merge, Merge::First);

        assert!(multi_key_spec(b"GET").is_none());
    }

    #[test]
    fn test_merge_concat_preserves_order() {
        let parts = vec![
            Value::Bulk(vec![Value::Data(b"a".to_vec()), Value::Data(b"b".to_vec())]),
            Value::Bulk(vec![Value::Nil]),
        ];
        assert_eq!(
            Merge::Concat.apply(parts).unwrap(),
            Value::Bulk(vec![
                Value::Data(b"a".to_vec()),
                Value::Data(b"b".to_vec()),
                Value::Nil,
            ])
        );
    }

    #[test]
    fn test_merge_sum() {
        let parts = vec![Value::Int(1), Value::Int(0), Value::Int(2)];
        assert_eq!(Merge::Sum.apply(parts).unwrap(), Value::Int(3));
        assert!(Merge::Sum.apply(vec![Value::Okay]).is_err());
    }

    #[test]
    fn test_merge_first() {
        let parts = vec![Value::Okay, Value::Okay];
        assert_eq!(Merge::First.apply(parts).unwrap(), Value::Okay);
    }
}
