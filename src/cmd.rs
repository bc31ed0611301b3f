use std::fmt;

use crate::connection::ConnectionLike;
use crate::types::{from_owned_redis_value, FromRedisValue, RedisResult, RedisWrite, ToRedisArgs};

/// Represents a redis command.
///
/// Arguments are stored back to back in one buffer; `args` holds the
/// end offset of each argument.  The command name is argument 0.
#[derive(Clone, Default)]
pub struct Cmd {
    data: Vec<u8>,
    args: Vec<usize>,
}

/// Shortcut function to creating a command with a single argument.
///
/// The first argument of a redis command is always the name of the
/// command which needs to be a string.
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

impl RedisWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.args_iter().map(String::from_utf8_lossy))
            .finish()
    }
}

impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd::default()
    }

    /// Creates a new empty command, with at least the requested capacity.
    pub fn with_capacity(arg_count: usize, size_of_data: usize) -> Cmd {
        Cmd {
            data: Vec::with_capacity(size_of_data),
            args: Vec::with_capacity(arg_count),
        }
    }

    /// Appends an argument to the command.  The argument passed must
    /// be a type that implements `ToRedisArgs`.  Most primitive types
    /// as well as vectors of them qualify.
    ///
    /// ```rust
    /// # use redis_cluster::cmd;
    /// let cmd = cmd("SET").arg("my_key").arg(42).clone();
    /// assert_eq!(cmd.args_count(), 3);
    /// ```
    #[inline]
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_redis_args(self);
        self
    }

    /// Returns the underlying data for the argument at `idx`, if present.
    pub fn arg_idx(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.args.len() {
            return None;
        }
        let start = if idx == 0 { 0 } else { self.args[idx - 1] };
        Some(&self.data[start..self.args[idx]])
    }

    /// Returns the number of arguments, including the command name.
    pub fn args_count(&self) -> usize {
        self.args.len()
    }

    /// Returns an iterator over all arguments, including the command
    /// name.
    pub fn args_iter(&self) -> impl Iterator<Item = &[u8]> + Clone + ExactSizeIterator {
        (0..self.args.len()).map(move |idx| {
            let start = if idx == 0 { 0 } else { self.args[idx - 1] };
            &self.data[start..self.args[idx]]
        })
    }

    /// ASCII-uppercase form of the command name.
    pub(crate) fn command(&self) -> Option<Vec<u8>> {
        self.arg_idx(0).map(|x| x.to_ascii_uppercase())
    }

    /// Sends the command to the given connection-like object and
    /// converts the result.
    #[inline]
    pub fn query<T: FromRedisValue, C: ConnectionLike + ?Sized>(
        &self,
        con: &mut C,
    ) -> RedisResult<T> {
        from_owned_redis_value(con.req_command(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_storage_and_lookup() {
        let mut c = cmd("SET");
        c.arg("key").arg(42);

        assert_eq!(c.args_count(), 3);
        assert_eq!(c.arg_idx(0), Some(&b"SET"[..]));
        assert_eq!(c.arg_idx(1), Some(&b"key"[..]));
        assert_eq!(c.arg_idx(2), Some(&b"42"[..]));
        assert_eq!(c.arg_idx(3), None);
    }

    #[test]
    fn test_command_name_is_uppercased() {
        let mut c = cmd("get");
        c.arg("x");
        assert_eq!(c.command(), Some(b"GET".to_vec()));
    }

    #[test]
    fn test_byte_slices_are_single_args() {
        let mut c = cmd("SET");
        c.arg("key").arg(b"binary\x00data");
        assert_eq!(c.args_count(), 3);
        assert_eq!(c.arg_idx(2), Some(&b"binary\x00data"[..]));
    }

    #[test]
    fn test_slice_of_strs_expands() {
        let mut c = cmd("MGET");
        c.arg(&["a", "b", "c"][..]);
        assert_eq!(c.args_count(), 4);
        assert_eq!(c.arg_idx(3), Some(&b"c"[..]));
    }

    #[test]
    fn test_pair_slices_flatten() {
        let mut c = cmd("MSET");
        c.arg(&[("k1", "v1"), ("k2", "v2")][..]);
        assert_eq!(c.args_count(), 5);
        assert_eq!(c.arg_idx(1), Some(&b"k1"[..]));
        assert_eq!(c.arg_idx(4), Some(&b"v2"[..]));
    }
}
