use std::error;
use std::fmt;
use std::io;
use std::str::{from_utf8, Utf8Error};
use std::string::FromUtf8Error;
use std::sync::Arc;

/// Library generic result type.
pub type RedisResult<T> = Result<T, RedisError>;

/// Internal low-level response type a node backend hands back to the
/// routing engine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value {
    /// A nil response from the server.
    Nil,
    /// An integer response.
    Int(i64),
    /// Arbitrary binary data.
    Data(Vec<u8>),
    /// A nested response of more values.
    Bulk(Vec<Value>),
    /// A simple status response.
    Status(String),
    /// A status response which represents the string "OK".
    Okay,
}

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The server generated an invalid response.
    ResponseError,
    /// The authentication with the server failed.
    AuthenticationFailed,
    /// Operation failed because of a type mismatch.
    TypeError,
    /// The server is busy loading its dataset.
    BusyLoadingError,
    /// An error that was caused because the parameters to the client
    /// were wrong.
    InvalidClientConfig,
    /// The slot the command was routed to is permanently served by
    /// another node.
    Moved,
    /// The slot is being migrated; re-ask the target node for this
    /// command only.
    Ask,
    /// The slot is busy (for example mid-migration); retry after a
    /// short wait.
    TryAgain,
    /// The cluster cannot currently serve requests at all.
    ClusterDown,
    /// Keys of a multi-key command mapped to different slots on the
    /// server side.
    CrossSlot,
    /// A replica rejected a write because its master is down.
    MasterDown,
    /// A write command was issued against a read-only node.
    ReadOnly,
    /// This kind is returned if the redis error is one that is not
    /// native to the library.  This is usually the case if the cause is
    /// another error.
    IoError,
    /// An error raised in the client before the command was dispatched.
    ClientError,
    /// An extension error.  This is an error created by the server that
    /// is not directly understood by the library.
    ExtensionError,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    ExtensionError(String, String),
    // Arc so that one refresh outcome can be cloned out to every
    // queued waiter.
    IoError(Arc<io::Error>),
}

/// Represents a redis error.  For the most part you should be using
/// the Error trait to interact with this rather than the actual struct.
#[derive(Clone)]
pub struct RedisError {
    repr: ErrorRepr,
}

impl PartialEq for RedisError {
    fn eq(&self, other: &RedisError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::ExtensionError(a, _), ErrorRepr::ExtensionError(b, _)) => *a == *b,
            _ => false,
        }
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::IoError(Arc::new(err)),
        }
    }
}

impl From<Utf8Error> for RedisError {
    fn from(_: Utf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::TypeError, "Invalid UTF-8"),
        }
    }
}

impl From<FromUtf8Error> for RedisError {
    fn from(_: FromUtf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(ErrorKind::TypeError, "Cannot convert from UTF-8"),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.repr {
            ErrorRepr::IoError(ref err) => Some(err.as_ref() as &dyn error::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::ExtensionError(ref code, ref detail) => {
                code.fmt(f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IoError(ref err) => err.fmt(f),
        }
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl RedisError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::ExtensionError(_, _) => ErrorKind::ExtensionError,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail)
            | ErrorRepr::ExtensionError(_, ref detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Returns the raw error code if available.
    pub fn code(&self) -> Option<&str> {
        match self.kind() {
            ErrorKind::ResponseError => Some("ERR"),
            ErrorKind::BusyLoadingError => Some("LOADING"),
            ErrorKind::Moved => Some("MOVED"),
            ErrorKind::Ask => Some("ASK"),
            ErrorKind::TryAgain => Some("TRYAGAIN"),
            ErrorKind::ClusterDown => Some("CLUSTERDOWN"),
            ErrorKind::CrossSlot => Some("CROSSSLOT"),
            ErrorKind::MasterDown => Some("MASTERDOWN"),
            ErrorKind::ReadOnly => Some("READONLY"),
            _ => match self.repr {
                ErrorRepr::ExtensionError(ref code, _) => Some(code),
                _ => None,
            },
        }
    }

    /// Returns the name of the error category for display purposes.
    pub fn category(&self) -> &str {
        match self.kind() {
            ErrorKind::ResponseError => "response error",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::TypeError => "type error",
            ErrorKind::BusyLoadingError => "busy loading",
            ErrorKind::InvalidClientConfig => "invalid client config",
            ErrorKind::Moved => "key moved",
            ErrorKind::Ask => "key moved (ask)",
            ErrorKind::TryAgain => "try again",
            ErrorKind::ClusterDown => "cluster down",
            ErrorKind::CrossSlot => "cross-slot",
            ErrorKind::MasterDown => "master down",
            ErrorKind::ReadOnly => "read-only",
            ErrorKind::IoError => "I/O error",
            ErrorKind::ClientError => "client error",
            ErrorKind::ExtensionError => "extension error",
        }
    }

    /// Indicates that this failure is an IO failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }

    /// Indicates that this is one of the cluster redirect or transient
    /// errors the routing engine handles internally.
    pub fn is_cluster_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Moved | ErrorKind::Ask | ErrorKind::TryAgain | ErrorKind::ClusterDown
        )
    }

    /// Returns true if error was caused by a dropped connection.
    pub fn is_connection_dropped(&self) -> bool {
        match self.repr {
            ErrorRepr::IoError(ref err) => matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns the node a `MOVED` or `ASK` error refers to.
    ///
    /// This returns `(addr, slot_id)`.
    pub fn redirect_node(&self) -> Option<(&str, u16)> {
        match self.kind() {
            ErrorKind::Ask | ErrorKind::Moved => (),
            _ => return None,
        }
        let mut iter = self.detail()?.split_ascii_whitespace();
        let slot_id: u16 = iter.next()?.parse().ok()?;
        let addr = iter.next()?;
        Some((addr, slot_id))
    }
}

/// Builds a [`RedisError`] from a server error line (without the leading
/// `-`), mapping well-known error codes onto their [`ErrorKind`].
///
/// Backends translate wire-level error replies through this before
/// handing them to the routing engine; it is also how tests fabricate
/// redirects.
pub fn make_server_error(line: &str) -> RedisError {
    let mut pieces = line.splitn(2, ' ');
    let code = pieces.next().unwrap_or("");
    let detail = pieces.next().unwrap_or("").to_string();

    let kind = match code {
        "ERR" => ErrorKind::ResponseError,
        "LOADING" => ErrorKind::BusyLoadingError,
        "NOAUTH" | "WRONGPASS" => ErrorKind::AuthenticationFailed,
        "MOVED" => ErrorKind::Moved,
        "ASK" => ErrorKind::Ask,
        "TRYAGAIN" => ErrorKind::TryAgain,
        "CLUSTERDOWN" => ErrorKind::ClusterDown,
        "CROSSSLOT" => ErrorKind::CrossSlot,
        "MASTERDOWN" => ErrorKind::MasterDown,
        "READONLY" => ErrorKind::ReadOnly,
        code => {
            return RedisError {
                repr: ErrorRepr::ExtensionError(code.to_string(), detail),
            }
        }
    };
    RedisError {
        repr: ErrorRepr::WithDescriptionAndDetail(
            kind,
            "An error was signalled by the server",
            detail,
        ),
    }
}

macro_rules! invalid_type_error {
    ($v:expr, $det:expr) => {
        fail!((
            $crate::types::ErrorKind::TypeError,
            "Response was of incompatible type",
            format!("{:?} (response was {:?})", $det, $v)
        ))
    };
}

/// An abstraction trait for an object that can serialize command
/// arguments into a [`crate::Cmd`].
pub trait RedisWrite {
    /// Accepts a serialized redis command argument.
    fn write_arg(&mut self, arg: &[u8]);

    /// Accepts a serialized redis command argument via its
    /// [`Display`](fmt::Display) form.
    fn write_arg_fmt(&mut self, arg: impl fmt::Display) {
        self.write_arg(arg.to_string().as_bytes())
    }
}

/// Used to convert a value into one or multiple redis argument strings.
pub trait ToRedisArgs: Sized {
    /// This writes the value into a vector of bytes.  Each item is a
    /// single argument.  Most items generate a single item.
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite;

    /// This converts the value into a vector of bytes.  Primarily
    /// useful in tests.
    fn to_redis_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_redis_args(&mut out);
        out
    }

    /// This only exists internally as a workaround for the lack of
    /// specialization: byte slices become one binary argument instead
    /// of one argument per byte.
    #[doc(hidden)]
    fn write_args_from_slice<W>(items: &[Self], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        for item in items {
            item.write_redis_args(out);
        }
    }
}

impl RedisWrite for Vec<Vec<u8>> {
    fn write_arg(&mut self, arg: &[u8]) {
        self.push(arg.to_vec());
    }
}

macro_rules! number_to_redis_impl {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                out.write_arg_fmt(self)
            }
        }
    };
}

number_to_redis_impl!(i8);
number_to_redis_impl!(i16);
number_to_redis_impl!(u16);
number_to_redis_impl!(i32);
number_to_redis_impl!(u32);
number_to_redis_impl!(i64);
number_to_redis_impl!(u64);
number_to_redis_impl!(isize);
number_to_redis_impl!(usize);

impl ToRedisArgs for u8 {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg_fmt(self)
    }

    fn write_args_from_slice<W>(items: &[u8], out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(items);
    }
}

impl ToRedisArgs for String {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl ToRedisArgs for &str {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.as_bytes())
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &T {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        (*self).write_redis_args(out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &[T] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Vec<T> {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(self, out)
    }
}

impl<T: ToRedisArgs, const N: usize> ToRedisArgs for &[T; N] {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        ToRedisArgs::write_args_from_slice(&self[..], out)
    }
}

impl<K: ToRedisArgs, V: ToRedisArgs> ToRedisArgs for (K, V) {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        self.0.write_redis_args(out);
        self.1.write_redis_args(out);
    }
}

/// This trait is used to convert a redis value into a more appropriate
/// type.
pub trait FromRedisValue: Sized {
    /// Given a redis `Value` this attempts to convert it into the given
    /// destination type.  If that fails because the value is not
    /// appropriate an error is generated.
    fn from_redis_value(v: &Value) -> RedisResult<Self>;

    /// Given an owned redis `Value` this attempts the conversion
    /// without cloning where possible.
    fn from_owned_redis_value(v: Value) -> RedisResult<Self> {
        Self::from_redis_value(&v)
    }

    /// Helper used by the `Vec` conversion so that `Vec<u8>` can take
    /// binary data whole instead of element-wise.
    #[doc(hidden)]
    fn from_owned_byte_vec(vec: Vec<u8>) -> RedisResult<Vec<Self>> {
        Self::from_owned_redis_value(Value::Data(vec)).map(|rv| vec![rv])
    }
}

macro_rules! from_redis_value_for_num {
    ($t:ty) => {
        impl FromRedisValue for $t {
            fn from_redis_value(v: &Value) -> RedisResult<$t> {
                match *v {
                    Value::Int(val) => Ok(val as $t),
                    Value::Data(ref bytes) => match from_utf8(bytes)?.parse::<$t>() {
                        Ok(rv) => Ok(rv),
                        Err(_) => invalid_type_error!(v, "Could not convert from string."),
                    },
                    Value::Status(ref s) => match s.parse::<$t>() {
                        Ok(rv) => Ok(rv),
                        Err(_) => invalid_type_error!(v, "Could not convert from string."),
                    },
                    _ => invalid_type_error!(v, "Response type not convertible to numeric."),
                }
            }
        }
    };
}

from_redis_value_for_num!(i8);
from_redis_value_for_num!(i16);
from_redis_value_for_num!(u16);
from_redis_value_for_num!(i32);
from_redis_value_for_num!(u32);
from_redis_value_for_num!(i64);
from_redis_value_for_num!(u64);
from_redis_value_for_num!(isize);
from_redis_value_for_num!(usize);

impl FromRedisValue for u8 {
    fn from_redis_value(v: &Value) -> RedisResult<u8> {
        match *v {
            Value::Int(val) => Ok(val as u8),
            Value::Data(ref bytes) => match from_utf8(bytes)?.parse::<u8>() {
                Ok(rv) => Ok(rv),
                Err(_) => invalid_type_error!(v, "Could not convert from string."),
            },
            Value::Status(ref s) => match s.parse::<u8>() {
                Ok(rv) => Ok(rv),
                Err(_) => invalid_type_error!(v, "Could not convert from string."),
            },
            _ => invalid_type_error!(v, "Response type not convertible to numeric."),
        }
    }

    // Binary data becomes the byte vector itself.
    fn from_owned_byte_vec(vec: Vec<u8>) -> RedisResult<Vec<u8>> {
        Ok(vec)
    }
}

impl FromRedisValue for Value {
    fn from_redis_value(v: &Value) -> RedisResult<Value> {
        Ok(v.clone())
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<Value> {
        Ok(v)
    }
}

impl FromRedisValue for () {
    fn from_redis_value(_v: &Value) -> RedisResult<()> {
        Ok(())
    }
}

impl FromRedisValue for bool {
    fn from_redis_value(v: &Value) -> RedisResult<bool> {
        match *v {
            Value::Nil => Ok(false),
            Value::Int(val) => Ok(val != 0),
            Value::Status(ref s) => {
                if &s[..] == "1" {
                    Ok(true)
                } else if &s[..] == "0" {
                    Ok(false)
                } else {
                    invalid_type_error!(v, "Response status not valid boolean.")
                }
            }
            Value::Data(ref bytes) => {
                if bytes == b"1" {
                    Ok(true)
                } else if bytes == b"0" {
                    Ok(false)
                } else {
                    invalid_type_error!(v, "Response type not valid boolean.")
                }
            }
            Value::Okay => Ok(true),
            _ => invalid_type_error!(v, "Response type not valid boolean."),
        }
    }
}

impl FromRedisValue for String {
    fn from_redis_value(v: &Value) -> RedisResult<String> {
        match *v {
            Value::Data(ref bytes) => Ok(from_utf8(bytes)?.to_string()),
            Value::Okay => Ok("OK".to_string()),
            Value::Status(ref val) => Ok(val.to_string()),
            Value::Int(val) => Ok(val.to_string()),
            _ => invalid_type_error!(v, "Response type not string compatible."),
        }
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<String> {
        match v {
            Value::Data(bytes) => Ok(String::from_utf8(bytes)?),
            Value::Okay => Ok("OK".to_string()),
            Value::Status(val) => Ok(val),
            Value::Int(val) => Ok(val.to_string()),
            v => invalid_type_error!(v, "Response type not string compatible."),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Option<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Option<T>> {
        match *v {
            Value::Nil => Ok(None),
            _ => Ok(Some(from_redis_value(v)?)),
        }
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<Option<T>> {
        match v {
            Value::Nil => Ok(None),
            v => Ok(Some(from_owned_redis_value(v)?)),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Vec<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Vec<T>> {
        match *v {
            Value::Bulk(ref items) => items.iter().map(from_redis_value).collect(),
            // Binary data defers to the element type: one parsed
            // element in general, the raw bytes for `Vec<u8>`.
            Value::Data(ref bytes) => T::from_owned_byte_vec(bytes.clone()),
            Value::Nil => Ok(vec![]),
            _ => invalid_type_error!(v, "Response type not vec compatible."),
        }
    }

    fn from_owned_redis_value(v: Value) -> RedisResult<Vec<T>> {
        match v {
            Value::Bulk(items) => items.into_iter().map(from_owned_redis_value).collect(),
            Value::Data(bytes) => T::from_owned_byte_vec(bytes),
            Value::Nil => Ok(vec![]),
            v => invalid_type_error!(v, "Response type not vec compatible."),
        }
    }
}

/// A shortcut function to invoke [`FromRedisValue::from_redis_value`]
/// to make the API slightly nicer.
pub fn from_redis_value<T: FromRedisValue>(v: &Value) -> RedisResult<T> {
    FromRedisValue::from_redis_value(v)
}

/// A shortcut function to invoke [`FromRedisValue::from_owned_redis_value`]
/// to make the API slightly nicer.
pub fn from_owned_redis_value<T: FromRedisValue>(v: Value) -> RedisResult<T> {
    FromRedisValue::from_owned_redis_value(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_server_error_maps_cluster_codes() {
        let err = make_server_error("MOVED 3999 127.0.0.1:6381");
        assert_eq!(err.kind(), ErrorKind::Moved);
        assert_eq!(err.code(), Some("MOVED"));
        assert_eq!(err.redirect_node(), Some(("127.0.0.1:6381", 3999)));

        let err = make_server_error("TRYAGAIN Multiple keys request during rehashing of slot");
        assert_eq!(err.kind(), ErrorKind::TryAgain);
        assert!(err.is_cluster_error());

        let err = make_server_error("CLUSTERDOWN The cluster is down");
        assert_eq!(err.kind(), ErrorKind::ClusterDown);
    }

    #[test]
    fn test_make_server_error_unknown_code_is_extension() {
        let err = make_server_error("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert_eq!(err.kind(), ErrorKind::ExtensionError);
        assert_eq!(err.code(), Some("WRONGTYPE"));
    }

    #[test]
    fn test_redirect_node_requires_redirect_kind() {
        let err = make_server_error("ERR unknown command");
        assert_eq!(err.redirect_node(), None);
    }

    #[test]
    fn test_error_is_cloneable() {
        let err = RedisError::from(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        let clone = err.clone();
        assert!(clone.is_io_error());
        assert!(clone.is_connection_dropped());
    }

    #[test]
    fn test_from_redis_value_basics() {
        assert_eq!(from_redis_value::<i64>(&Value::Int(42)), Ok(42));
        assert_eq!(
            from_redis_value::<String>(&Value::Data(b"hello".to_vec())),
            Ok("hello".to_string())
        );
        assert_eq!(from_redis_value::<Option<String>>(&Value::Nil), Ok(None));
        assert_eq!(
            from_redis_value::<Vec<String>>(&Value::Bulk(vec![
                Value::Data(b"a".to_vec()),
                Value::Data(b"b".to_vec()),
            ])),
            Ok(vec!["a".to_string(), "b".to_string()])
        );
    }
}
