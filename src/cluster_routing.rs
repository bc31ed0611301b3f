use rand::{thread_rng, Rng};

use crate::cmd::Cmd;
use crate::commands::is_readonly_cmd;

pub(crate) const SLOT_SIZE: u16 = 16384;

/// Where a single command may be routed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RoutingInfo {
    /// Must run on the primary that owns the slot.
    MasterSlot(u16),
    /// May run on a replica of the slot, subject to the replica policy.
    ReplicaSlot(u16),
}

impl RoutingInfo {
    /// Derives the routing for a command, or `None` if the command
    /// carries no key.
    pub(crate) fn for_routable(cmd: &Cmd) -> Option<RoutingInfo> {
        let name = &cmd.command()?[..];
        match name {
            b"EVAL" | b"EVALSHA" => {
                let key_count = cmd
                    .arg_idx(2)
                    .and_then(|x| std::str::from_utf8(x).ok())
                    .and_then(|x| x.parse::<u64>().ok())?;
                if key_count == 0 {
                    None
                } else {
                    cmd.arg_idx(3).map(|key| RoutingInfo::for_key(name, key))
                }
            }
            _ => cmd.arg_idx(1).map(|key| RoutingInfo::for_key(name, key)),
        }
    }

    fn for_key(name: &[u8], key: &[u8]) -> RoutingInfo {
        let slot = get_slot(key);
        if is_readonly_cmd(name) {
            RoutingInfo::ReplicaSlot(slot)
        } else {
            RoutingInfo::MasterSlot(slot)
        }
    }

    pub(crate) fn slot(&self) -> u16 {
        match *self {
            RoutingInfo::MasterSlot(slot) | RoutingInfo::ReplicaSlot(slot) => slot,
        }
    }
}

/// Controls whether read commands may be served by replicas.
///
/// This is a cluster-wide policy; write commands always go to the
/// primary regardless of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadFromReplicas {
    /// All commands go to the primary (default).
    #[default]
    Never,
    /// Read commands go to a randomly chosen replica; the primary is
    /// used only when the slot has no replica.
    Always,
    /// Read commands are spread randomly over the primary and all
    /// replicas.
    Share,
}

/// Picks the index into a slot's `[primary, replica..]` node list for
/// one dispatch.
pub(crate) fn node_index(route: RoutingInfo, policy: ReadFromReplicas, node_count: usize) -> usize {
    match (route, policy) {
        (RoutingInfo::MasterSlot(_), _) | (_, ReadFromReplicas::Never) => 0,
        (RoutingInfo::ReplicaSlot(_), ReadFromReplicas::Always) => {
            if node_count > 1 {
                thread_rng().gen_range(1..node_count)
            } else {
                0
            }
        }
        (RoutingInfo::ReplicaSlot(_), ReadFromReplicas::Share) => {
            thread_rng().gen_range(0..node_count)
        }
    }
}

fn get_hashtag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|v| *v == b'{')?;
    let close = key[open..].iter().position(|v| *v == b'}')?;

    let rv = &key[open + 1..open + close];
    if rv.is_empty() {
        None
    } else {
        Some(rv)
    }
}

/// Returns the slot that matches `key`.
///
/// When the key contains a hash tag (`{` followed by `}` with at least
/// one byte in between), only the tag participates in the hash so that
/// related keys can be colocated on one node.
pub fn get_slot(key: &[u8]) -> u16 {
    let key = match get_hashtag(key) {
        Some(tag) => tag,
        None => key,
    };

    crc16::State::<crc16::XMODEM>::calculate(key) % SLOT_SIZE
}
