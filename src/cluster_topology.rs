//! Parsing of the cluster slot-enumeration reply into slot ranges.

use crate::types::{RedisResult, Value};

/// A contiguous range of slots served by one primary and its replicas,
/// as reported by the cluster.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    start: u16,
    end: u16,
    master: String,
    replicas: Vec<String>,
}

impl Slot {
    pub(crate) fn new(start: u16, end: u16, master: String, replicas: Vec<String>) -> Slot {
        Slot {
            start,
            end,
            master,
            replicas,
        }
    }

    pub(crate) fn start(&self) -> u16 {
        self.start
    }

    pub(crate) fn end(&self) -> u16 {
        self.end
    }

    /// The `[primary, replica..]` endpoint list for this range.
    pub(crate) fn nodes(&self) -> Vec<String> {
        let mut nodes = Vec::with_capacity(1 + self.replicas.len());
        nodes.push(self.master.clone());
        nodes.extend(self.replicas.iter().cloned());
        nodes
    }
}

// Parse slot data from a raw CLUSTER SLOTS reply.  Entries that do not
// have the expected shape are skipped rather than failing the whole
// refresh.
pub(crate) fn parse_slots(raw_slot_resp: &Value) -> RedisResult<Vec<Slot>> {
    let mut result = Vec::with_capacity(2);

    if let Value::Bulk(items) = raw_slot_resp {
        let mut iter = items.iter();
        while let Some(Value::Bulk(item)) = iter.next() {
            if item.len() < 3 {
                continue;
            }

            let start = if let Value::Int(start) = item[0] {
                start as u16
            } else {
                continue;
            };

            let end = if let Value::Int(end) = item[1] {
                end as u16
            } else {
                continue;
            };

            let mut nodes: Vec<String> = item
                .iter()
                .skip(2)
                .filter_map(|node| {
                    if let Value::Bulk(node) = node {
                        if node.len() < 2 {
                            return None;
                        }

                        let host = if let Value::Data(ref host) = node[0] {
                            String::from_utf8_lossy(host)
                        } else {
                            return None;
                        };
                        if host.is_empty() {
                            return None;
                        }

                        let port = if let Value::Int(port) = node[1] {
                            port as u16
                        } else {
                            return None;
                        };
                        Some(format!("{host}:{port}"))
                    } else {
                        None
                    }
                })
                .collect();

            if nodes.is_empty() {
                continue;
            }

            let replicas = nodes.split_off(1);
            result.push(Slot::new(start, end, nodes.pop().unwrap(), replicas));
        }
    }

    Ok(result)
}
