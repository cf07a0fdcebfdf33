//! Forwarding entries and snapshot records
//!
//! A forwarding entry maps a target node to the triple
//! `(next_hop, local_if, remote_if)`. On the wire the triple uses two
//! sentinels: `(-1, -1, -1)` for a deliberate drop and `(-2, -2, -2)` for an
//! entry that has never been written. [`NextHop`] gives both sentinels their
//! own variants so that a half-sentinel triple cannot be represented.

use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, ValidationError};
use crate::identity::NodeId;

/// Raw value of the drop sentinel
pub const DROP_SENTINEL: i64 = -1;

/// Raw value of the unset sentinel
pub const UNSET_SENTINEL: i64 = -2;

/// Where a node sends packets for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NextHop {
    /// Never written; only exists before the first snapshot is loaded
    Unset,
    /// Deliberately discard packets for this target
    Drop,
    /// Send out of `local_if`, arriving on `remote_if` of `node`
    Forward {
        node: NodeId,
        local_if: u32,
        remote_if: u32,
    },
}

impl NextHop {
    pub fn forward(node: NodeId, local_if: u32, remote_if: u32) -> Self {
        Self::Forward {
            node,
            local_if,
            remote_if,
        }
    }

    /// Build an entry from a raw triple, rejecting the unset sentinel and
    /// triples that mix `-1` with real values.
    pub fn from_triple(next_hop: i64, local_if: i64, remote_if: i64) -> Result<Self, ValidationError> {
        if [next_hop, local_if, remote_if].contains(&UNSET_SENTINEL) {
            return Err(ValidationError::UnsetSentinel);
        }
        if next_hop == DROP_SENTINEL && local_if == DROP_SENTINEL && remote_if == DROP_SENTINEL {
            return Ok(Self::Drop);
        }
        if next_hop < 0 || local_if < 0 || remote_if < 0 {
            return Err(ValidationError::PartialDrop {
                next_hop,
                local_if,
                remote_if,
            });
        }
        let node = u32::try_from(next_hop).map_err(|_| ValidationError::NodeOutOfRange {
            node: next_hop,
            min: 0,
            max: u32::MAX as i64,
        })?;
        let narrow = |v: i64| {
            u32::try_from(v).map_err(|_| ValidationError::InterfaceOutOfRange {
                node: NodeId(node),
                interface: v,
                count: u32::MAX as usize,
            })
        };
        Ok(Self::Forward {
            node: NodeId(node),
            local_if: narrow(local_if)?,
            remote_if: narrow(remote_if)?,
        })
    }

    /// The wire triple, with sentinels expanded
    pub fn as_triple(&self) -> (i64, i64, i64) {
        match *self {
            Self::Unset => (UNSET_SENTINEL, UNSET_SENTINEL, UNSET_SENTINEL),
            Self::Drop => (DROP_SENTINEL, DROP_SENTINEL, DROP_SENTINEL),
            Self::Forward {
                node,
                local_if,
                remote_if,
            } => (node.0 as i64, local_if as i64, remote_if as i64),
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn next_node(&self) -> Option<NodeId> {
        match self {
            Self::Forward { node, .. } => Some(*node),
            _ => None,
        }
    }

    pub fn local_interface(&self) -> Option<u32> {
        match self {
            Self::Forward { local_if, .. } => Some(*local_if),
            _ => None,
        }
    }
}

/// A forwarding decision for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextHopEntry {
    pub target: NodeId,
    pub hop: NextHop,
}

impl NextHopEntry {
    pub fn new(target: NodeId, hop: NextHop) -> Self {
        Self { target, hop }
    }

    pub fn dropped(target: NodeId) -> Self {
        Self::new(target, NextHop::Drop)
    }

    pub fn is_drop(&self) -> bool {
        self.hop.is_drop()
    }

    /// True when the next hop is the target itself
    pub fn is_direct(&self) -> bool {
        self.hop.next_node() == Some(self.target)
    }
}

/// One line of a forwarding snapshot, before validation
///
/// Format: `current,target,next_hop,own_if,next_if[,distance]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub current: i64,
    pub target: i64,
    pub next_hop: i64,
    pub local_if: i64,
    pub remote_if: i64,
    pub distance: Option<u32>,
}

impl SnapshotRecord {
    /// Parse one comma-separated record; `line` is 1-based and only used in errors
    pub fn parse_line(line: usize, text: &str) -> Result<Self, SnapshotError> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(SnapshotError::Malformed {
                line,
                reason: format!("expected 5 or 6 fields, found {}", fields.len()),
            });
        }

        let int = |idx: usize| -> Result<i64, SnapshotError> {
            fields[idx].parse::<i64>().map_err(|e| SnapshotError::Malformed {
                line,
                reason: format!("field {} ({:?}): {}", idx, fields[idx], e),
            })
        };

        let distance = match fields.get(5) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|e| SnapshotError::Malformed {
                line,
                reason: format!("distance ({:?}): {}", raw, e),
            })?),
            None => None,
        };

        Ok(Self {
            current: int(0)?,
            target: int(1)?,
            next_hop: int(2)?,
            local_if: int(3)?,
            remote_if: int(4)?,
            distance,
        })
    }

    /// Parse a whole snapshot, skipping blank lines and `#` comments
    pub fn parse_all(text: &str) -> Result<Vec<Self>, SnapshotError> {
        text.lines()
            .enumerate()
            .filter(|(_, l)| {
                let l = l.trim();
                !l.is_empty() && !l.starts_with('#')
            })
            .map(|(i, l)| Self::parse_line(i + 1, l))
            .collect()
    }

    /// Record for a decided entry
    pub fn from_hop(current: NodeId, target: NodeId, hop: NextHop, distance: Option<u32>) -> Self {
        let (next_hop, local_if, remote_if) = hop.as_triple();
        Self {
            current: current.0 as i64,
            target: target.0 as i64,
            next_hop,
            local_if,
            remote_if,
            distance,
        }
    }

    /// Render back to the text form
    pub fn to_line(&self) -> String {
        match self.distance {
            Some(d) => format!(
                "{},{},{},{},{},{}",
                self.current, self.target, self.next_hop, self.local_if, self.remote_if, d
            ),
            None => format!(
                "{},{},{},{},{}",
                self.current, self.target, self.next_hop, self.local_if, self.remote_if
            ),
        }
    }

    pub fn hop(&self) -> Result<NextHop, ValidationError> {
        NextHop::from_triple(self.next_hop, self.local_if, self.remote_if)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triple_drop() {
        assert_eq!(NextHop::from_triple(-1, -1, -1).unwrap(), NextHop::Drop);
    }

    #[test]
    fn test_from_triple_rejects_unset() {
        assert_eq!(
            NextHop::from_triple(-2, -2, -2),
            Err(ValidationError::UnsetSentinel)
        );
        assert_eq!(
            NextHop::from_triple(3, -2, 1),
            Err(ValidationError::UnsetSentinel)
        );
    }

    #[test]
    fn test_from_triple_rejects_partial_drop() {
        assert!(matches!(
            NextHop::from_triple(-1, 0, -1),
            Err(ValidationError::PartialDrop { .. })
        ));
        assert!(matches!(
            NextHop::from_triple(7, -1, 2),
            Err(ValidationError::PartialDrop { .. })
        ));
    }

    #[test]
    fn test_triple_forms() {
        let hop = NextHop::from_triple(12, 2, 3).unwrap();
        assert_eq!(hop, NextHop::forward(NodeId(12), 2, 3));
        assert_eq!(hop.as_triple(), (12, 2, 3));
        assert_eq!(NextHop::Unset.as_triple(), (-2, -2, -2));
        assert_eq!(NextHop::Drop.as_triple(), (-1, -1, -1));
    }

    #[test]
    fn test_entry_is_direct() {
        let entry = NextHopEntry::new(NodeId(12), NextHop::forward(NodeId(12), 4, 0));
        assert!(entry.is_direct());
        let entry = NextHopEntry::new(NodeId(12), NextHop::forward(NodeId(3), 1, 2));
        assert!(!entry.is_direct());
        assert!(!NextHopEntry::dropped(NodeId(12)).is_direct());
    }

    #[test]
    fn test_parse_line() {
        let rec = SnapshotRecord::parse_line(1, "5,12,12,2,3").unwrap();
        assert_eq!(rec.current, 5);
        assert_eq!(rec.target, 12);
        assert_eq!(rec.next_hop, 12);
        assert_eq!(rec.distance, None);

        let rec = SnapshotRecord::parse_line(1, " 0, 16, 1, 3, 0, 4 ").unwrap();
        assert_eq!(rec.distance, Some(4));
        assert_eq!(rec.to_line(), "0,16,1,3,0,4");
    }

    #[test]
    fn test_parse_line_malformed() {
        assert!(matches!(
            SnapshotRecord::parse_line(3, "1,2,3"),
            Err(SnapshotError::Malformed { line: 3, .. })
        ));
        assert!(SnapshotRecord::parse_line(1, "1,2,x,0,0").is_err());
        assert!(SnapshotRecord::parse_line(1, "1,2,3,0,0,-4").is_err());
    }

    #[test]
    fn test_parse_all_skips_blank_lines() {
        let text = "# t=0\n0,16,1,3,0\n\n1,16,-1,-1,-1\n";
        let records = SnapshotRecord::parse_all(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].hop().unwrap(), NextHop::Drop);
    }
}
