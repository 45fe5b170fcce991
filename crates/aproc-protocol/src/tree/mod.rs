//! Self-stabilising spanning tree.
//!
//! Flex parent selection gives every device a stable parent pointer toward
//! the root; parent-directed convergecast aggregates the set of devices in
//! each subtree. Tree-routed processes use both to stay on the path between
//! sender and destination.

pub mod flex;
pub mod membership;

pub use flex::{flex_parent, parent_collection, FlexParams, ParentPointer};
pub use membership::{BloomFilter, Membership, SubtreeMode, SubtreeSet, MAX_BLOOM_HASHES};

use crate::neighborhood::Neighborhood;
use crate::process::ProcessView;
use crate::status::Status;
use crate::types::{DeviceId, Message};

/// What a device announces about the tree each round.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeExport {
    pub pointer: ParentPointer,
    pub subtree: SubtreeSet,
}

/// Recompute the parent pointer, then fold in the children's subtrees.
pub fn tree_round(
    is_root: bool,
    radius: f64,
    max_distance: f64,
    params: &FlexParams,
    mode: SubtreeMode,
    nbrs: &Neighborhood<'_, TreeExport>,
) -> Result<TreeExport, crate::error::ProtocolError> {
    let pointer = flex_parent(is_root, radius, max_distance, params, &nbrs.map(|t| &t.pointer));
    let seed = SubtreeSet::singleton(nbrs.self_id(), mode)?;
    let subtree = parent_collection(
        nbrs,
        |t| t.pointer.parent,
        |t| &t.subtree,
        seed,
        |mut acc, s| {
            acc.absorb(s);
            acc
        },
    );
    Ok(TreeExport { pointer, subtree })
}

/// True when some process neighbour routes through this device.
pub fn named_as_parent(view: &ProcessView<'_, DeviceId>) -> bool {
    let me = view.self_id();
    view.nbrs.any_hood(|p| p.value.data == me)
}

/// Status of a tree-routed message at this device.
///
/// The destination ends the process. The sender, any device some process
/// neighbour names as parent (the source path up to the root) and any
/// device whose subtree holds the destination (the destination path) keep
/// it running; everyone else stays out.
pub fn route_status(
    me: DeviceId,
    message: &Message,
    child_on_path: bool,
    subtree: &SubtreeSet,
) -> Status {
    if message.to() == me {
        Status::TerminatedOutput
    } else if message.from() == me || child_on_path || subtree.probably_contains(message.to()) {
        Status::Internal
    } else {
        Status::External
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighborhood::{Link, Peer};

    fn exact(ids: &[u32]) -> SubtreeSet {
        SubtreeSet::Exact(ids.iter().map(|i| DeviceId(*i)).collect())
    }

    #[test]
    fn route_status_paths() {
        let m = Message::new(DeviceId(5), DeviceId(2), 0, 0.0);
        assert_eq!(
            route_status(DeviceId(2), &m, false, &exact(&[2])),
            Status::TerminatedOutput
        );
        assert_eq!(route_status(DeviceId(5), &m, false, &exact(&[5])), Status::Internal);
        assert_eq!(route_status(DeviceId(3), &m, true, &exact(&[3])), Status::Internal);
        assert_eq!(route_status(DeviceId(1), &m, false, &exact(&[1, 2])), Status::Internal);
        assert_eq!(route_status(DeviceId(4), &m, false, &exact(&[4])), Status::External);
    }

    #[test]
    fn subtree_collects_children_only() {
        let child = TreeExport {
            pointer: ParentPointer {
                distance: 50.0,
                parent: DeviceId(0),
            },
            subtree: exact(&[1, 3]),
        };
        let stranger = TreeExport {
            pointer: ParentPointer {
                distance: 50.0,
                parent: DeviceId(9),
            },
            subtree: exact(&[2]),
        };
        let peers = vec![
            Peer {
                id: DeviceId(1),
                link: Link::new(50.0, 1.0),
                value: &child,
            },
            Peer {
                id: DeviceId(2),
                link: Link::new(50.0, 1.0),
                value: &stranger,
            },
        ];
        let nbrs = Neighborhood::new(DeviceId(0), Link::own(1.0), None, peers);
        let out = tree_round(true, 100.0, 2000.0, &FlexParams::default(), SubtreeMode::Exact, &nbrs).unwrap();
        assert_eq!(out.pointer, ParentPointer::root(DeviceId(0)));
        assert_eq!(out.subtree, exact(&[0, 1, 3]));
    }
}
