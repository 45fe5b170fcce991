//! Flex parent selection and parent-directed convergecast.
//!
//! Distances follow a FLEX-style gradient: a raw Bellman-Ford candidate with
//! a per-link distortion floor, damped by a hysteresis band on the local
//! slope so small measurement noise does not keep flipping parents.

use serde::{Deserialize, Serialize};

use crate::neighborhood::{Neighborhood, Peer};
use crate::termination::INFINITY;
use crate::types::DeviceId;

/// Hysteresis and distortion knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlexParams {
    /// Half-width of the accepted slope band `[1 - epsilon, 1 + epsilon]`.
    pub epsilon: f64,
    /// Minimum link length, as a fraction of the radius.
    pub distortion: f64,
}

impl Default for FlexParams {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            distortion: 0.1,
        }
    }
}

/// A device's distance to the root and the neighbour it routes through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParentPointer {
    pub distance: f64,
    /// Equal to the device itself for the root and for detached devices.
    pub parent: DeviceId,
}

impl ParentPointer {
    pub fn detached(id: DeviceId) -> Self {
        Self {
            distance: INFINITY,
            parent: id,
        }
    }

    pub fn root(id: DeviceId) -> Self {
        Self {
            distance: 0.0,
            parent: id,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.distance.is_finite()
    }
}

/// Recompute this device's parent pointer from last round's pointers.
///
/// Distances beyond `max_distance` count as unreachable, so a component
/// that lost the root detaches instead of counting upward forever.
pub fn flex_parent(
    is_root: bool,
    radius: f64,
    max_distance: f64,
    params: &FlexParams,
    nbrs: &Neighborhood<'_, ParentPointer>,
) -> ParentPointer {
    let me = nbrs.self_id();
    if is_root {
        return ParentPointer::root(me);
    }

    let floor = params.distortion * radius;
    let own = nbrs.own();
    let previous = own.map_or(INFINITY, |p| p.distance);
    let candidate = nbrs.min_hood(INFINITY, |p| link_cost(p, floor));

    let distance = settle(previous, candidate, nbrs, floor, params);
    if !distance.is_finite() || distance > max_distance {
        return ParentPointer::detached(me);
    }

    // A parent must have been strictly closer than this device last round,
    // as every neighbour saw it, so parent chains strictly decrease in
    // last-round distance and cannot close a cycle.
    let eligible = |p: &&Peer<'_, ParentPointer>| {
        p.value.distance < distance && p.value.distance < previous && p.value.parent != me
    };
    let best = nbrs.peers().iter().filter(eligible).min_by(|a, b| {
        link_cost(a, floor)
            .total_cmp(&link_cost(b, floor))
            .then(a.id.cmp(&b.id))
    });
    let sticky = own
        .and_then(|o| nbrs.peer(o.parent))
        .filter(|p| eligible(p))
        .filter(|p| {
            best.is_some_and(|b| {
                link_cost(p, floor) <= (1.0 + params.epsilon) * link_cost(b, floor)
            })
        });
    let parent = sticky.or(best).map_or(me, |p| p.id);

    ParentPointer { distance, parent }
}

fn link_cost(p: &Peer<'_, ParentPointer>, floor: f64) -> f64 {
    p.value.distance + p.link.distance.max(floor)
}

/// Hysteresis: decide which distance to accept this round.
fn settle(
    previous: f64,
    candidate: f64,
    nbrs: &Neighborhood<'_, ParentPointer>,
    floor: f64,
    params: &FlexParams,
) -> f64 {
    if !candidate.is_finite() {
        return INFINITY;
    }
    let jumped = !previous.is_finite()
        || previous == 0.0
        || candidate == 0.0
        || candidate > 2.0 * previous
        || previous > 2.0 * candidate;
    let barely_changed = (candidate - previous).abs() <= params.epsilon * floor;
    if jumped || barely_changed {
        return candidate;
    }

    // Steepest neighbour: (slope, its distance, its link length).
    let steepest = nbrs
        .peers()
        .iter()
        .filter(|p| p.value.distance.is_finite())
        .map(|p| {
            let link = p.link.distance.max(floor);
            ((previous - p.value.distance) / link, p.value.distance, link)
        })
        .max_by(|a, b| a.0.total_cmp(&b.0));

    match steepest {
        Some((slope, nd, link)) if slope > 1.0 + params.epsilon => {
            nd + (1.0 + params.epsilon) * link
        }
        Some((slope, nd, link)) if slope < 1.0 - params.epsilon => {
            candidate.min(nd + (1.0 - params.epsilon) * link)
        }
        _ => previous,
    }
}

/// Convergecast toward the tree root.
///
/// Folds into `seed` the previous values of exactly those neighbours that
/// announce this device as their parent.
pub fn parent_collection<T, V>(
    nbrs: &Neighborhood<'_, T>,
    parent_of: impl Fn(&T) -> DeviceId,
    value_of: impl Fn(&T) -> &V,
    seed: V,
    mut combine: impl FnMut(V, &V) -> V,
) -> V {
    let me = nbrs.self_id();
    nbrs.fold_hood(seed, |acc, p| {
        if parent_of(p.value) == me {
            combine(acc, value_of(p.value))
        } else {
            acc
        }
    })
}
