//! Neighbourhood snapshot handed to a device at the start of every round.
//!
//! A device only ever reads exports from the *previous* round: its own and
//! those of the neighbours currently in range. The substrate builds the
//! snapshot before the round starts and it stays immutable for the whole
//! round, so no device can observe another's in-progress state.

use crate::types::DeviceId;

/// Measured properties of the link towards a neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// Estimated metric distance.
    pub distance: f64,
    /// Age of the neighbour's export when read.
    pub lag: f64,
}

impl Link {
    pub fn new(distance: f64, lag: f64) -> Self {
        Self { distance, lag }
    }

    /// The link a device has with itself: zero distance, one period of lag.
    pub fn own(period: f64) -> Self {
        Self {
            distance: 0.0,
            lag: period,
        }
    }
}

/// One neighbour's previous-round value.
#[derive(Debug)]
pub struct Peer<'a, T> {
    pub id: DeviceId,
    pub link: Link,
    pub value: &'a T,
}

impl<T> Clone for Peer<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Peer<'_, T> {}

/// Field view: the previous value of something at this device and at each
/// neighbour holding it.
#[derive(Debug)]
pub struct Neighborhood<'a, T> {
    self_id: DeviceId,
    own_link: Link,
    own: Option<&'a T>,
    peers: Vec<Peer<'a, T>>,
}

impl<T> Clone for Neighborhood<'_, T> {
    fn clone(&self) -> Self {
        Self {
            self_id: self.self_id,
            own_link: self.own_link,
            own: self.own,
            peers: self.peers.clone(),
        }
    }
}

impl<'a, T> Neighborhood<'a, T> {
    pub fn new(self_id: DeviceId, own_link: Link, own: Option<&'a T>, peers: Vec<Peer<'a, T>>) -> Self {
        Self {
            self_id,
            own_link,
            own,
            peers,
        }
    }

    /// A device with no previous value and nobody in range.
    pub fn isolated(self_id: DeviceId, period: f64) -> Self {
        Self::new(self_id, Link::own(period), None, Vec::new())
    }

    pub fn self_id(&self) -> DeviceId {
        self.self_id
    }

    pub fn own_link(&self) -> Link {
        self.own_link
    }

    /// This device's own value from the previous round, if it had one.
    pub fn own(&self) -> Option<&'a T> {
        self.own
    }

    pub fn peers(&self) -> &[Peer<'a, T>] {
        &self.peers
    }

    pub fn peer(&self, id: DeviceId) -> Option<&Peer<'a, T>> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Project every value through `f`. Devices for which `f` yields `None`
    /// drop out of the resulting view (alignment on a sub-field).
    pub fn filter_map<U>(&self, f: impl Fn(&'a T) -> Option<&'a U>) -> Neighborhood<'a, U> {
        Neighborhood {
            self_id: self.self_id,
            own_link: self.own_link,
            own: self.own.and_then(&f),
            peers: self
                .peers
                .iter()
                .filter_map(|p| {
                    f(p.value).map(|value| Peer {
                        id: p.id,
                        link: p.link,
                        value,
                    })
                })
                .collect(),
        }
    }

    pub fn map<U>(&self, f: impl Fn(&'a T) -> &'a U) -> Neighborhood<'a, U> {
        self.filter_map(|v| Some(f(v)))
    }

    // ── Reductions over neighbours (self excluded) ─────────────────

    pub fn any_hood(&self, f: impl Fn(&Peer<'a, T>) -> bool) -> bool {
        self.peers.iter().any(f)
    }

    /// True when every neighbour satisfies `f`; vacuously true when alone.
    pub fn all_hood(&self, f: impl Fn(&Peer<'a, T>) -> bool) -> bool {
        self.peers.iter().all(f)
    }

    pub fn fold_hood<A>(&self, init: A, mut f: impl FnMut(A, &Peer<'a, T>) -> A) -> A {
        self.peers.iter().fold(init, |acc, p| f(acc, p))
    }

    /// Minimum of `f` over neighbours, starting from the device's own value.
    pub fn min_hood<K: PartialOrd>(&self, own: K, f: impl Fn(&Peer<'a, T>) -> K) -> K {
        self.fold_hood(own, |acc, p| {
            let v = f(p);
            if v < acc {
                v
            } else {
                acc
            }
        })
    }

    /// Maximum of `f` over neighbours, starting from the device's own value.
    pub fn max_hood<K: PartialOrd>(&self, own: K, f: impl Fn(&Peer<'a, T>) -> K) -> K {
        self.fold_hood(own, |acc, p| {
            let v = f(p);
            if v > acc {
                v
            } else {
                acc
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hood<'a>(own: Option<&'a i32>, values: &'a [(u32, f64, i32)]) -> Neighborhood<'a, i32> {
        let peers = values
            .iter()
            .map(|(id, d, v)| Peer {
                id: DeviceId(*id),
                link: Link::new(*d, 1.0),
                value: v,
            })
            .collect();
        Neighborhood::new(DeviceId(0), Link::own(1.0), own, peers)
    }

    #[test]
    fn reductions_exclude_self() {
        let own = 100;
        let values = [(1, 10.0, 3), (2, 20.0, 8)];
        let n = hood(Some(&own), &values);
        assert_eq!(n.max_hood(0, |p| *p.value), 8);
        assert_eq!(n.min_hood(i32::MAX, |p| *p.value), 3);
        assert!(n.any_hood(|p| *p.value == 8));
        assert!(!n.all_hood(|p| *p.value > 5));
        assert_eq!(n.fold_hood(0, |acc, p| acc + p.value), 11);
    }

    #[test]
    fn all_hood_is_vacuous_when_alone() {
        let n: Neighborhood<'_, i32> = Neighborhood::isolated(DeviceId(3), 1.0);
        assert!(n.all_hood(|_| false));
        assert!(!n.any_hood(|_| true));
        assert!(n.is_empty());
    }

    #[test]
    fn filter_map_aligns_on_present_values() {
        let tables = [vec![1], vec![], vec![7, 9]];
        let peers = tables
            .iter()
            .enumerate()
            .map(|(i, t)| Peer {
                id: DeviceId(i as u32 + 1),
                link: Link::new(1.0, 1.0),
                value: t,
            })
            .collect();
        let n = Neighborhood::new(DeviceId(0), Link::own(1.0), None, peers);
        let firsts = n.filter_map(|t| t.first());
        assert_eq!(firsts.len(), 2);
        assert!(firsts.peer(DeviceId(2)).is_none());
        assert_eq!(*firsts.peer(DeviceId(3)).unwrap().value, 7);
        assert!(firsts.own().is_none());
    }

    #[test]
    fn own_link_has_zero_distance() {
        let link = Link::own(2.0);
        assert_eq!(link.distance, 0.0);
        assert_eq!(link.lag, 2.0);
    }
}
