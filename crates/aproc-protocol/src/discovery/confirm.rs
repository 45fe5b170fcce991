//! Confirmation process, keyed by the requester.
//!
//! Started by each provider that answered a request. It runs along the
//! spanning-tree path between provider and requester and does three things
//! at once: builds a distance gradient toward the requester, collects the
//! best offer up that gradient, and broadcasts the requester's choice back
//! down it. The chosen provider ends the process.

use crate::discovery::types::{ConfirmData, Offer, Phase};
use crate::process::{ProcessView, Step};
use crate::status::Status;
use crate::termination::INFINITY;
use crate::tree::{parent_collection, Membership, SubtreeSet};
use crate::types::{DeviceId, Message, MessageKind};

/// Device state the confirmation step depends on.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmInputs<'a> {
    pub phase: Phase,
    pub message: Option<Message>,
    pub rank: f64,
    pub tree_parent: DeviceId,
    pub subtree: &'a SubtreeSet,
    /// Rounds the requester collects offers before choosing.
    pub stabilize_after: f64,
}

/// Something the automaton has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmSignal {
    /// This requester picked the given provider.
    Chose(DeviceId),
    /// This provider was picked.
    Chosen,
}

pub fn confirm_step(
    requester: DeviceId,
    view: &ProcessView<'_, ConfirmData>,
    inputs: &ConfirmInputs<'_>,
) -> (Step<ConfirmData>, Option<ConfirmSignal>) {
    let me = view.self_id();
    let is_requester = me == requester;
    let offering = inputs.phase == Phase::Offer
        && inputs.message.is_some_and(|m| {
            m.kind() == MessageKind::Offer && m.from() == me && m.to() == requester
        });

    let (distance, toward) = if is_requester {
        (0.0, me)
    } else {
        view.nbrs
            .peers()
            .iter()
            .filter(|p| p.value.data.distance.is_finite())
            .map(|p| (p.value.data.distance + p.link.distance, p.id))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .unwrap_or((INFINITY, me))
    };

    let seed = offering.then_some(Offer {
        rank: inputs.rank,
        provider: me,
    });
    let best = parent_collection(
        &view.nbrs,
        |r| r.data.toward,
        |r| &r.data.best,
        seed,
        |acc, b| Offer::better(acc, *b),
    );

    let mut signal = None;
    let chosen = if is_requester {
        match view.own().and_then(|r| r.data.chosen) {
            Some(previous) => Some(previous),
            None if inputs.phase == Phase::Disco
                && f64::from(view.age) > inputs.stabilize_after =>
            {
                let pick = best.map(|o| o.provider);
                signal = pick.map(ConfirmSignal::Chose);
                pick
            }
            None => None,
        }
    } else {
        view.nbrs.peer(toward).and_then(|p| p.value.data.chosen)
    };
    if offering && chosen == Some(me) {
        signal = Some(ConfirmSignal::Chosen);
    }

    let on_path = offering
        || is_requester
        || view.nbrs.any_hood(|p| p.value.data.tree_parent == me)
        || inputs.subtree.probably_contains(requester);
    let status = if (is_requester && inputs.phase == Phase::Idle) || chosen == Some(me) {
        Status::TerminatedOutput
    } else if on_path {
        Status::Internal
    } else {
        Status::External
    };

    let data = ConfirmData {
        tree_parent: inputs.tree_parent,
        distance,
        toward,
        best,
        chosen,
    };
    (Step::new(view.now, status, data), signal)
}
