//! Termination-detection policies for keyed processes.
//!
//! Pure functions: given the status a step function proposes and the
//! termination state the same process had last round at this device and at
//! its process neighbours, decide the final status and the state to share.
//!
//! - `Legacy`: a terminated flag spreads with one round of memory; a device
//!   leaves once all its process neighbours are terminated.
//! - `Share`: same rule, flag spread in one exchange.
//! - `Ispp`: share-style flag plus a spatio-temporal admissibility test
//!   against the process origin; slow devices stop spreading.
//! - `Wispp`: like `Ispp` but the origin only anchors the estimates in its
//!   first round, so the process decays as a wave.

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::neighborhood::Link;
use crate::status::Status;
use crate::types::DeviceId;

/// Distance value for "unreachable". Absorbing under addition and min.
pub const INFINITY: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationPolicy {
    Legacy,
    Share,
    Ispp,
    Wispp,
}

/// Termination bookkeeping a process instance shares with its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminationState {
    pub terminated: bool,
    /// Previous-round `terminated`, only used by `Legacy`.
    pub memory: bool,
    /// Metric distance estimate from the process origin.
    pub distance: f64,
    /// Elapsed-lag estimate from the process origin.
    pub lag: f64,
}

impl Default for TerminationState {
    fn default() -> Self {
        Self {
            terminated: false,
            memory: false,
            distance: INFINITY,
            lag: INFINITY,
        }
    }
}

/// Round length and radius, used to scale the admissibility test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub period: f64,
    pub radius: f64,
}

/// What a policy sees of one process instance.
#[derive(Debug, Clone)]
pub struct TerminationInput<'a> {
    pub self_id: DeviceId,
    /// Device that started the process.
    pub origin: DeviceId,
    /// True in the first round this instance runs here.
    pub first_round: bool,
    pub own: Option<&'a TerminationState>,
    pub own_link: Link,
    pub peers: Vec<(Link, &'a TerminationState)>,
}

impl TerminationPolicy {
    pub const ALL: [TerminationPolicy; 4] = [
        TerminationPolicy::Legacy,
        TerminationPolicy::Share,
        TerminationPolicy::Ispp,
        TerminationPolicy::Wispp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TerminationPolicy::Legacy => "legacy",
            TerminationPolicy::Share => "share",
            TerminationPolicy::Ispp => "ispp",
            TerminationPolicy::Wispp => "wispp",
        }
    }

    /// Bytes each process adds to a round's export for this policy.
    pub fn overhead_bytes(self) -> usize {
        match self {
            TerminationPolicy::Legacy | TerminationPolicy::Share => {
                2 * size_of::<bool>() + 2 * size_of::<u64>()
            }
            TerminationPolicy::Ispp | TerminationPolicy::Wispp => {
                size_of::<bool>() + 2 * size_of::<f64>() + 3 * size_of::<u64>()
            }
        }
    }

    /// Apply the policy to a proposed status.
    pub fn apply(
        self,
        status: Status,
        speed: f64,
        input: &TerminationInput<'_>,
        envelope: Envelope,
    ) -> (Status, TerminationState) {
        let terminating = status == Status::TerminatedOutput;
        let peers_terminated = input.peers.iter().any(|(_, p)| p.terminated);

        match self {
            TerminationPolicy::Legacy => {
                let memory = input.own.map_or(terminating, |o| o.terminated);
                let terminated =
                    memory || terminating || input.peers.iter().any(|(_, p)| p.memory);
                let state = TerminationState {
                    terminated,
                    memory,
                    ..TerminationState::default()
                };
                (exit_or_report(status, terminated, input), state)
            }
            TerminationPolicy::Share => {
                let terminated = terminating
                    || peers_terminated
                    || input.own.is_some_and(|o| o.terminated);
                let state = TerminationState {
                    terminated,
                    ..TerminationState::default()
                };
                (exit_or_report(status, terminated, input), state)
            }
            TerminationPolicy::Ispp | TerminationPolicy::Wispp => {
                let terminated = terminating
                    || peers_terminated
                    || input.own.is_some_and(|o| o.terminated);
                let source = input.origin == input.self_id
                    && (self == TerminationPolicy::Ispp || input.first_round);

                let distance = monotonic_distance(
                    source,
                    input.own.map(|o| o.distance),
                    input.own_link.distance,
                    input.peers.iter().map(|(l, p)| (p.distance, l.distance)),
                );
                let lag = monotonic_distance(
                    source,
                    input.own.map(|o| o.lag),
                    input.own_link.lag,
                    input.peers.iter().map(|(l, p)| (p.lag, l.lag)),
                );

                let status = if terminated || is_slow(distance, lag, speed, envelope) {
                    stop_spreading(status)
                } else {
                    status
                };
                let state = TerminationState {
                    terminated,
                    memory: false,
                    distance,
                    lag,
                };
                (status, state)
            }
        }
    }
}

/// Distance from a source that only shrinks while the source is reachable.
///
/// `own` is this device's previous estimate (absent for a fresh instance),
/// `peers` yields each neighbour's previous estimate with the link metric.
pub fn monotonic_distance(
    source: bool,
    own: Option<f64>,
    own_metric: f64,
    peers: impl Iterator<Item = (f64, f64)>,
) -> f64 {
    if source {
        return 0.0;
    }
    let own = own.unwrap_or(INFINITY) + own_metric;
    peers.fold(own, |best, (nd, metric)| best.min(nd + metric))
}

/// Information reached this device slower than `speed` times the radius per
/// period allows. Infinite estimates never count as slow.
fn is_slow(distance: f64, lag: f64, speed: f64, envelope: Envelope) -> bool {
    if !distance.is_finite() || !lag.is_finite() {
        return false;
    }
    distance < speed * envelope.radius / envelope.period * (lag - envelope.period)
}

fn exit_or_report(status: Status, terminated: bool, input: &TerminationInput<'_>) -> Status {
    let exiting = terminated && input.peers.iter().all(|(_, p)| p.terminated);
    if exiting {
        Status::External
    } else if status == Status::TerminatedOutput {
        Status::InternalOutput
    } else {
        status
    }
}

fn stop_spreading(status: Status) -> Status {
    match status {
        Status::TerminatedOutput | Status::InternalOutput => Status::BorderOutput,
        Status::Internal => Status::Border,
        other => other,
    }
}
