//! Discovery types: phases, service profiles, transitions and the data the
//! confirmation process shares.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, Message, Round, ServiceType};

/// Phase of the service-discovery automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    /// Requester waiting for offers.
    Disco,
    /// Provider that answered a request and waits to be chosen.
    Offer,
    /// Requester that chose a provider and waits for the data.
    Served,
    /// Provider streaming data to its requester.
    Serving,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Idle,
        Phase::Disco,
        Phase::Offer,
        Phase::Served,
        Phase::Serving,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Disco => "DISCO",
            Phase::Offer => "OFFER",
            Phase::Served => "SERVED",
            Phase::Serving => "SERVING",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service a device will ask for once `at` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub at: Round,
    pub service: ServiceType,
    /// Extra attempts after an unanswered one.
    #[serde(default)]
    pub retries: u32,
}

/// What a device offers and what it will ask for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub offered: Option<ServiceType>,
    /// Quality of the offered service; the highest rank wins.
    pub rank: f64,
    pub requests: Vec<ServiceRequest>,
}

impl ServiceProfile {
    pub fn offering(service: ServiceType, rank: f64) -> Self {
        Self {
            offered: Some(service),
            rank,
            requests: Vec::new(),
        }
    }

    pub fn requesting(service: ServiceType, at: Round) -> Self {
        Self::default().with_request(ServiceRequest {
            at,
            service,
            retries: 0,
        })
    }

    pub fn with_request(mut self, request: ServiceRequest) -> Self {
        self.requests.push(request);
        self
    }
}

/// Automaton phase and the message in flight. Starts idle and empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutomatonState {
    pub phase: Phase,
    pub message: Option<Message>,
}

/// A phase change, reported to the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub round: Round,
    pub from: Phase,
    pub to: Phase,
    pub message: Option<Message>,
}

/// An offer travelling toward a requester.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub rank: f64,
    pub provider: DeviceId,
}

impl Offer {
    /// Higher rank wins, then higher provider id.
    pub fn better(a: Option<Offer>, b: Option<Offer>) -> Option<Offer> {
        match (a, b) {
            (Some(x), Some(y)) => {
                let x_wins = x
                    .rank
                    .total_cmp(&y.rank)
                    .then(x.provider.cmp(&y.provider))
                    .is_ge();
                Some(if x_wins { x } else { y })
            }
            (x, None) => x,
            (None, y) => y,
        }
    }
}

/// Shared by every device running a confirmation process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmData {
    /// Spanning-tree parent, so neighbours can tell whether they are on the
    /// source path.
    pub tree_parent: DeviceId,
    /// Distance to the requester inside the process.
    pub distance: f64,
    /// Neighbour this device reaches the requester through.
    pub toward: DeviceId,
    /// Best offer collected from this device's side.
    pub best: Option<Offer>,
    /// Provider the requester picked, once it did.
    pub chosen: Option<DeviceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(rank: f64, id: u32) -> Option<Offer> {
        Some(Offer {
            rank,
            provider: DeviceId(id),
        })
    }

    #[test]
    fn better_prefers_rank_then_id() {
        assert_eq!(Offer::better(offer(0.8, 1), offer(0.5, 7)), offer(0.8, 1));
        assert_eq!(Offer::better(offer(0.5, 1), offer(0.5, 7)), offer(0.5, 7));
        assert_eq!(Offer::better(None, offer(0.1, 2)), offer(0.1, 2));
        assert_eq!(Offer::better(offer(0.1, 2), None), offer(0.1, 2));
        assert_eq!(Offer::better(None, None), None);
    }

    #[test]
    fn phase_names() {
        let names: Vec<_> = Phase::ALL.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, ["IDLE", "DISCO", "OFFER", "SERVED", "SERVING"]);
    }

    #[test]
    fn profile_from_json() {
        let profile: ServiceProfile = serde_json::from_str(
            r#"{"offered": 5, "rank": 0.8, "requests": [{"at": 10, "service": 6}]}"#,
        )
        .unwrap();
        assert_eq!(profile.offered, Some(ServiceType(5)));
        assert_eq!(profile.requests[0].retries, 0);
    }
}
