//! Protocol configuration.
//!
//! Immutable once devices are built. Every field has a default so a JSON
//! file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ProtocolError;
use crate::termination::{Envelope, TerminationPolicy};
use crate::tree::{FlexParams, SubtreeMode};
use crate::types::DeviceId;

// ── Defaults ────────────────────────────────────────────────────────────

/// Simulated time units per round.
pub const DEFAULT_PERIOD: f64 = 1.0;
/// Communication radius.
pub const DEFAULT_RADIUS: f64 = 100.0;
/// Expected network diameter in hops; every timeout scales with it.
pub const DEFAULT_HOPS: u32 = 20;
/// DATA chunks sent by a provider before DATAEND.
pub const DEFAULT_FILE_SIZE: u32 = 10;
/// Speed for every admissibility test unless overridden.
pub const DEFAULT_SPEED: f64 = 0.3;

/// Termination policy and admissibility speed of one process manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub policy: TerminationPolicy,
    /// Fraction of the radius per period information must at least travel.
    pub speed: f64,
}

impl ManagerConfig {
    pub fn new(policy: TerminationPolicy, speed: f64) -> Self {
        Self { policy, speed }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub period: f64,
    pub radius: f64,
    pub hops: u32,
    /// DISCO and OFFER give up after `hops * timeout_coeff` rounds.
    pub timeout_coeff: f64,
    /// A requester picks its provider after `hops * stabilize_coeff` rounds.
    pub stabilize_coeff: f64,
    /// SERVED gives up waiting for DATAEND after `hops * serve_timeout_coeff`.
    pub serve_timeout_coeff: f64,
    pub file_size: u32,
    /// Root of the spanning tree.
    pub root: DeviceId,
    pub flex: FlexParams,
    pub subtree: SubtreeMode,
    /// Flood carrying DISCO requests.
    pub discovery: ManagerConfig,
    /// Tree process collecting offers and confirming the chosen provider.
    pub confirm: ManagerConfig,
    /// Tree process carrying DATA and DATAEND.
    pub data: ManagerConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            radius: DEFAULT_RADIUS,
            hops: DEFAULT_HOPS,
            timeout_coeff: 1.0,
            stabilize_coeff: 0.5,
            serve_timeout_coeff: 4.0,
            file_size: DEFAULT_FILE_SIZE,
            root: DeviceId(0),
            flex: FlexParams::default(),
            subtree: SubtreeMode::Exact,
            discovery: ManagerConfig::new(TerminationPolicy::Wispp, DEFAULT_SPEED),
            confirm: ManagerConfig::new(TerminationPolicy::Ispp, DEFAULT_SPEED),
            data: ManagerConfig::new(TerminationPolicy::Ispp, DEFAULT_SPEED),
        }
    }
}

impl ProtocolConfig {
    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let config: ProtocolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !(self.period > 0.0 && self.period.is_finite()) {
            return Err(ProtocolError::invalid("period must be positive"));
        }
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(ProtocolError::invalid("radius must be positive"));
        }
        if self.hops == 0 {
            return Err(ProtocolError::invalid("hops must be at least 1"));
        }
        for (name, coeff) in [
            ("timeout_coeff", self.timeout_coeff),
            ("stabilize_coeff", self.stabilize_coeff),
            ("serve_timeout_coeff", self.serve_timeout_coeff),
        ] {
            if !(coeff >= 0.0 && coeff.is_finite()) {
                return Err(ProtocolError::invalid(format!("{name} must be non-negative")));
            }
        }
        if self.stabilize_coeff >= self.timeout_coeff {
            warn!(
                stabilize = self.stabilize_coeff,
                timeout = self.timeout_coeff,
                "requesters may time out before choosing a provider"
            );
        }
        if !(self.flex.epsilon > 0.0 && self.flex.epsilon < 1.0) {
            return Err(ProtocolError::invalid("flex epsilon must be in (0, 1)"));
        }
        if !(self.flex.distortion >= 0.0 && self.flex.distortion.is_finite()) {
            return Err(ProtocolError::invalid("flex distortion must be non-negative"));
        }
        for (name, manager) in [
            ("discovery", self.discovery),
            ("confirm", self.confirm),
            ("data", self.data),
        ] {
            if !(manager.speed >= 0.0 && manager.speed.is_finite()) {
                return Err(ProtocolError::invalid(format!(
                    "{name} speed must be non-negative"
                )));
            }
        }
        self.subtree.validate()
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            period: self.period,
            radius: self.radius,
        }
    }

    /// Rounds corresponding to `coeff` network diameters.
    pub fn rounds(&self, coeff: f64) -> f64 {
        f64::from(self.hops) * coeff
    }

    /// Tree distance past which a device counts as cut off from the root.
    pub fn max_tree_distance(&self) -> f64 {
        f64::from(self.hops) * self.radius
    }
}
