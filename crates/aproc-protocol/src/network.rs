//! Synchronous round substrate.
//!
//! Places programs in a square, links every pair within the communication
//! radius and runs them in lock-step: during round `n` each program reads
//! only the exports its neighbours produced in round `n - 1`. Link distances
//! may carry multiplicative noise and devices may random-walk; both draw
//! from a seeded generator so runs are reproducible.

use std::collections::BTreeMap;

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::neighborhood::{Link, Neighborhood, Peer};
use crate::types::{DeviceId, Round};

/// Local logic of one device.
pub trait Program {
    /// What the device announces to its neighbours each round.
    type Export;

    fn id(&self) -> DeviceId;

    fn round(&mut self, now: Round, nbrs: &Neighborhood<'_, Self::Export>) -> Self::Export;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub radius: f64,
    pub period: f64,
    /// Side of the square devices walk in.
    pub side: f64,
    /// Distance travelled per period; zero keeps devices still.
    pub movement_speed: f64,
    /// Relative error on measured link distances, in `[0, 1)`.
    pub distance_noise: f64,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            radius: crate::config::DEFAULT_RADIUS,
            period: crate::config::DEFAULT_PERIOD,
            side: 500.0,
            movement_speed: 0.0,
            distance_noise: 0.0,
            seed: 0,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(ProtocolError::invalid("network radius must be positive"));
        }
        if !(self.period > 0.0 && self.period.is_finite()) {
            return Err(ProtocolError::invalid("network period must be positive"));
        }
        if !(self.side > 0.0 && self.side.is_finite()) {
            return Err(ProtocolError::invalid("network side must be positive"));
        }
        if !(self.movement_speed >= 0.0 && self.movement_speed.is_finite()) {
            return Err(ProtocolError::invalid("movement speed must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.distance_noise) {
            return Err(ProtocolError::invalid("distance noise must be in [0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// The `index`-th of `count` points evenly spread on a circle.
    pub fn on_circle(center: Position, radius: f64, index: usize, count: usize) -> Self {
        let angle = std::f64::consts::TAU * index as f64 / count.max(1) as f64;
        Self::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
    }

    /// Cell `index` of a row-major grid with `columns` columns.
    pub fn on_grid(index: usize, columns: usize, spacing: f64) -> Self {
        let columns = columns.max(1);
        Self::new(
            (index % columns) as f64 * spacing,
            (index / columns) as f64 * spacing,
        )
    }
}

struct Slot<P: Program> {
    program: P,
    position: Position,
    target: Option<Position>,
    export: Option<P::Export>,
}

pub struct Network<P: Program> {
    config: NetworkConfig,
    slots: BTreeMap<DeviceId, Slot<P>>,
    now: Round,
    rng: StdRng,
}

impl<P: Program> Network<P> {
    pub fn new(config: NetworkConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            config,
            slots: BTreeMap::new(),
            now: 0,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Last round run; zero before the first.
    pub fn now(&self) -> Round {
        self.now
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn add(&mut self, program: P, position: Position) -> Result<(), ProtocolError> {
        let id = program.id();
        if self.slots.contains_key(&id) {
            return Err(ProtocolError::DuplicateDevice { id: id.get() });
        }
        debug!(device = %id, x = position.x, y = position.y, "device added");
        self.slots.insert(
            id,
            Slot {
                program,
                position,
                target: None,
                export: None,
            },
        );
        Ok(())
    }

    /// Take a device out of the network. Its last export disappears with it.
    pub fn remove(&mut self, id: DeviceId) -> Result<P, ProtocolError> {
        let slot = self
            .slots
            .remove(&id)
            .ok_or(ProtocolError::UnknownDevice { id: id.get() })?;
        debug!(device = %id, "device removed");
        Ok(slot.program)
    }

    pub fn set_position(&mut self, id: DeviceId, position: Position) -> Result<(), ProtocolError> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or(ProtocolError::UnknownDevice { id: id.get() })?;
        slot.position = position;
        slot.target = None;
        Ok(())
    }

    pub fn position(&self, id: DeviceId) -> Option<Position> {
        self.slots.get(&id).map(|s| s.position)
    }

    pub fn program(&self, id: DeviceId) -> Option<&P> {
        self.slots.get(&id).map(|s| &s.program)
    }

    pub fn programs(&self) -> impl Iterator<Item = &P> {
        self.slots.values().map(|s| &s.program)
    }

    /// What `id` announced in the last round.
    pub fn export(&self, id: DeviceId) -> Option<&P::Export> {
        self.slots.get(&id).and_then(|s| s.export.as_ref())
    }

    /// Devices within radius of `id`, by id.
    pub fn neighbours(&self, id: DeviceId) -> Vec<DeviceId> {
        let Some(me) = self.slots.get(&id) else {
            return Vec::new();
        };
        self.slots
            .iter()
            .filter(|(other, s)| **other != id && me.position.distance(&s.position) <= self.config.radius)
            .map(|(other, _)| *other)
            .collect()
    }

    /// Run one round on every device.
    pub fn round(&mut self) {
        self.now += 1;
        let now = self.now;
        self.walk();
        let links = self.measure_links();

        let previous: BTreeMap<DeviceId, P::Export> = self
            .slots
            .iter_mut()
            .filter_map(|(id, s)| s.export.take().map(|e| (*id, e)))
            .collect();

        let own_link = Link::own(self.config.period);
        for (id, slot) in self.slots.iter_mut() {
            let peers = links
                .get(id)
                .into_iter()
                .flatten()
                .filter_map(|(other, link)| {
                    previous.get(other).map(|value| Peer {
                        id: *other,
                        link: *link,
                        value,
                    })
                })
                .collect();
            let nbrs = Neighborhood::new(*id, own_link, previous.get(id), peers);
            slot.export = Some(slot.program.round(now, &nbrs));
        }
        trace!(round = now, devices = self.slots.len(), "round complete");
    }

    pub fn run(&mut self, rounds: u64) {
        for _ in 0..rounds {
            self.round();
        }
    }

    /// Run until `done` holds after a round, at most `limit` rounds.
    /// Returns whether `done` was reached.
    pub fn run_until(&mut self, limit: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..limit {
            self.round();
            if done(self) {
                return true;
            }
        }
        false
    }

    fn walk(&mut self) {
        let step = self.config.movement_speed * self.config.period;
        if step <= 0.0 {
            return;
        }
        let side = self.config.side;
        for slot in self.slots.values_mut() {
            let target = *slot.target.get_or_insert_with(|| {
                Position::new(self.rng.random_range(0.0..=side), self.rng.random_range(0.0..=side))
            });
            let remaining = slot.position.distance(&target);
            if remaining <= step {
                slot.position = target;
                slot.target = None;
            } else {
                let f = step / remaining;
                slot.position.x += (target.x - slot.position.x) * f;
                slot.position.y += (target.y - slot.position.y) * f;
            }
        }
    }

    fn measure_links(&mut self) -> BTreeMap<DeviceId, Vec<(DeviceId, Link)>> {
        let radius = self.config.radius;
        let noise = self.config.distance_noise;
        let lag = self.config.period;
        let positions: Vec<(DeviceId, Position)> =
            self.slots.iter().map(|(id, s)| (*id, s.position)).collect();

        let mut links: BTreeMap<DeviceId, Vec<(DeviceId, Link)>> = BTreeMap::new();
        for (id, here) in &positions {
            for (other, there) in &positions {
                if id == other {
                    continue;
                }
                let d = here.distance(there);
                if d > radius {
                    continue;
                }
                let factor = if noise > 0.0 {
                    1.0 + self.rng.random_range(-noise..=noise)
                } else {
                    1.0
                };
                links
                    .entry(*id)
                    .or_default()
                    .push((*other, Link::new(d * factor, lag)));
            }
        }
        links
    }
}
