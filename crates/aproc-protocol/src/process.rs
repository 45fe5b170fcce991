//! Keyed, self-terminating processes.
//!
//! Pure state machine over rounds: the caller hands in the previous-round
//! process tables of this device and its neighbours plus the keys that are
//! locally active, and gets back the status of every process run here this
//! round together with the table to announce next.
//!
//! A key runs on a device when it is locally active, when a neighbour
//! recruits it, or when the device itself recruited it last round. Every
//! candidate runs exactly once per round. The step function's proposed
//! status goes through the manager's termination policy; only surviving
//! instances are announced and keep local memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::trace;

use crate::neighborhood::Neighborhood;
use crate::render::{Color, RenderSlot};
use crate::stats::ProcessStats;
use crate::status::Status;
use crate::termination::{Envelope, TerminationInput, TerminationPolicy, TerminationState};
use crate::types::{DeviceId, Message, Round};

/// Something that can name a process.
pub trait ProcessKey: Ord + Clone + fmt::Debug {
    /// Device whose position anchors the termination estimates.
    fn origin(&self) -> DeviceId;

    /// Round the process was started, for delivery latency.
    fn created_at(&self) -> Option<Round> {
        None
    }

    /// Hue of the process's render token, in degrees.
    fn hue(&self) -> f64 {
        0.0
    }
}

impl ProcessKey for Message {
    fn origin(&self) -> DeviceId {
        self.from()
    }

    fn created_at(&self) -> Option<Round> {
        Some(self.time())
    }

    fn hue(&self) -> f64 {
        self.payload().fract().abs() * 360.0
    }
}

impl ProcessKey for DeviceId {
    fn origin(&self) -> DeviceId {
        *self
    }

    fn hue(&self) -> f64 {
        f64::from(self.get() % 360)
    }
}

/// What a device announces about one process it is running.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord<E> {
    pub status: Status,
    pub termination: TerminationState,
    pub data: E,
}

/// All processes a device announces, by key.
pub type ProcessTable<K, E> = BTreeMap<K, ProcessRecord<E>>;

/// Process-aligned view handed to a step function.
#[derive(Debug)]
pub struct ProcessView<'a, E> {
    pub now: Round,
    /// Rounds this instance already ran here; zero when fresh.
    pub age: u32,
    /// Previous records of this key at this device and at neighbours running it.
    pub nbrs: Neighborhood<'a, ProcessRecord<E>>,
}

impl<'a, E> ProcessView<'a, E> {
    pub fn self_id(&self) -> DeviceId {
        self.nbrs.self_id()
    }

    pub fn own(&self) -> Option<&'a ProcessRecord<E>> {
        self.nbrs.own()
    }

    pub fn is_fresh(&self) -> bool {
        self.age == 0
    }
}

/// What a step function proposes for one process this round.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<E> {
    pub time: Round,
    pub status: Status,
    pub data: E,
}

impl<E> Step<E> {
    pub fn new(time: Round, status: Status, data: E) -> Self {
        Self { time, status, data }
    }
}

/// Result of one process on this device this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub time: Round,
    /// Status returned by the step function.
    pub proposed: Status,
    /// Status after the termination policy.
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct RoundOutput<K, E> {
    /// Every process run this round.
    pub results: BTreeMap<K, Outcome>,
    /// What to announce to neighbours.
    pub table: ProcessTable<K, E>,
}

impl<K, E> RoundOutput<K, E> {
    /// Processes reporting a result this round.
    pub fn outputs(&self) -> impl Iterator<Item = (&K, &Outcome)> {
        self.results.iter().filter(|(_, o)| o.status.is_output())
    }
}

pub struct ProcessManager<K, E> {
    policy: TerminationPolicy,
    speed: f64,
    envelope: Envelope,
    base_overhead: usize,
    variable_overhead: usize,
    render_slot: Option<RenderSlot>,
    /// Rounds run so far by each surviving instance.
    ages: BTreeMap<K, u32>,
    /// First-delivery round of every key output here.
    delivered: BTreeMap<K, Round>,
    tokens: Vec<Color>,
    stats: ProcessStats,
    _data: std::marker::PhantomData<fn() -> E>,
}

impl<K: ProcessKey, E> ProcessManager<K, E> {
    pub fn new(policy: TerminationPolicy, speed: f64, envelope: Envelope) -> Self {
        Self {
            policy,
            speed,
            envelope,
            base_overhead: 0,
            variable_overhead: 0,
            render_slot: None,
            ages: BTreeMap::new(),
            delivered: BTreeMap::new(),
            tokens: Vec::new(),
            stats: ProcessStats::new(),
            _data: std::marker::PhantomData,
        }
    }

    /// Extra bytes per process on top of the message and status.
    pub fn with_variable_overhead(mut self, bytes: usize) -> Self {
        self.variable_overhead = bytes;
        self
    }

    pub fn with_render_slot(mut self, slot: RenderSlot) -> Self {
        self.render_slot = Some(slot);
        self
    }

    /// Bytes announced every round regardless of how many processes run.
    pub fn set_base_overhead(&mut self, bytes: usize) {
        self.base_overhead = bytes;
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    pub fn render_slot(&self) -> Option<RenderSlot> {
        self.render_slot
    }

    /// Render tokens of the processes run in the last round.
    pub fn tokens(&self) -> &[Color] {
        &self.tokens
    }

    /// Instances that survived the last round here.
    pub fn active(&self) -> usize {
        self.ages.len()
    }

    pub fn delivered_at(&self, key: &K) -> Option<Round> {
        self.delivered.get(key).copied()
    }

    /// Size estimate of one round's announcement with `active` processes.
    pub fn message_size(&self, active: usize) -> usize {
        let per_process = std::mem::size_of::<Message>()
            + std::mem::size_of::<Status>()
            + self.policy.overhead_bytes()
            + self.variable_overhead;
        active * per_process + self.base_overhead
    }

    /// Run one round.
    pub fn run<I, F>(
        &mut self,
        now: Round,
        nbrs: &Neighborhood<'_, ProcessTable<K, E>>,
        keys: I,
        mut step: F,
    ) -> RoundOutput<K, E>
    where
        I: IntoIterator<Item = K>,
        F: FnMut(&K, &ProcessView<'_, E>) -> Step<E>,
    {
        let mut candidates: BTreeSet<K> = keys.into_iter().collect();
        for table in nbrs.own().into_iter().chain(nbrs.peers().iter().map(|p| p.value)) {
            candidates.extend(
                table
                    .iter()
                    .filter(|(_, r)| r.status.recruits())
                    .map(|(k, _)| k.clone()),
            );
        }

        let mut results = BTreeMap::new();
        let mut table = BTreeMap::new();
        let mut ages = BTreeMap::new();
        self.tokens.clear();

        for key in candidates {
            let age = self.ages.get(&key).copied().unwrap_or(0);
            let view = ProcessView {
                now,
                age,
                nbrs: nbrs.filter_map(|t| t.get(&key)),
            };
            let proposed = step(&key, &view);

            let input = TerminationInput {
                self_id: view.self_id(),
                origin: key.origin(),
                first_round: view.is_fresh(),
                own: view.own().map(|r| &r.termination),
                own_link: view.nbrs.own_link(),
                peers: view
                    .nbrs
                    .peers()
                    .iter()
                    .map(|p| (p.link, &p.value.termination))
                    .collect(),
            };
            let (status, termination) =
                self.policy
                    .apply(proposed.status, self.speed, &input, self.envelope);

            self.tokens.push(Color::for_process(key.hue(), status));
            if status.is_output() {
                self.record_delivery(&key, proposed.time);
            }

            if status.survives() {
                if age == 0 {
                    trace!(key = ?key, ?status, "process joined");
                }
                ages.insert(key.clone(), age + 1);
                table.insert(
                    key.clone(),
                    ProcessRecord {
                        status,
                        termination,
                        data: proposed.data,
                    },
                );
            } else if age > 0 {
                trace!(key = ?key, "process left");
            }

            results.insert(
                key,
                Outcome {
                    time: proposed.time,
                    proposed: proposed.status,
                    status,
                },
            );
        }

        self.ages = ages;
        self.stats
            .record_round(results.len(), self.message_size(results.len()));
        RoundOutput { results, table }
    }

    fn record_delivery(&mut self, key: &K, time: Round) {
        if self.delivered.contains_key(key) {
            self.stats.record_repeat();
            return;
        }
        let latency = key.created_at().map(|t| time.saturating_sub(t));
        self.stats.record_first_delivery(latency);
        self.delivered.insert(key.clone(), time);
    }
}
