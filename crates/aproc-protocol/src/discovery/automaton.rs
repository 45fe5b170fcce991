//! Service-discovery automaton.
//!
//! One per device. Each round it decides which messages to inject, runs the
//! three process managers over them (request flood, offer confirmation,
//! data transfer) and moves between phases based on what they report.
//!
//! ```text
//! IDLE ──request──▶ DISCO ──chose provider──▶ SERVED ──DATAEND──▶ IDLE
//!   │                 └──────timeout──────────────────────────────▶ IDLE
//!   └──flood reply──▶ OFFER ──chosen──▶ SERVING ──DATAEND sent──▶ IDLE
//!                       └──terminated by others / timeout─────────▶ IDLE
//! ```

use aproc_metrics::Counter;
use tracing::debug;

use crate::config::ProtocolConfig;
use crate::discovery::confirm::{confirm_step, ConfirmInputs, ConfirmSignal};
use crate::discovery::types::{
    AutomatonState, ConfirmData, Phase, ServiceProfile, ServiceRequest, Transition,
};
use crate::neighborhood::Neighborhood;
use crate::process::{ProcessManager, ProcessTable, Step};
use crate::render::{Color, RenderSlot};
use crate::stats::ProcessStats;
use crate::status::Status;
use crate::tree::{named_as_parent, route_status, SubtreeSet};
use crate::types::{DeviceId, Message, MessageKind, Round, ServiceType};

/// Process tables the automaton announces each round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomatonExport {
    pub discovery: ProcessTable<Message, ()>,
    pub confirm: ProcessTable<DeviceId, ConfirmData>,
    pub data: ProcessTable<Message, DeviceId>,
}

/// This round's spanning-tree facts.
#[derive(Debug, Clone, Copy)]
pub struct TreeView<'a> {
    pub parent: DeviceId,
    pub subtree: &'a SubtreeSet,
}

#[derive(Debug, Clone)]
struct RequestSlot {
    request: ServiceRequest,
    attempts: u32,
    satisfied: bool,
}

pub struct Automaton {
    id: DeviceId,
    config: ProtocolConfig,
    offered: Option<ServiceType>,
    rank: f64,
    requests: Vec<RequestSlot>,
    active_request: Option<usize>,
    state: AutomatonState,
    /// Round the current phase was entered.
    entered: Round,
    chunks_sent: u32,
    discovery: ProcessManager<Message, ()>,
    confirm: ProcessManager<DeviceId, ConfirmData>,
    data: ProcessManager<Message, DeviceId>,
    transitions: Vec<Transition>,
    sent: Counter,
}

impl Automaton {
    pub fn new(id: DeviceId, config: ProtocolConfig, profile: ServiceProfile) -> Self {
        let envelope = config.envelope();
        let discovery =
            ProcessManager::new(config.discovery.policy, config.discovery.speed, envelope)
                .with_render_slot(RenderSlot::Left);
        let confirm = ProcessManager::new(config.confirm.policy, config.confirm.speed, envelope)
            .with_variable_overhead(std::mem::size_of::<ConfirmData>());
        let data = ProcessManager::new(config.data.policy, config.data.speed, envelope)
            .with_variable_overhead(std::mem::size_of::<DeviceId>())
            .with_render_slot(RenderSlot::Right);
        let requests = profile
            .requests
            .iter()
            .map(|r| RequestSlot {
                request: *r,
                attempts: 0,
                satisfied: false,
            })
            .collect();
        Self {
            id,
            config,
            offered: profile.offered,
            rank: profile.rank,
            requests,
            active_request: None,
            state: AutomatonState::default(),
            entered: 0,
            chunks_sent: 0,
            discovery,
            confirm,
            data,
            transitions: Vec::new(),
            sent: Counter::new(),
        }
    }

    pub fn state(&self) -> AutomatonState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Phase changes of the last round.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// DISCO messages this device created.
    pub fn sent_count(&self) -> u64 {
        self.sent.get()
    }

    /// Requests that ended with a delivered DATAEND.
    pub fn satisfied_requests(&self) -> usize {
        self.requests.iter().filter(|r| r.satisfied).count()
    }

    pub fn is_requester(&self) -> bool {
        !self.requests.is_empty()
    }

    pub fn discovery_stats(&self) -> &ProcessStats {
        self.discovery.stats()
    }

    pub fn confirm_stats(&self) -> &ProcessStats {
        self.confirm.stats()
    }

    pub fn data_stats(&self) -> &ProcessStats {
        self.data.stats()
    }

    pub fn managers(&self) -> [(Option<RenderSlot>, &[Color]); 3] {
        [
            (self.discovery.render_slot(), self.discovery.tokens()),
            (self.confirm.render_slot(), self.confirm.tokens()),
            (self.data.render_slot(), self.data.tokens()),
        ]
    }

    /// Process instances alive here after the last round.
    pub fn active_processes(&self) -> usize {
        self.discovery.active() + self.confirm.active() + self.data.active()
    }

    pub fn round(
        &mut self,
        now: Round,
        tree: TreeView<'_>,
        nbrs: &Neighborhood<'_, AutomatonExport>,
    ) -> AutomatonExport {
        self.transitions.clear();
        let me = self.id;
        let phase = self.state.phase;

        // ── Inject ──────────────────────────────────────────────────
        let mut request = None;
        let mut confirm_key = None;
        let mut chunk = None;
        match phase {
            Phase::Idle => request = self.next_request(now),
            Phase::Offer => {
                if let Some(disco) = self
                    .state
                    .message
                    .filter(|m| m.kind() == MessageKind::Disco)
                {
                    let offer = disco.answer(me, MessageKind::Offer);
                    confirm_key = Some(offer.to());
                    self.state.message = Some(offer);
                }
            }
            Phase::Serving => chunk = self.next_chunk(now),
            Phase::Disco | Phase::Served => {}
        }

        // ── Request flood ───────────────────────────────────────────
        let offered = self.offered;
        let flood = self
            .discovery
            .run(now, &nbrs.map(|e| &e.discovery), request, |m, view| {
                let answers = m.from() != me && Some(m.service()) == offered;
                let status = if answers {
                    Status::InternalOutput
                } else {
                    Status::Internal
                };
                Step::new(view.now, status, ())
            });

        // ── Offer confirmation ──────────────────────────────────────
        let inputs = ConfirmInputs {
            phase: self.state.phase,
            message: self.state.message,
            rank: self.rank,
            tree_parent: tree.parent,
            subtree: tree.subtree,
            stabilize_after: self.config.rounds(self.config.stabilize_coeff),
        };
        let mut signals = Vec::new();
        let confirm = self
            .confirm
            .run(now, &nbrs.map(|e| &e.confirm), confirm_key, |k, view| {
                let (step, signal) = confirm_step(*k, view, &inputs);
                signals.extend(signal);
                step
            });

        // ── Data transfer ───────────────────────────────────────────
        self.data.set_base_overhead(tree.subtree.encoded_len());
        let data = self
            .data
            .run(now, &nbrs.map(|e| &e.data), chunk, |m, view| {
                let status = route_status(me, m, named_as_parent(view), tree.subtree);
                Step::new(view.now, status, tree.parent)
            });

        // ── Transitions ─────────────────────────────────────────────
        match phase {
            Phase::Idle => {
                let reply = flood
                    .outputs()
                    .map(|(m, _)| *m)
                    .find(|m| self.discovery.delivered_at(m) == Some(now));
                // Answering wins; a request created this round is retried later.
                if let Some(m) = reply {
                    if let Some(slot) = request.and(self.active_request.take()) {
                        let slot = &mut self.requests[slot];
                        slot.attempts = slot.attempts.saturating_sub(1);
                        debug!(device = %me, service = %slot.request.service, "request deferred by offer");
                    }
                    self.enter(now, Phase::Offer, Some(m));
                } else if let Some(m) = request {
                    self.enter(now, Phase::Disco, Some(m));
                }
            }
            Phase::Disco => {
                let chose = signals.iter().find_map(|s| match s {
                    ConfirmSignal::Chose(p) => Some(*p),
                    ConfirmSignal::Chosen => None,
                });
                if let Some(provider) = chose {
                    debug!(device = %me, %provider, "provider chosen");
                    self.enter(now, Phase::Served, self.state.message);
                } else if self.timed_out(now, self.config.timeout_coeff) {
                    debug!(device = %me, "no offer in time");
                    self.active_request = None;
                    self.enter(now, Phase::Idle, None);
                }
            }
            Phase::Offer => {
                let requester = self.state.message.map(|m| m.to());
                let abandoned = requester
                    .and_then(|r| confirm.results.get(&r))
                    .is_some_and(|o| o.proposed == Status::Internal && o.status != Status::Internal);
                if signals.contains(&ConfirmSignal::Chosen) {
                    self.chunks_sent = 0;
                    self.enter(now, Phase::Serving, self.state.message);
                } else if abandoned || self.timed_out(now, self.config.timeout_coeff) {
                    self.enter(now, Phase::Idle, None);
                }
            }
            Phase::Serving => {
                if chunk.is_some_and(|c| c.kind() == MessageKind::DataEnd) {
                    self.enter(now, Phase::Idle, None);
                }
            }
            Phase::Served => {
                let done = data
                    .outputs()
                    .any(|(m, _)| m.to() == me && m.kind() == MessageKind::DataEnd);
                if done {
                    if let Some(slot) = self.active_request.take() {
                        self.requests[slot].satisfied = true;
                    }
                    self.enter(now, Phase::Idle, None);
                } else if self.timed_out(now, self.config.serve_timeout_coeff) {
                    self.active_request = None;
                    self.enter(now, Phase::Idle, None);
                }
            }
        }

        AutomatonExport {
            discovery: flood.table,
            confirm: confirm.table,
            data: data.table,
        }
    }

    fn enter(&mut self, now: Round, phase: Phase, message: Option<Message>) {
        let from = self.state.phase;
        debug!(device = %self.id, round = now, %from, to = %phase, "phase change");
        self.transitions.push(Transition {
            round: now,
            from,
            to: phase,
            message,
        });
        self.state = AutomatonState { phase, message };
        self.entered = now;
    }

    fn timed_out(&self, now: Round, coeff: f64) -> bool {
        (now - self.entered) as f64 > self.config.rounds(coeff)
    }

    /// Next DISCO to send, if a request is due and has attempts left.
    fn next_request(&mut self, now: Round) -> Option<Message> {
        let (index, slot) = self.requests.iter_mut().enumerate().find(|(_, s)| {
            !s.satisfied && s.attempts <= s.request.retries && now > s.request.at
        })?;
        slot.attempts += 1;
        self.sent.inc();
        self.active_request = Some(index);
        let service = slot.request.service;
        debug!(device = %self.id, %service, attempt = slot.attempts, "requesting service");
        let hue = f64::from(service.0 % 100) / 100.0;
        Some(
            Message::new(self.id, self.id, now, hue)
                .with_kind(MessageKind::Disco)
                .with_service(service),
        )
    }

    /// Next DATA chunk, or DATAEND once the file is out.
    fn next_chunk(&mut self, now: Round) -> Option<Message> {
        let offer = self.state.message?;
        let size = self.config.file_size;
        let kind = if self.chunks_sent < size {
            MessageKind::Data
        } else {
            MessageKind::DataEnd
        };
        let payload = f64::from(self.chunks_sent) / f64::from(size.max(1));
        self.chunks_sent += 1;
        Some(
            Message::new(self.id, offer.to(), now, payload)
                .with_kind(kind)
                .with_service(offer.service()),
        )
    }
}
