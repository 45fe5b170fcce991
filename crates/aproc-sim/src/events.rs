use std::io::Write;

use aproc_protocol::{Message, Phase, ProcessStats, Round, Transition};
use serde::Serialize;

use crate::output;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
/// If --output-dir was provided, also appends it to the run log.
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();

        output::append_line(&json);
    }
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub mode: &'static str,
    pub version: &'static str,
    pub devices: usize,
    pub rounds: u64,
    pub seed: u64,
}

impl EventStarted {
    pub fn new(mode: &'static str, devices: usize, rounds: u64, seed: u64) -> Self {
        Self {
            event: "started",
            mode,
            version: env!("CARGO_PKG_VERSION"),
            devices,
            rounds,
            seed,
        }
    }
}

#[derive(Serialize)]
pub struct EventFinished {
    pub event: &'static str,
    pub rounds: Round,
    pub elapsed_ms: u128,
}

// ── Discovery events ────────────────────────────────────────────

#[derive(Serialize)]
pub struct MessageSummary {
    pub kind: String,
    pub from: u32,
    pub to: u32,
    pub time: Round,
    pub service: u32,
}

impl From<&Message> for MessageSummary {
    fn from(m: &Message) -> Self {
        Self {
            kind: format!("{:?}", m.kind()).to_lowercase(),
            from: m.from().get(),
            to: m.to().get(),
            time: m.time(),
            service: m.service().0,
        }
    }
}

#[derive(Serialize)]
pub struct EventTransition {
    pub event: &'static str,
    pub round: Round,
    pub device: u32,
    pub from: &'static str,
    pub to: &'static str,
    pub message: Option<MessageSummary>,
}

impl EventTransition {
    pub fn new(device: u32, t: &Transition) -> Self {
        Self {
            event: "transition",
            round: t.round,
            device,
            from: t.from.as_str(),
            to: t.to.as_str(),
            message: t.message.as_ref().map(MessageSummary::from),
        }
    }
}

/// How many devices sit in each phase after a round.
#[derive(Serialize, Default)]
pub struct EventPhases {
    pub event: &'static str,
    pub round: Round,
    pub idle: usize,
    pub disco: usize,
    pub offer: usize,
    pub served: usize,
    pub serving: usize,
    pub active_processes: usize,
}

impl EventPhases {
    pub fn new(round: Round) -> Self {
        Self {
            event: "phases",
            round,
            ..Self::default()
        }
    }

    pub fn count(&mut self, phase: Phase, active: usize) {
        let slot = match phase {
            Phase::Idle => &mut self.idle,
            Phase::Disco => &mut self.disco,
            Phase::Offer => &mut self.offer,
            Phase::Served => &mut self.served,
            Phase::Serving => &mut self.serving,
        };
        *slot += 1;
        self.active_processes += active;
    }
}

#[derive(Serialize)]
pub struct EventManagerStats {
    pub event: &'static str,
    pub manager: &'static str,
    pub policy: &'static str,
    pub average_delay: Option<f64>,
    pub stats: ProcessStats,
}

impl EventManagerStats {
    pub fn new(manager: &'static str, policy: &'static str, stats: ProcessStats) -> Self {
        Self {
            event: "manager_stats",
            manager,
            policy,
            average_delay: stats.average_delay(),
            stats,
        }
    }
}

#[derive(Serialize)]
pub struct EventRequests {
    pub event: &'static str,
    pub requesters: usize,
    pub satisfied: usize,
    pub sent: u64,
}

// ── Bench events ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventBenchRound {
    pub event: &'static str,
    pub round: Round,
    /// Live instances per `kind/policy`.
    pub active: Vec<(String, usize)>,
}
