//! Side-by-side comparison of the termination policies.
//!
//! A [`BenchDevice`] runs the same point-to-point message through two kinds
//! of process under every policy at once: a flood that spreads everywhere
//! and ends at the destination, and a tree-routed process that only runs
//! on the spanning-tree path between sender and destination. Each
//! (kind, policy) pair keeps its own statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ProtocolConfig, DEFAULT_SPEED};
use crate::error::ProtocolError;
use crate::neighborhood::Neighborhood;
use crate::network::Program;
use crate::process::{ProcessManager, ProcessTable, Step};
use crate::render::{Color, Render, Shape};
use crate::stats::ProcessStats;
use crate::status::Status;
use crate::termination::TerminationPolicy;
use crate::tree::{named_as_parent, route_status, tree_round, ParentPointer, SubtreeSet, TreeExport};
use crate::types::{DeviceId, Message, Round};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Spreads to every reachable device.
    Flood,
    /// Runs on the tree path between sender and destination.
    Tree,
}

impl ProcessKind {
    pub const ALL: [ProcessKind; 2] = [ProcessKind::Flood, ProcessKind::Tree];

    pub fn name(self) -> &'static str {
        match self {
            ProcessKind::Flood => "flood",
            ProcessKind::Tree => "tree",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message a device sends during the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchMessage {
    pub from: DeviceId,
    pub to: DeviceId,
    /// Sent in the first round after this one.
    pub at: Round,
    /// Also picks the render hue.
    #[serde(default)]
    pub payload: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub messages: Vec<BenchMessage>,
    pub flood_speed: f64,
    pub tree_speed: f64,
    /// Policy whose processes colour the device.
    pub rendered: TerminationPolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            flood_speed: DEFAULT_SPEED,
            tree_speed: DEFAULT_SPEED,
            rendered: TerminationPolicy::Wispp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchExport {
    pub tree: TreeExport,
    pub floods: BTreeMap<TerminationPolicy, ProcessTable<Message, ()>>,
    pub trees: BTreeMap<TerminationPolicy, ProcessTable<Message, DeviceId>>,
}

pub struct BenchDevice {
    id: DeviceId,
    protocol: ProtocolConfig,
    outbox: Vec<(BenchMessage, bool)>,
    rendered: TerminationPolicy,
    tree: TreeExport,
    floods: BTreeMap<TerminationPolicy, ProcessManager<Message, ()>>,
    trees: BTreeMap<TerminationPolicy, ProcessManager<Message, DeviceId>>,
    render: Render,
}

impl BenchDevice {
    pub fn new(
        id: DeviceId,
        protocol: ProtocolConfig,
        bench: &BenchConfig,
    ) -> Result<Self, ProtocolError> {
        protocol.validate()?;
        let envelope = protocol.envelope();
        let floods = TerminationPolicy::ALL
            .into_iter()
            .map(|p| (p, ProcessManager::new(p, bench.flood_speed, envelope)))
            .collect();
        let trees = TerminationPolicy::ALL
            .into_iter()
            .map(|p| {
                let manager = ProcessManager::new(p, bench.tree_speed, envelope)
                    .with_variable_overhead(std::mem::size_of::<DeviceId>());
                (p, manager)
            })
            .collect();
        let outbox = bench
            .messages
            .iter()
            .filter(|m| m.from == id)
            .map(|m| (*m, false))
            .collect();
        let pointer = if id == protocol.root {
            ParentPointer::root(id)
        } else {
            ParentPointer::detached(id)
        };
        Ok(Self {
            id,
            tree: TreeExport {
                pointer,
                subtree: SubtreeSet::singleton(id, protocol.subtree)?,
            },
            protocol,
            outbox,
            rendered: bench.rendered,
            floods,
            trees,
            render: Render::default(),
        })
    }

    pub fn stats(&self, kind: ProcessKind, policy: TerminationPolicy) -> Option<&ProcessStats> {
        match kind {
            ProcessKind::Flood => self.floods.get(&policy).map(|m| m.stats()),
            ProcessKind::Tree => self.trees.get(&policy).map(|m| m.stats()),
        }
    }

    /// Instances of `kind` under `policy` alive here after the last round.
    pub fn active(&self, kind: ProcessKind, policy: TerminationPolicy) -> usize {
        match kind {
            ProcessKind::Flood => self.floods.get(&policy).map_or(0, |m| m.active()),
            ProcessKind::Tree => self.trees.get(&policy).map_or(0, |m| m.active()),
        }
    }

    pub fn active_total(&self) -> usize {
        self.floods.values().map(|m| m.active()).sum::<usize>()
            + self.trees.values().map(|m| m.active()).sum::<usize>()
    }

    pub fn tree(&self) -> &TreeExport {
        &self.tree
    }

    pub fn render(&self) -> &Render {
        &self.render
    }

    fn due(&mut self, now: Round) -> Option<Message> {
        let (m, sent) = self.outbox.iter_mut().find(|(m, sent)| !*sent && now > m.at)?;
        *sent = true;
        debug!(device = %self.id, to = %m.to, round = now, "bench message sent");
        Some(Message::new(m.from, m.to, now, m.payload))
    }

    fn paint(&mut self) {
        let tokens = self
            .floods
            .get(&self.rendered)
            .map(|m| m.tokens())
            .unwrap_or_default();
        let slot = |i: usize, fallback: Color| tokens.get(i).copied().unwrap_or(fallback);
        self.render = Render {
            node: slot(0, Color::WHITE),
            left: slot(1, Color::BLACK),
            right: slot(2, Color::BLACK),
            shape: if self.id == self.protocol.root {
                Shape::Cube
            } else {
                Shape::Sphere
            },
            size: if tokens.is_empty() { 10.0 } else { 15.0 },
        };
    }
}

impl Program for BenchDevice {
    type Export = BenchExport;

    fn id(&self) -> DeviceId {
        self.id
    }

    fn round(&mut self, now: Round, nbrs: &Neighborhood<'_, BenchExport>) -> BenchExport {
        let me = self.id;
        match tree_round(
            me == self.protocol.root,
            self.protocol.radius,
            self.protocol.max_tree_distance(),
            &self.protocol.flex,
            self.protocol.subtree,
            &nbrs.map(|e| &e.tree),
        ) {
            Ok(tree) => self.tree = tree,
            Err(err) => warn!(device = %me, %err, "tree round failed"),
        }
        let message = self.due(now);

        let mut floods = BTreeMap::new();
        for (policy, manager) in self.floods.iter_mut() {
            let hood = nbrs.filter_map(|e| e.floods.get(policy));
            let out = manager.run(now, &hood, message, |m, view| {
                let status = if m.to() == me {
                    Status::TerminatedOutput
                } else {
                    Status::Internal
                };
                Step::new(view.now, status, ())
            });
            floods.insert(*policy, out.table);
        }

        let parent = self.tree.pointer.parent;
        let subtree = &self.tree.subtree;
        let mut trees = BTreeMap::new();
        for (policy, manager) in self.trees.iter_mut() {
            manager.set_base_overhead(subtree.encoded_len());
            let hood = nbrs.filter_map(|e| e.trees.get(policy));
            let out = manager.run(now, &hood, message, |m, view| {
                Step::new(view.now, route_status(me, m, named_as_parent(view), subtree), parent)
            });
            trees.insert(*policy, out.table);
        }

        self.paint();
        BenchExport {
            tree: self.tree.clone(),
            floods,
            trees,
        }
    }
}
