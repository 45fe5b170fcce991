//! Aggregate process protocol layer.
//!
//! Keyed, self-terminating processes that spread across a network of
//! devices evaluated in synchronous rounds, four interchangeable
//! termination policies, a self-stabilising spanning tree for routing, and
//! a service-discovery protocol built on top of them.
//!
//! Every device reads only what its neighbours announced in the previous
//! round; [`network::Network`] provides that substrate for simulations and
//! tests.

pub mod bench;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod neighborhood;
pub mod network;
pub mod process;
pub mod render;
pub mod stats;
pub mod status;
pub mod termination;
pub mod tree;
pub mod types;

pub use bench::{BenchConfig, BenchDevice, BenchExport, BenchMessage, ProcessKind};
pub use config::{ManagerConfig, ProtocolConfig};
pub use device::{Device, DeviceExport};
pub use discovery::{
    Automaton, AutomatonExport, AutomatonState, Phase, ServiceProfile, ServiceRequest, Transition,
};
pub use error::ProtocolError;
pub use neighborhood::{Link, Neighborhood, Peer};
pub use network::{Network, NetworkConfig, Position, Program};
pub use process::{
    Outcome, ProcessKey, ProcessManager, ProcessRecord, ProcessTable, ProcessView, RoundOutput,
    Step,
};
pub use render::{Color, Render, RenderSlot, Shape};
pub use stats::ProcessStats;
pub use status::Status;
pub use termination::{Envelope, TerminationPolicy, TerminationState};
pub use tree::{FlexParams, ParentPointer, SubtreeMode, SubtreeSet, TreeExport};
pub use types::{DeviceId, Message, MessageId, MessageKind, Round, ServiceType};
