//! Service discovery over aggregate processes.
//!
//! A requester floods a DISCO message; providers of the requested service
//! answer by starting a confirmation process that runs along the spanning
//! tree back to the requester. The requester picks the best offer, the
//! chosen provider streams DATA chunks and a final DATAEND through a
//! tree-routed data process.

pub mod automaton;
pub mod confirm;
pub mod types;

pub use automaton::{Automaton, AutomatonExport, TreeView};
pub use confirm::{confirm_step, ConfirmInputs, ConfirmSignal};
pub use types::{
    AutomatonState, ConfirmData, Offer, Phase, ServiceProfile, ServiceRequest, Transition,
};
