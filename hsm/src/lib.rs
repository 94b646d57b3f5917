//! A hierarchical state machine runtime: a tree of nested states driven by a
//! serialized stream of messages on a single worker thread per machine.

pub mod builder;
pub mod errors;
pub mod log_ring;
pub mod machine;
pub mod message;
mod queue;
pub mod state;
mod tree;
mod worker;

pub use builder::MachineBuilder;
pub use errors::{HsmError, HsmResult};
pub use log_ring::LogRec;
pub use machine::{Machine, MachineHandle, MachineHooks};
pub use message::{CurrentMessage, EventTag, Message};
pub use state::{Handled, State, StateId};
pub use worker::SharedWorker;
