//! Error taxonomy for the HSM engine.
//!
//! Only configuration/programming faults are modeled as errors - unhandled
//! messages and sends-after-quit are not failures.
use thiserror::Error;

use crate::state::StateId;

pub type HsmResult<T> = std::result::Result<T, HsmError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HsmError {
    #[error("state {0:?} was already registered")]
    DuplicateState(StateId),

    #[error("parent state {0:?} was never registered")]
    UnknownParent(StateId),

    #[error("state {0:?} is not registered")]
    UnknownState(StateId),

    #[error("registering state {0:?} with parent {1:?} would create a cycle")]
    CycleDetected(StateId, StateId),

    #[error("no initial state was set before start()")]
    NoInitialState,

    #[error("addState/setInitialState/setLogRecSize(grow) called after start()")]
    ConfigurationAfterStart,

    #[error("deferMessage() called outside of process_message()")]
    DeferOutsideProcessMessage,
}
