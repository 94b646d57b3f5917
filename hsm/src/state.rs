//! An individual state and the capability set the engine drives.
use crate::machine::MachineHandle;
use crate::message::Message;

/// An inexpensive token identifying a state. First valid id is up to the
/// client; the engine never assigns one itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    pub fn new(id: u32) -> Self {
        StateId(id)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a state consumed a message during `process_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
}

impl Handled {
    pub fn is_handled(self) -> bool {
        matches!(self, Handled::Yes)
    }
}

/// The capability set a client-supplied state implements.
///
/// States are assumed immutable from the engine's point of view; interior
/// mutability is the implementer's responsibility. Hook calls are never
/// concurrent with each other (they all run on the owning machine's worker
/// thread), but a state may still be shared across machines, so `Mutex`- or
/// atomic-backed fields are the usual shape rather than `RefCell`, which
/// isn't `Sync`.
pub trait State: Send + Sync {
    /// Display name, or `None` to render as `(null)`.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Called when this state is entered, possibly transiently while
    /// traveling through to a deeper target.
    fn enter(&self, _handle: &MachineHandle) {}

    /// Called when transitioning out of this state.
    fn exit(&self, _handle: &MachineHandle) {}

    /// Handle a message. Return `Handled::No` to let the parent state try.
    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        Handled::No
    }
}

pub(crate) struct StateEntry {
    pub(crate) state: Box<dyn State>,
    pub(crate) parent: Option<StateId>,
    /// self, parent, grandparent, ..., root. Filled in at `start`.
    pub(crate) ancestors: Vec<StateId>,
}
