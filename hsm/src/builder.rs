//! Pre-start configuration surface: a consuming, chainable builder that the
//! type system retires once `start`/`start_on` hands back a running
//! `Machine`, so "configuration after start" is a compile error rather than
//! a runtime fault to detect.
use crate::errors::HsmResult;
use crate::log_ring::DEFAULT_CAPACITY;
use crate::machine::{self, Machine, MachineHooks};
use crate::state::{State, StateId};
use crate::tree::Tree;
use crate::worker::SharedWorker;

pub struct MachineBuilder {
    name: String,
    tree: Tree,
    log_capacity: usize,
    dbg: bool,
    hooks: Box<dyn MachineHooks>,
}

impl MachineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        MachineBuilder {
            name: name.into(),
            tree: Tree::new(),
            log_capacity: DEFAULT_CAPACITY,
            dbg: false,
            hooks: machine::default_hooks(),
        }
    }

    /// Register a state under `parent` (`None` for a root). Rejects
    /// duplicate ids and unknown parents.
    pub fn add_state(
        mut self,
        id: StateId,
        parent: Option<StateId>,
        state: Box<dyn State>,
    ) -> HsmResult<Self> {
        self.tree.add_state(id, parent, state)?;
        Ok(self)
    }

    pub fn set_initial_state(mut self, id: StateId) -> HsmResult<Self> {
        self.tree.set_initial_state(id)?;
        Ok(self)
    }

    /// Bounds the log ring. Also available on a running `Machine`.
    pub fn set_log_rec_size(mut self, n: usize) -> Self {
        self.log_capacity = n;
        self
    }

    /// Controls synthetic enter/exit/onQuitting log records. Also available
    /// on a running `Machine`.
    pub fn set_dbg(mut self, dbg: bool) -> Self {
        self.dbg = dbg;
        self
    }

    pub fn set_hooks(mut self, hooks: Box<dyn MachineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Finalize the state tree, run the initial entry chain, and begin
    /// dispatching on a dedicated worker thread.
    pub fn start(mut self) -> HsmResult<Machine> {
        self.tree.finalize()?;
        let machine = Machine::new(self.name, self.tree, self.log_capacity, self.dbg, self.hooks);
        Ok(machine.spawn_dedicated())
    }

    /// Same as `start`, but the dispatch loop is driven by `worker`'s
    /// shared thread alongside any other machine registered to it.
    pub fn start_on(mut self, worker: &SharedWorker) -> HsmResult<Machine> {
        self.tree.finalize()?;
        let machine = Machine::new(self.name, self.tree, self.log_capacity, self.dbg, self.hooks);
        Ok(machine.spawn_shared(worker))
    }
}
