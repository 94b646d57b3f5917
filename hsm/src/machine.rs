//! The dispatch loop and transition controller: a queue-driven loop running
//! on a dedicated or shared worker thread, walking the active state chain
//! with support for mid-transition redirects requested from a hook.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::errors::{HsmError, HsmResult};
use crate::log_ring::{LogRec, LogRing};
use crate::message::{CurrentMessage, EventTag, Message};
use crate::queue::{DeferredQueue, Dequeued, MessageQueue};
use crate::state::{Handled, StateId};
use crate::tree::Tree;
use crate::worker::SharedWorker;

/// Overridable lifecycle callbacks. Defaults are no-ops.
pub trait MachineHooks: Send {
    /// A message bubbled past the root without anyone claiming it.
    fn unhandled_message(&self, _msg: &Message, _handle: &MachineHandle) {}
    /// The client called `transition_to_halting_state`.
    fn on_halting(&self, _handle: &MachineHandle) {}
    /// `quit`/`quit_now`'s marker was consumed.
    fn on_quitting(&self, _handle: &MachineHandle) {}
}

struct DefaultHooks;
impl MachineHooks for DefaultHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Constructed,
    Started,
    Running,
    Halting,
    Halted,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Lifecycle::Constructed,
            1 => Lifecycle::Started,
            2 => Lifecycle::Running,
            3 => Lifecycle::Halting,
            _ => Lifecycle::Halted,
        }
    }
}

enum TransitionTarget {
    State(StateId),
    Halting,
}

/// Scratch state touched only during dispatch, by the worker thread that is
/// currently running a hook. Guarded by a `Mutex` rather than left unsynced
/// because `Machine`/`MachineHandle` may be cloned and handed to other
/// threads by client code (e.g. to call `send` from a timer thread).
struct DispatchScratch {
    current_leaf: Option<StateId>,
    current_message: Option<CurrentMessage>,
    transition_request: Option<TransitionTarget>,
    in_process_message: bool,
    defer_requested: bool,
}

struct MachineShared {
    name: String,
    tree: Tree,
    queue: MessageQueue,
    deferred: Mutex<DeferredQueue>,
    log_ring: Mutex<LogRing>,
    dbg: AtomicBool,
    lifecycle: Mutex<u8>,
    lifecycle_changed: Condvar,
    scratch: Mutex<DispatchScratch>,
    hooks: Mutex<Box<dyn MachineHooks>>,
    worker_join: Mutex<Option<JoinHandle<()>>>,
}

impl MachineShared {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(*self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn set_lifecycle(&self, l: Lifecycle) {
        let mut guard = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        *guard = l as u8;
        drop(guard);
        self.lifecycle_changed.notify_all();
    }
}

/// A running (or not-yet-started) state machine. Cheap to clone: internally
/// an `Arc`. The same type is handed to state hooks as `MachineHandle` so
/// that `transition_to`/`defer_message` live alongside the client-facing
/// `send`/`quit` API.
#[derive(Clone)]
pub struct Machine(Arc<MachineShared>);

/// Alias used at call sites driven from inside a state hook, to read
/// intent: a handle into the machine dispatching right now, not an
/// arbitrary other machine.
pub type MachineHandle = Machine;

impl Machine {
    pub(crate) fn new(
        name: String,
        tree: Tree,
        log_capacity: usize,
        dbg: bool,
        hooks: Box<dyn MachineHooks>,
    ) -> Self {
        Machine(Arc::new(MachineShared {
            name,
            tree,
            queue: MessageQueue::new(),
            deferred: Mutex::new(DeferredQueue::new()),
            log_ring: Mutex::new(LogRing::new(log_capacity)),
            dbg: AtomicBool::new(dbg),
            lifecycle: Mutex::new(Lifecycle::Constructed as u8),
            lifecycle_changed: Condvar::new(),
            scratch: Mutex::new(DispatchScratch {
                current_leaf: None,
                current_message: None,
                transition_request: None,
                in_process_message: false,
                defer_requested: false,
            }),
            hooks: Mutex::new(hooks),
            worker_join: Mutex::new(None),
        }))
    }

    pub(crate) fn spawn_dedicated(self) -> Self {
        self.0.set_lifecycle(Lifecycle::Started);
        let shared = self.0.clone();
        let handle = thread::Builder::new()
            .name(format!("hsm-{}", shared.name))
            .spawn(move || {
                let mut runner = make_runner(Machine(shared), true);
                loop {
                    if let StepOutcome::Halted = runner() {
                        break;
                    }
                }
            })
            .expect("failed to spawn worker thread");
        *self.0.worker_join.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        self
    }

    pub(crate) fn spawn_shared(self, worker: &SharedWorker) -> Self {
        self.0.set_lifecycle(Lifecycle::Started);
        let shared = self.0.clone();
        let mut runner = make_runner(Machine(shared), false);
        worker.register(Box::new(move || !matches!(runner(), StepOutcome::Halted)));
        self
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Send with `scheduled_at = now`.
    pub fn send(&self, message: Message) {
        self.0.queue.send(message);
    }

    /// Send to become due after `delay`.
    pub fn send_delayed(&self, message: Message, delay: Duration) {
        self.0.queue.send_delayed(message, delay);
    }

    /// Request a graceful quit: everything already queued is processed
    /// first, then the active chain is exited and the loop terminates.
    pub fn quit(&self) {
        self.0.queue.request_quit();
    }

    /// Request an immediate quit: pending messages are discarded.
    pub fn quit_now(&self) {
        self.0.queue.request_quit_now();
    }

    /// Block until the machine has halted. Not part of the client-facing
    /// dispatch API; exists so tests can observe a deterministic end state
    /// after a quit rather than racing the worker thread.
    pub fn join(&self) {
        let mut guard = self.0.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        while Lifecycle::from_u8(*guard) != Lifecycle::Halted {
            guard = self
                .0
                .lifecycle_changed
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Valid only while called from inside a hook dispatched by this
    /// machine's own worker thread; `None` otherwise.
    pub fn get_current_message(&self) -> Option<CurrentMessage> {
        self.0
            .scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_message
    }

    pub fn set_log_rec_size(&self, n: usize) {
        self.0
            .log_ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_capacity(n);
    }

    pub fn set_dbg(&self, dbg: bool) {
        self.0.dbg.store(dbg, Ordering::Relaxed);
    }

    pub fn get_log_rec(&self, index: usize) -> Option<LogRec> {
        self.0
            .log_ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }

    pub fn get_log_rec_size(&self) -> usize {
        self.0.log_ring.lock().unwrap_or_else(|e| e.into_inner()).size()
    }

    pub fn get_log_rec_count(&self) -> u64 {
        self.0.log_ring.lock().unwrap_or_else(|e| e.into_inner()).count()
    }

    pub fn copy_log_recs(&self) -> Vec<LogRec> {
        self.0.log_ring.lock().unwrap_or_else(|e| e.into_inner()).snapshot()
    }

    /// Request a transition. Only meaningful called from within a hook on
    /// this machine's own worker thread; the last call made during a single
    /// dispatch wins.
    pub fn transition_to(&self, target: StateId) -> HsmResult<()> {
        if !self.0.tree.contains(target) {
            return Err(HsmError::UnknownState(target));
        }
        self.0
            .scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transition_request = Some(TransitionTarget::State(target));
        Ok(())
    }

    /// Request the machine transition to the halting sentinel: every active
    /// state exits up to the root, then the loop terminates.
    pub fn transition_to_halting_state(&self) {
        self.0
            .scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transition_request = Some(TransitionTarget::Halting);
    }

    /// Defer the message currently being dispatched: it is re-delivered, in
    /// its original arrival order relative to other deferred messages, once
    /// the next transition completes. Legal only from within
    /// `process_message`.
    pub fn defer_message(&self) -> HsmResult<()> {
        let mut scratch = self.0.scratch.lock().unwrap_or_else(|e| e.into_inner());
        if !scratch.in_process_message {
            return Err(HsmError::DeferOutsideProcessMessage);
        }
        scratch.defer_requested = true;
        Ok(())
    }
}

impl std::fmt::Display for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scratch = self.0.scratch.lock().unwrap_or_else(|e| e.into_inner());
        let current = scratch.current_leaf.and_then(|id| self.0.tree.name(id));
        write!(
            f,
            "Machine({}) state={}",
            self.0.name,
            current.as_deref().unwrap_or("(null)")
        )
    }
}

/// What one iteration of the dispatch loop accomplished, for the worker
/// driver (dedicated thread loop, or the shared worker's round robin) to
/// act on.
enum StepOutcome {
    Progressed,
    Halted,
    Idle,
}

/// Builds the per-machine closure a worker thread repeatedly calls. The
/// first call runs the initial entry chain (on whichever thread actually
/// drives it, dedicated or shared, satisfying "every hook runs on a worker
/// thread"); every call after that is one dispatch step.
fn make_runner(machine: Machine, blocking: bool) -> impl FnMut() -> StepOutcome {
    let mut initialized = false;
    move || {
        if !initialized {
            initialized = true;
            run_initial_entry(&machine);
            return StepOutcome::Progressed;
        }
        step(&machine, blocking)
    }
}

fn step(machine: &Machine, blocking: bool) -> StepOutcome {
    let dequeued = if blocking {
        machine.0.queue.dequeue_blocking()
    } else {
        machine.0.queue.try_dequeue()
    };
    match dequeued {
        Dequeued::Idle => StepOutcome::Idle,
        Dequeued::Quit => {
            handle_quit(machine);
            StepOutcome::Halted
        }
        Dequeued::Message(m) => {
            handle_message(machine, m);
            if machine.0.lifecycle() == Lifecycle::Halted {
                StepOutcome::Halted
            } else {
                StepOutcome::Progressed
            }
        }
    }
}

fn do_enter(machine: &Machine, id: StateId) {
    log::trace!(target: "hsm::machine", "{}: entering {:?}", machine.0.name, id);
    if let Some(state) = machine.0.tree.state(id) {
        state.enter(machine);
    }
    if machine.0.dbg.load(Ordering::Relaxed) {
        machine
            .0
            .log_ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EventTag::Enter, Some(id), None, None);
    }
}

fn do_exit(machine: &Machine, id: StateId) {
    log::trace!(target: "hsm::machine", "{}: exiting {:?}", machine.0.name, id);
    if let Some(state) = machine.0.tree.state(id) {
        state.exit(machine);
    }
    if machine.0.dbg.load(Ordering::Relaxed) {
        machine
            .0
            .log_ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EventTag::Exit, Some(id), None, None);
    }
}

fn take_transition_request(machine: &Machine) -> Option<TransitionTarget> {
    machine
        .0
        .scratch
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .transition_request
        .take()
}

fn set_current_leaf(machine: &Machine, leaf: Option<StateId>) {
    machine
        .0
        .scratch
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .current_leaf = leaf;
}

fn current_leaf(machine: &Machine) -> Option<StateId> {
    machine.0.scratch.lock().unwrap_or_else(|e| e.into_inner()).current_leaf
}

/// Ancestor chain of `target` (self..root) with everything from `stop`
/// (exclusive) onward dropped, then reversed so the nearest-to-`stop` state
/// comes first. `stop = None` means "keep the whole chain", used for the
/// very first entry into the tree.
fn entry_path(tree: &Tree, target: StateId, stop: Option<StateId>) -> Vec<StateId> {
    let chain = tree.ancestors(target);
    let mut path: Vec<StateId> = match stop {
        None => chain.to_vec(),
        Some(stop_id) => {
            let pos = chain.iter().position(|&s| s == stop_id).unwrap_or(chain.len());
            chain[..pos].to_vec()
        }
    };
    path.reverse();
    path
}

fn run_initial_entry(machine: &Machine) {
    let target = machine
        .0
        .tree
        .initial_state()
        .expect("builder guarantees an initial state before start");
    log::info!(target: "hsm::machine", "{}: initial state {:?}", machine.0.name, target);
    drive_transition(machine, TransitionTarget::State(target));
    machine.0.set_lifecycle(Lifecycle::Running);
}

/// Runs the transition (and any subsequent redirect requested from an
/// `exit`/`enter` hook) to completion, including lifecycle halting.
fn drive_transition(machine: &Machine, mut target: TransitionTarget) {
    loop {
        match target {
            TransitionTarget::Halting => {
                log::info!(target: "hsm::machine", "{}: transitioning to halting state", machine.0.name);
                machine.0.set_lifecycle(Lifecycle::Halting);
                let mut redirected = None;
                let mut cur = current_leaf(machine);
                while let Some(id) = cur {
                    do_exit(machine, id);
                    cur = machine.0.tree.parent(id);
                    set_current_leaf(machine, cur);
                    if let Some(new_target) = take_transition_request(machine) {
                        redirected = Some(new_target);
                        break;
                    }
                }
                match redirected {
                    Some(new_target) => {
                        target = new_target;
                        continue;
                    }
                    None => {
                        let hooks = machine.0.hooks.lock().unwrap_or_else(|e| e.into_inner());
                        hooks.on_halting(machine);
                        drop(hooks);
                        machine.0.queue.stop();
                        machine.0.set_lifecycle(Lifecycle::Halted);
                        return;
                    }
                }
            }
            TransitionTarget::State(target_id) => {
                let current = current_leaf(machine);

                if current == Some(target_id) {
                    // Self-transition: exactly one exit, then one re-entry.
                    do_exit(machine, target_id);
                    set_current_leaf(machine, machine.0.tree.parent(target_id));
                    if let Some(new_target) = take_transition_request(machine) {
                        target = new_target;
                        continue;
                    }
                    do_enter(machine, target_id);
                    set_current_leaf(machine, Some(target_id));
                    if let Some(new_target) = take_transition_request(machine) {
                        target = new_target;
                        continue;
                    }
                    flush_deferred(machine);
                    return;
                }

                let stop = current.map(|cur| {
                    machine
                        .0
                        .tree
                        .least_common_ancestor(cur, target_id)
                        .expect("transition_to validated target exists")
                });

                let mut redirected = None;
                let mut cur = current;
                while let Some(id) = cur {
                    if Some(id) == stop {
                        break;
                    }
                    do_exit(machine, id);
                    cur = machine.0.tree.parent(id);
                    set_current_leaf(machine, cur);
                    if let Some(new_target) = take_transition_request(machine) {
                        redirected = Some(new_target);
                        break;
                    }
                }
                if let Some(new_target) = redirected {
                    target = new_target;
                    continue;
                }

                let entries = entry_path(&machine.0.tree, target_id, stop);
                let mut redirected = None;
                for id in entries {
                    do_enter(machine, id);
                    set_current_leaf(machine, Some(id));
                    if let Some(new_target) = take_transition_request(machine) {
                        redirected = Some(new_target);
                        break;
                    }
                }
                match redirected {
                    Some(new_target) => {
                        target = new_target;
                        continue;
                    }
                    None => {
                        flush_deferred(machine);
                        return;
                    }
                }
            }
        }
    }
}

/// Flush the deferred queue to the front of the main queue, preserving
/// arrival order. Only called on a transition that completes to a normal
/// state; halting never flushes, so deferrals pending when the machine
/// halts are simply dropped: a deferred message reappears iff some
/// transition completed before the halt.
fn flush_deferred(machine: &Machine) {
    let drained = machine
        .0
        .deferred
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .drain();
    for message in drained {
        machine.0.queue.send_at_front(message);
    }
}

fn handle_message(machine: &Machine, message: Message) {
    let origin = current_leaf(machine);
    {
        let mut scratch = machine.0.scratch.lock().unwrap_or_else(|e| e.into_inner());
        scratch.current_message = Some(CurrentMessage::from(&message));
    }

    let mut handler = None;
    let mut chain = origin;
    while let Some(id) = chain {
        log::debug!(target: "hsm::machine", "{}: {:?} handling what={}", machine.0.name, id, message.what);
        {
            let mut scratch = machine.0.scratch.lock().unwrap_or_else(|e| e.into_inner());
            scratch.in_process_message = true;
            scratch.defer_requested = false;
        }
        let result = match machine.0.tree.state(id) {
            Some(state) => state.process_message(&message, machine),
            None => Handled::No,
        };
        machine
            .0
            .scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_process_message = false;
        if result.is_handled() {
            handler = Some(id);
            break;
        }
        chain = machine.0.tree.parent(id);
        if let Some(parent) = chain {
            log::debug!(target: "hsm::machine", "{}: bubbling what={} to parent {:?}", machine.0.name, message.what, parent);
        }
    }

    if handler.is_none() {
        log::debug!(target: "hsm::machine", "{}: what={} unhandled", machine.0.name, message.what);
        let hooks = machine.0.hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.unhandled_message(&message, machine);
    }

    let what = message.what;
    let deferred = machine
        .0
        .scratch
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .defer_requested;
    if deferred {
        machine
            .0
            .deferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    let requested = take_transition_request(machine);
    let destination = match &requested {
        Some(TransitionTarget::State(id)) => Some(*id),
        Some(TransitionTarget::Halting) | None => None,
    };

    // Recorded before running the transition so a transition that halts the
    // machine (waking any `join()`er as its very last act) can never race
    // past this dispatch's own log entry.
    machine
        .0
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(EventTag::What(what), handler, origin, destination);

    // `get_current_message()` must keep returning this message through any
    // consequent transition, including from the `exit`/`enter` hooks it
    // triggers, so the clear happens after `drive_transition` returns.
    if let Some(target) = requested {
        drive_transition(machine, target);
    }

    machine
        .0
        .scratch
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .current_message = None;
}

fn handle_quit(machine: &Machine) {
    log::info!(target: "hsm::machine", "{}: quitting", machine.0.name);
    machine.0.set_lifecycle(Lifecycle::Halting);
    let mut cur = current_leaf(machine);
    while let Some(id) = cur {
        do_exit(machine, id);
        cur = machine.0.tree.parent(id);
        set_current_leaf(machine, cur);
    }
    {
        let hooks = machine.0.hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.on_quitting(machine);
    }
    if machine.0.dbg.load(Ordering::Relaxed) {
        machine
            .0
            .log_ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EventTag::OnQuitting, None, None, None);
    }
    machine.0.set_lifecycle(Lifecycle::Halted);
}

pub(crate) fn default_hooks() -> Box<dyn MachineHooks> {
    Box::new(DefaultHooks)
}
