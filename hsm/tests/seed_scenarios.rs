//! Integration coverage for the seed scenarios and cross-cutting invariants:
//! each test drives a real `Machine` on its own worker thread and polls the
//! log ring rather than reaching into engine internals, since dispatch is
//! asynchronous relative to the sending thread.
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hsm::{Handled, HsmResult, MachineBuilder, MachineHandle, Message, State, StateId};

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !pred() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn id(n: u32) -> StateId {
    StateId::new(n)
}

struct SelfLoop {
    enters: Arc<AtomicI64>,
    exits: Arc<AtomicI64>,
}

impl State for SelfLoop {
    fn enter(&self, _handle: &MachineHandle) {
        self.enters.fetch_add(1, Ordering::SeqCst);
    }
    fn exit(&self, _handle: &MachineHandle) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
    fn process_message(&self, _msg: &Message, handle: &MachineHandle) -> Handled {
        handle.transition_to(id(1)).unwrap();
        Handled::Yes
    }
}

#[test]
fn self_transition_with_reentry() -> HsmResult<()> {
    let enters = Arc::new(AtomicI64::new(0));
    let exits = Arc::new(AtomicI64::new(0));
    let machine = MachineBuilder::new("self-loop")
        .add_state(
            id(1),
            None,
            Box::new(SelfLoop {
                enters: enters.clone(),
                exits: exits.clone(),
            }),
        )?
        .set_initial_state(id(1))?
        .start()?;

    wait_until(|| enters.load(Ordering::SeqCst) == 1, Duration::from_secs(1));
    enters.store(0, Ordering::SeqCst);
    exits.store(0, Ordering::SeqCst);

    machine.send(Message::new(1));
    machine.send(Message::new(2));
    wait_until(|| machine.get_log_rec_count() == 2, Duration::from_secs(1));

    assert_eq!(enters.load(Ordering::SeqCst), 2);
    assert_eq!(exits.load(Ordering::SeqCst), 2);
    let recs = machine.copy_log_recs();
    assert_eq!(recs.len(), 2);
    for rec in &recs {
        assert_eq!(rec.handler, Some(id(1)));
    }
    Ok(())
}

struct DeferringFirst;
impl State for DeferringFirst {
    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        handle.defer_message().unwrap();
        if msg.what == 2 {
            handle.transition_to(id(3)).unwrap();
        }
        Handled::Yes
    }
}

struct PlainSecond;
impl State for PlainSecond {
    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        Handled::Yes
    }
}

struct RootNoop;
impl State for RootNoop {}

#[test]
fn deferral_across_transition() -> HsmResult<()> {
    let machine = MachineBuilder::new("deferral")
        .add_state(id(1), None, Box::new(RootNoop))?
        .add_state(id(2), Some(id(1)), Box::new(DeferringFirst))?
        .add_state(id(3), Some(id(1)), Box::new(PlainSecond))?
        .set_initial_state(id(2))?
        .start()?;

    machine.send(Message::new(1));
    machine.send(Message::new(2));
    wait_until(|| machine.get_log_rec_count() == 4, Duration::from_secs(1));

    let recs = machine.copy_log_recs();
    assert_eq!(recs.len(), 4);
    let expected = [(1, id(2)), (2, id(2)), (1, id(3)), (2, id(3))];
    for (rec, (what, handler)) in recs.iter().zip(expected) {
        match rec.what {
            hsm::EventTag::What(w) => assert_eq!(w, what),
            _ => panic!("unexpected synthetic record"),
        }
        assert_eq!(rec.handler, Some(handler));
    }
    Ok(())
}

struct UnhandlingChild;
impl State for UnhandlingChild {
    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        Handled::No
    }
}

struct HaltingParent;
impl State for HaltingParent {
    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        if msg.what == 2 {
            handle.transition_to_halting_state();
        }
        Handled::Yes
    }
}

#[test]
fn parent_fallback() -> HsmResult<()> {
    let machine = MachineBuilder::new("parent-fallback")
        .add_state(id(1), None, Box::new(HaltingParent))?
        .add_state(id(2), Some(id(1)), Box::new(UnhandlingChild))?
        .set_initial_state(id(2))?
        .start()?;

    machine.send(Message::new(1));
    machine.send(Message::new(2));
    machine.join();

    let recs = machine.copy_log_recs();
    assert_eq!(recs.len(), 2);
    for rec in &recs {
        assert_eq!(rec.handler, Some(id(1)));
        assert_eq!(rec.origin, Some(id(2)));
    }
    Ok(())
}

struct Inert;
impl State for Inert {
    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        Handled::Yes
    }
}

#[test]
fn ring_bounds() -> HsmResult<()> {
    let machine = MachineBuilder::new("ring-bounds")
        .add_state(id(1), None, Box::new(Inert))?
        .set_initial_state(id(1))?
        .set_log_rec_size(3)
        .start()?;

    for what in 0..6 {
        machine.send(Message::new(what));
    }
    wait_until(|| machine.get_log_rec_count() == 6, Duration::from_secs(1));

    assert_eq!(machine.get_log_rec_size(), 3);
    let recs = machine.copy_log_recs();
    let whats: Vec<i32> = recs
        .iter()
        .map(|r| match r.what {
            hsm::EventTag::What(w) => w,
            _ => panic!("unexpected synthetic record"),
        })
        .collect();
    assert_eq!(whats, vec![3, 4, 5]);
    Ok(())
}

struct Timestamping {
    seen: Arc<Mutex<Vec<Instant>>>,
}
impl State for Timestamping {
    fn process_message(&self, _msg: &Message, _handle: &MachineHandle) -> Handled {
        self.seen.lock().unwrap().push(Instant::now());
        Handled::Yes
    }
}

#[test]
fn delayed_timing() -> HsmResult<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let machine = MachineBuilder::new("delayed-timing")
        .add_state(id(1), None, Box::new(Timestamping { seen: seen.clone() }))?
        .set_initial_state(id(1))?
        .start()?;

    let t0 = Instant::now();
    machine.send(Message::new(1));
    machine.send_delayed(Message::new(2), Duration::from_millis(250));
    wait_until(|| seen.lock().unwrap().len() == 2, Duration::from_secs(2));

    let recorded = seen.lock().unwrap().clone();
    assert!(recorded[0] - t0 < Duration::from_millis(100));
    assert!(recorded[1] - recorded[0] >= Duration::from_millis(230));
    Ok(())
}

struct SlowThenQuit {
    sleep: Duration,
}
impl State for SlowThenQuit {
    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        if msg.what == 0 {
            std::thread::sleep(self.sleep);
            handle.quit();
        }
        Handled::Yes
    }
}

#[test]
fn graceful_quit_drains() -> HsmResult<()> {
    let machine = MachineBuilder::new("graceful-quit")
        .add_state(
            id(1),
            None,
            Box::new(SlowThenQuit {
                sleep: Duration::from_millis(20),
            }),
        )?
        .set_initial_state(id(1))?
        .set_dbg(true)
        .start()?;

    for what in 0..6 {
        machine.send(Message::new(what));
    }
    machine.join();

    let recs = machine.copy_log_recs();
    assert_eq!(recs.len(), 9);
    assert_eq!(recs[0].what, hsm::EventTag::Enter);
    for (rec, what) in recs[1..7].iter().zip(0..6) {
        match rec.what {
            hsm::EventTag::What(w) => assert_eq!(w, what),
            _ => panic!("expected a message record"),
        }
    }
    assert_eq!(recs[7].what, hsm::EventTag::Exit);
    assert_eq!(recs[8].what, hsm::EventTag::OnQuitting);
    Ok(())
}

struct QuitNowOnFirst;
impl State for QuitNowOnFirst {
    fn process_message(&self, msg: &Message, handle: &MachineHandle) -> Handled {
        if msg.what == 0 {
            handle.quit_now();
        }
        Handled::Yes
    }
}

#[test]
fn immediate_quit_drops_tail() -> HsmResult<()> {
    let machine = MachineBuilder::new("quit-now")
        .add_state(id(1), None, Box::new(QuitNowOnFirst))?
        .set_initial_state(id(1))?
        .set_dbg(true)
        .start()?;

    for what in 0..6 {
        machine.send(Message::new(what));
    }
    machine.join();

    let recs = machine.copy_log_recs();
    assert_eq!(recs.len(), 4);
    assert_eq!(recs[0].what, hsm::EventTag::Enter);
    assert_eq!(recs[1].what, hsm::EventTag::What(0));
    assert_eq!(recs[2].what, hsm::EventTag::Exit);
    assert_eq!(recs[3].what, hsm::EventTag::OnQuitting);
    Ok(())
}

struct RedirectRoot;
impl State for RedirectRoot {}

struct RedirectingMiddle {
    exit_count: Arc<AtomicUsize>,
}
impl State for RedirectingMiddle {
    fn exit(&self, handle: &MachineHandle) {
        self.exit_count.fetch_add(1, Ordering::SeqCst);
        handle.transition_to(id(5)).unwrap();
    }
}

struct RedirectLeaf;
impl State for RedirectLeaf {
    fn process_message(&self, _msg: &Message, handle: &MachineHandle) -> Handled {
        handle.transition_to(id(4)).unwrap();
        Handled::Yes
    }
}

struct RedirectPlain;
impl State for RedirectPlain {}

#[test]
fn transition_in_exit_redirect() -> HsmResult<()> {
    let middle_exits = Arc::new(AtomicUsize::new(0));
    let machine = MachineBuilder::new("exit-redirect")
        .add_state(id(1), None, Box::new(RedirectRoot))? // Root
        .add_state(
            id(2),
            Some(id(1)),
            Box::new(RedirectingMiddle {
                exit_count: middle_exits.clone(),
            }),
        )? // S2, child of Root
        .add_state(id(3), Some(id(2)), Box::new(RedirectLeaf))? // S1, child of S2
        .add_state(id(4), Some(id(1)), Box::new(RedirectPlain))? // S3, child of Root
        .add_state(id(5), Some(id(1)), Box::new(RedirectPlain))? // S4, child of Root
        .set_initial_state(id(3))?
        .set_dbg(true)
        .start()?;

    wait_until(|| machine.get_log_rec_count() >= 3, Duration::from_secs(1));
    let initial_entries = machine.get_log_rec_count();
    machine.send(Message::new(99));
    wait_until(
        || machine.get_log_rec_count() > initial_entries,
        Duration::from_secs(1),
    );
    wait_until(|| middle_exits.load(Ordering::SeqCst) == 1, Duration::from_secs(1));

    // Settle: give the redirected enter a moment to land before reading the ring.
    wait_until(|| machine.get_log_rec_count() >= initial_entries + 3, Duration::from_secs(1));

    let recs = machine.copy_log_recs();
    let tail = &recs[recs.len() - 3..];
    assert_eq!(tail[0].what, hsm::EventTag::Exit);
    assert_eq!(tail[0].handler, Some(id(3)));
    assert_eq!(tail[1].what, hsm::EventTag::Exit);
    assert_eq!(tail[1].handler, Some(id(2)));
    assert_eq!(tail[2].what, hsm::EventTag::Enter);
    assert_eq!(tail[2].handler, Some(id(5)));
    Ok(())
}

struct CurrentMessageRoot;
impl State for CurrentMessageRoot {}

struct CurrentMessageLeaf {
    seen_in_exit: Arc<Mutex<Option<hsm::CurrentMessage>>>,
}
impl State for CurrentMessageLeaf {
    fn exit(&self, handle: &MachineHandle) {
        *self.seen_in_exit.lock().unwrap() = handle.get_current_message();
    }
    fn process_message(&self, _msg: &Message, handle: &MachineHandle) -> Handled {
        handle.transition_to(id(2)).unwrap();
        Handled::Yes
    }
}

struct CurrentMessageTarget {
    seen_in_enter: Arc<Mutex<Option<hsm::CurrentMessage>>>,
}
impl State for CurrentMessageTarget {
    fn enter(&self, handle: &MachineHandle) {
        *self.seen_in_enter.lock().unwrap() = handle.get_current_message();
    }
}

#[test]
fn current_message_visible_through_consequent_transition() -> HsmResult<()> {
    let seen_in_exit = Arc::new(Mutex::new(None));
    let seen_in_enter = Arc::new(Mutex::new(None));
    let machine = MachineBuilder::new("current-message")
        .add_state(id(1), None, Box::new(CurrentMessageRoot))?
        .add_state(
            id(3),
            Some(id(1)),
            Box::new(CurrentMessageLeaf {
                seen_in_exit: seen_in_exit.clone(),
            }),
        )?
        .add_state(
            id(2),
            Some(id(1)),
            Box::new(CurrentMessageTarget {
                seen_in_enter: seen_in_enter.clone(),
            }),
        )?
        .set_initial_state(id(3))?
        .start()?;

    machine.send(Message::new(42));
    wait_until(|| seen_in_enter.lock().unwrap().is_some(), Duration::from_secs(1));

    assert_eq!(seen_in_exit.lock().unwrap().unwrap().what, 42);
    assert_eq!(seen_in_enter.lock().unwrap().unwrap().what, 42);
    assert!(machine.get_current_message().is_none());
    Ok(())
}
