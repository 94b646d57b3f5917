//! Multiple machines may legally share one worker thread: each registered
//! machine is polled non-blockingly in round robin rather than each owning
//! a dedicated, mostly-idle OS thread.
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Runner = Box<dyn FnMut() -> bool + Send>;

struct Inner {
    runners: Mutex<Vec<Runner>>,
    wake: Condvar,
}

/// A background thread that round-robins over every machine registered to
/// it via `MachineBuilder::start_on`.
pub struct SharedWorker {
    inner: Arc<Inner>,
    _thread: JoinHandle<()>,
}

impl SharedWorker {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            runners: Mutex::new(Vec::new()),
            wake: Condvar::new(),
        });
        let worker_inner = inner.clone();
        let thread = thread::Builder::new()
            .name("hsm-shared-worker".to_string())
            .spawn(move || shared_loop(worker_inner))
            .expect("failed to spawn shared worker thread");
        SharedWorker {
            inner,
            _thread: thread,
        }
    }

    /// `runner` returns `true` while the machine is still running, `false`
    /// once it has halted and should be dropped from the rotation.
    pub(crate) fn register(&self, runner: Runner) {
        self.inner
            .runners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(runner);
        self.inner.wake.notify_all();
    }
}

impl Default for SharedWorker {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_loop(inner: Arc<Inner>) {
    loop {
        let mut runners = inner.runners.lock().unwrap_or_else(|e| e.into_inner());
        if runners.is_empty() {
            let (guard, _timeout) = inner
                .wake
                .wait_timeout(runners, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner());
            runners = guard;
            if runners.is_empty() {
                continue;
            }
        }
        let mut finished = Vec::new();
        let mut made_progress = false;
        for (i, runner) in runners.iter_mut().enumerate() {
            if !runner() {
                finished.push(i);
            } else {
                made_progress = true;
            }
        }
        for i in finished.into_iter().rev() {
            let _ = runners.remove(i);
        }
        drop(runners);
        if !made_progress {
            thread::sleep(Duration::from_millis(5));
        }
    }
}
