//
// Copyright 2024 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Synchronization utils: a re-armable one-shot completion, a single-slot
//! coalescing work queue and a bounded busy-wait helper.

use std::{
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

/// A one-shot completion signal that can be re-armed.
///
/// A completion left signalled by a late acknowledge (after the waiter gave
/// up) stays signalled until the next transaction calls [`Completion::reset`],
/// so a stale signal can never be misattributed to a later request as long as
/// every transaction re-arms before triggering the firmware.
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self { done: Mutex::new(false), cond: Condvar::new() }
    }

    /// Re-arms the completion, discarding any stale signal.
    pub fn reset(&self) {
        *self.done.lock().unwrap() = false;
    }

    /// Signals the completion, waking all current waiters.
    pub fn complete(&self) {
        *self.done.lock().unwrap() = true;
        self.cond.notify_all();
    }

    /// Blocks until the completion is signalled.
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cond.wait(done).unwrap();
        }
    }

    /// Blocks until the completion is signalled or `timeout` elapses.
    /// Returns whether the completion was signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap();
        let (done, _) = self.cond.wait_timeout_while(done, timeout, |done| !*done).unwrap();
        *done
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution mode of a [`WorkQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkMode {
    /// A dedicated worker thread runs scheduled jobs.
    #[default]
    Threaded,
    /// Scheduled jobs only run when [`WorkQueue::flush`] is called. Intended
    /// for tests that need deterministic coalescing.
    Manual,
}

#[derive(Default)]
struct WorkState {
    scheduled: bool,
    running: bool,
    shutdown: bool,
}

struct WorkShared {
    state: Mutex<WorkState>,
    cond: Condvar,
}

type Job = Arc<dyn Fn() + Send + Sync + 'static>;

/// A single-slot coalescing work queue.
///
/// Scheduling while a run is already pending is a no-op; any number of
/// [`WorkQueue::schedule`] calls before the job actually runs collapse into
/// one execution.
pub struct WorkQueue {
    shared: Arc<WorkShared>,
    job: Job,
    worker: Option<thread::JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(mode: WorkMode, job: impl Fn() + Send + Sync + 'static) -> Self {
        let job: Job = Arc::new(job);
        let shared =
            Arc::new(WorkShared { state: Mutex::new(WorkState::default()), cond: Condvar::new() });
        let worker = match mode {
            WorkMode::Manual => None,
            WorkMode::Threaded => {
                let shared = Arc::clone(&shared);
                let job = Arc::clone(&job);
                Some(
                    thread::Builder::new()
                        .name("prcmu-work".to_string())
                        .spawn(move || worker_loop(shared, job))
                        .expect("couldn't spawn work queue thread"),
                )
            }
        };
        Self { shared, job, worker }
    }

    /// Marks the job as pending. Idempotent while a run is already pending.
    pub fn schedule(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.scheduled {
            state.scheduled = true;
            self.shared.cond.notify_all();
        }
    }

    /// Drains pending work: waits for the worker in threaded mode, runs the
    /// job inline in manual mode. Returns with no scheduled run outstanding.
    pub fn flush(&self) {
        if self.worker.is_some() {
            let mut state = self.shared.state.lock().unwrap();
            while state.scheduled || state.running {
                state = self.shared.cond.wait(state).unwrap();
            }
        } else {
            loop {
                {
                    let mut state = self.shared.state.lock().unwrap();
                    if !state.scheduled {
                        return;
                    }
                    state.scheduled = false;
                }
                (self.job)();
            }
        }
    }
}

fn worker_loop(shared: Arc<WorkShared>, job: Job) {
    loop {
        {
            let mut state = shared.state.lock().unwrap();
            while !state.scheduled && !state.shutdown {
                state = shared.cond.wait(state).unwrap();
            }
            if state.shutdown {
                return;
            }
            state.scheduled = false;
            state.running = true;
        }
        job();
        {
            let mut state = shared.state.lock().unwrap();
            state.running = false;
            shared.cond.notify_all();
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.cond.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Number of busy spins before a [`Backoff`] starts yielding the CPU.
const SPIN_LIMIT: u32 = 100;

/// Spin-then-yield backoff policy for short hardware waits.
pub struct Backoff {
    spins: u32,
}

impl Backoff {
    pub const fn new() -> Self {
        Self { spins: 0 }
    }

    pub fn wait(&mut self) {
        if self.spins < SPIN_LIMIT {
            self.spins += 1;
            core::hint::spin_loop();
        } else {
            thread::yield_now();
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Busy-waits until `predicate` returns true.
///
/// Bounded only by protocol expectation: the callers poll hardware bits the
/// firmware is expected to drain quickly.
pub fn poll_until(mut predicate: impl FnMut() -> bool) {
    let mut backoff = Backoff::new();
    while !predicate() {
        backoff.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_completion_signalled_before_wait() {
        let completion = Completion::new();
        completion.complete();
        completion.wait();
        assert!(completion.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_completion_reset_discards_stale_signal() {
        let completion = Completion::new();
        completion.complete();
        completion.reset();
        assert!(!completion.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_wakes_cross_thread() {
        let completion = Arc::new(Completion::new());
        let signaller = Arc::clone(&completion);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signaller.complete();
        });
        assert!(completion.wait_timeout(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_manual_work_queue_coalesces() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let queue = WorkQueue::new(WorkMode::Manual, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule();
        queue.schedule();
        queue.schedule();
        queue.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        queue.flush();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_threaded_work_queue_runs_scheduled_job() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let queue = WorkQueue::new(WorkMode::Threaded, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queue.schedule();
        queue.flush();
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_poll_until_observes_cross_thread_store() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            setter.store(true, Ordering::SeqCst);
        });
        poll_until(|| flag.load(Ordering::SeqCst));
        handle.join().unwrap();
    }
}
