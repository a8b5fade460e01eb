//! Single-threaded worker mailbox.
//!
//! All replication state lives inside the mailbox: posted closures run on
//! one owning thread, in arrival order, never concurrently. The
//! serialization is deliberately visible (a queue of closures, not a
//! future/promise layer) because the ordering contract between demand
//! registration and response emission depends on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum Command<S> {
    Run(Box<dyn FnOnce(&mut S) + Send>),
    Shutdown,
}

/// A cooperative single-threaded execution context owning state `S`.
///
/// Work posted after shutdown is rejected; work still queued at shutdown is
/// dropped. A closure already running completes before the worker exits.
pub struct WorkerMailbox<S> {
    sender: Sender<Command<S>>,
    shutting_down: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> WorkerMailbox<S> {
    /// Spawns the worker thread and moves `state` onto it.
    pub fn spawn(state: S) -> Self {
        let (sender, receiver) = mpsc::channel::<Command<S>>();
        let shutting_down = Arc::new(AtomicBool::new(false));
        let worker_flag = Arc::clone(&shutting_down);
        let worker = thread::spawn(move || {
            let mut state = state;
            while let Ok(command) = receiver.recv() {
                if worker_flag.load(Ordering::Acquire) {
                    break;
                }
                match command {
                    Command::Run(job) => job(&mut state),
                    Command::Shutdown => break,
                }
            }
            // Anything still queued is dropped with the receiver.
        });
        Self {
            sender,
            shutting_down,
            worker: Some(worker),
        }
    }

    /// Enqueues a unit of work. Returns false if the mailbox has shut down.
    pub fn post(&self, job: impl FnOnce(&mut S) + Send + 'static) -> bool {
        if self.shutting_down.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(Command::Run(Box::new(job))).is_ok()
    }

    /// Returns a cloneable handle for posting from other threads.
    pub fn handle(&self) -> MailboxHandle<S> {
        MailboxHandle {
            sender: self.sender.clone(),
            shutting_down: Arc::clone(&self.shutting_down),
        }
    }

    /// Shuts the mailbox down, dropping queued work and joining the worker.
    pub fn shutdown(self) {
        // Drop runs the shutdown sequence.
    }
}

impl<S> Drop for WorkerMailbox<S> {
    fn drop(&mut self) {
        self.shutting_down.store(true, Ordering::Release);
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// A cloneable posting handle to a [`WorkerMailbox`].
pub struct MailboxHandle<S> {
    sender: Sender<Command<S>>,
    shutting_down: Arc<AtomicBool>,
}

impl<S> Clone for MailboxHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shutting_down: Arc::clone(&self.shutting_down),
        }
    }
}

impl<S: Send + 'static> MailboxHandle<S> {
    /// Enqueues a unit of work. Returns false if the mailbox has shut down.
    pub fn post(&self, job: impl FnOnce(&mut S) + Send + 'static) -> bool {
        if self.shutting_down.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(Command::Run(Box::new(job))).is_ok()
    }
}
