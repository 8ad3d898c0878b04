//! Execution contexts.
//!
//! A connection lives in two contexts: the network context, where the transport
//! delivers events and frames are handed to it, and the application context,
//! where commands originate and notifications are observed. Each context runs
//! its tasks one at a time in posting order. Work crosses from one context to
//! the other only by posting a task, never by blocking.

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;

/// A unit of work posted to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A sequential, FIFO executor for [`Task`]s.
///
/// Implementations must run tasks one after another in the order they were
/// posted. `post` must not run the task synchronously and must not block.
/// A runner that has shut down drops posted tasks.
pub trait TaskRunner: Send + Sync + 'static {
    /// Schedule `task` to run after every task posted before it.
    fn post(&self, task: Task);
}

/// The pair of contexts a connection runs in.
#[derive(Clone)]
pub struct Contexts {
    /// Where transport events are handled and frames are sent.
    pub network: Arc<dyn TaskRunner>,
    /// Where application notifications are delivered.
    pub application: Arc<dyn TaskRunner>,
}

impl Contexts {
    /// Bundle two runners.
    pub fn new(network: Arc<dyn TaskRunner>, application: Arc<dyn TaskRunner>) -> Self {
        Contexts { network, application }
    }

    /// Spawn a network and an application runner on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[cfg(feature = "tokio")]
    pub fn tokio() -> Self {
        Contexts {
            network: Arc::new(TokioRunner::spawn()),
            application: Arc::new(TokioRunner::spawn()),
        }
    }
}

impl fmt::Debug for Contexts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Contexts").finish_non_exhaustive()
    }
}

/// A context pumped by its owner.
///
/// Tasks accumulate until [`LocalQueue::run_pending`] is called, which makes it
/// suitable for embedding into a host event loop and for deterministic tests.
#[derive(Default)]
pub struct LocalQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl LocalQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Tell whether no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Run the oldest task, if any.
    pub fn run_one(&self) -> bool {
        // The lock must be released before running: tasks post new tasks.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks posted meanwhile.
    ///
    /// Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        count
    }
}

impl TaskRunner for LocalQueue {
    fn post(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LocalQueue").field("pending", &self.len()).finish()
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_runner::TokioRunner;

#[cfg(feature = "tokio")]
mod tokio_runner {
    use log::*;
    use tokio::{runtime::Handle, sync::mpsc};

    use super::{Task, TaskRunner};

    /// A context backed by a single tokio task draining an unbounded channel.
    ///
    /// Once the runtime shuts down, posted tasks are dropped without running.
    #[derive(Debug, Clone)]
    pub struct TokioRunner {
        tx: mpsc::UnboundedSender<Task>,
    }

    impl TokioRunner {
        /// Spawn the runner loop on the current runtime.
        ///
        /// # Panics
        ///
        /// Panics when called outside of a tokio runtime.
        pub fn spawn() -> Self {
            Self::spawn_on(&Handle::current())
        }

        /// Spawn the runner loop on the given runtime.
        pub fn spawn_on(handle: &Handle) -> Self {
            let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
            handle.spawn(async move {
                while let Some(task) = rx.recv().await {
                    task();
                }
                trace!("Runner loop finished");
            });
            TokioRunner { tx }
        }
    }

    impl TaskRunner for TokioRunner {
        fn post(&self, task: Task) {
            if self.tx.send(task).is_err() {
                warn!("Runner loop is gone, discarding task");
            }
        }
    }
}

/// Post a closure to `runner`.
pub(crate) fn post<F>(runner: &Arc<dyn TaskRunner>, f: F)
where
    F: FnOnce() + Send + 'static,
{
    runner.post(Box::new(f));
}
