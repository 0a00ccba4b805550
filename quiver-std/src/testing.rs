//! Testing utilities for Quiver.
//!
//! # Features
//!
//! - [`EventRecorder`]: A reaction body that records every batch it receives
//! - [`ManualHost`]: A host scheduler whose flushes run only when asked

use quiver_core::{Component, Event, Loop, LoopError, ReactionDescriptor, Task, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

// ============================================================================
// Event Recorder
// ============================================================================

/// Records the event batches delivered to a reaction.
///
/// Clones share the same record.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = EventRecorder::new();
/// let class = ComponentClass::builder("Watched")
///     .property(PropertyDescriptor::int("value").settable())
///     .reaction(recorder.descriptor("watch", &["value"]))
///     .build()?;
///
/// let c = Component::new(&class, &lp)?;
/// c.set("value", 3)?;
/// lp.iter()?;
/// assert_eq!(recorder.batch_sizes(), [2]);
/// ```
#[derive(Clone, Default)]
pub struct EventRecorder {
    batches: Rc<RefCell<Vec<Vec<Event>>>>,
}

impl EventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reaction body that appends each batch to this recorder.
    pub fn handler(&self) -> impl Fn(&Component, &[Event]) + 'static {
        let batches = Rc::clone(&self.batches);
        move |_: &Component, events: &[Event]| batches.borrow_mut().push(events.to_vec())
    }

    /// A reaction descriptor bound to `connections` that records its batches.
    pub fn descriptor<S: AsRef<str>>(&self, name: &str, connections: &[S]) -> ReactionDescriptor {
        ReactionDescriptor::new(name, connections, self.handler())
    }

    /// All recorded batches.
    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.borrow().clone()
    }

    /// Size of each recorded batch.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.borrow().iter().map(Vec::len).collect()
    }

    /// Number of times the reaction ran.
    pub fn call_count(&self) -> usize {
        self.batches.borrow().len()
    }

    /// All recorded events, flattened.
    pub fn events(&self) -> Vec<Event> {
        self.batches.borrow().iter().flatten().cloned().collect()
    }

    /// Event types of all recorded events.
    pub fn kinds(&self) -> Vec<String> {
        self.batches
            .borrow()
            .iter()
            .flatten()
            .map(|e| e.kind().to_owned())
            .collect()
    }

    /// `new_value` of every recorded change event.
    pub fn new_values(&self) -> Vec<Value> {
        self.batches
            .borrow()
            .iter()
            .flatten()
            .filter_map(|e| e.new_value().cloned())
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.batches.borrow_mut().clear();
    }
}

// ============================================================================
// Manual Host
// ============================================================================

/// A host scheduler that queues flush tasks until the test runs them.
///
/// # Example
///
/// ```rust,ignore
/// let host = ManualHost::new();
/// host.install(&lp, true)?;
/// lp.call_soon(|| println!("later"));
/// assert_eq!(host.requests(), 1);
/// host.run_pending();
/// ```
#[derive(Clone, Default)]
pub struct ManualHost {
    tasks: Rc<RefCell<VecDeque<Task>>>,
    requests: Rc<Cell<usize>>,
}

impl ManualHost {
    /// Create a host with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// The scheduler function to hand to [`Loop::integrate`].
    pub fn scheduler(&self) -> impl Fn(Task) + 'static {
        let tasks = Rc::clone(&self.tasks);
        let requests = Rc::clone(&self.requests);
        move |task: Task| {
            requests.set(requests.get() + 1);
            tasks.borrow_mut().push_back(task);
        }
    }

    /// Integrate this host into `lp`.
    pub fn install(&self, lp: &Loop, reset: bool) -> Result<(), LoopError> {
        lp.integrate(self.scheduler(), reset)
    }

    /// Number of flushes requested so far.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }

    /// Number of tasks waiting to run.
    pub fn queued(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Run the oldest queued task. Returns `false` if nothing was queued.
    pub fn run_next(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run queued tasks, including ones queued while running, until none
    /// are left. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{ComponentClass, PropertyDescriptor};

    #[test]
    fn test_recorder_sees_init_and_change_in_one_batch() {
        let lp = Loop::new();
        let recorder = EventRecorder::new();
        let class = ComponentClass::builder("Watched")
            .property(PropertyDescriptor::int("value").settable())
            .reaction(recorder.descriptor("watch", &["value"]))
            .build()
            .unwrap();

        let c = Component::new(&class, &lp).unwrap();
        c.set("value", 3).unwrap();
        lp.iter().unwrap();

        assert_eq!(recorder.batch_sizes(), [2]);
        assert_eq!(recorder.kinds(), ["value", "value"]);
        assert_eq!(recorder.new_values(), [Value::Int(0), Value::Int(3)]);
        recorder.clear();
        assert_eq!(recorder.call_count(), 0);
    }

    #[test]
    fn test_manual_host_runs_flush_on_demand() {
        let lp = Loop::new();
        let host = ManualHost::new();
        host.install(&lp, true).unwrap();

        let ran = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ran);
        lp.call_soon(move || counter.set(counter.get() + 1));
        assert_eq!(host.requests(), 1);
        assert_eq!(host.queued(), 1);
        assert_eq!(ran.get(), 0);

        assert_eq!(host.run_pending(), 1);
        assert_eq!(ran.get(), 1);
        assert!(!host.run_next());
    }
}
