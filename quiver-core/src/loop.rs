//! The loop scheduler.
//!
//! A [`Loop`] owns the deferred-call list, the per-reaction pending event
//! batches and the action scope stack. A flush ([`Loop::iter`]) runs the
//! deferred calls first, then drains pending events in passes: each pass
//! delivers every reaction's batch once, in reaction creation order, and
//! events produced during a pass go to the next pass of the same flush.
//!
//! The loop is single-threaded; handles are `Rc`-based and cannot leave the
//! thread they were created on.

use crate::component::{Component, ComponentId, WeakComponent};
use crate::config::LoopConfig;
use crate::error::{BoxError, LoopError};
use crate::event::Event;
use crate::outcome::IntoOutcome;
use crate::reaction::{Reaction, ReactionId, WeakReaction};
use crate::value::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use tracing::{debug, error, trace, warn};

/// A unit of work handed to a host scheduler.
pub type Task = Box<dyn FnOnce()>;

type DeferredCall = Box<dyn FnOnce() -> Result<(), BoxError>>;
type Host = Rc<dyn Fn(Task)>;

/// Scheduling state of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Nothing requested.
    Idle,
    /// A flush was requested from the host but has not started.
    Scheduled,
    /// A flush is running.
    Flushing,
}

/// Summary of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Deferred calls that ran.
    pub calls: usize,
    /// Reaction invocations.
    pub reactions: usize,
    /// Drain passes.
    pub passes: usize,
    /// Deferred calls and reactions that returned an error or panicked.
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Action(ComponentId),
    Emitter,
    Batch,
}

struct PendingEntry {
    reaction: WeakReaction,
    eager: bool,
    events: Vec<Event>,
}

#[derive(Default)]
struct PendingQueue {
    entries: Vec<PendingEntry>,
    index: HashMap<ReactionId, usize>,
}

impl PendingQueue {
    fn push(&mut self, reaction: WeakReaction, eager: bool, event: Event) {
        match self.index.get(&reaction.id()) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.eager |= eager;
                entry.events.push(event);
            }
            None => {
                self.index.insert(reaction.id(), self.entries.len());
                self.entries.push(PendingEntry {
                    reaction,
                    eager,
                    events: vec![event],
                });
            }
        }
    }

    fn take_all(&mut self) -> Vec<PendingEntry> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    fn has_eager(&self) -> bool {
        self.entries.iter().any(|e| e.eager)
    }

    fn take_eager(&mut self) -> Vec<PendingEntry> {
        let (eager, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|e| e.eager);
        self.entries = rest;
        self.reindex();
        eager
    }

    fn remove(&mut self, id: ReactionId) -> Option<PendingEntry> {
        let i = self.index.remove(&id)?;
        let entry = self.entries.remove(i);
        self.reindex();
        Some(entry)
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.reaction.id(), i))
            .collect();
    }

    fn event_count(&self) -> usize {
        self.entries.iter().map(|e| e.events.len()).sum()
    }
}

/// Identifies one delivery of one event: reaction, sequence and label.
type DeliveryKey = (ReactionId, u64, String);

struct Change {
    component: WeakComponent,
    property: String,
    old: Value,
}

struct LoopInner {
    config: LoopConfig,
    scheduled: Cell<bool>,
    flushing: Cell<bool>,
    delivering_eager: Cell<bool>,
    calls: RefCell<VecDeque<DeferredCall>>,
    pending: RefCell<PendingQueue>,
    queued: RefCell<HashSet<DeliveryKey>>,
    scopes: RefCell<Vec<Scope>>,
    changes: RefCell<Vec<Change>>,
    sequence: Cell<u64>,
    generation: Cell<u64>,
    epoch: Cell<u64>,
    host: RefCell<Option<Host>>,
}

/// A handle to a loop scheduler. Clones share the same loop.
#[derive(Clone)]
pub struct Loop(Rc<LoopInner>);

thread_local! {
    static GLOBAL: Loop = Loop::new();
}

/// Resets a flag when dropped.
struct FlagGuard<'a>(&'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Pops a scope when dropped.
pub(crate) struct ScopeGuard {
    lp: Loop,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.lp.exit_scope();
    }
}

impl Default for Loop {
    fn default() -> Self {
        Self::new()
    }
}

impl Loop {
    /// Create an independent loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    /// Create an independent loop.
    pub fn with_config(config: LoopConfig) -> Self {
        Loop(Rc::new(LoopInner {
            config,
            scheduled: Cell::new(false),
            flushing: Cell::new(false),
            delivering_eager: Cell::new(false),
            calls: RefCell::new(VecDeque::new()),
            pending: RefCell::new(PendingQueue::default()),
            queued: RefCell::new(HashSet::new()),
            scopes: RefCell::new(Vec::new()),
            changes: RefCell::new(Vec::new()),
            sequence: Cell::new(0),
            generation: Cell::new(0),
            epoch: Cell::new(0),
            host: RefCell::new(None),
        }))
    }

    /// The default loop of the current thread, created on first use.
    pub fn global() -> Self {
        GLOBAL.with(Loop::clone)
    }

    /// The configuration this loop was created with.
    pub fn config(&self) -> &LoopConfig {
        &self.0.config
    }

    /// Current scheduling state.
    pub fn phase(&self) -> LoopPhase {
        if self.0.flushing.get() {
            LoopPhase::Flushing
        } else if self.0.scheduled.get() {
            LoopPhase::Scheduled
        } else {
            LoopPhase::Idle
        }
    }

    /// Incremented by every [`reset`](Self::reset).
    pub fn generation(&self) -> u64 {
        self.0.generation.get()
    }

    /// Whether both handles point at the same loop.
    pub fn ptr_eq(&self, other: &Loop) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether deferred calls or undelivered events are waiting.
    pub fn has_pending(&self) -> bool {
        !self.0.calls.borrow().is_empty() || !self.0.pending.borrow().entries.is_empty()
    }

    /// Number of undelivered events across all reactions.
    pub fn pending_events(&self) -> usize {
        self.0.pending.borrow().event_count()
    }

    /// Defer `f` to the next flush. Deferred calls run in FIFO order; an
    /// error or panic in one is logged and the rest still run.
    pub fn call_soon<F, R>(&self, f: F)
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.0
            .calls
            .borrow_mut()
            .push_back(Box::new(move || f().into_outcome()));
        if !self.0.scheduled.get() {
            self.request_flush();
        }
    }

    /// Run one flush.
    ///
    /// Calling this from inside a running flush returns
    /// [`LoopError::Reentrant`] and leaves the pending state untouched. If
    /// reactions keep producing events for more than
    /// [`LoopConfig::max_drain_passes`] passes, the rest is discarded and
    /// [`LoopError::RunawayReactions`] is returned.
    pub fn iter(&self) -> Result<FlushReport, LoopError> {
        let inner = &self.0;
        if inner.flushing.get() {
            warn!("cannot call iter() from within iter()");
            return Err(LoopError::Reentrant);
        }
        inner.flushing.set(true);
        let _flushing = FlagGuard(&inner.flushing);
        inner.scheduled.set(false);
        inner.epoch.set(inner.epoch.get() + 1);
        inner.queued.borrow_mut().clear();

        let mut report = FlushReport::default();

        let calls: Vec<DeferredCall> = inner.calls.borrow_mut().drain(..).collect();
        for call in calls {
            report.calls += 1;
            match catch_unwind(AssertUnwindSafe(call)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failures += 1;
                    error!(error = %err, "deferred call failed");
                }
                Err(panic) => {
                    report.failures += 1;
                    error!(panic = panic_message(&*panic), "deferred call panicked");
                }
            }
        }

        let mut outcome = Ok(());
        loop {
            let batch = inner.pending.borrow_mut().take_all();
            if batch.is_empty() {
                break;
            }
            if report.passes >= inner.config.max_drain_passes {
                let discarded: usize = batch.iter().map(|e| e.events.len()).sum();
                error!(
                    passes = report.passes,
                    discarded, "reactions kept triggering each other; discarding remaining events"
                );
                outcome = Err(LoopError::RunawayReactions {
                    passes: report.passes,
                });
                break;
            }
            report.passes += 1;
            self.deliver(batch, &mut report);
        }

        trace!(
            calls = report.calls,
            reactions = report.reactions,
            passes = report.passes,
            failures = report.failures,
            "flush complete"
        );
        outcome.map(|()| report)
    }

    /// Discard deferred calls, undelivered events and coalesced changes, and
    /// return to idle. Flush callbacks already handed to the host become
    /// no-ops.
    pub fn reset(&self) {
        let inner = &self.0;
        let discarded = (
            std::mem::take(&mut *inner.calls.borrow_mut()),
            inner.pending.borrow_mut().take_all(),
            std::mem::take(&mut *inner.changes.borrow_mut()),
        );
        inner.sequence.set(0);
        inner.generation.set(inner.generation.get() + 1);
        inner.epoch.set(inner.epoch.get() + 1);
        inner.queued.borrow_mut().clear();
        inner.scheduled.set(false);
        debug!(
            generation = inner.generation.get(),
            calls = discarded.0.len(),
            reactions = discarded.1.len(),
            "loop reset"
        );
        drop(discarded);
    }

    /// Run `f` with eager delivery suspended. When the outermost block ends
    /// outside a flush, a flush runs.
    ///
    /// The closure always runs to completion. If the closing flush fails,
    /// its error is returned and the closure's value is dropped; the
    /// closure's side effects (assignments, emitted events) still stand.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, LoopError> {
        let out = {
            let _scope = self.enter(Scope::Batch);
            f()
        };
        if self.0.scopes.borrow().is_empty() && !self.0.flushing.get() {
            self.iter()?;
        }
        Ok(out)
    }

    /// Whether an action or a batch block is open.
    pub fn is_processing_actions(&self) -> bool {
        self.0
            .scopes
            .borrow()
            .iter()
            .any(|s| matches!(s, Scope::Action(_) | Scope::Batch))
    }

    /// Install a host scheduler: `host` receives a task and must run it
    /// "soon", outside the current call stack.
    ///
    /// With `reset`, pending state is discarded first (see
    /// [`reset`](Self::reset)). If work is pending afterwards, a flush is
    /// requested from the new host.
    pub fn integrate<F>(&self, host: F, reset: bool) -> Result<(), LoopError>
    where
        F: Fn(Task) + 'static,
    {
        if self.0.flushing.get() {
            return Err(LoopError::IntegrateDuringFlush);
        }
        *self.0.host.borrow_mut() = Some(Rc::new(host));
        if reset {
            self.reset();
        }
        debug!(reset, "integrated host scheduler");
        if self.has_pending() {
            self.request_flush();
        }
        Ok(())
    }

    fn request_flush(&self) {
        self.0.scheduled.set(true);
        let Some(host) = self.0.host.borrow().clone() else {
            return;
        };
        let weak: Weak<LoopInner> = Rc::downgrade(&self.0);
        let generation = self.0.generation.get();
        host(Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let lp = Loop(inner);
            if lp.generation() != generation {
                trace!(generation, "ignoring flush requested before reset");
                return;
            }
            if let Err(err) = lp.iter() {
                error!(error = %err, "scheduled flush failed");
            }
        }));
    }

    fn deliver(&self, mut batch: Vec<PendingEntry>, report: &mut FlushReport) {
        batch.sort_by_key(|e| e.reaction.id());
        for entry in batch {
            if entry.events.is_empty() {
                continue;
            }
            let Some(reaction) = entry.reaction.upgrade() else {
                continue;
            };
            // Replayed init events may arrive after newer ones.
            let mut events = entry.events;
            events.sort_by_key(Event::sequence);
            match catch_unwind(AssertUnwindSafe(|| reaction.invoke(&events))) {
                Ok(None) => {}
                Ok(Some(Ok(()))) => report.reactions += 1,
                Ok(Some(Err(err))) => {
                    report.reactions += 1;
                    report.failures += 1;
                    error!(reaction = reaction.name(), error = %err, "reaction failed");
                }
                Err(panic) => {
                    report.reactions += 1;
                    report.failures += 1;
                    error!(
                        reaction = reaction.name(),
                        panic = panic_message(&*panic),
                        "reaction panicked"
                    );
                }
            }
        }
    }

    fn deliver_eager(&self) {
        let inner = &self.0;
        if inner.delivering_eager.replace(true) {
            return;
        }
        let _delivering = FlagGuard(&inner.delivering_eager);
        let mut report = FlushReport::default();
        while inner.pending.borrow().has_eager() {
            if report.passes >= inner.config.max_drain_passes {
                error!(
                    passes = report.passes,
                    "eager reactions kept triggering each other; deferring the rest to the next flush"
                );
                break;
            }
            report.passes += 1;
            let batch = inner.pending.borrow_mut().take_eager();
            self.deliver(batch, &mut report);
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.0.epoch.get()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        let seq = self.0.sequence.get();
        self.0.sequence.set(seq + 1);
        seq
    }

    pub(crate) fn enter(&self, scope: Scope) -> ScopeGuard {
        self.0.scopes.borrow_mut().push(scope);
        ScopeGuard { lp: self.clone() }
    }

    fn exit_scope(&self) {
        let (closed, action_open, empty) = {
            let mut scopes = self.0.scopes.borrow_mut();
            let closed = scopes.pop();
            let action_open = scopes.iter().any(|s| matches!(s, Scope::Action(_)));
            (closed, action_open, scopes.is_empty())
        };
        // Assignments made before a panic stay applied, so they are still
        // announced when the outermost action unwinds.
        if matches!(closed, Some(Scope::Action(_))) && !action_open {
            self.flush_changes();
        }
        if std::thread::panicking() {
            return;
        }
        if empty && !self.0.flushing.get() {
            self.deliver_eager();
        }
    }

    pub(crate) fn in_action(&self) -> bool {
        self.0
            .scopes
            .borrow()
            .iter()
            .any(|s| matches!(s, Scope::Action(_)))
    }

    pub(crate) fn in_action_of(&self, id: ComponentId) -> bool {
        self.0.scopes.borrow().contains(&Scope::Action(id))
    }

    pub(crate) fn record_change(&self, component: &Component, property: &str, old: Value) {
        let mut changes = self.0.changes.borrow_mut();
        let seen = changes
            .iter()
            .any(|c| c.component.id() == component.id() && c.property == property);
        if !seen {
            changes.push(Change {
                component: component.downgrade(),
                property: property.to_owned(),
                old,
            });
        }
    }

    fn flush_changes(&self) {
        let changes = std::mem::take(&mut *self.0.changes.borrow_mut());
        for change in changes {
            if let Some(component) = change.component.upgrade() {
                component.emit_coalesced(&change.property, change.old);
            }
        }
    }

    /// Queue `event` for `reaction`. An event already queued for the same
    /// reaction under the same label since the last flush started is
    /// dropped, so re-subscribing during a capture window cannot replay it
    /// twice.
    pub(crate) fn add_reaction_event(&self, reaction: &Reaction, eager: bool, event: Event) {
        let key = (reaction.id(), event.sequence(), event.label().to_owned());
        if !self.0.queued.borrow_mut().insert(key) {
            trace!(
                reaction = reaction.name(),
                sequence = event.sequence(),
                "event already queued for reaction"
            );
            return;
        }
        self.0
            .pending
            .borrow_mut()
            .push(reaction.downgrade(), eager, event);
        if !self.0.flushing.get() && !self.0.scheduled.get() {
            self.request_flush();
        }
    }

    pub(crate) fn discard_pending(&self, id: ReactionId) {
        let removed = self.0.pending.borrow_mut().remove(id);
        drop(removed);
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("phase", &self.phase())
            .field("generation", &self.generation())
            .field("calls", &self.0.calls.borrow().len())
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ComponentClass;
    use crate::descriptor::{ActionDescriptor, PropertyDescriptor, ReactionDescriptor};
    use crate::payload;
    use tracing_test::traced_test;

    #[test]
    fn test_phases_without_host() {
        let lp = Loop::new();
        assert_eq!(lp.phase(), LoopPhase::Idle);
        lp.call_soon(|| ());
        assert_eq!(lp.phase(), LoopPhase::Scheduled);
        let report = lp.iter().unwrap();
        assert_eq!(report.calls, 1);
        assert_eq!(lp.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_call_soon_requests_host_once() {
        let lp = Loop::new();
        let requests = Rc::new(Cell::new(0));
        let counter = Rc::clone(&requests);
        lp.integrate(move |_task| counter.set(counter.get() + 1), true)
            .unwrap();
        lp.call_soon(|| ());
        lp.call_soon(|| ());
        lp.call_soon(|| ());
        assert_eq!(requests.get(), 1);
    }

    #[test]
    #[traced_test]
    fn test_failing_calls_are_isolated() {
        let lp = Loop::new();
        let ran = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&ran), Rc::clone(&ran));
        lp.call_soon(move || {
            a.borrow_mut().push(1);
            Err::<(), BoxError>("boom".into())
        });
        lp.call_soon(|| -> () { panic!("kaboom") });
        lp.call_soon(move || b.borrow_mut().push(3));
        let report = lp.iter().unwrap();
        assert_eq!(*ran.borrow(), [1, 3]);
        assert_eq!(report.calls, 3);
        assert_eq!(report.failures, 2);
        assert!(logs_contain("deferred call failed"));
        assert!(logs_contain("kaboom"));
    }

    #[test]
    #[traced_test]
    fn test_reentrant_iter_is_rejected() {
        let lp = Loop::new();
        let inner = lp.clone();
        let seen = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&seen);
        lp.call_soon(move || {
            *slot.borrow_mut() = Some(inner.iter());
        });
        lp.iter().unwrap();
        assert_eq!(*seen.borrow(), Some(Err(LoopError::Reentrant)));
        assert!(logs_contain("cannot call iter() from within iter()"));
    }

    #[test]
    fn test_reset_discards_and_invalidates_host_callbacks() {
        let lp = Loop::new();
        let tasks: Rc<RefCell<Vec<Task>>> = Rc::default();
        let sink = Rc::clone(&tasks);
        lp.integrate(move |task| sink.borrow_mut().push(task), false)
            .unwrap();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        lp.call_soon(move || flag.set(true));
        assert_eq!(tasks.borrow().len(), 1);

        lp.reset();
        assert_eq!(lp.phase(), LoopPhase::Idle);
        assert!(!lp.has_pending());
        for task in tasks.borrow_mut().drain(..) {
            task();
        }
        assert!(!ran.get());
        assert_eq!(lp.iter().unwrap(), FlushReport::default());
    }

    #[test]
    fn test_runaway_reactions_are_bounded() {
        let lp = Loop::with_config(LoopConfig::default().with_max_drain_passes(5));
        let class = ComponentClass::builder("Echo")
            .reaction(ReactionDescriptor::new("echo", &["!ping"], |c, _| {
                c.emit("ping", payload! {}).map(drop)
            }))
            .build()
            .unwrap();
        let c = Component::new(&class, &lp).unwrap();
        c.emit("ping", payload! {}).unwrap();
        let err = lp.iter().unwrap_err();
        assert_eq!(err, LoopError::RunawayReactions { passes: 5 });
        assert_eq!(lp.pending_events(), 0);
        assert_eq!(lp.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_batch_suspends_eager_delivery() {
        let lp = Loop::new();
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        let class = ComponentClass::builder("Flag")
            .property(PropertyDescriptor::bool("on").settable())
            .build()
            .unwrap();
        let c = Component::new(&class, &lp).unwrap();
        lp.iter().unwrap();
        c.react("watch", &["!on"], move |_, events| {
            counter.set(counter.get() + events.len());
        })
        .unwrap();

        lp.batch(|| {
            assert!(lp.is_processing_actions());
            c.call("set_on", &[Value::Bool(true)]).unwrap();
            assert_eq!(count.get(), 0);
        })
        .unwrap();
        assert_eq!(count.get(), 1);
        assert!(!lp.is_processing_actions());
    }

    #[test]
    fn test_integrate_during_flush_fails() {
        let lp = Loop::new();
        let inner = lp.clone();
        let seen = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&seen);
        lp.call_soon(move || {
            *slot.borrow_mut() = Some(inner.integrate(|_| {}, true));
        });
        lp.iter().unwrap();
        assert_eq!(*seen.borrow(), Some(Err(LoopError::IntegrateDuringFlush)));
    }

    #[test]
    fn test_nested_actions_emit_once() {
        let lp = Loop::new();
        let class = ComponentClass::builder("Nest")
            .property(PropertyDescriptor::int("x"))
            .action(ActionDescriptor::new("a", |c, _| c.set("x", 1)))
            .action(ActionDescriptor::new("b", |c, _| c.set("x", 2)))
            .action(ActionDescriptor::new("outer", |c, _| {
                c.call("a", &[])?;
                c.call("b", &[])
            }))
            .build()
            .unwrap();
        let c = Component::new(&class, &lp).unwrap();
        lp.iter().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        c.react("r", &["x"], move |_, events| {
            sink.borrow_mut()
                .extend(events.iter().filter_map(|e| e.new_value().cloned()));
        })
        .unwrap();
        c.call("outer", &[]).unwrap();
        lp.iter().unwrap();
        assert_eq!(*seen.borrow(), [Value::Int(2)]);
    }
}
