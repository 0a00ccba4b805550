//! Component instances.
//!
//! A [`Component`] holds one validated slot per declared property, the
//! subscriptions other reactions hold on its event types, and the reactions
//! it owns. Handles are reference counted; dropping the last one drops the
//! component together with its reactions, and anything still queued for them
//! is skipped at delivery time.

use crate::class::ComponentClass;
use crate::connection::Connection;
use crate::descriptor::{Descriptor, ReactionBody};
use crate::error::{ComponentError, QuiverError};
use crate::event::Event;
use crate::outcome::IntoOutcome;
use crate::reaction::{Reaction, WeakReaction};
use crate::r#loop::{Loop, Scope};
use crate::value::{Payload, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// What a subscription does when its event type fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// Queue the event for the reaction.
    Deliver { eager: bool },
    /// Re-resolve connection `index` of the reaction.
    Reconnect(usize),
}

/// One subscription on a component's event type.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) reaction: WeakReaction,
    pub(crate) label: String,
    pub(crate) kind: EntryKind,
}

impl HandlerEntry {
    fn same_slot(&self, other: &HandlerEntry) -> bool {
        let kinds_match = match (self.kind, other.kind) {
            (EntryKind::Deliver { .. }, EntryKind::Deliver { .. }) => true,
            (a, b) => a == b,
        };
        kinds_match && self.reaction.id() == other.reaction.id() && self.label == other.label
    }
}

#[derive(Default)]
struct State {
    values: BTreeMap<String, Value>,
    handlers: BTreeMap<String, Vec<HandlerEntry>>,
    being_set: BTreeSet<String>,
    ever_set: BTreeSet<String>,
    reactions: BTreeMap<String, Reaction>,
    external: Vec<Reaction>,
    captured: Vec<Event>,
    capture_epoch: Option<u64>,
    disposed: bool,
}

pub(crate) struct ComponentInner {
    id: ComponentId,
    class: Rc<ComponentClass>,
    lp: Loop,
    state: RefCell<State>,
}

impl Drop for ComponentInner {
    fn drop(&mut self) {
        debug!(component = %self.id, class = self.class.name(), "dropping component");
    }
}

/// A shared handle to a component instance.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

/// Releases a property's re-entrancy mark when dropped, including when the
/// validator unwinds.
struct SettingGuard<'a> {
    state: &'a RefCell<State>,
    name: &'a str,
}

impl Drop for SettingGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().being_set.remove(self.name);
    }
}

/// A non-owning handle to a component.
#[derive(Clone)]
pub struct WeakComponent {
    id: ComponentId,
    inner: Weak<ComponentInner>,
}

impl WeakComponent {
    /// Identity of the component, available after it was dropped.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The component, if it is still alive.
    pub fn upgrade(&self) -> Option<Component> {
        self.inner.upgrade().map(Component)
    }
}

impl fmt::Debug for WeakComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakComponent({})", self.id)
    }
}

impl Component {
    /// Instantiate `class` on `lp` with default values.
    pub fn new(class: &Rc<ComponentClass>, lp: &Loop) -> Result<Self, QuiverError> {
        Self::with_values(class, lp, Vec::<(String, Value)>::new())
    }

    /// Instantiate `class` on `lp` and assign initial values.
    ///
    /// Construction validates the defaults, queues one change event per
    /// property (old and new value equal, alphabetical order), binds the
    /// class reactions in alphabetical order, and finally applies `values`
    /// as if from an action of the new component.
    pub fn with_values<I, K, V>(
        class: &Rc<ComponentClass>,
        lp: &Loop,
        values: I,
    ) -> Result<Self, QuiverError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut slots = BTreeMap::new();
        for name in class.properties() {
            if let Some(p) = class.property(name) {
                let value = p
                    .validate(&Value::Null, p.default_value().clone())
                    .map_err(|source| QuiverError::Validation {
                        property: name.to_owned(),
                        source,
                    })?;
                slots.insert(name.to_owned(), value);
            }
        }

        let state = State {
            values: slots.clone(),
            capture_epoch: lp.config().capture_init_events.then(|| lp.epoch()),
            ..State::default()
        };
        let component = Component(Rc::new(ComponentInner {
            id: ComponentId::next(),
            class: Rc::clone(class),
            lp: lp.clone(),
            state: RefCell::new(state),
        }));

        for (name, value) in slots {
            component.emit_change(&name, value.clone(), value);
        }

        for name in class.reactions() {
            let (Some(Descriptor::Reaction(descriptor)), Some(connections)) =
                (class.member(name), class.connections(name))
            else {
                continue;
            };
            let reaction =
                Reaction::bind(&component, name, connections.to_vec(), descriptor.body())?;
            component
                .0
                .state
                .borrow_mut()
                .reactions
                .insert(name.to_owned(), reaction);
        }

        let values: Vec<(String, Value)> =
            values.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if !values.is_empty() {
            let _scope = lp.enter(Scope::Action(component.id()));
            for (name, value) in values {
                component.set(&name, value)?;
            }
        }

        debug!(component = %component.id(), class = class.name(), "created component");
        Ok(component)
    }

    /// Process-unique identity.
    pub fn id(&self) -> ComponentId {
        self.0.id
    }

    /// The class this component was instantiated from.
    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.0.class
    }

    /// The loop this component schedules work on.
    pub fn event_loop(&self) -> &Loop {
        &self.0.lp
    }

    /// A non-owning handle.
    pub fn downgrade(&self) -> WeakComponent {
        WeakComponent {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    /// Whether both handles point at the same component.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Result<Value, ComponentError> {
        self.0
            .state
            .borrow()
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown_property(name))
    }

    /// Assign a property.
    ///
    /// Read-only properties may only be assigned while an action of this
    /// component runs. The validator sees `(current, value)`; if it fails the
    /// slot keeps its value. An unchanged result queues nothing. Inside an
    /// action the change is coalesced until the outermost action returns,
    /// otherwise the change event is queued right away.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), QuiverError> {
        let Some(property) = self.0.class.property(name) else {
            return Err(self.unknown_property(name).into());
        };
        let lp = &self.0.lp;
        if !property.is_settable() && !lp.in_action_of(self.id()) {
            return Err(ComponentError::NotSettable(name.to_owned()).into());
        }

        let old = {
            let mut state = self.0.state.borrow_mut();
            if state.disposed {
                return Err(ComponentError::Disposed.into());
            }
            if !state.being_set.insert(name.to_owned()) {
                return Err(ComponentError::ReentrantSet(name.to_owned()).into());
            }
            state.values.get(name).cloned().unwrap_or_default()
        };

        let validated = {
            let _setting = SettingGuard {
                state: &self.0.state,
                name,
            };
            property.validate(&old, value.into())
        };

        let mut state = self.0.state.borrow_mut();
        let new = validated.map_err(|source| QuiverError::Validation {
            property: name.to_owned(),
            source,
        })?;
        state.ever_set.insert(name.to_owned());
        if new == old {
            return Ok(());
        }
        state.values.insert(name.to_owned(), new.clone());
        drop(state);

        if lp.in_action() {
            lp.record_change(self, name, old);
        } else {
            self.emit_change(name, old, new);
        }
        Ok(())
    }

    /// Whether the property was ever explicitly assigned (including
    /// assignments that left the value unchanged).
    pub fn was_set(&self, name: &str) -> bool {
        self.0.state.borrow().ever_set.contains(name)
    }

    /// Snapshot of all property values.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.0.state.borrow().values.clone()
    }

    /// Invoke an action or an emitter.
    ///
    /// When the outermost action or emitter call returns (outside batch
    /// blocks and flushes), coalesced changes are queued and reactions with
    /// pending eager events run before this method returns.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<(), QuiverError> {
        if self.is_disposed() {
            return Err(ComponentError::Disposed.into());
        }
        let body_error = |source| QuiverError::Body {
            member: name.to_owned(),
            source,
        };
        match self.0.class.member(name) {
            Some(Descriptor::Action(action)) => {
                let body = action.body();
                let _scope = self.0.lp.enter(Scope::Action(self.id()));
                body(self, args).map_err(body_error)
            }
            Some(Descriptor::Emitter(emitter)) => {
                let body = emitter.body();
                let _scope = self.0.lp.enter(Scope::Emitter);
                if let Some(payload) = body(self, args).map_err(body_error)? {
                    self.emit_event(name, payload);
                }
                Ok(())
            }
            _ => Err(ComponentError::UnknownMember {
                class: self.0.class.name().to_owned(),
                name: name.to_owned(),
            }
            .into()),
        }
    }

    /// Queue a raw event of type `kind`. Nothing is delivered until the next
    /// flush or the next outermost action or emitter call returns.
    pub fn emit(&self, kind: &str, payload: Payload) -> Result<Event, ComponentError> {
        if kind.contains(':') {
            return Err(ComponentError::LabelNotAllowed(kind.to_owned()));
        }
        if self.is_disposed() {
            return Err(ComponentError::Disposed);
        }
        Ok(self.emit_event(kind, payload))
    }

    /// Bind an ad-hoc reaction owned by this component.
    pub fn react<F, R, S>(
        &self,
        name: impl Into<String>,
        connections: &[S],
        body: F,
    ) -> Result<Reaction, QuiverError>
    where
        F: Fn(&Component, &[Event]) -> R + 'static,
        R: IntoOutcome,
        S: AsRef<str>,
    {
        if self.is_disposed() {
            return Err(ComponentError::Disposed.into());
        }
        let name = name.into();
        let connections = Connection::parse_all(connections)?;
        let body: ReactionBody = Rc::new(move |c, events| body(c, events).into_outcome());
        let reaction = Reaction::bind(self, &name, connections, body)?;
        self.0.state.borrow_mut().external.push(reaction.clone());
        Ok(reaction)
    }

    /// The instance of a class reaction.
    pub fn reaction(&self, name: &str) -> Option<Reaction> {
        self.0.state.borrow().reactions.get(name).cloned()
    }

    /// Remove subscriptions on `kind`, optionally narrowed by a `:label`
    /// suffix and by reaction.
    pub fn disconnect(&self, kind: &str, reaction: Option<&Reaction>) {
        let (kind, label) = match kind.split_once(':') {
            Some((kind, label)) => (kind, Some(label)),
            None => (kind, None),
        };
        let mut state = self.0.state.borrow_mut();
        if let Some(entries) = state.handlers.get_mut(kind) {
            entries.retain(|e| {
                let label_matches = label.is_none_or(|l| e.label == l);
                let reaction_matches = reaction.is_none_or(|r| e.reaction.id() == r.id());
                !(label_matches && reaction_matches)
            });
        }
    }

    /// Declared event types plus any type that currently has subscribers, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let state = self.0.state.borrow();
        let mut types: BTreeSet<String> = self
            .0
            .class
            .event_types()
            .into_iter()
            .map(str::to_owned)
            .collect();
        types.extend(
            state
                .handlers
                .iter()
                .filter(|(_, entries)| !entries.is_empty())
                .map(|(kind, _)| kind.clone()),
        );
        types.into_iter().collect()
    }

    /// Reactions that receive events of `kind`, ordered by label, then by
    /// reaction creation order.
    pub fn event_handlers(&self, kind: &str) -> Result<Vec<Reaction>, ComponentError> {
        if kind.contains(':') {
            return Err(ComponentError::LabelNotAllowed(kind.to_owned()));
        }
        let state = self.0.state.borrow();
        let mut seen = BTreeSet::new();
        Ok(state
            .handlers
            .get(kind)
            .into_iter()
            .flatten()
            .filter(|e| matches!(e.kind, EntryKind::Deliver { .. }))
            .filter_map(|e| e.reaction.upgrade())
            .filter(|r| seen.insert(r.id()))
            .collect())
    }

    /// Disconnect this component from everything: its reactions are disposed
    /// and subscriptions on its event types are dropped.
    pub fn dispose(&self) {
        let (reactions, external) = {
            let mut state = self.0.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.handlers.clear();
            state.captured.clear();
            (
                std::mem::take(&mut state.reactions),
                std::mem::take(&mut state.external),
            )
        };
        for reaction in reactions.values().chain(&external) {
            reaction.dispose();
        }
        debug!(component = %self.id(), class = self.0.class.name(), "disposed component");
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.0.state.borrow().disposed
    }

    fn unknown_property(&self, name: &str) -> ComponentError {
        ComponentError::UnknownProperty {
            class: self.0.class.name().to_owned(),
            name: name.to_owned(),
        }
    }

    pub(crate) fn emit_change(&self, name: &str, old: Value, new: Value) {
        let mut payload = Payload::new();
        payload.insert("old_value".into(), old);
        payload.insert("new_value".into(), new);
        payload.insert("mutation".into(), Value::from("set"));
        self.emit_event(name, payload);
    }

    /// Queue the change event for a property whose changes were coalesced.
    pub(crate) fn emit_coalesced(&self, name: &str, old: Value) {
        if self.is_disposed() {
            return;
        }
        if let Ok(new) = self.get(name) {
            self.emit_change(name, old, new);
        }
    }

    pub(crate) fn emit_event(&self, kind: &str, payload: Payload) -> Event {
        let lp = &self.0.lp;
        let event = Event::new(self.downgrade(), kind.to_owned(), payload, lp.next_sequence());
        let entries = {
            let mut state = self.0.state.borrow_mut();
            if Self::capturing(&state, lp) {
                state.captured.push(event.clone());
            } else if state.capture_epoch.take().is_some() {
                state.captured.clear();
            }
            state.handlers.get(kind).cloned().unwrap_or_default()
        };

        let mut dead = false;
        for entry in entries {
            let Some(reaction) = entry.reaction.upgrade() else {
                dead = true;
                continue;
            };
            match entry.kind {
                EntryKind::Reconnect(index) => reaction.reconnect(index),
                EntryKind::Deliver { eager } => {
                    lp.add_reaction_event(&reaction, eager, event.with_label(&entry.label));
                }
            }
        }
        if dead {
            if let Some(entries) = self.0.state.borrow_mut().handlers.get_mut(kind) {
                entries.retain(|e| e.reaction.is_alive());
            }
        }
        event
    }

    fn capturing(state: &State, lp: &Loop) -> bool {
        state.capture_epoch == Some(lp.epoch())
    }

    /// Add a subscription. Newly added delivery entries receive the
    /// component's captured init events.
    pub(crate) fn register(&self, kind: &str, entry: HandlerEntry) {
        let replay: Vec<Event> = {
            let mut state = self.0.state.borrow_mut();
            if state.disposed {
                return;
            }
            let entries = state.handlers.entry(kind.to_owned()).or_default();
            if let Some(existing) = entries.iter_mut().find(|e| e.same_slot(&entry)) {
                if let (EntryKind::Deliver { eager }, EntryKind::Deliver { eager: new }) =
                    (&mut existing.kind, entry.kind)
                {
                    *eager |= new;
                }
                return;
            }
            entries.push(entry.clone());
            entries.sort_by(|a, b| {
                (a.label.as_str(), a.reaction.id()).cmp(&(b.label.as_str(), b.reaction.id()))
            });
            match entry.kind {
                EntryKind::Deliver { .. } if Self::capturing(&state, &self.0.lp) => state
                    .captured
                    .iter()
                    .filter(|e| e.kind() == kind)
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            }
        };

        if let (EntryKind::Deliver { eager }, Some(reaction)) =
            (entry.kind, entry.reaction.upgrade())
        {
            for event in replay {
                self.0
                    .lp
                    .add_reaction_event(&reaction, eager, event.with_label(&entry.label));
            }
        }
    }

    /// Remove one subscription.
    pub(crate) fn unregister(&self, kind: &str, entry: &HandlerEntry) {
        if let Some(entries) = self.0.state.borrow_mut().handlers.get_mut(kind) {
            entries.retain(|e| !e.same_slot(entry));
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.0.id)
            .field("class", &self.0.class.name())
            .field("values", &self.0.state.borrow().values)
            .finish()
    }
}
