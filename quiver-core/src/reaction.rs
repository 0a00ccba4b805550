//! Reactions and connection resolution.
//!
//! A reaction resolves each of its connection strings to a list of
//! subscriptions, starting at its owner and walking component-valued
//! properties. Every property read along the way gets an implicit
//! *reconnect* subscription, so reassigning it re-resolves the path right
//! away. The old and new subscription lists are diffed and only the entries
//! that changed are disconnected or connected.

use crate::component::{Component, EntryKind, HandlerEntry, WeakComponent};
use crate::connection::{Connection, Part, Selector};
use crate::descriptor::ReactionBody;
use crate::error::{BoxError, ConnectionError};
use crate::event::Event;
use crate::r#loop::Loop;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

static NEXT_REACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a reaction. Ids increase in creation order,
/// which is also the order in which reactions run within a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReactionId(u64);

impl ReactionId {
    fn next() -> Self {
        Self(NEXT_REACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One resolved subscription of a connection.
#[derive(Clone)]
struct Target {
    component: WeakComponent,
    kind: String,
    label: String,
    entry: EntryKind,
}

impl Target {
    fn same(&self, other: &Target) -> bool {
        self.component.id() == other.component.id()
            && self.kind == other.kind
            && self.label == other.label
            && self.entry == other.entry
    }

    fn handler(&self, reaction: &WeakReaction) -> HandlerEntry {
        HandlerEntry {
            reaction: reaction.clone(),
            label: self.label.clone(),
            kind: self.entry,
        }
    }
}

struct Binding {
    connection: Connection,
    targets: Vec<Target>,
}

pub(crate) struct ReactionInner {
    id: ReactionId,
    name: String,
    owner: WeakComponent,
    lp: Loop,
    body: ReactionBody,
    bindings: RefCell<Vec<Binding>>,
    disposed: Cell<bool>,
}

/// A shared handle to a bound reaction.
#[derive(Clone)]
pub struct Reaction(Rc<ReactionInner>);

/// A non-owning handle to a reaction, as held by subscriptions and the loop.
#[derive(Clone)]
pub(crate) struct WeakReaction {
    id: ReactionId,
    inner: Weak<ReactionInner>,
}

impl WeakReaction {
    pub(crate) fn id(&self) -> ReactionId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<Reaction> {
        self.inner.upgrade().map(Reaction)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl Reaction {
    /// Create a reaction owned by `owner` and resolve all its connections.
    pub(crate) fn bind(
        owner: &Component,
        name: &str,
        connections: Vec<Connection>,
        body: ReactionBody,
    ) -> Result<Self, ConnectionError> {
        let count = connections.len();
        let reaction = Reaction(Rc::new(ReactionInner {
            id: ReactionId::next(),
            name: name.to_owned(),
            owner: owner.downgrade(),
            lp: owner.event_loop().clone(),
            body,
            bindings: RefCell::new(
                connections
                    .into_iter()
                    .map(|connection| Binding {
                        connection,
                        targets: Vec::new(),
                    })
                    .collect(),
            ),
            disposed: Cell::new(false),
        }));
        for index in 0..count {
            if let Err(err) = reaction.connect(index) {
                reaction.dispose();
                return Err(err);
            }
        }
        Ok(reaction)
    }

    /// The reaction name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Process-unique identity.
    pub fn id(&self) -> ReactionId {
        self.0.id
    }

    /// The component that owns this reaction, if it is still alive.
    pub fn owner(&self) -> Option<Component> {
        self.0.owner.upgrade()
    }

    /// Whether both handles point at the same reaction.
    pub fn ptr_eq(&self, other: &Reaction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// For each connection string: the string as written, and the
    /// `type:label` names of the subscriptions it currently resolves to.
    /// Implicit path subscriptions are labelled `reconnect_<index>`.
    pub fn connection_info(&self) -> Vec<(String, Vec<String>)> {
        self.0
            .bindings
            .borrow()
            .iter()
            .map(|b| {
                let names = b
                    .targets
                    .iter()
                    .map(|t| format!("{}:{}", t.kind, t.label))
                    .collect();
                (b.connection.fullname().to_owned(), names)
            })
            .collect()
    }

    /// Disconnect everything and drop events queued for this reaction.
    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        let bindings = std::mem::take(&mut *self.0.bindings.borrow_mut());
        let weak = self.downgrade();
        for target in bindings.iter().flat_map(|b| &b.targets) {
            if let Some(component) = target.component.upgrade() {
                component.unregister(&target.kind, &target.handler(&weak));
            }
        }
        self.0.lp.discard_pending(self.id());
        debug!(reaction = self.name(), id = %self.id(), "disposed reaction");
    }

    pub(crate) fn downgrade(&self) -> WeakReaction {
        WeakReaction {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    /// Run the body with a batch of events. `None` when the reaction or its
    /// owner is gone.
    pub(crate) fn invoke(&self, events: &[Event]) -> Option<Result<(), BoxError>> {
        if self.is_disposed() {
            return None;
        }
        let owner = self.0.owner.upgrade()?;
        if owner.is_disposed() {
            return None;
        }
        Some((self.0.body)(&owner, events))
    }

    /// Re-resolve connection `index` after a property along its path changed.
    pub(crate) fn reconnect(&self, index: usize) {
        if self.is_disposed() {
            return;
        }
        if let Err(err) = self.connect(index) {
            error!(reaction = self.name(), error = %err, "failed to re-resolve connection");
        }
    }

    fn connect(&self, index: usize) -> Result<(), ConnectionError> {
        let Some(connection) = self
            .0
            .bindings
            .borrow()
            .get(index)
            .map(|b| b.connection.clone())
        else {
            return Ok(());
        };
        let Some(owner) = self.0.owner.upgrade() else {
            return Err(ConnectionError::Unresolved(connection.fullname().to_owned()));
        };

        let mut targets = Vec::new();
        self.seek(index, &connection, connection.parts(), &owner, &mut targets)?;
        if targets.is_empty() {
            return Err(ConnectionError::Unresolved(connection.fullname().to_owned()));
        }

        let old = match self.0.bindings.borrow_mut().get_mut(index) {
            Some(binding) => std::mem::replace(&mut binding.targets, targets.clone()),
            None => return Ok(()),
        };
        self.apply_diff(&connection, &old, &targets);
        Ok(())
    }

    fn apply_diff(&self, connection: &Connection, old: &[Target], new: &[Target]) {
        let weak = self.downgrade();
        for target in old.iter().filter(|t| !new.iter().any(|n| n.same(t))) {
            if let Some(component) = target.component.upgrade() {
                component.unregister(&target.kind, &target.handler(&weak));
            }
        }
        for target in new.iter().filter(|t| !old.iter().any(|o| o.same(t))) {
            let Some(component) = target.component.upgrade() else {
                continue;
            };
            if matches!(target.entry, EntryKind::Deliver { .. })
                && !connection.is_eager()
                && self.0.lp.config().warn_unknown_events
                && !component.class().event_types().contains(&target.kind.as_str())
            {
                warn!(
                    reaction = self.name(),
                    connection = connection.fullname(),
                    class = component.class().name(),
                    "connecting to unknown event type `{}`",
                    target.kind
                );
            }
            component.register(&target.kind, target.handler(&weak));
        }
    }

    /// Walk `path` from `ob`, collecting the subscriptions it resolves to.
    fn seek(
        &self,
        index: usize,
        connection: &Connection,
        path: &[Part],
        ob: &Component,
        out: &mut Vec<Target>,
    ) -> Result<(), ConnectionError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(());
        };
        let selector = first.selector();

        if rest.is_empty() {
            out.push(Target {
                component: ob.downgrade(),
                kind: connection.event_type().to_owned(),
                label: connection.label_or(&self.0.name).to_owned(),
                entry: EntryKind::Deliver {
                    eager: connection.is_eager(),
                },
            });
            if !matches!(selector, Selector::Deep | Selector::Optional) {
                return Ok(());
            }
        }

        if selector == Selector::Optional {
            self.seek(index, connection, rest, ob, out)?;
        }

        let name = first.name();
        if !ob.class().has_property(name) {
            if selector == Selector::Optional {
                return Ok(());
            }
            return Err(ConnectionError::UnknownProperty {
                connection: connection.fullname().to_owned(),
                segment: name.to_owned(),
            });
        }
        out.push(Target {
            component: ob.downgrade(),
            kind: name.to_owned(),
            label: format!("reconnect_{index}"),
            entry: EntryKind::Reconnect(index),
        });
        let value = ob.get(name).unwrap_or_default();

        match (selector, value) {
            (Selector::Single, Value::Component(next)) => {
                self.seek(index, connection, rest, &next, out)
            }
            (_, Value::Null) if selector != Selector::Each => Ok(()),
            (Selector::Single, other) => Err(ConnectionError::InvalidPath {
                connection: connection.fullname().to_owned(),
                segment: name.to_owned(),
                found: other.type_name(),
            }),
            (Selector::Each, Value::List(items)) => {
                for item in items {
                    match item {
                        Value::Component(next) => self.seek(index, connection, rest, &next, out)?,
                        Value::Null => {}
                        other => {
                            return Err(ConnectionError::InvalidPath {
                                connection: connection.fullname().to_owned(),
                                segment: name.to_owned(),
                                found: other.type_name(),
                            });
                        }
                    }
                }
                Ok(())
            }
            (Selector::Each, _) => Err(ConnectionError::NotAList {
                connection: connection.fullname().to_owned(),
                segment: name.to_owned(),
            }),
            (_, Value::List(items)) => {
                let recursive: Vec<Part> = std::iter::once(Part::new(name, Selector::Optional))
                    .chain(rest.iter().cloned())
                    .collect();
                for item in items {
                    if let Value::Component(next) = item {
                        self.seek(index, connection, &recursive, &next, out)?;
                    }
                }
                Ok(())
            }
            (_, Value::Component(next)) => self.seek(index, connection, rest, &next, out),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = self.0.bindings.borrow().iter().map(|b| b.targets.len()).collect();
        f.debug_struct("Reaction")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("targets", &counts)
            .finish()
    }
}
