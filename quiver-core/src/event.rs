//! Events queued on components and delivered to reactions.

use crate::component::{Component, ComponentId, WeakComponent};
use crate::value::{Payload, Value};

/// A queued event: `(source, kind, payload, sequence)` plus the label of the
/// subscription it was routed through.
#[derive(Clone, Debug)]
pub struct Event {
    source: WeakComponent,
    kind: String,
    label: String,
    payload: Payload,
    sequence: u64,
}

impl Event {
    pub(crate) fn new(source: WeakComponent, kind: String, payload: Payload, sequence: u64) -> Self {
        Self {
            source,
            kind,
            label: String::new(),
            payload,
            sequence,
        }
    }

    pub(crate) fn with_label(&self, label: &str) -> Self {
        let mut ev = self.clone();
        ev.label = label.to_owned();
        ev
    }

    /// The component that emitted this event, if it is still alive.
    pub fn source(&self) -> Option<Component> {
        self.source.upgrade()
    }

    /// Identity of the emitting component, available even after it was dropped.
    pub fn source_id(&self) -> ComponentId {
        self.source.id()
    }

    /// The event type, e.g. a property or emitter name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Label of the subscription that delivered the event; empty before routing.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Position in the loop's queue order for the current generation.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// All payload entries.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// A single payload entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// `old_value` of a property change event.
    pub fn old_value(&self) -> Option<&Value> {
        self.get("old_value")
    }

    /// `new_value` of a property change event.
    pub fn new_value(&self) -> Option<&Value> {
        self.get("new_value")
    }
}
