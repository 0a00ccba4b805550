//! # quiver-core
//!
//! The reactive state-propagation engine behind Quiver.
//!
//! # Object Model
//!
//! A [`ComponentClass`] is an explicit member table built once by a
//! [`ClassBuilder`]. It declares four kinds of members:
//!
//! - **Properties** ([`PropertyDescriptor`]): validated slots. Assigning a
//!   different value queues a change event named after the property.
//! - **Actions** ([`ActionDescriptor`]): mutators. Read-only properties can
//!   only be assigned while an action of their component runs, and all
//!   changes made during the outermost action are coalesced into one event
//!   per property.
//! - **Emitters** ([`EmitterDescriptor`]): functions that compute a payload
//!   and queue an event named after the emitter.
//! - **Reactions** ([`ReactionDescriptor`]): handlers bound to connection
//!   strings such as `"value"`, `"!clicked"` or `"children*.value:label"`.
//!
//! A [`Component`] instantiates a class on a [`Loop`].
//!
//! # Scheduling
//!
//! The [`Loop`] batches delivery. A flush runs deferred calls first, then
//! invokes every reaction with pending events exactly once per pass, with
//! all of its events in queue order. Eager (`!`) connections are delivered
//! as soon as the outermost action or emitter call returns.
//!
//! # Error Types
//!
//! - [`QuiverError`] - Top-level error type
//! - [`ValidationError`] - Property validation failures
//! - [`ConnectionError`] - Malformed or unresolvable connection strings
//! - [`LoopError`] - Scheduler misuse
//! - [`ComponentError`] - Member misuse
//! - [`DeclarationError`] - Inconsistent class declarations

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod class;
mod component;
mod config;
mod connection;
mod descriptor;
mod error;
mod event;
pub(crate) mod r#loop;
mod outcome;
mod reaction;
mod value;

// Re-exports
pub use class::{ClassBuilder, ComponentClass};
pub use component::{Component, ComponentId, WeakComponent};
pub use config::LoopConfig;
pub use connection::{Connection, ConnectionFlags, Part, Selector};
pub use descriptor::{
    ActionBody, ActionDescriptor, Descriptor, EmitterBody, EmitterDescriptor, PropertyDescriptor,
    PropertyKind, ReactionBody, ReactionDescriptor, Validator,
};
pub use error::{
    BoxError, ComponentError, ConnectionError, DeclarationError, LoopError, QuiverError,
    ValidationError,
};
pub use event::Event;
pub use r#loop::{FlushReport, Loop, LoopPhase, Task};
pub use outcome::{IntoEmission, IntoOutcome};
pub use reaction::{Reaction, ReactionId};
pub use value::{Payload, Value};
