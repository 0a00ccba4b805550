//! # quiver - Reactive State Propagation
//!
//! Components hold validated properties. Actions mutate them, emitters
//! produce synthetic events, and reactions observe both through connection
//! strings. A [`Loop`] batches delivery so each reaction sees all of its
//! pending events at once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quiver::prelude::*;
//!
//! let class = ComponentClass::builder("Counter")
//!     .property(PropertyDescriptor::int("count"))
//!     .action(ActionDescriptor::new("increment", |c, _| {
//!         let n = c.get("count")?.as_int().unwrap_or(0);
//!         c.set("count", n + 1)
//!     }))
//!     .reaction(ReactionDescriptor::new("show", &["count"], |c, events| {
//!         println!("count is {:?} after {} event(s)", c.get("count"), events.len());
//!     }))
//!     .build()?;
//!
//! let lp = Loop::new();
//! let counter = Component::new(&class, &lp)?;
//! counter.call("increment", &[])?;
//! lp.iter()?;
//! ```
//!
//! ## Connection Strings
//!
//! `[!]part(.part)*[:label]`, where each part is an identifier optionally
//! followed by `*` (each item of a list) or `**` (recursively through a
//! property of the same name). The last part is the event type.
//!
//! ## Features
//!
//! - `macros`: `#[reaction]`, `#[action]`, `#[emitter]`, `connection!` and
//!   `connections!`
//! - `tokio`: [`host::tokio_local`] for scheduling flushes on a `LocalSet`

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Declarations
pub use quiver_core::{
    ActionBody, ActionDescriptor, ClassBuilder, ComponentClass, Descriptor, EmitterBody,
    EmitterDescriptor, IntoEmission, IntoOutcome, PropertyDescriptor, PropertyKind, ReactionBody,
    ReactionDescriptor, Validator,
};

// Errors
pub use quiver_core::{
    BoxError, ComponentError, ConnectionError, DeclarationError, LoopError, QuiverError,
    ValidationError,
};

// Components
pub use quiver_core::{Component, ComponentId, Reaction, ReactionId, WeakComponent};

// Connections
pub use quiver_core::{Connection, ConnectionFlags, Part, Selector};

// Events
pub use quiver_core::{Event, Payload};

// Scheduling
pub use quiver_core::{FlushReport, Loop, LoopConfig, LoopPhase, Task};

// Values
pub use quiver_core::{Value, payload};

#[cfg(feature = "macros")]
pub use quiver_macros::{action, connection, connections, emitter, reaction};

/// Host scheduler adapters.
pub mod host {
    #![allow(clippy::wildcard_imports)]
    pub use quiver_std::host::*;
}

/// Serializable class metadata.
pub mod metadata {
    #![allow(clippy::wildcard_imports)]
    pub use quiver_std::metadata::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use quiver_std::testing::*;
}

/// Prelude module - common imports for Quiver.
///
/// # Usage
///
/// ```rust,ignore
/// use quiver::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ActionDescriptor, ClassBuilder, Component, ComponentClass, EmitterDescriptor, Event, Loop,
        LoopConfig, Payload, PropertyDescriptor, QuiverError, Reaction, ReactionDescriptor, Value,
        payload,
    };
}
