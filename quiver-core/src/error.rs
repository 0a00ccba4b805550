//! Error types for Quiver.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`QuiverError`] - Top-level error type for all Quiver operations
//! - [`ValidationError`] - A property validator rejected a value
//! - [`ConnectionError`] - A connection string is malformed or cannot be resolved
//! - [`LoopError`] - The loop scheduler was used incorrectly
//! - [`ComponentError`] - A component member was misused
//! - [`DeclarationError`] - A component class declaration is inconsistent

use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Quiver operations.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// A validator rejected the value assigned to a property.
    #[error("invalid value for property `{property}`: {source}")]
    Validation {
        /// The property being assigned.
        property: String,
        /// What the validator reported.
        #[source]
        source: ValidationError,
    },

    /// A connection string could not be parsed or resolved.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The loop scheduler was misused.
    #[error("loop error: {0}")]
    Loop(#[from] LoopError),

    /// A component member was misused.
    #[error("component error: {0}")]
    Component(#[from] ComponentError),

    /// A component class declaration is invalid.
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// The body of an action or emitter failed.
    #[error("`{member}` failed: {source}")]
    Body {
        /// The action or emitter that was invoked.
        member: String,
        /// The error returned by the body.
        #[source]
        source: BoxError,
    },

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors raised by property validators.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The value has a type the property cannot accept or coerce.
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        /// The kind of value the property holds.
        expected: &'static str,
        /// The type name of the rejected value.
        found: &'static str,
    },

    /// A string could not be parsed into the property's numeric kind.
    #[error("cannot parse {input:?} as {expected}")]
    Parse {
        /// The rejected input.
        input: String,
        /// The kind of value the property holds.
        expected: &'static str,
    },

    /// A custom validator rejected the value.
    #[error("{0}")]
    Rejected(String),
}

impl ValidationError {
    /// Shorthand for a custom rejection message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Errors that can occur while parsing or resolving connection strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// A reaction was declared without connection strings.
    #[error("a reaction needs one or more connection strings")]
    Empty,

    /// A connection string was empty.
    #[error("connection strings must be non-empty")]
    EmptyString,

    /// A path part is not an identifier (optionally followed by `*` or `**`).
    #[error("connection string {connection:?} contains non-identifier part {part:?}")]
    NonIdentifier {
        /// The full connection string.
        connection: String,
        /// The offending part.
        part: String,
    },

    /// An exclamation mark appeared somewhere other than the very start.
    #[error("connection string {0:?} may only start with `!`")]
    MisplacedBang(String),

    /// A path segment does not name a property of the component it is read from.
    #[error("invalid connection path {connection:?}: `{segment}` is not a property")]
    UnknownProperty {
        /// The full connection string.
        connection: String,
        /// The segment that could not be read.
        segment: String,
    },

    /// An intermediate value along the path is not a component.
    #[error("invalid connection path {connection:?}: `{segment}` is a {found}, not a component")]
    InvalidPath {
        /// The full connection string.
        connection: String,
        /// The segment whose value was not a component.
        segment: String,
        /// Type name of the value that was found.
        found: &'static str,
    },

    /// A `*` selector was applied to a property that does not hold a list.
    #[error("invalid connection {connection:?}: `{segment}` is not a list")]
    NotAList {
        /// The full connection string.
        connection: String,
        /// The segment carrying the `*` selector.
        segment: String,
    },

    /// Resolution produced no subscription at all.
    #[error("could not connect to {0:?}")]
    Unresolved(String),
}

/// Protocol-misuse errors of the loop scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// `iter()` was called while a flush was already running.
    #[error("cannot call iter() from within iter()")]
    Reentrant,

    /// Reactions kept producing events past the configured drain limit.
    #[error("reactions kept triggering each other for {passes} passes; remaining events were discarded")]
    RunawayReactions {
        /// Number of drain passes that ran.
        passes: usize,
    },

    /// `integrate()` was called while a flush was running.
    #[error("cannot integrate a host scheduler during a flush")]
    IntegrateDuringFlush,
}

/// Misuse of a component's members.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// The class declares no property of this name.
    #[error("{class} has no property `{name}`")]
    UnknownProperty {
        /// Class name of the component.
        class: String,
        /// Requested property.
        name: String,
    },

    /// The class declares no action or emitter of this name.
    #[error("{class} has no action or emitter `{name}`")]
    UnknownMember {
        /// Class name of the component.
        class: String,
        /// Requested member.
        name: String,
    },

    /// A read-only property was assigned outside one of its component's actions.
    #[error("cannot set property `{0}`; it can only be mutated by actions")]
    NotSettable(String),

    /// A property was assigned while its own validator was running.
    #[error("property `{0}` was assigned re-entrantly from its own validator")]
    ReentrantSet(String),

    /// An event type passed to `emit` or `event_handlers` carried a label.
    #[error("the event type {0:?} must not include a label")]
    LabelNotAllowed(String),

    /// The component has been disposed.
    #[error("component has been disposed")]
    Disposed,
}

/// Errors found while building a component class.
#[derive(Error, Debug)]
pub enum DeclarationError {
    /// The same member name was declared twice on one class.
    #[error("{class} declares `{name}` more than once")]
    Duplicate {
        /// The class being built.
        class: String,
        /// The duplicated member name.
        name: String,
    },

    /// A member overrides an inherited member of a different kind.
    #[error("{class} redeclares {inherited} `{name}` as {declared}")]
    KindConflict {
        /// The class being built.
        class: String,
        /// The member name.
        name: String,
        /// Kind of the inherited member.
        inherited: &'static str,
        /// Kind of the new declaration.
        declared: &'static str,
    },

    /// A proxy was declared for a property the base class does not have.
    #[error("{class} declares proxy `{name}` but no base class declares that property")]
    ProxyWithoutBase {
        /// The class being built.
        class: String,
        /// The proxied property name.
        name: String,
    },

    /// A property's default value does not pass its own validator.
    #[error("default of property `{name}` is invalid: {source}")]
    InvalidDefault {
        /// The property name.
        name: String,
        /// What the validator reported.
        #[source]
        source: ValidationError,
    },

    /// A reaction declares a malformed connection string.
    #[error("reaction `{reaction}`: {source}")]
    Connection {
        /// The reaction name.
        reaction: String,
        /// The parse failure.
        #[source]
        source: ConnectionError,
    },
}

// Convenience conversions
impl From<BoxError> for QuiverError {
    fn from(err: BoxError) -> Self {
        QuiverError::Custom(err)
    }
}
