//! Member descriptors: the declarations a [`ComponentClass`] is built from.
//!
//! Four kinds exist:
//!
//! - [`PropertyDescriptor`] - a validated, reactive slot
//! - [`ActionDescriptor`] - an explicit mutator whose changes are coalesced
//! - [`EmitterDescriptor`] - a function producing synthetic events
//! - [`ReactionDescriptor`] - a handler bound to connection strings
//!
//! [`ComponentClass`]: crate::ComponentClass

use crate::component::Component;
use crate::error::{BoxError, ValidationError};
use crate::event::Event;
use crate::outcome::{IntoEmission, IntoOutcome};
use crate::value::{Payload, Value};
use std::fmt;
use std::rc::Rc;

/// Validator run on every assignment: `(old, new) -> coerced`.
pub type Validator = Rc<dyn Fn(&Value, Value) -> Result<Value, ValidationError>>;
/// Body of an action.
pub type ActionBody = Rc<dyn Fn(&Component, &[Value]) -> Result<(), BoxError>>;
/// Body of an emitter.
pub type EmitterBody = Rc<dyn Fn(&Component, &[Value]) -> Result<Option<Payload>, BoxError>>;
/// Body of a reaction.
pub type ReactionBody = Rc<dyn Fn(&Component, &[Event]) -> Result<(), BoxError>>;

/// The family a property belongs to; determines its default and coercion rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Accepts anything.
    Any,
    /// Converts any value by truthiness.
    Bool,
    /// Integers; floats are truncated and strings parsed.
    Int,
    /// Floats; integers are widened and strings parsed.
    Float,
    /// Strings only.
    Str,
    /// Lists only.
    List,
    /// A component or null.
    Component,
    /// A user-defined kind with its own validator.
    Custom(String),
}

impl PropertyKind {
    /// Stable name of the kind, used in metadata.
    pub fn name(&self) -> &str {
        match self {
            PropertyKind::Any => "any",
            PropertyKind::Bool => "bool",
            PropertyKind::Int => "int",
            PropertyKind::Float => "float",
            PropertyKind::Str => "string",
            PropertyKind::List => "list",
            PropertyKind::Component => "component",
            PropertyKind::Custom(name) => name,
        }
    }

    /// Look up a built-in kind by name.
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "any" => PropertyKind::Any,
            "bool" => PropertyKind::Bool,
            "int" => PropertyKind::Int,
            "float" => PropertyKind::Float,
            "string" => PropertyKind::Str,
            "list" => PropertyKind::List,
            "component" => PropertyKind::Component,
            _ => return None,
        })
    }

    /// Default value of a built-in kind.
    pub fn default_value(&self) -> Value {
        match self {
            PropertyKind::Bool => Value::Bool(false),
            PropertyKind::Int => Value::Int(0),
            PropertyKind::Float => Value::Float(0.0),
            PropertyKind::Str => Value::Str(String::new()),
            PropertyKind::List => Value::List(Vec::new()),
            PropertyKind::Any | PropertyKind::Component | PropertyKind::Custom(_) => Value::Null,
        }
    }

    /// Validator of a built-in kind. Custom kinds accept anything here.
    pub fn validator(&self) -> Validator {
        match self {
            PropertyKind::Any | PropertyKind::Custom(_) => Rc::new(|_, new| Ok(new)),
            PropertyKind::Bool => Rc::new(|_, new| Ok(Value::Bool(new.truthy()))),
            PropertyKind::Int => Rc::new(|_, new| coerce_int(new)),
            PropertyKind::Float => Rc::new(|_, new| coerce_float(new)),
            PropertyKind::Str => Rc::new(|_, new| match new {
                Value::Str(_) => Ok(new),
                other => Err(mismatch("string", &other)),
            }),
            PropertyKind::List => Rc::new(|_, new| match new {
                Value::List(_) => Ok(new),
                other => Err(mismatch("list", &other)),
            }),
            PropertyKind::Component => Rc::new(|_, new| match new {
                Value::Null | Value::Component(_) => Ok(new),
                other => Err(mismatch("component", &other)),
            }),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

fn coerce_int(value: Value) -> Result<Value, ValidationError> {
    match value {
        Value::Int(_) => Ok(value),
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ValidationError::Parse {
                input: s,
                expected: "int",
            }),
        other => Err(mismatch("int", &other)),
    }
}

fn coerce_float(value: Value) -> Result<Value, ValidationError> {
    match value {
        Value::Float(_) => Ok(value),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ValidationError::Parse {
                input: s,
                expected: "float",
            }),
        other => Err(mismatch("float", &other)),
    }
}

/// Declaration of a property slot.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    default: Value,
    settable: bool,
    doc: String,
    validator: Validator,
}

impl PropertyDescriptor {
    /// Create a property of a built-in kind with the kind's default value.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            default: kind.default_value(),
            validator: kind.validator(),
            kind,
            settable: false,
            doc: String::new(),
        }
    }

    /// A property that accepts any value.
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Any)
    }

    /// A boolean property.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Bool)
    }

    /// An integer property.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Int)
    }

    /// A float property.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Float)
    }

    /// A string property.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Str)
    }

    /// A list property.
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::List)
    }

    /// A property holding a component or null.
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Component)
    }

    /// A property of a user-defined kind.
    pub fn custom<F>(name: impl Into<String>, kind: impl Into<String>, default: Value, validator: F) -> Self
    where
        F: Fn(&Value, Value) -> Result<Value, ValidationError> + 'static,
    {
        Self {
            name: name.into(),
            kind: PropertyKind::Custom(kind.into()),
            default,
            settable: false,
            doc: String::new(),
            validator: Rc::new(validator),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Allow assignment from outside actions and generate a `set_<name>` action.
    pub fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    /// Attach documentation.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub(crate) fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The property kind.
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// The declared default value (before validation).
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Whether the property may be assigned from outside actions.
    pub fn is_settable(&self) -> bool {
        self.settable
    }

    /// Documentation string.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Run the validator.
    pub fn validate(&self, old: &Value, new: Value) -> Result<Value, ValidationError> {
        (self.validator)(old, new)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("settable", &self.settable)
            .finish_non_exhaustive()
    }
}

/// Declaration of an action.
#[derive(Clone)]
pub struct ActionDescriptor {
    name: String,
    doc: String,
    body: ActionBody,
}

impl ActionDescriptor {
    /// Wrap a function as an action.
    pub fn new<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Component, &[Value]) -> R + 'static,
        R: IntoOutcome,
    {
        Self {
            name: name.into(),
            doc: String::new(),
            body: Rc::new(move |c, args| body(c, args).into_outcome()),
        }
    }

    /// Attach documentation.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// The action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation string.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub(crate) fn body(&self) -> ActionBody {
        self.body.clone()
    }
}

/// Declaration of an emitter.
#[derive(Clone)]
pub struct EmitterDescriptor {
    name: String,
    doc: String,
    body: EmitterBody,
}

impl EmitterDescriptor {
    /// Wrap a function as an emitter. The function computes the payload.
    pub fn new<F, R>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Component, &[Value]) -> R + 'static,
        R: IntoEmission,
    {
        Self {
            name: name.into(),
            doc: String::new(),
            body: Rc::new(move |c, args| body(c, args).into_emission()),
        }
    }

    /// Attach documentation.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// The emitter name; also the type of the events it produces.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation string.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub(crate) fn body(&self) -> EmitterBody {
        self.body.clone()
    }
}

/// Declaration of a reaction.
#[derive(Clone)]
pub struct ReactionDescriptor {
    name: String,
    connections: Vec<String>,
    body: ReactionBody,
}

impl ReactionDescriptor {
    /// Bind a function to one or more connection strings.
    pub fn new<F, R, S>(name: impl Into<String>, connections: &[S], body: F) -> Self
    where
        F: Fn(&Component, &[Event]) -> R + 'static,
        R: IntoOutcome,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            connections: connections.iter().map(|s| s.as_ref().to_owned()).collect(),
            body: Rc::new(move |c, events| body(c, events).into_outcome()),
        }
    }

    /// The reaction name; the default label of its subscriptions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The connection strings, as declared.
    pub fn connections(&self) -> &[String] {
        &self.connections
    }

    pub(crate) fn body(&self) -> ReactionBody {
        self.body.clone()
    }
}

/// Any member of a component class.
#[derive(Clone)]
pub enum Descriptor {
    /// A property slot.
    Property(PropertyDescriptor),
    /// An action.
    Action(ActionDescriptor),
    /// An emitter.
    Emitter(EmitterDescriptor),
    /// A reaction.
    Reaction(ReactionDescriptor),
}

impl Descriptor {
    /// The member name.
    pub fn name(&self) -> &str {
        match self {
            Descriptor::Property(p) => p.name(),
            Descriptor::Action(a) => a.name(),
            Descriptor::Emitter(e) => e.name(),
            Descriptor::Reaction(r) => r.name(),
        }
    }

    /// Lower-case name of the member kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Descriptor::Property(_) => "property",
            Descriptor::Action(_) => "action",
            Descriptor::Emitter(_) => "emitter",
            Descriptor::Reaction(_) => "reaction",
        }
    }
}
