//! Descriptor metadata bridge.
//!
//! [`ClassMetadata`] is a serializable description of a [`ComponentClass`]:
//! property kinds, defaults and flags, and the names of actions, emitters
//! and reactions with their connection strings. Another runtime can rebuild
//! an equivalent class from it with a [`ClassLoader`], supplying the bodies
//! and custom validators itself.

use quiver_core::{
    ActionDescriptor, ClassBuilder, Component, ComponentClass, DeclarationError, Descriptor,
    EmitterDescriptor, Event, IntoOutcome, PropertyDescriptor, PropertyKind, ReactionBody,
    ReactionDescriptor, ValidationError, Validator, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Errors produced by the metadata bridge.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A default value cannot be expressed as JSON.
    #[error("default of property `{property}` cannot be serialized ({found})")]
    NotSerializable {
        /// The property name.
        property: String,
        /// Type name of the offending value.
        found: &'static str,
    },

    /// The base class has not been registered with the loader.
    #[error("unknown base class `{0}`")]
    UnknownBase(String),

    /// An action, emitter or reaction has no body.
    #[error("no body registered for {kind} `{name}`")]
    MissingBody {
        /// Member kind.
        kind: &'static str,
        /// Member name.
        name: String,
    },

    /// A property of a custom kind has no validator.
    #[error("no validator registered for kind `{kind}` of property `{property}`")]
    MissingValidator {
        /// The property name.
        property: String,
        /// The custom kind.
        kind: String,
    },

    /// The rebuilt class is inconsistent.
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),
}

/// Serializable description of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    /// Property name.
    pub name: String,
    /// Kind name: a built-in kind or a custom one.
    pub kind: String,
    /// Default value.
    #[serde(default)]
    pub default: serde_json::Value,
    /// Whether the property can be assigned from outside actions.
    #[serde(default)]
    pub settable: bool,
    /// Whether the validator is supplied as a proxy.
    #[serde(default)]
    pub proxy: bool,
    /// Documentation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

/// Serializable description of a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionMetadata {
    /// Reaction name.
    pub name: String,
    /// Connection strings, as declared.
    pub connections: Vec<String>,
}

/// Serializable description of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetadata {
    /// Class name.
    pub name: String,
    /// Base class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// All properties, including inherited ones.
    #[serde(default)]
    pub properties: Vec<PropertyMetadata>,
    /// Action names, excluding generated setters.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Emitter names.
    #[serde(default)]
    pub emitters: Vec<String>,
    /// Reactions.
    #[serde(default)]
    pub reactions: Vec<ReactionMetadata>,
}

impl ClassMetadata {
    /// Describe `class`.
    pub fn from_class(class: &ComponentClass) -> Result<Self, MetadataError> {
        let mut meta = ClassMetadata {
            name: class.name().to_owned(),
            base: class.base().map(str::to_owned),
            properties: Vec::new(),
            actions: Vec::new(),
            emitters: Vec::new(),
            reactions: Vec::new(),
        };
        for member in class.members() {
            match member {
                Descriptor::Property(p) => {
                    let default = value_to_json(p.default_value()).map_err(|found| {
                        MetadataError::NotSerializable {
                            property: p.name().to_owned(),
                            found,
                        }
                    })?;
                    meta.properties.push(PropertyMetadata {
                        name: p.name().to_owned(),
                        kind: p.kind().name().to_owned(),
                        default,
                        settable: p.is_settable(),
                        proxy: class.is_proxy(p.name()),
                        doc: p.doc().to_owned(),
                    });
                }
                Descriptor::Action(a) if !class.is_generated(a.name()) => {
                    meta.actions.push(a.name().to_owned());
                }
                Descriptor::Action(_) => {}
                Descriptor::Emitter(e) => meta.emitters.push(e.name().to_owned()),
                Descriptor::Reaction(r) => meta.reactions.push(ReactionMetadata {
                    name: r.name().to_owned(),
                    connections: r.connections().to_vec(),
                }),
            }
        }
        Ok(meta)
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Convert a value to JSON. Components and non-finite floats have no JSON
/// form; the error carries their type name.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, &'static str> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or("float")?,
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(value_to_json).collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), value_to_json(v)?)))
                .collect::<Result<_, &'static str>>()?,
        ),
        Value::Component(_) => return Err("component"),
    })
}

/// Convert JSON to a value. Integers that fit `i64` become `Int`, other
/// numbers become `Float`.
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(value_from_json).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), value_from_json(v)))
                .collect(),
        ),
    }
}

/// Rebuilds classes from [`ClassMetadata`].
///
/// Metadata carries no code, so the loader is given the bodies of actions,
/// emitters and reactions, and validators for custom property kinds.
/// Members inherited unchanged from a registered base need nothing.
///
/// # Example
///
/// ```rust,ignore
/// let loader = ClassLoader::new()
///     .with_action(ActionDescriptor::new("reset", |c, _| c.set("count", 0)))
///     .with_reaction("log", |_, events| println!("{events:?}"));
/// let class = loader.load(&ClassMetadata::from_json(&json)?)?;
/// ```
#[derive(Default)]
pub struct ClassLoader {
    actions: HashMap<String, ActionDescriptor>,
    emitters: HashMap<String, EmitterDescriptor>,
    reactions: HashMap<String, ReactionBody>,
    kinds: HashMap<String, Validator>,
    classes: HashMap<String, Rc<ComponentClass>>,
}

impl ClassLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide an action body.
    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.insert(action.name().to_owned(), action);
        self
    }

    /// Provide an emitter body.
    pub fn with_emitter(mut self, emitter: EmitterDescriptor) -> Self {
        self.emitters.insert(emitter.name().to_owned(), emitter);
        self
    }

    /// Provide a reaction body; connection strings come from the metadata.
    pub fn with_reaction<F, R>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Component, &[Event]) -> R + 'static,
        R: IntoOutcome,
    {
        self.reactions
            .insert(name.into(), Rc::new(move |c, events| body(c, events).into_outcome()));
        self
    }

    /// Provide the validator of a custom property kind.
    pub fn with_kind<F>(mut self, kind: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value, Value) -> Result<Value, ValidationError> + 'static,
    {
        self.kinds.insert(kind.into(), Rc::new(validator));
        self
    }

    /// Make `class` available as a base for later loads.
    pub fn with_base(mut self, class: &Rc<ComponentClass>) -> Self {
        self.register(class);
        self
    }

    /// Make `class` available as a base for later loads.
    pub fn register(&mut self, class: &Rc<ComponentClass>) {
        self.classes.insert(class.name().to_owned(), Rc::clone(class));
    }

    /// Rebuild a class. The result is registered as a possible base.
    pub fn load(&mut self, meta: &ClassMetadata) -> Result<Rc<ComponentClass>, MetadataError> {
        let (mut builder, inherited) = match &meta.base {
            Some(base) => {
                let class = self
                    .classes
                    .get(base)
                    .ok_or_else(|| MetadataError::UnknownBase(base.clone()))?;
                (
                    ClassBuilder::extends(&meta.name, class),
                    Some((Rc::clone(class), ClassMetadata::from_class(class)?)),
                )
            }
            None => (ComponentClass::builder(&meta.name), None),
        };
        let base_class = inherited.as_ref().map(|(class, _)| class);
        let base_meta = inherited.as_ref().map(|(_, meta)| meta);

        for property in &meta.properties {
            let unchanged = base_meta.is_some_and(|b| b.properties.contains(property));
            if unchanged {
                continue;
            }
            let validator = self.validator_for(property)?;
            let inherited = base_meta
                .and_then(|b| b.properties.iter().find(|p| p.name == property.name));
            builder = match inherited {
                Some(base) if property.proxy && reshapes(base, property) => {
                    builder.proxy_property(self.property_descriptor(property, validator))
                }
                Some(_) if property.proxy => {
                    builder.proxy(&property.name, move |old, new| validator(old, new))
                }
                _ => builder.property(self.property_descriptor(property, validator)),
            };
        }

        for name in &meta.actions {
            match self.actions.get(name) {
                Some(action) => builder = builder.action(action.clone()),
                None if base_class.is_some_and(|b| b.actions().contains(&name.as_str())) => {}
                None => return Err(missing("action", name)),
            }
        }

        for name in &meta.emitters {
            match self.emitters.get(name) {
                Some(emitter) => builder = builder.emitter(emitter.clone()),
                None if base_class.is_some_and(|b| b.emitters().contains(&name.as_str())) => {}
                None => return Err(missing("emitter", name)),
            }
        }

        for reaction in &meta.reactions {
            match self.reactions.get(&reaction.name) {
                Some(body) => {
                    let body = Rc::clone(body);
                    builder = builder.reaction(ReactionDescriptor::new(
                        &reaction.name,
                        &reaction.connections,
                        move |c: &Component, events: &[Event]| body(c, events),
                    ));
                }
                None if base_meta.is_some_and(|b| b.reactions.contains(reaction)) => {}
                None => return Err(missing("reaction", &reaction.name)),
            }
        }

        let class = builder.build()?;
        self.register(&class);
        Ok(class)
    }

    fn validator_for(&self, property: &PropertyMetadata) -> Result<Validator, MetadataError> {
        match PropertyKind::builtin(&property.kind) {
            Some(kind) => Ok(kind.validator()),
            None => self
                .kinds
                .get(&property.kind)
                .cloned()
                .ok_or_else(|| MetadataError::MissingValidator {
                    property: property.name.clone(),
                    kind: property.kind.clone(),
                }),
        }
    }

    fn property_descriptor(
        &self,
        property: &PropertyMetadata,
        validator: Validator,
    ) -> PropertyDescriptor {
        let default = value_from_json(&property.default);
        let mut descriptor = match PropertyKind::builtin(&property.kind) {
            Some(kind) => PropertyDescriptor::new(&property.name, kind).with_default(default),
            None => PropertyDescriptor::custom(
                &property.name,
                &property.kind,
                default,
                move |old, new| validator(old, new),
            ),
        };
        if property.settable {
            descriptor = descriptor.settable();
        }
        descriptor.with_doc(&property.doc)
    }
}

/// Whether a proxy replaces the base declaration rather than only its
/// validator.
fn reshapes(base: &PropertyMetadata, proxy: &PropertyMetadata) -> bool {
    base.kind != proxy.kind
        || base.default != proxy.default
        || base.settable != proxy.settable
        || base.doc != proxy.doc
}

fn missing(kind: &'static str, name: &str) -> MetadataError {
    MetadataError::MissingBody {
        kind,
        name: name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{Loop, payload};

    fn counter() -> Rc<ComponentClass> {
        ComponentClass::builder("Counter")
            .property(PropertyDescriptor::int("count").with_doc("Current count."))
            .property(PropertyDescriptor::string("label").settable().with_default("n"))
            .action(ActionDescriptor::new("increment", |c, _| {
                let n = c.get("count")?.as_int().unwrap_or(0);
                c.set("count", n + 1)
            }))
            .emitter(EmitterDescriptor::new("tick", |_, _| payload! { "n" => 1 }))
            .reaction(ReactionDescriptor::new("track", &["count", "!tick"], |_, _| ()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_describe_class() {
        let meta = ClassMetadata::from_class(&counter()).unwrap();
        assert_eq!(meta.name, "Counter");
        assert_eq!(meta.actions, ["increment"]);
        assert_eq!(meta.emitters, ["tick"]);
        assert_eq!(meta.reactions[0].connections, ["count", "!tick"]);
        let label = meta.properties.iter().find(|p| p.name == "label").unwrap();
        assert_eq!(label.kind, "string");
        assert_eq!(label.default, serde_json::json!("n"));
        assert!(label.settable);
    }

    #[test]
    fn test_json_round_trip_rebuilds_equivalent_class() {
        let json = ClassMetadata::from_class(&counter()).unwrap().to_json().unwrap();
        let meta = ClassMetadata::from_json(&json).unwrap();

        let mut loader = ClassLoader::new()
            .with_action(ActionDescriptor::new("increment", |c, _| {
                let n = c.get("count")?.as_int().unwrap_or(0);
                c.set("count", n + 10)
            }))
            .with_emitter(EmitterDescriptor::new("tick", |_, _| ()))
            .with_reaction("track", |_, _| ());
        let rebuilt = loader.load(&meta).unwrap();
        assert_eq!(rebuilt.properties(), ["count", "label"]);
        assert_eq!(rebuilt.actions(), ["increment", "set_label"]);
        assert_eq!(ClassMetadata::from_class(&rebuilt).unwrap(), meta);

        let lp = Loop::new();
        let c = Component::new(&rebuilt, &lp).unwrap();
        c.call("increment", &[]).unwrap();
        assert_eq!(c.get("count").unwrap(), Value::Int(10));
    }

    #[test]
    fn test_missing_pieces_are_reported() {
        let meta = ClassMetadata::from_class(&counter()).unwrap();
        let err = ClassLoader::new().load(&meta).unwrap_err();
        assert!(matches!(err, MetadataError::MissingBody { kind: "action", .. }));

        let mut meta = meta;
        meta.base = Some("Nope".into());
        assert!(matches!(
            ClassLoader::new().load(&meta),
            Err(MetadataError::UnknownBase(_))
        ));
    }

    #[test]
    fn test_subclass_with_proxy_needs_only_new_pieces() {
        let base = counter();
        let sub = ClassBuilder::extends("Shouty", &base)
            .proxy("label", |_, new| match new {
                Value::Str(s) => Ok(Value::Str(s.to_uppercase())),
                other => Err(ValidationError::TypeMismatch {
                    expected: "string",
                    found: other.type_name(),
                }),
            })
            .build()
            .unwrap();
        let meta = ClassMetadata::from_class(&sub).unwrap();
        let label = meta.properties.iter().find(|p| p.name == "label").unwrap();
        assert!(label.proxy);

        let mut loader = ClassLoader::new().with_base(&base);
        let rebuilt = loader.load(&meta).unwrap();
        assert_eq!(rebuilt.proxy_properties(), ["label"]);
        assert_eq!(rebuilt.properties(), ["count", "label"]);
    }

    #[test]
    fn test_reshaped_proxy_keeps_its_own_declaration() {
        let base = ComponentClass::builder("Box")
            .property(PropertyDescriptor::int("size").settable())
            .build()
            .unwrap();
        let sub = ClassBuilder::extends("FloatBox", &base)
            .proxy_property(PropertyDescriptor::float("size").with_default(1.5))
            .build()
            .unwrap();
        let meta = ClassMetadata::from_class(&sub).unwrap();

        let mut loader = ClassLoader::new().with_base(&base);
        let rebuilt = loader.load(&meta).unwrap();
        let size = rebuilt.property("size").unwrap();
        assert_eq!(size.kind().name(), "float");
        assert_eq!(size.default_value(), &Value::Float(1.5));
        assert!(!size.is_settable());
        assert!(rebuilt.is_proxy("size"));
        assert_eq!(ClassMetadata::from_class(&rebuilt).unwrap(), meta);
    }

    #[test]
    fn test_custom_kind_needs_validator() {
        let class = ComponentClass::builder("Colored")
            .property(PropertyDescriptor::custom(
                "color",
                "color",
                Value::from("red"),
                |_, new| Ok(new),
            ))
            .build()
            .unwrap();
        let meta = ClassMetadata::from_class(&class).unwrap();
        assert!(matches!(
            ClassLoader::new().load(&meta),
            Err(MetadataError::MissingValidator { .. })
        ));
        let rebuilt = ClassLoader::new()
            .with_kind("color", |_, new| Ok(new))
            .load(&meta)
            .unwrap();
        assert_eq!(
            rebuilt.property("color").map(|p| p.default_value().clone()),
            Some(Value::from("red"))
        );
    }

    #[test]
    fn test_values_without_json_form() {
        assert_eq!(value_to_json(&Value::Float(f64::NAN)), Err("float"));
        let nested = Value::List(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(value_from_json(&value_to_json(&nested).unwrap()), nested);
    }
}
