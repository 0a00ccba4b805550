//! Per-class member registry.
//!
//! A [`ComponentClass`] is built once by a [`ClassBuilder`] and shared by
//! all of its instances. Inheritance is a table merge: the subclass starts
//! from a copy of the base table and may override members of the same kind.

use crate::component::Component;
use crate::connection::Connection;
use crate::descriptor::{
    ActionDescriptor, Descriptor, EmitterDescriptor, PropertyDescriptor, ReactionDescriptor,
    Validator,
};
use crate::error::{DeclarationError, ValidationError};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// The member table of a component class.
pub struct ComponentClass {
    name: String,
    base: Option<String>,
    members: BTreeMap<String, Descriptor>,
    proxies: BTreeSet<String>,
    generated: BTreeSet<String>,
    connections: BTreeMap<String, Vec<Connection>>,
}

impl ComponentClass {
    /// Start declaring a class without a base.
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    /// The class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the class this one extends.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Declared property names, sorted. Proxies appear once.
    pub fn properties(&self) -> Vec<&str> {
        self.names_of(|d| matches!(d, Descriptor::Property(_)))
    }

    /// Names of properties whose validator was supplied by this class or an
    /// ancestor as a proxy, sorted.
    pub fn proxy_properties(&self) -> Vec<&str> {
        self.proxies.iter().map(String::as_str).collect()
    }

    /// Action names, including generated `set_<name>` actions, sorted.
    pub fn actions(&self) -> Vec<&str> {
        self.names_of(|d| matches!(d, Descriptor::Action(_)))
    }

    /// Emitter names, sorted.
    pub fn emitters(&self) -> Vec<&str> {
        self.names_of(|d| matches!(d, Descriptor::Emitter(_)))
    }

    /// Reaction names, sorted.
    pub fn reactions(&self) -> Vec<&str> {
        self.names_of(|d| matches!(d, Descriptor::Reaction(_)))
    }

    /// Event types the class produces: its properties and emitters.
    pub fn event_types(&self) -> Vec<&str> {
        self.names_of(|d| matches!(d, Descriptor::Property(_) | Descriptor::Emitter(_)))
    }

    /// Any member by name.
    pub fn member(&self, name: &str) -> Option<&Descriptor> {
        self.members.get(name)
    }

    /// All members in name order.
    pub fn members(&self) -> impl Iterator<Item = &Descriptor> {
        self.members.values()
    }

    /// A property descriptor by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        match self.members.get(name) {
            Some(Descriptor::Property(p)) => Some(p),
            _ => None,
        }
    }

    /// Whether `name` is a declared property.
    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Whether `name` is a proxy property.
    pub fn is_proxy(&self, name: &str) -> bool {
        self.proxies.contains(name)
    }

    /// Whether `name` is an action generated for a settable property.
    pub fn is_generated(&self, name: &str) -> bool {
        self.generated.contains(name)
    }

    /// Parsed connections of a reaction.
    pub fn connections(&self, reaction: &str) -> Option<&[Connection]> {
        self.connections.get(reaction).map(Vec::as_slice)
    }

    fn names_of(&self, pred: impl Fn(&Descriptor) -> bool) -> Vec<&str> {
        self.members
            .iter()
            .filter(|(_, d)| pred(d))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("properties", &self.properties())
            .field("actions", &self.actions())
            .field("emitters", &self.emitters())
            .field("reactions", &self.reactions())
            .finish()
    }
}

enum Declared {
    Member(Descriptor),
    Proxy { name: String, validator: Validator },
    ProxyProperty(PropertyDescriptor),
}

impl Declared {
    fn name(&self) -> &str {
        match self {
            Declared::Member(d) => d.name(),
            Declared::Proxy { name, .. } => name,
            Declared::ProxyProperty(p) => p.name(),
        }
    }
}

/// Builder for [`ComponentClass`].
///
/// # Example
///
/// ```rust,ignore
/// let counter = ComponentClass::builder("Counter")
///     .property(PropertyDescriptor::int("count"))
///     .action(ActionDescriptor::new("increment", |c, _| {
///         let n = c.get("count")?.as_int().unwrap_or(0);
///         c.set("count", n + 1)
///     }))
///     .reaction(ReactionDescriptor::new("log", &["count"], |_, events| {
///         println!("{} change(s)", events.len());
///     }))
///     .build()?;
/// ```
pub struct ClassBuilder {
    name: String,
    base: Option<Rc<ComponentClass>>,
    declared: Vec<Declared>,
}

impl ClassBuilder {
    /// Start declaring a class without a base.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            declared: Vec::new(),
        }
    }

    /// Start declaring a class that inherits every member of `base`.
    pub fn extends(name: impl Into<String>, base: &Rc<ComponentClass>) -> Self {
        Self {
            name: name.into(),
            base: Some(Rc::clone(base)),
            declared: Vec::new(),
        }
    }

    /// Declare (or override) a property.
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.declared.push(Declared::Member(Descriptor::Property(property)));
        self
    }

    /// Supply the validator of a property declared by a base class.
    ///
    /// The property keeps a single backing slot and is listed once in
    /// [`ComponentClass::properties`] and in
    /// [`ComponentClass::proxy_properties`].
    pub fn proxy<F>(mut self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value, Value) -> Result<Value, ValidationError> + 'static,
    {
        self.declared.push(Declared::Proxy {
            name: name.into(),
            validator: Rc::new(validator),
        });
        self
    }

    /// Replace a property declared by a base class with `property` while
    /// keeping it a proxy: one backing slot, listed once in
    /// [`ComponentClass::properties`] and in
    /// [`ComponentClass::proxy_properties`].
    pub fn proxy_property(mut self, property: PropertyDescriptor) -> Self {
        self.declared.push(Declared::ProxyProperty(property));
        self
    }

    /// Declare (or override) an action.
    pub fn action(mut self, action: ActionDescriptor) -> Self {
        self.declared.push(Declared::Member(Descriptor::Action(action)));
        self
    }

    /// Declare (or override) an emitter.
    pub fn emitter(mut self, emitter: EmitterDescriptor) -> Self {
        self.declared.push(Declared::Member(Descriptor::Emitter(emitter)));
        self
    }

    /// Declare (or override) a reaction.
    pub fn reaction(mut self, reaction: ReactionDescriptor) -> Self {
        self.declared.push(Declared::Member(Descriptor::Reaction(reaction)));
        self
    }

    /// Merge the declarations into the inherited table and check it.
    pub fn build(self) -> Result<Rc<ComponentClass>, DeclarationError> {
        let class = self.name;
        let base = self.base;

        let mut members = base.as_ref().map(|b| b.members.clone()).unwrap_or_default();
        let mut proxies = base.as_ref().map(|b| b.proxies.clone()).unwrap_or_default();
        let mut generated = base.as_ref().map(|b| b.generated.clone()).unwrap_or_default();
        let mut seen = BTreeSet::new();

        for declared in self.declared {
            let name = declared.name().to_owned();
            if !seen.insert(name.clone()) {
                return Err(DeclarationError::Duplicate { class, name });
            }
            match declared {
                Declared::Proxy { name, validator } => {
                    let inherited = base.as_ref().and_then(|b| b.property(&name)).cloned();
                    let Some(property) = inherited else {
                        return Err(DeclarationError::ProxyWithoutBase { class, name });
                    };
                    members.insert(
                        name.clone(),
                        Descriptor::Property(property.with_validator(validator)),
                    );
                    proxies.insert(name);
                }
                Declared::ProxyProperty(property) => {
                    if !base.as_ref().is_some_and(|b| b.has_property(&name)) {
                        return Err(DeclarationError::ProxyWithoutBase { class, name });
                    }
                    members.insert(name.clone(), Descriptor::Property(property));
                    proxies.insert(name);
                }
                Declared::Member(descriptor) => {
                    if let Some(existing) = members.get(&name) {
                        if existing.kind_name() != descriptor.kind_name() {
                            return Err(DeclarationError::KindConflict {
                                class,
                                name,
                                inherited: existing.kind_name(),
                                declared: descriptor.kind_name(),
                            });
                        }
                    }
                    generated.remove(&name);
                    if matches!(descriptor, Descriptor::Property(_)) {
                        proxies.remove(&name);
                    }
                    members.insert(name, descriptor);
                }
            }
        }

        // Setters of properties that are no longer settable go away.
        generated.retain(|setter| {
            let keep = setter
                .strip_prefix("set_")
                .and_then(|prop| match members.get(prop) {
                    Some(Descriptor::Property(p)) => Some(p.is_settable()),
                    _ => None,
                })
                .unwrap_or(false);
            if !keep {
                members.remove(setter);
            }
            keep
        });

        let settable: Vec<String> = members
            .values()
            .filter_map(|d| match d {
                Descriptor::Property(p) if p.is_settable() => Some(p.name().to_owned()),
                _ => None,
            })
            .collect();
        for property in settable {
            let setter = format!("set_{property}");
            match members.get(&setter) {
                None => {
                    members.insert(setter.clone(), Descriptor::Action(generated_setter(property)));
                    generated.insert(setter);
                }
                Some(Descriptor::Action(_)) => {}
                Some(other) => {
                    return Err(DeclarationError::KindConflict {
                        class,
                        name: setter,
                        inherited: other.kind_name(),
                        declared: "action",
                    });
                }
            }
        }

        let mut connections = BTreeMap::new();
        for descriptor in members.values() {
            match descriptor {
                Descriptor::Property(p) => {
                    p.validate(&Value::Null, p.default_value().clone())
                        .map_err(|source| DeclarationError::InvalidDefault {
                            name: p.name().to_owned(),
                            source,
                        })?;
                }
                Descriptor::Reaction(r) => {
                    let parsed = Connection::parse_all(r.connections()).map_err(|source| {
                        DeclarationError::Connection {
                            reaction: r.name().to_owned(),
                            source,
                        }
                    })?;
                    connections.insert(r.name().to_owned(), parsed);
                }
                Descriptor::Action(_) | Descriptor::Emitter(_) => {}
            }
        }

        Ok(Rc::new(ComponentClass {
            name: class,
            base: base.map(|b| b.name.clone()),
            members,
            proxies,
            generated,
            connections,
        }))
    }
}

fn generated_setter(property: String) -> ActionDescriptor {
    let doc = format!("Set the value of `{property}`.");
    ActionDescriptor::new(format!("set_{property}"), move |c: &Component, args: &[Value]| {
        c.set(&property, args.first().cloned().unwrap_or_default())
    })
    .with_doc(doc)
}
