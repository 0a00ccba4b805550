//! Connection-string grammar.
//!
//! ```text
//! connection := ["!"] part ("." part)* [":" label]
//! part       := identifier ["*" | "**"]
//! ```
//!
//! The last part names the event type; the parts before it form a path
//! through component-valued properties of the reaction's owner. A part
//! ending in `*` fans out over the items of a list-valued property, and
//! `**` does so recursively. A leading `!` marks an eager connection.
//!
//! Examples: `"value"`, `"!clicked"`, `"sub.value:track"`,
//! `"children*.value"`, `"!tree.children**.selected:sel"`.

use crate::error::ConnectionError;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Properties of a parsed connection string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectionFlags: u8 {
        /// Starts with `!`: delivered eagerly, never warns about unknown types.
        const EAGER = 1 << 0;
        /// Has a path before the event type.
        const DOTTED = 1 << 1;
        /// Uses a `*` selector somewhere.
        const WILDCARD = 1 << 2;
        /// Uses a `**` selector somewhere.
        const DEEP = 1 << 3;
        /// Carries an explicit `:label`.
        const LABELED = 1 << 4;
    }
}

/// How a path part selects the next objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Plain part: the property value is the next object.
    Single,
    /// `*`: every item of a list-valued property.
    Each,
    /// `**`: every item, recursively through the same property.
    Deep,
    /// A recursion level below a `**` selector. Never produced by parsing.
    #[doc(hidden)]
    Optional,
}

/// One dot-separated part of a connection path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Part {
    name: String,
    selector: Selector,
}

impl Part {
    pub(crate) fn new(name: impl Into<String>, selector: Selector) -> Self {
        Self {
            name: name.into(),
            selector,
        }
    }

    /// The property or event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The selector suffix.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    fn parse(connection: &str, raw: &str) -> Result<Self, ConnectionError> {
        let name = raw.trim_end_matches('*');
        let selector = match raw.len() - name.len() {
            0 => Selector::Single,
            1 => Selector::Each,
            2 => Selector::Deep,
            _ => return Err(non_identifier(connection, raw)),
        };
        let is_identifier =
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_identifier {
            return Err(non_identifier(connection, name));
        }
        Ok(Self::new(name, selector))
    }
}

fn non_identifier(connection: &str, part: &str) -> ConnectionError {
    ConnectionError::NonIdentifier {
        connection: connection.to_owned(),
        part: part.to_owned(),
    }
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    fullname: String,
    parts: Vec<Part>,
    label: Option<String>,
    flags: ConnectionFlags,
}

impl Connection {
    /// Parse a single connection string.
    pub fn parse(input: &str) -> Result<Self, ConnectionError> {
        if input.is_empty() {
            return Err(ConnectionError::EmptyString);
        }
        let mut flags = ConnectionFlags::empty();
        let body = match input.strip_prefix('!') {
            Some(rest) => {
                flags |= ConnectionFlags::EAGER;
                rest
            }
            None => input,
        };
        let (path, label) = match body.split_once(':') {
            Some((path, label)) => (path, Some(label)),
            None => (body, None),
        };
        if path.contains('!') {
            return Err(ConnectionError::MisplacedBang(input.to_owned()));
        }
        let parts = path
            .split('.')
            .map(|raw| Part::parse(path, raw))
            .collect::<Result<Vec<_>, _>>()?;

        if parts.len() > 1 {
            flags |= ConnectionFlags::DOTTED;
        }
        for part in &parts {
            match part.selector {
                Selector::Each => flags |= ConnectionFlags::WILDCARD,
                Selector::Deep => flags |= ConnectionFlags::WILDCARD | ConnectionFlags::DEEP,
                Selector::Single | Selector::Optional => {}
            }
        }
        let label = label.filter(|l| !l.is_empty()).map(str::to_owned);
        if label.is_some() {
            flags |= ConnectionFlags::LABELED;
        }

        Ok(Self {
            fullname: input.to_owned(),
            parts,
            label,
            flags,
        })
    }

    /// Parse the connection strings of one reaction. At least one is required.
    pub fn parse_all<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Self>, ConnectionError> {
        if inputs.is_empty() {
            return Err(ConnectionError::Empty);
        }
        inputs.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// The string as written, used in logs and connection info.
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// All parts; the last one names the event type.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The event type this connection subscribes to.
    pub fn event_type(&self) -> &str {
        // `parse` never produces an empty part list.
        self.parts.last().map_or("", Part::name)
    }

    /// The explicit label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The explicit label, or `default` (the reaction name).
    pub fn label_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.label.as_deref().unwrap_or(default)
    }

    /// Parsed properties of the string.
    pub fn flags(&self) -> ConnectionFlags {
        self.flags
    }

    /// Whether the connection starts with `!`.
    pub fn is_eager(&self) -> bool {
        self.flags.contains(ConnectionFlags::EAGER)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname)
    }
}

impl std::str::FromStr for Connection {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
