//! Every unit is identified by a canonical instance name - the declared name with its first
//! character lower-cased. Units can be referred to either by an explicit name or by a type or
//! function reference, in which case the name is derived from the last path segment of the type
//! name, e.g. `my_app::service::Greeter` becomes `greeter`.
//!
//! ```
//! use unitwire_di::identity::Identity;
//!
//! struct Greeter;
//!
//! assert_eq!(Identity::of::<Greeter>().instance_name().unwrap(), "greeter");
//! assert_eq!(Identity::from("Greeter").instance_name().unwrap(), "greeter");
//! ```
//!
//! Closures have no declared name, so using them as a reference results in
//! [ResolutionError::InvalidIdentity] when the identity is resolved.

use crate::error::ResolutionError;
use std::any::type_name;
use std::fmt::{Display, Formatter};

/// Identity of a unit, either given explicitly or derived from a type.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Identity {
    Name(String),
    /// Full type name of the referenced type or function.
    Reference(&'static str),
}

impl Identity {
    /// Identity derived from a type, typically a class-like unit.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Identity::Reference(type_name::<T>())
    }

    /// Identity derived from the type of a value, typically a function item.
    pub fn of_val<T: ?Sized>(_value: &T) -> Self {
        Identity::Reference(type_name::<T>())
    }

    /// Returns the canonical instance name for this identity.
    pub fn instance_name(&self) -> Result<String, ResolutionError> {
        match self {
            Identity::Name(name) if name.is_empty() => {
                Err(ResolutionError::InvalidIdentity(name.clone()))
            }
            Identity::Name(name) => Ok(instance_name(name)),
            Identity::Reference(reference) => declared_name(reference)
                .map(instance_name)
                .ok_or_else(|| ResolutionError::InvalidIdentity(reference.to_string())),
        }
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Name(name) => write!(f, "{name}"),
            Identity::Reference(reference) => write!(f, "{reference}"),
        }
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Name(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Name(value)
    }
}

impl From<&String> for Identity {
    fn from(value: &String) -> Self {
        Identity::Name(value.clone())
    }
}

/// Makes sure the first character is lower case.
pub fn instance_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn declared_name(type_name: &str) -> Option<&str> {
    let type_name = type_name.trim_start_matches('&');
    let type_name = type_name.strip_prefix("mut ").unwrap_or(type_name);
    let type_name = type_name.strip_prefix("dyn ").unwrap_or(type_name);

    // generic parameters and trait object bounds are not a part of the name
    let end = type_name
        .find(|c: char| c == '<' || c == ' ')
        .unwrap_or(type_name.len());
    let name = type_name[..end].rsplit("::").next()?;

    let mut chars = name.chars();
    let first = chars.next()?;

    if (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}
