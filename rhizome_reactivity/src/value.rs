use std::fmt;
use std::rc::Rc;

use crate::signal::Signal;

/// The dynamic value currency used by attribute maps and index keys.
///
/// Hashable and totally ordered so it can key buckets directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    /// Lua-flavored truthiness: only `Null` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v.as_str()))
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Self::Str(v)
    }
}

/// What an index getter yields for one item: a fixed key, or a signal
/// whose changes move the item between buckets.
#[derive(Clone)]
pub enum IndexBinding {
    Const(Value),
    Reactive(Signal<Value>),
}

impl IndexBinding {
    /// The key this binding resolves to right now.
    pub fn current(&self) -> Value {
        match self {
            Self::Const(v) => v.clone(),
            Self::Reactive(sig) => sig.get(),
        }
    }

    pub fn signal(&self) -> Option<&Signal<Value>> {
        match self {
            Self::Const(_) => None,
            Self::Reactive(sig) => Some(sig),
        }
    }
}

impl From<Value> for IndexBinding {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

impl From<Signal<Value>> for IndexBinding {
    fn from(sig: Signal<Value>) -> Self {
        Self::Reactive(sig)
    }
}
