//! Type-erased payloads carried by continuation invocations

use std::any::Any;
use std::fmt;

/// A single opaque value handed to a continuation.
///
/// Executors never inspect values; they carry them verbatim from the
/// invocation that produced them to whatever observes them next, either the
/// following suspension point or the completion continuation.
pub struct Value {
    inner: Box<dyn Any + Send>,
}

impl Value {
    /// Wrap an arbitrary value.
    pub fn new(value: impl Any + Send) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// Borrow the payload as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Take the payload as `T`, handing the value back unchanged on a type
    /// mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Value> {
        match self.inner.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(inner) => Err(Value { inner }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<&str>() {
            write!(f, "Value({s:?})")
        } else if let Some(s) = self.downcast_ref::<String>() {
            write!(f, "Value({s:?})")
        } else {
            f.write_str("Value(<opaque>)")
        }
    }
}

/// The ordered payload sequence of one continuation invocation.
pub type Values = Vec<Value>;
