//! The placeholder and envelope data model.
//!
//! A [`Stasis`] is a neutral, natively-serializable record standing in for
//! a value the native codec cannot handle: a class tag naming the original
//! live type, plus a payload subgraph that a matching transformer consumes
//! at resolve time. The [`Envelope`] pairs the encoded root with the
//! ordered list of every placeholder in the graph, so decoding can walk
//! placeholders without re-traversing the whole value.

use crate::error::{CryoError, Result};
use crate::value::{Object, Value, ValueCell};
use std::cell::RefCell;
use std::rc::Rc;

/// A placeholder for a live value.
///
/// Placeholders are equality-free; identity is the `Rc` pointer. The
/// payload and the resolved-instance slot are interiorly mutable because
/// the encoder writes the transformed payload back and the decoder stores
/// the reconstructed live value.
#[derive(Debug)]
pub struct Stasis {
    class_tag: String,
    payload: RefCell<ValueCell>,
    instance: RefCell<Option<Value>>,
}

impl Stasis {
    /// Creates a placeholder with a null payload.
    pub fn new(class_tag: impl Into<String>) -> Rc<Self> {
        Self::with_payload(class_tag, Value::Null)
    }

    /// Creates a placeholder carrying `payload`.
    pub fn with_payload(class_tag: impl Into<String>, payload: Value) -> Rc<Self> {
        Rc::new(Self {
            class_tag: class_tag.into(),
            payload: RefCell::new(payload.cell()),
            instance: RefCell::new(None),
        })
    }

    /// Captures a live value's class identity and introspectable snapshot.
    ///
    /// Objects contribute their class name and a shallow copy of their
    /// field table (the field cells are shared, so the encoder's payload
    /// walk rewrites the same slots the object exposes). Handles have no
    /// introspectable interior; their payload is null.
    pub fn from_value(value: &Value) -> Rc<Self> {
        match value {
            Value::Object(obj) => {
                let o = obj.borrow();
                Self::with_payload(o.class.clone(), Value::Array(o.fields.clone()))
            }
            Value::Handle(h) => Self::new(h.tag()),
            other => Self::with_payload("", other.clone()),
        }
    }

    /// The class tag identifying the live type this placeholder stands for.
    pub fn class_tag(&self) -> &str {
        &self.class_tag
    }

    /// The payload cell.
    pub fn payload(&self) -> ValueCell {
        self.payload.borrow().clone()
    }

    /// Replaces the payload cell. The encoder stores the transformed
    /// payload through this after walking it.
    pub fn set_payload(&self, cell: ValueCell) {
        *self.payload.borrow_mut() = cell;
    }

    /// Whether a live instance has been stored.
    pub fn has_instance(&self) -> bool {
        self.instance.borrow().is_some()
    }

    /// Stores the reconstructed live value.
    pub fn set_instance(&self, value: Value) {
        *self.instance.borrow_mut() = Some(value);
    }

    /// The reconstructed live value, if one has been stored.
    pub fn instance(&self) -> Option<Value> {
        self.instance.borrow().clone()
    }

    /// The live value this placeholder reconstructs to when no transformer
    /// claims it.
    ///
    /// Returns the stored instance when present. Otherwise the default
    /// reconstruction rule applies: a non-empty class tag with an array
    /// payload rebuilds a plain object of that class from the payload
    /// fields. Anything else (a bare closure or fiber placeholder, an
    /// empty tag) is an [`CryoError::UnresolvableStasis`] error.
    pub fn default_instance(&self) -> Result<Value> {
        if let Some(v) = self.instance() {
            return Ok(v);
        }
        let payload = self.payload();
        let snapshot = payload.borrow().clone();
        match snapshot {
            Value::Array(fields) if !self.class_tag.is_empty() => Ok(Object {
                class: self.class_tag.clone(),
                fields,
                handle: None,
            }
            .into_value()),
            _ => Err(CryoError::UnresolvableStasis(self.class_tag.clone())),
        }
    }
}

/// The wrapper emitted on the slow path: the transformed root plus an
/// ordered list of every placeholder created while encoding it.
///
/// Each shortcut cell is the same storage cell as the canonical occurrence
/// of that placeholder inside `value`, so resolving a shortcut mutates the
/// slot seen from the value graph. The envelope is emitted only when at
/// least one placeholder exists; otherwise the native codec's output for
/// the root stands alone.
#[derive(Debug)]
pub struct Envelope {
    /// The transformed root value.
    pub value: ValueCell,
    /// Every placeholder cell, in creation order.
    pub shortcuts: Vec<ValueCell>,
}
