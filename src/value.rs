//! The dynamic value model traversed by the codec.
//!
//! Cryo is polymorphic over arbitrary host values, so the value space is a
//! tagged sum: scalars, insertion-ordered keyed collections ([`Array`]),
//! objects with named fields and a class identity ([`Object`]), opaque live
//! host values ([`HostHandle`]) and placeholders ([`Stasis`]).
//!
//! ## Slots
//!
//! The unit of aliasing is the storage cell, not the value stored in it.
//! Array entries and object fields are [`ValueCell`]s; two entries that
//! share a cell are aliases of one slot, and the codec preserves that
//! sharing across a round trip. Arrays themselves have value semantics
//! (sharing an array means sharing the slot that holds it), while objects,
//! handles and placeholders carry reference identity through their `Rc`.

use crate::stasis::Stasis;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// An aliasable storage cell holding a [`Value`].
pub type ValueCell = Rc<RefCell<Value>>;

/// A key in an [`Array`]: integer or string, as in the host collections
/// the codec models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl From<i64> for Key {
    fn from(k: i64) -> Self {
        Self::Int(k)
    }
}

impl From<&str> for Key {
    fn from(k: &str) -> Self {
        Self::Str(k.to_string())
    }
}

impl From<String> for Key {
    fn from(k: String) -> Self {
        Self::Str(k)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// An insertion-ordered keyed collection of slots.
#[derive(Debug, Clone, Default)]
pub struct Array {
    entries: Vec<(Key, ValueCell)>,
}

impl Array {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty array with room for `cap` entries.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
        }
    }

    /// Inserts `value` in a fresh cell under `key` and returns the cell.
    ///
    /// The collection is a mapping: re-inserting an existing key replaces
    /// that entry's cell in place, keeping its position. Aliases of the
    /// replaced cell keep the old value; the assignment is to the key,
    /// not through the slot.
    pub fn insert(&mut self, key: impl Into<Key>, value: Value) -> ValueCell {
        let cell = value.cell();
        self.insert_cell(key, cell.clone());
        cell
    }

    /// Inserts an existing cell under `key`, replacing in place when the
    /// key is already present. Sharing a cell between entries (or with
    /// another container) aliases the slot.
    pub fn insert_cell(&mut self, key: impl Into<Key>, cell: ValueCell) {
        let key = key.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(idx) => self.entries[idx].1 = cell,
            None => self.entries.push((key, cell)),
        }
    }

    /// Appends `value` under the next free integer key and returns its cell.
    pub fn push(&mut self, value: Value) -> ValueCell {
        let next = self
            .entries
            .iter()
            .filter_map(|(k, _)| match k {
                Key::Int(i) => Some(*i),
                Key::Str(_) => None,
            })
            .max()
            .map_or(0, |m| m + 1);
        self.insert(next, value)
    }

    /// Returns the cell stored under `key`, scanning in insertion order.
    pub fn get(&self, key: &Key) -> Option<&ValueCell> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    /// The entries in insertion order.
    pub fn entries(&self) -> &[(Key, ValueCell)] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the array has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An object with a class identity and named fields.
///
/// An object carrying a [`HostHandle`] is natively unserializable and will
/// be escalated to a placeholder by the encoder; an object without one
/// passes through the native codec untouched.
#[derive(Debug, Clone)]
pub struct Object {
    /// The class name.
    pub class: String,
    /// Named fields, in declaration order. Keys are expected to be strings.
    pub fields: Array,
    /// Live payload that the native codec cannot represent, if any.
    pub handle: Option<HostHandle>,
}

impl Object {
    /// Creates a plain object of class `class` with no fields.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: Array::new(),
            handle: None,
        }
    }

    /// Creates an object wrapping a live handle.
    pub fn with_handle(class: impl Into<String>, handle: HostHandle) -> Self {
        Self {
            class: class.into(),
            fields: Array::new(),
            handle: Some(handle),
        }
    }

    /// Wraps the object into a [`Value`].
    pub fn into_value(self) -> Value {
        Value::Object(Rc::new(RefCell::new(self)))
    }
}

/// An opaque live host value the native codec always refuses: a closure, a
/// live coroutine/fiber, a resource handle.
///
/// Two handles cloned from the same `Rc` are the same live value; the
/// encoder collapses them into a single placeholder.
#[derive(Clone)]
pub struct HostHandle {
    tag: String,
    value: Rc<dyn Any>,
}

impl HostHandle {
    /// Wraps a live value under a descriptive tag (e.g. `"closure"`).
    pub fn new<T: 'static>(tag: impl Into<String>, value: T) -> Self {
        Self {
            tag: tag.into(),
            value: Rc::new(value),
        }
    }

    /// Wraps an already shared live value.
    pub fn from_rc(tag: impl Into<String>, value: Rc<dyn Any>) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }

    /// The handle's tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attempts to downcast the live value.
    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// Whether two handles wrap the same live value.
    pub fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.value) as *const () as usize
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostHandle({} @ {:#x})", self.tag, self.addr())
    }
}

/// Any host value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Ordered keyed collection.
    Array(Array),
    /// Object with class identity.
    Object(Rc<RefCell<Object>>),
    /// Opaque live host value.
    Handle(HostHandle),
    /// Placeholder standing in for a live value.
    Stasis(Rc<Stasis>),
}

impl Value {
    /// Wraps the value in a fresh storage cell.
    pub fn cell(self) -> ValueCell {
        Rc::new(RefCell::new(self))
    }

    /// Whether the value is a scalar (or null). Scalars are copied by
    /// value during the walk; everything else is tracked by slot.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_)
        )
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Handle(_) => "handle",
            Self::Stasis(_) => "stasis",
        }
    }

    /// The mutation check used when a slot is revisited: scalars compare by
    /// value (floats by bit pattern), containers by identity, arrays by
    /// length plus pairwise key and slot identity.
    pub(crate) fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len()
                    && a.entries()
                        .iter()
                        .zip(b.entries())
                        .all(|((ka, ca), (kb, cb))| ka == kb && Rc::ptr_eq(ca, cb))
            }
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Handle(a), Self::Handle(b)) => a.same_value(b),
            (Self::Stasis(a), Self::Stasis(b)) => Rc::ptr_eq(a, b),
            _ => false,
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
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Self::Array(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        v.into_value()
    }
}

impl From<HostHandle> for Value {
    fn from(v: HostHandle) -> Self {
        Self::Handle(v)
    }
}

/// Structural equality over two graphs, safe in the presence of cycles.
///
/// Scalars compare by value, arrays by keys and entry structure, objects by
/// class and fields, handles by live-value identity, placeholders by class
/// tag and payload. A pair of cells that is already under comparison is
/// assumed equal, which makes the comparison coinductive: two cyclic graphs
/// are equal when no finite path distinguishes them.
pub fn deep_eq(a: &ValueCell, b: &ValueCell) -> bool {
    let mut visiting = HashSet::new();
    deep_eq_cells(a, b, &mut visiting)
}

fn deep_eq_cells(a: &ValueCell, b: &ValueCell, visiting: &mut HashSet<(usize, usize)>) -> bool {
    let pair = (Rc::as_ptr(a) as usize, Rc::as_ptr(b) as usize);
    if !visiting.insert(pair) {
        return true;
    }
    let va = a.borrow().clone();
    let vb = b.borrow().clone();
    deep_eq_values(&va, &vb, visiting)
}

fn deep_eq_values(a: &Value, b: &Value, visiting: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => deep_eq_arrays(x, y, visiting),
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (class_x, fields_x, handle_x) = {
                let o = x.borrow();
                (o.class.clone(), o.fields.clone(), o.handle.clone())
            };
            let (class_y, fields_y, handle_y) = {
                let o = y.borrow();
                (o.class.clone(), o.fields.clone(), o.handle.clone())
            };
            let handles_match = match (&handle_x, &handle_y) {
                (None, None) => true,
                (Some(hx), Some(hy)) => hx.same_value(hy),
                _ => false,
            };
            class_x == class_y && handles_match && deep_eq_arrays(&fields_x, &fields_y, visiting)
        }
        (Value::Handle(x), Value::Handle(y)) => x.same_value(y),
        (Value::Stasis(x), Value::Stasis(y)) => {
            Rc::ptr_eq(x, y)
                || (x.class_tag() == y.class_tag()
                    && deep_eq_cells(&x.payload(), &y.payload(), visiting))
        }
        _ => false,
    }
}

fn deep_eq_arrays(a: &Array, b: &Array, visiting: &mut HashSet<(usize, usize)>) -> bool {
    a.len() == b.len()
        && a.entries()
            .iter()
            .zip(b.entries())
            .all(|((ka, ca), (kb, cb))| ka == kb && deep_eq_cells(ca, cb, visiting))
}
