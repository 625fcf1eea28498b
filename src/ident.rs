//! Identity keys for the codec's bookkeeping tables.

use crate::value::{Value, ValueCell};
use std::fmt;
use std::rc::Rc;

/// A stable identifier for one aliasable storage cell in a value graph.
///
/// Two visits to the same cell yield the same id; two cells holding the
/// same value yield different ids. The id is the cell's `Rc` address,
/// which is stable for as long as the cell is alive; the codec's tables
/// are call-scoped and every visited cell is kept alive by its source
/// snapshot for the duration of the call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RefId(usize);

impl RefId {
    pub(crate) fn of(cell: &ValueCell) -> Self {
        Self(Rc::as_ptr(cell) as usize)
    }
}

impl fmt::Debug for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefId({:#x})", self.0)
    }
}

/// The identity of a live object, handle or placeholder, independent of
/// which slot it was reached through.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjId(usize);

impl ObjId {
    /// The identity of `value`, for the variants that have one.
    pub(crate) fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(Self(Rc::as_ptr(obj) as usize)),
            Value::Handle(h) => Some(Self(h.addr())),
            Value::Stasis(st) => Some(Self(Rc::as_ptr(st) as *const () as usize)),
            _ => None,
        }
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({:#x})", self.0)
    }
}
