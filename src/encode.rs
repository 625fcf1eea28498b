//! The encode-side graph walker.
//!
//! The walker produces a transformed copy of the input graph in which
//! every value the native codec refuses has been replaced by a
//! placeholder, while slot aliasing, object sharing and cycles are
//! preserved. It runs only on the slow path, after a direct native encode
//! of the root has already failed.
//!
//! ## Walk Protocol
//!
//! For each non-scalar slot:
//!
//! 1. A revisited slot returns its previously produced cell — after the
//!    observed value is checked against the first-visit snapshot, because
//!    a change means the caller (usually a transformer) mutated the input
//!    mid-walk, which is fatal.
//! 2. An object, handle or placeholder that already produced output is
//!    reused through the object-identity table, so distinct slots holding
//!    the same live value share one produced cell.
//! 3. Arrays rebuild entry by entry: scalar leaves copy by value into
//!    fresh cells, everything else recurses and shares the produced cell.
//! 4. Objects whose subtree holds neither a handle nor a placeholder pass
//!    through untouched.
//! 5. Everything else becomes a placeholder — kept as-is when the value
//!    already is one, produced by the first matching transformer, or
//!    captured field-by-field as a default placeholder. The placeholder
//!    cell is registered **before** its payload is walked; a cycle that
//!    passes through the payload must be able to see the placeholder.
//!
//! All tables live inside the per-call `Encoder` and are dropped on every
//! exit path.

use crate::error::{CryoError, Result};
use crate::ident::{ObjId, RefId};
use crate::stasis::Stasis;
use crate::transform::TransformerRegistry;
use crate::value::{Array, Value, ValueCell};
use crate::wire;
use std::collections::HashMap;

/// One encode call's bookkeeping state.
pub struct Encoder<'a> {
    registry: &'a TransformerRegistry,
    /// Reference identity: first-visit snapshot per slot.
    sources: HashMap<RefId, Value>,
    /// Reference identity: produced cell per slot.
    targets: HashMap<RefId, ValueCell>,
    /// Object identity: produced cell per live object/handle/placeholder.
    /// Keys are raw addresses; the cells they name are pinned for the call
    /// duration by the `sources` snapshots, never by this table.
    produced: HashMap<ObjId, ValueCell>,
    /// Every placeholder cell, in creation order.
    shortcuts: Vec<ValueCell>,
}

impl<'a> Encoder<'a> {
    /// Creates a walker with empty tables.
    pub fn new(registry: &'a TransformerRegistry) -> Self {
        Self {
            registry,
            sources: HashMap::new(),
            targets: HashMap::new(),
            produced: HashMap::new(),
            shortcuts: Vec::new(),
        }
    }

    /// Releases the tables and hands back the shortcut list.
    pub fn into_shortcuts(self) -> Vec<ValueCell> {
        self.shortcuts
    }

    /// Walks one slot and returns the produced cell.
    pub fn transform(&mut self, slot: &ValueCell) -> Result<ValueCell> {
        let observed = slot.borrow().clone();
        if observed.is_scalar() {
            return Err(CryoError::IllegalLeaf(observed.kind().to_string()));
        }

        let ref_id = RefId::of(slot);
        if let Some(first) = self.sources.get(&ref_id) {
            if !first.identical(&observed) {
                return Err(CryoError::SourceMutated(format!(
                    "slot first observed as {} revisited as {}",
                    first.kind(),
                    observed.kind()
                )));
            }
            return self.targets.get(&ref_id).cloned().ok_or_else(|| {
                CryoError::Internal("revisited slot has no produced target".into())
            });
        }
        self.sources.insert(ref_id, observed.clone());

        if let Some(obj_id) = ObjId::of(&observed) {
            if let Some(cell) = self.produced.get(&obj_id).cloned() {
                self.targets.insert(ref_id, cell.clone());
                return Ok(cell);
            }
        }

        match &observed {
            Value::Array(arr) => self.transform_array(ref_id, arr),
            // Untouched pass-through is only safe when the subtree holds
            // neither a handle (native refusal) nor a placeholder (which
            // must enter the shortcut list to resolve on decode).
            Value::Object(_) if wire::is_pristine(&observed) => {
                let cell = observed.clone().cell();
                self.register(ref_id, ObjId::of(&observed), &cell);
                Ok(cell)
            }
            _ => self.transform_opaque(ref_id, &observed),
        }
    }

    /// Rebuilds an array entry by entry. The result cell is registered
    /// before the entries are walked so that a slot-level self-cycle
    /// terminates through the revisit check.
    fn transform_array(&mut self, ref_id: RefId, arr: &Array) -> Result<ValueCell> {
        let out = Value::Array(Array::with_capacity(arr.len())).cell();
        self.targets.insert(ref_id, out.clone());

        for (key, cell) in arr.entries() {
            let entry = cell.borrow().clone();
            let produced = if entry.is_scalar() {
                entry.cell()
            } else {
                self.transform(cell)?
            };
            match &mut *out.borrow_mut() {
                Value::Array(result) => result.insert_cell(key.clone(), produced),
                _ => {
                    return Err(CryoError::Internal(
                        "array result cell replaced during walk".into(),
                    ))
                }
            }
        }
        Ok(out)
    }

    /// Escalates a value the native codec refuses into a placeholder.
    ///
    /// A placeholder already present in the input keeps its identity but
    /// still enters the shortcut list, so the decode side visits it like
    /// any other. Otherwise the first matching transformer produces the
    /// placeholder, falling back to a field-snapshot capture.
    fn transform_opaque(&mut self, ref_id: RefId, value: &Value) -> Result<ValueCell> {
        let st = match value {
            Value::Stasis(st) => st.clone(),
            _ => match self.registry.transformer_for(value) {
                Some(t) => t.transform(value).map_err(wrap_transformer_err)?,
                None => Stasis::from_value(value),
            },
        };

        let cell = Value::Stasis(st.clone()).cell();
        self.shortcuts.push(cell.clone());
        self.register(ref_id, ObjId::of(value), &cell);

        // Mandatory ordering: the registration above must precede the
        // payload walk, or a cycle through the payload recurses forever.
        let payload = st.payload();
        let needs_walk = !payload.borrow().is_scalar();
        if needs_walk {
            let walked = self.transform(&payload)?;
            st.set_payload(walked);
        }
        Ok(cell)
    }

    fn register(&mut self, ref_id: RefId, obj_id: Option<ObjId>, cell: &ValueCell) {
        self.targets.insert(ref_id, cell.clone());
        if let Some(obj_id) = obj_id {
            self.produced.insert(obj_id, cell.clone());
        }
    }
}

fn wrap_transformer_err(err: CryoError) -> CryoError {
    match err {
        CryoError::Transformer(_) => err,
        other => CryoError::Transformer(other.to_string()),
    }
}
