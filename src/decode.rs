//! The decode-side graph walker.
//!
//! After the native codec has rebuilt the envelope, every shortcut cell
//! still holds an unresolved placeholder. The walker visits the shortcuts
//! in order, resolves each placeholder's payload before handing it to a
//! transformer, and overwrites the placeholder's cell with the
//! reconstructed live value. Because a shortcut cell is the same storage
//! cell as the placeholder's occurrence inside the envelope value, the
//! overwrite is visible everywhere at once.
//!
//! Cycles are broken by the pending-callback table: a slot that is
//! re-entered while its own resolution is still on the stack defers by
//! registering a completion callback instead of recursing, and the
//! callback runs when the first entry finishes. For any given slot, only
//! one recursion chain produces the resolved value.

use crate::error::{CryoError, Result};
use crate::ident::RefId;
use crate::stasis::Envelope;
use crate::transform::TransformerRegistry;
use crate::value::{Value, ValueCell};
use std::collections::HashMap;

type Fixup = Box<dyn FnOnce(&Value)>;

/// One decode call's bookkeeping state.
pub struct Decoder<'a> {
    registry: &'a TransformerRegistry,
    /// Slots currently being resolved, each with the callbacks to run on
    /// completion.
    pending: HashMap<RefId, Vec<Fixup>>,
}

impl<'a> Decoder<'a> {
    /// Creates a walker with an empty pending table.
    pub fn new(registry: &'a TransformerRegistry) -> Self {
        Self {
            registry,
            pending: HashMap::new(),
        }
    }

    /// Resolves every shortcut of the envelope, in order.
    pub fn run(&mut self, envelope: &Envelope) -> Result<()> {
        for cell in &envelope.shortcuts {
            self.resolve(cell)?;
        }
        Ok(())
    }

    /// Resolves one slot: recurses through arrays, reconstructs
    /// placeholders, defers on re-entry.
    fn resolve(&mut self, slot: &ValueCell) -> Result<()> {
        let ref_id = RefId::of(slot);
        if let Some(callbacks) = self.pending.get_mut(&ref_id) {
            let target = slot.clone();
            callbacks.push(Box::new(move |resolved| {
                *target.borrow_mut() = resolved.clone();
            }));
            return Ok(());
        }
        self.pending.insert(ref_id, Vec::new());

        self.resolve_slot(slot)?;

        let resolved = slot.borrow().clone();
        if let Some(callbacks) = self.pending.remove(&ref_id) {
            for callback in callbacks {
                callback(&resolved);
            }
        }
        Ok(())
    }

    fn resolve_slot(&mut self, slot: &ValueCell) -> Result<()> {
        let current = slot.borrow().clone();
        match current {
            Value::Array(arr) => {
                for (_, cell) in arr.entries() {
                    let recurse = matches!(&*cell.borrow(), Value::Array(_) | Value::Stasis(_));
                    if recurse {
                        self.resolve(cell)?;
                    }
                }
                Ok(())
            }
            Value::Stasis(st) => {
                if let Some(instance) = st.instance() {
                    *slot.borrow_mut() = instance;
                    return Ok(());
                }

                // Payload first: a transformer must see its placeholder
                // fully populated before it reconstructs.
                let payload = st.payload();
                let recurse = matches!(&*payload.borrow(), Value::Array(_) | Value::Stasis(_));
                if recurse {
                    self.resolve(&payload)?;
                }

                let live = match self.registry.resolver_for(&st) {
                    Some(t) => t.resolve(&st).map_err(|e| match e {
                        CryoError::Transformer(_) => e,
                        other => CryoError::Transformer(other.to_string()),
                    })?,
                    None => st.default_instance()?,
                };
                st.set_instance(live.clone());
                *slot.borrow_mut() = live;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
