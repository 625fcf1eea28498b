//! The native wire codec: physical byte layout for value graphs.
//!
//! This is the "ordinary subtree" serializer the codec core builds on. It
//! turns a [`Value`] graph into a self-describing byte string and back,
//! preserving shared-slot and object identity, and it **refuses** any graph
//! containing a live [`HostHandle`] — that refusal is exactly what triggers
//! the encoder's escalation to placeholders.
//!
//! ## Byte Layout
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Magic "CRY1" (4 bytes)           │
//! ├──────────────────────────────────┤
//! │ WireNode tree (bincode, standard │
//! │ configuration)                   │
//! └──────────────────────────────────┘
//! ```
//!
//! ## Identity Preservation
//!
//! Slots, objects and placeholders that occur more than once are emitted
//! exactly once under a numeric id and referenced with [`WireNode::Ref`]
//! afterwards:
//!
//! - A shared *slot* (an aliased storage cell) is wrapped in
//!   [`WireNode::Shared`]; a `Ref` to it reproduces the very same cell on
//!   decode, so aliasing survives.
//! - A shared *object* or *placeholder* reached through distinct slots
//!   carries its id inline; a `Ref` to it reproduces a fresh slot holding
//!   the same entity.
//!
//! Which nodes are shared is discovered by a survey pass over the graph
//! before emission; the survey is also the cheap answer to "does this
//! value need the graph walk at all?" ([`is_pristine`]). Cycles are safe
//! in both passes because every id is registered before its children are
//! walked.
//!
//! ## Compatibility
//!
//! Readers must check the magic bytes before parsing. The bincode layer
//! uses `bincode::config::standard()`; decoding validates that the byte
//! string is fully consumed so trailing garbage is rejected.

use crate::error::{CryoError, Result};
use crate::stasis::{Envelope, Stasis};
use crate::value::{Array, Key, Object, Value, ValueCell};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Magic bytes identifying the wire format: "CRY1".
pub const MAGIC_BYTES: [u8; 4] = *b"CRY1";

/// One node of the wire tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireNode {
    /// Null scalar.
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
    Array {
        /// Entries in insertion order.
        entries: Vec<(Key, WireNode)>,
    },
    /// Object with class identity. `id` is present when the object is
    /// referenced from more than one slot.
    Object {
        /// Identity id, when shared.
        id: Option<u32>,
        /// Class name.
        class: String,
        /// Named fields in declaration order.
        fields: Vec<(Key, WireNode)>,
    },
    /// Placeholder record. `id` is present when shared, which is always
    /// the case inside an envelope (shortcut list + value occurrence).
    Stasis {
        /// Identity id, when shared.
        id: Option<u32>,
        /// Class tag naming the live type this stands for.
        class_tag: String,
        /// Payload subgraph.
        payload: Box<WireNode>,
    },
    /// A shared storage cell, emitted at its first occurrence.
    Shared {
        /// Identity id.
        id: u32,
        /// The cell's content.
        value: Box<WireNode>,
    },
    /// Back-reference to a previously emitted shared cell, object or
    /// placeholder.
    Ref(u32),
    /// The slow-path wrapper: shortcut definitions first, then the value
    /// graph referencing into them.
    Envelope {
        /// Placeholder cells in creation order.
        shortcuts: Vec<WireNode>,
        /// The transformed root.
        value: Box<WireNode>,
    },
}

/// Outcome of decoding a byte string.
#[derive(Debug)]
pub enum Decoded {
    /// Fast-path output: the root value never needed placeholders.
    Plain(ValueCell),
    /// Slow-path output: an envelope whose shortcuts still hold
    /// unresolved placeholders.
    Enveloped(Envelope),
}

fn cell_addr(cell: &ValueCell) -> usize {
    Rc::as_ptr(cell) as usize
}

/// Marks which cells and entities occur more than once, rejects live
/// handles, and remembers whether any placeholder was seen. Registering a
/// node before walking its children makes cycles terminate.
#[derive(Default)]
struct Survey {
    seen_cells: HashSet<usize>,
    shared_cells: HashSet<usize>,
    seen_entities: HashSet<usize>,
    shared_entities: HashSet<usize>,
    saw_stasis: bool,
}

impl Survey {
    fn visit_cell(&mut self, cell: &ValueCell) -> Result<()> {
        let addr = cell_addr(cell);
        if !self.seen_cells.insert(addr) {
            self.shared_cells.insert(addr);
            return Ok(());
        }
        let value = cell.borrow().clone();
        self.visit_value(&value)
    }

    fn visit_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Array(arr) => {
                for (_, cell) in arr.entries() {
                    self.visit_cell(cell)?;
                }
            }
            Value::Object(obj) => {
                let addr = Rc::as_ptr(obj) as usize;
                if !self.seen_entities.insert(addr) {
                    self.shared_entities.insert(addr);
                    return Ok(());
                }
                let (class, fields, has_handle) = {
                    let o = obj.borrow();
                    (o.class.clone(), o.fields.clone(), o.handle.is_some())
                };
                if has_handle {
                    return Err(CryoError::Native(format!(
                        "object of class '{class}' wraps a live handle"
                    )));
                }
                for (_, cell) in fields.entries() {
                    self.visit_cell(cell)?;
                }
            }
            Value::Stasis(st) => {
                self.saw_stasis = true;
                let addr = Rc::as_ptr(st) as *const () as usize;
                if !self.seen_entities.insert(addr) {
                    self.shared_entities.insert(addr);
                    return Ok(());
                }
                self.visit_cell(&st.payload())?;
            }
            Value::Handle(h) => {
                return Err(CryoError::Native(format!(
                    "cannot encode live handle '{}'",
                    h.tag()
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Whether `value` can skip the graph walk entirely.
///
/// This runs the survey walk only; the byte-producing pass is skipped.
/// Two things force the walk: a live handle anywhere in the subtree (the
/// native codec refuses those), and a placeholder anywhere in the subtree
/// (the native codec encodes those happily, but only the walk registers
/// them in the shortcut list so the decode side resolves them).
pub fn is_pristine(value: &Value) -> bool {
    let mut survey = Survey::default();
    survey.visit_value(value).is_ok() && !survey.saw_stasis
}

struct Emitter {
    survey: Survey,
    cell_ids: HashMap<usize, u32>,
    entity_ids: HashMap<usize, u32>,
    next_id: u32,
}

impl Emitter {
    fn new(survey: Survey) -> Self {
        Self {
            survey,
            cell_ids: HashMap::new(),
            entity_ids: HashMap::new(),
            next_id: 0,
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn emit_cell(&mut self, cell: &ValueCell) -> Result<WireNode> {
        let addr = cell_addr(cell);
        if self.survey.shared_cells.contains(&addr) {
            if let Some(&id) = self.cell_ids.get(&addr) {
                return Ok(WireNode::Ref(id));
            }
            let id = self.alloc_id();
            self.cell_ids.insert(addr, id);
            let value = cell.borrow().clone();
            let inner = self.emit_value(&value)?;
            return Ok(WireNode::Shared {
                id,
                value: Box::new(inner),
            });
        }
        let value = cell.borrow().clone();
        self.emit_value(&value)
    }

    fn emit_value(&mut self, value: &Value) -> Result<WireNode> {
        match value {
            Value::Null => Ok(WireNode::Null),
            Value::Bool(b) => Ok(WireNode::Bool(*b)),
            Value::Int(i) => Ok(WireNode::Int(*i)),
            Value::Float(f) => Ok(WireNode::Float(*f)),
            Value::Str(s) => Ok(WireNode::Str(s.clone())),
            Value::Array(arr) => {
                let mut entries = Vec::with_capacity(arr.len());
                for (key, cell) in arr.entries() {
                    entries.push((key.clone(), self.emit_cell(cell)?));
                }
                Ok(WireNode::Array { entries })
            }
            Value::Object(obj) => {
                let addr = Rc::as_ptr(obj) as usize;
                if let Some(&id) = self.entity_ids.get(&addr) {
                    return Ok(WireNode::Ref(id));
                }
                // The id must exist before the fields are walked so that a
                // cycle back into this object emits a Ref.
                let id = if self.survey.shared_entities.contains(&addr) {
                    let id = self.alloc_id();
                    self.entity_ids.insert(addr, id);
                    Some(id)
                } else {
                    None
                };
                let (class, field_table) = {
                    let o = obj.borrow();
                    (o.class.clone(), o.fields.clone())
                };
                let mut fields = Vec::with_capacity(field_table.len());
                for (key, cell) in field_table.entries() {
                    fields.push((key.clone(), self.emit_cell(cell)?));
                }
                Ok(WireNode::Object { id, class, fields })
            }
            Value::Stasis(st) => {
                let addr = Rc::as_ptr(st) as *const () as usize;
                if let Some(&id) = self.entity_ids.get(&addr) {
                    return Ok(WireNode::Ref(id));
                }
                let id = if self.survey.shared_entities.contains(&addr) {
                    let id = self.alloc_id();
                    self.entity_ids.insert(addr, id);
                    Some(id)
                } else {
                    None
                };
                let payload = self.emit_cell(&st.payload())?;
                Ok(WireNode::Stasis {
                    id,
                    class_tag: st.class_tag().to_string(),
                    payload: Box::new(payload),
                })
            }
            Value::Handle(h) => Err(CryoError::Native(format!(
                "cannot encode live handle '{}'",
                h.tag()
            ))),
        }
    }
}

/// Encodes a root value.
pub fn encode_value(root: &ValueCell) -> Result<Vec<u8>> {
    let mut survey = Survey::default();
    survey.visit_cell(root)?;
    let mut emitter = Emitter::new(survey);
    let node = emitter.emit_cell(root)?;
    to_bytes(&node)
}

/// Encodes an envelope. Shortcut cells are surveyed and emitted before the
/// value graph, so every placeholder definition precedes its references.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut survey = Survey::default();
    for cell in &envelope.shortcuts {
        survey.visit_cell(cell)?;
    }
    survey.visit_cell(&envelope.value)?;

    let mut emitter = Emitter::new(survey);
    let mut shortcuts = Vec::with_capacity(envelope.shortcuts.len());
    for cell in &envelope.shortcuts {
        shortcuts.push(emitter.emit_cell(cell)?);
    }
    let value = emitter.emit_cell(&envelope.value)?;
    to_bytes(&WireNode::Envelope {
        shortcuts,
        value: Box::new(value),
    })
}

fn to_bytes(node: &WireNode) -> Result<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(node, bincode::config::standard())
        .map_err(|e| CryoError::Native(e.to_string()))?;
    let mut out = Vec::with_capacity(MAGIC_BYTES.len() + body.len());
    out.extend_from_slice(&MAGIC_BYTES);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parses a byte string into the raw wire tree without rebuilding cells.
pub fn decode_node(bytes: &[u8]) -> Result<WireNode> {
    let magic = bytes
        .get(..MAGIC_BYTES.len())
        .ok_or_else(|| CryoError::Native("byte string shorter than magic".into()))?;
    if magic != &MAGIC_BYTES[..] {
        return Err(CryoError::Native("bad magic bytes".into()));
    }
    let body = &bytes[MAGIC_BYTES.len()..];
    let (node, consumed) = bincode::serde::decode_from_slice(body, bincode::config::standard())
        .map_err(|e| CryoError::Native(e.to_string()))?;
    if consumed != body.len() {
        return Err(CryoError::Native(format!(
            "{} trailing bytes after wire tree",
            body.len() - consumed
        )));
    }
    Ok(node)
}

/// Decodes a byte string back into a live graph.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
    let node = decode_node(bytes)?;
    let mut raiser = Raiser::default();
    match node {
        WireNode::Envelope { shortcuts, value } => {
            let mut cells = Vec::with_capacity(shortcuts.len());
            for node in shortcuts {
                cells.push(raiser.raise_cell(node)?);
            }
            let value = raiser.raise_cell(*value)?;
            Ok(Decoded::Enveloped(Envelope {
                value,
                shortcuts: cells,
            }))
        }
        other => Ok(Decoded::Plain(raiser.raise_cell(other)?)),
    }
}

/// Rebuilds cells and entities from the wire tree. Ids are registered
/// before children are raised, mirroring the emitter, so back-references
/// inside cycles always find their target.
#[derive(Default)]
struct Raiser {
    cells: HashMap<u32, ValueCell>,
    objects: HashMap<u32, Rc<RefCell<Object>>>,
    stases: HashMap<u32, Rc<Stasis>>,
}

impl Raiser {
    fn raise_cell(&mut self, node: WireNode) -> Result<ValueCell> {
        match node {
            WireNode::Shared { id, value } => {
                let cell = Value::Null.cell();
                self.cells.insert(id, cell.clone());
                let raised = self.raise_value(*value)?;
                *cell.borrow_mut() = raised;
                Ok(cell)
            }
            WireNode::Ref(id) => {
                if let Some(cell) = self.cells.get(&id) {
                    return Ok(cell.clone());
                }
                Ok(self.raise_entity_ref(id)?.cell())
            }
            other => Ok(self.raise_value(other)?.cell()),
        }
    }

    fn raise_value(&mut self, node: WireNode) -> Result<Value> {
        match node {
            WireNode::Null => Ok(Value::Null),
            WireNode::Bool(b) => Ok(Value::Bool(b)),
            WireNode::Int(i) => Ok(Value::Int(i)),
            WireNode::Float(f) => Ok(Value::Float(f)),
            WireNode::Str(s) => Ok(Value::Str(s)),
            WireNode::Array { entries } => {
                let mut arr = Array::with_capacity(entries.len());
                for (key, node) in entries {
                    arr.insert_cell(key, self.raise_cell(node)?);
                }
                Ok(Value::Array(arr))
            }
            WireNode::Object { id, class, fields } => {
                let obj = Rc::new(RefCell::new(Object::new(class)));
                if let Some(id) = id {
                    self.objects.insert(id, obj.clone());
                }
                let mut table = Array::with_capacity(fields.len());
                for (key, node) in fields {
                    table.insert_cell(key, self.raise_cell(node)?);
                }
                obj.borrow_mut().fields = table;
                Ok(Value::Object(obj))
            }
            WireNode::Stasis {
                id,
                class_tag,
                payload,
            } => {
                let st = Stasis::new(class_tag);
                if let Some(id) = id {
                    self.stases.insert(id, st.clone());
                }
                st.set_payload(self.raise_cell(*payload)?);
                Ok(Value::Stasis(st))
            }
            WireNode::Ref(id) => self.raise_entity_ref(id),
            WireNode::Shared { .. } => Err(CryoError::Native(
                "shared slot nested in value position".into(),
            )),
            WireNode::Envelope { .. } => {
                Err(CryoError::Native("envelope nested inside a value".into()))
            }
        }
    }

    fn raise_entity_ref(&self, id: u32) -> Result<Value> {
        if let Some(obj) = self.objects.get(&id) {
            return Ok(Value::Object(obj.clone()));
        }
        if let Some(st) = self.stases.get(&id) {
            return Ok(Value::Stasis(st.clone()));
        }
        Err(CryoError::Native(format!("dangling reference id {id}")))
    }
}
