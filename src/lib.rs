//! # Cryo
//!
//! A graph-preserving value serializer for dynamic object graphs,
//! including values no ordinary codec will take: closures, live
//! coroutine/fiber handles, resource handles, and cyclic graphs passing
//! through any of them.
//!
//! ## Overview
//!
//! Cryo does not force a value graph through a byte encoder and hope.
//! It first offers the graph to the native wire codec untouched (the
//! **fast path**); only when the graph needs intervention — some subtree
//! holds a live host value the codec refuses, or a placeholder that must
//! be registered for resolution — does it walk the graph and rewrite
//! exactly the offending values into neutral placeholder records (the
//! **slow path**), leaving everything else as it was. Decoding reverses
//! the rewrite, handing each placeholder to a user-registered transformer
//! that knows how to bring its kind of value back to life.
//!
//! ### Key Properties
//!
//! *   **Identity-preserving:** aliased slots stay aliased and shared
//!     objects stay shared across a round trip, on both paths.
//! *   **Cycle-safe:** cyclic graphs encode and decode, including cycles
//!     that pass through placeholders; a transformer always sees its
//!     placeholder's payload fully populated before it reconstructs.
//! *   **Minimal rewriting:** subtrees the native codec accepts pass
//!     through byte-for-byte untouched; escalation happens per value,
//!     not per graph.
//! *   **Authenticated:** with a secret configured, output carries an
//!     HMAC-SHA-256 tag and decoding refuses anything that does not
//!     verify.
//!
//! ## Architecture
//!
//! ### The Two-Phase Walk
//!
//! Encoding is a recursive walk that produces a *transformed copy* of the
//! input. Two identity tables drive it: a reference table keyed by
//! storage cell (so aliasing and revisits resolve to the one produced
//! cell, and mid-walk mutation of the input is detected and fatal) and an
//! object table keyed by live identity (so two slots holding the same
//! closure yield one placeholder). Placeholders are registered *before*
//! their payloads are walked — that ordering is what lets a cycle through
//! a placeholder terminate.
//!
//! Decoding walks the envelope's shortcut list — every placeholder, in
//! creation order, without re-traversing the value — resolving payloads
//! first and deferring re-entered slots through a pending-callback table.
//!
//! ### The Envelope
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ HEX64 signature "|"   (only with a secret)  │
//! ├─────────────────────────────────────────────┤
//! │ Native wire bytes of:                       │
//! │   the root value            (fast path)     │
//! │   Envelope {shortcuts, value} (slow path)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Each shortcut shares its storage cell with that placeholder's
//! occurrence inside the value, so resolving a shortcut repairs the value
//! graph in place.
//!
//! ## Usage
//!
//! ```rust
//! use cryo::{Array, Cryo, FnTransformer, HostHandle, Stasis, Value};
//!
//! // A live value the native codec refuses.
//! let job = HostHandle::new("closure", || 42);
//!
//! let codec = Cryo::new("%SECRET%").with_transformer(Box::new(FnTransformer::new(
//!     |v| matches!(v, Value::Handle(h) if h.tag() == "closure"),
//!     |_| Ok(Stasis::new("closure")),
//!     |s| s.class_tag() == "closure",
//!     |_| Ok(Value::Str("thawed".into())),
//! )));
//!
//! let mut root = Array::new();
//! root.insert("job", Value::Handle(job));
//! let bytes = codec.serialize(&Value::Array(root).cell())?;
//! let back = codec.unserialize(&bytes)?;
//! # let _ = back;
//! # Ok::<(), cryo::CryoError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No Panics:** no `unwrap()` or `panic!()` in the library (enforced
//!   by clippy lints).
//! * **Comprehensive Errors:** all failures correspond to a
//!   [`CryoError`] variant; only the fast path's native refusal is
//!   recovered internally (it triggers the slow path).
//! * **Call-Scoped State:** every walk's bookkeeping is created at call
//!   start and dropped on all exit paths, so a failed call leaves no
//!   residue for the next one.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod error;
pub mod inspector;
pub mod stasis;
pub mod transform;
pub mod value;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod decode;
#[doc(hidden)]
pub mod encode;
#[doc(hidden)]
pub mod wire;

// Private modules
mod ident;

// --- RE-EXPORTS ---

pub use api::Cryo;
pub use error::{CryoError, Result};
pub use inspector::{CryoInspector, DebugReport};
pub use stasis::{Envelope, Stasis};
pub use transform::{FnTransformer, Transformer, TransformerRegistry};
pub use value::{deep_eq, Array, HostHandle, Key, Object, Value, ValueCell};
