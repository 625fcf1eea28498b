//! Centralized error handling for Cryo.
//!
//! All failure conditions are propagated through the `Result` type; the
//! library contains no panicking paths (enforced by the crate-level clippy
//! lints).
//!
//! ## Error Categories
//!
//! - **Signature** ([`CryoError::SignatureMismatch`]): the authentication
//!   tag does not match the payload under the configured secret.
//! - **Encoding** ([`CryoError::SourceMutated`], [`CryoError::IllegalLeaf`]):
//!   violations detected by the encode walker.
//! - **Decoding** ([`CryoError::UnresolvableStasis`]): a placeholder reached
//!   the decoder with no resolving transformer and no default instance.
//! - **Transformers** ([`CryoError::Transformer`]): a user bridge failed;
//!   the underlying message is wrapped and re-surfaced.
//! - **Native codec** ([`CryoError::Native`]): the wire codec refused a
//!   value in a context where escalation is not possible, or the byte
//!   string is corrupted.
//! - **Internal** ([`CryoError::Internal`]): logic errors (should not occur
//!   in production).
//!
//! ## Propagation Policy
//!
//! The native codec's refusal of a root value is the one failure that is
//! recovered rather than surfaced: it routes the call onto the slow path.
//! Everything else surfaces to the caller after the per-call bookkeeping
//! tables are torn down.

use std::fmt;

/// A specialized `Result` type for Cryo operations.
pub type Result<T> = std::result::Result<T, CryoError>;

/// The master error enum covering all failure domains in Cryo.
///
/// The type is `Clone` so errors can be stored for later analysis or
/// replayed in tests without re-running the failing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryoError {
    /// The authentication tag does not match the payload under the secret.
    ///
    /// Raised for any malformed prefix as well: a missing separator, a
    /// prefix of the wrong length, or non-hex characters all count as a
    /// mismatch rather than a distinct parse error, so an attacker learns
    /// nothing about which check failed.
    SignatureMismatch,

    /// A storage cell was revisited during encoding and its value had
    /// changed since the first visit.
    ///
    /// This indicates caller mutation during `serialize` (typically from a
    /// transformer reaching back into the input graph) and is fatal.
    SourceMutated(String),

    /// The encode walker was entered with a scalar slot.
    ///
    /// Scalar leaves are copied by value during their parent's walk and
    /// never recursed into; hitting one at a walker entry point is an
    /// internal invariant violation.
    IllegalLeaf(String),

    /// Decoding reached a placeholder with no resolving transformer and no
    /// default reconstruction rule. Carries the placeholder's class tag.
    UnresolvableStasis(String),

    /// A transformer failed during `transform` or `resolve`.
    Transformer(String),

    /// The native wire codec refused a value, or the encoded byte string
    /// is truncated, has bad magic, or contains dangling references.
    Native(String),

    /// Logic error in the codec. Should not occur in production; please
    /// report with a minimal reproduction case.
    Internal(String),
}

impl fmt::Display for CryoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMismatch => write!(f, "Signature Error: authentication tag mismatch"),
            Self::SourceMutated(s) => write!(f, "Encode Error: source mutated during serialization ({s})"),
            Self::IllegalLeaf(s) => write!(f, "Encode Error: walker entered at a scalar slot ({s})"),
            Self::UnresolvableStasis(tag) => {
                write!(f, "Decode Error: no transformer resolves placeholder '{tag}' and it has no default instance")
            }
            Self::Transformer(s) => write!(f, "Transformer Error: {s}"),
            Self::Native(s) => write!(f, "Native Codec Error: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for CryoError {}
