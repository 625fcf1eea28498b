//! The public codec entry point.
//!
//! [`Cryo`] binds a secret and an ordered transformer registry, and
//! exposes the two operations of the library: [`Cryo::serialize`] and
//! [`Cryo::unserialize`].
//!
//! ## Byte Format
//!
//! With a secret configured, output is `HEX64 "|" PAYLOAD` where `HEX64`
//! is the lowercase hex HMAC-SHA-256 of `PAYLOAD` under the secret. With
//! an empty secret the payload stands alone. The payload is the native
//! wire encoding of either the root value (fast path) or the envelope
//! (slow path).

use crate::decode::Decoder;
use crate::encode::Encoder;
use crate::error::{CryoError, Result};
use crate::stasis::Envelope;
use crate::transform::{Transformer, TransformerRegistry};
use crate::value::ValueCell;
use crate::wire::{self, Decoded};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the hex-encoded authentication tag.
const SIGNATURE_HEX_LEN: usize = 64;
/// Separator between the tag and the payload.
const SIGNATURE_SEPARATOR: u8 = b'|';

/// A value codec parameterized by a secret and a transformer registry.
///
/// A codec call is single-threaded and non-reentrant; independent codec
/// instances over independent graphs may run in parallel. All walk state
/// is scoped to one `serialize`/`unserialize` call and torn down on every
/// exit path.
///
/// ```rust
/// use cryo::{Array, Cryo, Value};
///
/// let codec = Cryo::new("");
/// let mut root = Array::new();
/// root.insert("greeting", Value::from("hello"));
/// let bytes = codec.serialize(&Value::Array(root).cell())?;
/// let back = codec.unserialize(&bytes)?;
/// # let _ = back;
/// # Ok::<(), cryo::CryoError>(())
/// ```
#[derive(Debug, Default)]
pub struct Cryo {
    secret: String,
    registry: TransformerRegistry,
}

impl Cryo {
    /// Creates a codec. An empty secret disables authentication.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            registry: TransformerRegistry::new(),
        }
    }

    /// Builder-style transformer registration. Appends, like
    /// [`Cryo::add_transformer`].
    pub fn with_transformer(mut self, transformer: Box<dyn Transformer>) -> Self {
        self.registry.register(transformer);
        self
    }

    /// Appends a transformer to the registry. First match wins, so a
    /// transformer added later cannot shadow an earlier one.
    pub fn add_transformer(&mut self, transformer: Box<dyn Transformer>) {
        self.registry.register(transformer);
    }

    /// The transformer registry.
    pub fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    /// Encodes a value graph into a byte string.
    ///
    /// The fast path hands the graph to the native codec untouched. The
    /// graph walker runs only when the graph holds a live handle (which
    /// the native codec refuses) or a pre-built placeholder (which must
    /// enter an envelope's shortcut list to resolve on decode); it
    /// rewrites the offending values and wraps the result in an envelope.
    pub fn serialize(&self, root: &ValueCell) -> Result<Vec<u8>> {
        let pristine = wire::is_pristine(&root.borrow());
        let payload = if pristine {
            wire::encode_value(root)?
        } else {
            self.escalate(root)?
        };
        self.seal(payload)
    }

    /// Decodes a byte string back into a value graph, verifying the
    /// authentication tag first when a secret is configured.
    pub fn unserialize(&self, bytes: &[u8]) -> Result<ValueCell> {
        let payload = self.open(bytes)?;
        match wire::decode(payload)? {
            Decoded::Plain(cell) => Ok(cell),
            Decoded::Enveloped(envelope) => {
                let mut decoder = Decoder::new(&self.registry);
                decoder.run(&envelope)?;
                Ok(envelope.value)
            }
        }
    }

    /// The slow path: walk, substitute placeholders, wrap in an envelope.
    fn escalate(&self, root: &ValueCell) -> Result<Vec<u8>> {
        let mut encoder = Encoder::new(&self.registry);
        let value = encoder.transform(root)?;
        let shortcuts = encoder.into_shortcuts();
        if shortcuts.is_empty() {
            wire::encode_value(&value)
        } else {
            wire::encode_envelope(&Envelope { value, shortcuts })
        }
    }

    fn seal(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        if self.secret.is_empty() {
            return Ok(payload);
        }
        let tag = self.sign(&payload)?;
        let mut out = Vec::with_capacity(SIGNATURE_HEX_LEN + 1 + payload.len());
        out.extend_from_slice(tag.as_bytes());
        out.push(SIGNATURE_SEPARATOR);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn open<'b>(&self, bytes: &'b [u8]) -> Result<&'b [u8]> {
        if self.secret.is_empty() {
            return Ok(bytes);
        }
        if bytes.len() <= SIGNATURE_HEX_LEN || bytes[SIGNATURE_HEX_LEN] != SIGNATURE_SEPARATOR {
            return Err(CryoError::SignatureMismatch);
        }
        let prefix = &bytes[..SIGNATURE_HEX_LEN];
        let payload = &bytes[SIGNATURE_HEX_LEN + 1..];
        // The tag is emitted lowercase; an uppercase spelling of the right
        // digest does not verify.
        if !prefix
            .iter()
            .all(|b| matches!(*b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(CryoError::SignatureMismatch);
        }
        let claimed = hex::decode(prefix).map_err(|_| CryoError::SignatureMismatch)?;
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&claimed)
            .map_err(|_| CryoError::SignatureMismatch)?;
        Ok(payload)
    }

    fn sign(&self, payload: &[u8]) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| CryoError::Internal(format!("hmac key setup: {e}")))
    }
}
