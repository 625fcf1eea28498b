//! The transformer interface and its ordered registry.
//!
//! Transformers are user-authored bridges between live values the native
//! codec refuses and the placeholders that stand in for them on the wire.
//! The registry consults them in registration order and the **first match
//! wins**, on both the encode side (`transforms`) and the decode side
//! (`resolves`). Registration appends, so a transformer registered later
//! cannot shadow an earlier one unless it is inserted ahead explicitly by
//! rebuilding the registry.

use crate::error::Result;
use crate::stasis::Stasis;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// A bridge between live values and placeholders.
///
/// `transforms` and `resolves` are consulted during the walk and must be
/// side-effect free. `transform` may return a placeholder whose payload
/// still contains live unserializable values; the encoder recursively
/// transforms the payload after registering the placeholder. `resolve` is
/// called with the placeholder's payload fully resolved.
pub trait Transformer: fmt::Debug {
    /// May this transformer encode `value`?
    fn transforms(&self, value: &Value) -> bool;

    /// Produces the placeholder standing in for `value`.
    fn transform(&self, value: &Value) -> Result<Rc<Stasis>>;

    /// May this transformer decode `stasis`?
    fn resolves(&self, stasis: &Stasis) -> bool;

    /// Produces the live value for `stasis`, whose payload has been
    /// resolved before this call.
    fn resolve(&self, stasis: &Stasis) -> Result<Value>;
}

/// The ordered list of transformers a codec consults.
#[derive(Debug, Default)]
pub struct TransformerRegistry {
    entries: Vec<Box<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transformer. Earlier registrations win ties.
    pub fn register(&mut self, transformer: Box<dyn Transformer>) {
        self.entries.push(transformer);
    }

    /// The first transformer claiming `value`, if any.
    pub fn transformer_for(&self, value: &Value) -> Option<&dyn Transformer> {
        self.entries
            .iter()
            .map(|t| t.as_ref())
            .find(|t| t.transforms(value))
    }

    /// The first transformer claiming `stasis`, if any.
    pub fn resolver_for(&self, stasis: &Stasis) -> Option<&dyn Transformer> {
        self.entries
            .iter()
            .map(|t| t.as_ref())
            .find(|t| t.resolves(stasis))
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type TransformsFn = dyn Fn(&Value) -> bool;
type TransformFn = dyn Fn(&Value) -> Result<Rc<Stasis>>;
type ResolvesFn = dyn Fn(&Stasis) -> bool;
type ResolveFn = dyn Fn(&Stasis) -> Result<Value>;

/// A [`Transformer`] assembled from four closures.
///
/// Convenient for one-off bridges and tests:
///
/// ```rust
/// use cryo::{FnTransformer, Stasis, Value};
///
/// let bridge = FnTransformer::new(
///     |v| matches!(v, Value::Handle(h) if h.tag() == "closure"),
///     |_| Ok(Stasis::new("closure")),
///     |s| s.class_tag() == "closure",
///     |_| Ok(Value::Str("reconstructed".into())),
/// );
/// ```
pub struct FnTransformer {
    transforms: Box<TransformsFn>,
    transform: Box<TransformFn>,
    resolves: Box<ResolvesFn>,
    resolve: Box<ResolveFn>,
}

impl FnTransformer {
    /// Builds a transformer from the four operations.
    pub fn new(
        transforms: impl Fn(&Value) -> bool + 'static,
        transform: impl Fn(&Value) -> Result<Rc<Stasis>> + 'static,
        resolves: impl Fn(&Stasis) -> bool + 'static,
        resolve: impl Fn(&Stasis) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            transforms: Box::new(transforms),
            transform: Box::new(transform),
            resolves: Box::new(resolves),
            resolve: Box::new(resolve),
        }
    }
}

impl Transformer for FnTransformer {
    fn transforms(&self, value: &Value) -> bool {
        (self.transforms)(value)
    }

    fn transform(&self, value: &Value) -> Result<Rc<Stasis>> {
        (self.transform)(value)
    }

    fn resolves(&self, stasis: &Stasis) -> bool {
        (self.resolves)(stasis)
    }

    fn resolve(&self, stasis: &Stasis) -> Result<Value> {
        (self.resolve)(stasis)
    }
}

impl fmt::Debug for FnTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer").finish_non_exhaustive()
    }
}
