//! Cost functor registration model
//!
//! A cost functor is user code that turns point coordinates into squared-loss
//! terms. It is registered once with the CPS and bound to any number of
//! relationships. During exploration the engine hands it a whole batch of
//! relationships at once, together with one scratch context per relationship.

use cpsx_core_types::{CostFunctorUid, PSpaceUid, RelshpId, VariationUid};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::errors::{CpsError, Result};

/// How the number of costs produced by a functor scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CostArity {
    /// `costs_per_item` costs for every relationship
    PerRelationship,
    /// `costs_per_item` costs for every point of every relationship
    PerPoint,
}

/// One relationship of a functor batch, as seen by the functor
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRelshp {
    pub id: RelshpId,
    /// Position inside the full (functor, variation) batch; indexes contexts
    pub batch_index: usize,
    /// Dense point indices (positions in the instance point list)
    pub points: Vec<usize>,
    /// Per-binding configuration supplied at relationship creation
    pub config: Arc<serde_json::Value>,
}

/// Read-only view handed to [`CostFunctor::compute`]
pub struct CostEval<'a> {
    pub pspace: PSpaceUid,
    pub variation: Option<VariationUid>,
    pub components: usize,
    pub relationships: &'a [BatchRelshp],
    coords: &'a [f64],
    contexts: &'a CostContexts,
}

impl<'a> CostEval<'a> {
    pub fn new(
        pspace: PSpaceUid,
        variation: Option<VariationUid>,
        components: usize,
        coords: &'a [f64],
        relationships: &'a [BatchRelshp],
        contexts: &'a CostContexts,
    ) -> Self {
        Self {
            pspace,
            variation,
            components,
            relationships,
            coords,
            contexts,
        }
    }

    /// Coordinates of the point at dense index `idx`, expressed in `pspace`
    /// with `variation` applied
    pub fn point(&self, idx: usize) -> &'a [f64] {
        &self.coords[idx * self.components..(idx + 1) * self.components]
    }

    /// Context seeded for `rel`, if the functor declared a context type `C`
    pub fn context<C: 'static>(&self, rel: &BatchRelshp) -> Option<&'a C> {
        self.contexts.get::<C>(rel.batch_index)
    }
}

/// View handed to [`CostFunctor::contexts_init`] once per batch
pub struct ContextInit<'a> {
    pub pspace: PSpaceUid,
    pub variation: Option<VariationUid>,
    pub relationships: &'a [BatchRelshp],
}

/// User cost code
pub trait CostFunctor: Send + Sync {
    /// Write the costs of every relationship in `eval`, in relationship
    /// order, into `costs`.
    ///
    /// `costs.len()` is exactly the count implied by the registration's arity.
    /// Called repeatedly with perturbed coordinates during finite
    /// differencing, so it must not accumulate state across calls.
    fn compute(&self, eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()>;

    /// Seed the whole context batch after default initialization
    fn contexts_init(&self, _init: &ContextInit<'_>, _contexts: &mut CostContexts) -> Result<()> {
        Ok(())
    }

    /// Release resources held by the context batch before it is freed
    fn contexts_clean(&self, _contexts: &mut CostContexts) {}

    /// Analytic derivatives of the costs in `eval` with respect to the
    /// coordinates of point `point`, row-major `costs × components`.
    ///
    /// Returning `None` selects central finite differences.
    fn jacobian(
        &self,
        _eval: &CostEval<'_>,
        _point: usize,
        _out: &mut [f64],
    ) -> Option<Result<()>> {
        None
    }
}

/// Contiguous batch of per-relationship contexts of one erased type
pub struct CostContexts {
    batch: Box<dyn Any + Send + Sync>,
    len: usize,
    type_name: &'static str,
}

impl CostContexts {
    /// Batch for functors that declared no context type
    pub fn empty(len: usize) -> Self {
        Self {
            batch: Box::new(()),
            len,
            type_name: "()",
        }
    }

    /// One allocation holding `len` clones of `default`
    ///
    /// # Errors
    /// * `MemErr` - the block could not be reserved
    pub fn filled<C: Clone + Send + Sync + 'static>(default: &C, len: usize) -> Result<Self> {
        let mut batch: Vec<C> = Vec::new();
        batch
            .try_reserve_exact(len)
            .map_err(|_| CpsError::OutOfMemory {
                what: "cost context batch",
            })?;
        batch.resize(len, default.clone());
        Ok(Self {
            batch: Box::new(batch),
            len,
            type_name: std::any::type_name::<C>(),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn as_slice<C: 'static>(&self) -> Option<&[C]> {
        self.batch.downcast_ref::<Vec<C>>().map(Vec::as_slice)
    }

    pub fn as_mut_slice<C: 'static>(&mut self) -> Option<&mut [C]> {
        self.batch.downcast_mut::<Vec<C>>().map(Vec::as_mut_slice)
    }

    pub fn get<C: 'static>(&self, index: usize) -> Option<&C> {
        self.as_slice::<C>().and_then(|s| s.get(index))
    }
}

impl fmt::Debug for CostContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostContexts")
            .field("type_name", &self.type_name)
            .field("len", &self.len)
            .finish()
    }
}

type ContextAlloc = dyn Fn(usize) -> Result<CostContexts> + Send + Sync;

/// Descriptor of a functor's per-relationship context type
#[derive(Clone)]
pub struct ContextTypeInfo {
    type_name: &'static str,
    size: usize,
    align: usize,
    alloc: Arc<ContextAlloc>,
}

impl ContextTypeInfo {
    /// Describe context type `C`; every batch starts as clones of `default`
    pub fn of<C: Clone + Send + Sync + 'static>(default: C) -> Self {
        Self {
            type_name: std::any::type_name::<C>(),
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            alloc: Arc::new(move |len| CostContexts::filled(&default, len)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Allocate one default-filled batch of `len` contexts
    ///
    /// # Errors
    /// * `MemErr` - allocation failed
    pub fn alloc_batch(&self, len: usize) -> Result<CostContexts> {
        (self.alloc)(len)
    }
}

impl fmt::Debug for ContextTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTypeInfo")
            .field("type_name", &self.type_name)
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

/// Cost functor registration parameters
#[derive(Clone)]
pub struct CostFunctorParams {
    /// Caller-chosen identity; re-registering a live uid replaces it
    pub uid: CostFunctorUid,

    /// Pspace the functor expects coordinates in
    pub pspace: PSpaceUid,

    pub functor: Arc<dyn CostFunctor>,

    pub arity: CostArity,

    /// Costs written per relationship or per point, depending on `arity`
    pub costs_per_item: usize,

    /// Per-relationship scratch context type, if any
    pub context: Option<ContextTypeInfo>,
}

impl CostFunctorParams {
    pub fn new(
        uid: CostFunctorUid,
        pspace: PSpaceUid,
        functor: Arc<dyn CostFunctor>,
        arity: CostArity,
        costs_per_item: usize,
    ) -> Self {
        Self {
            uid,
            pspace,
            functor,
            arity,
            costs_per_item,
            context: None,
        }
    }

    pub fn with_context(mut self, context: ContextTypeInfo) -> Self {
        self.context = Some(context);
        self
    }

    /// Number of costs produced for a relationship with `points` members
    pub fn costs_for(&self, points: usize) -> usize {
        match self.arity {
            CostArity::PerRelationship => self.costs_per_item,
            CostArity::PerPoint => self.costs_per_item * points,
        }
    }

    /// Allocate the context batch for `len` relationships
    ///
    /// # Errors
    /// * `MemErr` - allocation failed
    pub fn alloc_contexts(&self, len: usize) -> Result<CostContexts> {
        match &self.context {
            Some(info) => info.alloc_batch(len),
            None => Ok(CostContexts::empty(len)),
        }
    }

    /// # Errors
    /// * `BadArg` - invalid uid or pspace, or zero costs per item
    pub fn validate(&self) -> Result<()> {
        if !self.uid.is_valid() {
            return Err(CpsError::bad_arg("cost functor uid is the invalid sentinel"));
        }
        if !self.pspace.is_valid() {
            return Err(CpsError::bad_arg(format!(
                "cost functor {} expects the invalid pspace sentinel",
                self.uid
            )));
        }
        if self.costs_per_item == 0 {
            return Err(CpsError::bad_arg(format!(
                "cost functor {} declares zero costs per item",
                self.uid
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CostFunctorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostFunctorParams")
            .field("uid", &self.uid)
            .field("pspace", &self.pspace)
            .field("arity", &self.arity)
            .field("costs_per_item", &self.costs_per_item)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
