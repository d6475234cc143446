pub mod cost_functor;
pub mod pspace;
pub mod relationship;

pub use cost_functor::{
    BatchRelshp, ContextInit, ContextTypeInfo, CostArity, CostContexts, CostEval, CostFunctor,
    CostFunctorParams,
};
pub use pspace::PSpaceParams;
pub use relationship::{CostBinding, GroupState, RelshpKind, RelshpParams};
