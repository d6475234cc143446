pub mod functor_ops;
pub mod group_ops;
pub mod id_pool;
pub mod point_ops;
pub mod pspace_ops;
pub mod relshp_ops;
pub mod store;

pub use id_pool::{PoolId, SlotTable};
pub use store::CpsStore;
