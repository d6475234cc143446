use std::sync::Arc;

use cpsx_core::{
    CostArity, CostBinding, CostEval, CostFunctor, CostFunctorParams, Cps, PSpaceParams,
    RelshpParams, Result,
};
use cpsx_core_types::{
    AttribLayout, CostFunctorId, CostFunctorUid, PSpaceUid, PointId, RelshpId, ScalarType,
    VariationUid,
};

#[allow(dead_code)]
pub const RGB: PSpaceUid = PSpaceUid::new(1);
#[allow(dead_code)]
pub const LAB: PSpaceUid = PSpaceUid::new(2);

#[allow(dead_code)]
/// Cost functor writing a constant into every cost slot
pub struct ConstCost(pub f64);

impl CostFunctor for ConstCost {
    fn compute(&self, _eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()> {
        costs.fill(self.0);
        Ok(())
    }
}

/// Three-component f32 pspace with the given variations
#[allow(dead_code)]
pub fn pspace(uid: PSpaceUid, variations: &[u32]) -> PSpaceParams {
    PSpaceParams::new(uid, AttribLayout::with_coords(3, ScalarType::F32))
        .with_variations(variations.iter().map(|v| VariationUid::new(*v)))
}

/// CPS with the RGB pspace declared and `points` points added
#[allow(dead_code)]
pub fn cps_with_points(points: usize) -> (Cps, Vec<PointId>) {
    let cps = Cps::new();
    cps.pspaces_declare(&[pspace(RGB, &[])]).expect("declare rgb");
    let ids = cps.points_add(points).expect("add points");
    (cps, ids)
}

#[allow(dead_code)]
pub fn const_functor(uid: u32, pspace: PSpaceUid, value: f64) -> CostFunctorParams {
    CostFunctorParams::new(
        CostFunctorUid::new(uid),
        pspace,
        Arc::new(ConstCost(value)),
        CostArity::PerRelationship,
        1,
    )
}

/// Register one constant functor on RGB and return its id
#[allow(dead_code)]
pub fn register_const(cps: &Cps, uid: u32) -> CostFunctorId {
    cps.cost_functors_register(vec![const_functor(uid, RGB, 0.0)])
        .expect("register functor")[0]
}

/// Add one INCLUSIVE relationship over `points` bound to `functor`
#[allow(dead_code)]
pub fn add_inclusive(cps: &Cps, points: &[PointId], functor: CostFunctorId) -> RelshpId {
    cps.relationships_add(vec![RelshpParams::inclusive(
        points.to_vec(),
        vec![CostBinding::new(functor)],
    )])
    .expect("add relationship")[0]
}
