#![allow(dead_code)]

use std::sync::Arc;

use cpsx_core::{
    ContextInit, ContextTypeInfo, CostArity, CostBinding, CostContexts, CostEval, CostFunctor,
    CostFunctorParams, CpsError, Cps, InMemoryAttribs, PSpaceParams, RelshpParams, Result, Values,
    ValuesStorage,
};
use cpsx_core_types::{AttribKind, AttribLayout, CostFunctorUid, PSpaceUid, PointId, ScalarType};
use cpsx_engine::{Device, DeviceParams, DriverHandle, PSpaceConversion};

pub const RGB: PSpaceUid = PSpaceUid::new(1);
pub const LAB: PSpaceUid = PSpaceUid::new(2);

pub fn rgb_pspace() -> PSpaceParams {
    PSpaceParams::new(RGB, AttribLayout::with_coords(3, ScalarType::F64))
}

pub fn lab_pspace() -> PSpaceParams {
    PSpaceParams::new(LAB, AttribLayout::with_coords(3, ScalarType::F64))
}

pub fn lm_driver() -> (Device, DriverHandle) {
    let device = Device::create(DeviceParams::default()).expect("device");
    let driver = device.driver_load("lm").expect("load lm");
    (device, driver)
}

// ---------------------------------------------------------------------------
// sRGB <-> CIE Lab (D65)
// ---------------------------------------------------------------------------

const WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];
const DELTA: f64 = 6.0 / 29.0;

fn to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn from_linear(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f64) -> f64 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

pub fn rgb_to_lab(rgb: &[f64]) -> [f64; 3] {
    let [r, g, b] = [to_linear(rgb[0]), to_linear(rgb[1]), to_linear(rgb[2])];
    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;
    let (fx, fy, fz) = (lab_f(x / WHITE[0]), lab_f(y / WHITE[1]), lab_f(z / WHITE[2]));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

pub fn lab_to_rgb(lab: &[f64]) -> [f64; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;
    let (x, y, z) = (
        WHITE[0] * lab_f_inv(fx),
        WHITE[1] * lab_f_inv(fy),
        WHITE[2] * lab_f_inv(fz),
    );
    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;
    [from_linear(r), from_linear(g), from_linear(b)]
}

/// Converts packed points between the RGB and LAB pspaces
pub struct LabRgbConversion;

impl PSpaceConversion for LabRgbConversion {
    fn convert(
        &self,
        from: &PSpaceParams,
        to: &PSpaceParams,
        src: &[f64],
        dst: &mut [f64],
    ) -> Result<()> {
        let convert: fn(&[f64]) -> [f64; 3] = match (from.uid, to.uid) {
            (a, b) if a == b => {
                dst.copy_from_slice(src);
                return Ok(());
            }
            (RGB, LAB) => rgb_to_lab,
            (LAB, RGB) => lab_to_rgb,
            (a, b) => {
                return Err(CpsError::bad_arg(format!("no conversion from {a} to {b}")));
            }
        };
        for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
            d.copy_from_slice(&convert(s));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cost functors
// ---------------------------------------------------------------------------

/// Per-point target seeded into the relationship context from its config
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub coords: [f64; 3],
}

/// `coords - target` for every point of the relationship; analytic derivatives
pub struct TargetCost;

impl CostFunctor for TargetCost {
    fn compute(&self, eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()> {
        let mut row = 0;
        for rel in eval.relationships {
            let target = eval
                .context::<Target>(rel)
                .ok_or_else(|| CpsError::bad_arg("target context missing"))?;
            for p in &rel.points {
                for (c, x) in eval.point(*p).iter().enumerate() {
                    costs[row] = x - target.coords[c];
                    row += 1;
                }
            }
        }
        Ok(())
    }

    fn contexts_init(&self, init: &ContextInit<'_>, contexts: &mut CostContexts) -> Result<()> {
        let targets = contexts
            .as_mut_slice::<Target>()
            .ok_or_else(|| CpsError::bad_arg("target contexts have the wrong type"))?;
        for rel in init.relationships {
            let coords: [f64; 3] = serde_json::from_value(rel.config["target"].clone())?;
            targets[rel.batch_index].coords = coords;
        }
        Ok(())
    }

    fn jacobian(&self, eval: &CostEval<'_>, point: usize, out: &mut [f64]) -> Option<Result<()>> {
        let n = eval.components;
        out.fill(0.0);
        let mut row = 0;
        for rel in eval.relationships {
            for p in &rel.points {
                for c in 0..n {
                    if *p == point {
                        out[row * n + c] = 1.0;
                    }
                    row += 1;
                }
            }
        }
        Some(Ok(()))
    }
}

pub fn target_functor(uid: u32) -> CostFunctorParams {
    CostFunctorParams::new(
        CostFunctorUid::new(uid),
        RGB,
        Arc::new(TargetCost),
        CostArity::PerPoint,
        3,
    )
    .with_context(ContextTypeInfo::of(Target::default()))
}

/// `weight / (1 + |a - b|)` for a two-point relationship in LAB
pub struct DistanceCost {
    pub weight: f64,
}

impl CostFunctor for DistanceCost {
    fn compute(&self, eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()> {
        for (cost, rel) in costs.iter_mut().zip(eval.relationships) {
            let (a, b) = (eval.point(rel.points[0]), eval.point(rel.points[1]));
            let dist = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt();
            *cost = self.weight / (1.0 + dist);
        }
        Ok(())
    }
}

pub fn distance_functor(uid: u32, weight: f64) -> CostFunctorParams {
    CostFunctorParams::new(
        CostFunctorUid::new(uid),
        LAB,
        Arc::new(DistanceCost { weight }),
        CostArity::PerRelationship,
        1,
    )
}

/// Per point, `weight / (1 + d)` summed over every other point of the
/// relationship, `d` being the LAB distance
pub struct SpreadCost {
    pub weight: f64,
}

impl CostFunctor for SpreadCost {
    fn compute(&self, eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()> {
        let mut row = 0;
        for rel in eval.relationships {
            for p in &rel.points {
                let a = eval.point(*p);
                costs[row] = rel
                    .points
                    .iter()
                    .filter(|q| *q != p)
                    .map(|q| {
                        let dist = a
                            .iter()
                            .zip(eval.point(*q))
                            .map(|(x, y)| (x - y) * (x - y))
                            .sum::<f64>()
                            .sqrt();
                        self.weight / (1.0 + dist)
                    })
                    .sum();
                row += 1;
            }
        }
        Ok(())
    }
}

pub fn spread_functor(uid: u32, weight: f64) -> CostFunctorParams {
    CostFunctorParams::new(
        CostFunctorUid::new(uid),
        LAB,
        Arc::new(SpreadCost { weight }),
        CostArity::PerPoint,
        1,
    )
}

/// Penalty for RGB components leaving `[0, 1]`
pub struct GamutCost {
    pub weight: f64,
}

impl CostFunctor for GamutCost {
    fn compute(&self, eval: &CostEval<'_>, costs: &mut [f64]) -> Result<()> {
        let mut row = 0;
        for rel in eval.relationships {
            for p in &rel.points {
                for c in eval.point(*p) {
                    costs[row] = self.weight * ((-c).max(0.0) + (c - 1.0).max(0.0));
                    row += 1;
                }
            }
        }
        Ok(())
    }
}

pub fn gamut_functor(uid: u32, weight: f64) -> CostFunctorParams {
    CostFunctorParams::new(
        CostFunctorUid::new(uid),
        RGB,
        Arc::new(GamutCost { weight }),
        CostArity::PerPoint,
        3,
    )
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// RGB-only CPS pulling each point towards its own target
pub fn target_cps(targets: &[[f64; 3]]) -> (Cps, Vec<PointId>) {
    let cps = Cps::new();
    cps.pspaces_declare(&[rgb_pspace()]).expect("declare rgb");
    let points = cps.points_add(targets.len()).expect("add points");
    let f = cps
        .cost_functors_register(vec![target_functor(1)])
        .expect("register target")[0];
    let relationships = points
        .iter()
        .zip(targets)
        .map(|(p, t)| {
            RelshpParams::inclusive(
                vec![*p],
                vec![CostBinding::with_config(f, serde_json::json!({ "target": t }))],
            )
        })
        .collect();
    cps.relationships_add(relationships).expect("add relationships");
    (cps, points)
}

/// Three points pushed apart in LAB while kept inside the RGB gamut
pub fn palette_cps() -> (Cps, Vec<PointId>) {
    let cps = Cps::new();
    cps.pspaces_declare(&[rgb_pspace(), lab_pspace()])
        .expect("declare pspaces");
    let points = cps.points_add(3).expect("add points");
    let ids = cps
        .cost_functors_register(vec![distance_functor(10, 100.0), gamut_functor(11, 50.0)])
        .expect("register functors");
    let (distance, gamut) = (ids[0], ids[1]);

    let mut relationships = Vec::new();
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            relationships.push(RelshpParams::inclusive(
                vec![points[i], points[j]],
                vec![CostBinding::new(distance)],
            ));
        }
    }
    relationships.push(RelshpParams::exclusive(
        Vec::new(),
        vec![CostBinding::new(gamut)],
    ));
    cps.relationships_add(relationships)
        .expect("add relationships");
    (cps, points)
}

/// Three points spread by one EXCLUSIVE relationship over no excluded
/// points, with the same catch-all gamut penalty
pub fn spread_cps() -> (Cps, Vec<PointId>) {
    let cps = Cps::new();
    cps.pspaces_declare(&[rgb_pspace(), lab_pspace()])
        .expect("declare pspaces");
    let points = cps.points_add(3).expect("add points");
    let ids = cps
        .cost_functors_register(vec![spread_functor(20, 100.0), gamut_functor(21, 50.0)])
        .expect("register functors");
    cps.relationships_add(vec![
        RelshpParams::exclusive(Vec::new(), vec![CostBinding::new(ids[0])]),
        RelshpParams::exclusive(Vec::new(), vec![CostBinding::new(ids[1])]),
    ])
    .expect("add relationships");
    (cps, points)
}

/// LAB Values seeded from packed RGB colors
pub fn lab_values(cps: &Cps, points: &[PointId], rgb: &[f64]) -> (Values, InMemoryAttribs) {
    let lab: Vec<f64> = rgb.chunks_exact(3).flat_map(rgb_to_lab).collect();
    let attribs = InMemoryAttribs::new();
    attribs.seed_coords(&lab_pspace().layout, points, &lab);
    let values = Values::create(cps, LAB, ValuesStorage::Global(Box::new(attribs.clone())))
        .expect("create values");
    (values, attribs)
}

/// Values over shared in-memory tables seeded with `coords` (packed RGB)
pub fn rgb_values(cps: &Cps, points: &[PointId], coords: &[f64]) -> (Values, InMemoryAttribs) {
    let attribs = InMemoryAttribs::new();
    attribs.seed_coords(&rgb_pspace().layout, points, coords);
    let values = Values::create(cps, RGB, ValuesStorage::Global(Box::new(attribs.clone())))
        .expect("create values");
    (values, attribs)
}

pub fn lock_point(attribs: &InMemoryAttribs, point: PointId) {
    attribs.insert(AttribKind::LockStatus, point, vec![1.0]);
}

pub fn coords_of(attribs: &InMemoryAttribs, point: PointId) -> Vec<f64> {
    attribs
        .snapshot(AttribKind::Coords, point)
        .expect("coords written")
}
