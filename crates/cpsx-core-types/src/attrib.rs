//! Point attribute vocabulary
//!
//! A parameter space describes, per point, how many scalars make up each
//! attribute and which scalar type they are stored as. Attribute buffers are
//! passed around as tagged slices so the scalar type always travels with the
//! data it describes.

use serde::{Deserialize, Serialize};

/// Attribute carried by every parametric point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttribKind {
    /// Coordinates in the point's parameter space
    Coords,
    /// Per-point lock flags; a non-zero first component means "do not optimize"
    LockStatus,
}

impl AttribKind {
    pub const ALL: [AttribKind; 2] = [AttribKind::Coords, AttribKind::LockStatus];
}

/// Scalar storage type of an attribute component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    U8,
    U32,
    F32,
    F64,
}

impl ScalarType {
    pub const ALL: [ScalarType; 4] = [
        ScalarType::U8,
        ScalarType::U32,
        ScalarType::F32,
        ScalarType::F64,
    ];

    /// Size in bytes of one component
    pub fn size(self) -> usize {
        match self {
            ScalarType::U8 => 1,
            ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }
}

/// Shape of one attribute: component count and scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttribDesc {
    pub count: usize,
    pub scalar: ScalarType,
}

impl AttribDesc {
    pub const fn new(count: usize, scalar: ScalarType) -> Self {
        Self { count, scalar }
    }
}

/// Per-point attribute layout of a parameter space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttribLayout {
    pub coords: AttribDesc,
    pub lock_status: AttribDesc,
}

impl AttribLayout {
    /// Layout with `components` coordinates of `scalar` and a single `U8` lock flag
    pub const fn with_coords(components: usize, scalar: ScalarType) -> Self {
        Self {
            coords: AttribDesc::new(components, scalar),
            lock_status: AttribDesc::new(1, ScalarType::U8),
        }
    }

    pub fn desc(&self, attrib: AttribKind) -> AttribDesc {
        match attrib {
            AttribKind::Coords => self.coords,
            AttribKind::LockStatus => self.lock_status,
        }
    }
}

/// Read-only attribute buffer tagged with its scalar type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarSlice<'a> {
    U8(&'a [u8]),
    U32(&'a [u32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl ScalarSlice<'_> {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarSlice::U8(_) => ScalarType::U8,
            ScalarSlice::U32(_) => ScalarType::U32,
            ScalarSlice::F32(_) => ScalarType::F32,
            ScalarSlice::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScalarSlice::U8(s) => s.len(),
            ScalarSlice::U32(s) => s.len(),
            ScalarSlice::F32(s) => s.len(),
            ScalarSlice::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component `i` widened to `f64`
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            ScalarSlice::U8(s) => f64::from(s[i]),
            ScalarSlice::U32(s) => f64::from(s[i]),
            ScalarSlice::F32(s) => f64::from(s[i]),
            ScalarSlice::F64(s) => s[i],
        }
    }
}

/// Writable attribute buffer tagged with its scalar type
#[derive(Debug, PartialEq)]
pub enum ScalarSliceMut<'a> {
    U8(&'a mut [u8]),
    U32(&'a mut [u32]),
    F32(&'a mut [f32]),
    F64(&'a mut [f64]),
}

impl ScalarSliceMut<'_> {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarSliceMut::U8(_) => ScalarType::U8,
            ScalarSliceMut::U32(_) => ScalarType::U32,
            ScalarSliceMut::F32(_) => ScalarType::F32,
            ScalarSliceMut::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScalarSliceMut::U8(s) => s.len(),
            ScalarSliceMut::U32(s) => s.len(),
            ScalarSliceMut::F32(s) => s.len(),
            ScalarSliceMut::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `value` into component `i`, narrowing to the buffer's scalar type.
    ///
    /// Integer targets are rounded and saturated.
    pub fn set_f64(&mut self, i: usize, value: f64) {
        match self {
            ScalarSliceMut::U8(s) => s[i] = value.round().clamp(0.0, f64::from(u8::MAX)) as u8,
            ScalarSliceMut::U32(s) => {
                s[i] = value.round().clamp(0.0, f64::from(u32::MAX)) as u32
            }
            ScalarSliceMut::F32(s) => s[i] = value as f32,
            ScalarSliceMut::F64(s) => s[i] = value,
        }
    }

    /// Component `i` widened to `f64`
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            ScalarSliceMut::U8(s) => f64::from(s[i]),
            ScalarSliceMut::U32(s) => f64::from(s[i]),
            ScalarSliceMut::F32(s) => f64::from(s[i]),
            ScalarSliceMut::F64(s) => s[i],
        }
    }

    /// Reborrow as a read-only slice
    pub fn as_slice(&self) -> ScalarSlice<'_> {
        match self {
            ScalarSliceMut::U8(s) => ScalarSlice::U8(s),
            ScalarSliceMut::U32(s) => ScalarSlice::U32(s),
            ScalarSliceMut::F32(s) => ScalarSlice::F32(s),
            ScalarSliceMut::F64(s) => ScalarSlice::F64(s),
        }
    }
}

/// Owned attribute buffer, used when the engine needs scratch storage of a
/// scalar type only known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarBuf {
    U8(Vec<u8>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ScalarBuf {
    /// Zero-filled buffer of `len` components
    pub fn zeroed(scalar: ScalarType, len: usize) -> Self {
        match scalar {
            ScalarType::U8 => ScalarBuf::U8(vec![0; len]),
            ScalarType::U32 => ScalarBuf::U32(vec![0; len]),
            ScalarType::F32 => ScalarBuf::F32(vec![0.0; len]),
            ScalarType::F64 => ScalarBuf::F64(vec![0.0; len]),
        }
    }

    /// Buffer of `scalar` type holding `values` narrowed component-wise
    pub fn from_f64(scalar: ScalarType, values: &[f64]) -> Self {
        let mut buf = Self::zeroed(scalar, values.len());
        {
            let mut view = buf.as_mut_slice();
            for (i, v) in values.iter().enumerate() {
                view.set_f64(i, *v);
            }
        }
        buf
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.as_slice().scalar_type()
    }

    pub fn as_slice(&self) -> ScalarSlice<'_> {
        match self {
            ScalarBuf::U8(v) => ScalarSlice::U8(v),
            ScalarBuf::U32(v) => ScalarSlice::U32(v),
            ScalarBuf::F32(v) => ScalarSlice::F32(v),
            ScalarBuf::F64(v) => ScalarSlice::F64(v),
        }
    }

    pub fn as_mut_slice(&mut self) -> ScalarSliceMut<'_> {
        match self {
            ScalarBuf::U8(v) => ScalarSliceMut::U8(v),
            ScalarBuf::U32(v) => ScalarSliceMut::U32(v),
            ScalarBuf::F32(v) => ScalarSliceMut::F32(v),
            ScalarBuf::F64(v) => ScalarSliceMut::F64(v),
        }
    }

    /// All components widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let view = self.as_slice();
        (0..view.len()).map(|i| view.get_f64(i)).collect()
    }
}
