//! Typed views over caller-owned tensor memory.
//!
//! The host keeps ownership of every buffer; this module only tags a borrowed
//! slice with its element type and shape so kernels can recover a typed view.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer element types a tensor can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int8,
    Int16,
    Int32,
    Int64,
}

impl ElementKind {
    /// Inclusive value range.
    pub fn bounds(self) -> (i64, i64) {
        match self {
            ElementKind::Int8 => (i8::MIN as i64, i8::MAX as i64),
            ElementKind::Int16 => (i16::MIN as i64, i16::MAX as i64),
            ElementKind::Int32 => (i32::MIN as i64, i32::MAX as i64),
            ElementKind::Int64 => (i64::MIN, i64::MAX),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::Int8 => "int8",
            ElementKind::Int16 => "int16",
            ElementKind::Int32 => "int32",
            ElementKind::Int64 => "int64",
        };
        f.write_str(s)
    }
}

/// A borrowed buffer, either shared (constant tensors) or exclusive (variable tensors).
#[derive(Debug)]
pub enum Buffer<'a, T> {
    Shared(&'a [T]),
    Exclusive(&'a mut [T]),
}

impl<'a, T> Buffer<'a, T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Buffer::Shared(s) => s,
            Buffer::Exclusive(s) => s,
        }
    }

    pub fn len(&self) -> usize { self.as_slice().len() }

    pub fn is_empty(&self) -> bool { self.as_slice().is_empty() }

    pub fn is_exclusive(&self) -> bool { matches!(self, Buffer::Exclusive(_)) }

    pub fn into_slice(self) -> &'a [T] {
        match self {
            Buffer::Shared(s) => s,
            Buffer::Exclusive(s) => s,
        }
    }

    pub fn into_exclusive(self) -> Option<&'a mut [T]> {
        match self {
            Buffer::Exclusive(s) => Some(s),
            Buffer::Shared(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum TensorData<'a> {
    Int8(Buffer<'a, i8>),
    Int16(Buffer<'a, i16>),
    Int32(Buffer<'a, i32>),
    Int64(Buffer<'a, i64>),
}

impl<'a> TensorData<'a> {
    pub fn kind(&self) -> ElementKind {
        match self {
            TensorData::Int8(_) => ElementKind::Int8,
            TensorData::Int16(_) => ElementKind::Int16,
            TensorData::Int32(_) => ElementKind::Int32,
            TensorData::Int64(_) => ElementKind::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::Int8(b) => b.len(),
            TensorData::Int16(b) => b.len(),
            TensorData::Int32(b) => b.len(),
            TensorData::Int64(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn is_exclusive(&self) -> bool {
        match self {
            TensorData::Int8(b) => b.is_exclusive(),
            TensorData::Int16(b) => b.is_exclusive(),
            TensorData::Int32(b) => b.is_exclusive(),
            TensorData::Int64(b) => b.is_exclusive(),
        }
    }
}

pub const MAX_RANK: usize = 4;

/// Fixed-capacity shape; tensors in this crate are rank 1 to 3.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    dims: [usize; MAX_RANK],
    rank: usize,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        assert!(dims.len() <= MAX_RANK, "rank {} exceeds {}", dims.len(), MAX_RANK);
        let mut d = [0usize; MAX_RANK];
        d[..dims.len()].copy_from_slice(dims);
        Self { dims: d, rank: dims.len() }
    }

    pub fn dims(&self) -> &[usize] { &self.dims[..self.rank] }

    pub fn rank(&self) -> usize { self.rank }

    pub fn dim(&self, i: usize) -> usize { self.dims()[i] }

    pub fn flat_size(&self) -> usize { self.dims().iter().product() }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self.dims()) }
}

/// A shaped tensor handle; the data stays owned by the caller.
#[derive(Debug)]
pub struct EvalTensor<'a> {
    pub shape: Shape,
    pub data: TensorData<'a>,
}

impl<'a> EvalTensor<'a> {
    pub fn new(shape: &[usize], data: TensorData<'a>) -> Self { Self { shape: Shape::new(shape), data } }

    pub fn shared<T: QuantElement>(shape: &[usize], data: &'a [T]) -> Self {
        Self::new(shape, T::wrap(Buffer::Shared(data)))
    }

    pub fn exclusive<T: QuantElement>(shape: &[usize], data: &'a mut [T]) -> Self {
        Self::new(shape, T::wrap(Buffer::Exclusive(data)))
    }

    pub fn kind(&self) -> ElementKind { self.data.kind() }

    /// Typed read-only view, `None` on an element type mismatch.
    pub fn view<T: QuantElement>(&self) -> Option<&[T]> { T::view(&self.data) }

    /// Typed read-only view that keeps the full buffer lifetime.
    pub fn into_shared<T: QuantElement>(self) -> Option<&'a [T]> { T::into_shared(self.data) }

    /// Typed mutable view; only exclusive buffers yield one.
    pub fn into_exclusive<T: QuantElement>(self) -> Option<&'a mut [T]> { T::into_exclusive(self.data) }
}

/// Integer element of a quantized tensor.
pub trait QuantElement: Copy + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: ElementKind;
    const MIN: i64;
    const MAX: i64;

    fn to_i64(self) -> i64;

    /// Clamps `v` into the representable range.
    fn saturate_from(v: i64) -> Self;

    fn wrap(buf: Buffer<'_, Self>) -> TensorData<'_>;

    fn view<'b>(data: &'b TensorData<'_>) -> Option<&'b [Self]>;

    fn into_shared(data: TensorData<'_>) -> Option<&'_ [Self]>;

    fn into_exclusive(data: TensorData<'_>) -> Option<&'_ mut [Self]>;
}

macro_rules! impl_quant_element {
    ($t:ty, $variant:ident) => {
        impl QuantElement for $t {
            const KIND: ElementKind = ElementKind::$variant;
            const MIN: i64 = <$t>::MIN as i64;
            const MAX: i64 = <$t>::MAX as i64;

            #[inline]
            fn to_i64(self) -> i64 { self as i64 }

            #[inline]
            fn saturate_from(v: i64) -> Self { v.clamp(<Self as QuantElement>::MIN, <Self as QuantElement>::MAX) as $t }

            fn wrap(buf: Buffer<'_, Self>) -> TensorData<'_> { TensorData::$variant(buf) }

            fn view<'b>(data: &'b TensorData<'_>) -> Option<&'b [Self]> {
                match data {
                    TensorData::$variant(b) => Some(b.as_slice()),
                    _ => None,
                }
            }

            fn into_shared(data: TensorData<'_>) -> Option<&'_ [Self]> {
                match data {
                    TensorData::$variant(b) => Some(b.into_slice()),
                    _ => None,
                }
            }

            fn into_exclusive(data: TensorData<'_>) -> Option<&'_ mut [Self]> {
                match data {
                    TensorData::$variant(b) => b.into_exclusive(),
                    _ => None,
                }
            }
        }
    };
}

impl_quant_element!(i8, Int8);
impl_quant_element!(i16, Int16);
impl_quant_element!(i32, Int32);
impl_quant_element!(i64, Int64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_views_respect_element_kind() {
        let data = [1i16, -2, 3];
        let t = EvalTensor::shared(&[3], &data[..]);
        assert_eq!(t.kind(), ElementKind::Int16);
        assert_eq!(t.view::<i16>(), Some(&data[..]));
        assert!(t.view::<i8>().is_none());
        assert!(t.into_exclusive::<i16>().is_none());

        let mut state = [0i8; 4];
        let t = EvalTensor::exclusive(&[2, 2], &mut state[..]);
        assert_eq!(t.shape.flat_size(), 4);
        let view = t.into_exclusive::<i8>().unwrap();
        view[3] = 7;
        assert_eq!(state, [0, 0, 0, 7]);
    }

    #[test]
    fn saturate_clamps_to_type_range() {
        assert_eq!(i8::saturate_from(300), 127);
        assert_eq!(i8::saturate_from(-300), -128);
        assert_eq!(i16::saturate_from(40_000), i16::MAX);
        assert_eq!(i32::saturate_from(1 << 40), i32::MAX);
        assert_eq!(i32::saturate_from(-(1 << 40)), i32::MIN);
        assert_eq!(i64::saturate_from(i64::MIN), i64::MIN);
    }
}
