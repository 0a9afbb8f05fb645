use std::fmt;

use crate::storage::CpuStorage;

// DType — Element data types
//
// Every slot of a function declares the dtype it expects (`in_types` /
// `out_types`), and the registry dispatches on the dtype carried by the
// execution context. The set mirrors what the array layer can store:
//
//   F16  — 16-bit IEEE half float
//   BF16 — 16-bit brain float
//   F32  — 32-bit float, the default compute type
//   F64  — 64-bit float
//   U8   — unsigned byte, masks
//   U32  — unsigned 32-bit int, indices
//   I64  — signed 64-bit int, counts and labels

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::F32 => 4,
            DType::F64 => 8,
            DType::U8 => 1,
            DType::U32 => 4,
            DType::I64 => 8,
        }
    }

    /// Whether this dtype is a floating-point type (the only ones that carry gradients).
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Bridge between Rust element types and DType
//
// Functions are generic over their element type `T`. This trait gives them the
// runtime tag (`T::DTYPE`), f64 conversions for generic numeric code, and typed
// access into the type-erased `CpuStorage` enum.

/// Trait implemented by Rust types that can be stored in an array.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// Borrow the storage as a typed slice, if the variant matches.
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;

    /// Mutably borrow the storage as a typed slice, if the variant matches.
    fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;

    /// Wrap a typed vector into storage.
    fn into_storage(data: Vec<Self>) -> CpuStorage;
}

macro_rules! impl_with_dtype {
    ($ty:ty, $variant:ident, $to:expr, $from:expr) => {
        impl WithDType for $ty {
            const DTYPE: DType = DType::$variant;

            fn to_f64(self) -> f64 {
                $to(self)
            }

            fn from_f64(v: f64) -> Self {
                $from(v)
            }

            fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_storage(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }
        }
    };
}

impl_with_dtype!(f32, F32, |v: f32| v as f64, |v: f64| v as f32);
impl_with_dtype!(f64, F64, |v: f64| v, |v: f64| v);
impl_with_dtype!(
    half::f16,
    F16,
    |v: half::f16| v.to_f64(),
    half::f16::from_f64
);
impl_with_dtype!(
    half::bf16,
    BF16,
    |v: half::bf16| v.to_f64(),
    half::bf16::from_f64
);
impl_with_dtype!(u8, U8, |v: u8| v as f64, |v: f64| v as u8);
impl_with_dtype!(u32, U32, |v: u32| v as f64, |v: f64| v as u32);
impl_with_dtype!(i64, I64, |v: i64| v as f64, |v: f64| v as i64);

/// Floating-point element types that functions can differentiate through.
pub trait FloatDType: WithDType + num_traits::Float {}

impl FloatDType for f32 {}
impl FloatDType for f64 {}
