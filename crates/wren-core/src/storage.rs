use std::fmt;

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// Storage — Host buffers tagged with an array class
//
// The array class names the backend representation a buffer lives in. Every
// buffer in this crate is host memory; the class tag is what functions check
// against `allowed_array_classes()`, and what an executor converts before
// handing a buffer to a function that cannot consume it.

/// Backend representation of an array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayClass {
    CpuArray,
    CpuCachedArray,
    CudaArray,
    CudaCachedArray,
}

impl ArrayClass {
    /// The classes every CPU function can consume.
    pub fn cpu_classes() -> Vec<ArrayClass> {
        vec![ArrayClass::CpuArray, ArrayClass::CpuCachedArray]
    }
}

impl fmt::Display for ArrayClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArrayClass::CpuArray => "CpuArray",
            ArrayClass::CpuCachedArray => "CpuCachedArray",
            ArrayClass::CudaArray => "CudaArray",
            ArrayClass::CudaCachedArray => "CudaCachedArray",
        };
        write!(f, "{}", s)
    }
}

/// Typed host storage, one variant per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F16(Vec<half::f16>),
    BF16(Vec<half::bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I64(Vec<i64>),
}

impl CpuStorage {
    /// Zero-filled storage of `len` elements.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F16 => CpuStorage::F16(vec![half::f16::ZERO; len]),
            DType::BF16 => CpuStorage::BF16(vec![half::bf16::ZERO; len]),
            DType::F32 => CpuStorage::F32(vec![0.0; len]),
            DType::F64 => CpuStorage::F64(vec![0.0; len]),
            DType::U8 => CpuStorage::U8(vec![0; len]),
            DType::U32 => CpuStorage::U32(vec![0; len]),
            DType::I64 => CpuStorage::I64(vec![0; len]),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::U32(_) => DType::U32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F16(v) => v.len(),
            CpuStorage::BF16(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::U32(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out as f64 values.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        fn conv<T: WithDType>(v: &[T]) -> Vec<f64> {
            v.iter().map(|&x| WithDType::to_f64(x)).collect()
        }
        match self {
            CpuStorage::F16(v) => conv(v),
            CpuStorage::BF16(v) => conv(v),
            CpuStorage::F32(v) => conv(v),
            CpuStorage::F64(v) => conv(v),
            CpuStorage::U8(v) => conv(v),
            CpuStorage::U32(v) => conv(v),
            CpuStorage::I64(v) => conv(v),
        }
    }

    /// Build storage of `dtype` from f64 values.
    pub fn from_f64_slice(data: &[f64], dtype: DType) -> Self {
        fn conv<T: WithDType>(v: &[f64]) -> CpuStorage {
            T::into_storage(v.iter().map(|&x| <T as WithDType>::from_f64(x)).collect())
        }
        match dtype {
            DType::F16 => conv::<half::f16>(data),
            DType::BF16 => conv::<half::bf16>(data),
            DType::F32 => conv::<f32>(data),
            DType::F64 => conv::<f64>(data),
            DType::U8 => conv::<u8>(data),
            DType::U32 => conv::<u32>(data),
            DType::I64 => conv::<i64>(data),
        }
    }
}

/// A shaped, typed, class-tagged host buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Shape,
    class: ArrayClass,
    storage: CpuStorage,
}

impl NdArray {
    /// Zero-filled array.
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let storage = CpuStorage::zeros(dtype, shape.elem_count());
        NdArray {
            shape,
            class: ArrayClass::CpuArray,
            storage,
        }
    }

    /// Array from a typed vector; the element count must match the shape.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: Shape) -> Result<Self> {
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(NdArray {
            shape,
            class: ArrayClass::CpuArray,
            storage: T::into_storage(data),
        })
    }

    /// Array from f64 values converted to `dtype`.
    pub fn from_f64_slice(data: &[f64], shape: Shape, dtype: DType) -> Result<Self> {
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(NdArray {
            shape,
            class: ArrayClass::CpuArray,
            storage: CpuStorage::from_f64_slice(data, dtype),
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn array_class(&self) -> ArrayClass {
        self.class
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Typed read access; fails if `T` does not match the stored dtype.
    pub fn as_slice<T: WithDType>(&self) -> Result<&[T]> {
        let got = self.dtype();
        T::slice(&self.storage).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Typed write access; fails if `T` does not match the stored dtype.
    pub fn as_mut_slice<T: WithDType>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::slice_mut(&mut self.storage).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.to_f64_vec()
    }

    /// Set every element to `value`.
    pub fn fill<T: WithDType>(&mut self, value: T) -> Result<()> {
        self.as_mut_slice::<T>()?.iter_mut().for_each(|x| *x = value);
        Ok(())
    }

    /// Set every element to zero, whatever the dtype.
    pub fn zero(&mut self) {
        self.storage = CpuStorage::zeros(self.dtype(), self.elem_count());
    }

    /// Reallocate for a new shape/dtype. Keeps the contents when neither changes.
    pub fn resize(&mut self, shape: Shape, dtype: DType) {
        if self.shape == shape && self.dtype() == dtype {
            return;
        }
        self.storage = CpuStorage::zeros(dtype, shape.elem_count());
        self.shape = shape;
    }

    /// Retag the buffer with another array class. Host contents are unchanged.
    pub fn cast_class(&mut self, class: ArrayClass) {
        self.class = class;
    }
}
