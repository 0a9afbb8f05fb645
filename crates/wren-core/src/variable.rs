use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::storage::{ArrayClass, NdArray};

// Variable — Value slot connected to a function
//
// A Variable owns two buffers of identical shape: the data and its gradient.
// Functions never allocate buffers themselves; they read inputs, resize outputs
// in `setup`, and write through the guards handed out here.
//
// MEMORY MODEL:
//
//   Both buffers sit behind Arc<RwLock<NdArray>>. Cloning a Variable clones
//   the handle (same buffers). `alias_data()` creates a *different* Variable
//   that shares only the data buffer: this is how an executor grants a
//   function in-place output, and the function detects it with
//   `shares_data_with`. The same holds for gradients via `alias_grad()`.
//
//   Lock poisoning is recovered from: a panic inside another function's write
//   does not make the buffer unreadable.

/// Unique identifier for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(u64);

impl Default for VariableId {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableId {
    /// Generate a new unique id (global atomic counter).
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        VariableId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A data buffer plus its gradient buffer.
#[derive(Debug, Clone)]
pub struct Variable {
    id: VariableId,
    data: Arc<RwLock<NdArray>>,
    grad: Arc<RwLock<NdArray>>,
    need_grad: bool,
}

impl Variable {
    /// Zero-filled variable of the given shape and dtype.
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        Self::from_array(NdArray::zeros(shape, dtype))
    }

    /// Variable holding `data`; the gradient is zero-filled.
    pub fn from_vec<T: WithDType>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        Ok(Self::from_array(NdArray::from_vec(data, shape.into())?))
    }

    /// Variable holding f64 values converted to `dtype`.
    pub fn from_f64_slice(data: &[f64], shape: impl Into<Shape>, dtype: DType) -> Result<Self> {
        Ok(Self::from_array(NdArray::from_f64_slice(
            data,
            shape.into(),
            dtype,
        )?))
    }

    /// Wrap an existing array.
    pub fn from_array(array: NdArray) -> Self {
        let mut grad = NdArray::zeros(array.shape().clone(), array.dtype());
        grad.cast_class(array.array_class());
        Variable {
            id: VariableId::new(),
            data: Arc::new(RwLock::new(array)),
            grad: Arc::new(RwLock::new(grad)),
            need_grad: true,
        }
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    pub fn need_grad(&self) -> bool {
        self.need_grad
    }

    /// Builder-style toggle for gradient requirement.
    pub fn with_need_grad(mut self, need_grad: bool) -> Self {
        self.need_grad = need_grad;
        self
    }

    pub fn shape(&self) -> Shape {
        self.data().shape().clone()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.data().shape().dims().to_vec()
    }

    pub fn dtype(&self) -> DType {
        self.data().dtype()
    }

    pub fn array_class(&self) -> ArrayClass {
        self.data().array_class()
    }

    pub fn elem_count(&self) -> usize {
        self.data().elem_count()
    }

    // Buffer access

    /// Read guard on the data buffer.
    pub fn data(&self) -> RwLockReadGuard<'_, NdArray> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write guard on the data buffer.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, NdArray> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read guard on the gradient buffer.
    pub fn grad(&self) -> RwLockReadGuard<'_, NdArray> {
        self.grad.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write guard on the gradient buffer.
    pub fn grad_mut(&self) -> RwLockWriteGuard<'_, NdArray> {
        self.grad.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the data out as a typed vector.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        Ok(self.data().as_slice::<T>()?.to_vec())
    }

    /// Copy the gradient out as a typed vector.
    pub fn grad_to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        Ok(self.grad().as_slice::<T>()?.to_vec())
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data().to_f64_vec()
    }

    pub fn grad_to_f64_vec(&self) -> Vec<f64> {
        self.grad().to_f64_vec()
    }

    /// Overwrite the data with `values`; the count must match the shape.
    pub fn set_data<T: WithDType>(&self, values: &[T]) -> Result<()> {
        write_values(&mut self.data_mut(), values)
    }

    /// Overwrite the gradient with `values`; the count must match the shape.
    pub fn set_grad<T: WithDType>(&self, values: &[T]) -> Result<()> {
        write_values(&mut self.grad_mut(), values)
    }

    /// Reset the gradient to zero.
    pub fn zero_grad(&self) {
        self.grad_mut().zero();
    }

    /// Reallocate data and gradient for a new shape/dtype.
    ///
    /// A no-op on a buffer whose shape and dtype already match, so aliased
    /// buffers keep their contents when `setup` re-runs.
    pub fn reshape(&self, shape: Shape, dtype: DType) {
        self.data_mut().resize(shape.clone(), dtype);
        self.grad_mut().resize(shape, dtype);
    }

    /// Retag both buffers with another array class.
    pub fn convert_class(&self, class: ArrayClass) {
        self.data_mut().cast_class(class);
        self.grad_mut().cast_class(class);
    }

    // Aliasing

    /// A new variable sharing this variable's data buffer, with its own gradient.
    pub fn alias_data(&self) -> Variable {
        let grad = {
            let data = self.data();
            let mut g = NdArray::zeros(data.shape().clone(), data.dtype());
            g.cast_class(data.array_class());
            g
        };
        Variable {
            id: VariableId::new(),
            data: Arc::clone(&self.data),
            grad: Arc::new(RwLock::new(grad)),
            need_grad: self.need_grad,
        }
    }

    /// A new variable sharing this variable's gradient buffer, with its own data.
    pub fn alias_grad(&self) -> Variable {
        let data = {
            let grad = self.grad();
            let mut d = NdArray::zeros(grad.shape().clone(), grad.dtype());
            d.cast_class(grad.array_class());
            d
        };
        Variable {
            id: VariableId::new(),
            data: Arc::new(RwLock::new(data)),
            grad: Arc::clone(&self.grad),
            need_grad: self.need_grad,
        }
    }

    /// Whether both variables read and write the same data buffer.
    pub fn shares_data_with(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Whether both variables read and write the same gradient buffer.
    pub fn shares_grad_with(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.grad, &other.grad)
    }
}

fn write_values<T: WithDType>(array: &mut NdArray, values: &[T]) -> Result<()> {
    let expected = array.elem_count();
    if values.len() != expected {
        return Err(Error::ElementCountMismatch {
            shape: array.shape().clone(),
            expected,
            got: values.len(),
        });
    }
    array.as_mut_slice::<T>()?.copy_from_slice(values);
    Ok(())
}
