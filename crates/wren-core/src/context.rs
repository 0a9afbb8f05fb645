use crate::dtype::DType;
use crate::storage::ArrayClass;

/// Execution context a function is bound to.
///
/// The context selects the backend, the compute dtype used for type dispatch
/// in the registry, the array class new buffers are created in, and the
/// device. It is a plain value: every function keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Backend name, e.g. `"cpu"`.
    pub backend: String,
    /// Compute dtype; the registry picks the implementation registered for it.
    pub dtype: DType,
    /// Array class for buffers this context allocates.
    pub array_class: ArrayClass,
    /// Device identifier within the backend.
    pub device_id: String,
}

impl Default for Context {
    fn default() -> Self {
        Self::cpu()
    }
}

impl Context {
    /// The default host context: `cpu`, F32, `CpuArray`, device `"0"`.
    pub fn cpu() -> Self {
        Self {
            backend: "cpu".to_string(),
            dtype: DType::F32,
            array_class: ArrayClass::CpuArray,
            device_id: "0".to_string(),
        }
    }

    /// Set the compute dtype.
    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Set the array class.
    pub fn with_array_class(mut self, array_class: ArrayClass) -> Self {
        self.array_class = array_class;
        self
    }

    /// Set the device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let ctx = Context::cpu()
            .with_dtype(DType::F64)
            .with_array_class(ArrayClass::CpuCachedArray)
            .with_device_id("1");
        assert_eq!(ctx.backend, "cpu");
        assert_eq!(ctx.dtype, DType::F64);
        assert_eq!(ctx.array_class, ArrayClass::CpuCachedArray);
        assert_eq!(ctx.device_id, "1");
        assert_eq!(Context::default(), Context::cpu());
    }
}
