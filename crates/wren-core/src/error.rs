use crate::dtype::DType;
use crate::shape::Shape;
use crate::storage::ArrayClass;

/// All errors that can occur within wren.
///
/// Every failure is reported synchronously to the caller of the violated
/// method. Nothing is retried internally: the graph executor decides whether a
/// failure aborts the whole execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A construction argument is out of its valid domain (e.g. `p >= 1`).
    #[error("{function}: invalid argument: {reason}")]
    InvalidArgument { function: String, reason: String },

    /// Fewer inputs were supplied than the function requires.
    #[error("{function}: expected at least {expected} inputs, got {got}")]
    TooFewInputs {
        function: String,
        expected: usize,
        got: usize,
    },

    /// Fewer outputs were supplied than the function requires.
    #[error("{function}: expected at least {expected} outputs, got {got}")]
    TooFewOutputs {
        function: String,
        expected: usize,
        got: usize,
    },

    /// Shape mismatch between two buffers.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between a slot and the value connected to it.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch { expected: DType, got: DType },

    /// The function has no implementation for the requested dtype.
    #[error("{function}: no implementation for dtype {dtype}")]
    UnsupportedDType { function: String, dtype: DType },

    /// Dimension index out of range for the array's rank.
    #[error("dimension out of range: dim {dim} for array with {rank} dimensions")]
    DimOutOfRange { dim: i64, rank: usize },

    /// Element count mismatch when creating an array from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// An input arrived in a storage representation the function cannot consume.
    #[error("{function}: array class {class} is not allowed (allowed: {allowed:?})")]
    ArrayClassNotAllowed {
        function: String,
        class: ArrayClass,
        allowed: Vec<ArrayClass>,
    },

    /// No function with this name is registered.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A function with this name is already registered.
    #[error("function {0} is already registered")]
    DuplicateFunction(String),

    /// The number of construction arguments does not match the signature.
    #[error("{function}: expected {expected} arguments, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    /// A construction argument has the wrong kind.
    #[error("{function}: argument {index} must be {expected}, got {got}")]
    ArgumentKind {
        function: String,
        index: usize,
        expected: String,
        got: String,
    },

    /// An output shares the data buffer of an input the function may not
    /// overwrite.
    #[error("{function}: output {output} may not reuse the data buffer of input {input}")]
    InplaceNotAllowed {
        function: String,
        input: usize,
        output: usize,
    },

    /// `forward`/`backward` was called before `setup`.
    #[error("{0}: setup has not been called")]
    SetupNotCalled(String),

    /// `recompute` was called without a recompute snapshot to restore.
    #[error("{function}: output {output} cannot be recomputed: {reason}")]
    RecomputeNotReady {
        function: String,
        output: usize,
        reason: String,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Construction-time validation failure for `function`.
    pub fn invalid_argument(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience Result type used throughout wren.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
