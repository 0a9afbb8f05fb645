//! # wren-function
//!
//! The function (operation) contract of the wren graph engine and the builtin
//! functions implementing it.
//!
//! - [`Function`] / [`FunctionNode`] — the lifecycle every function follows:
//!   construct → setup → forward → backward → recompute
//! - [`FunctionRegistry`] — create functions by name, arguments and [`Context`](wren_core::Context)
//! - [`transform`] — generator for elementwise functions from scalar formulas
//! - [`RandomState`] — per-instance generator state with recompute snapshots
//! - [`functions`] — arithmetic, math, sampling and weight standardization

pub mod args;
pub mod function;
pub mod functions;
pub mod random;
pub mod registry;
pub mod transform;

// Used by the transform macros.
pub use wren_core;

pub use args::{check_signature, Arg, ArgKind, ArgReader};
pub use function::{Function, FunctionNode, Inplace};
pub use random::{next_seed, set_seed, RandomState};
pub use registry::{
    create_function, function_names, global_registry, register_function, Factory, FunctionEntry,
    FunctionRegistry,
};
pub use transform::{BinaryOpT, BinaryPolicy, TransformBinary, TransformUnary, UnaryOpT, UnaryPolicy};
