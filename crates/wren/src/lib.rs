//! # Wren
//!
//! The function (operation) contract of a computation-graph engine: typed
//! functions with setup, forward, backward and recompute, a registry that
//! creates them by name, and builtin elementwise, sampling and normalization
//! functions.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use wren::prelude::*;
//!
//! let ctx = Context::cpu().with_dtype(DType::F64);
//! let mut div = create_div2(&ctx).unwrap();
//! let x0 = Variable::from_vec(vec![6.0f64, 9.0], 2).unwrap();
//! let x1 = Variable::from_vec(vec![2.0f64, 3.0], 2).unwrap();
//! let y = Variable::new(2, DType::F64);
//!
//! div.setup(&[x0.clone(), x1.clone()], &[y.clone()]).unwrap();
//! div.forward(&[x0, x1], &[y.clone()]).unwrap();
//! assert_eq!(y.to_vec::<f64>().unwrap(), vec![3.0, 3.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `wren-core` | DType, Shape, NdArray, Variable, Context, Error |
//! | `wren-function` | Function contract, registry, transform generator, builtin functions |

use log::info;

/// Re-export core types.
pub use wren_core::{
    ArrayClass, Context, CpuStorage, DType, Error, FloatDType, NdArray, Result, Shape, Variable,
    VariableId, WithDType,
};

/// Re-export the function contract and registry.
pub use wren_function::{
    check_signature, create_function, function_names, global_registry, next_seed,
    register_function, set_seed, Arg, ArgKind, ArgReader, Factory, Function, FunctionEntry,
    FunctionNode, FunctionRegistry, Inplace, RandomState,
};

/// Elementwise transform generator.
pub mod transform {
    pub use wren_function::transform::*;
}

/// Builtin functions and their typed creators.
pub mod functions {
    pub use wren_function::functions::*;
}

pub use wren_function::{define_transform_binary, define_transform_unary};

/// A new registry holding every builtin function, independent of the
/// process-wide one.
pub fn builtin_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::with_builtins();
    info!("built registry with {} functions", registry.names().len());
    registry
}

/// Convenient imports for building and driving functions.
pub mod prelude {
    pub use crate::functions::{
        create_add2, create_div2, create_exp, create_log, create_maximum2, create_minimum2,
        create_mul2, create_neg, create_pow2, create_rand_binomial, create_rand_normal,
        create_rand_uniform, create_sigmoid, create_sqrt, create_square, create_sub2,
        create_tanh, create_weight_standardization,
    };
    pub use crate::{
        builtin_registry, create_function, set_seed, Arg, ArgKind, ArrayClass, Context, DType,
        Error, Function, FunctionEntry, FunctionNode, FunctionRegistry, Inplace, Result, Shape,
        Variable,
    };
}
