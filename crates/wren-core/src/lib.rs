//! # wren-core
//!
//! Value types shared by every wren function.
//!
//! This crate provides:
//! - [`DType`] / [`WithDType`] / [`FloatDType`] — element types and the bridge to Rust types
//! - [`Shape`] — dimensions, strides and broadcasting
//! - [`ArrayClass`] / [`NdArray`] — class-tagged typed host buffers
//! - [`Variable`] — a data buffer plus its gradient buffer, with aliasing
//! - [`Context`] — backend, compute dtype, array class and device selection
//! - [`Error`] / [`Result`] — the single error type

pub mod context;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod variable;

pub use context::Context;
pub use dtype::{DType, FloatDType, WithDType};
pub use error::{Error, Result};
pub use shape::Shape;
pub use storage::{ArrayClass, CpuStorage, NdArray};
pub use variable::{Variable, VariableId};
