// Builtin functions
//
//   arithmetic             — Add2, Sub2, Mul2, Div2, Pow2, Maximum2, Minimum2
//   math                   — Neg, Exp, Log, Sqrt, Square, Tanh, Sigmoid
//   sampling               — RandBinomial, RandUniform, RandNormal
//   weight_standardization — WeightStandardization
//
// `builtin_entries` describes all of them for the registry; the `create_*`
// helpers build a node through the process-wide registry with typed arguments.

pub mod arithmetic;
pub mod math;
pub mod sampling;
pub mod weight_standardization;

pub use arithmetic::{Add2, Div2, Maximum2, Minimum2, Mul2, Pow2, Sub2};
pub use math::{Exp, Log, Neg, Sigmoid, Sqrt, Square, Tanh};
pub use sampling::{
    BinomialSampler, NormalSampler, RandBinomial, RandNormal, RandUniform, RandomFunction,
    Sampler, UniformSampler,
};
pub use weight_standardization::WeightStandardization;

use wren_core::{Context, DType, Result};

use crate::args::{Arg, ArgKind, ArgReader};
use crate::function::{Function, FunctionNode};
use crate::registry::{create_function, FunctionEntry};

/// Entry for an argument-less elementwise function, implemented for F32 and F64.
macro_rules! transform_entry {
    ($ty:ident) => {
        FunctionEntry::new(stringify!($ty), vec![])
            .with_impl(DType::F32, |ctx: &Context, _: &[Arg]| {
                Ok(Box::new($ty::<f32>::new(ctx.clone())) as Box<dyn Function>)
            })
            .with_impl(DType::F64, |ctx: &Context, _: &[Arg]| {
                Ok(Box::new($ty::<f64>::new(ctx.clone())) as Box<dyn Function>)
            })
    };
}

/// Entry for a random function with two float/int parameters, a shape and a seed.
macro_rules! random_entry {
    ($ty:ident, $p0:ident : $k0:ident, $p1:ident : $k1:ident, [$($t:ty => $dtype:ident),+]) => {{
        let mut entry = FunctionEntry::new(
            stringify!($ty),
            vec![ArgKind::$k0, ArgKind::$k1, ArgKind::Ints, ArgKind::OptionalInt],
        );
        $(
            entry = entry.with_impl(DType::$dtype, |ctx: &Context, args: &[Arg]| {
                let r = ArgReader::new(stringify!($ty), args);
                let f = $ty::<$t>::new(
                    ctx.clone(),
                    r.$p0(0)?,
                    r.$p1(1)?,
                    r.ints(2)?.to_vec(),
                    r.optional_int(3)?,
                )?;
                Ok(Box::new(f) as Box<dyn Function>)
            });
        )+
        entry
    }};
}

/// Registry entries for every builtin function.
pub fn builtin_entries() -> Vec<FunctionEntry> {
    vec![
        transform_entry!(Add2),
        transform_entry!(Sub2),
        transform_entry!(Mul2),
        transform_entry!(Div2),
        transform_entry!(Pow2),
        transform_entry!(Maximum2),
        transform_entry!(Minimum2),
        transform_entry!(Neg),
        transform_entry!(Exp),
        transform_entry!(Log),
        transform_entry!(Sqrt),
        transform_entry!(Square),
        transform_entry!(Tanh),
        transform_entry!(Sigmoid),
        random_entry!(RandBinomial, int: Int, float: Float, [f32 => F32, f64 => F64, i64 => I64]),
        random_entry!(RandUniform, float: Float, float: Float, [f32 => F32, f64 => F64]),
        random_entry!(RandNormal, float: Float, float: Float, [f32 => F32, f64 => F64]),
        FunctionEntry::new("WeightStandardization", vec![ArgKind::Int, ArgKind::Float])
            .with_impl(DType::F32, |ctx: &Context, args: &[Arg]| {
                let r = ArgReader::new("WeightStandardization", args);
                let f = WeightStandardization::<f32>::new(ctx.clone(), r.int(0)?, r.float(1)?)?;
                Ok(Box::new(f) as Box<dyn Function>)
            })
            .with_impl(DType::F64, |ctx: &Context, args: &[Arg]| {
                let r = ArgReader::new("WeightStandardization", args);
                let f = WeightStandardization::<f64>::new(ctx.clone(), r.int(0)?, r.float(1)?)?;
                Ok(Box::new(f) as Box<dyn Function>)
            }),
    ]
}

// Typed creators

pub fn create_add2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Add2", ctx, &[])
}

pub fn create_sub2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Sub2", ctx, &[])
}

pub fn create_mul2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Mul2", ctx, &[])
}

/// Elementwise division node for `ctx.dtype`.
pub fn create_div2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Div2", ctx, &[])
}

pub fn create_pow2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Pow2", ctx, &[])
}

pub fn create_maximum2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Maximum2", ctx, &[])
}

pub fn create_minimum2(ctx: &Context) -> Result<FunctionNode> {
    create_function("Minimum2", ctx, &[])
}

pub fn create_neg(ctx: &Context) -> Result<FunctionNode> {
    create_function("Neg", ctx, &[])
}

pub fn create_exp(ctx: &Context) -> Result<FunctionNode> {
    create_function("Exp", ctx, &[])
}

pub fn create_log(ctx: &Context) -> Result<FunctionNode> {
    create_function("Log", ctx, &[])
}

pub fn create_sqrt(ctx: &Context) -> Result<FunctionNode> {
    create_function("Sqrt", ctx, &[])
}

pub fn create_square(ctx: &Context) -> Result<FunctionNode> {
    create_function("Square", ctx, &[])
}

pub fn create_tanh(ctx: &Context) -> Result<FunctionNode> {
    create_function("Tanh", ctx, &[])
}

pub fn create_sigmoid(ctx: &Context) -> Result<FunctionNode> {
    create_function("Sigmoid", ctx, &[])
}

/// Binomial sampling node. `seed: None` draws a seed from the process source.
pub fn create_rand_binomial(
    ctx: &Context,
    n: i64,
    p: f64,
    shape: &[i64],
    seed: Option<i64>,
) -> Result<FunctionNode> {
    create_function(
        "RandBinomial",
        ctx,
        &[Arg::Int(n), Arg::Float(p), Arg::Ints(shape.to_vec()), Arg::OptionalInt(seed)],
    )
}

pub fn create_rand_uniform(
    ctx: &Context,
    low: f64,
    high: f64,
    shape: &[i64],
    seed: Option<i64>,
) -> Result<FunctionNode> {
    create_function(
        "RandUniform",
        ctx,
        &[Arg::Float(low), Arg::Float(high), Arg::Ints(shape.to_vec()), Arg::OptionalInt(seed)],
    )
}

pub fn create_rand_normal(
    ctx: &Context,
    mu: f64,
    sigma: f64,
    shape: &[i64],
    seed: Option<i64>,
) -> Result<FunctionNode> {
    create_function(
        "RandNormal",
        ctx,
        &[Arg::Float(mu), Arg::Float(sigma), Arg::Ints(shape.to_vec()), Arg::OptionalInt(seed)],
    )
}

pub fn create_weight_standardization(
    ctx: &Context,
    channel_axis: i64,
    eps: f64,
) -> Result<FunctionNode> {
    create_function(
        "WeightStandardization",
        ctx,
        &[Arg::Int(channel_axis), Arg::Float(eps)],
    )
}
