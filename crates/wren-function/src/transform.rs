// Elementwise transform generator
//
// Dozens of functions are "apply a scalar formula to every element": their
// forward, backward and dependency declarations differ only in the formulas and
// a handful of flags. This module writes the Function implementation once:
//
//   BinaryOpT / UnaryOpT  — the per-op data: NAME, POLICY, forward formula,
//                           one gradient formula per input
//   TransformBinary<Op,T> — generic Function over any BinaryOpT
//   TransformUnary<Op,T>  — generic Function over any UnaryOpT
//   define_transform_binary! / define_transform_unary!
//                         — generate the op type from expressions and flags
//
// Gradient formulas receive (dy, inputs..., y) and return the contribution
// d(loss)/d(x_k) for one element.
//
// POLICY FLAGS:
//
//   inplace[k]                output may reuse input k's data buffer
//   inplace_grad              input 0's gradient may be the output's
//                             gradient buffer
//   grad_needs_output[k]      x_k's gradient formula reads y
//   grad_needs_own_input[k]   x_k's gradient formula reads x_k
//   grad_needs_other_input[k] x_k's gradient formula reads the other input
//
// The dependency predicates of the generated Function are exactly these flags,
// so the memory planner gets them without any data. A policy is consistent
// (`is_consistent`) when no input that may be overwritten in place is read by
// any gradient formula; every builtin op is checked against this in tests.
//
// BROADCASTING:
//
//   Inputs broadcast NumPy-style to the output shape. Setup precomputes, per
//   input, the flat input index each output element reads. Backward sums the
//   gradient contributions of all output elements that read the same input
//   element.
//
// ALIASING:
//
//   When the executor hands in an output sharing an input's data buffer
//   (forward), or an input-0 gradient sharing the output's gradient buffer
//   (backward), the element loop reads element i and then writes element i of
//   the same buffer under one write lock, so the result is bit-identical to the
//   non-aliased computation. Input 1's gradient is always computed before
//   input 0's, so dy is still intact when input 1 needs it.

use std::marker::PhantomData;

use log::trace;
use wren_core::{Context, DType, Error, FloatDType, Result, Shape, Variable};

use crate::args::Arg;
use crate::function::{Function, Inplace};

/// Flags of a binary elementwise op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryPolicy {
    pub inplace: [bool; 2],
    pub inplace_grad: bool,
    pub grad_needs_output: [bool; 2],
    pub grad_needs_own_input: [bool; 2],
    pub grad_needs_other_input: [bool; 2],
}

impl BinaryPolicy {
    /// Input `j`'s data is read by some gradient formula.
    pub fn input_read_by_backward(&self, j: usize) -> bool {
        let other = 1 - j;
        self.grad_needs_own_input[j] || self.grad_needs_other_input[other]
    }

    /// No input that may be overwritten in place is read by backward.
    pub fn is_consistent(&self) -> bool {
        (0..2).all(|k| !self.inplace[k] || !self.input_read_by_backward(k))
    }

    pub fn grad_depends_output_data(&self, i: usize, o: usize) -> bool {
        i < 2 && o == 0 && self.grad_needs_output[i]
    }

    pub fn grad_depends_input_data(&self, i: usize, j: usize) -> bool {
        if i >= 2 || j >= 2 {
            return false;
        }
        if i == j {
            self.grad_needs_own_input[i]
        } else {
            self.grad_needs_other_input[i]
        }
    }
}

/// Flags of a unary elementwise op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryPolicy {
    pub inplace: bool,
    pub inplace_grad: bool,
    pub grad_needs_output: bool,
    pub grad_needs_input: bool,
}

impl UnaryPolicy {
    pub fn is_consistent(&self) -> bool {
        !self.inplace || !self.grad_needs_input
    }
}

/// Scalar formulas and flags of a binary elementwise op.
pub trait BinaryOpT: Send + Sync + 'static {
    const NAME: &'static str;
    const POLICY: BinaryPolicy;

    fn forward<T: FloatDType>(x0: T, x1: T) -> T;
    fn grad0<T: FloatDType>(dy: T, x0: T, x1: T, y: T) -> T;
    fn grad1<T: FloatDType>(dy: T, x0: T, x1: T, y: T) -> T;
}

/// Scalar formulas and flags of a unary elementwise op.
pub trait UnaryOpT: Send + Sync + 'static {
    const NAME: &'static str;
    const POLICY: UnaryPolicy;

    fn forward<T: FloatDType>(x: T) -> T;
    fn grad<T: FloatDType>(dy: T, x: T, y: T) -> T;
}

fn at(map: &Option<Vec<usize>>, i: usize) -> usize {
    map.as_ref().map_or(i, |m| m[i])
}

/// An output reusing an input buffer cannot be resized, so broadcasting may
/// not grow it.
fn check_aliased_shape(input: &Variable, out_shape: &Shape) -> Result<()> {
    let shape = input.shape();
    if shape != *out_shape {
        return Err(Error::ShapeMismatch {
            expected: out_shape.clone(),
            got: shape,
        });
    }
    Ok(())
}

// Binary

/// Generic binary elementwise function.
pub struct TransformBinary<Op: BinaryOpT, T: FloatDType> {
    ctx: Context,
    /// Per input, the flat input index read by each output element.
    index_map: [Option<Vec<usize>>; 2],
    _marker: PhantomData<(Op, T)>,
}

impl<Op: BinaryOpT, T: FloatDType> TransformBinary<Op, T> {
    pub fn new(ctx: Context) -> Self {
        TransformBinary {
            ctx,
            index_map: [None, None],
            _marker: PhantomData,
        }
    }

    /// The policy this function was generated with.
    pub fn policy() -> BinaryPolicy {
        Op::POLICY
    }

    fn backward_input(
        &self,
        k: usize,
        inputs: &[Variable],
        output: &Variable,
        accum: bool,
    ) -> Result<()> {
        let grad_fn = if k == 0 { Op::grad0::<T> } else { Op::grad1::<T> };
        let x0 = inputs[0].data();
        let x1 = inputs[1].data();
        let y = output.data();
        let (x0, x1, y) = (x0.as_slice::<T>()?, x1.as_slice::<T>()?, y.as_slice::<T>()?);
        let (m0, m1) = (&self.index_map[0], &self.index_map[1]);

        if inputs[k].shares_grad_with(output) {
            if k != 0 || !Op::POLICY.inplace_grad {
                return Err(Error::msg(format!(
                    "{}: gradient of input {k} may not alias the output gradient",
                    Op::NAME
                )));
            }
            if accum || self.index_map[0].is_some() {
                return Err(Error::msg(format!(
                    "{}: aliased gradient requires accum=false and an unbroadcast input",
                    Op::NAME
                )));
            }
            let mut g = output.grad_mut();
            let g = g.as_mut_slice::<T>()?;
            for i in 0..g.len() {
                g[i] = grad_fn(g[i], x0[at(m0, i)], x1[at(m1, i)], y[i]);
            }
            return Ok(());
        }

        let dy = output.grad();
        let dy = dy.as_slice::<T>()?;
        let mut g = inputs[k].grad_mut();
        let g = g.as_mut_slice::<T>()?;
        if !accum {
            g.iter_mut().for_each(|v| *v = T::zero());
        }
        let mk = &self.index_map[k];
        for i in 0..dy.len() {
            let j = at(mk, i);
            g[j] = g[j] + grad_fn(dy[i], x0[at(m0, i)], x1[at(m1, i)], y[i]);
        }
        Ok(())
    }
}

impl<Op: BinaryOpT, T: FloatDType> Function for TransformBinary<Op, T> {
    fn name(&self) -> &'static str {
        Op::NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn args(&self) -> Vec<Arg> {
        vec![]
    }

    fn min_inputs(&self) -> usize {
        2
    }

    fn min_outputs(&self) -> usize {
        1
    }

    fn in_types(&self) -> Vec<DType> {
        vec![T::DTYPE, T::DTYPE]
    }

    fn out_types(&self) -> Vec<DType> {
        vec![T::DTYPE]
    }

    fn setup_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let (s0, s1) = (inputs[0].shape(), inputs[1].shape());
        let out_shape = Shape::broadcast_shape(&s0, &s1)?;
        // The policy itself is enforced by `FunctionNode` before setup.
        for input in inputs.iter().take(2) {
            if outputs[0].shares_data_with(input) {
                check_aliased_shape(input, &out_shape)?;
            }
        }
        outputs[0].reshape(out_shape.clone(), T::DTYPE);
        self.index_map = [
            s0.broadcast_index_map(&out_shape),
            s1.broadcast_index_map(&out_shape),
        ];
        Ok(())
    }

    fn forward_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let out = &outputs[0];
        let (m0, m1) = (&self.index_map[0], &self.index_map[1]);
        let aliased = (0..2).find(|&k| out.shares_data_with(&inputs[k]));

        match aliased {
            None => {
                let x0 = inputs[0].data();
                let x1 = inputs[1].data();
                let (x0, x1) = (x0.as_slice::<T>()?, x1.as_slice::<T>()?);
                let mut y = out.data_mut();
                let y = y.as_mut_slice::<T>()?;
                for (i, v) in y.iter_mut().enumerate() {
                    *v = Op::forward(x0[at(m0, i)], x1[at(m1, i)]);
                }
            }
            Some(k) => {
                trace!("{}: forward in place on input {k}", Op::NAME);
                let other = 1 - k;
                if inputs[other].shares_data_with(out) {
                    let mut y = out.data_mut();
                    for v in y.as_mut_slice::<T>()?.iter_mut() {
                        *v = Op::forward(*v, *v);
                    }
                } else {
                    let o = inputs[other].data();
                    let o = o.as_slice::<T>()?;
                    let mo = &self.index_map[other];
                    let mut y = out.data_mut();
                    let y = y.as_mut_slice::<T>()?;
                    for (i, v) in y.iter_mut().enumerate() {
                        let rhs = o[at(mo, i)];
                        *v = if k == 0 {
                            Op::forward(*v, rhs)
                        } else {
                            Op::forward(rhs, *v)
                        };
                    }
                }
            }
        }
        Ok(())
    }

    fn backward_impl(
        &mut self,
        inputs: &[Variable],
        outputs: &[Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        // Input 1 first: input 0's gradient may overwrite dy.
        for k in [1, 0] {
            if propagate_down[k] {
                self.backward_input(k, inputs, &outputs[0], accum[k])?;
            }
        }
        Ok(())
    }

    fn grad_depends_output_data(&self, i: usize, o: usize) -> bool {
        Op::POLICY.grad_depends_output_data(i, o)
    }

    fn grad_depends_input_data(&self, i: usize, j: usize) -> bool {
        Op::POLICY.grad_depends_input_data(i, j)
    }

    fn inplace_data(&self, i: usize) -> Inplace {
        if i < 2 && Op::POLICY.inplace[i] {
            Inplace::Allowed
        } else {
            Inplace::NotAllowed
        }
    }

    fn inplace_grad(&self, i: usize) -> Inplace {
        if i == 0 && Op::POLICY.inplace_grad {
            Inplace::Allowed
        } else {
            Inplace::NotAllowed
        }
    }

    fn copy(&self) -> Box<dyn Function> {
        Box::new(Self::new(self.ctx.clone()))
    }
}

// Unary

/// Generic unary elementwise function.
pub struct TransformUnary<Op: UnaryOpT, T: FloatDType> {
    ctx: Context,
    _marker: PhantomData<(Op, T)>,
}

impl<Op: UnaryOpT, T: FloatDType> TransformUnary<Op, T> {
    pub fn new(ctx: Context) -> Self {
        TransformUnary {
            ctx,
            _marker: PhantomData,
        }
    }

    pub fn policy() -> UnaryPolicy {
        Op::POLICY
    }
}

impl<Op: UnaryOpT, T: FloatDType> Function for TransformUnary<Op, T> {
    fn name(&self) -> &'static str {
        Op::NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn args(&self) -> Vec<Arg> {
        vec![]
    }

    fn min_inputs(&self) -> usize {
        1
    }

    fn min_outputs(&self) -> usize {
        1
    }

    fn in_types(&self) -> Vec<DType> {
        vec![T::DTYPE]
    }

    fn out_types(&self) -> Vec<DType> {
        vec![T::DTYPE]
    }

    fn setup_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        outputs[0].reshape(inputs[0].shape(), T::DTYPE);
        Ok(())
    }

    fn forward_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let out = &outputs[0];
        if out.shares_data_with(&inputs[0]) {
            trace!("{}: forward in place", Op::NAME);
            let mut y = out.data_mut();
            for v in y.as_mut_slice::<T>()?.iter_mut() {
                *v = Op::forward(*v);
            }
            return Ok(());
        }
        let x = inputs[0].data();
        let x = x.as_slice::<T>()?;
        let mut y = out.data_mut();
        for (v, &xi) in y.as_mut_slice::<T>()?.iter_mut().zip(x) {
            *v = Op::forward(xi);
        }
        Ok(())
    }

    fn backward_impl(
        &mut self,
        inputs: &[Variable],
        outputs: &[Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        if !propagate_down[0] {
            return Ok(());
        }
        let (input, output) = (&inputs[0], &outputs[0]);
        let x = input.data();
        let y = output.data();
        let (x, y) = (x.as_slice::<T>()?, y.as_slice::<T>()?);

        if input.shares_grad_with(output) {
            if !Op::POLICY.inplace_grad || accum[0] {
                return Err(Error::msg(format!(
                    "{}: aliased gradient requires inplace_grad and accum=false",
                    Op::NAME
                )));
            }
            let mut g = output.grad_mut();
            let g = g.as_mut_slice::<T>()?;
            for i in 0..g.len() {
                g[i] = Op::grad(g[i], x[i], y[i]);
            }
            return Ok(());
        }

        let dy = output.grad();
        let dy = dy.as_slice::<T>()?;
        let mut g = input.grad_mut();
        let g = g.as_mut_slice::<T>()?;
        for i in 0..g.len() {
            let contribution = Op::grad(dy[i], x[i], y[i]);
            g[i] = if accum[0] { g[i] + contribution } else { contribution };
        }
        Ok(())
    }

    fn grad_depends_output_data(&self, i: usize, o: usize) -> bool {
        i == 0 && o == 0 && Op::POLICY.grad_needs_output
    }

    fn grad_depends_input_data(&self, i: usize, j: usize) -> bool {
        i == 0 && j == 0 && Op::POLICY.grad_needs_input
    }

    fn inplace_data(&self, i: usize) -> Inplace {
        if i == 0 && Op::POLICY.inplace {
            Inplace::Allowed
        } else {
            Inplace::NotAllowed
        }
    }

    fn inplace_grad(&self, i: usize) -> Inplace {
        if i == 0 && Op::POLICY.inplace_grad {
            Inplace::Allowed
        } else {
            Inplace::NotAllowed
        }
    }

    fn copy(&self) -> Box<dyn Function> {
        Box::new(Self::new(self.ctx.clone()))
    }
}

/// Define a binary elementwise function from its formulas and flags.
///
/// ```ignore
/// define_transform_binary! {
///     /// Elementwise division.
///     Div2 / Div2Op: "Div2",
///     forward: |x0, x1| x0 / x1,
///     grad0: |dy, x0, x1, y| dy / x1,
///     grad1: |dy, x0, x1, y| -dy * x0 / (x1 * x1),
///     policy: BinaryPolicy { ... },
/// }
/// ```
///
/// This generates the unit type `Div2Op: BinaryOpT` and the alias
/// `Div2<T> = TransformBinary<Div2Op, T>`.
#[macro_export]
macro_rules! define_transform_binary {
    (
        $(#[$meta:meta])*
        $alias:ident / $op:ident : $name:literal,
        forward: |$fx0:ident, $fx1:ident| $forward:expr,
        grad0: |$dy0:ident, $a0:ident, $b0:ident, $y0:ident| $grad0:expr,
        grad1: |$dy1:ident, $a1:ident, $b1:ident, $y1:ident| $grad1:expr,
        policy: $policy:expr $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $op;

        impl $crate::transform::BinaryOpT for $op {
            const NAME: &'static str = $name;
            const POLICY: $crate::transform::BinaryPolicy = $policy;

            #[allow(unused_variables)]
            fn forward<T: $crate::wren_core::FloatDType>($fx0: T, $fx1: T) -> T {
                $forward
            }

            #[allow(unused_variables)]
            fn grad0<T: $crate::wren_core::FloatDType>($dy0: T, $a0: T, $b0: T, $y0: T) -> T {
                $grad0
            }

            #[allow(unused_variables)]
            fn grad1<T: $crate::wren_core::FloatDType>($dy1: T, $a1: T, $b1: T, $y1: T) -> T {
                $grad1
            }
        }

        $(#[$meta])*
        pub type $alias<T> = $crate::transform::TransformBinary<$op, T>;
    };
}

/// Define a unary elementwise function from its formulas and flags.
///
/// Generates `$op: UnaryOpT` and `$alias<T> = TransformUnary<$op, T>`.
#[macro_export]
macro_rules! define_transform_unary {
    (
        $(#[$meta:meta])*
        $alias:ident / $op:ident : $name:literal,
        forward: |$fx:ident| $forward:expr,
        grad: |$dy:ident, $x:ident, $y:ident| $grad:expr,
        policy: $policy:expr $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $op;

        impl $crate::transform::UnaryOpT for $op {
            const NAME: &'static str = $name;
            const POLICY: $crate::transform::UnaryPolicy = $policy;

            #[allow(unused_variables)]
            fn forward<T: $crate::wren_core::FloatDType>($fx: T) -> T {
                $forward
            }

            #[allow(unused_variables)]
            fn grad<T: $crate::wren_core::FloatDType>($dy: T, $x: T, $y: T) -> T {
                $grad
            }
        }

        $(#[$meta])*
        pub type $alias<T> = $crate::transform::TransformUnary<$op, T>;
    };
}
