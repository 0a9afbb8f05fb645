// Function — The contract every graph node implements
//
// A function is a stateful node with a fixed lifecycle:
//
//   construct → setup → forward → [backward]* → [setup_recompute → recompute]
//
// Concrete functions implement the `Function` trait: metadata (arity, dtypes,
// accepted array classes), the `*_impl` lifecycle hooks, and the pure
// predicates the memory planner queries before any data exists.
//
// `FunctionNode` wraps a boxed function and owns the checks that are the same
// for every function, so implementations only write their math:
//
//   setup     — arity, per-slot dtypes, array classes, output/input buffer
//               sharing, then `setup_impl`; tags fresh outputs with the
//               context's array class and records the input shapes
//   forward   — refuses to run before setup; re-runs setup when input shapes
//               changed since the last setup; re-checks buffer sharing, since
//               the executor may hand in different output buffers
//   backward  — mask lengths must match the inputs; skipped when nothing
//               propagates
//   recompute — only for outputs declared `need_setup_recompute`
//
// GRADIENT ACCUMULATION:
//
//   `accum[i] == true` means the gradient of input i is ADDED into the existing
//   gradient buffer (the input feeds several consumers); `false` overwrites it.
//
// THREADING:
//
//   Methods take `&mut self`, so one instance is never driven from two threads
//   at once. Per-instance state (e.g. a random generator) is never shared, so
//   independent instances can run in parallel.

use log::{debug, trace};
use wren_core::{bail, ArrayClass, Context, DType, Error, Result, Shape, Variable};

use crate::args::Arg;

/// Whether an input's buffer may be reused for an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inplace {
    NotAllowed,
    Allowed,
}

impl Inplace {
    pub fn is_allowed(self) -> bool {
        self == Inplace::Allowed
    }
}

/// The contract implemented by every concrete function.
pub trait Function: Send {
    /// Human-readable name; also the registry key.
    fn name(&self) -> &'static str;

    /// Execution context the function was created for.
    fn context(&self) -> &Context;

    /// Construction arguments, in signature order.
    fn args(&self) -> Vec<Arg>;

    fn min_inputs(&self) -> usize;

    fn min_outputs(&self) -> usize;

    /// Expected dtype per input slot.
    fn in_types(&self) -> Vec<DType>;

    /// Dtype per output slot.
    fn out_types(&self) -> Vec<DType>;

    /// Array classes this function can consume.
    fn allowed_array_classes(&self) -> Vec<ArrayClass> {
        ArrayClass::cpu_classes()
    }

    /// Validate input shapes, size the outputs, allocate auxiliary state.
    fn setup_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()>;

    fn forward_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()>;

    fn backward_impl(
        &mut self,
        inputs: &[Variable],
        outputs: &[Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()>;

    /// Does input `i`'s gradient read output `o`'s data?
    fn grad_depends_output_data(&self, i: usize, o: usize) -> bool;

    /// Does input `i`'s gradient read input `j`'s data?
    fn grad_depends_input_data(&self, i: usize, j: usize) -> bool;

    /// May input `i`'s data buffer be reused for an output in forward?
    fn inplace_data(&self, _i: usize) -> Inplace {
        Inplace::NotAllowed
    }

    /// The output that may alias input `i`'s data buffer.
    fn inplace_data_with(&self, _i: usize) -> usize {
        0
    }

    /// May input `i`'s gradient buffer be the output's gradient buffer in backward?
    fn inplace_grad(&self, _i: usize) -> Inplace {
        Inplace::NotAllowed
    }

    /// The output whose gradient buffer may alias input `i`'s.
    fn inplace_grad_with(&self, _i: usize) -> usize {
        0
    }

    /// Must output `o` be regenerable through `recompute`? Static per output.
    fn need_setup_recompute(&self, _o: usize) -> bool {
        false
    }

    fn setup_recompute_impl(&mut self, _inputs: &[Variable], _outputs: &[Variable]) -> Result<()> {
        Ok(())
    }

    /// Regenerate the outputs; deterministic functions simply run forward again.
    fn recompute_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        self.forward_impl(inputs, outputs)
    }

    /// A fresh instance with the same arguments and independent state.
    fn copy(&self) -> Box<dyn Function>;
}

/// A function plus the lifecycle checks shared by all functions.
pub struct FunctionNode {
    function: Box<dyn Function>,
    /// Input shapes of the last successful setup; `None` before setup.
    setup_shapes: Option<Vec<Shape>>,
}

impl std::fmt::Debug for FunctionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FunctionNode(name={}, args={:?}, setup={})",
            self.function.name(),
            self.function.args(),
            self.setup_shapes.is_some()
        )
    }
}

impl FunctionNode {
    pub fn new(function: Box<dyn Function>) -> Self {
        FunctionNode {
            function,
            setup_shapes: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.function.name()
    }

    pub fn context(&self) -> &Context {
        self.function.context()
    }

    pub fn args(&self) -> Vec<Arg> {
        self.function.args()
    }

    pub fn min_inputs(&self) -> usize {
        self.function.min_inputs()
    }

    pub fn min_outputs(&self) -> usize {
        self.function.min_outputs()
    }

    pub fn in_types(&self) -> Vec<DType> {
        self.function.in_types()
    }

    pub fn out_types(&self) -> Vec<DType> {
        self.function.out_types()
    }

    pub fn allowed_array_classes(&self) -> Vec<ArrayClass> {
        self.function.allowed_array_classes()
    }

    /// Whether `setup` has completed at least once.
    pub fn is_setup(&self) -> bool {
        self.setup_shapes.is_some()
    }

    /// Access the wrapped function.
    pub fn function(&self) -> &dyn Function {
        self.function.as_ref()
    }

    // Lifecycle

    pub fn setup(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let name = self.function.name();
        if inputs.len() < self.function.min_inputs() {
            return Err(Error::TooFewInputs {
                function: name.to_string(),
                expected: self.function.min_inputs(),
                got: inputs.len(),
            });
        }
        if outputs.len() < self.function.min_outputs() {
            return Err(Error::TooFewOutputs {
                function: name.to_string(),
                expected: self.function.min_outputs(),
                got: outputs.len(),
            });
        }
        for (input, expected) in inputs.iter().zip(self.function.in_types()) {
            let got = input.dtype();
            if got != expected {
                return Err(Error::DTypeMismatch { expected, got });
            }
        }
        self.check_array_classes(inputs)?;
        self.check_inplace(inputs, outputs)?;

        self.function.setup_impl(inputs, outputs)?;

        // Gradient buffers always mirror the data buffers. Outputs that reuse
        // an input buffer keep that input's class.
        let ctx = self.function.context();
        for output in outputs {
            let (shape, dtype) = {
                let data = output.data();
                (data.shape().clone(), data.dtype())
            };
            output.grad_mut().resize(shape, dtype);
            if !inputs.iter().any(|input| output.shares_data_with(input)) {
                output.convert_class(ctx.array_class);
            }
        }

        let shapes: Vec<Shape> = inputs.iter().map(Variable::shape).collect();
        debug!(
            "{name}: setup on {}:{} ({}) with input shapes {shapes:?}",
            ctx.backend, ctx.device_id, ctx.array_class
        );
        self.setup_shapes = Some(shapes);
        Ok(())
    }

    pub fn forward(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        self.ensure_setup(inputs, outputs)?;
        self.check_array_classes(inputs)?;
        self.check_inplace(inputs, outputs)?;
        trace!("{}: forward", self.function.name());
        self.function.forward_impl(inputs, outputs)
    }

    pub fn backward(
        &mut self,
        inputs: &[Variable],
        outputs: &[Variable],
        propagate_down: &[bool],
        accum: &[bool],
    ) -> Result<()> {
        let name = self.function.name();
        if !self.is_setup() {
            return Err(Error::SetupNotCalled(name.to_string()));
        }
        if propagate_down.len() != inputs.len() || accum.len() != inputs.len() {
            bail!(
                "{name}: propagate_down ({}) and accum ({}) must have one entry per input ({})",
                propagate_down.len(),
                accum.len(),
                inputs.len()
            );
        }
        if !propagate_down.iter().any(|&p| p) {
            return Ok(());
        }
        trace!("{name}: backward propagate_down={propagate_down:?} accum={accum:?}");
        self.function
            .backward_impl(inputs, outputs, propagate_down, accum)
    }

    pub fn need_setup_recompute(&self, o: usize) -> bool {
        self.function.need_setup_recompute(o)
    }

    /// Prepare recompute. A no-op for functions with no recompute-needed output.
    pub fn setup_recompute(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        if !self.is_setup() {
            return Err(Error::SetupNotCalled(self.function.name().to_string()));
        }
        if !self.any_recompute(outputs.len()) {
            return Ok(());
        }
        debug!("{}: setup_recompute", self.function.name());
        self.function.setup_recompute_impl(inputs, outputs)
    }

    /// Regenerate the outputs bit-identically to the last forward.
    pub fn recompute(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let name = self.function.name();
        if !self.is_setup() {
            return Err(Error::SetupNotCalled(name.to_string()));
        }
        if !self.any_recompute(outputs.len()) {
            return Err(Error::RecomputeNotReady {
                function: name.to_string(),
                output: 0,
                reason: "no output is declared recompute-needed".to_string(),
            });
        }
        trace!("{name}: recompute");
        self.function.recompute_impl(inputs, outputs)
    }

    // Memory-planner queries

    pub fn grad_depends_output_data(&self, i: usize, o: usize) -> bool {
        self.function.grad_depends_output_data(i, o)
    }

    pub fn grad_depends_input_data(&self, i: usize, j: usize) -> bool {
        self.function.grad_depends_input_data(i, j)
    }

    pub fn inplace_data(&self, i: usize) -> Inplace {
        self.function.inplace_data(i)
    }

    pub fn inplace_data_with(&self, i: usize) -> usize {
        self.function.inplace_data_with(i)
    }

    pub fn inplace_grad(&self, i: usize) -> Inplace {
        self.function.inplace_grad(i)
    }

    pub fn inplace_grad_with(&self, i: usize) -> usize {
        self.function.inplace_grad_with(i)
    }

    /// An independent, not-yet-set-up node with the same arguments.
    pub fn copy(&self) -> FunctionNode {
        FunctionNode::new(self.function.copy())
    }

    // Internals

    fn ensure_setup(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let Some(shapes) = &self.setup_shapes else {
            return Err(Error::SetupNotCalled(self.function.name().to_string()));
        };
        let changed = shapes.len() != inputs.len()
            || shapes.iter().zip(inputs).any(|(s, v)| *s != v.shape());
        if changed {
            debug!(
                "{}: input shapes changed since setup, running setup again",
                self.function.name()
            );
            self.setup(inputs, outputs)?;
        }
        Ok(())
    }

    fn check_array_classes(&self, inputs: &[Variable]) -> Result<()> {
        let allowed = self.function.allowed_array_classes();
        for input in inputs {
            let class = input.array_class();
            if !allowed.contains(&class) {
                return Err(Error::ArrayClassNotAllowed {
                    function: self.function.name().to_string(),
                    class,
                    allowed,
                });
            }
        }
        Ok(())
    }

    /// An output may share an input's data buffer only where `inplace_data`
    /// allows it, and only as the output named by `inplace_data_with`.
    fn check_inplace(&self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        for (i, input) in inputs.iter().enumerate() {
            for (o, output) in outputs.iter().enumerate() {
                if !output.shares_data_with(input) {
                    continue;
                }
                if !self.function.inplace_data(i).is_allowed()
                    || self.function.inplace_data_with(i) != o
                {
                    return Err(Error::InplaceNotAllowed {
                        function: self.function.name().to_string(),
                        input: i,
                        output: o,
                    });
                }
            }
        }
        Ok(())
    }

    fn any_recompute(&self, n_outputs: usize) -> bool {
        (0..n_outputs).any(|o| self.function.need_setup_recompute(o))
    }
}
