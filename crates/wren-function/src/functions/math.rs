// Unary elementwise math
//
// Ops whose gradient is written in terms of the output (Exp, Sqrt, Tanh,
// Sigmoid) never read the input in backward, so they may run in place.

use crate::define_transform_unary;
use crate::transform::UnaryPolicy;

define_transform_unary! {
    /// Elementwise negation.
    Neg / NegOp: "Neg",
    forward: |x| -x,
    grad: |dy, x, y| -dy,
    policy: UnaryPolicy {
        inplace: true,
        inplace_grad: true,
        grad_needs_output: false,
        grad_needs_input: false,
    },
}

define_transform_unary! {
    /// Elementwise `e^x`.
    Exp / ExpOp: "Exp",
    forward: |x| x.exp(),
    grad: |dy, x, y| dy * y,
    policy: UnaryPolicy {
        inplace: true,
        inplace_grad: true,
        grad_needs_output: true,
        grad_needs_input: false,
    },
}

define_transform_unary! {
    /// Elementwise natural logarithm.
    Log / LogOp: "Log",
    forward: |x| x.ln(),
    grad: |dy, x, y| dy / x,
    policy: UnaryPolicy {
        inplace: false,
        inplace_grad: true,
        grad_needs_output: false,
        grad_needs_input: true,
    },
}

define_transform_unary! {
    /// Elementwise square root.
    Sqrt / SqrtOp: "Sqrt",
    forward: |x| x.sqrt(),
    grad: |dy, x, y| dy / (y + y),
    policy: UnaryPolicy {
        inplace: true,
        inplace_grad: true,
        grad_needs_output: true,
        grad_needs_input: false,
    },
}

define_transform_unary! {
    /// Elementwise `x^2`.
    Square / SquareOp: "Square",
    forward: |x| x * x,
    grad: |dy, x, y| dy * (x + x),
    policy: UnaryPolicy {
        inplace: false,
        inplace_grad: true,
        grad_needs_output: false,
        grad_needs_input: true,
    },
}

define_transform_unary! {
    /// Elementwise hyperbolic tangent.
    Tanh / TanhOp: "Tanh",
    forward: |x| x.tanh(),
    grad: |dy, x, y| dy * (T::one() - y * y),
    policy: UnaryPolicy {
        inplace: true,
        inplace_grad: true,
        grad_needs_output: true,
        grad_needs_input: false,
    },
}

define_transform_unary! {
    /// Elementwise logistic sigmoid, `1 / (1 + e^-x)`.
    Sigmoid / SigmoidOp: "Sigmoid",
    forward: |x| T::one() / (T::one() + (-x).exp()),
    grad: |dy, x, y| dy * y * (T::one() - y),
    policy: UnaryPolicy {
        inplace: true,
        inplace_grad: true,
        grad_needs_output: true,
        grad_needs_input: false,
    },
}
