// Binary elementwise arithmetic
//
// Each op is generated by `define_transform_binary!`. The policy flags state
// exactly which buffers the gradient formulas read; an input is marked
// in-place capable only when no gradient formula reads it.

use crate::define_transform_binary;
use crate::transform::BinaryPolicy;

define_transform_binary! {
    /// Elementwise addition, `y = x0 + x1`.
    Add2 / Add2Op: "Add2",
    forward: |x0, x1| x0 + x1,
    grad0: |dy, x0, x1, y| dy,
    grad1: |dy, x0, x1, y| dy,
    policy: BinaryPolicy {
        inplace: [true, true],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [false, false],
        grad_needs_other_input: [false, false],
    },
}

define_transform_binary! {
    /// Elementwise subtraction, `y = x0 - x1`.
    Sub2 / Sub2Op: "Sub2",
    forward: |x0, x1| x0 - x1,
    grad0: |dy, x0, x1, y| dy,
    grad1: |dy, x0, x1, y| -dy,
    policy: BinaryPolicy {
        inplace: [true, true],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [false, false],
        grad_needs_other_input: [false, false],
    },
}

define_transform_binary! {
    /// Elementwise multiplication, `y = x0 * x1`.
    Mul2 / Mul2Op: "Mul2",
    forward: |x0, x1| x0 * x1,
    grad0: |dy, x0, x1, y| dy * x1,
    grad1: |dy, x0, x1, y| dy * x0,
    policy: BinaryPolicy {
        inplace: [false, false],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [false, false],
        grad_needs_other_input: [true, true],
    },
}

define_transform_binary! {
    /// Elementwise division, `y = x0 / x1`.
    ///
    /// `dx0 = dy / x1`, `dx1 = -dy * x0 / x1^2`. Both inputs are read by
    /// backward, so neither may be overwritten in place; input 0's gradient
    /// may reuse the output gradient buffer.
    Div2 / Div2Op: "Div2",
    forward: |x0, x1| x0 / x1,
    grad0: |dy, x0, x1, y| dy / x1,
    grad1: |dy, x0, x1, y| -dy * x0 / (x1 * x1),
    policy: BinaryPolicy {
        inplace: [false, false],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [false, true],
        grad_needs_other_input: [true, true],
    },
}

define_transform_binary! {
    /// Elementwise power, `y = x0 ^ x1`.
    Pow2 / Pow2Op: "Pow2",
    forward: |x0, x1| x0.powf(x1),
    grad0: |dy, x0, x1, y| dy * x1 * x0.powf(x1 - T::one()),
    grad1: |dy, x0, x1, y| dy * y * x0.ln(),
    policy: BinaryPolicy {
        inplace: [false, false],
        inplace_grad: true,
        grad_needs_output: [false, true],
        grad_needs_own_input: [true, false],
        grad_needs_other_input: [true, true],
    },
}

define_transform_binary! {
    /// Elementwise maximum. Ties send the gradient to input 0.
    Maximum2 / Maximum2Op: "Maximum2",
    forward: |x0, x1| x0.max(x1),
    grad0: |dy, x0, x1, y| if x0 >= x1 { dy } else { T::zero() },
    grad1: |dy, x0, x1, y| if x0 >= x1 { T::zero() } else { dy },
    policy: BinaryPolicy {
        inplace: [false, false],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [true, true],
        grad_needs_other_input: [true, true],
    },
}

define_transform_binary! {
    /// Elementwise minimum. Ties send the gradient to input 0.
    Minimum2 / Minimum2Op: "Minimum2",
    forward: |x0, x1| x0.min(x1),
    grad0: |dy, x0, x1, y| if x0 <= x1 { dy } else { T::zero() },
    grad1: |dy, x0, x1, y| if x0 <= x1 { T::zero() } else { dy },
    policy: BinaryPolicy {
        inplace: [false, false],
        inplace_grad: true,
        grad_needs_output: [false, false],
        grad_needs_own_input: [true, true],
        grad_needs_other_input: [true, true],
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::BinaryOpT;

    #[test]
    fn test_policies_are_consistent() {
        for p in [
            Add2Op::POLICY,
            Sub2Op::POLICY,
            Mul2Op::POLICY,
            Div2Op::POLICY,
            Pow2Op::POLICY,
            Maximum2Op::POLICY,
            Minimum2Op::POLICY,
        ] {
            assert!(p.is_consistent(), "{p:?}");
        }
    }

    #[test]
    fn test_div2_formulas() {
        assert_eq!(Div2Op::forward(6.0f64, 2.0), 3.0);
        assert_eq!(Div2Op::grad0(1.0f64, 6.0, 2.0, 3.0), 0.5);
        assert_eq!(Div2Op::grad1(1.0f64, 6.0, 2.0, 3.0), -1.5);
    }

    #[test]
    fn test_div2_flags() {
        let p = Div2Op::POLICY;
        assert!(!p.grad_depends_output_data(0, 0));
        assert!(!p.grad_depends_output_data(1, 0));
        assert!(!p.grad_depends_input_data(0, 0));
        assert!(p.grad_depends_input_data(0, 1));
        assert!(p.grad_depends_input_data(1, 0));
        assert!(p.grad_depends_input_data(1, 1));
    }

    #[test]
    fn test_pow2_gradients() {
        // d/dx0 x0^3 at 2 = 12, d/dx1 2^x1 at 3 = 8 ln 2
        let y = Pow2Op::forward(2.0f64, 3.0);
        assert_eq!(y, 8.0);
        assert!((Pow2Op::grad0(1.0f64, 2.0, 3.0, y) - 12.0).abs() < 1e-12);
        assert!((Pow2Op::grad1(1.0f64, 2.0, 3.0, y) - 8.0 * 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_maximum_tie_goes_to_first_input() {
        assert_eq!(Maximum2Op::grad0(1.0f32, 2.0, 2.0, 2.0), 1.0);
        assert_eq!(Maximum2Op::grad1(1.0f32, 2.0, 2.0, 2.0), 0.0);
        assert_eq!(Minimum2Op::grad1(1.0f32, 3.0, 2.0, 2.0), 1.0);
    }
}
