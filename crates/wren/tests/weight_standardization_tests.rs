// WeightStandardization tests — statistics, optional outputs, numeric gradient check

use wren::prelude::*;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(approx_eq(*g, *e, tol), "index {i}: got {g}, expected {e}");
    }
}

fn f64_ctx() -> Context {
    Context::cpu().with_dtype(DType::F64)
}

const W: [f64; 6] = [1.0, 2.0, 3.0, 4.0, 6.0, 8.0];
const EPS: f64 = 1e-5;

#[test]
fn test_standardizes_each_channel() {
    let mut ws = create_weight_standardization(&f64_ctx(), 0, EPS).unwrap();
    let w = Variable::from_vec(W.to_vec(), (2, 3)).unwrap();
    let y = Variable::new(0, DType::F64);
    ws.setup(&[w.clone()], &[y.clone()]).unwrap();
    ws.forward(&[w], &[y.clone()]).unwrap();

    let r0 = 1.0 / (2.0f64 / 3.0 + EPS).sqrt();
    let r1 = 1.0 / (8.0f64 / 3.0 + EPS).sqrt();
    assert_vec_approx(
        &y.to_f64_vec(),
        &[-r0, 0.0, r0, -2.0 * r1, 0.0, 2.0 * r1],
        1e-12,
    );
}

#[test]
fn test_stats_outputs() {
    let mut ws = create_weight_standardization(&f64_ctx(), 0, EPS).unwrap();
    let w = Variable::from_vec(W.to_vec(), (2, 3)).unwrap();
    let (y, mean, var) = (
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
    );
    let outputs = vec![y, mean.clone(), var.clone()];
    ws.setup(&[w.clone()], &outputs).unwrap();
    assert_eq!(mean.dims(), vec![2]);
    ws.forward(&[w], &outputs).unwrap();
    assert_vec_approx(&mean.to_f64_vec(), &[2.0, 6.0], 1e-12);
    assert_vec_approx(&var.to_f64_vec(), &[2.0 / 3.0, 8.0 / 3.0], 1e-12);
}

#[test]
fn test_negative_channel_axis() {
    let mut ws = create_weight_standardization(&f64_ctx(), -1, EPS).unwrap();
    let w = Variable::from_vec(W.to_vec(), (2, 3)).unwrap();
    let (y, mean, var) = (
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
    );
    let outputs = vec![y, mean.clone(), var.clone()];
    ws.setup(&[w.clone()], &outputs).unwrap();
    ws.forward(&[w], &outputs).unwrap();
    // Columns: (1, 4), (2, 6), (3, 8)
    assert_vec_approx(&mean.to_f64_vec(), &[2.5, 4.0, 5.5], 1e-12);
    assert_vec_approx(&var.to_f64_vec(), &[2.25, 4.0, 6.25], 1e-12);
}

#[test]
fn test_setup_errors() {
    let w = Variable::from_vec(W.to_vec(), (2, 3)).unwrap();

    let mut out_of_range = create_weight_standardization(&f64_ctx(), 2, EPS).unwrap();
    assert!(matches!(
        out_of_range.setup(&[w.clone()], &[Variable::new(0, DType::F64)]),
        Err(Error::DimOutOfRange { .. })
    ));

    let mut two_outputs = create_weight_standardization(&f64_ctx(), 0, EPS).unwrap();
    assert!(two_outputs
        .setup(
            &[w],
            &[Variable::new(0, DType::F64), Variable::new(0, DType::F64)]
        )
        .is_err());

    assert!(matches!(
        create_weight_standardization(&f64_ctx(), 0, 0.0),
        Err(Error::InvalidArgument { .. })
    ));
}

/// sum(y * r) for a fixed weighting `r`, so dy = r.
fn loss(node: &mut FunctionNode, w: &Variable, y: &Variable, r: &[f64]) -> f64 {
    node.forward(&[w.clone()], &[y.clone()]).unwrap();
    y.to_f64_vec().iter().zip(r).map(|(a, b)| a * b).sum()
}

#[test]
fn test_gradient_matches_finite_differences() {
    let data = [0.3, -1.2, 2.5, 0.7, 1.1, -0.4, 3.0, 0.2, -2.2, 1.6, 0.9, -0.8];
    let r = [0.5, -1.0, 2.0, 0.25, 1.5, -0.75, 1.0, 0.1, -0.3, 0.8, -1.2, 0.6];
    let mut ws = create_weight_standardization(&f64_ctx(), 1, EPS).unwrap();
    let w = Variable::from_vec(data.to_vec(), (2, 3, 2)).unwrap();
    let y = Variable::new(0, DType::F64);
    ws.setup(&[w.clone()], &[y.clone()]).unwrap();

    loss(&mut ws, &w, &y, &r);
    y.set_grad(&r).unwrap();
    ws.backward(&[w.clone()], &[y.clone()], &[true], &[false])
        .unwrap();
    let analytic = w.grad_to_f64_vec();

    let h = 1e-6;
    let mut numeric = Vec::with_capacity(data.len());
    for k in 0..data.len() {
        let mut plus = data;
        plus[k] += h;
        w.set_data(&plus).unwrap();
        let lp = loss(&mut ws, &w, &y, &r);
        let mut minus = data;
        minus[k] -= h;
        w.set_data(&minus).unwrap();
        let lm = loss(&mut ws, &w, &y, &r);
        numeric.push((lp - lm) / (2.0 * h));
    }
    assert_vec_approx(&analytic, &numeric, 1e-5);
}

#[test]
fn test_backward_reads_stats_outputs_and_accumulates() {
    let data = [0.3, -1.2, 2.5, 0.7, 1.1, -0.4];
    let dy = [1.0, -0.5, 0.25, 2.0, 0.0, -1.0];

    // Reference: single output, statistics from the forward cache.
    let mut single = create_weight_standardization(&f64_ctx(), 0, EPS).unwrap();
    let w1 = Variable::from_vec(data.to_vec(), (2, 3)).unwrap();
    let y1 = Variable::new(0, DType::F64);
    single.setup(&[w1.clone()], &[y1.clone()]).unwrap();
    single.forward(&[w1.clone()], &[y1.clone()]).unwrap();
    y1.set_grad(&dy).unwrap();
    single
        .backward(&[w1.clone()], &[y1], &[true], &[false])
        .unwrap();
    let reference = w1.grad_to_f64_vec();

    let mut triple = create_weight_standardization(&f64_ctx(), 0, EPS).unwrap();
    let w3 = Variable::from_vec(data.to_vec(), (2, 3)).unwrap();
    let outputs = vec![
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
        Variable::new(0, DType::F64),
    ];
    triple.setup(&[w3.clone()], &outputs).unwrap();
    triple.forward(&[w3.clone()], &outputs).unwrap();
    outputs[0].set_grad(&dy).unwrap();
    w3.set_grad(&[1.0f64; 6]).unwrap();
    triple
        .backward(&[w3.clone()], &outputs, &[true], &[true])
        .unwrap();

    let expected: Vec<f64> = reference.iter().map(|g| g + 1.0).collect();
    assert_vec_approx(&w3.grad_to_f64_vec(), &expected, 1e-12);
}

#[test]
fn test_dependency_flags() {
    let ws = create_weight_standardization(&Context::cpu(), 0, EPS).unwrap();
    assert!(!ws.grad_depends_output_data(0, 0));
    assert!(ws.grad_depends_output_data(0, 1));
    assert!(ws.grad_depends_output_data(0, 2));
    assert!(ws.grad_depends_input_data(0, 0));
    assert_eq!(ws.inplace_data(0), Inplace::NotAllowed);
}
