// Process seed source — kept in its own test binary because it reseeds global state

use wren::prelude::*;

fn unseeded_sample() -> Vec<f64> {
    let mut node = create_rand_normal(&Context::cpu(), 0.0, 1.0, &[6], None).unwrap();
    let y = Variable::new(0, DType::F32);
    node.setup(&[], &[y.clone()]).unwrap();
    node.forward(&[], &[y.clone()]).unwrap();
    y.to_f64_vec()
}

#[test]
fn test_set_seed_makes_unseeded_functions_reproducible() {
    set_seed(1234);
    let first = unseeded_sample();
    let second = unseeded_sample();
    assert_ne!(first, second);

    set_seed(1234);
    assert_eq!(unseeded_sample(), first);
    assert_eq!(unseeded_sample(), second);
}
