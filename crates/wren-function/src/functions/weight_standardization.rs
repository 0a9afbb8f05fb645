// WeightStandardization — per-channel standardization of a weight tensor
//
// For a weight `w` and a channel axis of size C:
//
//   mean_c = mean of w over every element of channel c
//   var_c  = biased variance over the same elements
//   y      = (w - mean_c) / sqrt(var_c + eps)
//
// Outputs: `y`, plus optionally `mean` and `var` (shape [C]); a function node
// is given either one output or all three.
//
// The tensor is viewed as [outer, C, inner] around the channel axis; element
// (o, c, i) lives at flat index (o * C + c) * inner + i. Statistics and the
// gradient are accumulated in f64 whatever the element type.
//
// BACKWARD:
//
//   x_hat = (w - mean) * rstd,  rstd = 1 / sqrt(var + eps)
//   dw    = rstd * (dy - mean(dy) - x_hat * mean(dy * x_hat))   per channel
//
// With the stats outputs present backward reads mean/var from them, which is
// why input 0's gradient depends on outputs 1 and 2. Otherwise it uses the
// statistics cached by the last forward.

use std::marker::PhantomData;

use wren_core::{Context, DType, Error, FloatDType, Result, Shape, Variable, WithDType};

use crate::args::Arg;
use crate::function::Function;

const NAME: &str = "WeightStandardization";

/// Channel-wise weight standardization.
pub struct WeightStandardization<T: FloatDType> {
    ctx: Context,
    channel_axis: i64,
    eps: f64,
    /// (outer, channels, inner), fixed by setup.
    layout: (usize, usize, usize),
    mean: Vec<f64>,
    var: Vec<f64>,
    _marker: PhantomData<T>,
}

impl<T: FloatDType> WeightStandardization<T> {
    pub fn new(ctx: Context, channel_axis: i64, eps: f64) -> Result<Self> {
        if !(eps > 0.0) {
            return Err(Error::invalid_argument(
                NAME,
                format!("eps must be greater than 0, got {eps}"),
            ));
        }
        Ok(WeightStandardization {
            ctx,
            channel_axis,
            eps,
            layout: (0, 0, 0),
            mean: Vec::new(),
            var: Vec::new(),
            _marker: PhantomData,
        })
    }

    fn channel_of(&self, flat: usize) -> usize {
        let (_, c, inner) = self.layout;
        (flat / inner.max(1)) % c.max(1)
    }

    /// Mean and variance, from the stats outputs when present.
    fn stats(&self, outputs: &[Variable]) -> Result<(Vec<f64>, Vec<f64>)> {
        if outputs.len() >= 3 {
            return Ok((outputs[1].to_f64_vec(), outputs[2].to_f64_vec()));
        }
        if self.mean.len() != self.layout.1 {
            return Err(Error::msg(format!(
                "{NAME}: backward called before forward computed the statistics"
            )));
        }
        Ok((self.mean.clone(), self.var.clone()))
    }
}

impl<T: FloatDType> Function for WeightStandardization<T> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn args(&self) -> Vec<Arg> {
        vec![Arg::Int(self.channel_axis), Arg::Float(self.eps)]
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
        vec![T::DTYPE; 3]
    }

    fn setup_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        if outputs.len() == 2 || outputs.len() > 3 {
            return Err(Error::msg(format!(
                "{NAME}: expected 1 or 3 outputs (y, mean, var), got {}",
                outputs.len()
            )));
        }
        let shape = inputs[0].shape();
        let axis = shape.normalize_axis(self.channel_axis)?;
        let dims = shape.dims();
        let outer: usize = dims[..axis].iter().product();
        let channels = dims[axis];
        let inner: usize = dims[axis + 1..].iter().product();
        self.layout = (outer, channels, inner);
        self.mean.clear();
        self.var.clear();

        outputs[0].reshape(shape.clone(), T::DTYPE);
        for stat in outputs.iter().skip(1) {
            stat.reshape(Shape::from(channels), T::DTYPE);
        }
        Ok(())
    }

    fn forward_impl(&mut self, inputs: &[Variable], outputs: &[Variable]) -> Result<()> {
        let (outer, channels, inner) = self.layout;
        let count = (outer * inner) as f64;
        let x = inputs[0].to_f64_vec();

        let mut mean = vec![0.0; channels];
        let mut var = vec![0.0; channels];
        if count > 0.0 {
            for (k, &v) in x.iter().enumerate() {
                mean[self.channel_of(k)] += v;
            }
            mean.iter_mut().for_each(|m| *m /= count);
            for (k, &v) in x.iter().enumerate() {
                let c = self.channel_of(k);
                var[c] += (v - mean[c]) * (v - mean[c]);
            }
            var.iter_mut().for_each(|s| *s /= count);
        }

        {
            let mut y = outputs[0].data_mut();
            for (k, out) in y.as_mut_slice::<T>()?.iter_mut().enumerate() {
                let c = self.channel_of(k);
                let rstd = 1.0 / (var[c] + self.eps).sqrt();
                *out = <T as WithDType>::from_f64((x[k] - mean[c]) * rstd);
            }
        }
        if outputs.len() >= 3 {
            let to_t = |v: &[f64]| v.iter().map(|&s| <T as WithDType>::from_f64(s)).collect::<Vec<T>>();
            outputs[1].set_data(&to_t(&mean))?;
            outputs[2].set_data(&to_t(&var))?;
        }
        self.mean = mean;
        self.var = var;
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
        let (outer, channels, inner) = self.layout;
        let count = (outer * inner) as f64;
        if count == 0.0 {
            return Ok(());
        }
        let (mean, var) = self.stats(outputs)?;
        let rstd: Vec<f64> = var.iter().map(|v| 1.0 / (v + self.eps).sqrt()).collect();
        let x = inputs[0].to_f64_vec();
        let dy = outputs[0].grad_to_f64_vec();

        let x_hat: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(k, &v)| {
                let c = self.channel_of(k);
                (v - mean[c]) * rstd[c]
            })
            .collect();
        let mut mean_dy = vec![0.0; channels];
        let mut mean_dy_xhat = vec![0.0; channels];
        for k in 0..x.len() {
            let c = self.channel_of(k);
            mean_dy[c] += dy[k];
            mean_dy_xhat[c] += dy[k] * x_hat[k];
        }
        mean_dy.iter_mut().for_each(|m| *m /= count);
        mean_dy_xhat.iter_mut().for_each(|m| *m /= count);

        let mut g = inputs[0].grad_mut();
        for (k, gk) in g.as_mut_slice::<T>()?.iter_mut().enumerate() {
            let c = self.channel_of(k);
            let dx = rstd[c] * (dy[k] - mean_dy[c] - x_hat[k] * mean_dy_xhat[c]);
            let prev = if accum[0] { WithDType::to_f64(*gk) } else { 0.0 };
            *gk = <T as WithDType>::from_f64(prev + dx);
        }
        Ok(())
    }

    fn grad_depends_output_data(&self, _i: usize, o: usize) -> bool {
        o > 0
    }

    fn grad_depends_input_data(&self, i: usize, j: usize) -> bool {
        i == 0 && j == 0
    }

    fn copy(&self) -> Box<dyn Function> {
        Box::new(WeightStandardization::<T> {
            ctx: self.ctx.clone(),
            channel_axis: self.channel_axis,
            eps: self.eps,
            layout: (0, 0, 0),
            mean: Vec::new(),
            var: Vec::new(),
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eps_must_be_positive() {
        assert!(WeightStandardization::<f32>::new(Context::cpu(), 0, 0.0).is_err());
        assert!(WeightStandardization::<f32>::new(Context::cpu(), 0, -1e-5).is_err());
    }

    #[test]
    fn test_channel_of_layout() {
        let mut f = WeightStandardization::<f64>::new(Context::cpu(), 1, 1e-5).unwrap();
        // [2, 3, 2]: channel axis 1
        f.layout = (2, 3, 2);
        let channels: Vec<usize> = (0..12).map(|k| f.channel_of(k)).collect();
        assert_eq!(channels, vec![0, 0, 1, 1, 2, 2, 0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_dependency_flags() {
        let f = WeightStandardization::<f32>::new(Context::cpu(), 0, 1e-5).unwrap();
        assert!(!f.grad_depends_output_data(0, 0));
        assert!(f.grad_depends_output_data(0, 1));
        assert!(f.grad_depends_output_data(0, 2));
        assert!(f.grad_depends_input_data(0, 0));
    }
}
