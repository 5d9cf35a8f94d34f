use crate::candle_aux_layers::StackLayers;
use crate::candle_aux_linear::dense_no_bias;
use crate::tensor_util::diag_matrix;

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Prior transition p(z[t] | z[t-1])
///
/// * mean: `num_layers` bias-free dense layers chained without activation
/// * covariance: `diag(exp(n))` with `n ~ N(0, I)` drawn on every call
///
/// Variables: `{vb}.dense{i}.weight` for `i` in `0..num_layers`
pub struct TransitionBlock {
    num_units: usize,
    fc: StackLayers<Linear>,
}

impl TransitionBlock {
    pub fn new(num_units: usize, num_layers: usize, vb: VarBuilder) -> Result<Self> {
        let mut fc = StackLayers::<Linear>::new();
        for i in 0..num_layers {
            let _name = format!("dense{}", i);
            fc.push(dense_no_bias(num_units, num_units, vb.pp(_name))?);
        }
        Ok(Self { num_units, fc })
    }

    /// Predicted prior mean given the previous latent sample (1 x U)
    pub fn prior_mean(&self, z_prev: &Tensor) -> Result<Tensor> {
        self.fc.forward(z_prev)
    }

    /// Freshly sampled diagonal prior covariance (U x U)
    pub fn prior_cov(&self, device: &Device) -> Result<Tensor> {
        let noise_1u = Tensor::randn(0f32, 1f32, (1, self.num_units), device)?;
        diag_matrix(&noise_1u.exp()?)
    }

    /// Prior of the very first step: N(0, I)
    pub fn initial_prior(num_units: usize, device: &Device) -> Result<(Tensor, Tensor)> {
        Ok((
            Tensor::zeros((1, num_units), DType::F32, device)?,
            Tensor::eye(num_units, DType::F32, device)?,
        ))
    }

    /// `(prior_mean, prior_cov)` for a step after the first
    pub fn forward(&self, z_prev: &Tensor) -> Result<(Tensor, Tensor)> {
        Ok((self.prior_mean(z_prev)?, self.prior_cov(z_prev.device())?))
    }

    pub fn num_layers(&self) -> usize {
        self.fc.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_nn::VarMap;

    #[test]
    fn test_layers_are_chained() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = TransitionBlock::new(3, 2, vb.pp("dkf"))?;
        assert_eq!(block.num_layers(), 2);
        assert_eq!(varmap.all_vars().len(), 2);

        let z = Tensor::randn(0f32, 1f32, (1, 3), &dev)?;

        let w0 = vb.pp("dkf").pp("dense0").get((3, 3), "weight")?;
        let w1 = vb.pp("dkf").pp("dense1").get((3, 3), "weight")?;
        let expected = z.matmul(&w0.t()?)?.matmul(&w1.t()?)?;

        let actual = block.prior_mean(&z)?;
        let diff = actual.sub(&expected)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert_abs_diff_eq!(diff, 0.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_prior_cov_is_positive_diagonal() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = TransitionBlock::new(4, 1, vb)?;

        let cov = block.prior_cov(&dev)?.to_vec2::<f32>()?;
        for (i, row) in cov.iter().enumerate() {
            for (j, &c) in row.iter().enumerate() {
                if i == j {
                    assert!(c > 0.0);
                } else {
                    assert_eq!(c, 0.0);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_initial_prior_is_standard_normal() -> Result<()> {
        let (mean, cov) = TransitionBlock::initial_prior(2, &Device::Cpu)?;
        assert_eq!(mean.to_vec2::<f32>()?, vec![vec![0., 0.]]);
        assert_eq!(cov.to_vec2::<f32>()?, vec![vec![1., 0.], vec![0., 1.]]);
        Ok(())
    }
}
