use crate::candle_aux_linear::dense;
use crate::candle_loss_functions::gaussian_diag_log_density;
use crate::tensor_util::diag_matrix;

use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Emission p(x[t] | z[t]) = N(mu(h), diag(exp(logd(h)))),
/// where h = tanh(W z + b)
///
/// Variables under `vb`:
/// * `emission.{weight,bias}` - hidden layer
/// * `mu.{weight,bias}` - observation mean
/// * `logd.{weight,bias}` - log of the covariance diagonal
pub struct EmissionBlock {
    num_units: usize,
    hidden: Linear,
    mu: Linear,
    logd: Linear,
}

impl EmissionBlock {
    pub fn new(num_units: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = dense(num_units, num_units, vb.pp("emission"))?;
        let mu = dense(num_units, num_units, vb.pp("mu"))?;
        let logd = dense(num_units, num_units, vb.pp("logd"))?;
        Ok(Self {
            num_units,
            hidden,
            mu,
            logd,
        })
    }

    /// Observation distribution parameters `(mu, logd)`, each 1 x U
    pub fn forward(&self, z_1u: &Tensor) -> Result<(Tensor, Tensor)> {
        let h_1u = self.hidden.forward(z_1u)?.tanh()?;
        Ok((self.mu.forward(&h_1u)?, self.logd.forward(&h_1u)?))
    }

    /// Full observation covariance `diag(exp(logd))` (U x U)
    pub fn obs_cov(logd_1u: &Tensor) -> Result<Tensor> {
        diag_matrix(&logd_1u.exp()?)
    }

    /// ln p(x | z) for one observation
    ///
    /// * `z_1u` - latent sample
    /// * `x_1u` - observation, any shape with U elements
    pub fn log_density(&self, z_1u: &Tensor, x_1u: &Tensor) -> Result<Tensor> {
        let (mu_1u, logd_1u) = self.forward(z_1u)?;
        let x_1u = x_1u.reshape((1, self.num_units))?;
        gaussian_diag_log_density(&x_1u, &mu_1u, &logd_1u)
    }

    /// p(x | z), the density itself
    pub fn density(&self, z_1u: &Tensor, x_1u: &Tensor) -> Result<Tensor> {
        self.log_density(z_1u, x_1u)?.exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor_util::to_dmatrix;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_density_matches_full_covariance_gaussian() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = EmissionBlock::new(3, vb.pp("dkf"))?;
        assert_eq!(varmap.all_vars().len(), 6);

        let z = Tensor::randn(0f32, 1f32, (1, 3), &dev)?;
        let x = Tensor::new(&[0.5f32, -0.25, 0.1], &dev)?;

        let (mu, logd) = block.forward(&z)?;
        let cov = to_dmatrix(&EmissionBlock::obs_cov(&logd)?)?;
        let mu = to_dmatrix(&mu)?;
        let x_nal = to_dmatrix(&x.reshape((1, 3))?)?;

        // reference: (2 pi)^{-d/2} det(S)^{-1/2} exp(-0.5 r' S^{-1} r)
        let r = (x_nal - mu).transpose();
        let inv = cov.clone().try_inverse().expect("diagonal covariance");
        let quad = (r.transpose() * inv * &r)[(0, 0)];
        let ln_ref = -0.5 * (3.0 * (2.0 * std::f64::consts::PI).ln() + cov.determinant().ln() + quad);

        let ln_val = block.log_density(&z, &x)?.to_scalar::<f32>()? as f64;
        assert_abs_diff_eq!(ln_val, ln_ref, epsilon = 1e-3 * ln_ref.abs().max(1.0));
        Ok(())
    }

    #[test]
    fn test_density_is_exp_of_log_density() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let block = EmissionBlock::new(2, vb)?;

        let z = Tensor::zeros((1, 2), DType::F32, &dev)?;
        let x = Tensor::zeros((1, 2), DType::F32, &dev)?;
        let ln_p = block.log_density(&z, &x)?.to_scalar::<f32>()?;
        let p = block.density(&z, &x)?.to_scalar::<f32>()?;
        assert_abs_diff_eq!(p, ln_p.exp(), epsilon = 1e-6 * p.max(1.0));
        Ok(())
    }
}
