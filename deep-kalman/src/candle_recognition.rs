use crate::candle_aux_layers::StackLayers;
use crate::candle_aux_linear::dense;
use crate::candle_model_traits::*;
use crate::tensor_util::diag_matrix;

use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Hands out a parameter stack computed elsewhere
pub struct StackedRecognition {
    stack: Vec<GaussianParam>,
    dim_obs: usize,
    dim_latent: usize,
}

impl StackedRecognition {
    /// * `stack` - top-down ordered: the last element is time step 0
    pub fn new(stack: Vec<GaussianParam>, dim_obs: usize) -> Result<Self> {
        let dim_latent = match stack.last() {
            Some((mean, _)) => mean.elem_count(),
            None => 0,
        };
        for (mean, cov) in stack.iter() {
            if mean.elem_count() != dim_latent || cov.dims2()? != (dim_latent, dim_latent) {
                candle_core::bail!(
                    "inconsistent posterior parameters: mean {:?}, cov {:?}, expected dim {}",
                    mean.dims(),
                    cov.dims(),
                    dim_latent
                );
            }
        }
        Ok(Self {
            stack,
            dim_obs,
            dim_latent,
        })
    }

    /// Build from per-time-step parameters given in chronological order
    pub fn from_chronological(params: Vec<GaussianParam>, dim_obs: usize) -> Result<Self> {
        Self::new(params.into_iter().rev().collect(), dim_obs)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl RecognitionModuleT for StackedRecognition {
    fn param_stack(&self, _status: &Tensor) -> Result<Vec<GaussianParam>> {
        Ok(self.stack.clone())
    }

    fn dim_obs(&self) -> usize {
        self.dim_obs
    }

    fn dim_latent(&self) -> usize {
        self.dim_latent
    }
}

/// Per-time-step Gaussian encoder q(z[t] | x[t])
///
/// x[t] -> fc (ReLU) -> (mean, lnvar), covariance `diag(exp(lnvar))`
pub struct GaussianRecognitionEncoder {
    n_features: usize,
    n_units: usize,
    fc: StackLayers<Linear>,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl GaussianRecognitionEncoder {
    /// Will create a new recognition encoder with these variables:
    ///
    /// * `fc.{}.weight`, `fc.{}.bias` where {} is the layer index
    /// * `z.mean.{weight,bias}`
    /// * `z.lnvar.{weight,bias}`
    pub fn new(
        n_features: usize,
        n_units: usize,
        layers: &[usize],
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut fc = StackLayers::<Linear>::new();
        let mut prev_dim = n_features;
        for (j, &next_dim) in layers.iter().enumerate() {
            let _name = format!("fc.{}", j);
            fc.push_with_act(
                dense(prev_dim, next_dim, vb.pp(_name))?,
                candle_nn::Activation::Relu,
            );
            prev_dim = next_dim;
        }

        let z_mean = dense(prev_dim, n_units, vb.pp("z.mean"))?;
        let z_lnvar = dense(prev_dim, n_units, vb.pp("z.lnvar"))?;

        Ok(Self {
            n_features,
            n_units,
            fc,
            z_mean,
            z_lnvar,
        })
    }

    /// Evaluate `(mean, lnvar)` for all time steps at once (T x U each)
    pub fn latent_gaussian_params(&self, status: &Tensor) -> Result<(Tensor, Tensor)> {
        let min_lv = -8.;
        let max_lv = 8.;

        let h_tl = self.fc.forward(status)?;
        let z_mean_tu = self.z_mean.forward(&h_tl)?;
        let z_lnvar_tu = self.z_lnvar.forward(&h_tl)?.clamp(min_lv, max_lv)?;
        Ok((z_mean_tu, z_lnvar_tu))
    }
}

impl RecognitionModuleT for GaussianRecognitionEncoder {
    fn param_stack(&self, status: &Tensor) -> Result<Vec<GaussianParam>> {
        let (ntime, nfeat) = status.dims2()?;
        if nfeat != self.n_features {
            candle_core::bail!(
                "recognition expects {} features per step, got {}",
                self.n_features,
                nfeat
            );
        }

        let (z_mean_tu, z_lnvar_tu) = self.latent_gaussian_params(status)?;

        // top-down: last time step first
        let mut stack = Vec::with_capacity(ntime);
        for t in (0..ntime).rev() {
            let mean_1u = z_mean_tu.get(t)?.reshape((1, self.n_units))?;
            let cov_uu = diag_matrix(&z_lnvar_tu.get(t)?.exp()?)?;
            stack.push((mean_1u, cov_uu));
        }
        Ok(stack)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_units
    }
}
