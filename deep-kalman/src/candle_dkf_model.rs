use crate::candle_emission::EmissionBlock;
use crate::candle_loss_functions::gaussian_full_kl_divergence;
use crate::candle_model_traits::{GaussianParam, RecognitionModuleT};
use crate::candle_transition::TransitionBlock;

use candle_core::{DType, Device, Result, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};

/// Structural configuration of a [`DeepKalmanFilter`]
///
/// Every field is required; nothing changes after construction.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// width of the raw input seen by the recognition model
    pub num_inputs: usize,
    /// latent (and observation) dimension U
    pub num_units: usize,
    /// number of chained dense layers in the transition mean
    pub num_layers: usize,
    /// sequence length T
    pub time_step: usize,
    /// minibatch size the caller trains with
    pub size: usize,
    /// namespace of the generative variables
    pub scope: String,
}

impl ModelConfig {
    pub fn new(
        num_inputs: usize,
        num_units: usize,
        num_layers: usize,
        time_step: usize,
        size: usize,
        scope: &str,
    ) -> Self {
        Self {
            num_inputs,
            num_units,
            num_layers,
            time_step,
            size,
            scope: scope.to_string(),
        }
    }
}

/// Everything the objective needs from one time step
#[derive(Debug, Clone)]
pub struct LatentStep {
    /// chronological index t
    pub time: usize,
    /// posterior q(z[t] | x): 1 x U, U x U
    pub q_mean: Tensor,
    pub q_cov: Tensor,
    /// prior p(z[t] | z[t-1]): 1 x U, U x U
    pub p_mean: Tensor,
    pub p_cov: Tensor,
    /// p(x[t] | z[t]), scalar density
    pub x_prob: Tensor,
    /// ln p(x[t] | z[t]), kept alongside so that the objective does not
    /// round-trip through an underflowing density
    pub x_log_prob: Tensor,
    /// z[t] ~ q
    pub z_sample: Tensor,
}

/// Generative half of a sequential VAE (Deep Kalman Filter)
///
/// The model owns its variable registry. Generative variables live under
/// `{scope}.` and are created the first time a layer asks for them; later
/// steps and later calls look the same names up again, so every time step
/// shares one set of weights.
pub struct DeepKalmanFilter {
    config: ModelConfig,
    varmap: VarMap,
    device: Device,
}

impl DeepKalmanFilter {
    pub fn new(config: ModelConfig, device: &Device) -> Self {
        Self {
            config,
            varmap: VarMap::new(),
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The registry, e.g., to hand every variable to an optimizer
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Root builder over this model's registry, no scope applied.
    /// Collaborators (e.g., a recognition encoder) register here under
    /// their own prefix.
    pub fn var_builder(&self) -> VarBuilder<'_> {
        VarBuilder::from_varmap(&self.varmap, DType::F32, &self.device)
    }

    fn scoped(&self) -> VarBuilder<'_> {
        self.var_builder().pp(&self.config.scope)
    }

    /// Create all generative variables now instead of on first use.
    /// Transition weights only exist when there is more than one step.
    pub fn init_vars(&self) -> Result<()> {
        EmissionBlock::new(self.config.num_units, self.scoped())?;
        if self.config.time_step > 1 {
            TransitionBlock::new(self.config.num_units, self.config.num_layers, self.scoped())?;
        }
        Ok(())
    }

    /// Ask `recognition` for the posterior stack, then build the sequence
    pub fn build_network_with<Rec>(
        &self,
        status: &Tensor,
        recognition: &Rec,
    ) -> Result<Vec<LatentStep>>
    where
        Rec: RecognitionModuleT,
    {
        self.check_status(status)?;
        let param_stack = recognition.param_stack(status)?;
        self.build_network(status, &param_stack)
    }

    /// Run the generative recurrence over all time steps
    ///
    /// * `status` - observed sequence (T x U)
    /// * `param_stack` - T posterior parameters, top-down ordered
    ///
    /// Step `t` takes `param_stack[T - 1 - t]`. Shapes are validated before
    /// any variable is touched.
    pub fn build_network(
        &self,
        status: &Tensor,
        param_stack: &[GaussianParam],
    ) -> Result<Vec<LatentStep>> {
        self.check_status(status)?;

        let ntime = self.config.time_step;
        let nunits = self.config.num_units;

        if param_stack.len() != ntime {
            candle_core::bail!(
                "parameter stack holds {} entries, time step is {}",
                param_stack.len(),
                ntime
            );
        }

        let emission = EmissionBlock::new(nunits, self.scoped())?;
        let mut transition: Option<TransitionBlock> = None;

        let mut steps: Vec<LatentStep> = Vec::with_capacity(ntime);

        for (time, (q_mean, q_cov)) in param_stack.iter().rev().enumerate() {
            let q_mean = q_mean.reshape((1, nunits))?;

            let (p_mean, p_cov) = match steps.last() {
                None => TransitionBlock::initial_prior(nunits, &self.device)?,
                Some(prev) => {
                    info!(
                        "[t={}] {} trainable variables under '{}'",
                        time,
                        self.num_trainable()?,
                        self.config.scope
                    );
                    if transition.is_none() {
                        transition = Some(TransitionBlock::new(
                            nunits,
                            self.config.num_layers,
                            self.scoped(),
                        )?);
                    }
                    match transition.as_ref() {
                        Some(block) => block.forward(&prev.z_sample)?,
                        None => candle_core::bail!("transition block missing"),
                    }
                }
            };

            let z_sample = self.sample_posterior(&q_mean, q_cov)?;

            let x_1u = status.get(time)?.reshape((1, nunits))?;
            let x_log_prob = emission.log_density(&z_sample, &x_1u)?;
            let x_prob = x_log_prob.exp()?;

            debug!(
                "t={} z: {:?}, prior mean: {:?}, prior cov: {:?}",
                time,
                z_sample.dims(),
                p_mean.dims(),
                p_cov.dims()
            );

            steps.push(LatentStep {
                time,
                q_mean,
                q_cov: q_cov.clone(),
                p_mean,
                p_cov,
                x_prob,
                x_log_prob,
                z_sample,
            });
        }

        Ok(steps)
    }

    /// z = mean + eps * cov with eps ~ N(0, I) (1 x U)
    ///
    /// The covariance multiplies the noise directly; no square root is
    /// taken.
    fn sample_posterior(&self, q_mean_1u: &Tensor, q_cov_uu: &Tensor) -> Result<Tensor> {
        let eps_1u = Tensor::randn(0f32, 1f32, (1, self.config.num_units), &self.device)?;
        q_mean_1u.add(&eps_1u.matmul(&q_cov_uu.contiguous()?)?)
    }

    fn check_status(&self, status: &Tensor) -> Result<()> {
        let dims = status.dims();
        if dims.first() != Some(&self.config.time_step) {
            candle_core::bail!(
                "observed sequence {:?} does not have time_step = {} rows",
                dims,
                self.config.time_step
            );
        }
        if dims.len() != 2 || dims[1] != self.config.num_units {
            candle_core::bail!(
                "each observation must have {} units, got {:?}",
                self.config.num_units,
                dims
            );
        }
        Ok(())
    }

    /// Fold the step records into the objective
    ///
    /// ```text
    /// sum_t [ -KL(q(z[t]) || p(z[t])) + ln p(x[t] | z[t]) ]
    /// ```
    ///
    /// Records are visited from the last appended to the first, and `steps`
    /// is left empty. The result is to be maximized.
    pub fn compute_loss(&self, steps: &mut Vec<LatentStep>) -> Result<Tensor> {
        let mut elbo = Tensor::zeros((), DType::F32, &self.device)?;

        for step in steps.drain(..).rev() {
            let kl_div =
                gaussian_full_kl_divergence(&step.q_mean, &step.p_mean, &step.q_cov, &step.p_cov)?;
            let log_prob = step.x_log_prob;
            elbo = elbo.sub(&kl_div)?.add(&log_prob)?;

            info!(
                "[t={}] running sum: {}, KL: {}, log-prob: {}",
                step.time,
                elbo.to_scalar::<f32>()?,
                kl_div.to_scalar::<f32>()?,
                log_prob.to_scalar::<f32>()?
            );
        }

        Ok(elbo)
    }

    /// All variables under `{scope}.`, sorted by name
    pub fn trainable_vars(&self) -> Result<Vec<Var>> {
        Ok(self
            .named_trainable_vars()?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Same as [`Self::trainable_vars`], keeping the registry names
    pub fn named_trainable_vars(&self) -> Result<Vec<(String, Var)>> {
        let prefix = format!("{}.", self.config.scope);
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|e| candle_core::Error::Msg(format!("variable registry: {}", e)))?;

        let mut ret: Vec<(String, Var)> = data
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        ret.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ret)
    }

    pub fn num_trainable(&self) -> Result<usize> {
        Ok(self.named_trainable_vars()?.len())
    }
}
