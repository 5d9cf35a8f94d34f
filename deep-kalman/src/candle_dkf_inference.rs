use crate::candle_dkf_model::DeepKalmanFilter;
use crate::candle_inference::TrainConfig;
use crate::candle_model_traits::RecognitionModuleT;

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;

/// Monte Carlo estimate of the objective without touching any weight
///
/// * `model` - generative model
/// * `recognition` - posterior parameter provider
/// * `status` - observed sequence (T x U)
/// * `repeats` - number of independent passes
///
/// Returns one objective value per pass.
pub fn evaluate_elbo<Rec>(
    model: &DeepKalmanFilter,
    recognition: &Rec,
    status: &Tensor,
    repeats: usize,
) -> anyhow::Result<Vec<f32>>
where
    Rec: RecognitionModuleT,
{
    let mut elbo_trace = Vec::with_capacity(repeats);
    for _ in 0..repeats {
        let mut steps = model.build_network_with(status, recognition)?;
        let elbo = model.compute_loss(&mut steps)?;
        elbo_trace.push(elbo.to_scalar::<f32>()?);
    }
    Ok(elbo_trace)
}

/// Gradient ascent on the objective over every variable in the model's
/// registry (generative and whatever the recognition model put there)
///
/// * `model` - generative model
/// * `recognition` - posterior parameter provider
/// * `status` - observed sequence (T x U)
/// * `train_config` - training configuration
///
/// Returns the objective trace, one value per epoch.
pub fn train_dkf<Rec>(
    model: &DeepKalmanFilter,
    recognition: &Rec,
    status: &Tensor,
    train_config: &TrainConfig,
) -> anyhow::Result<Vec<f32>>
where
    Rec: RecognitionModuleT,
{
    // variables are created lazily, so materialize them before the
    // optimizer takes its snapshot
    model.init_vars()?;

    let mut adam = AdamW::new_lr(
        model.varmap().all_vars(),
        train_config.learning_rate.into(),
    )?;

    let status = status.to_device(&train_config.device)?;

    let pb = ProgressBar::new(train_config.num_epochs as u64);

    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut elbo_trace = vec![];

    for _epoch in 0..train_config.num_epochs {
        let mut steps = model.build_network_with(&status, recognition)?;
        let elbo = model.compute_loss(&mut steps)?;
        adam.backward_step(&elbo.neg()?)?;

        elbo_trace.push(elbo.to_scalar::<f32>()?);
        pb.inc(1);

        if train_config.verbose {
            info!(
                "[{}] elbo: {}",
                _epoch + 1,
                elbo_trace.last().ok_or(anyhow::anyhow!("elbo"))?
            );
        }
    }

    pb.finish_and_clear();
    Ok(elbo_trace)
}
