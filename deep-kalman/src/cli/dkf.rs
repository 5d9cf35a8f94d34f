use anyhow::Result;
use candle_core::Device;
use clap::Args;
use log::info;

use crate::candle_dkf_inference::{evaluate_elbo, train_dkf};
use crate::candle_dkf_model::{DeepKalmanFilter, ModelConfig};
use crate::candle_inference::TrainConfig;
use crate::candle_recognition::GaussianRecognitionEncoder;
use crate::simulate::{generate_random_walk, SimArgs};

#[derive(Args, Debug)]
pub struct ModelArgs {
    #[arg(long, default_value = "2", help = "Latent and observation dimension")]
    pub num_units: usize,

    #[arg(long, default_value = "1", help = "Dense layers in the transition mean")]
    pub num_layers: usize,

    #[arg(long, default_value = "10", help = "Sequence length")]
    pub time_step: usize,

    #[arg(long, default_value = "1")]
    pub size: usize,

    #[arg(long, default_value = "generative", help = "Namespace of generative variables")]
    pub scope: String,

    #[arg(
        long,
        value_delimiter(','),
        default_values_t = vec![16],
        help = "Hidden layer sizes of the recognition encoder"
    )]
    pub encoder_layers: Vec<usize>,

    #[arg(long, default_value = "0.1", help = "Random walk step size of the simulator")]
    pub drift: f32,

    #[arg(long, default_value = "0.5", help = "Observation noise of the simulator")]
    pub noise: f32,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    #[arg(long)]
    pub gpu: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct ElboArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, default_value = "10", help = "Independent Monte Carlo passes")]
    pub repeats: usize,
}

#[derive(Args, Debug)]
pub struct FitArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    #[arg(long, default_value = "500")]
    pub iters: usize,

    #[arg(long, default_value = "0.01")]
    pub lr: f32,
}

fn select_device(gpu: bool) -> Device {
    if gpu {
        #[cfg(target_os = "macos")]
        { Device::new_metal(0).unwrap_or(Device::Cpu) }
        #[cfg(not(target_os = "macos"))]
        { Device::new_cuda(0).unwrap_or(Device::Cpu) }
    } else {
        Device::Cpu
    }
}

struct Setup {
    model: DeepKalmanFilter,
    recognition: GaussianRecognitionEncoder,
    status: candle_core::Tensor,
    device: Device,
}

fn setup(args: &ModelArgs) -> Result<Setup> {
    if args.num_units == 0 || args.time_step == 0 {
        anyhow::bail!("num-units and time-step must be positive");
    }

    let device = select_device(args.gpu);
    info!("Using device: {:?}", device);

    let sim = SimArgs {
        time_step: args.time_step,
        num_units: args.num_units,
        drift: args.drift,
        noise: args.noise,
        rseed: args.seed,
    };
    let (status, _) = generate_random_walk(&sim, &device)?;
    info!("Simulated sequence: {:?}", status.dims());

    let config = ModelConfig::new(
        args.num_units,
        args.num_units,
        args.num_layers,
        args.time_step,
        args.size,
        &args.scope,
    );
    let model = DeepKalmanFilter::new(config, &device);

    let recognition = GaussianRecognitionEncoder::new(
        args.num_units,
        args.num_units,
        &args.encoder_layers,
        model.var_builder().pp("recognition"),
    )?;

    Ok(Setup {
        model,
        recognition,
        status,
        device,
    })
}

pub fn run_elbo(args: &ElboArgs) -> Result<()> {
    let Setup {
        model,
        recognition,
        status,
        ..
    } = setup(&args.model)?;

    let elbo_trace = evaluate_elbo(&model, &recognition, &status, args.repeats)?;

    let n = elbo_trace.len().max(1) as f32;
    let mean = elbo_trace.iter().sum::<f32>() / n;
    info!(
        "{} generative variables under '{}'",
        model.num_trainable()?,
        model.config().scope
    );
    for (r, elbo) in elbo_trace.iter().enumerate() {
        println!("{}\t{}", r, elbo);
    }
    info!("mean ELBO over {} passes: {}", elbo_trace.len(), mean);
    Ok(())
}

pub fn run_fit(args: &FitArgs) -> Result<()> {
    let Setup {
        model,
        recognition,
        status,
        device,
    } = setup(&args.model)?;

    let train_config = TrainConfig {
        learning_rate: args.lr,
        num_epochs: args.iters,
        device,
        verbose: args.model.verbose,
        show_progress: true,
    };

    info!("Training for {} iterations", args.iters);
    let elbo_trace = train_dkf(&model, &recognition, &status, &train_config)?;

    for (i, elbo) in elbo_trace.iter().enumerate() {
        println!("{}\t{}", i, elbo);
    }

    for (name, var) in model.named_trainable_vars()? {
        info!("{}: {:?}", name, var.as_tensor().dims());
    }
    Ok(())
}
