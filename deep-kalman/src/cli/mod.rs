pub mod dkf;

use clap::{Parser, Subcommand};

pub use dkf::{ElboArgs, FitArgs, ModelArgs};

#[derive(Parser)]
#[command(name = "deep-kalman")]
#[command(about = "Sequential VAE (Deep Kalman Filter) on simulated state sequences")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Monte Carlo estimate of the ELBO for a fresh model
    Elbo(ElboArgs),
    /// Fit generative and recognition weights by gradient ascent
    Fit(FitArgs),
}
