use anyhow::Result;
use clap::Parser;
use deep_kalman::cli::{dkf, Cli, Commands};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Elbo(args) => {
            dkf::run_elbo(args)?;
        }
        Commands::Fit(args) => {
            dkf::run_fit(args)?;
        }
    }

    Ok(())
}
