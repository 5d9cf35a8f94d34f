use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct SimArgs {
    pub time_step: usize,
    pub num_units: usize,
    /// standard deviation of the latent random walk increments
    pub drift: f32,
    /// standard deviation of the observation noise
    pub noise: f32,
    pub rseed: u64,
}

/// Simulate an observed sequence from a linear-Gaussian state space model
///
/// ```text
/// z[0] ~ N(0, I)
/// z[t] = z[t-1] + N(0, drift^2 I)
/// x[t] = z[t] + N(0, noise^2 I)
/// ```
///
/// Returns `(x, z)`, both `time_step x num_units`.
pub fn generate_random_walk(args: &SimArgs, device: &Device) -> anyhow::Result<(Tensor, Tensor)> {
    let (tt, uu) = (args.time_step, args.num_units);
    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    let std_normal = Normal::new(0_f32, 1_f32)?;
    let drift = Normal::new(0_f32, args.drift)?;
    let noise = Normal::new(0_f32, args.noise)?;

    let mut z_tu = Vec::with_capacity(tt * uu);
    let mut x_tu = Vec::with_capacity(tt * uu);

    let mut z_prev: Vec<f32> = (0..uu).map(|_| std_normal.sample(&mut rng)).collect();

    for t in 0..tt {
        if t > 0 {
            z_prev.iter_mut().for_each(|z| *z += drift.sample(&mut rng));
        }
        for &z in z_prev.iter() {
            z_tu.push(z);
            x_tu.push(z + noise.sample(&mut rng));
        }
    }

    let x = Tensor::from_vec(x_tu, (tt, uu), device)?;
    let z = Tensor::from_vec(z_tu, (tt, uu), device)?;
    Ok((x, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_walk_is_seeded() -> anyhow::Result<()> {
        let args = SimArgs {
            time_step: 7,
            num_units: 3,
            drift: 0.1,
            noise: 0.5,
            rseed: 42,
        };
        let (x1, z1) = generate_random_walk(&args, &Device::Cpu)?;
        let (x2, _) = generate_random_walk(&args, &Device::Cpu)?;
        assert_eq!(x1.dims(), &[7, 3]);
        assert_eq!(z1.dims(), &[7, 3]);
        assert_eq!(x1.to_vec2::<f32>()?, x2.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_noiseless_walk_observes_latent() -> anyhow::Result<()> {
        let args = SimArgs {
            time_step: 4,
            num_units: 2,
            drift: 1.0,
            noise: 0.0,
            rseed: 1,
        };
        let (x, z) = generate_random_walk(&args, &Device::Cpu)?;
        assert_eq!(x.to_vec2::<f32>()?, z.to_vec2::<f32>()?);
        Ok(())
    }
}
