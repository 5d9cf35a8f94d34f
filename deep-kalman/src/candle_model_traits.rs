use candle_core::{Result, Tensor};

/// One `(mean, covariance)` pair of the approximate posterior q(z[t] | x)
///
/// * mean - 1 x U
/// * covariance - U x U
pub type GaussianParam = (Tensor, Tensor);

pub trait RecognitionModuleT {
    /// Posterior parameters for every time step of `status` (T x D)
    ///
    /// The returned stack is ordered top-down: its *last* element belongs
    /// to time step 0, i.e., `stack[T - 1 - t]` describes q(z[t] | x).
    /// Consumers take elements from the tail.
    fn param_stack(&self, status: &Tensor) -> Result<Vec<GaussianParam>>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
