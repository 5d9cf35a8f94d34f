use crate::tensor_util::{from_dmatrix, inverse_or_nan, to_dmatrix};

use candle_core::{Result, Tensor};

/// KL divergence between two full-covariance Gaussian distributions
///
/// ```text
/// KL(q || p) = 0.5 * [ ln(det(S2) / det(S1)) - d
///                      + tr(S2^{-1} S1)
///                      + (m2 - m1)' S2^{-1} (m2 - m1) ]
/// ```
///
/// * `mean1` - mean of q (1 x d or d)
/// * `mean2` - mean of p (1 x d or d)
/// * `cov1` - covariance of q (d x d)
/// * `cov2` - covariance of p (d x d)
///
/// Both covariance matrices must be symmetric positive definite. Nothing
/// checks this: a singular `cov2` gives NaN.
///
/// Determinants and inverses are taken in `f64` by nalgebra and enter the
/// graph as constants. Gradients still reach all four arguments. The trace
/// and quadratic terms are built from candle ops, so the means and `cov1`
/// are covered directly. Each log-determinant carries the first-order term
/// `tr(S^{-1} dS)`, and `cov2` additionally carries
/// `-tr(S2^{-1} (S1 + r r') S2^{-1} dS2)` for the inverse it enters
/// through. Both terms are zero in value.
pub fn gaussian_full_kl_divergence(
    mean1: &Tensor,
    mean2: &Tensor,
    cov1: &Tensor,
    cov2: &Tensor,
) -> Result<Tensor> {
    let (d, d2) = cov1.dims2()?;
    if d != d2 || cov2.dims2()? != (d, d) {
        candle_core::bail!(
            "covariance shapes must be square and equal: {:?} vs {:?}",
            cov1.dims(),
            cov2.dims()
        );
    }
    if mean1.elem_count() != d || mean2.elem_count() != d {
        candle_core::bail!(
            "mean dimensions {:?}, {:?} do not match covariance {} x {}",
            mean1.dims(),
            mean2.dims(),
            d,
            d
        );
    }

    let (dtype, device) = (cov2.dtype(), cov2.device());

    let cov1_nal = to_dmatrix(cov1)?;
    let cov2_nal = to_dmatrix(cov2)?;

    let ln_det_ratio = (cov2_nal.determinant() / cov1_nal.determinant()).ln();

    let inv1 = from_dmatrix(&inverse_or_nan(&cov1_nal), dtype, device)?;
    let inv2 = from_dmatrix(&inverse_or_nan(&cov2_nal), dtype, device)?;

    let ln_det_grad = log_det_tangent(cov2, &inv2)?.sub(&log_det_tangent(cov1, &inv1)?)?;

    // tr(S2^{-1} S1) = sum_ij S2^{-1}(i,j) * S1(j,i)
    let trace = inv2.mul(&cov1.t()?)?.sum_all()?;

    let diff_1d = mean2.reshape((1, d))?.sub(&mean1.reshape((1, d))?)?;
    let quad = diff_1d.matmul(&inv2)?.mul(&diff_1d)?.sum_all()?;

    let inv_grad = inverse_tangent(cov2, &inv2, cov1, &diff_1d)?;

    let div = ((trace.add(&quad)?.add(&ln_det_grad)?.add(&inv_grad)? + ln_det_ratio)?
        - d as f64)?;
    div * 0.5
}

/// `-sum(B' * (S2 - S2))` with `B = inv (S1 + r' r) inv` held constant and
/// only the first `S2` tracked: zero, with gradient `-B'`, i.e., the
/// derivative of `tr(S2^{-1} S1) + r S2^{-1} r'` through `S2^{-1}`
fn inverse_tangent(
    cov2: &Tensor,
    inv2: &Tensor,
    cov1: &Tensor,
    diff_1d: &Tensor,
) -> Result<Tensor> {
    let diff_1d = diff_1d.detach();
    let outer = diff_1d.t()?.matmul(&diff_1d)?;
    let inner = cov1.detach().add(&outer)?;
    let b = inv2.matmul(&inner)?.matmul(inv2)?;
    let delta = cov2.sub(&cov2.detach())?;
    b.t()?.mul(&delta)?.sum_all()?.neg()
}

/// `tr(inv' S) - d`, zero at the current `S` but with gradient `inv'`,
/// i.e., the derivative of `ln det(S)` when `inv = S^{-1}`
fn log_det_tangent(cov: &Tensor, inv: &Tensor) -> Result<Tensor> {
    let d = cov.dim(0)? as f64;
    inv.t()?.mul(cov)?.sum_all()? - d
}

/// Log-density of a Gaussian with diagonal covariance
///
/// ```text
/// ln N(x; mu, diag(exp(lnvar)))
///   = -0.5 * sum_j [ (x_j - mu_j)^2 / exp(lnvar_j) + lnvar_j + ln(2 pi) ]
/// ```
///
/// * `x` - observation (1 x d)
/// * `mean` - mean (1 x d)
/// * `lnvar` - log of the covariance diagonal (1 x d)
///
/// Returns a scalar tensor.
pub fn gaussian_diag_log_density(x: &Tensor, mean: &Tensor, lnvar: &Tensor) -> Result<Tensor> {
    let d = lnvar.elem_count() as f64;
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();

    let sq = x.sub(mean)?.sqr()?.div(&lnvar.exp()?)?;
    let quad = sq.add(lnvar)?.sum_all()?;

    (quad + d * ln_2pi)? * (-0.5)
}
