use candle_core::{DType, Device, Result, Tensor};
use nalgebra::DMatrix;

/// Copy a 2D tensor into an `f64` nalgebra matrix (always on CPU)
pub fn to_dmatrix(x: &Tensor) -> Result<DMatrix<f64>> {
    let (nrow, ncol) = x.dims2()?;
    let x_data: Vec<f64> = x
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F64)?
        .flatten_all()?
        .to_vec1()?;
    Ok(DMatrix::from_row_slice(nrow, ncol, &x_data))
}

/// Copy a nalgebra matrix back into a detached tensor
///
/// The result carries no gradient history; it enters the graph as a
/// constant.
pub fn from_dmatrix(x: &DMatrix<f64>, dtype: DType, device: &Device) -> Result<Tensor> {
    let (nrow, ncol) = x.shape();
    // nalgebra stores column-major
    let row_major: Vec<f64> = x.transpose().iter().cloned().collect();
    Tensor::from_vec(row_major, (nrow, ncol), &Device::Cpu)?
        .to_dtype(dtype)?
        .to_device(device)
}

/// Embed a vector of `d` elements as a `d x d` diagonal matrix
///
/// * `v` - any tensor with `d` elements, e.g. `(1, d)` or `(d,)`
pub fn diag_matrix(v: &Tensor) -> Result<Tensor> {
    let d = v.elem_count();
    Tensor::eye(d, v.dtype(), v.device())?.broadcast_mul(&v.reshape((1, d))?)
}

/// Inverse or, for a singular matrix, a matrix of NaN so that the
/// failure shows up downstream instead of here
pub fn inverse_or_nan(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (nrow, ncol) = x.shape();
    x.clone()
        .try_inverse()
        .unwrap_or_else(|| DMatrix::from_element(nrow, ncol, f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmatrix_roundtrip_keeps_row_order() -> Result<()> {
        let x = Tensor::new(&[[1f32, 2., 3.], [4., 5., 6.]], &Device::Cpu)?;
        let x_nal = to_dmatrix(&x)?;
        assert_eq!(x_nal[(0, 2)], 3.0);
        assert_eq!(x_nal[(1, 0)], 4.0);

        let y = from_dmatrix(&x_nal, DType::F32, &Device::Cpu)?;
        assert_eq!(x.to_vec2::<f32>()?, y.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_diag_matrix() -> Result<()> {
        let v = Tensor::new(&[[1f32, 2., 3.]], &Device::Cpu)?;
        let d = diag_matrix(&v)?;
        assert_eq!(
            d.to_vec2::<f32>()?,
            vec![vec![1., 0., 0.], vec![0., 2., 0.], vec![0., 0., 3.]]
        );
        Ok(())
    }

    #[test]
    fn test_singular_inverse_is_nan() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(inverse_or_nan(&x).iter().all(|v| v.is_nan()));
    }
}
