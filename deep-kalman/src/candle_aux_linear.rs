use candle_core::Result;
use candle_nn::{Init, Linear, VarBuilder};

/// N(0, 1) weight init; biases start at zero
pub const DENSE_WEIGHT_INIT: Init = Init::Randn {
    mean: 0.,
    stdev: 1.,
};

/// Dense layer `y = x W' + b` registered under `vb`
///
/// * `{vb}.weight` - out_dim x in_dim
/// * `{vb}.bias` - out_dim
///
/// Calling this twice with the same `vb` hands back the same variables.
pub fn dense(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let ws = vb.get_with_hints((out_dim, in_dim), "weight", DENSE_WEIGHT_INIT)?;
    let bs = vb.get_with_hints(out_dim, "bias", candle_nn::init::ZERO)?;
    Ok(Linear::new(ws, Some(bs)))
}

/// Dense layer without bias, `y = x W'`
pub fn dense_no_bias(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let ws = vb.get_with_hints((out_dim, in_dim), "weight", DENSE_WEIGHT_INIT)?;
    Ok(Linear::new(ws, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::{Module, VarMap};

    #[test]
    fn test_dense_reuses_registered_weights() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

        let first = dense(3, 2, vb.pp("layer"))?;
        let second = dense(3, 2, vb.pp("layer"))?;
        assert_eq!(varmap.all_vars().len(), 2);

        let x = Tensor::randn(0f32, 1f32, (1, 3), &Device::Cpu)?;
        let y1 = first.forward(&x)?.to_vec2::<f32>()?;
        let y2 = second.forward(&x)?.to_vec2::<f32>()?;
        assert_eq!(y1, y2);
        Ok(())
    }

    #[test]
    fn test_dense_no_bias_maps_zero_to_zero() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

        let layer = dense_no_bias(4, 4, vb.pp("dense0"))?;
        assert!(layer.bias().is_none());
        assert_eq!(varmap.all_vars().len(), 1);

        let y = layer.forward(&Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?)?;
        assert_eq!(y.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_dense_shape_clash_is_an_error() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        dense(3, 2, vb.pp("layer"))?;
        assert!(dense(4, 2, vb.pp("layer")).is_err());
        Ok(())
    }
}
