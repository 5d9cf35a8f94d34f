pub mod candle_aux_layers;
pub mod candle_aux_linear;
pub mod candle_dkf_inference;
pub mod candle_dkf_model;
pub mod candle_emission;
pub mod candle_inference;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_recognition;
pub mod candle_transition;
pub mod cli;
pub mod simulate;
pub mod tensor_util;

pub use candle_core;
pub use candle_nn;
