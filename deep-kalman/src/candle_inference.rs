pub struct TrainConfig {
    pub learning_rate: f32,
    pub num_epochs: usize,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}
