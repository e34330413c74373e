use ndarray::{Array2, Array4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}

/// A loaded classification model.
///
/// `predict` takes a `(batch, height, width, channel)` tensor and returns the
/// `(batch, classes)` probability matrix. Implementations are shared across
/// requests and must not rely on per-call mutable state.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, batch: Array4<f32>) -> Result<Array2<f32>, ModelError>;
}
