use crate::{
    model_service::{ModelError, ModelService},
    prediction::{top_prediction, Prediction, PredictionError},
    preprocess::{image_to_tensor, InputShape, PreprocessError},
};
use ndarray::Axis;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("{0}")]
    Decode(#[from] PreprocessError),
    #[error("{0}")]
    Model(#[from] ModelError),
    #[error("{0}")]
    Prediction(#[from] PredictionError),
    #[error("Inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Turns uploaded image bytes into a labelled prediction.
#[derive(Debug)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
    class_labels: Arc<Vec<String>>,
    input_shape: InputShape,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            class_labels: self.class_labels.clone(),
            input_shape: self.input_shape,
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M, class_labels: Vec<String>, input_shape: InputShape) -> Self {
        Self {
            model_service: Arc::new(model_service),
            class_labels: Arc::new(class_labels),
            input_shape,
        }
    }

    /// Runs decoding and the forward pass on the blocking pool.
    pub async fn predict(&self, image_data: Vec<u8>) -> Result<Prediction, InferenceError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.predict_blocking(&image_data)).await?
    }

    pub fn predict_blocking(&self, image_data: &[u8]) -> Result<Prediction, InferenceError> {
        let input = image_to_tensor(image_data, self.input_shape)?;
        let scores = self.model_service.predict(input)?;

        if scores.len_of(Axis(0)) == 0 {
            return Err(PredictionError::EmptyOutput.into());
        }
        let prediction = top_prediction(scores.index_axis(Axis(0), 0), &self.class_labels)?;

        tracing::debug!(
            "Predicted class={}, confidence={:.3}",
            prediction.class_label,
            prediction.confidence
        );

        Ok(prediction)
    }
}
