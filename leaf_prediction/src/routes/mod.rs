mod health;
mod predict;

use crate::{inference_service::InferenceService, model_service::ModelService};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService>() -> Router<InferenceService<M>> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/predict", post(predict::predict::<M>))
}
