use crate::{
    inference_service::{InferenceError, InferenceService},
    model_service::ModelService,
    prediction::Prediction,
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Missing multipart field `file`")]
    MissingFile,
    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::MissingFile => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            PredictError::Multipart(err) => (err.status(), err.body_text()).into_response(),
            PredictError::Inference(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Something went wrong: {}", self),
                )
                    .into_response()
            }
        }
    }
}

#[instrument(skip(service, multipart))]
pub async fn predict<M: ModelService>(
    State(service): State<InferenceService<M>>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        tracing::info!("Received file: {}", field.file_name().unwrap_or("<unnamed>"));
        let image_data = field.bytes().await?;
        let prediction = service.predict(image_data.to_vec()).await?;

        return Ok(Json(prediction));
    }

    Err(PredictError::MissingFile)
}
