use axum::{response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    message: String,
}

pub async fn ping() -> impl IntoResponse {
    Json(Status {
        message: "hello!".into(),
    })
}
