use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("Model inference error: {0}")]
    Inference(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Upload error: {0}")]
    Upload(String),
    #[error("Missing form field '{0}'")]
    MissingUpload(&'static str),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn model_load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        AnalysisError::ModelLoad {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<actix_web::error::BlockingError> for AnalysisError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AnalysisError::Internal(err.to_string())
    }
}

impl From<actix_multipart::MultipartError> for AnalysisError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AnalysisError::Upload(err.to_string())
    }
}

// Every failure, including a bad upload, is reported as a 500 with the error text.
impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn decode_error_becomes_500_with_detail() {
        let err = AnalysisError::Decode("empty upload".into());
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.detail, "Failed to decode image: empty upload");
    }

    #[test]
    fn model_load_names_the_artifact() {
        let err = AnalysisError::model_load("models/best.torchscript", "No such file");
        assert_eq!(
            err.to_string(),
            "Failed to load model from models/best.torchscript: No such file"
        );
    }
}
