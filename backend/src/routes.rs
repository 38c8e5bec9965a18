use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use base64::Engine;
use futures::TryStreamExt;
use log::{error, info};
use shared::{
    ClassificationResponse, DetectionResponse, ModelMetadata, CLASSIFICATION_HEADER, CLASS_LABELS,
    UPLOAD_FIELD,
};
use std::path::Path;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::error::AnalysisError;
use crate::inference::pipeline::{Analysis, ScanAnalyzer};

/// Byte cap for the uploaded scan field, shared through app data.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

impl Default for UploadLimit {
    fn default() -> Self {
        UploadLimit(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/analyze/").route(web::post().to(analyze)))
        .service(web::resource("/api/classify").route(web::post().to(classify)))
        .service(web::resource("/api/detect").route(web::post().to(detect)))
        .service(web::resource("/api/metadata").route(web::get().to(metadata)));
}

/// Serves the built dashboard; registered last so it never shadows the API.
pub fn configure_frontend(cfg: &mut web::ServiceConfig, frontend_dir: &Path) {
    cfg.service(Files::new("/", frontend_dir).index_file("index.html"));
}

async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, AnalysisError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if image_data.len() + chunk.len() > limit {
                return Err(AnalysisError::Upload(format!(
                    "upload exceeds {} bytes",
                    limit
                )));
            }
            image_data.extend_from_slice(&chunk);
        }
        return Ok(image_data);
    }
    Err(AnalysisError::MissingUpload(UPLOAD_FIELD))
}

fn log_failure(request_id: Uuid, route: &str, err: &AnalysisError) {
    error!("[{}] {} failed: {}", request_id, route, err);
}

/// One-shot triage: JSON label for Normal/Cyst, annotated JPEG for Tumor/Stone.
async fn analyze(
    analyzer: web::Data<ScanAnalyzer>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, AnalysisError> {
    let request_id = Uuid::new_v4();
    let image_data = read_upload(payload, limit.0)
        .await
        .inspect_err(|e| log_failure(request_id, "analyze", e))?;
    info!("[{}] analyze: received {} bytes", request_id, image_data.len());

    let service = analyzer.clone();
    let analysis = web::block(move || service.analyze(&image_data))
        .await?
        .inspect_err(|e| log_failure(request_id, "analyze", e))?;

    info!("[{}] classified as {}", request_id, analysis.label());

    match analysis {
        Analysis::Classified(label) => Ok(HttpResponse::Ok().json(ClassificationResponse {
            classification_result: label,
        })),
        Analysis::Localized {
            label,
            localization,
        } => {
            info!(
                "[{}] {} region(s) detected",
                request_id,
                localization.detections.len()
            );
            Ok(HttpResponse::Ok()
                .content_type("image/jpeg")
                .insert_header((CLASSIFICATION_HEADER, label.as_ref()))
                .body(localization.annotated_jpeg))
        }
    }
}

async fn classify(
    analyzer: web::Data<ScanAnalyzer>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, AnalysisError> {
    let request_id = Uuid::new_v4();
    let image_data = read_upload(payload, limit.0)
        .await
        .inspect_err(|e| log_failure(request_id, "classify", e))?;

    let service = analyzer.clone();
    let label = web::block(move || service.classify(&image_data))
        .await?
        .inspect_err(|e| log_failure(request_id, "classify", e))?;
    info!("[{}] classified as {}", request_id, label);

    Ok(HttpResponse::Ok().json(ClassificationResponse {
        classification_result: label,
    }))
}

async fn detect(
    analyzer: web::Data<ScanAnalyzer>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, AnalysisError> {
    let request_id = Uuid::new_v4();
    let image_data = read_upload(payload, limit.0)
        .await
        .inspect_err(|e| log_failure(request_id, "detect", e))?;

    let service = analyzer.clone();
    let localization = web::block(move || service.localize(&image_data))
        .await?
        .inspect_err(|e| log_failure(request_id, "detect", e))?;
    info!(
        "[{}] {} region(s) detected",
        request_id,
        localization.detections.len()
    );

    Ok(HttpResponse::Ok().json(DetectionResponse {
        annotated_image: base64::engine::general_purpose::STANDARD
            .encode(&localization.annotated_jpeg),
        detections: localization.detections,
    }))
}

async fn metadata(analyzer: web::Data<ScanAnalyzer>) -> HttpResponse {
    HttpResponse::Ok().json(ModelMetadata {
        classifier_labels: CLASS_LABELS.to_vec(),
        detector_class_names: analyzer.detector_class_names().to_vec(),
        detector_loaded: analyzer.detector_loaded(),
    })
}
