mod config;
mod error;
mod inference;
mod routes;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use inference::annotate::Annotator;
use inference::classifier::OnnxClassifier;
use inference::detector::{LazyDetector, TorchDetectorLoader};
use inference::pipeline::ScanAnalyzer;
use routes::{configure_frontend, configure_routes, UploadLimit};
use shared::CLASSIFICATION_HEADER;
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Configuration failed: {}", e))
    })?;

    // The classifier is needed by every request, so a missing model aborts startup.
    let classifier = OnnxClassifier::load(
        &config.classifier.model_path,
        config.classifier.intra_threads,
    )
    .map_err(|e| {
        log::error!("Failed to preload classifier at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {}", e))
    })?;

    let detector = LazyDetector::new(Box::new(TorchDetectorLoader::new(config.detector.clone())));
    let annotator =
        Annotator::from_font_file(&config.annotation.font_path, config.annotation.font_scale);
    if annotator.has_font() {
        log::info!("Caption font loaded from {}", config.annotation.font_path.display());
    }

    let analyzer = web::Data::new(ScanAnalyzer::new(
        Arc::new(classifier),
        detector,
        annotator,
        config.detector.class_names.clone(),
        config.annotation.jpeg_quality,
    ));

    let upload_limit = web::Data::new(UploadLimit(config.server.max_upload_bytes));

    let frontend_dir = config.server.frontend_dir.clone();
    let serve_frontend = frontend_dir.is_dir();
    if serve_frontend {
        log::info!("Serving dashboard from {}", frontend_dir.display());
    } else {
        log::warn!(
            "Dashboard directory {} not found, serving API only",
            frontend_dir.display()
        );
    }

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .expose_headers(vec![CLASSIFICATION_HEADER])
                    .max_age(3600),
            )
            .app_data(analyzer.clone())
            .app_data(upload_limit.clone())
            .configure(configure_routes);

        if serve_frontend {
            app.configure(|cfg| configure_frontend(cfg, &frontend_dir))
        } else {
            app
        }
    })
    .bind(&bind_address)?
    .run()
    .await
}
