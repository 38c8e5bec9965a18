use super::super::{Model, Msg, ScanData};
use super::utils::{first_scan, generate_id};
use crate::api;
use gloo_file::{File as GlooFile, ObjectUrl};
use shared::{DetectionResponse, ModelMetadata};
use wasm_bindgen_futures::spawn_local;
use web_sys::DragEvent;
use yew::prelude::*;

pub fn handle_scan_selected(model: &mut Model, ctx: &Context<Model>, file: GlooFile) -> bool {
    let id = generate_id();
    log::info!("Scan selected: {}", file.name());

    model.state.begin(id);
    model.scan = Some(ScanData {
        preview_url: ObjectUrl::from(file.clone()),
        file: file.clone(),
    });

    send_classification_request(ctx, id, file);
    true
}

pub fn handle_clear_scan(model: &mut Model) -> bool {
    // Dropping the ObjectUrl revokes the preview.
    model.scan = None;
    model.state.clear();
    true
}

fn current_scan(model: &Model) -> Option<(u64, GlooFile)> {
    let scan_id = model.state.scan_id?;
    let scan = model.scan.as_ref()?;
    Some((scan_id, scan.file.clone()))
}

pub fn handle_request_detection(model: &mut Model, ctx: &Context<Model>) -> bool {
    let Some((scan_id, file)) = current_scan(model) else {
        return false;
    };
    if !model.state.start_detection() {
        return false;
    }

    // Metadata is fetched once per page and reused for every later detection.
    if model.metadata.is_some() {
        send_detection_request(ctx, scan_id, file);
    } else {
        send_metadata_request(ctx, scan_id);
    }
    true
}

pub fn handle_metadata_loaded(
    model: &mut Model,
    ctx: &Context<Model>,
    metadata: ModelMetadata,
) -> bool {
    log::info!(
        "Detector classes: {:?} (loaded: {})",
        metadata.detector_class_names,
        metadata.detector_loaded
    );
    model.metadata = Some(metadata);

    if model.state.detecting {
        if let Some((scan_id, file)) = current_scan(model) {
            send_detection_request(ctx, scan_id, file);
        }
    }
    true
}

pub fn handle_detection_loaded(
    model: &mut Model,
    scan_id: u64,
    response: DetectionResponse,
) -> bool {
    let count = response.detections.len();
    let applied = model.state.detected(scan_id, response);
    if applied {
        log::info!("{} region(s) detected", count);
    }
    applied
}

pub fn handle_toggle_theme(model: &mut Model) -> bool {
    model.theme = model.theme.toggled();
    model.theme.apply();
    model.theme.persist();
    true
}

pub fn handle_drop(model: &mut Model, ctx: &Context<Model>, event: DragEvent) -> bool {
    event.prevent_default();
    model.is_dragging = false;

    if let Some(file_list) = event.data_transfer().and_then(|transfer| transfer.files()) {
        match first_scan(&file_list) {
            Ok(file) => ctx.link().send_message(Msg::ScanSelected(file)),
            Err(e) => {
                log::warn!("{}", e);
                ctx.link().send_message(Msg::SetError(Some(e)));
            }
        }
    }

    true
}

pub fn send_classification_request(ctx: &Context<Model>, scan_id: u64, file: GlooFile) {
    spawn_local({
        let link = ctx.link().clone();

        async move {
            match api::classify_scan(&file).await {
                Ok(response) => link.send_message(Msg::ClassificationLoaded(
                    scan_id,
                    response.classification_result,
                )),
                Err(e) => {
                    log::error!("Classification failed: {}", e);
                    link.send_message(Msg::RequestFailed(scan_id, e))
                }
            }
        }
    });
}

pub fn send_metadata_request(ctx: &Context<Model>, scan_id: u64) {
    spawn_local({
        let link = ctx.link().clone();

        async move {
            match api::fetch_metadata().await {
                Ok(metadata) => link.send_message(Msg::MetadataLoaded(metadata)),
                Err(e) => {
                    log::error!("Loading model metadata failed: {}", e);
                    link.send_message(Msg::RequestFailed(scan_id, e))
                }
            }
        }
    });
}

pub fn send_detection_request(ctx: &Context<Model>, scan_id: u64, file: GlooFile) {
    spawn_local({
        let link = ctx.link().clone();

        async move {
            match api::detect_scan(&file).await {
                Ok(response) => link.send_message(Msg::DetectionLoaded(scan_id, response)),
                Err(e) => {
                    log::error!("Detection failed: {}", e);
                    link.send_message(Msg::RequestFailed(scan_id, e))
                }
            }
        }
    });
}
