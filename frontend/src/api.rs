use gloo_file::{Blob, File as GlooFile};
use gloo_net::http::{Request, Response};
use serde::de::DeserializeOwned;
use shared::{ClassificationResponse, DetectionResponse, ErrorResponse, ModelMetadata, UPLOAD_FIELD};
use web_sys::FormData;

fn upload_form(file: &GlooFile) -> Result<FormData, String> {
    let form_data = FormData::new().map_err(|e| format!("Failed to build form: {:?}", e))?;
    let blob: &Blob = file;
    form_data
        .append_with_blob_and_filename(UPLOAD_FIELD, blob.as_ref(), &file.name())
        .map_err(|e| format!("Failed to attach scan: {:?}", e))?;
    Ok(form_data)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    if response.ok() {
        return response
            .json::<T>()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e));
    }

    let status = response.status();
    // The backend reports every failure as {"detail": ...}.
    let detail = match response.json::<ErrorResponse>().await {
        Ok(error) => error.detail,
        Err(_) => "unexpected error".to_string(),
    };
    Err(format!("Server error: {} - {}", status, detail))
}

async fn post_scan<T: DeserializeOwned>(url: &str, file: &GlooFile) -> Result<T, String> {
    let request = Request::post(url)
        .body(upload_form(file)?)
        .map_err(|e| format!("Failed to build request: {}", e))?;
    let response = request
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;
    read_json(response).await
}

pub async fn classify_scan(file: &GlooFile) -> Result<ClassificationResponse, String> {
    post_scan("/api/classify", file).await
}

pub async fn detect_scan(file: &GlooFile) -> Result<DetectionResponse, String> {
    post_scan("/api/detect", file).await
}

pub async fn fetch_metadata() -> Result<ModelMetadata, String> {
    let response = Request::get("/api/metadata")
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;
    read_json(response).await
}
