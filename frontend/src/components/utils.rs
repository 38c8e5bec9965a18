use super::super::Model;
use gloo_file::File as GlooFile;
use gloo_storage::{LocalStorage, Storage};
use gloo_timers::callback::Timeout;
use js_sys::Date;
use serde::{Deserialize, Serialize};
use shared::{DetectionBox, ModelMetadata};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_sys::FileList;
use yew::prelude::*;

const THEME_KEY: &str = "kidneyscan-theme";
const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const NO_DETECTIONS_MESSAGE: &str = "No abnormalities detected by the model.";

pub fn generate_id() -> u64 {
    static ID_COUNTER: AtomicU64 = AtomicU64::new(0);
    let now = Date::now() as u64;
    let count = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    now * 1000 + (count % 1000)
}

// Debounce function to limit button events
pub fn debounce<F>(duration: i32, callback: F) -> Callback<MouseEvent>
where
    F: Fn() + Clone + 'static,
{
    let timeout = Rc::new(RefCell::new(None::<Timeout>));
    let timeout_clone = Rc::clone(&timeout);

    Callback::from(move |_| {
        let mut timeout_ref = timeout_clone.borrow_mut();

        if let Some(old_timeout) = timeout_ref.take() {
            old_timeout.cancel();
        }

        let inner_callback = callback.clone();
        let new_timeout = Timeout::new(duration as u32, move || {
            inner_callback();
        });

        *timeout_ref = Some(new_timeout);
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn load() -> Self {
        LocalStorage::get(THEME_KEY).unwrap_or(Theme::Light)
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn persist(self) {
        if let Err(e) = LocalStorage::set(THEME_KEY, self) {
            log::warn!("Failed to persist theme: {}", e);
        }
    }

    /// Mirrors the theme onto the `<body>` class list.
    pub fn apply(self) {
        let Some(body) = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.body())
        else {
            return;
        };

        let result = match self {
            Theme::Dark => body.class_list().add_1("dark-mode"),
            Theme::Light => body.class_list().remove_1("dark-mode"),
        };
        if let Err(e) = result {
            log::warn!("Failed to apply theme: {:?}", e);
        }
    }
}

pub fn is_supported_scan(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, extension)| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| extension.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Only the first file counts; the dashboard analyses one scan at a time.
pub fn first_scan(file_list: &FileList) -> Result<GlooFile, String> {
    let file = file_list
        .item(0)
        .ok_or_else(|| "No file selected.".to_string())?;

    if !is_supported_scan(&file.name()) {
        return Err(format!(
            "Unsupported file: {}. Please upload a JPG, JPEG or PNG scan.",
            file.name()
        ));
    }
    Ok(GlooFile::from(file))
}

pub fn detection_line(detection: &DetectionBox, metadata: Option<&ModelMetadata>) -> String {
    let class_name = metadata
        .and_then(|metadata| metadata.detector_class_name(detection.class_id))
        .unwrap_or(&detection.label);
    format!(
        "{} detected with {:.2} confidence",
        class_name, detection.confidence
    )
}

pub fn render_error_message(model: &Model) -> Html {
    if let Some(error_msg) = &model.state.error {
        html! {
            <div class="error-message">
                <i class="fa-solid fa-circle-exclamation"></i>
                <p>{ error_msg }</p>
            </div>
        }
    } else {
        html! {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_id: usize, label: &str, confidence: f32) -> DetectionBox {
        DetectionBox {
            x1: 1.0,
            y1: 2.0,
            x2: 30.0,
            y2: 40.0,
            confidence,
            class_id,
            label: label.into(),
        }
    }

    #[test]
    fn accepts_only_jpeg_and_png_names() {
        assert!(is_supported_scan("scan.png"));
        assert!(is_supported_scan("scan.JPG"));
        assert!(is_supported_scan("archive.scan.jpeg"));
        assert!(!is_supported_scan("scan.webp"));
        assert!(!is_supported_scan("scan.png.txt"));
        assert!(!is_supported_scan("png"));
    }

    #[test]
    fn detection_line_prefers_metadata_class_names() {
        let metadata = ModelMetadata {
            classifier_labels: shared::CLASS_LABELS.to_vec(),
            detector_class_names: vec!["stone".into(), "tumor".into()],
            detector_loaded: true,
        };

        assert_eq!(
            detection_line(&detection(1, "Tumor", 0.876), Some(&metadata)),
            "tumor detected with 0.88 confidence"
        );
        assert_eq!(
            detection_line(&detection(5, "class 5", 0.5), Some(&metadata)),
            "class 5 detected with 0.50 confidence"
        );
        assert_eq!(
            detection_line(&detection(0, "Stone", 0.4), None),
            "Stone detected with 0.40 confidence"
        );
    }

    #[test]
    fn theme_toggles_back_and_forth() {
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(Theme::Dark.toggled().toggled(), Theme::Dark);
    }
}
