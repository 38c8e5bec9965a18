use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

mod guidance;

pub use guidance::{guidance_for, MedicalGuidance, Severity};

/// Multipart field carrying the uploaded scan on every upload route.
pub const UPLOAD_FIELD: &str = "file";

/// Response header carrying the label next to an annotated image.
pub const CLASSIFICATION_HEADER: &str = "classification";

/// Scan category produced by the classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ClassificationLabel {
    Cyst,
    Normal,
    Stone,
    Tumor,
}

/// Classifier output index -> label. The order is fixed by the trained model.
pub const CLASS_LABELS: [ClassificationLabel; 4] = [
    ClassificationLabel::Cyst,
    ClassificationLabel::Normal,
    ClassificationLabel::Stone,
    ClassificationLabel::Tumor,
];

impl ClassificationLabel {
    pub fn from_index(index: usize) -> Option<Self> {
        CLASS_LABELS.get(index).copied()
    }

    /// Only stones and tumors get a localization pass.
    pub fn requires_detection(self) -> bool {
        matches!(self, ClassificationLabel::Stone | ClassificationLabel::Tumor)
    }
}

/// One region found by the detector, in pixel coordinates of the uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl DetectionBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Text drawn above the box, e.g. `Stone 0.87`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub classification_result: ClassificationLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<DetectionBox>,
    /// Base64 encoded JPEG with the detections drawn on it.
    pub annotated_image: String,
}

impl DetectionResponse {
    pub fn image_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.annotated_image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub classifier_labels: Vec<ClassificationLabel>,
    pub detector_class_names: Vec<String>,
    pub detector_loaded: bool,
}

impl ModelMetadata {
    pub fn detector_class_name(&self, class_id: usize) -> Option<&str> {
        self.detector_class_names.get(class_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
