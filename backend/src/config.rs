use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    pub annotation: AnnotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_dir: PathBuf,
    /// Largest accepted upload field, in bytes.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub font_path: PathBuf,
    pub font_scale: f32,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            frontend_dir: PathBuf::from("frontend/dist"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/model_vgg_lv.onnx"),
            intra_threads: 4,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/best.torchscript"),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            class_names: vec!["Stone".to_string(), "Tumor".to_string()],
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: PathBuf::from("assets/DejaVuSans.ttf"),
            font_scale: 16.0,
            jpeg_quality: 95,
        }
    }
}

impl AppConfig {
    /// Reads `KIDNEYSCAN_CONFIG` (or `config/kidneyscan.yaml`), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("KIDNEYSCAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        let mut config = if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_file(&path)?
        } else {
            log::warn!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a port number: {port}")))?;
        }
        if let Ok(dir) = env::var("FRONTEND_DIR") {
            self.server.frontend_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("CLASSIFIER_MODEL_PATH") {
            self.classifier.model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("DETECTOR_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("ANNOTATION_FONT_PATH") {
            self.annotation.font_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_upload_bytes must be positive".into()));
        }
        let detector = &self.detector;
        if !(0.0..=1.0).contains(&detector.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.confidence_threshold must be within [0, 1], got {}",
                detector.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&detector.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.iou_threshold must be within [0, 1], got {}",
                detector.iou_threshold
            )));
        }
        if detector.input_size == 0 {
            return Err(ConfigError::Invalid("detector.input_size must be positive".into()));
        }
        if detector.max_detections == 0 {
            return Err(ConfigError::Invalid("detector.max_detections must be positive".into()));
        }
        if !(1..=100).contains(&self.annotation.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "annotation.jpeg_quality must be within 1..=100, got {}",
                self.annotation.jpeg_quality
            )));
        }
        if self.annotation.font_scale <= 0.0 {
            return Err(ConfigError::Invalid("annotation.font_scale must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn default_config_path() -> PathBuf {
    match env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => PathBuf::from(manifest_dir).join("../config/kidneyscan.yaml"),
        Err(_) => PathBuf::from("config/kidneyscan.yaml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str(
            r#"
server:
  port: 9000
detector:
  confidence_threshold: 0.4
  class_names: ["stone", "tumor", "cyst"]
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.detector.confidence_threshold, 0.4);
        assert_eq!(config.detector.iou_threshold, 0.7);
        assert_eq!(config.detector.class_names.len(), 3);
        assert_eq!(config.classifier.model_path, PathBuf::from("models/model_vgg_lv.onnx"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_default() {
        let config = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.annotation.jpeg_quality, 95);
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
        assert_eq!(config.server.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn zero_upload_limit_is_rejected() {
        let config = AppConfig::from_yaml_str("server:\n  max_upload_bytes: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let config = AppConfig::from_yaml_str("detector:\n  iou_threshold: 1.5\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_jpeg_quality_is_rejected() {
        let config = AppConfig::from_yaml_str("annotation:\n  jpeg_quality: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let result = AppConfig::from_yaml_str("server: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }
}
