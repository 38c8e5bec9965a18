use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use shared::{ClassificationLabel, CLASS_LABELS};
use std::path::Path;
use std::sync::Mutex;

use crate::error::AnalysisError;

pub trait Classify: Send + Sync {
    fn classify(&self, tensor: &Array4<f32>) -> Result<ClassificationLabel, AnalysisError>;
}

/// Four-way scan classifier exported to ONNX.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, AnalysisError> {
        if !model_path.exists() {
            return Err(AnalysisError::model_load(model_path, "file not found"));
        }

        log::info!("Loading classifier from {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| AnalysisError::model_load(model_path, e))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| AnalysisError::model_load(model_path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AnalysisError::model_load(model_path, e))?
            .with_intra_threads(intra_threads)
            .map_err(|e| AnalysisError::model_load(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| AnalysisError::model_load(model_path, e))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| AnalysisError::model_load(model_path, "model declares no inputs"))?;
        log::debug!("Classifier input: {}", input_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    fn scores(&self, tensor: &Array4<f32>) -> Result<Vec<f32>, AnalysisError> {
        let input = Value::from_array(tensor.to_owned())
            .map_err(|e| AnalysisError::Inference(format!("failed to build input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AnalysisError::Internal("classifier session mutex poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![&self.input_name => input])
            .map_err(|e| AnalysisError::Inference(e.to_string()))?;
        let scores = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| AnalysisError::Inference(format!("unexpected classifier output: {e}")))?;

        Ok(scores.iter().copied().collect())
    }
}

impl Classify for OnnxClassifier {
    fn classify(&self, tensor: &Array4<f32>) -> Result<ClassificationLabel, AnalysisError> {
        let scores = self.scores(tensor)?;
        log::debug!("Classifier scores: {:?}", scores);
        label_from_scores(&scores)
    }
}

/// Argmax over the score vector; ties go to the lowest index and NaN never wins.
pub fn label_from_scores(scores: &[f32]) -> Result<ClassificationLabel, AnalysisError> {
    if scores.len() != CLASS_LABELS.len() {
        return Err(AnalysisError::Inference(format!(
            "expected {} class scores, got {}",
            CLASS_LABELS.len(),
            scores.len()
        )));
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }

    let (index, _) =
        best.ok_or_else(|| AnalysisError::Inference("classifier returned only NaN scores".into()))?;
    ClassificationLabel::from_index(index)
        .ok_or_else(|| AnalysisError::Inference(format!("no label for class index {index}")))
}
