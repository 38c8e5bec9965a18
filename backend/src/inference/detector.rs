use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView2};
use shared::DetectionBox;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tch::{CModule, Device, IValue, Kind, Tensor};

use crate::config::DetectorConfig;
use crate::error::AnalysisError;

const LETTERBOX_FILL: u8 = 114;

pub trait Detect: Send + Sync {
    fn detect(&self, raster: &RgbImage) -> Result<Vec<DetectionBox>, AnalysisError>;
}

pub trait DetectorLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Detect>, AnalysisError>;
}

/// Holds the detector loader and loads the model on first use, exactly once.
pub struct LazyDetector {
    loader: Box<dyn DetectorLoader>,
    slot: Mutex<Option<Arc<dyn Detect>>>,
    // Set once the slot is filled; readable while a load holds the slot lock.
    loaded: AtomicBool,
}

impl LazyDetector {
    pub fn new(loader: Box<dyn DetectorLoader>) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    /// Returns the loaded detector, loading it while holding the lock if needed.
    /// A failed load leaves the slot empty so a later request can retry.
    pub fn get(&self) -> Result<Arc<dyn Detect>, AnalysisError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| AnalysisError::Internal("detector slot mutex poisoned".into()))?;

        if let Some(detector) = slot.as_ref() {
            return Ok(Arc::clone(detector));
        }

        log::info!("First abnormal scan, loading detection model");
        let start = Instant::now();
        let detector = self.loader.load()?;
        log::info!("Detection model ready in {} ms", start.elapsed().as_millis());

        *slot = Some(Arc::clone(&detector));
        self.loaded.store(true, AtomicOrdering::Release);
        Ok(detector)
    }

    /// Never waits on an in-flight load.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(AtomicOrdering::Acquire)
    }
}

pub struct TorchDetectorLoader {
    config: DetectorConfig,
}

impl TorchDetectorLoader {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }
}

impl DetectorLoader for TorchDetectorLoader {
    fn load(&self) -> Result<Arc<dyn Detect>, AnalysisError> {
        Ok(Arc::new(TorchDetector::load(self.config.clone())?))
    }
}

/// YOLO detector exported to TorchScript.
pub struct TorchDetector {
    module: Mutex<CModule>,
    device: Device,
    config: DetectorConfig,
}

impl TorchDetector {
    pub fn load(config: DetectorConfig) -> Result<Self, AnalysisError> {
        let path = &config.model_path;
        if !path.exists() {
            return Err(AnalysisError::model_load(path, "file not found"));
        }

        let device = Device::cuda_if_available();
        log::info!("Loading detector from {} on {:?}", path.display(), device);
        let mut module =
            CModule::load_on_device(path, device).map_err(|e| AnalysisError::model_load(path, e))?;
        module.set_eval();

        Ok(Self {
            module: Mutex::new(module),
            device,
            config,
        })
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, AnalysisError> {
        let module = self
            .module
            .lock()
            .map_err(|_| AnalysisError::Internal("detector module mutex poisoned".into()))?;

        // Exports that return a tuple fail forward_ts; take the first tensor instead.
        let output = tch::no_grad(|| match module.forward_ts(&[&input]) {
            Ok(tensor) => Ok(tensor),
            Err(ts_err) => match module.forward_is(&[IValue::Tensor(input.shallow_clone())]) {
                Ok(IValue::Tensor(tensor)) => Ok(tensor),
                Ok(IValue::Tuple(items)) | Ok(IValue::GenericList(items)) => items
                    .into_iter()
                    .find_map(|item| match item {
                        IValue::Tensor(tensor) => Some(tensor),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        AnalysisError::Inference("detector output holds no tensor".into())
                    }),
                Ok(other) => Err(AnalysisError::Inference(format!(
                    "unexpected detector output {other:?}; forward_ts: {ts_err}"
                ))),
                Err(is_err) => Err(AnalysisError::Inference(format!(
                    "detector forward failed: {is_err}; forward_ts: {ts_err}"
                ))),
            },
        })?;

        Ok(output.to_device(Device::Cpu).to_kind(Kind::Float))
    }
}

impl Detect for TorchDetector {
    fn detect(&self, raster: &RgbImage) -> Result<Vec<DetectionBox>, AnalysisError> {
        let (canvas, letterbox) = letterbox(raster, self.config.input_size);
        let side = self.config.input_size as i64;
        let input = Tensor::from_slice(&chw_floats(&canvas))
            .view([1, 3, side, side])
            .to_device(self.device);

        let start = Instant::now();
        let output = self.forward(input)?;
        let predictions = prediction_matrix(&output)?;
        log::debug!(
            "Detector forward took {} ms, output {:?}",
            start.elapsed().as_millis(),
            output.size()
        );

        let candidates = decode_predictions(predictions.view(), self.config.confidence_threshold);
        let kept = non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
        );

        let (width, height) = raster.dimensions();
        Ok(kept
            .into_iter()
            .filter_map(|candidate| {
                let [x1, y1, x2, y2] = letterbox.restore(candidate.bbox, width, height)?;
                Some(DetectionBox {
                    x1,
                    y1,
                    x2,
                    y2,
                    confidence: candidate.score,
                    class_id: candidate.class_id,
                    label: class_name(&self.config.class_names, candidate.class_id),
                })
            })
            .collect())
    }
}

/// Maps an aspect-preserving resize plus padding back onto the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Converts a model-space `[x1, y1, x2, y2]` box to source pixels, clipped to the image.
    /// Returns `None` when nothing of the box is left inside the image.
    pub fn restore(&self, bbox: [f32; 4], width: u32, height: u32) -> Option<[f32; 4]> {
        let (w, h) = (width as f32, height as f32);
        let x1 = ((bbox[0] - self.pad_x as f32) / self.scale).clamp(0.0, w);
        let y1 = ((bbox[1] - self.pad_y as f32) / self.scale).clamp(0.0, h);
        let x2 = ((bbox[2] - self.pad_x as f32) / self.scale).clamp(0.0, w);
        let y2 = ((bbox[3] - self.pad_y as f32) / self.scale).clamp(0.0, h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some([x1, y1, x2, y2])
    }
}

pub fn letterbox(raster: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = raster.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(raster, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (canvas, Letterbox { scale, pad_x, pad_y })
}

fn chw_floats(canvas: &RgbImage) -> Vec<f32> {
    let (width, height) = canvas.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for channel in 0..3 {
            data[channel * plane + offset] = pixel[channel] as f32 / 255.0;
        }
    }
    data
}

/// Reshapes a `[1, 4 + nc, anchors]` (or `[1, anchors, 4 + nc]`) head into `[4 + nc, anchors]`.
fn prediction_matrix(output: &Tensor) -> Result<Array2<f32>, AnalysisError> {
    let size = output.size();
    let (rows, cols) = match size.as_slice() {
        [1, rows, cols] => (*rows as usize, *cols as usize),
        [rows, cols] => (*rows as usize, *cols as usize),
        other => {
            return Err(AnalysisError::Inference(format!(
                "unexpected detector output shape {other:?}"
            )));
        }
    };

    let flat = Vec::<f32>::try_from(output.flatten(0, -1))
        .map_err(|e| AnalysisError::Inference(format!("failed to read detector output: {e}")))?;
    let matrix = Array2::from_shape_vec((rows, cols), flat)
        .map_err(|e| AnalysisError::Inference(e.to_string()))?;

    // Heads have far more anchors than channels.
    let matrix = if rows > cols {
        matrix.reversed_axes()
    } else {
        matrix
    };
    if matrix.nrows() <= 4 {
        return Err(AnalysisError::Inference(format!(
            "detector output has {} channels, expected box plus class scores",
            matrix.nrows()
        )));
    }
    Ok(matrix.as_standard_layout().to_owned())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: usize,
}

/// Decodes YOLOv8 columns `(cx, cy, w, h, class scores...)`, keeping each anchor's best class.
pub fn decode_predictions(predictions: ArrayView2<f32>, confidence_threshold: f32) -> Vec<Candidate> {
    let num_classes = predictions.nrows().saturating_sub(4);
    let mut candidates = Vec::new();

    for column in predictions.columns() {
        let mut best: Option<(usize, f32)> = None;
        for class_id in 0..num_classes {
            let score = column[4 + class_id];
            if score.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((class_id, score));
            }
        }
        let Some((class_id, score)) = best else { continue };
        if !(score >= confidence_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
        candidates.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            score,
            class_id,
        });
    }
    candidates
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    inter / (area_a + area_b - inter + f32::EPSILON)
}

/// Class-aware NMS, highest score first.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && iou(&existing.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn class_name(class_names: &[String], class_id: usize) -> String {
    class_names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class {class_id}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    /// Returns the same boxes for every image and counts calls.
    pub(crate) struct FixedDetector {
        pub boxes: Vec<DetectionBox>,
        pub calls: Arc<AtomicUsize>,
    }

    impl Detect for FixedDetector {
        fn detect(&self, _raster: &RgbImage) -> Result<Vec<DetectionBox>, AnalysisError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.boxes.clone())
        }
    }

    /// Counts loads; optionally fails the first `failures` attempts.
    pub(crate) struct CountingLoader {
        pub loads: Arc<AtomicUsize>,
        pub detect_calls: Arc<AtomicUsize>,
        pub boxes: Vec<DetectionBox>,
        pub failures: usize,
        pub delay: Duration,
    }

    impl CountingLoader {
        pub(crate) fn new(boxes: Vec<DetectionBox>) -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                detect_calls: Arc::new(AtomicUsize::new(0)),
                boxes,
                failures: 0,
                delay: Duration::ZERO,
            }
        }
    }

    impl DetectorLoader for CountingLoader {
        fn load(&self) -> Result<Arc<dyn Detect>, AnalysisError> {
            thread::sleep(self.delay);
            let attempt = self.loads.fetch_add(1, AtomicOrdering::SeqCst);
            if attempt < self.failures {
                return Err(AnalysisError::model_load("models/best.torchscript", "not yet"));
            }
            Ok(Arc::new(FixedDetector {
                boxes: self.boxes.clone(),
                calls: Arc::clone(&self.detect_calls),
            }))
        }
    }

    #[test]
    fn lazy_detector_loads_on_first_use_only() {
        let loader = CountingLoader::new(Vec::new());
        let loads = Arc::clone(&loader.loads);
        let lazy = LazyDetector::new(Box::new(loader));

        assert!(!lazy.is_loaded());
        assert_eq!(loads.load(AtomicOrdering::SeqCst), 0);

        lazy.get().unwrap();
        lazy.get().unwrap();
        assert!(lazy.is_loaded());
        assert_eq!(loads.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_loads_exactly_once() {
        let mut loader = CountingLoader::new(Vec::new());
        loader.delay = Duration::from_millis(50);
        let loads = Arc::clone(&loader.loads);
        let lazy = Arc::new(LazyDetector::new(Box::new(loader)));

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    lazy.get().is_ok()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loads.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn is_loaded_does_not_wait_for_an_in_flight_load() {
        let mut loader = CountingLoader::new(Vec::new());
        loader.delay = Duration::from_millis(1500);
        let lazy = Arc::new(LazyDetector::new(Box::new(loader)));

        let loading = {
            let lazy = Arc::clone(&lazy);
            thread::spawn(move || lazy.get().is_ok())
        };
        thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        assert!(!lazy.is_loaded());
        assert!(start.elapsed() < Duration::from_millis(500));

        assert!(loading.join().unwrap());
        assert!(lazy.is_loaded());
    }

    #[test]
    fn failed_load_is_retried_on_next_use() {
        let mut loader = CountingLoader::new(Vec::new());
        loader.failures = 1;
        let loads = Arc::clone(&loader.loads);
        let lazy = LazyDetector::new(Box::new(loader));

        assert!(matches!(lazy.get(), Err(AnalysisError::ModelLoad { .. })));
        assert!(!lazy.is_loaded());
        assert!(lazy.get().is_ok());
        assert_eq!(loads.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn missing_torchscript_file_is_a_load_error() {
        let config = DetectorConfig {
            model_path: PathBuf::from("models/missing.torchscript"),
            ..DetectorConfig::default()
        };
        let loader = TorchDetectorLoader::new(config);
        assert!(matches!(loader.load(), Err(AnalysisError::ModelLoad { .. })));
    }

    #[test]
    fn decodes_best_class_per_anchor() {
        // Three anchors, two classes: rows are cx, cy, w, h, score(class0), score(class1).
        let predictions = array![
            [100.0, 300.0, 50.0],
            [100.0, 300.0, 50.0],
            [20.0, 40.0, 10.0],
            [10.0, 40.0, 10.0],
            [0.9, 0.1, 0.05],
            [0.2, 0.6, 0.1],
        ];
        let candidates = decode_predictions(predictions.view(), 0.25);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].class_id, 0);
        assert_eq!(candidates[0].bbox, [90.0, 95.0, 110.0, 105.0]);
        assert!((candidates[0].score - 0.9).abs() < 1e-6);
        assert_eq!(candidates[1].class_id, 1);
        assert_eq!(candidates[1].bbox, [280.0, 280.0, 320.0, 320.0]);
    }

    #[test]
    fn nan_class_scores_do_not_hide_valid_anchors() {
        let predictions = array![
            [100.0],
            [100.0],
            [20.0],
            [10.0],
            [f32::NAN],
            [0.9],
        ];
        let candidates = decode_predictions(predictions.view(), 0.25);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class_id, 1);
        assert!((candidates[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let candidates = vec![
            Candidate { bbox: [0.0, 0.0, 10.0, 10.0], score: 0.8, class_id: 0 },
            Candidate { bbox: [1.0, 1.0, 11.0, 11.0], score: 0.9, class_id: 0 },
            Candidate { bbox: [1.0, 1.0, 11.0, 11.0], score: 0.7, class_id: 1 },
            Candidate { bbox: [50.0, 50.0, 60.0, 60.0], score: 0.3, class_id: 0 },
        ];
        let kept = non_max_suppression(candidates, 0.5, 300);

        let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.3]);
    }

    #[test]
    fn nms_caps_detection_count() {
        let candidates = (0..10)
            .map(|i| Candidate {
                bbox: [i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0],
                score: 0.5,
                class_id: 0,
            })
            .collect();
        assert_eq!(non_max_suppression(candidates, 0.5, 3).len(), 3);
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let raster = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        let (canvas, letterbox) = letterbox(&raster, 64);

        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(letterbox.pad_x, 0);
        assert_eq!(letterbox.pad_y, 16);
        assert!((letterbox.scale - 0.32).abs() < 1e-6);
        assert_eq!(canvas.get_pixel(10, 2), &Rgb([LETTERBOX_FILL; 3]));
        assert_eq!(canvas.get_pixel(32, 32), &Rgb([255, 0, 0]));
    }

    #[test]
    fn restore_undoes_letterbox_and_clips() {
        let letterbox = Letterbox { scale: 0.5, pad_x: 0, pad_y: 10 };

        let restored = letterbox.restore([10.0, 20.0, 30.0, 40.0], 100, 100).unwrap();
        assert_eq!(restored, [20.0, 20.0, 60.0, 60.0]);

        let clipped = letterbox.restore([-5.0, 0.0, 80.0, 40.0], 100, 100).unwrap();
        assert_eq!(clipped, [0.0, 0.0, 100.0, 60.0]);

        assert_eq!(letterbox.restore([0.0, 0.0, 10.0, 5.0], 100, 100), None);
    }

    #[test]
    fn unknown_class_ids_get_a_generic_name() {
        let names = vec!["Stone".to_string()];
        assert_eq!(class_name(&names, 0), "Stone");
        assert_eq!(class_name(&names, 4), "class 4");
    }

    #[test]
    fn chw_layout_groups_channels() {
        let canvas = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) });
        let data = chw_floats(&canvas);
        assert_eq!(data, vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
