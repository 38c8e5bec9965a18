use shared::{ClassificationLabel, DetectionBox};
use std::sync::Arc;

use super::annotate::{encode_jpeg, Annotator};
use super::classifier::Classify;
use super::detector::LazyDetector;
use super::preprocess::{decode_raster, decode_scan};
use crate::error::AnalysisError;

/// Result of the one-shot `/analyze/` flow.
#[derive(Debug)]
pub enum Analysis {
    /// Normal or Cyst: no localization needed.
    Classified(ClassificationLabel),
    /// Tumor or Stone: detections drawn onto the scan.
    Localized {
        label: ClassificationLabel,
        localization: Localization,
    },
}

impl Analysis {
    pub fn label(&self) -> ClassificationLabel {
        match self {
            Analysis::Classified(label) => *label,
            Analysis::Localized { label, .. } => *label,
        }
    }
}

#[derive(Debug)]
pub struct Localization {
    pub detections: Vec<DetectionBox>,
    pub annotated_jpeg: Vec<u8>,
}

/// Classifier, lazily loaded detector and annotator, built once in `main`.
pub struct ScanAnalyzer {
    classifier: Arc<dyn Classify>,
    detector: LazyDetector,
    annotator: Annotator,
    detector_class_names: Vec<String>,
    jpeg_quality: u8,
}

impl ScanAnalyzer {
    pub fn new(
        classifier: Arc<dyn Classify>,
        detector: LazyDetector,
        annotator: Annotator,
        detector_class_names: Vec<String>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            classifier,
            detector,
            annotator,
            detector_class_names,
            jpeg_quality,
        }
    }

    pub fn classify(&self, bytes: &[u8]) -> Result<ClassificationLabel, AnalysisError> {
        let scan = decode_scan(bytes)?;
        self.classifier.classify(&scan.tensor)
    }

    /// Decode, classify and, for Tumor/Stone, detect and annotate.
    pub fn analyze(&self, bytes: &[u8]) -> Result<Analysis, AnalysisError> {
        let scan = decode_scan(bytes)?;
        let label = self.classifier.classify(&scan.tensor)?;
        if !label.requires_detection() {
            return Ok(Analysis::Classified(label));
        }

        let localization = self.localize_raster(&scan.raster)?;
        Ok(Analysis::Localized {
            label,
            localization,
        })
    }

    /// Detection without classification, for the dashboard's explicit detect step.
    pub fn localize(&self, bytes: &[u8]) -> Result<Localization, AnalysisError> {
        let raster = decode_raster(bytes)?;
        self.localize_raster(&raster)
    }

    fn localize_raster(&self, raster: &image::RgbImage) -> Result<Localization, AnalysisError> {
        let detector = self.detector.get()?;
        let detections = detector.detect(raster)?;
        let annotated = self.annotator.annotate(raster, &detections);
        let annotated_jpeg = encode_jpeg(&annotated, self.jpeg_quality)?;
        Ok(Localization {
            detections,
            annotated_jpeg,
        })
    }

    pub fn detector_class_names(&self) -> &[String] {
        &self.detector_class_names
    }

    pub fn detector_loaded(&self) -> bool {
        self.detector.is_loaded()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inference::detector::tests::CountingLoader;
    use crate::inference::preprocess::tests::encoded;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use ndarray::Array4;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers with the same label and counts calls.
    pub(crate) struct FixedClassifier {
        pub label: ClassificationLabel,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub(crate) fn new(label: ClassificationLabel) -> Self {
            Self {
                label,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classify for FixedClassifier {
        fn classify(&self, tensor: &Array4<f32>) -> Result<ClassificationLabel, AnalysisError> {
            assert_eq!(tensor.shape(), &[1, 225, 225, 3]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label)
        }
    }

    pub(crate) fn stone_box() -> DetectionBox {
        DetectionBox {
            x1: 40.0,
            y1: 30.0,
            x2: 90.0,
            y2: 70.0,
            confidence: 0.83,
            class_id: 0,
            label: "Stone".into(),
        }
    }

    pub(crate) fn scan_png() -> Vec<u8> {
        let dark = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
        encoded(DynamicImage::ImageRgb8(dark), ImageFormat::Png)
    }

    pub(crate) fn analyzer(
        label: ClassificationLabel,
        boxes: Vec<DetectionBox>,
    ) -> (ScanAnalyzer, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let loader = CountingLoader::new(boxes);
        let loads = Arc::clone(&loader.loads);
        let detect_calls = Arc::clone(&loader.detect_calls);
        let analyzer = ScanAnalyzer::new(
            Arc::new(FixedClassifier::new(label)),
            LazyDetector::new(Box::new(loader)),
            Annotator::new(None, 16.0),
            vec!["Stone".into(), "Tumor".into()],
            90,
        );
        (analyzer, loads, detect_calls)
    }

    #[test]
    fn normal_scan_never_touches_the_detector() {
        let (analyzer, loads, detect_calls) = analyzer(ClassificationLabel::Normal, vec![stone_box()]);

        let analysis = analyzer.analyze(&scan_png()).unwrap();
        assert!(matches!(analysis, Analysis::Classified(ClassificationLabel::Normal)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
        assert!(!analyzer.detector_loaded());
    }

    #[test]
    fn cyst_is_classification_only() {
        let (analyzer, _, detect_calls) = analyzer(ClassificationLabel::Cyst, vec![stone_box()]);
        let analysis = analyzer.analyze(&scan_png()).unwrap();
        assert_eq!(analysis.label(), ClassificationLabel::Cyst);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stone_scan_is_detected_once_and_annotated() {
        let (analyzer, loads, detect_calls) = analyzer(ClassificationLabel::Stone, vec![stone_box()]);

        let analysis = analyzer.analyze(&scan_png()).unwrap();
        let Analysis::Localized { label, localization } = analysis else {
            panic!("stone scans must be localized");
        };
        assert_eq!(label, ClassificationLabel::Stone);
        assert_eq!(localization.detections, vec![stone_box()]);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let annotated = image::load_from_memory(&localization.annotated_jpeg).unwrap().to_rgb8();
        assert_eq!(annotated.dimensions(), (160, 120));
        let edge = annotated.get_pixel(65, 30).0.map(i32::from);
        assert!(
            edge[1] > 150 && edge[1] > edge[0] + 60 && edge[1] > edge[2] + 60,
            "expected green edge, got {edge:?}"
        );
        assert!(annotated.get_pixel(65, 50)[1] < 60);
    }

    #[test]
    fn detector_is_reused_across_requests() {
        let (analyzer, loads, detect_calls) = analyzer(ClassificationLabel::Tumor, Vec::new());

        for _ in 0..3 {
            analyzer.analyze(&scan_png()).unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 3);
        assert!(analyzer.detector_loaded());
    }

    #[test]
    fn localize_skips_classification() {
        let classifier = Arc::new(FixedClassifier::new(ClassificationLabel::Tumor));
        let loader = CountingLoader::new(vec![stone_box()]);
        let analyzer = ScanAnalyzer::new(
            classifier.clone(),
            LazyDetector::new(Box::new(loader)),
            Annotator::new(None, 16.0),
            Vec::new(),
            90,
        );

        let localization = analyzer.localize(&scan_png()).unwrap();
        assert_eq!(localization.detections.len(), 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classification_is_deterministic_for_identical_bytes() {
        let (analyzer, _, _) = analyzer(ClassificationLabel::Cyst, Vec::new());
        let bytes = scan_png();
        assert_eq!(analyzer.classify(&bytes).unwrap(), analyzer.classify(&bytes).unwrap());
    }

    #[test]
    fn undecodable_upload_fails_before_classification() {
        let (analyzer, _, _) = analyzer(ClassificationLabel::Stone, Vec::new());
        assert!(matches!(analyzer.analyze(&[]), Err(AnalysisError::Decode(_))));
        assert!(matches!(analyzer.localize(b"nope"), Err(AnalysisError::Decode(_))));
    }
}
