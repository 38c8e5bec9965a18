use shared::{ClassificationLabel, DetectionResponse};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultTab {
    Visualization,
    DetectionInfo,
}

/// Request lifecycle of the scan on screen. Every answer carries the id of the
/// scan it was sent for and is ignored once that scan has been replaced.
#[derive(Debug, PartialEq)]
pub struct ScanState {
    pub scan_id: Option<u64>,
    pub classification: Option<ClassificationLabel>,
    pub classifying: bool,
    pub detection: Option<DetectionResponse>,
    pub detecting: bool,
    pub active_tab: ResultTab,
    pub error: Option<String>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            scan_id: None,
            classification: None,
            classifying: false,
            detection: None,
            detecting: false,
            active_tab: ResultTab::Visualization,
            error: None,
        }
    }
}

impl ScanState {
    /// Starts over for a freshly selected scan, classification in flight.
    pub fn begin(&mut self, scan_id: u64) {
        *self = Self {
            scan_id: Some(scan_id),
            classifying: true,
            ..Self::default()
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_current(&self, scan_id: u64) -> bool {
        self.scan_id == Some(scan_id)
    }

    pub fn classified(&mut self, scan_id: u64, label: ClassificationLabel) -> bool {
        if !self.is_current(scan_id) {
            log::debug!("Dropping classification for a replaced scan");
            return false;
        }
        self.classifying = false;
        self.classification = Some(label);
        self.error = None;
        true
    }

    /// Marks detection in flight; false when there is nothing to detect or a request is pending.
    pub fn start_detection(&mut self) -> bool {
        let needs_detection = self
            .classification
            .is_some_and(|label| label.requires_detection());
        if self.scan_id.is_none() || self.detecting || !needs_detection {
            return false;
        }
        self.detecting = true;
        self.error = None;
        true
    }

    pub fn detected(&mut self, scan_id: u64, response: DetectionResponse) -> bool {
        if !self.is_current(scan_id) {
            log::debug!("Dropping detections for a replaced scan");
            return false;
        }
        self.detecting = false;
        self.detection = Some(response);
        self.active_tab = ResultTab::Visualization;
        self.error = None;
        true
    }

    pub fn failed(&mut self, scan_id: u64, message: String) -> bool {
        if !self.is_current(scan_id) {
            log::debug!("Dropping failure for a replaced scan: {}", message);
            return false;
        }
        self.classifying = false;
        self.detecting = false;
        self.error = Some(message);
        true
    }

    /// Errors not tied to a request, e.g. a rejected file type.
    pub fn show_error(&mut self, message: Option<String>) {
        self.error = message;
    }

    pub fn select_tab(&mut self, tab: ResultTab) -> bool {
        let changed = self.active_tab != tab;
        self.active_tab = tab;
        changed
    }
}
