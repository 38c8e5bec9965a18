use crate::ClassificationLabel;

/// How the dashboard should tint the guidance block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Success => "guidance-success",
            Severity::Warning => "guidance-warning",
            Severity::Error => "guidance-error",
        }
    }
}

/// Static patient-facing notes shown next to a classification.
#[derive(Debug, PartialEq, Eq)]
pub struct MedicalGuidance {
    pub severity: Severity,
    pub headline: &'static str,
    pub description: Option<&'static str>,
    pub symptoms: Option<&'static str>,
    pub next_steps: Option<&'static str>,
    pub advice: &'static [&'static str],
}

static TUMOR: MedicalGuidance = MedicalGuidance {
    severity: Severity::Error,
    headline: "Tumor Detected",
    description: Some(
        "A tumor is an abnormal growth of tissue. It can be benign (non-cancerous) or malignant (cancerous).",
    ),
    symptoms: Some("May include pain, swelling, or abnormal function of the organ."),
    next_steps: Some(
        "Further medical imaging and biopsy may be needed to determine type and treatment.",
    ),
    advice: &[
        "Consult a specialized oncologist.",
        "Follow a healthy diet and avoid processed food.",
        "Do not delay further tests.",
    ],
};

static STONE: MedicalGuidance = MedicalGuidance {
    severity: Severity::Error,
    headline: "Kidney Stone Detected",
    description: Some(
        "Kidney stones are hard deposits made of minerals and salts that form inside your kidneys.",
    ),
    symptoms: Some("Severe side/back pain, blood in urine, nausea."),
    next_steps: Some("Medical evaluation, possible ultrasound or CT scan."),
    advice: &[
        "Drink plenty of water daily.",
        "Reduce salt and oxalate-rich foods (like spinach).",
        "Follow up with a urologist.",
    ],
};

static CYST: MedicalGuidance = MedicalGuidance {
    severity: Severity::Warning,
    headline: "Kidney Cyst Detected",
    description: Some(
        "A fluid-filled sac that can form in kidneys. Usually benign but requires monitoring.",
    ),
    symptoms: Some(
        "Often asymptomatic. Large cysts may cause discomfort or high blood pressure.",
    ),
    next_steps: Some("Ultrasound or CT scan to monitor size and changes."),
    advice: &[
        "Periodic checkups are important.",
        "Maintain healthy kidney function (stay hydrated, avoid nephrotoxic drugs).",
    ],
};

static NORMAL: MedicalGuidance = MedicalGuidance {
    severity: Severity::Success,
    headline: "No abnormality detected in this scan.",
    description: Some("Great news! This scan appears normal."),
    symptoms: None,
    next_steps: None,
    advice: &[
        "Keep a healthy lifestyle.",
        "Drink plenty of water and have regular medical checkups.",
        "If symptoms exist despite normal scan, consult a doctor for further evaluation.",
    ],
};

pub fn guidance_for(label: ClassificationLabel) -> &'static MedicalGuidance {
    match label {
        ClassificationLabel::Tumor => &TUMOR,
        ClassificationLabel::Stone => &STONE,
        ClassificationLabel::Cyst => &CYST,
        ClassificationLabel::Normal => &NORMAL,
    }
}
