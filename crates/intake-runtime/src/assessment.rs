//! Structured technical assessment content.

use serde::{Deserialize, Serialize};

/// T-shirt size of the implementation effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeEstimate {
    S,
    M,
    L,
    XL,
}

/// A part of the codebase the change touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactedArea {
    pub file: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub lines: String,
}

/// Feasibility and impact analysis, stored as the document's JSON content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAssessment {
    pub size_estimate: SizeEstimate,
    pub confidence: f64,
    #[serde(default)]
    pub impacted_areas: Vec<ImpactedArea>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub unknowns: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub implementation_notes: String,
}

impl TechnicalAssessment {
    /// Parse model output, tolerating code fences and prose around the JSON object.
    ///
    /// Output that does not match the schema becomes an unstructured assessment
    /// carrying the raw text, so a document is always produced.
    pub fn from_model_output(raw: &str) -> Self {
        let parsed = json_object_span(raw)
            .and_then(|json| serde_json::from_str::<Self>(json).ok());

        match parsed {
            Some(mut assessment) => {
                assessment.confidence = assessment.confidence.clamp(0.0, 1.0);
                assessment
            }
            None => Self::unstructured(raw),
        }
    }

    fn unstructured(raw: &str) -> Self {
        Self {
            size_estimate: SizeEstimate::M,
            confidence: 0.0,
            impacted_areas: Vec::new(),
            risks: Vec::new(),
            unknowns: vec!["unstructured model output".to_string()],
            assumptions: Vec::new(),
            implementation_notes: raw.trim().to_string(),
        }
    }

    /// Pretty JSON for storage.
    pub fn to_content(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

#[cfg(test)]
#[path = "assessment_tests.rs"]
mod tests;
