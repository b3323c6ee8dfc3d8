use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::templates::render_complaint_text;

/// Output index of the image classifier (ImageNet-scale, 0..=999).
pub type ClassId = u16;

pub const UNSPECIFIED: &str = "unspecified";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Hi,
    Ta,
    Bn,
    Ur,
}

impl Language {
    /// Declaration order; keyword detection walks languages in this order.
    pub const ALL: [Language; 5] = [Self::En, Self::Hi, Self::Ta, Self::Bn, Self::Ur];

    pub fn from_code(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "en" | "en-in" | "en-us" | "english" => Some(Self::En),
            "hi" | "hi-in" | "hindi" => Some(Self::Hi),
            "ta" | "ta-in" | "tamil" => Some(Self::Ta),
            "bn" | "bn-in" | "bn-bd" | "bengali" | "bangla" => Some(Self::Bn),
            "ur" | "ur-in" | "ur-pk" | "urdu" => Some(Self::Ur),
            _ => None,
        }
    }

    pub fn from_code_or_default(value: Option<&str>) -> Self {
        value.and_then(Self::from_code).unwrap_or_default()
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
            Self::Ta => "ta",
            Self::Bn => "bn",
            Self::Ur => "ur",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FileComplaint,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinType {
    Green,
    Blue,
    Unknown,
}

impl BinType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "green" => Self::Green,
            "blue" => Self::Blue,
            _ => Self::Unknown,
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            Self::Green => {
                "Green bin: food scraps and yard waste can be composted into nutrient-rich soil."
            }
            Self::Blue => {
                "Blue bin: clean and separate paper, plastic, glass and metal for recycling."
            }
            Self::Unknown => {
                "Could not match a bin; keep hazardous items like batteries and chemicals for designated collection centers."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WasteType {
    Decomposable,
    NonDecomposable,
    Unknown,
}

impl WasteType {
    /// Unknown bins stay unknown rather than falling through to non-decomposable.
    pub fn for_bin(bin: BinType) -> Self {
        match bin {
            BinType::Green => Self::Decomposable,
            BinType::Unknown => Self::Unknown,
            BinType::Blue => Self::NonDecomposable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decomposable => "decomposable",
            Self::NonDecomposable => "non-decomposable",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "decomposable" => Self::Decomposable,
            "non-decomposable" | "non_decomposable" => Self::NonDecomposable,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub detected_issue: String,
    pub bin_type: BinType,
    pub waste_type: WasteType,
    pub class_id: ClassId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintStatus {
    Drafted,
    Filed,
}

impl ComplaintStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafted => "Drafted",
            Self::Filed => "Filed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "Drafted" => Self::Drafted,
            _ => Self::Filed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    pub issue: String,
    pub location: String,
    pub language: Language,
    pub complaint_text: String,
    pub status: ComplaintStatus,
    pub timestamp: DateTime<Utc>,
    pub bin_type: BinType,
    pub waste_type: WasteType,
}

/// Per-request-chain state gathered before a complaint is filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintDraft {
    pub draft_id: String,
    pub issue: Option<String>,
    pub location: Option<String>,
    pub bin_type: Option<BinType>,
    pub waste_type: Option<WasteType>,
    pub class_id: Option<ClassId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ComplaintDraft {
    pub fn new(draft_id: impl Into<String>, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            draft_id: draft_id.into(),
            issue: None,
            location: None,
            bin_type: None,
            waste_type: None,
            class_id: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn status(&self) -> ComplaintStatus {
        ComplaintStatus::Drafted
    }

    pub fn record_analysis(&mut self, analysis: &AnalysisResult) {
        self.issue = Some(analysis.detected_issue.clone());
        self.bin_type = Some(analysis.bin_type);
        self.waste_type = Some(analysis.waste_type);
        self.class_id = Some(analysis.class_id);
    }

    /// Drafted -> Filed. Consumes the draft so it cannot be filed twice.
    pub fn file(self, id: impl Into<String>, language: Language, now: DateTime<Utc>) -> Complaint {
        let issue = self.issue.unwrap_or_else(|| UNSPECIFIED.to_string());
        let location = self.location.unwrap_or_else(|| UNSPECIFIED.to_string());
        let complaint_text = render_complaint_text(language, &issue, &location);

        Complaint {
            id: id.into(),
            issue,
            location,
            language,
            complaint_text,
            status: ComplaintStatus::Filed,
            timestamp: now,
            bin_type: self.bin_type.unwrap_or(BinType::Unknown),
            waste_type: self.waste_type.unwrap_or(WasteType::Unknown),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSubmission {
    pub text: String,
    pub default_language: Option<String>,
    pub draft_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiledComplaint {
    pub complaint_id: String,
    pub complaint_text: String,
    pub submission_link: String,
    pub bin_type: BinType,
    pub waste_type: WasteType,
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationLetter {
    pub application_template: String,
    pub municipal_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_language_codes_fall_back_to_english() {
        assert_eq!(Language::from_code_or_default(Some("fr")), Language::En);
        assert_eq!(Language::from_code_or_default(None), Language::En);
        assert_eq!(Language::from_code_or_default(Some(" TA ")), Language::Ta);
    }

    #[test]
    fn waste_type_serializes_with_hyphen() {
        let value = serde_json::to_value(WasteType::NonDecomposable).unwrap();
        assert_eq!(value, serde_json::json!("non-decomposable"));
    }

    #[test]
    fn filing_an_empty_draft_uses_unspecified_fields() {
        let now = Utc::now();
        let draft = ComplaintDraft::new("d-1", now, chrono::Duration::hours(1));
        assert_eq!(draft.status(), ComplaintStatus::Drafted);
        assert_eq!(ComplaintStatus::parse(draft.status().as_str()), ComplaintStatus::Drafted);
        let complaint = draft.file("abcd1234", Language::En, now);

        assert_eq!(complaint.issue, UNSPECIFIED);
        assert_eq!(complaint.location, UNSPECIFIED);
        assert_eq!(complaint.status, ComplaintStatus::Filed);
        assert_eq!(complaint.bin_type, BinType::Unknown);
        assert_eq!(complaint.waste_type, WasteType::Unknown);
        assert_eq!(
            complaint.complaint_text,
            "Complaint: unspecified, Location: unspecified"
        );
    }
}
