use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{SanitationError, SanitationResult};
use crate::models::{BinType, ClassId, Language};

pub const OTHER_ISSUE: &str = "other";

const SANITATION_CLASSES: &[(ClassId, &str)] = &[
    (483, "garbage"),
    (568, "sewage"),
    (605, "waste"),
    (849, "pollution"),
];

const DECOMPOSABLE_CLASSES: &[ClassId] = &[937, 954, 970, 951, 927, 949, 966, 987, 991];

const NON_DECOMPOSABLE_CLASSES: &[ClassId] = &[566, 504, 654, 717, 883, 892, 479, 507, 605];

pub const SANITATION_KEYWORDS: [(Language, &[&str]); 5] = [
    (
        Language::En,
        &["garbage", "trash", "waste", "sewage", "drainage", "pollution"],
    ),
    (Language::Hi, &["कचरा", "गंदगी", "नाली", "सीवेज", "प्रदूषण"]),
    (Language::Ta, &["குப்பை", "கழிவு", "கழிவுநீர்", "மாசுபாடு"]),
    (Language::Bn, &["আবর্জনা", "বর্জ্য", "নিকাশী", "দূষণ"]),
    (Language::Ur, &["کوڑا", "گندگی", "سیوریج", "آلودگی"]),
];

static BUILTIN: Lazy<LookupTables> = Lazy::new(|| LookupTables {
    sanitation: SANITATION_CLASSES
        .iter()
        .map(|(id, keyword)| (*id, keyword.to_string()))
        .collect(),
    decomposable: DECOMPOSABLE_CLASSES.iter().copied().collect(),
    non_decomposable: NON_DECOMPOSABLE_CLASSES.iter().copied().collect(),
});

/// Class id lookups for sanitation keyword and bin color.
///
/// The decomposable (green) and non-decomposable (blue) sets are disjoint;
/// every constructor checks this before handing out a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTables {
    sanitation: BTreeMap<ClassId, String>,
    decomposable: BTreeSet<ClassId>,
    non_decomposable: BTreeSet<ClassId>,
}

#[derive(Debug, Deserialize)]
struct TablesFile {
    #[serde(default)]
    sanitation: BTreeMap<ClassId, String>,
    #[serde(default)]
    decomposable: Vec<ClassId>,
    #[serde(default)]
    non_decomposable: Vec<ClassId>,
}

impl LookupTables {
    pub fn new(
        sanitation: BTreeMap<ClassId, String>,
        decomposable: impl IntoIterator<Item = ClassId>,
        non_decomposable: impl IntoIterator<Item = ClassId>,
    ) -> SanitationResult<Self> {
        let decomposable: BTreeSet<ClassId> = decomposable.into_iter().collect();
        let non_decomposable: BTreeSet<ClassId> = non_decomposable.into_iter().collect();

        let overlap = decomposable
            .intersection(&non_decomposable)
            .copied()
            .collect::<Vec<_>>();
        if !overlap.is_empty() {
            return Err(SanitationError::OverlappingBinTables { class_ids: overlap });
        }

        Ok(Self {
            sanitation,
            decomposable,
            non_decomposable,
        })
    }

    pub fn builtin() -> &'static LookupTables {
        &BUILTIN
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SanitationResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading lookup tables at {}", path.display()))?;
        let parsed: TablesFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid lookup tables json at {}", path.display()))?;

        Self::new(
            parsed.sanitation,
            parsed.decomposable,
            parsed.non_decomposable,
        )
    }

    pub fn sanitation_issue(&self, class_id: ClassId) -> &str {
        self.sanitation
            .get(&class_id)
            .map(String::as_str)
            .unwrap_or(OTHER_ISSUE)
    }

    /// Non-decomposable is consulted first.
    pub fn bin_type(&self, class_id: ClassId) -> BinType {
        if self.non_decomposable.contains(&class_id) {
            BinType::Blue
        } else if self.decomposable.contains(&class_id) {
            BinType::Green
        } else {
            BinType::Unknown
        }
    }

    pub fn decomposable_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.decomposable.iter().copied()
    }

    pub fn non_decomposable_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.non_decomposable.iter().copied()
    }
}
