pub mod disposal;
pub mod error;
pub mod intent;
pub mod models;
pub mod tables;
pub mod templates;

pub use disposal::resolve_disposal;
pub use error::{SanitationError, SanitationResult};
pub use intent::{detect_intent, normalize_text};
pub use models::*;
pub use tables::{LookupTables, OTHER_ISSUE, SANITATION_KEYWORDS};
pub use templates::{render_application_letter, render_complaint_text};
