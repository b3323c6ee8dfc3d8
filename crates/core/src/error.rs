use crate::models::ClassId;

pub type SanitationResult<T> = std::result::Result<T, SanitationError>;

#[derive(Debug, thiserror::Error)]
pub enum SanitationError {
    #[error("uploaded file could not be decoded as an image: {0}")]
    ImageDecode(String),

    #[error("image classifier unavailable: {0}")]
    ModelUnavailable(String),

    #[error("complaint {0} not found")]
    RecordNotFound(String),

    #[error("complaint draft {0} not found")]
    DraftNotFound(String),

    #[error("class ids present in both bin tables: {class_ids:?}")]
    OverlappingBinTables { class_ids: Vec<ClassId> },

    #[error("could not allocate a free complaint id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    #[error("invalid reference set: {0}")]
    InvalidReferenceSet(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl SanitationError {
    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Caller-correctable failures, surfaced as 4xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ImageDecode(_) | Self::RecordNotFound(_) | Self::DraftNotFound(_)
        )
    }
}
