use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use sanitation_core::{
    detect_intent, normalize_text, render_application_letter, AnalysisResult, ApplicationLetter,
    BinType, ClassId, Complaint, ComplaintDraft, ComplaintStatus, FiledComplaint, Intent,
    IntentResult, Language, LookupTables, SanitationError, SanitationResult, TextSubmission,
};
use sanitation_ml::{classify_image, VisionStack};
use sanitation_observability::AppMetrics;
use sanitation_storage::{ComplaintRepository, DraftRepository};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const COMPLAINT_ID_LEN: usize = 8;
pub const MAX_ID_ATTEMPTS: usize = 16;
pub const MAX_RECENT_COMPLAINTS: usize = 100;
pub const DEFAULT_MUNICIPAL_LINK: &str = "https://www.yourmunicipalcorporation.gov.in/complaints";

#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub draft_ttl: Duration,
    pub municipal_link: String,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            draft_ttl: Duration::hours(24),
            municipal_link: DEFAULT_MUNICIPAL_LINK.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOutcome {
    #[serde(flatten)]
    pub result: IntentResult,
    /// Absent when a fresh submission recorded nothing worth keeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOutcome {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub guidance: String,
    pub model: String,
    pub draft_id: String,
}

/// 8 hex chars from a v4 uuid: 2^32 ids, so collisions are rare but
/// possible and are checked against the store before use.
pub fn random_complaint_id() -> String {
    Uuid::new_v4().simple().to_string()[..COMPLAINT_ID_LEN].to_string()
}

/// Drives a complaint from its first text or photo through to the filed record.
///
/// State between steps lives in a [`ComplaintDraft`] addressed by `draft_id`;
/// callers pass the id they got back from the previous step.
#[derive(Clone)]
pub struct ComplaintDesk<S>
where
    S: ComplaintRepository + DraftRepository,
{
    tables: Arc<LookupTables>,
    vision: VisionStack,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    settings: DeskSettings,
    id_generator: fn() -> String,
}

impl<S> ComplaintDesk<S>
where
    S: ComplaintRepository + DraftRepository,
{
    pub fn new(
        tables: Arc<LookupTables>,
        vision: VisionStack,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
        settings: DeskSettings,
    ) -> Self {
        Self {
            tables,
            vision,
            store,
            metrics,
            settings,
            id_generator: random_complaint_id,
        }
    }

    pub fn with_id_generator(mut self, id_generator: fn() -> String) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn model_name(&self) -> &str {
        self.vision.model_name()
    }

    pub fn resolve(&self, class_id: ClassId) -> AnalysisResult {
        self.tables.resolve(class_id)
    }

    #[instrument(skip(self, input), fields(draft_id = ?input.draft_id))]
    pub async fn process_text(&self, input: TextSubmission) -> SanitationResult<TextOutcome> {
        let started = Instant::now();
        self.metrics.inc_request();

        let mut draft = self.open_draft(input.draft_id.as_deref()).await?;
        let default_language = Language::from_code_or_default(input.default_language.as_deref());
        let result = detect_intent(&normalize_text(&input.text), default_language);

        let complaint_intent = result.intent == Intent::FileComplaint;
        if complaint_intent {
            draft.issue = result.keyword.clone();
        }

        // New drafts are only stored once they hold something.
        let draft_id = if complaint_intent || input.draft_id.is_some() {
            self.save_draft(&mut draft).await?;
            Some(draft.draft_id)
        } else {
            None
        };

        self.metrics.record_text_submission(complaint_intent);
        self.metrics.observe_latency(started.elapsed());
        info!(
            draft_id = ?draft_id,
            intent = ?result.intent,
            language = %result.language.as_code(),
            "text submission handled"
        );

        Ok(TextOutcome { result, draft_id })
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn analyze_image(
        &self,
        image: Vec<u8>,
        draft_id: Option<&str>,
    ) -> SanitationResult<ImageOutcome> {
        let started = Instant::now();
        self.metrics.inc_request();

        let mut draft = self.open_draft(draft_id).await?;

        let classifier = self.vision.classifier.clone();
        let prediction =
            tokio::task::spawn_blocking(move || classify_image(classifier.as_ref(), &image))
                .await
                .map_err(|err| {
                    SanitationError::model_unavailable(format!("inference task failed: {err}"))
                })?;

        let prediction = match prediction {
            Ok(prediction) => prediction,
            Err(err) => {
                if matches!(err, SanitationError::ImageDecode(_)) {
                    self.metrics.inc_image_rejection();
                }
                warn!(error = %err, "image analysis failed");
                return Err(err);
            }
        };

        let analysis = self.tables.resolve(prediction.class_id);
        draft.record_analysis(&analysis);
        self.save_draft(&mut draft).await?;

        self.metrics
            .record_classification(analysis.bin_type != BinType::Unknown);
        self.metrics.observe_latency(started.elapsed());
        info!(
            draft_id = %draft.draft_id,
            class_id = analysis.class_id,
            bin_type = analysis.bin_type.as_str(),
            model = %prediction.model,
            score = prediction.score,
            "image analyzed"
        );

        Ok(ImageOutcome {
            guidance: analysis.bin_type.guidance().to_string(),
            analysis,
            model: prediction.model,
            draft_id: draft.draft_id,
        })
    }

    pub async fn set_location(
        &self,
        draft_id: Option<&str>,
        location: &str,
    ) -> SanitationResult<String> {
        self.metrics.inc_request();

        let mut draft = self.open_draft(draft_id).await?;
        draft.location = Some(location.to_string());
        self.save_draft(&mut draft).await?;

        Ok(draft.draft_id)
    }

    pub async fn application_letter(
        &self,
        draft_id: Option<&str>,
    ) -> SanitationResult<ApplicationLetter> {
        self.metrics.inc_request();

        let draft = match draft_id {
            Some(id) => Some(self.load_live_draft(id).await?),
            None => None,
        };
        let issue = draft.as_ref().and_then(|d| d.issue.as_deref());
        let location = draft.as_ref().and_then(|d| d.location.as_deref());

        Ok(ApplicationLetter {
            application_template: render_application_letter(issue, location),
            municipal_link: self.settings.municipal_link.clone(),
        })
    }

    /// Drafted -> Filed. A stored draft is claimed (removed) before the
    /// record is written, so concurrent callers cannot file it twice; it is
    /// put back if the record cannot be stored.
    #[instrument(skip(self))]
    pub async fn file_complaint(
        &self,
        draft_id: Option<&str>,
        language: Option<&str>,
    ) -> SanitationResult<FiledComplaint> {
        let started = Instant::now();
        self.metrics.inc_request();
        let language = Language::from_code_or_default(language);

        let claimed = match draft_id {
            Some(id) => Some(self.claim_draft(id).await?),
            None => None,
        };
        let draft = claimed.clone().unwrap_or_else(|| self.new_draft());

        let complaint = match self.store_filed(draft, language).await {
            Ok(complaint) => complaint,
            Err(err) => {
                if let Some(draft) = claimed.as_ref() {
                    if let Err(restore_err) = self.store.upsert_draft(draft).await {
                        warn!(
                            draft_id = %draft.draft_id,
                            error = %restore_err,
                            "failed to restore claimed draft"
                        );
                    }
                }
                return Err(err);
            }
        };

        self.metrics.inc_complaint_filed();
        self.metrics.observe_latency(started.elapsed());
        info!(
            complaint_id = %complaint.id,
            language = %language.as_code(),
            issue = %complaint.issue,
            "complaint filed"
        );

        Ok(FiledComplaint {
            submission_link: format!("/v1/complaints/{}", complaint.id),
            complaint_id: complaint.id,
            complaint_text: complaint.complaint_text,
            bin_type: complaint.bin_type,
            waste_type: complaint.waste_type,
            language,
        })
    }

    pub async fn complaint(&self, id: &str) -> SanitationResult<Complaint> {
        self.metrics.inc_request();
        self.store
            .load_complaint(id)
            .await?
            .ok_or_else(|| SanitationError::RecordNotFound(id.to_string()))
    }

    pub async fn recent_complaints(&self, limit: usize) -> SanitationResult<Vec<Complaint>> {
        self.metrics.inc_request();
        let limit = limit.clamp(1, MAX_RECENT_COMPLAINTS);
        Ok(self.store.recent_complaints(limit).await?)
    }

    pub async fn purge_expired_drafts(&self) -> SanitationResult<u64> {
        Ok(self.store.purge_expired(Utc::now()).await?)
    }

    async fn claim_draft(&self, draft_id: &str) -> SanitationResult<ComplaintDraft> {
        let draft = self.load_live_draft(draft_id).await?;
        if !self.store.remove_draft(draft_id).await? {
            return Err(SanitationError::DraftNotFound(draft_id.to_string()));
        }
        Ok(draft)
    }

    async fn store_filed(
        &self,
        draft: ComplaintDraft,
        language: Language,
    ) -> SanitationResult<Complaint> {
        let complaint_id = self.allocate_complaint_id().await?;
        info!(
            draft_id = %draft.draft_id,
            from = draft.status().as_str(),
            to = ComplaintStatus::Filed.as_str(),
            "filing draft"
        );
        let complaint = draft.file(complaint_id, language, Utc::now());
        self.store.insert_complaint(&complaint).await?;
        Ok(complaint)
    }

    async fn allocate_complaint_id(&self) -> SanitationResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = (self.id_generator)();
            if !self.store.complaint_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(candidate = %candidate, "complaint id collision, retrying");
        }

        Err(SanitationError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    async fn open_draft(&self, draft_id: Option<&str>) -> SanitationResult<ComplaintDraft> {
        match draft_id {
            Some(id) => self.load_live_draft(id).await,
            None => Ok(self.new_draft()),
        }
    }

    fn new_draft(&self) -> ComplaintDraft {
        ComplaintDraft::new(
            Uuid::new_v4().to_string(),
            Utc::now(),
            self.settings.draft_ttl,
        )
    }

    async fn load_live_draft(&self, draft_id: &str) -> SanitationResult<ComplaintDraft> {
        self.store
            .load_draft(draft_id)
            .await?
            .filter(|draft| draft.expires_at > Utc::now())
            .ok_or_else(|| SanitationError::DraftNotFound(draft_id.to_string()))
    }

    async fn save_draft(&self, draft: &mut ComplaintDraft) -> SanitationResult<()> {
        draft.expires_at = Utc::now() + self.settings.draft_ttl;
        self.store.upsert_draft(draft).await?;
        Ok(())
    }
}
