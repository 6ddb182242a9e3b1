//! Session-scoped orchestration: merges user input and collaborator results
//! into the application state, keeps the composite score current, and owns
//! the staleness bookkeeping around every asynchronous analysis.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::analysis::{
    AnalysisContext, AnalysisError, AnalysisSlot, AnalysisSuite, AnalysisTicket, SlotStatus,
    SlotTracker,
};
use super::scoring::{compute_score, score_breakdown, ScoreBreakdown};
use super::state::{
    derive_age, ApplicationId, ApplicationState, CollateralTag, CostEstimates, DetectedAsset,
    FileHandle, ProtectedDocument, ScoreCategory, SessionId, Sex, SubScores,
};
use super::steps::WizardStep;
use super::submission::{
    ApplicationRecord, ApplicationRepository, ApplicationStatus, DocumentStore, RepositoryError,
    SubmissionAssembler, SubmissionError,
};
use super::wizard::{GateRejection, WizardSession};

/// Runtime knobs for the wizard service.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Bounded wait for any single collaborator call; beyond it the slot is
    /// failed rather than left hanging.
    pub analysis_timeout_secs: u64,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_secs: 30,
        }
    }
}

/// Everything the service tracks for one in-progress wizard session.
#[derive(Debug)]
struct SessionEntry {
    ctx: AnalysisContext,
    state: ApplicationState,
    wizard: WizardSession,
    tracker: SlotTracker,
    score: u8,
}

impl SessionEntry {
    fn rescore(&mut self) {
        self.score = compute_score(&self.state);
    }
}

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("session-{id:06}"))
}

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Merge-style partial update of the form fields. Absent fields are left
/// untouched; sub-scores are never writable through a patch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatePatch {
    pub full_name: Option<String>,
    pub id_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub phone_number: Option<String>,
    pub occupation: Option<String>,
    pub collateral_tags: Option<BTreeSet<CollateralTag>>,
    pub guarantor_one_phone: Option<String>,
    pub guarantor_two_phone: Option<String>,
}

/// A document attached to one named upload slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum DocumentAttachment {
    IdentityPhoto { file: FileHandle },
    Prescription { file: FileHandle },
    DrugImage { file: FileHandle },
    BankStatement { file: FileHandle, password: Option<String> },
    MobileMoneyStatement { file: FileHandle, password: Option<String> },
    HomePhoto { file: FileHandle },
    BusinessPhoto { file: FileHandle },
    VehicleLogbook { file: FileHandle },
    TitleDeed { file: FileHandle },
    CallLog { file: FileHandle },
    GuarantorOneId { file: FileHandle },
    GuarantorTwoId { file: FileHandle },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetPlacement {
    Indoor,
    Outdoor,
}

/// What happened to the analysis triggered by an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisDisposition {
    /// The slot needs no analysis; presence alone matters.
    NotRequested,
    /// The result was merged and the score recomputed.
    Applied,
    /// Part of a batch failed; the successes were merged and the slot keeps
    /// the retryable error.
    PartiallyApplied { reason: String },
    /// A newer call for the same slot superseded this one; result discarded.
    Superseded,
    /// Retryable failure; the previous sub-score, if any, is untouched.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentOutcome {
    pub score: u8,
    pub analysis: AnalysisDisposition,
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub application_id: ApplicationId,
    pub step: &'static str,
    pub step_index: usize,
    pub score: u8,
    pub sub_scores: SubScores,
    pub costs: CostEstimates,
    pub analysis_in_flight: bool,
    pub analysis_slots: Vec<SlotView>,
}

/// One analysis slot's status, as exposed in the session view.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot: AnalysisSlot,
    pub status: SlotStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum WizardServiceError {
    #[error("unknown session")]
    UnknownSession,
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),
    #[error("analysis still in flight; retry once it settles")]
    AnalysisInFlight,
    #[error(transparent)]
    Gate(#[from] GateRejection),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The wizard facade, generic over the analysis suite, the document store,
/// and the application repository.
pub struct ApplicationWizardService<A, S, R> {
    analyzers: Arc<A>,
    assembler: SubmissionAssembler<S, R>,
    repository: Arc<R>,
    config: WizardConfig,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl<A, S, R> ApplicationWizardService<A, S, R>
where
    A: AnalysisSuite + 'static,
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    pub fn new(analyzers: Arc<A>, store: Arc<S>, repository: Arc<R>, config: WizardConfig) -> Self {
        Self {
            analyzers,
            assembler: SubmissionAssembler::new(store, Arc::clone(&repository)),
            repository,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_session<T>(
        &self,
        session_id: &SessionId,
        apply: impl FnOnce(&mut SessionEntry) -> T,
    ) -> Result<T, WizardServiceError> {
        let mut registry = self.registry();
        let entry = registry
            .get_mut(session_id)
            .ok_or(WizardServiceError::UnknownSession)?;
        Ok(apply(entry))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AnalysisError>>,
    ) -> Result<T, AnalysisError> {
        let limit = Duration::from_secs(self.config.analysis_timeout_secs);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::TimedOut(self.config.analysis_timeout_secs)),
        }
    }

    pub fn start_session(&self) -> SessionView {
        let session_id = next_session_id();
        let ctx = AnalysisContext {
            owner_id: session_id.0.clone(),
            application_id: next_application_id(),
        };
        let entry = SessionEntry {
            ctx,
            state: ApplicationState::default(),
            wizard: WizardSession::new(),
            tracker: SlotTracker::default(),
            score: 0,
        };
        let view = view_of(&session_id, &entry);
        self.registry().insert(session_id, entry);
        view
    }

    pub fn session(&self, session_id: &SessionId) -> Result<SessionView, WizardServiceError> {
        self.with_session(session_id, |entry| view_of(session_id, entry))
    }

    pub fn breakdown(&self, session_id: &SessionId) -> Result<ScoreBreakdown, WizardServiceError> {
        self.with_session(session_id, |entry| score_breakdown(&entry.state))
    }

    /// Apply a merge-style patch of form fields and recompute the score.
    pub fn patch_fields(
        &self,
        session_id: &SessionId,
        patch: StatePatch,
    ) -> Result<u8, WizardServiceError> {
        self.with_session(session_id, |entry| {
            let profile = &mut entry.state.profile;
            if let Some(value) = patch.full_name {
                profile.full_name = Some(value);
            }
            if let Some(value) = patch.id_number {
                profile.id_number = Some(value);
            }
            if let Some(value) = patch.date_of_birth {
                profile.date_of_birth = Some(value);
                profile.age = Some(derive_age(value, Local::now().date_naive()));
            }
            if let Some(value) = patch.sex {
                profile.sex = Some(value);
            }
            if let Some(value) = patch.phone_number {
                profile.phone_number = Some(value);
            }
            if let Some(value) = patch.occupation {
                profile.occupation = Some(value);
            }
            if let Some(tags) = patch.collateral_tags {
                entry.state.collateral_tags = tags;
            }
            if let Some(value) = patch.guarantor_one_phone {
                entry.state.guarantors.first_phone = Some(value);
            }
            if let Some(value) = patch.guarantor_two_phone {
                entry.state.guarantors.second_phone = Some(value);
            }
            entry.rescore();
            entry.score
        })
    }

    pub fn advance(&self, session_id: &SessionId) -> Result<WizardStep, WizardServiceError> {
        self.with_session(session_id, |entry| {
            let step = entry.wizard.advance(&entry.state)?;
            info!(session = %session_id.0, step = step.label(), "wizard advanced");
            Ok(step)
        })?
    }

    pub fn back(&self, session_id: &SessionId) -> Result<WizardStep, WizardServiceError> {
        self.with_session(session_id, |entry| entry.wizard.back())
    }

    pub fn jump_to(
        &self,
        session_id: &SessionId,
        target: WizardStep,
    ) -> Result<WizardStep, WizardServiceError> {
        self.with_session(session_id, |entry| {
            entry.wizard.jump_to(target, &entry.state).map_err(Into::into)
        })?
    }

    /// Attach a document to its slot and run whatever analysis the slot
    /// requires. The file is stored before analysis starts, so gating by
    /// presence is satisfied even when the analysis later fails.
    pub async fn attach_document(
        &self,
        session_id: &SessionId,
        attachment: DocumentAttachment,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        match attachment {
            DocumentAttachment::IdentityPhoto { file } => {
                self.run_identity_scan(session_id, file).await
            }
            DocumentAttachment::Prescription { file } => {
                self.with_session(session_id, |entry| {
                    entry.state.uploads.prescription = Some(file);
                    entry.rescore();
                })?;
                self.run_medical_assessment(session_id).await
            }
            DocumentAttachment::DrugImage { file } => {
                self.with_session(session_id, |entry| {
                    entry.state.uploads.drug_images.push(file);
                    entry.rescore();
                })?;
                self.run_medical_assessment(session_id).await
            }
            DocumentAttachment::BankStatement { file, password } => {
                let document = ProtectedDocument { file, password };
                self.with_session(session_id, |entry| {
                    entry.state.uploads.bank_statement = Some(document.clone());
                    entry.rescore();
                })?;
                self.run_bank_statement_analysis(session_id, document).await
            }
            DocumentAttachment::MobileMoneyStatement { file, password } => {
                self.finish_presence_only(session_id, |entry| {
                    entry.state.uploads.mobile_money_statement =
                        Some(ProtectedDocument { file, password });
                })
            }
            DocumentAttachment::HomePhoto { file } => {
                self.finish_presence_only(session_id, |entry| {
                    entry.state.uploads.home_photo = Some(file);
                })
            }
            DocumentAttachment::BusinessPhoto { file } => {
                self.finish_presence_only(session_id, |entry| {
                    entry.state.uploads.business_photo = Some(file);
                })
            }
            DocumentAttachment::VehicleLogbook { file } => {
                self.finish_presence_only(session_id, |entry| {
                    entry.state.uploads.vehicle_logbook = Some(file);
                })
            }
            DocumentAttachment::TitleDeed { file } => {
                self.finish_presence_only(session_id, |entry| {
                    entry.state.uploads.title_deed = Some(file);
                })
            }
            DocumentAttachment::CallLog { file } => {
                self.with_session(session_id, |entry| {
                    entry.state.uploads.call_log = Some(file.clone());
                    entry.rescore();
                })?;
                self.run_behavior_analysis(session_id, file).await
            }
            DocumentAttachment::GuarantorOneId { file } => {
                self.run_guarantor_scan(session_id, file, true).await
            }
            DocumentAttachment::GuarantorTwoId { file } => {
                self.run_guarantor_scan(session_id, file, false).await
            }
        }
    }

    fn finish_presence_only(
        &self,
        session_id: &SessionId,
        apply: impl FnOnce(&mut SessionEntry),
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        self.with_session(session_id, |entry| {
            apply(entry);
            entry.rescore();
            AttachmentOutcome {
                score: entry.score,
                analysis: AnalysisDisposition::NotRequested,
            }
        })
    }

    async fn run_identity_scan(
        &self,
        session_id: &SessionId,
        file: FileHandle,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let ticket =
            self.with_session(session_id, |entry| entry.tracker.begin(AnalysisSlot::Identity))?;

        let result = self.bounded(self.analyzers.extract_identity(&file)).await;

        self.with_session(session_id, |entry| match result {
            Ok(card) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                let today = Local::now().date_naive();
                let profile = &mut entry.state.profile;
                profile.full_name = Some(card.full_name);
                profile.id_number = Some(card.id_number);
                profile.date_of_birth = Some(card.date_of_birth);
                profile.age = Some(derive_age(card.date_of_birth, today));
                profile.sex = Some(card.sex);
                entry.rescore();
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    async fn run_guarantor_scan(
        &self,
        session_id: &SessionId,
        file: FileHandle,
        first: bool,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let slot = if first {
            AnalysisSlot::GuarantorOneIdentity
        } else {
            AnalysisSlot::GuarantorTwoIdentity
        };
        let ticket = self.with_session(session_id, |entry| {
            if first {
                entry.state.guarantors.first_id = Some(file.clone());
            } else {
                entry.state.guarantors.second_id = Some(file.clone());
            }
            entry.rescore();
            entry.tracker.begin(slot)
        })?;

        let result = self.bounded(self.analyzers.extract_identity(&file)).await;

        self.with_session(session_id, |entry| match result {
            Ok(card) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                if first {
                    entry.state.guarantors.first_id_name = Some(card.full_name);
                } else {
                    entry.state.guarantors.second_id_name = Some(card.full_name);
                }
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    async fn run_medical_assessment(
        &self,
        session_id: &SessionId,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let (ticket, ctx, prescription, drug_images) =
            self.with_session(session_id, |entry| {
                (
                    entry.tracker.begin(AnalysisSlot::Medical),
                    entry.ctx.clone(),
                    entry.state.uploads.prescription.clone(),
                    entry.state.uploads.drug_images.clone(),
                )
            })?;

        let result = self
            .bounded(self.analyzers.assess_medical(
                &ctx,
                prescription.as_ref(),
                &drug_images,
            ))
            .await;

        self.with_session(session_id, |entry| match result {
            Ok(assessment) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                entry
                    .state
                    .sub_scores
                    .set(ScoreCategory::MedicalNeeds, assessment.needs_score);
                entry.state.costs.retail_cost = Some(assessment.retail_cost);
                entry.state.costs.credit_cost = Some(assessment.credit_cost);
                entry.rescore();
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    async fn run_bank_statement_analysis(
        &self,
        session_id: &SessionId,
        document: ProtectedDocument,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let (ticket, ctx) = self.with_session(session_id, |entry| {
            (
                entry.tracker.begin(AnalysisSlot::BankStatement),
                entry.ctx.clone(),
            )
        })?;

        let result = self
            .bounded(self.analyzers.analyze_statement(&ctx, &document))
            .await;

        self.with_session(session_id, |entry| match result {
            Ok(report) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                entry
                    .state
                    .sub_scores
                    .set(ScoreCategory::BankStatementCredit, report.credit_score);
                entry.rescore();
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    async fn run_behavior_analysis(
        &self,
        session_id: &SessionId,
        call_log: FileHandle,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let (ticket, ctx) = self.with_session(session_id, |entry| {
            (entry.tracker.begin(AnalysisSlot::Behavior), entry.ctx.clone())
        })?;

        let result = self
            .bounded(self.analyzers.analyze_behavior(&ctx, &call_log))
            .await;

        self.with_session(session_id, |entry| match result {
            Ok(report) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                entry
                    .state
                    .sub_scores
                    .set(ScoreCategory::BehaviorRisk, report.score);
                entry.rescore();
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    /// Attach a batch of asset images: the images fan out to one detection
    /// call each, and the aggregate portfolio score is requested only after
    /// every call in the batch has settled. An image that fails detection
    /// does not discard its siblings' results; the batch reports a partial
    /// failure and the slot keeps the retryable error.
    pub async fn attach_asset_images(
        &self,
        session_id: &SessionId,
        placement: AssetPlacement,
        files: Vec<FileHandle>,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let (ticket, ctx) = self.with_session(session_id, |entry| {
            match placement {
                AssetPlacement::Indoor => entry
                    .state
                    .uploads
                    .indoor_asset_images
                    .extend(files.iter().cloned()),
                AssetPlacement::Outdoor => entry
                    .state
                    .uploads
                    .outdoor_asset_images
                    .extend(files.iter().cloned()),
            }
            entry.rescore();
            (entry.tracker.begin(AnalysisSlot::AssetBatch), entry.ctx.clone())
        })?;

        let mut detections: JoinSet<Result<Vec<DetectedAsset>, AnalysisError>> = JoinSet::new();
        let limit = Duration::from_secs(self.config.analysis_timeout_secs);
        for file in files {
            let analyzers = Arc::clone(&self.analyzers);
            let ctx = ctx.clone();
            let timeout_secs = self.config.analysis_timeout_secs;
            detections.spawn(async move {
                match tokio::time::timeout(limit, analyzers.detect_assets(&ctx, &file)).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::TimedOut(timeout_secs)),
                }
            });
        }

        let mut detected = Vec::new();
        let mut first_error: Option<AnalysisError> = None;
        let mut successes = 0usize;
        while let Some(joined) = detections.join_next().await {
            match joined {
                Ok(Ok(assets)) => {
                    successes += 1;
                    detected.extend(assets);
                }
                Ok(Err(error)) => {
                    warn!(session = %session_id.0, %error, "asset detection failed");
                    first_error.get_or_insert(error);
                }
                Err(join_error) => {
                    first_error
                        .get_or_insert(AnalysisError::Unreachable(join_error.to_string()));
                }
            }
        }

        if successes == 0 {
            if let Some(error) = first_error {
                return self
                    .with_session(session_id, |entry| failed_or_superseded(entry, &ticket, error));
            }
            // Empty batch: nothing to analyze, settle the slot immediately.
            return self.with_session(session_id, |entry| {
                entry.tracker.resolve(&ticket);
                AttachmentOutcome {
                    score: entry.score,
                    analysis: AnalysisDisposition::NotRequested,
                }
            });
        }

        // Merge the joined detections, then value the whole portfolio.
        let portfolio = self.with_session(session_id, |entry| {
            if !entry.tracker.is_current(&ticket) {
                return None;
            }
            for asset in detected {
                if entry.state.asset(&asset.asset_id).is_none() {
                    entry.state.detected_assets.push(asset);
                }
            }
            Some(entry.state.detected_assets.clone())
        })?;
        let Some(portfolio) = portfolio else {
            return self.with_session(session_id, |entry| superseded(entry));
        };

        let result = self
            .bounded(self.analyzers.score_portfolio(&ctx, &portfolio))
            .await;

        self.with_session(session_id, |entry| match result {
            Ok(valuation) => {
                if !entry.tracker.is_current(&ticket) {
                    return superseded(entry);
                }
                entry
                    .state
                    .sub_scores
                    .set(ScoreCategory::AssetValuation, valuation.score);
                entry.state.costs.total_asset_value = Some(
                    entry
                        .state
                        .detected_assets
                        .iter()
                        .map(|asset| asset.estimated_value)
                        .sum(),
                );
                entry.rescore();
                match first_error {
                    // Successes are merged either way; the slot records the
                    // failed image so the user is prompted to retry it.
                    Some(error) => {
                        let reason = error.to_string();
                        entry.tracker.fail(&ticket, reason.clone());
                        AttachmentOutcome {
                            score: entry.score,
                            analysis: AnalysisDisposition::PartiallyApplied { reason },
                        }
                    }
                    None => {
                        entry.tracker.resolve(&ticket);
                        applied(entry)
                    }
                }
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    /// Attach an ownership-proof document to a detected asset and run the
    /// verification collaborator for it.
    pub async fn attach_ownership_proof(
        &self,
        session_id: &SessionId,
        asset_id: &str,
        file: FileHandle,
    ) -> Result<AttachmentOutcome, WizardServiceError> {
        let ticket = self.with_session(session_id, |entry| {
            let asset = entry
                .state
                .asset_mut(asset_id)
                .ok_or_else(|| WizardServiceError::UnknownAsset(asset_id.to_string()))?;
            asset.proof_document = Some(file.clone());
            asset.verification_passed = None;
            asset.verification_notes = None;
            Ok::<_, WizardServiceError>(
                entry
                    .tracker
                    .begin(AnalysisSlot::Ownership(asset_id.to_string())),
            )
        })??;

        let result = self
            .bounded(self.analyzers.verify_ownership(asset_id, &file))
            .await;

        self.with_session(session_id, |entry| match result {
            Ok(verdict) => {
                if !entry.tracker.resolve(&ticket) {
                    return superseded(entry);
                }
                if let Some(asset) = entry.state.asset_mut(asset_id) {
                    asset.verification_passed = Some(verdict.verification_passed);
                    asset.verification_notes = Some(verdict.notes);
                }
                applied(entry)
            }
            Err(error) => failed_or_superseded(entry, &ticket, error),
        })
    }

    /// Submit the finished application. The session must be on the review
    /// step with no analysis in flight; on success the session is terminal.
    pub async fn submit(
        &self,
        session_id: &SessionId,
    ) -> Result<ApplicationRecord, WizardServiceError> {
        let (wizard, ctx, state) = self.with_session(session_id, |entry| {
            if entry.tracker.any_in_flight() {
                return Err(WizardServiceError::AnalysisInFlight);
            }
            Ok((entry.wizard.clone(), entry.ctx.clone(), entry.state.clone()))
        })??;

        let record = self.assembler.submit(&wizard, &ctx, &state).await?;

        self.registry().remove(session_id);
        info!(
            application = %record.application_id.0,
            score = record.composite_score,
            "application submitted for review"
        );
        Ok(record)
    }

    /// Externalize the session as a draft record.
    pub fn save_draft(&self, session_id: &SessionId) -> Result<ApplicationId, WizardServiceError> {
        let record = self.with_session(session_id, |entry| {
            ApplicationRecord::draft(&entry.ctx, &entry.state)
        })?;
        let id = self.repository.upsert(record)?;
        Ok(id)
    }

    /// Start a fresh session seeded from the most recent draft saved under
    /// the given phone number.
    pub fn resume_draft(&self, phone: &str) -> Result<SessionView, WizardServiceError> {
        let mut drafts: Vec<ApplicationRecord> = self
            .repository
            .query_by_phone(phone)?
            .into_iter()
            .filter(|record| record.status == ApplicationStatus::Draft)
            .collect();
        drafts.sort_by(|a, b| a.application_id.0.cmp(&b.application_id.0));
        let draft = drafts.pop().ok_or(RepositoryError::NotFound)?;

        let session_id = next_session_id();
        let score = draft.composite_score;
        let entry = SessionEntry {
            ctx: AnalysisContext {
                owner_id: session_id.0.clone(),
                application_id: draft.application_id,
            },
            state: draft.state,
            wizard: WizardSession::new(),
            tracker: SlotTracker::default(),
            score,
        };
        let view = view_of(&session_id, &entry);
        self.registry().insert(session_id, entry);
        Ok(view)
    }

    // Staff-facing queries, passed through to the repository.

    pub fn application(
        &self,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, WizardServiceError> {
        let record = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub fn applications_by_phone(
        &self,
        phone: &str,
    ) -> Result<Vec<ApplicationRecord>, WizardServiceError> {
        Ok(self.repository.query_by_phone(phone)?)
    }

    pub fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, WizardServiceError> {
        Ok(self.repository.pending(limit)?)
    }
}

fn view_of(session_id: &SessionId, entry: &SessionEntry) -> SessionView {
    SessionView {
        session_id: session_id.clone(),
        application_id: entry.ctx.application_id.clone(),
        step: entry.wizard.current_step().label(),
        step_index: entry.wizard.current_step().index(),
        score: entry.score,
        sub_scores: entry.state.sub_scores,
        costs: entry.state.costs,
        analysis_in_flight: entry.tracker.any_in_flight(),
        analysis_slots: entry
            .tracker
            .statuses()
            .into_iter()
            .map(|(slot, status)| SlotView { slot, status })
            .collect(),
    }
}

fn applied(entry: &SessionEntry) -> AttachmentOutcome {
    AttachmentOutcome {
        score: entry.score,
        analysis: AnalysisDisposition::Applied,
    }
}

fn superseded(entry: &SessionEntry) -> AttachmentOutcome {
    AttachmentOutcome {
        score: entry.score,
        analysis: AnalysisDisposition::Superseded,
    }
}

fn failed_or_superseded(
    entry: &mut SessionEntry,
    ticket: &AnalysisTicket,
    error: AnalysisError,
) -> AttachmentOutcome {
    let reason = error.to_string();
    if entry.tracker.fail(ticket, reason.clone()) {
        warn!(slot = ?ticket.slot, %reason, "analysis failed, slot marked retryable");
        AttachmentOutcome {
            score: entry.score,
            analysis: AnalysisDisposition::Failed { reason },
        }
    } else {
        AttachmentOutcome {
            score: entry.score,
            analysis: AnalysisDisposition::Superseded,
        }
    }
}
