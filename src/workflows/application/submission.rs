//! Final submission: upload every pending document, assemble the persisted
//! record, and commit it atomically from the caller's point of view.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::warn;

use super::analysis::AnalysisContext;
use super::scoring::compute_score;
use super::state::{present, ApplicationId, ApplicationState, FileHandle};
use super::steps::WizardStep;
use super::wizard::WizardSession;

/// Categories the document store files uploads under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Prescription,
    DrugImage,
    BankStatement,
    MobileMoneyStatement,
    HomePhoto,
    BusinessPhoto,
    VehicleLogbook,
    TitleDeed,
    CallLog,
    GuarantorId,
    AssetImage,
    OwnershipProof,
}

/// Storage collaborator: upload a file, get back a stable URL.
pub trait DocumentStore: Send + Sync {
    fn store(
        &self,
        owner: &str,
        category: DocumentCategory,
        file: &FileHandle,
    ) -> impl Future<Output = Result<String, StorageError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("upload rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

/// The persisted application record: the full state plus document URLs and
/// review metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub phone_number: Option<String>,
    pub state: ApplicationState,
    pub status: ApplicationStatus,
    pub composite_score: u8,
    pub documents: BTreeMap<String, String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ApplicationRecord {
    /// Local draft snapshot of an in-progress session; no documents have been
    /// uploaded yet.
    pub fn draft(ctx: &AnalysisContext, state: &ApplicationState) -> Self {
        Self {
            application_id: ctx.application_id.clone(),
            phone_number: state.profile.phone_number.clone(),
            state: state.clone(),
            status: ApplicationStatus::Draft,
            composite_score: compute_score(state),
            documents: BTreeMap::new(),
            submitted_at: None,
        }
    }
}

/// Persistence collaborator for application records.
pub trait ApplicationRepository: Send + Sync {
    fn upsert(&self, record: ApplicationRecord) -> Result<ApplicationId, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn query_by_phone(&self, phone: &str) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("submission requires the review step, currently on '{0}'")]
    NotAtReview(&'static str),
    #[error("phone number missing from the application profile")]
    MissingPhone,
    #[error("upload failed for '{slot}': {source}")]
    Upload {
        slot: String,
        source: StorageError,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Uploads every non-null file slot and persists the assembled record with
/// status `pending`. A single failed upload fails the whole submission naming
/// the slot; no partial record is committed.
pub struct SubmissionAssembler<S, R> {
    store: Arc<S>,
    repository: Arc<R>,
}

impl<S, R> SubmissionAssembler<S, R>
where
    S: DocumentStore + 'static,
    R: ApplicationRepository + 'static,
{
    pub fn new(store: Arc<S>, repository: Arc<R>) -> Self {
        Self { store, repository }
    }

    pub async fn submit(
        &self,
        wizard: &WizardSession,
        ctx: &AnalysisContext,
        state: &ApplicationState,
    ) -> Result<ApplicationRecord, SubmissionError> {
        if wizard.current_step() != WizardStep::Review {
            return Err(SubmissionError::NotAtReview(
                wizard.current_step().label(),
            ));
        }
        if !present(&state.profile.phone_number) {
            return Err(SubmissionError::MissingPhone);
        }

        let plan = upload_plan(state);
        let mut uploads: JoinSet<(usize, Result<String, StorageError>)> = JoinSet::new();
        for (position, (_, category, file)) in plan.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let owner = ctx.owner_id.clone();
            let category = *category;
            let file = file.clone();
            uploads.spawn(async move { (position, store.store(&owner, category, &file).await) });
        }

        let mut urls: Vec<Option<String>> = vec![None; plan.len()];
        let mut failures: Vec<(usize, StorageError)> = Vec::new();
        while let Some(joined) = uploads.join_next().await {
            let (position, result) = joined.map_err(|err| SubmissionError::Upload {
                slot: "upload task".to_string(),
                source: StorageError::Unavailable(err.to_string()),
            })?;
            match result {
                Ok(url) => urls[position] = Some(url),
                Err(err) => failures.push((position, err)),
            }
        }

        // Report the first failure in plan order so retries are deterministic.
        if let Some((position, source)) = failures
            .into_iter()
            .min_by_key(|(position, _)| *position)
        {
            let slot = plan[position].0.clone();
            warn!(%slot, error = %source, "submission aborted, document upload failed");
            return Err(SubmissionError::Upload { slot, source });
        }

        let mut documents = BTreeMap::new();
        for ((label, _, _), url) in plan.into_iter().zip(urls.into_iter()) {
            if let Some(url) = url {
                documents.insert(label, url);
            }
        }

        let record = ApplicationRecord {
            application_id: ctx.application_id.clone(),
            phone_number: state.profile.phone_number.clone(),
            state: state.clone(),
            status: ApplicationStatus::Pending,
            composite_score: compute_score(state),
            documents,
            submitted_at: Some(Utc::now()),
        };

        self.repository.upsert(record.clone())?;
        Ok(record)
    }
}

/// Every file the state currently holds, with a stable label per slot.
fn upload_plan(state: &ApplicationState) -> Vec<(String, DocumentCategory, FileHandle)> {
    let mut plan = Vec::new();
    let uploads = &state.uploads;

    if let Some(file) = &uploads.prescription {
        plan.push((
            "prescription".to_string(),
            DocumentCategory::Prescription,
            file.clone(),
        ));
    }
    for (index, file) in uploads.drug_images.iter().enumerate() {
        plan.push((
            format!("drug_image_{}", index + 1),
            DocumentCategory::DrugImage,
            file.clone(),
        ));
    }
    if let Some(document) = &uploads.bank_statement {
        plan.push((
            "bank_statement".to_string(),
            DocumentCategory::BankStatement,
            document.file.clone(),
        ));
    }
    if let Some(document) = &uploads.mobile_money_statement {
        plan.push((
            "mobile_money_statement".to_string(),
            DocumentCategory::MobileMoneyStatement,
            document.file.clone(),
        ));
    }
    if let Some(file) = &uploads.home_photo {
        plan.push((
            "home_photo".to_string(),
            DocumentCategory::HomePhoto,
            file.clone(),
        ));
    }
    if let Some(file) = &uploads.business_photo {
        plan.push((
            "business_photo".to_string(),
            DocumentCategory::BusinessPhoto,
            file.clone(),
        ));
    }
    if let Some(file) = &uploads.vehicle_logbook {
        plan.push((
            "vehicle_logbook".to_string(),
            DocumentCategory::VehicleLogbook,
            file.clone(),
        ));
    }
    if let Some(file) = &uploads.title_deed {
        plan.push((
            "title_deed".to_string(),
            DocumentCategory::TitleDeed,
            file.clone(),
        ));
    }
    if let Some(file) = &uploads.call_log {
        plan.push((
            "call_log".to_string(),
            DocumentCategory::CallLog,
            file.clone(),
        ));
    }
    if let Some(file) = &state.guarantors.first_id {
        plan.push((
            "guarantor_1_id".to_string(),
            DocumentCategory::GuarantorId,
            file.clone(),
        ));
    }
    if let Some(file) = &state.guarantors.second_id {
        plan.push((
            "guarantor_2_id".to_string(),
            DocumentCategory::GuarantorId,
            file.clone(),
        ));
    }
    for (index, file) in uploads.indoor_asset_images.iter().enumerate() {
        plan.push((
            format!("indoor_asset_{}", index + 1),
            DocumentCategory::AssetImage,
            file.clone(),
        ));
    }
    for (index, file) in uploads.outdoor_asset_images.iter().enumerate() {
        plan.push((
            format!("outdoor_asset_{}", index + 1),
            DocumentCategory::AssetImage,
            file.clone(),
        ));
    }
    for asset in &state.detected_assets {
        if let Some(file) = &asset.proof_document {
            plan.push((
                format!("ownership_proof_{}", asset.asset_id),
                DocumentCategory::OwnershipProof,
                file.clone(),
            ));
        }
    }

    plan
}
