//! Credit application wizard: six gated steps of intake, progressive scoring
//! fed by asynchronous document analysis, and all-or-nothing submission.
//!
//! The wizard session is the unit of orchestration. Form input and analysis
//! results both funnel through [`service::ApplicationWizardService`], which
//! recomputes the composite score after every merge and discards stale
//! analysis results by sequence number.

pub mod analysis;
pub mod collateral;
pub mod demo;
pub mod router;
pub mod scoring;
pub mod service;
pub mod state;
pub mod steps;
pub mod submission;
pub mod wizard;

#[cfg(test)]
mod tests;

pub use analysis::{
    AnalysisContext, AnalysisError, AnalysisSlot, AnalysisSuite, SlotStatus, SlotTracker,
};
pub use collateral::{classify_asset, required_proof, AssetCategory, ProofDocumentKind};
pub use router::application_router;
pub use scoring::{compute_score, score_breakdown, ScoreBreakdown};
pub use service::{
    AnalysisDisposition, ApplicationWizardService, AssetPlacement, AttachmentOutcome,
    DocumentAttachment, SessionView, SlotView, StatePatch, WizardConfig, WizardServiceError,
};
pub use state::{
    derive_age, ApplicationId, ApplicationState, CollateralTag, DetectedAsset, FileHandle,
    ProtectedDocument, ScoreCategory, SessionId, Sex, SubScores,
};
pub use steps::{MissingRequirement, WizardStep};
pub use submission::{
    ApplicationRecord, ApplicationRepository, ApplicationStatus, DocumentCategory, DocumentStore,
    RepositoryError, StorageError, SubmissionError,
};
pub use wizard::{GateRejection, WizardSession};
