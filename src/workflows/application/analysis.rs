//! Contracts for the external analysis collaborators and the per-slot
//! bookkeeping that reconciles their asynchronous results.

use std::collections::HashMap;
use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::state::{
    ApplicationId, AssetCondition, DetectedAsset, FileHandle, ProtectedDocument, Sex,
};

/// Identifiers every collaborator call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub owner_id: String,
    pub application_id: ApplicationId,
}

/// Failure of a collaborator call. Always retryable and slot-scoped; never
/// allowed to corrupt the application state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis service unreachable: {0}")]
    Unreachable(String),
    #[error("document rejected: {0}")]
    Rejected(String),
    #[error("analysis timed out after {0}s")]
    TimedOut(u64),
}

/// Structured fields extracted from an identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCard {
    pub full_name: String,
    pub id_number: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
}

/// Medical assessment over the prescription and drug images supplied so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalAssessment {
    pub needs_score: f32,
    pub retail_cost: f64,
    pub credit_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditRecommendation {
    Favorable,
    Conditional,
    Unfavorable,
}

/// Feature bundle the bank-statement analyzer reports alongside its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatementFeatures {
    pub average_monthly_inflow: f64,
    pub average_monthly_outflow: f64,
    pub bounced_payments: u32,
    pub months_covered: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankStatementReport {
    pub credit_score: f32,
    pub recommendation: CreditRecommendation,
    pub features: BankStatementFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    Elevated,
    High,
}

/// Sub-criterion breakdown of the aggregate asset score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetScoreBreakdown {
    pub verification_integrity: f32,
    pub asset_value: f32,
    pub condition: f32,
    pub detection_confidence: f32,
    pub portfolio_diversity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPortfolioScore {
    pub score: f32,
    pub risk: RiskBand,
    pub breakdown: AssetScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipVerdict {
    pub verification_passed: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorDecision {
    Approve,
    Review,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStatistics {
    pub contacts: u32,
    pub calls_per_day: f32,
    pub average_call_seconds: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorReport {
    pub score: f32,
    pub decision: BehaviorDecision,
    pub statistics: CallStatistics,
}

pub trait IdentityExtractor: Send + Sync {
    fn extract_identity(
        &self,
        image: &FileHandle,
    ) -> impl Future<Output = Result<IdentityCard, AnalysisError>> + Send;
}

pub trait MedicalAnalyzer: Send + Sync {
    fn assess_medical(
        &self,
        ctx: &AnalysisContext,
        prescription: Option<&FileHandle>,
        drug_images: &[FileHandle],
    ) -> impl Future<Output = Result<MedicalAssessment, AnalysisError>> + Send;
}

pub trait BankStatementAnalyzer: Send + Sync {
    fn analyze_statement(
        &self,
        ctx: &AnalysisContext,
        document: &ProtectedDocument,
    ) -> impl Future<Output = Result<BankStatementReport, AnalysisError>> + Send;
}

pub trait AssetAnalyzer: Send + Sync {
    /// Detect assets in a single image.
    fn detect_assets(
        &self,
        ctx: &AnalysisContext,
        image: &FileHandle,
    ) -> impl Future<Output = Result<Vec<DetectedAsset>, AnalysisError>> + Send;

    /// Score the whole portfolio of assets detected to date.
    fn score_portfolio(
        &self,
        ctx: &AnalysisContext,
        assets: &[DetectedAsset],
    ) -> impl Future<Output = Result<AssetPortfolioScore, AnalysisError>> + Send;
}

pub trait OwnershipVerifier: Send + Sync {
    fn verify_ownership(
        &self,
        asset_id: &str,
        proof: &FileHandle,
    ) -> impl Future<Output = Result<OwnershipVerdict, AnalysisError>> + Send;
}

pub trait BehaviorAnalyzer: Send + Sync {
    fn analyze_behavior(
        &self,
        ctx: &AnalysisContext,
        call_log: &FileHandle,
    ) -> impl Future<Output = Result<BehaviorReport, AnalysisError>> + Send;
}

/// The full set of analysis collaborators a wizard service is wired with.
pub trait AnalysisSuite:
    IdentityExtractor
    + MedicalAnalyzer
    + BankStatementAnalyzer
    + AssetAnalyzer
    + OwnershipVerifier
    + BehaviorAnalyzer
{
}

impl<T> AnalysisSuite for T where
    T: IdentityExtractor
        + MedicalAnalyzer
        + BankStatementAnalyzer
        + AssetAnalyzer
        + OwnershipVerifier
        + BehaviorAnalyzer
{
}

/// Keys for the independently tracked analysis slots. Ownership proofs are
/// tracked per detected asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSlot {
    Identity,
    GuarantorOneIdentity,
    GuarantorTwoIdentity,
    Medical,
    BankStatement,
    AssetBatch,
    Behavior,
    Ownership(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum SlotStatus {
    #[default]
    Idle,
    InFlight,
    Resolved,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    last_seq: u64,
    status: SlotStatus,
}

/// Ticket handed out when an analysis starts; resolving with a ticket whose
/// sequence number is no longer current discards the result as stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    pub slot: AnalysisSlot,
    pub seq: u64,
}

/// Per-slot loading/error bookkeeping with monotonic sequence numbers, so a
/// slow call for one slot can neither block nor corrupt another, and
/// out-of-order resolutions apply last-write-wins.
#[derive(Debug, Default)]
pub struct SlotTracker {
    slots: HashMap<AnalysisSlot, SlotState>,
}

impl SlotTracker {
    pub fn begin(&mut self, slot: AnalysisSlot) -> AnalysisTicket {
        let entry = self.slots.entry(slot.clone()).or_default();
        entry.last_seq += 1;
        entry.status = SlotStatus::InFlight;
        AnalysisTicket {
            slot,
            seq: entry.last_seq,
        }
    }

    pub fn is_current(&self, ticket: &AnalysisTicket) -> bool {
        self.slots
            .get(&ticket.slot)
            .map(|state| state.last_seq == ticket.seq)
            .unwrap_or(false)
    }

    /// Mark the slot resolved. Returns `false`, leaving the slot untouched,
    /// when the ticket has been superseded by a newer call.
    pub fn resolve(&mut self, ticket: &AnalysisTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        if let Some(state) = self.slots.get_mut(&ticket.slot) {
            state.status = SlotStatus::Resolved;
        }
        true
    }

    /// Mark the slot failed with a retryable reason. Stale tickets are
    /// discarded the same way as in `resolve`.
    pub fn fail(&mut self, ticket: &AnalysisTicket, reason: String) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        if let Some(state) = self.slots.get_mut(&ticket.slot) {
            state.status = SlotStatus::Failed(reason);
        }
        true
    }

    pub fn status(&self, slot: &AnalysisSlot) -> SlotStatus {
        self.slots
            .get(slot)
            .map(|state| state.status.clone())
            .unwrap_or_default()
    }

    pub fn any_in_flight(&self) -> bool {
        self.slots
            .values()
            .any(|state| state.status == SlotStatus::InFlight)
    }

    /// Snapshot of every slot's status, for the session view.
    pub fn statuses(&self) -> Vec<(AnalysisSlot, SlotStatus)> {
        let mut entries: Vec<(AnalysisSlot, SlotStatus)> = self
            .slots
            .iter()
            .map(|(slot, state)| (slot.clone(), state.status.clone()))
            .collect();
        entries.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
        entries
    }
}
