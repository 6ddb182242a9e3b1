use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for in-progress wizard sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier wrapper for persisted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// A file the applicant attached during the session. Bytes are held until the
/// submission assembler hands them to the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl FileHandle {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }
}

/// A statement document that may be password protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedDocument {
    pub file: FileHandle,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn label(self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
        }
    }
}

/// Identity fields, optional until populated by the ID scan or manual entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub full_name: Option<String>,
    pub id_number: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub age: Option<u8>,
    pub phone_number: Option<String>,
    pub occupation: Option<String>,
}

/// Named upload slots. Each is independently nullable; presence of a value is
/// what the step gates check, regardless of analysis outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadSlots {
    pub prescription: Option<FileHandle>,
    pub drug_images: Vec<FileHandle>,
    pub bank_statement: Option<ProtectedDocument>,
    pub mobile_money_statement: Option<ProtectedDocument>,
    pub home_photo: Option<FileHandle>,
    pub business_photo: Option<FileHandle>,
    pub vehicle_logbook: Option<FileHandle>,
    pub title_deed: Option<FileHandle>,
    pub call_log: Option<FileHandle>,
    pub indoor_asset_images: Vec<FileHandle>,
    pub outdoor_asset_images: Vec<FileHandle>,
}

impl UploadSlots {
    pub fn has_asset_image(&self) -> bool {
        !self.indoor_asset_images.is_empty() || !self.outdoor_asset_images.is_empty()
    }
}

/// Non-exclusive collateral category tags selected by the applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralTag {
    Vehicle,
    Land,
    House,
    Business,
    Machinery,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuarantorFields {
    pub first_phone: Option<String>,
    pub second_phone: Option<String>,
    pub first_id: Option<FileHandle>,
    pub second_id: Option<FileHandle>,
    /// Name extracted from the guarantor ID scan, when analysis succeeded.
    pub first_id_name: Option<String>,
    pub second_id_name: Option<String>,
}

/// Monetary estimates populated by collaborator results, never user-entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimates {
    pub retail_cost: Option<f64>,
    pub credit_cost: Option<f64>,
    pub total_asset_value: Option<f64>,
}

/// The four independent analysis categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    MedicalNeeds,
    AssetValuation,
    BehaviorRisk,
    BankStatementCredit,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 4] = [
        ScoreCategory::MedicalNeeds,
        ScoreCategory::AssetValuation,
        ScoreCategory::BehaviorRisk,
        ScoreCategory::BankStatementCredit,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ScoreCategory::MedicalNeeds => "medical_needs",
            ScoreCategory::AssetValuation => "asset_valuation",
            ScoreCategory::BehaviorRisk => "behavior_risk",
            ScoreCategory::BankStatementCredit => "bank_statement_credit",
        }
    }
}

/// Sub-scores in [0,100]. `None` means not yet analyzed; a value is only ever
/// replaced by a fresh analysis of the same category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub medical_needs: Option<f32>,
    pub asset_valuation: Option<f32>,
    pub behavior_risk: Option<f32>,
    pub bank_statement_credit: Option<f32>,
}

impl SubScores {
    pub fn get(&self, category: ScoreCategory) -> Option<f32> {
        match category {
            ScoreCategory::MedicalNeeds => self.medical_needs,
            ScoreCategory::AssetValuation => self.asset_valuation,
            ScoreCategory::BehaviorRisk => self.behavior_risk,
            ScoreCategory::BankStatementCredit => self.bank_statement_credit,
        }
    }

    /// Values are clamped to [0,100] so a misbehaving collaborator cannot push
    /// an out-of-range number into the state.
    pub fn set(&mut self, category: ScoreCategory, value: f32) {
        let value = value.clamp(0.0, 100.0);
        match category {
            ScoreCategory::MedicalNeeds => self.medical_needs = Some(value),
            ScoreCategory::AssetValuation => self.asset_valuation = Some(value),
            ScoreCategory::BehaviorRisk => self.behavior_risk = Some(value),
            ScoreCategory::BankStatementCredit => self.bank_statement_credit = Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCondition {
    New,
    Good,
    Fair,
    Poor,
}

/// An asset reported by the detection collaborator, together with the proof
/// and verification status tracked for the collateral sub-gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedAsset {
    pub asset_id: String,
    pub name: String,
    pub confidence: f32,
    pub condition: AssetCondition,
    pub estimated_value: f64,
    pub requires_proof_of_ownership: bool,
    #[serde(default)]
    pub proof_document: Option<FileHandle>,
    #[serde(default)]
    pub verification_passed: Option<bool>,
    #[serde(default)]
    pub verification_notes: Option<String>,
}

impl DetectedAsset {
    pub fn proof_verified(&self) -> bool {
        self.proof_document.is_some() && self.verification_passed == Some(true)
    }
}

/// The single mutable aggregate owned by a wizard session. Created at session
/// start, mutated by the controller and analysis-result handlers, discarded on
/// submission or abandonment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub profile: ProfileFields,
    pub uploads: UploadSlots,
    pub collateral_tags: BTreeSet<CollateralTag>,
    pub guarantors: GuarantorFields,
    pub costs: CostEstimates,
    pub sub_scores: SubScores,
    pub detected_assets: Vec<DetectedAsset>,
}

impl ApplicationState {
    pub fn asset(&self, asset_id: &str) -> Option<&DetectedAsset> {
        self.detected_assets
            .iter()
            .find(|asset| asset.asset_id == asset_id)
    }

    pub fn asset_mut(&mut self, asset_id: &str) -> Option<&mut DetectedAsset> {
        self.detected_assets
            .iter_mut()
            .find(|asset| asset.asset_id == asset_id)
    }
}

/// Returns `true` when an optional text field carries a non-blank value.
pub(crate) fn present(field: &Option<String>) -> bool {
    field
        .as_deref()
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

/// Calendar-correct age derivation: years since birth, decremented when the
/// birthday has not yet occurred this year.
pub fn derive_age(date_of_birth: NaiveDate, today: NaiveDate) -> u8 {
    let mut age = today.year() - date_of_birth.year();
    let birthday_passed = (today.month(), today.day()) >= (date_of_birth.month(), date_of_birth.day());
    if !birthday_passed {
        age -= 1;
    }
    age.clamp(0, u8::MAX as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn derive_age_counts_completed_years_only() {
        let dob = date(1990, 6, 15);
        assert_eq!(derive_age(dob, date(2026, 6, 14)), 35);
        assert_eq!(derive_age(dob, date(2026, 6, 15)), 36);
        assert_eq!(derive_age(dob, date(2026, 6, 16)), 36);
    }

    #[test]
    fn derive_age_never_goes_negative() {
        let dob = date(2030, 1, 1);
        assert_eq!(derive_age(dob, date(2026, 8, 26)), 0);
    }

    #[test]
    fn sub_scores_clamp_out_of_range_values() {
        let mut scores = SubScores::default();
        scores.set(ScoreCategory::BankStatementCredit, 140.0);
        scores.set(ScoreCategory::BehaviorRisk, -12.0);
        assert_eq!(scores.bank_statement_credit, Some(100.0));
        assert_eq!(scores.behavior_risk, Some(0.0));
    }

    #[test]
    fn present_rejects_blank_strings() {
        assert!(!present(&None));
        assert!(!present(&Some("   ".to_string())));
        assert!(present(&Some("0712 000 111".to_string())));
    }

    #[test]
    fn proof_verified_requires_both_document_and_pass() {
        let mut asset = DetectedAsset {
            asset_id: "asset-1".to_string(),
            name: "Toyota Hilux".to_string(),
            confidence: 0.93,
            condition: AssetCondition::Good,
            estimated_value: 1_450_000.0,
            requires_proof_of_ownership: true,
            proof_document: None,
            verification_passed: None,
            verification_notes: None,
        };
        assert!(!asset.proof_verified());

        asset.proof_document = Some(FileHandle::new("logbook.pdf", "application/pdf", vec![1]));
        assert!(!asset.proof_verified());

        asset.verification_passed = Some(true);
        assert!(asset.proof_verified());
    }
}
