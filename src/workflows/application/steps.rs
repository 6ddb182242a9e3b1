//! Ordered wizard steps and their required-field predicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::collateral::{outstanding_proofs, ProofDocumentKind};
use super::state::{present, ApplicationState};

/// The six steps of the application wizard, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Profile,
    Medical,
    Collateral,
    Verification,
    Guarantors,
    Review,
}

impl WizardStep {
    pub const ORDERED: [WizardStep; 6] = [
        WizardStep::Profile,
        WizardStep::Medical,
        WizardStep::Collateral,
        WizardStep::Verification,
        WizardStep::Guarantors,
        WizardStep::Review,
    ];

    /// 1-based position, matching how the wizard is presented to the user.
    pub fn index(self) -> usize {
        match self {
            WizardStep::Profile => 1,
            WizardStep::Medical => 2,
            WizardStep::Collateral => 3,
            WizardStep::Verification => 4,
            WizardStep::Guarantors => 5,
            WizardStep::Review => 6,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        if (1..=Self::ORDERED.len()).contains(&index) {
            Some(Self::ORDERED[index - 1])
        } else {
            None
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardStep::Profile => "profile",
            WizardStep::Medical => "medical",
            WizardStep::Collateral => "collateral",
            WizardStep::Verification => "verification",
            WizardStep::Guarantors => "guarantors",
            WizardStep::Review => "review",
        }
    }

    /// Requirements of this step that the state does not yet satisfy. An empty
    /// list means forward navigation out of this step is permitted.
    pub fn missing_requirements(self, state: &ApplicationState) -> Vec<MissingRequirement> {
        let mut missing = Vec::new();
        match self {
            WizardStep::Profile => {
                if !present(&state.profile.full_name) {
                    missing.push(MissingRequirement::FullName);
                }
                if !present(&state.profile.phone_number) {
                    missing.push(MissingRequirement::PhoneNumber);
                }
                if !present(&state.profile.occupation) {
                    missing.push(MissingRequirement::Occupation);
                }
            }
            WizardStep::Medical => {
                let has_evidence = state.uploads.prescription.is_some()
                    || !state.uploads.drug_images.is_empty();
                if !has_evidence {
                    missing.push(MissingRequirement::MedicalEvidence);
                }
            }
            WizardStep::Collateral => {
                if !state.uploads.has_asset_image() {
                    missing.push(MissingRequirement::AssetImage);
                }
                for (asset, kind) in outstanding_proofs(state) {
                    missing.push(MissingRequirement::OwnershipProof {
                        asset_id: asset.asset_id.clone(),
                        asset_name: asset.name.clone(),
                        required: kind,
                    });
                }
            }
            WizardStep::Verification => {
                if state.uploads.mobile_money_statement.is_none() {
                    missing.push(MissingRequirement::MobileMoneyStatement);
                }
                if !present(&state.guarantors.first_phone) {
                    missing.push(MissingRequirement::GuarantorOnePhone);
                }
            }
            WizardStep::Guarantors => {
                if !present(&state.guarantors.first_phone) {
                    missing.push(MissingRequirement::GuarantorOnePhone);
                }
            }
            // Review is terminal; submission is the exit action.
            WizardStep::Review => {}
        }
        missing
    }

    pub fn is_satisfied(self, state: &ApplicationState) -> bool {
        self.missing_requirements(state).is_empty()
    }
}

/// A single unmet requirement, suitable for inline display next to the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissingRequirement {
    FullName,
    PhoneNumber,
    Occupation,
    MedicalEvidence,
    AssetImage,
    OwnershipProof {
        asset_id: String,
        asset_name: String,
        required: ProofDocumentKind,
    },
    MobileMoneyStatement,
    GuarantorOnePhone,
}

impl fmt::Display for MissingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRequirement::FullName => write!(f, "full name is required"),
            MissingRequirement::PhoneNumber => write!(f, "phone number is required"),
            MissingRequirement::Occupation => write!(f, "occupation is required"),
            MissingRequirement::MedicalEvidence => {
                write!(f, "upload a prescription or at least one drug image")
            }
            MissingRequirement::AssetImage => {
                write!(f, "upload at least one asset image")
            }
            MissingRequirement::OwnershipProof {
                asset_name,
                required,
                ..
            } => write!(
                f,
                "'{asset_name}' needs a verified {}",
                required.label()
            ),
            MissingRequirement::MobileMoneyStatement => {
                write!(f, "mobile money statement is required")
            }
            MissingRequirement::GuarantorOnePhone => {
                write!(f, "first guarantor phone number is required")
            }
        }
    }
}
