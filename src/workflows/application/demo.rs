//! Deterministic in-process collaborators. These back the local `serve` and
//! `demo` runs and the integration tests; results depend only on the inputs,
//! never on wall-clock or randomness.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use super::analysis::{
    AnalysisContext, AnalysisError, AssetAnalyzer, AssetPortfolioScore, AssetScoreBreakdown,
    BankStatementAnalyzer, BankStatementFeatures, BankStatementReport, BehaviorAnalyzer,
    BehaviorDecision, BehaviorReport, CallStatistics, CreditRecommendation, IdentityCard,
    IdentityExtractor, MedicalAnalyzer, MedicalAssessment, OwnershipVerdict, OwnershipVerifier,
    RiskBand,
};
use super::service::{ApplicationWizardService, WizardConfig};
use super::state::{
    ApplicationId, AssetCondition, DetectedAsset, FileHandle, ProtectedDocument, Sex,
};
use super::submission::{
    ApplicationRecord, ApplicationRepository, ApplicationStatus, DocumentCategory, DocumentStore,
    RepositoryError, StorageError,
};

fn file_stem(file: &FileHandle) -> &str {
    file.file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&file.file_name)
}

/// One analyzer struct implementing the whole suite. Files whose names contain
/// `unreadable` are rejected, which is how tests and the demo script exercise
/// the failure paths.
#[derive(Debug, Default, Clone)]
pub struct DemoAnalyzers;

impl DemoAnalyzers {
    fn reject_unreadable(file: &FileHandle) -> Result<(), AnalysisError> {
        if file.file_name.contains("unreadable") {
            return Err(AnalysisError::Rejected(format!(
                "could not read '{}'",
                file.file_name
            )));
        }
        Ok(())
    }
}

impl IdentityExtractor for DemoAnalyzers {
    async fn extract_identity(&self, image: &FileHandle) -> Result<IdentityCard, AnalysisError> {
        Self::reject_unreadable(image)?;
        Ok(IdentityCard {
            full_name: "Amina Wanjiru".to_string(),
            id_number: format!("{:08}", image.bytes.len() * 7 + 10_000_019),
            date_of_birth: NaiveDate::from_ymd_opt(1992, 3, 14)
                .ok_or_else(|| AnalysisError::Rejected("bad date".to_string()))?,
            sex: Sex::Female,
        })
    }
}

impl MedicalAnalyzer for DemoAnalyzers {
    async fn assess_medical(
        &self,
        _ctx: &AnalysisContext,
        prescription: Option<&FileHandle>,
        drug_images: &[FileHandle],
    ) -> Result<MedicalAssessment, AnalysisError> {
        if let Some(file) = prescription {
            Self::reject_unreadable(file)?;
        }
        let evidence = usize::from(prescription.is_some()) + drug_images.len();
        if evidence == 0 {
            return Err(AnalysisError::Rejected(
                "no medical evidence supplied".to_string(),
            ));
        }
        let needs_score = (55 + evidence * 10).min(95) as f32;
        Ok(MedicalAssessment {
            needs_score,
            retail_cost: 12_500.0 + 1_000.0 * evidence as f64,
            credit_cost: 14_800.0 + 1_200.0 * evidence as f64,
        })
    }
}

impl BankStatementAnalyzer for DemoAnalyzers {
    async fn analyze_statement(
        &self,
        _ctx: &AnalysisContext,
        document: &ProtectedDocument,
    ) -> Result<BankStatementReport, AnalysisError> {
        Self::reject_unreadable(&document.file)?;
        let credit_score = 55.0 + (document.file.bytes.len() % 41) as f32;
        Ok(BankStatementReport {
            credit_score,
            recommendation: if credit_score >= 70.0 {
                CreditRecommendation::Favorable
            } else {
                CreditRecommendation::Conditional
            },
            features: BankStatementFeatures {
                average_monthly_inflow: 84_000.0,
                average_monthly_outflow: 61_500.0,
                bounced_payments: 0,
                months_covered: 6,
            },
        })
    }
}

impl AssetAnalyzer for DemoAnalyzers {
    async fn detect_assets(
        &self,
        _ctx: &AnalysisContext,
        image: &FileHandle,
    ) -> Result<Vec<DetectedAsset>, AnalysisError> {
        Self::reject_unreadable(image)?;
        let stem = file_stem(image);
        let lowered = stem.to_lowercase();
        let (name, condition, value, requires_proof) = if lowered.contains("hilux")
            || lowered.contains("vehicle")
            || lowered.contains("car")
        {
            ("Toyota Hilux", AssetCondition::Good, 1_450_000.0, true)
        } else if lowered.contains("plot") || lowered.contains("land") {
            ("Quarter-acre plot", AssetCondition::Good, 900_000.0, true)
        } else if lowered.contains("generator") {
            ("Diesel generator", AssetCondition::Fair, 85_000.0, true)
        } else if lowered.contains("tv") {
            ("Samsung television", AssetCondition::Good, 45_000.0, false)
        } else {
            ("Household furniture", AssetCondition::Fair, 18_000.0, false)
        };
        Ok(vec![DetectedAsset {
            asset_id: format!("asset-{stem}"),
            name: name.to_string(),
            confidence: 0.91,
            condition,
            estimated_value: value,
            requires_proof_of_ownership: requires_proof,
            proof_document: None,
            verification_passed: None,
            verification_notes: None,
        }])
    }

    async fn score_portfolio(
        &self,
        _ctx: &AnalysisContext,
        assets: &[DetectedAsset],
    ) -> Result<AssetPortfolioScore, AnalysisError> {
        if assets.is_empty() {
            return Err(AnalysisError::Rejected("empty portfolio".to_string()));
        }
        let score = (40 + assets.len() * 12).min(95) as f32;
        Ok(AssetPortfolioScore {
            score,
            risk: if score >= 70.0 {
                RiskBand::Low
            } else {
                RiskBand::Moderate
            },
            breakdown: AssetScoreBreakdown {
                verification_integrity: 80.0,
                asset_value: score,
                condition: 75.0,
                detection_confidence: 91.0,
                portfolio_diversity: (assets.len() * 20).min(100) as f32,
            },
        })
    }
}

impl OwnershipVerifier for DemoAnalyzers {
    async fn verify_ownership(
        &self,
        asset_id: &str,
        proof: &FileHandle,
    ) -> Result<OwnershipVerdict, AnalysisError> {
        Self::reject_unreadable(proof)?;
        if proof.file_name.contains("blurry") {
            return Ok(OwnershipVerdict {
                verification_passed: false,
                notes: format!("document for '{asset_id}' is illegible, re-upload a clear copy"),
            });
        }
        Ok(OwnershipVerdict {
            verification_passed: true,
            notes: format!("ownership of '{asset_id}' confirmed"),
        })
    }
}

impl BehaviorAnalyzer for DemoAnalyzers {
    async fn analyze_behavior(
        &self,
        _ctx: &AnalysisContext,
        call_log: &FileHandle,
    ) -> Result<BehaviorReport, AnalysisError> {
        Self::reject_unreadable(call_log)?;
        let score = 50.0 + (call_log.bytes.len() % 31) as f32;
        Ok(BehaviorReport {
            score,
            decision: if score >= 65.0 {
                BehaviorDecision::Approve
            } else {
                BehaviorDecision::Review
            },
            statistics: CallStatistics {
                contacts: 184,
                calls_per_day: 6.3,
                average_call_seconds: 94.0,
            },
        })
    }
}

/// Document store that keeps uploads in memory and hands back `memory://`
/// URLs. File names registered through `fail_on` make the upload fail, for
/// exercising the all-or-nothing submission path.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    uploads: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryDocumentStore {
    pub fn fail_on(&self, file_name: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file_name.into());
    }

    pub fn upload_count(&self) -> usize {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn store(
        &self,
        owner: &str,
        category: DocumentCategory,
        file: &FileHandle,
    ) -> Result<String, StorageError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if failing.contains(&file.file_name) {
            return Err(StorageError::Rejected(format!(
                "store refused '{}'",
                file.file_name
            )));
        }
        drop(failing);

        let url = format!("memory://{owner}/{category:?}/{}", file.file_name);
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((owner.to_string(), url.clone()));
        Ok(url)
    }
}

/// Application records held in a guarded map, keyed by application id.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: Mutex<HashMap<String, ApplicationRecord>>,
}

impl ApplicationRepository for InMemoryRepository {
    fn upsert(&self, record: ApplicationRecord) -> Result<ApplicationId, RepositoryError> {
        let id = record.application_id.clone();
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.0.clone(), record);
        Ok(id)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id.0)
            .cloned())
    }

    fn query_by_phone(&self, phone: &str) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matches: Vec<ApplicationRecord> = records
            .values()
            .filter(|record| record.phone_number.as_deref() == Some(phone))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.application_id.0.cmp(&b.application_id.0));
        Ok(matches)
    }

    fn pending(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut matches: Vec<ApplicationRecord> = records
            .values()
            .filter(|record| record.status == ApplicationStatus::Pending)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.application_id.0.cmp(&b.application_id.0));
        matches.truncate(limit);
        Ok(matches)
    }
}

pub type DemoWizardService =
    ApplicationWizardService<DemoAnalyzers, InMemoryDocumentStore, InMemoryRepository>;

/// Wire the wizard service with the in-memory collaborators.
pub fn demo_service(config: WizardConfig) -> Arc<DemoWizardService> {
    Arc::new(ApplicationWizardService::new(
        Arc::new(DemoAnalyzers),
        Arc::new(InMemoryDocumentStore::default()),
        Arc::new(InMemoryRepository::default()),
        config,
    ))
}
