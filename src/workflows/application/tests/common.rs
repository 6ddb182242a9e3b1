use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tokio::sync::oneshot;

use crate::workflows::application::analysis::{
    AnalysisContext, AnalysisError, AssetAnalyzer, AssetPortfolioScore, AssetScoreBreakdown,
    BankStatementAnalyzer, BankStatementFeatures, BankStatementReport, BehaviorAnalyzer,
    BehaviorDecision, BehaviorReport, CallStatistics, CreditRecommendation, IdentityCard,
    IdentityExtractor, MedicalAnalyzer, MedicalAssessment, OwnershipVerdict, OwnershipVerifier,
    RiskBand,
};
use crate::workflows::application::demo::{InMemoryDocumentStore, InMemoryRepository};
use crate::workflows::application::service::{
    ApplicationWizardService, AssetPlacement, DocumentAttachment, SessionView, StatePatch,
    WizardConfig,
};
use crate::workflows::application::state::{
    ApplicationState, AssetCondition, DetectedAsset, FileHandle, ProtectedDocument, SessionId, Sex,
};

pub(super) type MockService =
    ApplicationWizardService<MockAnalyzers, InMemoryDocumentStore, InMemoryRepository>;

pub(super) fn file(name: &str) -> FileHandle {
    FileHandle::new(name, "application/octet-stream", vec![0xAB; 64])
}

pub(super) fn protected(name: &str) -> ProtectedDocument {
    ProtectedDocument {
        file: file(name),
        password: None,
    }
}

pub(super) fn flagged_vehicle(asset_id: &str) -> DetectedAsset {
    DetectedAsset {
        asset_id: asset_id.to_string(),
        name: "Toyota Hilux".to_string(),
        confidence: 0.93,
        condition: AssetCondition::Good,
        estimated_value: 1_450_000.0,
        requires_proof_of_ownership: true,
        proof_document: None,
        verification_passed: None,
        verification_notes: None,
    }
}

/// A state satisfying every form-completion check, with no analysis results.
pub(super) fn completed_form_state() -> ApplicationState {
    let mut state = ApplicationState::default();
    state.profile.full_name = Some("Grace Njeri".to_string());
    state.profile.id_number = Some("30112204".to_string());
    state.profile.date_of_birth = NaiveDate::from_ymd_opt(1991, 5, 2);
    state.profile.sex = Some(Sex::Female);
    state.profile.age = Some(35);
    state.profile.phone_number = Some("0712000111".to_string());
    state.profile.occupation = Some("Tailor".to_string());

    state.uploads.prescription = Some(file("prescription.jpg"));
    state.uploads.drug_images.push(file("drugs.jpg"));
    state.uploads.bank_statement = Some(protected("bank.pdf"));
    state.uploads.mobile_money_statement = Some(protected("mpesa.pdf"));
    state.uploads.home_photo = Some(file("home.jpg"));
    state.uploads.business_photo = Some(file("shop.jpg"));
    state.uploads.vehicle_logbook = Some(file("logbook.pdf"));
    state.uploads.title_deed = Some(file("deed.pdf"));
    state.uploads.call_log = Some(file("calls.json"));
    state.uploads.indoor_asset_images.push(file("tv.jpg"));
    state.uploads.outdoor_asset_images.push(file("hilux.jpg"));

    state.guarantors.first_phone = Some("0722000333".to_string());
    state.guarantors.second_phone = Some("0733000444".to_string());
    state.guarantors.first_id = Some(file("g1.jpg"));
    state.guarantors.second_id = Some(file("g2.jpg"));

    state
}

/// One planned response of the mock bank-statement analyzer. `release` delays
/// the call until the sender side fires, which lets tests interleave two
/// in-flight calls deterministically.
pub(super) struct BankPlan {
    pub release: Option<oneshot::Receiver<()>>,
    pub result: Result<f32, AnalysisError>,
}

impl BankPlan {
    pub(super) fn ok(score: f32) -> Self {
        Self {
            release: None,
            result: Ok(score),
        }
    }

    pub(super) fn err(error: AnalysisError) -> Self {
        Self {
            release: None,
            result: Err(error),
        }
    }

    pub(super) fn gated(score: f32) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                release: Some(rx),
                result: Ok(score),
            },
            tx,
        )
    }
}

/// Scripted analysis suite. Every result is deterministic; the bank analyzer
/// consumes plans in order and the asset detector answers by file name.
pub(super) struct MockAnalyzers {
    pub bank_plans: Mutex<VecDeque<BankPlan>>,
    pub medical_score: f32,
    pub behavior_score: f32,
    pub portfolio_score: f32,
    pub detections: Mutex<HashMap<String, Vec<DetectedAsset>>>,
    pub detect_failures: Mutex<HashSet<String>>,
    pub ownership_passes: bool,
}

impl Default for MockAnalyzers {
    fn default() -> Self {
        Self {
            bank_plans: Mutex::new(VecDeque::new()),
            medical_score: 80.0,
            behavior_score: 60.0,
            portfolio_score: 70.0,
            detections: Mutex::new(HashMap::new()),
            detect_failures: Mutex::new(HashSet::new()),
            ownership_passes: true,
        }
    }
}

impl MockAnalyzers {
    pub(super) fn push_bank_plan(&self, plan: BankPlan) {
        self.bank_plans
            .lock()
            .expect("bank plan mutex poisoned")
            .push_back(plan);
    }

    pub(super) fn detect_for(&self, file_name: &str, assets: Vec<DetectedAsset>) {
        self.detections
            .lock()
            .expect("detections mutex poisoned")
            .insert(file_name.to_string(), assets);
    }

    pub(super) fn fail_detection_for(&self, file_name: &str) {
        self.detect_failures
            .lock()
            .expect("detect failure mutex poisoned")
            .insert(file_name.to_string());
    }
}

impl IdentityExtractor for MockAnalyzers {
    async fn extract_identity(&self, _image: &FileHandle) -> Result<IdentityCard, AnalysisError> {
        Ok(IdentityCard {
            full_name: "Grace Njeri".to_string(),
            id_number: "30112204".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 5, 2).expect("valid date"),
            sex: Sex::Female,
        })
    }
}

impl MedicalAnalyzer for MockAnalyzers {
    async fn assess_medical(
        &self,
        _ctx: &AnalysisContext,
        _prescription: Option<&FileHandle>,
        _drug_images: &[FileHandle],
    ) -> Result<MedicalAssessment, AnalysisError> {
        Ok(MedicalAssessment {
            needs_score: self.medical_score,
            retail_cost: 10_000.0,
            credit_cost: 12_000.0,
        })
    }
}

impl BankStatementAnalyzer for MockAnalyzers {
    async fn analyze_statement(
        &self,
        _ctx: &AnalysisContext,
        _document: &ProtectedDocument,
    ) -> Result<BankStatementReport, AnalysisError> {
        let plan = self
            .bank_plans
            .lock()
            .expect("bank plan mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| BankPlan::ok(72.0));
        if let Some(release) = plan.release {
            release.await.expect("release sender dropped");
        }
        let credit_score = plan.result?;
        Ok(BankStatementReport {
            credit_score,
            recommendation: CreditRecommendation::Favorable,
            features: BankStatementFeatures {
                average_monthly_inflow: 90_000.0,
                average_monthly_outflow: 60_000.0,
                bounced_payments: 0,
                months_covered: 6,
            },
        })
    }
}

impl AssetAnalyzer for MockAnalyzers {
    async fn detect_assets(
        &self,
        _ctx: &AnalysisContext,
        image: &FileHandle,
    ) -> Result<Vec<DetectedAsset>, AnalysisError> {
        if self
            .detect_failures
            .lock()
            .expect("detect failure mutex poisoned")
            .contains(&image.file_name)
        {
            return Err(AnalysisError::Rejected(format!(
                "could not read '{}'",
                image.file_name
            )));
        }
        let scripted = self
            .detections
            .lock()
            .expect("detections mutex poisoned")
            .get(&image.file_name)
            .cloned();
        Ok(scripted.unwrap_or_else(|| {
            vec![DetectedAsset {
                asset_id: format!("asset-{}", image.file_name),
                name: "Sofa set".to_string(),
                confidence: 0.8,
                condition: AssetCondition::Good,
                estimated_value: 20_000.0,
                requires_proof_of_ownership: false,
                proof_document: None,
                verification_passed: None,
                verification_notes: None,
            }]
        }))
    }

    async fn score_portfolio(
        &self,
        _ctx: &AnalysisContext,
        _assets: &[DetectedAsset],
    ) -> Result<AssetPortfolioScore, AnalysisError> {
        Ok(AssetPortfolioScore {
            score: self.portfolio_score,
            risk: RiskBand::Low,
            breakdown: AssetScoreBreakdown {
                verification_integrity: 80.0,
                asset_value: self.portfolio_score,
                condition: 75.0,
                detection_confidence: 90.0,
                portfolio_diversity: 40.0,
            },
        })
    }
}

impl OwnershipVerifier for MockAnalyzers {
    async fn verify_ownership(
        &self,
        asset_id: &str,
        _proof: &FileHandle,
    ) -> Result<OwnershipVerdict, AnalysisError> {
        Ok(OwnershipVerdict {
            verification_passed: self.ownership_passes,
            notes: format!("checked '{asset_id}'"),
        })
    }
}

impl BehaviorAnalyzer for MockAnalyzers {
    async fn analyze_behavior(
        &self,
        _ctx: &AnalysisContext,
        _call_log: &FileHandle,
    ) -> Result<BehaviorReport, AnalysisError> {
        Ok(BehaviorReport {
            score: self.behavior_score,
            decision: BehaviorDecision::Approve,
            statistics: CallStatistics {
                contacts: 120,
                calls_per_day: 4.5,
                average_call_seconds: 80.0,
            },
        })
    }
}

pub(super) struct Harness {
    pub service: Arc<MockService>,
    pub analyzers: Arc<MockAnalyzers>,
    pub store: Arc<InMemoryDocumentStore>,
    pub repository: Arc<InMemoryRepository>,
}

pub(super) fn harness() -> Harness {
    harness_with(MockAnalyzers::default())
}

pub(super) fn harness_with(analyzers: MockAnalyzers) -> Harness {
    let analyzers = Arc::new(analyzers);
    let store = Arc::new(InMemoryDocumentStore::default());
    let repository = Arc::new(InMemoryRepository::default());
    let service = Arc::new(ApplicationWizardService::new(
        Arc::clone(&analyzers),
        Arc::clone(&store),
        Arc::clone(&repository),
        WizardConfig::default(),
    ));
    Harness {
        service,
        analyzers,
        store,
        repository,
    }
}

/// Drive a fresh session through every step until it sits on review.
pub(super) async fn session_at_review(harness: &Harness) -> (SessionId, SessionView) {
    let service = &harness.service;
    let view = service.start_session();
    let session = view.session_id.clone();

    service
        .patch_fields(
            &session,
            StatePatch {
                full_name: Some("Grace Njeri".to_string()),
                id_number: Some("30112204".to_string()),
                phone_number: Some("0712000111".to_string()),
                occupation: Some("Tailor".to_string()),
                ..StatePatch::default()
            },
        )
        .expect("profile patch applies");
    service.advance(&session).expect("leave profile");

    service
        .attach_document(
            &session,
            DocumentAttachment::Prescription {
                file: file("prescription.jpg"),
            },
        )
        .await
        .expect("prescription attaches");
    service.advance(&session).expect("leave medical");

    service
        .attach_asset_images(&session, AssetPlacement::Indoor, vec![file("tv.jpg")])
        .await
        .expect("asset batch attaches");
    service.advance(&session).expect("leave collateral");

    service
        .attach_document(
            &session,
            DocumentAttachment::MobileMoneyStatement {
                file: file("mpesa.pdf"),
                password: None,
            },
        )
        .await
        .expect("mobile money attaches");
    service
        .patch_fields(
            &session,
            StatePatch {
                guarantor_one_phone: Some("0722000333".to_string()),
                ..StatePatch::default()
            },
        )
        .expect("guarantor phone applies");
    service.advance(&session).expect("leave verification");

    service.advance(&session).expect("leave guarantors");

    let view = service.session(&session).expect("session view");
    (session, view)
}
