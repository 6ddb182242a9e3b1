use std::sync::Arc;
use std::time::Duration;

use crate::workflows::application::service::{DocumentAttachment, WizardServiceError};
use crate::workflows::application::submission::{
    ApplicationRepository, ApplicationStatus, SubmissionError,
};

use super::common::{file, harness, harness_with, session_at_review, BankPlan, MockAnalyzers};

#[tokio::test]
async fn submit_is_refused_before_the_review_step() {
    let harness = harness();
    let session = harness.service.start_session().session_id;

    let error = harness
        .service
        .submit(&session)
        .await
        .expect_err("still on the first step");
    assert!(matches!(
        error,
        WizardServiceError::Submission(SubmissionError::NotAtReview("profile"))
    ));
}

#[tokio::test]
async fn successful_submission_uploads_everything_and_closes_the_session() {
    let harness = harness();
    let (session, view) = session_at_review(&harness).await;

    let record = harness.service.submit(&session).await.expect("submits");

    assert_eq!(record.status, ApplicationStatus::Pending);
    assert_eq!(record.composite_score, view.score);
    assert!(record.submitted_at.is_some());
    assert!(record.documents.contains_key("prescription"));
    assert!(record.documents.contains_key("mobile_money_statement"));
    assert!(record.documents.contains_key("indoor_asset_1"));
    assert_eq!(harness.store.upload_count(), record.documents.len());

    let persisted = harness
        .repository
        .fetch(&record.application_id)
        .expect("repository reachable")
        .expect("record persisted");
    assert_eq!(persisted.status, ApplicationStatus::Pending);

    // The session is terminal after a successful submission.
    assert!(matches!(
        harness.service.session(&session),
        Err(WizardServiceError::UnknownSession)
    ));
}

#[tokio::test]
async fn submitted_records_reload_by_phone_with_scores_and_urls_intact() {
    let harness = harness();
    let (session, _) = session_at_review(&harness).await;

    // A late bank statement adds a third sub-score before submission.
    harness
        .service
        .attach_document(
            &session,
            DocumentAttachment::BankStatement {
                file: file("bank.pdf"),
                password: None,
            },
        )
        .await
        .expect("bank statement attaches");

    let record = harness.service.submit(&session).await.expect("submits");
    assert_eq!(record.state.sub_scores.medical_needs, Some(80.0));
    assert_eq!(record.state.sub_scores.asset_valuation, Some(70.0));
    assert_eq!(record.state.sub_scores.bank_statement_credit, Some(72.0));

    let reloaded = harness
        .service
        .applications_by_phone("0712000111")
        .expect("query by phone");
    assert_eq!(reloaded.len(), 1);
    let reloaded = &reloaded[0];
    assert_eq!(reloaded.application_id, record.application_id);
    assert_eq!(reloaded.composite_score, record.composite_score);
    assert_eq!(reloaded.state.sub_scores, record.state.sub_scores);
    assert_eq!(reloaded.documents, record.documents);
    assert!(reloaded.documents.contains_key("bank_statement"));
}

#[tokio::test]
async fn one_failed_upload_aborts_the_whole_submission() {
    let harness = harness();
    let (session, view) = session_at_review(&harness).await;
    harness.store.fail_on("mpesa.pdf");

    let error = harness
        .service
        .submit(&session)
        .await
        .expect_err("upload failure aborts");
    let WizardServiceError::Submission(SubmissionError::Upload { slot, .. }) = error else {
        panic!("expected an upload error");
    };
    assert_eq!(slot, "mobile_money_statement");

    // Nothing was committed and the session survives for a retry.
    assert!(harness
        .repository
        .fetch(&view.application_id)
        .expect("repository reachable")
        .is_none());
    assert!(harness.service.session(&session).is_ok());
}

#[tokio::test]
async fn submission_waits_for_in_flight_analysis() {
    let analyzers = MockAnalyzers::default();
    let (slow_plan, release) = BankPlan::gated(68.0);
    analyzers.push_bank_plan(slow_plan);
    let harness = harness_with(analyzers);
    let (session, _) = session_at_review(&harness).await;

    let service = Arc::clone(&harness.service);
    let slow_session = session.clone();
    let pending = tokio::spawn(async move {
        service
            .attach_document(
                &slow_session,
                DocumentAttachment::BankStatement {
                    file: file("bank.pdf"),
                    password: None,
                },
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let error = harness
        .service
        .submit(&session)
        .await
        .expect_err("analysis still in flight");
    assert!(matches!(error, WizardServiceError::AnalysisInFlight));

    release.send(()).expect("release the analysis");
    pending
        .await
        .expect("task joins")
        .expect("analysis completes");

    let record = harness.service.submit(&session).await.expect("submits now");
    assert_eq!(record.state.sub_scores.bank_statement_credit, Some(68.0));
}

#[tokio::test]
async fn drafts_can_be_saved_and_resumed_by_phone_number() {
    let harness = harness();
    let (session, view) = session_at_review(&harness).await;

    let application_id = harness.service.save_draft(&session).expect("draft saves");
    assert_eq!(application_id, view.application_id);

    let persisted = harness
        .repository
        .fetch(&application_id)
        .expect("repository reachable")
        .expect("draft persisted");
    assert_eq!(persisted.status, ApplicationStatus::Draft);
    assert!(persisted.documents.is_empty());

    let resumed = harness
        .service
        .resume_draft("0712000111")
        .expect("draft resumes");
    assert_eq!(resumed.application_id, view.application_id);
    assert_eq!(resumed.score, view.score);
    assert_ne!(resumed.session_id, session);
}

#[tokio::test]
async fn resuming_without_a_draft_reports_not_found() {
    let harness = harness();
    let error = harness
        .service
        .resume_draft("0700000000")
        .expect_err("nothing saved");
    assert!(matches!(
        error,
        WizardServiceError::Repository(
            crate::workflows::application::submission::RepositoryError::NotFound
        )
    ));
}
