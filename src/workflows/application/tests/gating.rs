use super::common::{completed_form_state, file, flagged_vehicle, protected};
use crate::workflows::application::collateral::ProofDocumentKind;
use crate::workflows::application::state::ApplicationState;
use crate::workflows::application::steps::{MissingRequirement, WizardStep};
use crate::workflows::application::wizard::WizardSession;

#[test]
fn advance_from_empty_profile_lists_every_missing_field() {
    let mut wizard = WizardSession::new();
    let state = ApplicationState::default();

    let rejection = wizard.advance(&state).expect_err("gate refuses");
    assert_eq!(rejection.step, WizardStep::Profile);
    assert_eq!(
        rejection.missing,
        vec![
            MissingRequirement::FullName,
            MissingRequirement::PhoneNumber,
            MissingRequirement::Occupation,
        ]
    );
    assert_eq!(wizard.current_step(), WizardStep::Profile);
}

#[test]
fn advance_walks_forward_once_requirements_hold() {
    let mut wizard = WizardSession::new();
    let state = completed_form_state();

    assert_eq!(wizard.advance(&state).expect("profile"), WizardStep::Medical);
    assert_eq!(
        wizard.advance(&state).expect("medical"),
        WizardStep::Collateral
    );
    assert_eq!(
        wizard.advance(&state).expect("collateral"),
        WizardStep::Verification
    );
    assert_eq!(
        wizard.advance(&state).expect("verification"),
        WizardStep::Guarantors
    );
    assert_eq!(
        wizard.advance(&state).expect("guarantors"),
        WizardStep::Review
    );
    // Terminal step: advance is a no-op.
    assert_eq!(wizard.advance(&state).expect("review"), WizardStep::Review);
}

#[test]
fn back_is_unconditional_and_stops_at_the_first_step() {
    let mut wizard = WizardSession::new();
    let state = completed_form_state();
    wizard.advance(&state).expect("profile");
    wizard.advance(&state).expect("medical");

    assert_eq!(wizard.back(), WizardStep::Medical);
    assert_eq!(wizard.back(), WizardStep::Profile);
    assert_eq!(wizard.back(), WizardStep::Profile);
}

#[test]
fn backward_jump_skips_gates_forward_jump_checks_them() {
    let state = completed_form_state();
    let mut wizard = WizardSession::new();
    for _ in 0..4 {
        wizard.advance(&state).expect("walk forward");
    }
    assert_eq!(wizard.current_step(), WizardStep::Guarantors);

    // Backward to the start regardless of state.
    wizard
        .jump_to(WizardStep::Profile, &ApplicationState::default())
        .expect("backward jump is unconditional");
    assert_eq!(wizard.current_step(), WizardStep::Profile);

    // Forward jump across incomplete steps names the first failing one.
    let mut empty_medical = completed_form_state();
    empty_medical.uploads.prescription = None;
    empty_medical.uploads.drug_images.clear();
    let rejection = wizard
        .jump_to(WizardStep::Verification, &empty_medical)
        .expect_err("medical gate blocks the jump");
    assert_eq!(rejection.step, WizardStep::Medical);
    assert_eq!(wizard.current_step(), WizardStep::Profile);

    wizard
        .jump_to(WizardStep::Review, &state)
        .expect("forward jump with complete state");
    assert_eq!(wizard.current_step(), WizardStep::Review);
}

#[test]
fn medical_step_accepts_either_prescription_or_drug_images() {
    let mut state = ApplicationState::default();
    assert_eq!(
        WizardStep::Medical.missing_requirements(&state),
        vec![MissingRequirement::MedicalEvidence]
    );

    state.uploads.drug_images.push(file("drugs.jpg"));
    assert!(WizardStep::Medical.is_satisfied(&state));

    state.uploads.drug_images.clear();
    state.uploads.prescription = Some(file("prescription.jpg"));
    assert!(WizardStep::Medical.is_satisfied(&state));
}

#[test]
fn collateral_step_demands_proof_for_flagged_vehicles() {
    let mut state = ApplicationState::default();
    state.uploads.outdoor_asset_images.push(file("hilux.jpg"));
    state.detected_assets.push(flagged_vehicle("asset-1"));

    let missing = WizardStep::Collateral.missing_requirements(&state);
    assert_eq!(
        missing,
        vec![MissingRequirement::OwnershipProof {
            asset_id: "asset-1".to_string(),
            asset_name: "Toyota Hilux".to_string(),
            required: ProofDocumentKind::VehicleLogbook,
        }]
    );

    // An uploaded but unverified document keeps the gate closed.
    state.detected_assets[0].proof_document = Some(file("logbook.pdf"));
    assert!(!WizardStep::Collateral.is_satisfied(&state));

    state.detected_assets[0].verification_passed = Some(true);
    assert!(WizardStep::Collateral.is_satisfied(&state));
}

#[test]
fn flagged_but_unclassifiable_assets_are_exempt_from_the_sub_gate() {
    let mut state = ApplicationState::default();
    state.uploads.indoor_asset_images.push(file("item.jpg"));
    let mut asset = flagged_vehicle("asset-2");
    asset.name = "Antique chess set".to_string();
    state.detected_assets.push(asset);

    assert!(WizardStep::Collateral.is_satisfied(&state));
}

#[test]
fn verification_step_requires_mobile_money_and_first_guarantor_phone() {
    let mut state = ApplicationState::default();
    assert_eq!(
        WizardStep::Verification.missing_requirements(&state),
        vec![
            MissingRequirement::MobileMoneyStatement,
            MissingRequirement::GuarantorOnePhone,
        ]
    );

    state.uploads.mobile_money_statement = Some(protected("mpesa.pdf"));
    assert_eq!(
        WizardStep::Verification.missing_requirements(&state),
        vec![MissingRequirement::GuarantorOnePhone]
    );

    state.guarantors.first_phone = Some("0722000333".to_string());
    assert!(WizardStep::Verification.is_satisfied(&state));
}

#[test]
fn review_step_has_no_requirements_of_its_own() {
    assert!(WizardStep::Review.is_satisfied(&ApplicationState::default()));
}

#[test]
fn step_indices_are_one_based_and_round_trip() {
    for (position, step) in WizardStep::ORDERED.iter().enumerate() {
        assert_eq!(step.index(), position + 1);
        assert_eq!(WizardStep::from_index(step.index()), Some(*step));
    }
    assert_eq!(WizardStep::from_index(0), None);
    assert_eq!(WizardStep::from_index(7), None);
}
