//! Progressive composite score over a partially filled application.
//!
//! Form completion can earn at most 40 of the 100 points; the remaining 60
//! come only from the four external analysis sub-scores, 15 points each.
//! The calculator is pure and callable at any point in the session.

use serde::Serialize;

use super::state::{present, ApplicationState, ScoreCategory};

pub const FORM_CONTRIBUTION_CAP: u8 = 40;
pub const ANALYSIS_CONTRIBUTION_CAP: u8 = 60;
pub const CATEGORY_WEIGHT: f32 = 15.0;

/// One form-completion check that earned points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormComponent {
    pub check: &'static str,
    pub points: u8,
}

/// One analysis category's weighted contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisComponent {
    pub category: ScoreCategory,
    pub sub_score: f32,
    pub points: u8,
}

/// Itemized view of the composite score, for display and audits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub form_components: Vec<FormComponent>,
    pub form_total: u8,
    pub analysis_components: Vec<AnalysisComponent>,
    pub analysis_total: u8,
    pub total: u8,
}

/// Composite score in [0,100]. Pure and deterministic; an empty state scores 0.
pub fn compute_score(state: &ApplicationState) -> u8 {
    score_breakdown(state).total
}

pub fn score_breakdown(state: &ApplicationState) -> ScoreBreakdown {
    let mut form_components = Vec::new();
    let mut form_sum: u16 = 0;
    let mut earn = |check: &'static str, points: u8, earned: bool| {
        if earned {
            form_components.push(FormComponent { check, points });
            form_sum += u16::from(points);
        }
    };

    let profile = &state.profile;
    earn("full name", 2, present(&profile.full_name));
    earn("id number", 2, present(&profile.id_number));
    earn("phone number", 2, present(&profile.phone_number));
    earn("occupation", 2, present(&profile.occupation));
    earn(
        "sex and age",
        2,
        profile.sex.is_some() && profile.age.is_some(),
    );

    let uploads = &state.uploads;
    earn("prescription", 3, uploads.prescription.is_some());
    earn("drug images", 3, !uploads.drug_images.is_empty());

    earn("asset images", 4, uploads.has_asset_image());
    earn(
        "logbook or title deed",
        2,
        uploads.vehicle_logbook.is_some() || uploads.title_deed.is_some(),
    );
    earn(
        "home or business photo",
        2,
        uploads.home_photo.is_some() || uploads.business_photo.is_some(),
    );

    earn(
        "mobile money statement",
        4,
        uploads.mobile_money_statement.is_some(),
    );
    earn("bank statement", 2, uploads.bank_statement.is_some());
    earn("call log", 2, uploads.call_log.is_some());

    let guarantors = &state.guarantors;
    earn("guarantor 1 phone", 2, present(&guarantors.first_phone));
    earn("guarantor 1 id", 2, guarantors.first_id.is_some());
    earn("guarantor 2 phone", 2, present(&guarantors.second_phone));
    earn("guarantor 2 id", 2, guarantors.second_id.is_some());

    let form_total = form_sum.min(u16::from(FORM_CONTRIBUTION_CAP)) as u8;

    let mut analysis_components = Vec::new();
    let mut analysis_sum: u16 = 0;
    for category in ScoreCategory::ALL {
        // A missing sub-score contributes nothing; it is not a zero result.
        let Some(raw) = state.sub_scores.get(category) else {
            continue;
        };
        let sub_score = raw.clamp(0.0, 100.0);
        let points = ((sub_score / 100.0) * CATEGORY_WEIGHT).round() as u8;
        analysis_components.push(AnalysisComponent {
            category,
            sub_score,
            points,
        });
        analysis_sum += u16::from(points);
    }
    let analysis_total = analysis_sum.min(u16::from(ANALYSIS_CONTRIBUTION_CAP)) as u8;

    // Both parts are already clamped; the outer clamp guards against a future
    // miscalibration of the weights.
    let total = (u16::from(form_total) + u16::from(analysis_total)).min(100) as u8;

    ScoreBreakdown {
        form_components,
        form_total,
        analysis_components,
        analysis_total,
        total,
    }
}
