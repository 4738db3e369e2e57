use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::BloodType;

use super::{with_timeout, AiError, LlmClient, Prompt};

pub const DEFAULT_RADIUS_KM: f64 = 50.0;

const SYSTEM_PROMPT: &str = r#"You are an AI assistant designed to find suitable blood donors for patients in urgent need.
Consider factors such as distance, blood type compatibility, and any additional notes about the donors' health conditions or availability. Provide a suitability score from 0 to 100 for each donor based on how well they match the patient's needs.
Reply with a JSON object with a "suggestedDonors" array, where each element has "donorName" (string), "donorBloodType" (string), "distanceKm" (number), "contactInformation" (string), "suitabilityScore" (number) and optionally "additionalNotes" (string). Also include a "summary" string that summarizes the search results and any important considerations.
Sort "suggestedDonors" by suitabilityScore, highest first."#;

/// Matcher form as posted by the browser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchForm {
    #[serde(default)]
    pub patient_blood_type: String,
    #[serde(default)]
    pub patient_city: String,
    #[serde(default)]
    pub patient_needs: String,
    #[serde(default)]
    pub search_radius_km: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub patient_blood_type: String,
    pub patient_city: String,
    pub patient_needs: String,
    pub search_radius_km: f64,
}

impl MatchRequest {
    /// A blank radius falls back to the default.
    pub fn from_form(form: &MatchForm) -> Result<Self, AiError> {
        let blood_type: BloodType = form
            .patient_blood_type
            .trim()
            .parse()
            .map_err(AiError::InvalidInput)?;

        let city = form.patient_city.trim();
        if city.is_empty() {
            return Err(AiError::InvalidInput("patient city is required".into()));
        }

        let radius = match form.search_radius_km.trim() {
            "" => DEFAULT_RADIUS_KM,
            raw => raw
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r > 0.0)
                .ok_or_else(|| AiError::InvalidInput("search radius must be a positive number".into()))?,
        };

        Ok(Self {
            patient_blood_type: blood_type.as_str().to_string(),
            patient_city: city.to_string(),
            patient_needs: form.patient_needs.trim().to_string(),
            search_radius_km: radius,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedDonor {
    pub donor_name: String,
    pub donor_blood_type: String,
    pub distance_km: f64,
    pub contact_information: String,
    pub suitability_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub suggested_donors: Vec<SuggestedDonor>,
    pub summary: String,
}

impl MatchResponse {
    /// Range checks serde cannot express. Order is left as the model gave it.
    pub fn validate(&self) -> Result<(), AiError> {
        for donor in &self.suggested_donors {
            if !(0.0..=100.0).contains(&donor.suitability_score) {
                return Err(AiError::Schema(format!(
                    "suitabilityScore {} out of range for {}",
                    donor.suitability_score, donor.donor_name
                )));
            }
            if !donor.distance_km.is_finite() || donor.distance_km < 0.0 {
                return Err(AiError::Schema(format!(
                    "distanceKm {} is invalid for {}",
                    donor.distance_km, donor.donor_name
                )));
            }
        }
        Ok(())
    }
}

pub async fn find_matches(
    client: &dyn LlmClient,
    request: &MatchRequest,
    timeout: Duration,
) -> Result<MatchResponse, AiError> {
    let prompt = Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user: format!(
            "Patient blood type: {}\nLocation: {}\nSpecific needs: {}\nSearch radius: {} km",
            request.patient_blood_type,
            request.patient_city,
            if request.patient_needs.is_empty() {
                "none"
            } else {
                request.patient_needs.as_str()
            },
            request.search_radius_km
        ),
    };

    let value = with_timeout(timeout, client.complete_json(&prompt)).await?;
    let response: MatchResponse =
        serde_json::from_value(value).map_err(|e| AiError::Schema(e.to_string()))?;
    response.validate()?;
    Ok(response)
}
