use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::ProfileDocument;

/// Document field names, shared with the directory projection.
pub mod fields {
    pub const UID: &str = "uid";
    pub const NAME: &str = "name";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const GENDER: &str = "gender";
    pub const BLOOD_TYPE: &str = "bloodType";
    pub const LAST_DONATION_DATE: &str = "lastDonationDate";
    pub const CITY: &str = "city";
    pub const MOBILE_VISIBILITY: &str = "mobileVisibility";
    pub const GEOLOCATION: &str = "geolocation";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::APos,
        BloodType::ANeg,
        BloodType::BPos,
        BloodType::BNeg,
        BloodType::AbPos,
        BloodType::AbNeg,
        BloodType::OPos,
        BloodType::ONeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        BloodType::ALL
            .into_iter()
            .find(|bt| bt.as_str() == s)
            .ok_or_else(|| format!("Unknown blood type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("Unknown gender: {}", other)),
        }
    }
}

/// Typed, lenient read of a profile document. Missing or malformed fields
/// read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DonorProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub blood_type: Option<BloodType>,
    pub last_donation_date: Option<NaiveDate>,
    pub city: String,
    pub mobile_visibility: bool,
    pub geolocation: Option<String>,
}

impl DonorProfile {
    pub fn from_document(uid: &str, doc: &ProfileDocument) -> Self {
        Self {
            uid: uid.to_string(),
            name: str_field(doc, fields::NAME).unwrap_or_default(),
            email: str_field(doc, fields::EMAIL).unwrap_or_default(),
            phone: str_field(doc, fields::PHONE),
            gender: str_field(doc, fields::GENDER).and_then(|g| g.parse().ok()),
            blood_type: str_field(doc, fields::BLOOD_TYPE).and_then(|b| b.parse().ok()),
            last_donation_date: str_field(doc, fields::LAST_DONATION_DATE)
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            city: str_field(doc, fields::CITY).unwrap_or_default(),
            mobile_visibility: doc
                .get(fields::MOBILE_VISIBILITY)
                .and_then(Value::as_bool)
                .unwrap_or(true),
            geolocation: str_field(doc, fields::GEOLOCATION),
        }
    }
}

/// Non-empty string value of a document field.
pub fn str_field(doc: &ProfileDocument, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Raw profile form submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub blood_type: String,
    #[serde(default)]
    pub last_donation_date: String,
    #[serde(default)]
    pub city: String,
    /// Checkbox: present ("on") when checked.
    #[serde(default)]
    pub mobile_visibility: Option<String>,
    #[serde(default)]
    pub geolocation: String,
}

/// Per-field validation messages, keyed by form field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// A profile that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: Gender,
    pub blood_type: BloodType,
    pub last_donation_date: Option<NaiveDate>,
    pub city: String,
    pub mobile_visibility: bool,
    pub geolocation: String,
}

impl ProfileForm {
    /// Validate against `today` (last donation may not be in the future).
    pub fn validate(&self, today: NaiveDate) -> Result<ValidProfile, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.name.trim();
        if name.chars().count() < 2 {
            errors.insert("name", "Name must be at least 2 characters.".into());
        }

        let email = self.email.trim();
        if !is_valid_email(email) {
            errors.insert("email", "Please enter a valid email address.".into());
        }

        let gender = self.gender.parse::<Gender>().ok();
        if gender.is_none() {
            errors.insert("gender", "Please select a gender.".into());
        }

        let blood_type = self.blood_type.parse::<BloodType>().ok();
        if blood_type.is_none() {
            errors.insert("blood_type", "Please select a blood type.".into());
        }

        let city = self.city.trim();
        if city.chars().count() < 2 {
            errors.insert("city", "City is required.".into());
        }

        let last_donation_date = match self.last_donation_date.trim() {
            "" => None,
            raw => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) if date > today => {
                    errors.insert(
                        "last_donation_date",
                        "Last donation date cannot be in the future.".into(),
                    );
                    None
                }
                Ok(date) if date < earliest_donation_date() => {
                    errors.insert(
                        "last_donation_date",
                        "Last donation date is too far in the past.".into(),
                    );
                    None
                }
                Ok(date) => Some(date),
                Err(_) => {
                    errors.insert("last_donation_date", "Please pick a valid date.".into());
                    None
                }
            },
        };

        let geolocation = self.geolocation.trim();
        if !geolocation.is_empty() && parse_geolocation(geolocation).is_none() {
            errors.insert("geolocation", "Invalid location.".into());
        }

        match (gender, blood_type) {
            (Some(gender), Some(blood_type)) if errors.is_empty() => Ok(ValidProfile {
                name: name.to_string(),
                email: email.to_string(),
                phone: self.phone.trim().to_string(),
                gender,
                blood_type,
                last_donation_date,
                city: city.to_string(),
                mobile_visibility: self.mobile_visibility.is_some(),
                geolocation: geolocation.to_string(),
            }),
            _ => Err(errors),
        }
    }
}

impl ValidProfile {
    /// Fields to merge into the stored document. The last-donation date is
    /// left out entirely when unset.
    pub fn to_document(&self) -> ProfileDocument {
        let mut doc = ProfileDocument::new();
        doc.insert(fields::NAME.into(), Value::from(self.name.clone()));
        doc.insert(fields::EMAIL.into(), Value::from(self.email.clone()));
        doc.insert(fields::PHONE.into(), Value::from(self.phone.clone()));
        doc.insert(fields::GENDER.into(), Value::from(self.gender.as_str()));
        doc.insert(fields::BLOOD_TYPE.into(), Value::from(self.blood_type.as_str()));
        if let Some(date) = self.last_donation_date {
            doc.insert(
                fields::LAST_DONATION_DATE.into(),
                Value::from(date.format("%Y-%m-%d").to_string()),
            );
        }
        doc.insert(fields::CITY.into(), Value::from(self.city.clone()));
        doc.insert(
            fields::MOBILE_VISIBILITY.into(),
            Value::from(self.mobile_visibility),
        );
        doc.insert(
            fields::GEOLOCATION.into(),
            Value::from(self.geolocation.clone()),
        );
        doc
    }
}

fn earliest_donation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Shape check only: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Could not retrieve your location.")]
pub struct GeolocationError;

/// Format device coordinates as `"lat, lon"` with four decimals.
pub fn format_geolocation(latitude: f64, longitude: f64) -> Result<String, GeolocationError> {
    let valid = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if !valid {
        return Err(GeolocationError);
    }
    Ok(format!("{:.4}, {:.4}", latitude, longitude))
}

pub fn parse_geolocation(raw: &str) -> Option<(f64, f64)> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    format_geolocation(lat, lon).ok()?;
    Some((lat, lon))
}
