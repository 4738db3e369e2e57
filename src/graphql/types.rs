use async_graphql::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::directory::DonorListEntry;
use crate::profile::DonorProfile;

/// Account id of the authenticated caller, attached to each request.
#[derive(Clone, Debug)]
pub struct Viewer(pub String);

/// A donor as listed in the directory. Contact values are not exposed;
/// only whether each one can be revealed.
#[derive(Clone, Debug, Serialize, Deserialize, SimpleObject)]
pub struct Donor {
    pub id: String,
    pub name: String,
    pub blood_type: String,
    pub city: String,

    /// Phone is present and its owner allows it to be shown
    pub phone_revealable: bool,

    pub email_revealable: bool,
}

impl From<&DonorListEntry> for Donor {
    fn from(entry: &DonorListEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            blood_type: entry.blood_type.clone(),
            city: entry.city.clone(),
            phone_revealable: entry.can_reveal(crate::directory::ContactField::Phone),
            email_revealable: entry.can_reveal(crate::directory::ContactField::Email),
        }
    }
}

/// The caller's own profile.
#[derive(Clone, Debug, Serialize, Deserialize, SimpleObject)]
pub struct Profile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub last_donation_date: Option<NaiveDate>,
    pub city: String,
    pub mobile_visibility: bool,
    pub geolocation: Option<String>,
}

impl From<DonorProfile> for Profile {
    fn from(p: DonorProfile) -> Self {
        Self {
            uid: p.uid,
            name: p.name,
            email: p.email,
            phone: p.phone,
            gender: p.gender.map(|g| g.as_str().to_string()),
            blood_type: p.blood_type.map(|b| b.as_str().to_string()),
            last_donation_date: p.last_donation_date,
            city: p.city,
            mobile_visibility: p.mobile_visibility,
            geolocation: p.geolocation,
        }
    }
}

/// Directory filter. A missing or `"all"` blood type matches every donor.
#[derive(Clone, Debug, Default, InputObject)]
pub struct DonorFilterInput {
    pub blood_type: Option<String>,
    pub city: Option<String>,
}
