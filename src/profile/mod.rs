pub mod types;

use chrono::NaiveDate;

use crate::store::{ProfileDocument, ProfileStore, StoreError};

pub use types::{
    fields, format_geolocation, BloodType, DonorProfile, FieldErrors, Gender, GeolocationError,
    ProfileForm, ValidProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Profile form has {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate the form and merge it into the user's profile document.
///
/// An email already on the document wins over the submitted one; it is
/// read-only once set.
pub fn submit(
    store: &ProfileStore,
    uid: &str,
    form: &ProfileForm,
    today: NaiveDate,
) -> Result<ProfileDocument, SubmitError> {
    let mut valid = form.validate(today).map_err(SubmitError::Invalid)?;

    if let Some(existing) = store
        .get(uid)?
        .and_then(|doc| types::str_field(&doc, fields::EMAIL))
    {
        valid.email = existing;
    }

    let doc = store.merge(uid, valid.to_document())?;
    tracing::info!(uid, "Profile updated");
    Ok(doc)
}
