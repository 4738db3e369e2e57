use async_graphql::*;

use crate::directory::{self, DonorFilter, FilterParams};
use crate::graphql::types::{Donor, DonorFilterInput, Profile, Viewer};
use crate::profile::DonorProfile;
use crate::store::ProfileStore;

/// GraphQL Query root
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Donors with complete profiles matching the filter
    async fn donors(
        &self,
        ctx: &Context<'_>,
        filter: Option<DonorFilterInput>,
    ) -> Result<Vec<Donor>> {
        let store = ctx.data::<ProfileStore>()?;
        let filter = filter.unwrap_or_default();
        let filter = DonorFilter::from_params(&FilterParams {
            blood_type: filter.blood_type,
            city: filter.city,
        })
        .map_err(Error::new)?;

        let docs = store
            .list()
            .map_err(|e| Error::new(format!("Failed to list donors: {}", e)))?;
        let entries = directory::project(&docs);
        Ok(filter.apply(&entries).into_iter().map(Donor::from).collect())
    }

    /// The signed-in user's profile, if one exists
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<Profile>> {
        let store = ctx.data::<ProfileStore>()?;
        let Viewer(uid) = ctx.data::<Viewer>()?;

        let doc = store
            .get(uid)
            .map_err(|e| Error::new(format!("Failed to load profile: {}", e)))?;
        Ok(doc.map(|d| Profile::from(DonorProfile::from_document(uid, &d))))
    }
}
