use async_graphql::{EmptyMutation, EmptySubscription, Schema};

use super::queries::QueryRoot;

/// GraphQL Schema type
pub type DonorSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the GraphQL schema. Requests must carry a `ProfileStore` and the
/// viewer's account id (`Viewer`) as context data.
pub fn build_schema() -> DonorSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription).finish()
}
