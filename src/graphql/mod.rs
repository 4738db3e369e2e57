pub mod queries;
pub mod schema;
pub mod types;

pub use schema::{build_schema, DonorSchema};
