// Library exports for BloodLink
// This allows integration tests and external code to use BloodLink modules

pub mod ai;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod extractors;
pub mod graphql;
pub mod i18n;
pub mod profile;
pub mod routes;
pub mod state;
pub mod store;
