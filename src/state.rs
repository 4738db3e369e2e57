use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::ai::{LlmClient, MatchGenerations};
use crate::auth::challenge::ChallengeStore;
use crate::auth::otp::OtpStore;
use crate::auth::Notifier;
use crate::config::Config;
use crate::directory::DirectoryViews;
use crate::graphql::{build_schema, DonorSchema};
use crate::store::ProfileStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub store: ProfileStore,
    pub otps: Arc<Mutex<OtpStore>>,
    pub challenges: Arc<Mutex<ChallengeStore>>,
    pub notifier: Arc<dyn Notifier>,
    pub llm: Arc<dyn LlmClient>,
    pub generations: MatchGenerations,
    pub directory_views: DirectoryViews,
    pub graphql_schema: DonorSchema,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: Config,
        notifier: Arc<dyn Notifier>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let otps = OtpStore::new(
            Duration::from_secs(config.auth.otp_ttl_secs),
            config.auth.otp_max_attempts,
        );
        Self {
            store: ProfileStore::new(db.clone()),
            db,
            otps: Arc::new(Mutex::new(otps)),
            challenges: Arc::new(Mutex::new(ChallengeStore::new())),
            notifier,
            llm,
            generations: MatchGenerations::new(),
            directory_views: DirectoryViews::new(),
            graphql_schema: build_schema(),
            config,
        }
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ai.timeout_secs)
    }
}
