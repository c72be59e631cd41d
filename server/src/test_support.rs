#![allow(dead_code)]

use tempfile::TempDir;

use tabshare_core::{config::AppConfig, db::Database, user::SubscriptionTier};

use crate::state::{AppState, build_state};

pub async fn setup_state() -> (TempDir, AppState) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let mut config = AppConfig::default();
    config.database_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .into_owned();

    let database = Database::connect(&config).await.expect("connect database");
    let state = build_state(&database, &config);

    (temp_dir, state)
}

impl AppState {
    pub async fn seed_user(&self, name: &str, tier: SubscriptionTier) -> String {
        let email = format!("{}@example.com", name.to_ascii_lowercase());
        let user = self
            .user_store
            .upsert(None, &email, name, tier)
            .await
            .expect("seed user");

        user.id
    }
}
