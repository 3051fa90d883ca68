// API module - HTTP endpoints

pub mod admin;
pub mod applicants;
pub mod auth;
pub mod health;
pub mod middleware;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::credentials::CredentialStore;
use crate::services::membership_id::IdScheme;
use crate::services::storage::FileStore;
use crate::services::token::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub file_store: Arc<dyn FileStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub id_scheme: IdScheme,
}
