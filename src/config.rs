use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Comma-separated list of allowed browser origins
    pub cors_origins: Option<String>,

    // Admin credentials (single static entry behind the CredentialStore trait)
    pub admin_username: String,
    pub admin_password: Secret<String>,

    // Token signing
    pub jwt_secret: Secret<String>,

    // Membership identifier scheme, e.g. CLUB- + 4 digits -> CLUB-0001
    pub membership_id_prefix: String,
    pub membership_id_pad: usize,

    // File storage provider (Cloudinary-compatible API)
    pub storage_api_base_url: String,
    pub storage_cloud_name: String,
    pub storage_api_key: String,
    pub storage_api_secret: Secret<String>,
    pub storage_folder: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            cors_origins: config.get("cors_origins").ok(),

            admin_username: config.get("admin_username")?,
            admin_password: Secret::new(config.get("admin_password")?),

            jwt_secret: Secret::new(config.get("jwt_secret")?),

            membership_id_prefix: config
                .get("membership_id_prefix")
                .unwrap_or_else(|_| "CLUB-".to_string()),
            membership_id_pad: config.get("membership_id_pad").unwrap_or(4),

            storage_api_base_url: config
                .get("storage_api_base_url")
                .unwrap_or_else(|_| "https://api.cloudinary.com".to_string()),
            storage_cloud_name: config.get("storage_cloud_name")?,
            storage_api_key: config.get("storage_api_key")?,
            storage_api_secret: Secret::new(config.get("storage_api_secret")?),
            storage_folder: config
                .get("storage_folder")
                .unwrap_or_else(|_| "members".to_string()),
        })
    }
}
