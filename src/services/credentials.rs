use secrecy::{ExposeSecret, Secret};

/// Credential check behind a trait so the review workflow depends on an
/// interface rather than on environment variables.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Single static admin entry from configuration.
pub struct StaticCredentials {
    username: String,
    password: Secret<String>,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: Secret<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = constant_time_eq(username, &self.username);
        let password_ok = constant_time_eq(password, self.password.expose_secret());
        username_ok && password_ok
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(a.as_bytes(), b.as_bytes()).is_ok()
}
