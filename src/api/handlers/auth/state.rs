//! Session and email verification settings.

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_ADMIN_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    admin_session_ttl_seconds: i64,
    email_token_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            admin_session_ttl_seconds: DEFAULT_ADMIN_SESSION_TTL_SECONDS,
            email_token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_admin_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.admin_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn admin_session_ttl_seconds(&self) -> i64 {
        self.admin_session_ttl_seconds
    }

    #[must_use]
    pub fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    /// Cookies carry `Secure` only when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthConfig::new("http://localhost:3000/".to_string());
        assert_eq!(config.frontend_base_url(), "http://localhost:3000");
        assert_eq!(config.session_ttl_seconds(), 604_800);
        assert_eq!(config.admin_session_ttl_seconds(), 43_200);
        assert_eq!(config.email_token_ttl_seconds(), 86_400);
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn https_frontend_marks_cookies_secure() {
        let config = AuthConfig::new("https://nagoyameshi.jp".to_string())
            .with_session_ttl_seconds(60)
            .with_resend_cooldown_seconds(0);
        assert!(config.session_cookie_secure());
        assert_eq!(config.session_ttl_seconds(), 60);
        assert_eq!(config.resend_cooldown_seconds(), 0);
    }
}
