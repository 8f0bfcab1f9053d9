//! Authenticated session identity supplied by the host's auth provider.

use fleek_shared::ids::UserId;

/// Identity material for the current authenticated session.
///
/// The chat subsystem never talks to the auth provider; the host hands it a
/// `SessionIdentity` whose fields seed the backup key derivation.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub email: Option<String>,
    pub access_token: Option<String>,
}

impl SessionIdentity {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            access_token: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// The stable secret string the backup key is derived from.
    ///
    /// Prefers `user_id:email`, falls back to the access token, then to a
    /// fixed literal for sessions carrying neither. The same session on a
    /// new device derives the same key, which is the whole point of the
    /// backup path.
    pub fn backup_secret(&self) -> String {
        if let Some(email) = &self.email {
            return format!("{}:{}", self.user_id, email);
        }
        if let Some(token) = &self.access_token {
            return token.clone();
        }
        "fallback".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_secret_prefers_email() {
        let user = UserId::new();
        let session = SessionIdentity::new(user)
            .with_email("a@example.com")
            .with_access_token("tok");
        assert_eq!(session.backup_secret(), format!("{user}:a@example.com"));
    }

    #[test]
    fn backup_secret_falls_back_to_token() {
        let session = SessionIdentity::new(UserId::new()).with_access_token("tok-123");
        assert_eq!(session.backup_secret(), "tok-123");
    }

    #[test]
    fn backup_secret_last_resort_is_fixed_literal() {
        let session = SessionIdentity::new(UserId::new());
        assert_eq!(session.backup_secret(), "fallback");
    }

    #[test]
    fn backup_secret_is_stable_across_clones() {
        let session = SessionIdentity::new(UserId::new()).with_email("x@y.z");
        assert_eq!(session.backup_secret(), session.clone().backup_secret());
    }
}
