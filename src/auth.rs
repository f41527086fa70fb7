//! Credential Gate
//!
//! Validates a display name and numeric code against a fixed table and
//! establishes an in-memory [`Session`]. There is no lockout and no rate
//! limiting; every failed attempt can be retried immediately.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::config::AuthConfig;

/// One of the two login inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Name,
    Code,
}

impl fmt::Display for LoginField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginField::Name => f.write_str("name"),
            LoginField::Code => f.write_str("code"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("please enter your {0}")]
    MissingField(LoginField),

    #[error("name or code is incorrect")]
    InvalidCredential,
}

/// Identity of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub display_name: String,
    pub started_at: DateTime<Utc>,
}

/// Display name → code mapping
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    users: BTreeMap<String, String>,
}

impl CredentialTable {
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self { users }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.users.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check `name` / `code` and open a session
    ///
    /// Codes compare as exact strings, so leading zeros matter.
    pub fn authenticate(&self, name: &str, code: &str) -> Result<Session, AuthError> {
        if name.is_empty() {
            return Err(AuthError::MissingField(LoginField::Name));
        }
        if code.is_empty() {
            return Err(AuthError::MissingField(LoginField::Code));
        }

        match self.users.get(name) {
            Some(expected) if expected == code => {
                tracing::info!(user = %name, "Login succeeded");
                Ok(Session {
                    display_name: name.to_string(),
                    started_at: Utc::now(),
                })
            }
            _ => {
                tracing::warn!(user = %name, "Login rejected");
                Err(AuthError::InvalidCredential)
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, code)| (name.into(), code.into()))
                .collect(),
        )
    }
}

/// The two login inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub name: String,
    pub code: String,
}

impl LoginForm {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.code.clear();
    }

    /// Run the gate on the current inputs
    ///
    /// Both fields are cleared on success and on a rejected credential;
    /// a missing field leaves them as typed.
    pub fn submit(&mut self, table: &CredentialTable) -> Result<Session, AuthError> {
        let result = table.authenticate(&self.name, &self.code);
        if !matches!(result, Err(AuthError::MissingField(_))) {
            self.clear();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CredentialTable {
        CredentialTable::from_config(&AuthConfig::default())
    }

    #[test]
    fn test_valid_credentials() {
        let session = table().authenticate("귀연", "951027").unwrap();
        assert_eq!(session.display_name, "귀연");

        let session = table().authenticate("소영", "000521").unwrap();
        assert_eq!(session.display_name, "소영");
    }

    #[test]
    fn test_wrong_code_rejected() {
        assert_eq!(
            table().authenticate("귀연", "000000"),
            Err(AuthError::InvalidCredential)
        );
        // Leading zeros are significant.
        assert_eq!(
            table().authenticate("소영", "521"),
            Err(AuthError::InvalidCredential)
        );
    }

    #[test]
    fn test_unknown_name_rejected() {
        for (name, code) in [("철수", "951027"), ("귀연 ", "951027"), ("GUEST", "0")] {
            assert_eq!(
                table().authenticate(name, code),
                Err(AuthError::InvalidCredential),
                "{name}"
            );
        }
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            table().authenticate("", "951027"),
            Err(AuthError::MissingField(LoginField::Name))
        );
        assert_eq!(
            table().authenticate("귀연", ""),
            Err(AuthError::MissingField(LoginField::Code))
        );
    }

    #[test]
    fn test_arbitrary_table() {
        let table: CredentialTable = [("alice", "1234")].into_iter().collect();
        assert_eq!(table.len(), 1);
        assert!(table.authenticate("alice", "1234").is_ok());
        assert!(table.authenticate("귀연", "951027").is_err());
    }

    #[test]
    fn test_form_clears_on_invalid_credential() {
        let mut form = LoginForm::new("귀연", "000000");
        assert_eq!(form.submit(&table()), Err(AuthError::InvalidCredential));
        assert_eq!(form, LoginForm::default());
    }

    #[test]
    fn test_form_keeps_inputs_on_missing_field() {
        let mut form = LoginForm::new("귀연", "");
        assert!(matches!(
            form.submit(&table()),
            Err(AuthError::MissingField(LoginField::Code))
        ));
        assert_eq!(form.name, "귀연");
    }

    #[test]
    fn test_form_clears_on_success() {
        let mut form = LoginForm::new("소영", "000521");
        let session = form.submit(&table()).unwrap();
        assert_eq!(session.display_name, "소영");
        assert!(form.name.is_empty() && form.code.is_empty());
    }
}
