use serde::{Deserialize, Serialize};

/// Identity supplied by the authentication provider.
///
/// Only `id` is required for the challenge; the display name and email are
/// used by the step 5 signature check when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Name the student is expected to sign step 5 with
    pub fn signature_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.email.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_name_fallbacks() {
        let bare = UserIdentity::new("abc-123");
        assert_eq!(bare.signature_name(), "abc-123");

        let with_email = UserIdentity::new("abc-123").with_email("ada@example.com");
        assert_eq!(with_email.signature_name(), "ada@example.com");

        let named = with_email.with_display_name("Ada Lovelace");
        assert_eq!(named.signature_name(), "Ada Lovelace");

        let blank = UserIdentity::new("abc-123").with_display_name("  ");
        assert_eq!(blank.signature_name(), "abc-123");
    }
}
