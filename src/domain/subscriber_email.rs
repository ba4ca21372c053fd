use validator::validate_email;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    /// Normalizes the address (trim + lowercase) before validating, so the
    /// same mailbox always maps to the same stored identity key.
    pub fn parse(email: String) -> Result<SubscriberEmail, String> {
        let normalized = email.trim().to_lowercase();
        // validate_email accepts dotless domains like user@localhost, which we
        // cannot deliver to from the public internet
        let domain_has_dot = normalized
            .rsplit_once('@')
            .map(|(_, domain)| domain.contains('.'))
            .unwrap_or(false);

        if !validate_email(&normalized) || !domain_has_dot {
            return Err(format!("{} email is not valid", email));
        }

        Ok(Self(normalized))
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
