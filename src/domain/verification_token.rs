use chrono::{DateTime, Duration, Utc};
use rand::Rng;

const TOKEN_LENGTH: usize = 30;

/// A verification link stops working this long after it is issued.
pub const TOKEN_VALIDITY_HOURS: i64 = 24;

/// Single-use opaque credential proving ownership of an email address.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn parse(token: String) -> Result<VerificationToken, String> {
        if token.trim().is_empty() {
            return Err(String::from("Verification token is required"));
        }

        Ok(Self(token))
    }

    pub fn generate() -> VerificationToken {
        let mut rng = rand::thread_rng();
        let token = std::iter::repeat_with(|| rng.sample(rand::distributions::Alphanumeric))
            .map(char::from)
            .take(TOKEN_LENGTH)
            .collect();

        Self(token)
    }

    pub fn expiry_from(issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + Duration::hours(TOKEN_VALIDITY_HOURS)
    }
}

impl AsRef<str> for VerificationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
