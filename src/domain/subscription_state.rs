use chrono::{DateTime, Utc};

use crate::domain::verification_token::VerificationToken;

/// Where a subscriber sits in the verification lifecycle.
///
/// The database stores this as four columns (`is_verified`, `is_active`,
/// `verification_token`, `token_expires_at`); folding them into a single
/// enum makes the invalid combinations (a verified row still holding a
/// token, a pending row without an expiry) unrepresentable in the rest of
/// the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for the owner to click the verification link.
    Pending {
        token: VerificationToken,
        expires_at: DateTime<Utc>,
    },
    /// Email ownership confirmed; `active` toggles with subscribe/unsubscribe.
    Verified { active: bool },
}

/// What a subscribe request should do given the subscriber's current state.
#[derive(Debug, PartialEq, Eq)]
pub enum SubscribeAction {
    AlreadySubscribed,
    Reactivate,
    RotateToken,
}

impl SubscriptionState {
    /// Reassembles the state from its database columns, rejecting rows that
    /// break the lifecycle invariants.
    pub fn parse(
        is_verified: bool,
        is_active: bool,
        token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SubscriptionState, String> {
        match (is_verified, token, expires_at) {
            (true, None, None) => Ok(SubscriptionState::Verified { active: is_active }),
            (false, Some(token), Some(expires_at)) => {
                let token = VerificationToken::parse(token)?;
                Ok(SubscriptionState::Pending { token, expires_at })
            }
            (true, Some(_), _) | (true, _, Some(_)) => Err(String::from(
                "a verified subscriber must not hold a verification token",
            )),
            (false, _, _) => Err(String::from(
                "a pending subscriber must hold both a token and an expiry",
            )),
        }
    }

    pub fn on_subscribe(&self) -> SubscribeAction {
        match self {
            SubscriptionState::Verified { active: true } => SubscribeAction::AlreadySubscribed,
            SubscriptionState::Verified { active: false } => SubscribeAction::Reactivate,
            SubscriptionState::Pending { .. } => SubscribeAction::RotateToken,
        }
    }

    /// Consumes a matching verification token. Fails when the token has
    /// expired; clearing the token on success is what makes it single-use.
    pub fn confirm(self, now: DateTime<Utc>) -> Result<SubscriptionState, String> {
        match self {
            SubscriptionState::Pending { expires_at, .. } if now < expires_at => {
                Ok(SubscriptionState::Verified { active: true })
            }
            SubscriptionState::Pending { .. } => {
                Err(String::from("the verification token has expired"))
            }
            SubscriptionState::Verified { .. } => {
                Err(String::from("the subscriber is already verified"))
            }
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, SubscriptionState::Verified { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionState::Verified { active: true })
    }

    pub fn verification_token(&self) -> Option<&VerificationToken> {
        match self {
            SubscriptionState::Pending { token, .. } => Some(token),
            SubscriptionState::Verified { .. } => None,
        }
    }

    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SubscriptionState::Pending { expires_at, .. } => Some(*expires_at),
            SubscriptionState::Verified { .. } => None,
        }
    }
}
