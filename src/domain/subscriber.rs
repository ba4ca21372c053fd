use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscription_state::SubscriptionState;

#[derive(Debug)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub state: SubscriptionState,
    pub last_email_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Subscriber {
    fn from_row(row: &PgRow) -> Result<Subscriber, sqlx::Error> {
        let email = SubscriberEmail::parse(row.try_get("email")?).map_err(|err| {
            sqlx::Error::ColumnDecode {
                index: String::from("email"),
                source: err.into(),
            }
        })?;
        let state = SubscriptionState::parse(
            row.try_get("is_verified")?,
            row.try_get("is_active")?,
            row.try_get("verification_token")?,
            row.try_get("token_expires_at")?,
        )
        .map_err(|err| sqlx::Error::ColumnDecode {
            index: String::from("is_verified"),
            source: err.into(),
        })?;

        Ok(Subscriber {
            id: row.try_get("id")?,
            email,
            state,
            last_email_sent: row.try_get("last_email_sent")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
