use actix_web::{
    web::{self, Query},
    HttpResponse, ResponseError,
};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use sqlx::PgPool;

use crate::domain::{subscriber::Subscriber, verification_token::VerificationToken};
use crate::routes::subscribe::update_subscriber_state;

#[derive(Deserialize, Debug)]
pub struct Parameters {
    pub token: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub is_verified: bool,
}

#[derive(thiserror::Error)]
pub enum VerifyError {
    #[error("Verification token is required")]
    MissingToken,
    #[error("Invalid or expired verification token")]
    InvalidOrExpiredToken,
    #[error("Failed to read or write the subscriber record.")]
    DatabaseError(#[source] sqlx::Error),
}

impl std::fmt::Debug for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for VerifyError {
    fn status_code(&self) -> StatusCode {
        match self {
            VerifyError::MissingToken => StatusCode::BAD_REQUEST,
            VerifyError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            VerifyError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.status_code() == StatusCode::BAD_REQUEST {
            self.to_string()
        } else {
            String::from("Server error during verification")
        };

        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "success": false, "message": message }))
    }
}

#[tracing::instrument(
    name = "Verifying a subscriber's email",
    skip(db_pool),
    fields(token = %parameters.token)
)]
pub async fn handle_verify(
    parameters: Query<Parameters>,
    db_pool: web::Data<PgPool>,
) -> Result<HttpResponse, VerifyError> {
    let token = VerificationToken::parse(parameters.token.clone())
        .map_err(|_| VerifyError::MissingToken)?;
    let now = Utc::now();

    let subscriber = find_subscriber_by_token(&db_pool, &token)
        .await
        .map_err(VerifyError::DatabaseError)?
        .ok_or(VerifyError::InvalidOrExpiredToken)?;

    // The token matched a record but may have outlived its 24-hour window
    let verified_state = subscriber
        .state
        .confirm(now)
        .map_err(|_| VerifyError::InvalidOrExpiredToken)?;

    update_subscriber_state(&db_pool, subscriber.id, &verified_state, None, now)
        .await
        .map_err(VerifyError::DatabaseError)?;

    Ok(HttpResponse::Ok().json(VerifyResponse {
        success: true,
        message: String::from("Subscriber verified successfully"),
        is_verified: true,
    }))
}

#[tracing::instrument(name = "Fetching a subscriber by verification token", skip(db_pool, token))]
async fn find_subscriber_by_token(
    db_pool: &PgPool,
    token: &VerificationToken,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query_as::<_, Subscriber>(
        r#"
        SELECT id, email, verification_token, token_expires_at,
               is_verified, is_active, last_email_sent, created_at, updated_at
        FROM subscribers
        WHERE verification_token = $1
        "#,
    )
    .bind(token.as_ref())
    .fetch_optional(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}
