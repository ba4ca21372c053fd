use actix_web::{web, HttpResponse, ResponseError};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use sqlx::PgPool;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::routes::subscribe::find_subscriber_by_email;

#[derive(Deserialize)]
pub struct UnsubscribeBody {
    pub email: String,
}

#[derive(serde::Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(thiserror::Error)]
pub enum UnsubscribeError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Failed to read or write the subscriber record.")]
    DatabaseError(#[source] sqlx::Error),
}

impl std::fmt::Debug for UnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for UnsubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            UnsubscribeError::InvalidEmail => StatusCode::BAD_REQUEST,
            UnsubscribeError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = if self.status_code() == StatusCode::BAD_REQUEST {
            self.to_string()
        } else {
            String::from("An unexpected error occurred. Please try again later.")
        };

        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "success": false, "message": message }))
    }
}

#[tracing::instrument(
    name = "Unsubscribing an email from election updates",
    skip(body, db_pool),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_unsubscribe(
    body: web::Json<UnsubscribeBody>,
    db_pool: web::Data<PgPool>,
) -> Result<HttpResponse, UnsubscribeError> {
    let email = match SubscriberEmail::parse(body.email.clone()) {
        Ok(email) => email,
        Err(err) => {
            tracing::error!("Validation error: {:?}", err);
            return Err(UnsubscribeError::InvalidEmail);
        }
    };

    let subscriber = find_subscriber_by_email(&db_pool, &email)
        .await
        .map_err(UnsubscribeError::DatabaseError)?;

    // Unknown or already-inactive addresses get the same answer: nothing to
    // deactivate, the outcome the caller wanted already holds
    if let Some(subscriber) = subscriber {
        if subscriber.state.is_active() {
            deactivate_subscriber(&db_pool, &email)
                .await
                .map_err(UnsubscribeError::DatabaseError)?;
        }
    }

    Ok(HttpResponse::Ok().json(UnsubscribeResponse {
        success: true,
        message: String::from("You have been unsubscribed successfully."),
    }))
}

#[tracing::instrument(name = "Deactivating a subscriber", skip(db_pool))]
async fn deactivate_subscriber(
    db_pool: &PgPool,
    email: &SubscriberEmail,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE subscribers
        SET is_active = false, updated_at = $2
        WHERE email = $1
        "#,
    )
    .bind(email.as_ref())
    .bind(Utc::now())
    .execute(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })?;

    Ok(())
}
