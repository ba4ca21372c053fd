use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{
        subscriber::Subscriber,
        subscriber_email::SubscriberEmail,
        subscription_state::{SubscribeAction, SubscriptionState},
        verification_token::VerificationToken,
    },
    email_client::EmailClient,
    startup::ApplicationBaseUrl,
};

#[derive(Deserialize)]
pub struct SubscribeBody {
    pub email: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("This email is already subscribed to our updates")]
    AlreadySubscribed,
    #[error("Failed to send an email to the subscriber.")]
    SendEmailError(#[from] reqwest::Error),
    #[error("Failed to read or write the subscriber record.")]
    DatabaseError(#[source] sqlx::Error),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::InvalidEmail => StatusCode::BAD_REQUEST,
            SubscribeError::AlreadySubscribed => StatusCode::BAD_REQUEST,
            SubscribeError::SendEmailError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SubscribeError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal detail stays in the logs; clients only get a generic 500 body
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
    name = "Subscribing an email to election updates",
    skip(body, db_pool, email_client, base_url),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_subscribe(
    body: web::Json<SubscribeBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
) -> Result<HttpResponse, SubscribeError> {
    let email = match SubscriberEmail::parse(body.email.clone()) {
        Ok(email) => email,
        Err(err) => {
            tracing::error!("Validation error: {:?}", err);
            return Err(SubscribeError::InvalidEmail);
        }
    };
    let now = Utc::now();
    let existing = find_subscriber_by_email(&db_pool, &email)
        .await
        .map_err(SubscribeError::DatabaseError)?;

    match existing {
        None => initiate_subscription(&db_pool, &email_client, &base_url, &email, now).await,
        Some(subscriber) => match subscriber.state.on_subscribe() {
            SubscribeAction::AlreadySubscribed => Err(SubscribeError::AlreadySubscribed),
            SubscribeAction::Reactivate => {
                reactivate_subscription(&db_pool, &email_client, &subscriber, now).await
            }
            SubscribeAction::RotateToken => {
                resend_verification(&db_pool, &email_client, &base_url, &subscriber, now).await
            }
        },
    }
}

#[tracing::instrument(name = "Creating a pending subscriber", skip(db_pool, email_client, base_url))]
async fn initiate_subscription(
    db_pool: &PgPool,
    email_client: &EmailClient,
    base_url: &ApplicationBaseUrl,
    email: &SubscriberEmail,
    now: DateTime<Utc>,
) -> Result<HttpResponse, SubscribeError> {
    let token = VerificationToken::generate();
    let state = SubscriptionState::Pending {
        token: token.clone(),
        expires_at: VerificationToken::expiry_from(now),
    };

    insert_subscriber(db_pool, email, &state, now).await?;
    send_verification_email(email_client, email, &token, base_url).await?;

    Ok(HttpResponse::Ok().json(SubscribeResponse {
        success: true,
        message: String::from(
            "Subscription initiated! Please check your email to verify your address.",
        ),
        email: String::from(email.as_ref()),
        is_verified: Some(false),
        is_active: Some(false),
    }))
}

#[tracing::instrument(name = "Reactivating a former subscriber", skip(db_pool, email_client))]
async fn reactivate_subscription(
    db_pool: &PgPool,
    email_client: &EmailClient,
    subscriber: &Subscriber,
    now: DateTime<Utc>,
) -> Result<HttpResponse, SubscribeError> {
    let state = SubscriptionState::Verified { active: true };

    update_subscriber_state(db_pool, subscriber.id, &state, None, now)
        .await
        .map_err(SubscribeError::DatabaseError)?;
    send_welcome_email(email_client, &subscriber.email).await?;

    Ok(HttpResponse::Ok().json(SubscribeResponse {
        success: true,
        message: String::from("Welcome back! Your subscription has been reactivated."),
        email: String::from(subscriber.email.as_ref()),
        is_verified: Some(true),
        is_active: Some(true),
    }))
}

#[tracing::instrument(
    name = "Rotating the verification token of a pending subscriber",
    skip(db_pool, email_client, base_url)
)]
async fn resend_verification(
    db_pool: &PgPool,
    email_client: &EmailClient,
    base_url: &ApplicationBaseUrl,
    subscriber: &Subscriber,
    now: DateTime<Utc>,
) -> Result<HttpResponse, SubscribeError> {
    // A fresh token invalidates any previously emailed link
    let token = VerificationToken::generate();
    let state = SubscriptionState::Pending {
        token: token.clone(),
        expires_at: VerificationToken::expiry_from(now),
    };

    update_subscriber_state(db_pool, subscriber.id, &state, Some(now), now)
        .await
        .map_err(SubscribeError::DatabaseError)?;
    send_verification_email(email_client, &subscriber.email, &token, base_url).await?;

    Ok(HttpResponse::Ok().json(SubscribeResponse {
        success: true,
        message: String::from(
            "Verification email resent! Please check your inbox and verify your email address.",
        ),
        email: String::from(subscriber.email.as_ref()),
        is_verified: Some(false),
        is_active: None,
    }))
}

#[tracing::instrument(name = "Fetching a subscriber by email", skip(db_pool))]
pub async fn find_subscriber_by_email(
    db_pool: &PgPool,
    email: &SubscriberEmail,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query_as::<_, Subscriber>(
        r#"
        SELECT id, email, verification_token, token_expires_at,
               is_verified, is_active, last_email_sent, created_at, updated_at
        FROM subscribers
        WHERE email = $1
        "#,
    )
    .bind(email.as_ref())
    .fetch_optional(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}

#[tracing::instrument(name = "Inserting a new subscriber", skip(db_pool, state))]
async fn insert_subscriber(
    db_pool: &PgPool,
    email: &SubscriberEmail,
    state: &SubscriptionState,
    now: DateTime<Utc>,
) -> Result<(), SubscribeError> {
    sqlx::query(
        r#"
        INSERT INTO subscribers
            (id, email, verification_token, token_expires_at,
             is_verified, is_active, last_email_sent, created_at, updated_at)
        VALUES ($1, $2, $3, $4, false, false, $5, $5, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email.as_ref())
    .bind(state.verification_token().map(|token| token.as_ref()))
    .bind(state.token_expires_at())
    .bind(now)
    .execute(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        match &err {
            // Unique violation: another request created this email between our
            // lookup and this insert
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                SubscribeError::AlreadySubscribed
            }
            _ => SubscribeError::DatabaseError(err),
        }
    })?;

    Ok(())
}

#[tracing::instrument(name = "Updating a subscriber's lifecycle state", skip(db_pool, state))]
pub async fn update_subscriber_state(
    db_pool: &PgPool,
    subscriber_id: Uuid,
    state: &SubscriptionState,
    email_sent_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE subscribers
        SET is_verified = $2,
            is_active = $3,
            verification_token = $4,
            token_expires_at = $5,
            last_email_sent = COALESCE($6, last_email_sent),
            updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(subscriber_id)
    .bind(state.is_verified())
    .bind(state.is_active())
    .bind(state.verification_token().map(|token| token.as_ref()))
    .bind(state.token_expires_at())
    .bind(email_sent_at)
    .bind(now)
    .execute(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })?;

    Ok(())
}

#[tracing::instrument(
    name = "Sending a verification email",
    fields(base_url = %base_url.0),
    skip(email_client, token, base_url)
)]
async fn send_verification_email(
    email_client: &EmailClient,
    email: &SubscriberEmail,
    token: &VerificationToken,
    base_url: &ApplicationBaseUrl,
) -> Result<(), reqwest::Error> {
    let verification_link = format!("{}/verify?token={}", base_url.0, token.as_ref());
    let html_body = format!(
        r#"
            <div>
                <h1>Election Countdown - Verify Your Email</h1>
                <p>Thank you for subscribing to election updates!</p>
                <p>Please verify your email address by clicking
                <a href="{}">this link</a>.</p>
                <p><strong>This link will expire in 24 hours.</strong></p>
                <p>If you didn't request this, please ignore this email.</p>
            </div>
        "#,
        verification_link
    );
    let text_body = format!(
        "Thank you for subscribing to election updates!\n\
         Please verify your email address by visiting this link:\n{}\n\
         This link will expire in 24 hours.\n\
         If you didn't request this, please ignore this email.",
        verification_link
    );

    email_client
        .send_email(
            email.clone(),
            "Verify your email - Election Countdown",
            &text_body,
            &html_body,
        )
        .await
}

#[tracing::instrument(name = "Sending a welcome email", skip(email_client))]
async fn send_welcome_email(
    email_client: &EmailClient,
    email: &SubscriberEmail,
) -> Result<(), reqwest::Error> {
    let html_body = String::from(
        r#"
            <div>
                <h1>Welcome to Election Countdown!</h1>
                <p>You'll now receive important updates and notifications
                about upcoming elections.</p>
                <p>You can unsubscribe at any time from our emails.</p>
            </div>
        "#,
    );
    let text_body = String::from(
        "Welcome to Election Countdown!\n\
         You'll now receive important updates and notifications about upcoming elections.\n\
         You can unsubscribe at any time from our emails.",
    );

    email_client
        .send_email(
            email.clone(),
            "Welcome to Election Countdown!",
            &text_body,
            &html_body,
        )
        .await
}
