use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;
use countdown_newsletter::domain::{
    subscriber::Subscriber, subscription_state::SubscriptionState,
};

async fn fetch_sole_subscriber(db_pool: &PgPool) -> Subscriber {
    sqlx::query_as::<_, Subscriber>(
        "SELECT id, email, verification_token, token_expires_at, \
         is_verified, is_active, last_email_sent, created_at, updated_at \
         FROM subscribers",
    )
    .fetch_one(db_pool)
    .await
    .expect("Query to fetch subscribers failed.")
}

fn email_delivery_mock() -> Mock {
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
}

#[tokio::test]
async fn subscribe_returns_200_when_body_is_valid() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    email_delivery_mock().mount(&test_app.email_server).await;

    let response = test_app.post_subscribe(body).await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["isVerified"], false);
    assert_eq!(response_body["isActive"], false);
}

#[tokio::test]
async fn subscribe_persists_a_pending_inactive_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    email_delivery_mock().mount(&test_app.email_server).await;

    test_app.post_subscribe(body).await;

    let subscriber = fetch_sole_subscriber(&test_app.db_pool).await;

    assert_eq!(subscriber.email.as_ref(), "voter@test.com");
    assert!(!subscriber.state.is_verified());
    assert!(!subscriber.state.is_active());

    // The verification window is 24 hours
    let expires_at = subscriber
        .state
        .token_expires_at()
        .expect("Pending subscriber has no token expiry.");

    assert!(expires_at > Utc::now() + Duration::hours(23));
    assert!(expires_at < Utc::now() + Duration::hours(25));
}

#[tokio::test]
async fn subscribe_normalizes_the_email_before_storing_it() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "  Voter@Example.COM ");

    email_delivery_mock().mount(&test_app.email_server).await;

    test_app.post_subscribe(body).await;

    let subscriber = fetch_sole_subscriber(&test_app.db_pool).await;

    assert_eq!(subscriber.email.as_ref(), "voter@example.com");
}

#[tokio::test]
async fn subscribe_returns_400_when_email_is_missing_or_invalid() {
    let test_app = TestApp::spawn_app().await;

    // This is a common practice and it is called table-driven tests. In this case, it simulates different kind of possible request bodies
    // where API should return 400.
    let test_cases: Vec<(HashMap<&str, &str>, &str)> = vec![
        (HashMap::from([]), "missing email parameter"),
        (HashMap::from([("email", "")]), "empty email"),
        (HashMap::from([("email", "test.com")]), "missing @ symbol"),
        (HashMap::from([("email", "@test.com")]), "missing local part"),
        (
            HashMap::from([("email", "voter@localhost")]),
            "domain without a dot",
        ),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = test_app.post_subscribe(invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when payload was {}",
            error_message
        );
    }
}

#[tokio::test]
async fn subscribe_sends_a_verification_email_with_a_link() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    email_delivery_mock()
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    test_app.post_subscribe(body).await;

    let received_requests = &test_app.email_server.received_requests().await.unwrap();
    let confirmation_links = test_app.get_confirmation_link(&received_requests[0]);

    // The text and html parts point at the same verification link
    assert_eq!(confirmation_links.html, confirmation_links.plain_text);
}

#[tokio::test]
async fn subscribing_a_verified_active_email_returns_400() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    email_delivery_mock().mount(&test_app.email_server).await;

    test_app.post_subscribe(body.clone()).await;

    let received_requests = &test_app.email_server.received_requests().await.unwrap();
    let confirmation_links = test_app.get_confirmation_link(&received_requests[0]);

    reqwest::get(confirmation_links.html)
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let response = test_app.post_subscribe(body).await;

    assert_eq!(400, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        response_body["message"],
        "This email is already subscribed to our updates"
    );
}

#[tokio::test]
async fn subscribing_an_unsubscribed_email_reactivates_it() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    email_delivery_mock().mount(&test_app.email_server).await;

    test_app.post_subscribe(body.clone()).await;

    let received_requests = &test_app.email_server.received_requests().await.unwrap();
    let confirmation_links = test_app.get_confirmation_link(&received_requests[0]);

    reqwest::get(confirmation_links.html)
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    test_app.post_unsubscribe(body.clone()).await;

    let response = test_app.post_subscribe(body).await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        response_body["message"],
        "Welcome back! Your subscription has been reactivated."
    );

    let subscriber = fetch_sole_subscriber(&test_app.db_pool).await;

    assert_eq!(
        subscriber.state,
        SubscriptionState::Verified { active: true }
    );

    // One verification email plus one welcome email
    let received_requests = &test_app.email_server.received_requests().await.unwrap();

    assert_eq!(received_requests.len(), 2);
}

#[tokio::test]
async fn subscribe_reports_failure_when_email_delivery_fails() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.email_server)
        .await;

    let response = test_app.post_subscribe(body).await;

    assert_eq!(500, response.status().as_u16());

    // The record was committed before the notifier failed; a retry lands in
    // the resend branch and rotates the token
    let subscriber = fetch_sole_subscriber(&test_app.db_pool).await;

    assert!(!subscriber.state.is_verified());
}
