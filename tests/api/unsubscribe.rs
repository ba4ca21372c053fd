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

async fn create_active_subscriber(test_app: &TestApp, email: &str) {
    let mut body = HashMap::new();

    body.insert("email", email);

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    test_app.post_subscribe(body).await;

    let received_requests = &test_app.email_server.received_requests().await.unwrap();
    let confirmation_links = test_app.get_confirmation_link(&received_requests[0]);

    reqwest::get(confirmation_links.html)
        .await
        .unwrap()
        .error_for_status()
        .unwrap();
}

#[tokio::test]
async fn unsubscribe_returns_400_when_email_is_missing_or_invalid() {
    let test_app = TestApp::spawn_app().await;

    let test_cases: Vec<(HashMap<&str, &str>, &str)> = vec![
        (HashMap::from([]), "missing email parameter"),
        (HashMap::from([("email", "test.com")]), "missing @ symbol"),
        (HashMap::from([("email", "@test.com")]), "missing local part"),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = test_app.post_unsubscribe(invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when payload was {}",
            error_message
        );
    }
}

#[tokio::test]
async fn unsubscribing_an_unknown_email_returns_200_without_creating_a_record() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "ghost@test.com");

    let response = test_app.post_unsubscribe(body).await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(
        response_body["message"],
        "You have been unsubscribed successfully."
    );

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to count subscribers failed.");

    assert_eq!(count, 0);
}

#[tokio::test]
async fn unsubscribing_an_active_subscriber_deactivates_it() {
    let test_app = TestApp::spawn_app().await;

    create_active_subscriber(&test_app, "voter@test.com").await;

    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    let response = test_app.post_unsubscribe(body).await;

    assert_eq!(200, response.status().as_u16());

    // Verified status survives the unsubscribe; only activity is toggled
    let subscriber = fetch_sole_subscriber(&test_app.db_pool).await;

    assert_eq!(
        subscriber.state,
        SubscriptionState::Verified { active: false }
    );
}

#[tokio::test]
async fn unsubscribing_twice_is_idempotent() {
    let test_app = TestApp::spawn_app().await;

    create_active_subscriber(&test_app, "voter@test.com").await;

    let mut body = HashMap::new();

    body.insert("email", "voter@test.com");

    test_app.post_unsubscribe(body.clone()).await;

    let after_first = fetch_sole_subscriber(&test_app.db_pool).await;

    let response = test_app.post_unsubscribe(body).await;

    assert_eq!(200, response.status().as_u16());

    // The second call reports success without touching the record
    let after_second = fetch_sole_subscriber(&test_app.db_pool).await;

    assert_eq!(after_first.updated_at, after_second.updated_at);
    assert_eq!(
        after_second.state,
        SubscriptionState::Verified { active: false }
    );
}
