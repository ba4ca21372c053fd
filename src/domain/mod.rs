pub mod subscriber;
pub mod subscriber_email;
pub mod subscription_state;
pub mod verification_token;
