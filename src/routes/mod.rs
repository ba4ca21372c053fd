pub mod health_check;
pub mod subscribe;
pub mod unsubscribe;
pub mod verify;

pub use health_check::health_check;
pub use subscribe::handle_subscribe;
pub use unsubscribe::handle_unsubscribe;
pub use verify::handle_verify;
