mod health_check;
mod subscribe;
mod unsubscribe;
