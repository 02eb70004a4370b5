pub mod admin;
pub mod executor;
pub mod health;
