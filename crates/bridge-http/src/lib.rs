pub mod actions;
pub mod auth;
pub mod control;
pub mod error;
pub mod health;
pub mod payload;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_router, serve};
pub use state::AppState;
