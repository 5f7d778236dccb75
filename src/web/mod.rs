//! Web server module (Axum): the operator page and the submission endpoint.

pub mod api;
pub mod router;
pub mod server;
pub mod state;

pub use router::create_app_router;
pub use server::{bind, run_web_server};
pub use state::AppState;
