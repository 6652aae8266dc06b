pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{build_router, serve, AppState};
