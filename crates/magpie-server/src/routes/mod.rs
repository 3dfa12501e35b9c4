// Export route modules
pub mod chat;
pub mod conversation;
pub mod health;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(conversation::routes(state))
        .merge(health::routes())
}
