pub mod auth;
pub mod chat_rooms;
pub mod courses;
pub mod enrollments;
pub mod feedback;
pub mod health;
pub mod materials;
pub mod notifications;
pub mod status_updates;
pub mod users;
pub mod ws;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(courses::router())
        .merge(enrollments::router())
        .merge(materials::router())
        .merge(feedback::router())
        .merge(status_updates::router())
        .merge(chat_rooms::router())
        .merge(notifications::router())
        .merge(ws::router())
        .with_state(state)
}
