//! Profile and user directory routes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::UserSummary;
use elearn_engine::accounts::{AccountService, Profile, PublicProfile, UpdateProfileParams};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(my_profile).patch(update_my_profile))
        .route("/api/users/search", get(search_users))
        .route("/api/users/{id}", get(public_profile))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/me: The caller's dashboard.
async fn my_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(AccountService::profile(&state.pool, &auth.actor).await?))
}

/// PATCH /api/me: Update names, email or profile picture.
async fn update_my_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<UpdateProfileParams>,
) -> Result<Json<UserSummary>, AppError> {
    let user = AccountService::update_profile(&state.pool, &auth.actor, &params).await?;
    Ok(Json(user))
}

/// GET /api/users/search?q=: Find users by username or name.
async fn search_users(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(AccountService::search(&state.pool, &query.q).await?))
}

/// GET /api/users/:id: Another user's public profile.
async fn public_profile(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicProfile>, AppError> {
    Ok(Json(AccountService::public_profile(&state.pool, id).await?))
}
