//! Authentication routes: registration and password login.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{User, UserType};
use elearn_engine::accounts::{AccountService, RegisterParams};

use crate::middleware::auth::encode_jwt;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register/student", post(register_student))
        .route("/api/auth/register/teacher", post(register_teacher))
        .route("/api/auth/login", post(login))
}

/// Request body for password login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for successful registration or login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
    pub user_type: Option<UserType>,
}

fn issue_token(
    state: &AppState,
    user: &User,
    user_type: Option<UserType>,
) -> Result<LoginResponse, AppError> {
    let token = encode_jwt(
        user.id,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )?;
    Ok(LoginResponse {
        token,
        user_id: user.id,
        username: user.username.clone(),
        user_type,
    })
}

async fn register(
    state: &AppState,
    user_type: UserType,
    params: &RegisterParams,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    let user = AccountService::register(&state.pool, user_type, params).await?;
    let response = issue_token(state, &user, Some(user_type))?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/register/student: Create a student account and return a JWT.
async fn register_student(
    State(state): State<AppState>,
    Json(params): Json<RegisterParams>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    register(&state, UserType::Student, &params).await
}

/// POST /api/auth/register/teacher: Create a teacher account and return a JWT.
async fn register_teacher(
    State(state): State<AppState>,
    Json(params): Json<RegisterParams>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    register(&state, UserType::Teacher, &params).await
}

/// POST /api/auth/login: Check credentials and return a JWT.
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = AccountService::authenticate(&state.pool, &req.username, &req.password).await?;
    let summary = AccountService::summary(&state.pool, user.id).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(issue_token(&state, &user, summary.user_type)?))
}
