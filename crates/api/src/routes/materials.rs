//! Course material routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::Material;
use elearn_engine::courses::CourseService;
use elearn_engine::materials::{
    CreateMaterialParams, CreatedMaterial, MaterialService, MaterialView, UpdateMaterialParams,
};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/courses/{id}/materials",
            get(course_materials).post(create_material),
        )
        .route("/api/materials", get(visible_materials))
        .route(
            "/api/materials/{id}",
            get(get_material)
                .patch(update_material)
                .delete(delete_material),
        )
}

/// GET /api/courses/:id/materials
async fn course_materials(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    let course = CourseService::get(&state.pool, id).await?;
    let materials = MaterialService::list_for_course(&state.pool, &auth.actor, &course).await?;
    Ok(Json(materials))
}

/// POST /api/courses/:id/materials: Upload; notifies every enrolled student.
async fn create_material(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<CreateMaterialParams>,
) -> Result<(StatusCode, Json<CreatedMaterial>), AppError> {
    let created = MaterialService::create(&state.pool, &auth.actor, id, &params).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/materials: Everything the caller can reach.
async fn visible_materials(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<MaterialView>>, AppError> {
    Ok(Json(
        MaterialService::list_visible(&state.pool, &auth.actor).await?,
    ))
}

/// GET /api/materials/:id
async fn get_material(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MaterialView>, AppError> {
    Ok(Json(MaterialService::get(&state.pool, &auth.actor, id).await?))
}

/// PATCH /api/materials/:id
async fn update_material(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<UpdateMaterialParams>,
) -> Result<Json<Material>, AppError> {
    Ok(Json(
        MaterialService::update(&state.pool, &auth.actor, id, &params).await?,
    ))
}

/// DELETE /api/materials/:id
async fn delete_material(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    MaterialService::delete(&state.pool, &auth.actor, id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}
