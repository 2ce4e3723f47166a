//! Course routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{Course, EnrollmentStatus, Page};
use elearn_engine::courses::{
    CourseDetail, CourseQuery, CourseService, CourseSummary, CreateCourseParams,
    UpdateCourseParams,
};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/mine", get(my_courses))
        .route(
            "/api/courses/{id}",
            get(course_detail).patch(update_course).delete(delete_course),
        )
        .route("/api/courses/{id}/enrollment/open", post(open_enrollment))
        .route("/api/courses/{id}/enrollment/close", post(close_enrollment))
}

/// GET /api/courses: Paginated catalogue.
async fn list_courses(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<CourseQuery>,
) -> Result<Json<Page<CourseSummary>>, AppError> {
    let page = CourseService::list(&state.pool, &auth.actor, &query, state.config.page_size).await?;
    Ok(Json(page))
}

/// POST /api/courses: Create a course (teachers only).
async fn create_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<CreateCourseParams>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let course = CourseService::create(&state.pool, &auth.actor, &params).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/courses/mine: Enrolled or taught courses.
async fn my_courses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    Ok(Json(CourseService::mine(&state.pool, &auth.actor).await?))
}

/// GET /api/courses/:id: Course page.
async fn course_detail(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>, AppError> {
    Ok(Json(CourseService::detail(&state.pool, &auth.actor, id).await?))
}

/// PATCH /api/courses/:id: Edit a course.
async fn update_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<UpdateCourseParams>,
) -> Result<Json<Course>, AppError> {
    let old_room = state.course_room_name(id).await;
    let course = CourseService::update(&state.pool, &auth.actor, id, &params).await?;
    if let Some(old_room) = old_room {
        state
            .room_renamed(&old_room, &course.discussion_room_name())
            .await;
    }
    Ok(Json(course))
}

/// DELETE /api/courses/:id: Delete a course and everything under it.
async fn delete_course(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let room = state.course_room_name(id).await;
    CourseService::delete(&state.pool, &auth.actor, id).await?;
    if let Some(room) = room {
        state.room_membership_changed(&room).await;
    }
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// POST /api/courses/:id/enrollment/open
async fn open_enrollment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Course>, AppError> {
    let course =
        CourseService::set_enrollment_status(&state.pool, &auth.actor, id, EnrollmentStatus::Open)
            .await?;
    Ok(Json(course))
}

/// POST /api/courses/:id/enrollment/close
async fn close_enrollment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Course>, AppError> {
    let course = CourseService::set_enrollment_status(
        &state.pool,
        &auth.actor,
        id,
        EnrollmentStatus::Closed,
    )
    .await?;
    Ok(Json(course))
}
