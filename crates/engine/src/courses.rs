//! Course service: creation, editing, listing and enrollment windows.
//!
//! Every course owns a discussion chat room created in the same transaction
//! as the course itself; its membership follows enrollment (see
//! [`crate::enrollment`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{Course, EnrollmentStatus, Page, PageParams, UserSummary};

use crate::access::{self, Actor};
use crate::chat::ChatRoomService;
use crate::materials::{MaterialService, MaterialView};

/// Course row joined with the teacher's display name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub enrollment_status: EnrollmentStatus,
}

/// Everything the course page shows to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub course: CourseSummary,
    pub materials: Vec<MaterialView>,
    pub is_enrolled: bool,
    /// Discussion room name, present only for participants.
    pub discussion_room: Option<String>,
    /// Enrolled students, visible to the course teacher only.
    pub students: Option<Vec<UserSummary>>,
    /// Blocked students, visible to the course teacher only.
    pub blocked_students: Option<Vec<UserSummary>>,
}

/// Parameters for creating a course.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseParams {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub enrollment_status: Option<EnrollmentStatus>,
}

/// Partial course update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourseParams {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub enrollment_status: Option<EnrollmentStatus>,
}

/// Filters for the course catalogue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseQuery {
    /// Case-insensitive substring of the course name.
    pub search: Option<String>,
    /// Exact course code.
    pub code: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl CourseQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

const SUMMARY_SELECT: &str = r#"
    SELECT c.id, c.code, c.name, c.description, c.teacher_id,
           (u.first_name || ' ' || u.last_name) AS teacher_name,
           c.start_date, c.end_date, c.enrollment_status
    FROM courses c
    JOIN users u ON u.id = c.teacher_id
"#;

/// Service layer for courses.
pub struct CourseService;

impl CourseService {
    /// Check the fields every course must satisfy.
    pub fn validate(
        code: &str,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<(), AppError> {
        if code.trim().is_empty() {
            return Err(AppError::Validation("Course code is required".to_string()));
        }
        if name.trim().is_empty() {
            return Err(AppError::Validation("Course name is required".to_string()));
        }
        if end_date < start_date {
            return Err(AppError::Validation(
                "Course end date must not precede its start date".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a course taught by the caller, plus its discussion room.
    pub async fn create(
        pool: &PgPool,
        actor: &Actor,
        params: &CreateCourseParams,
    ) -> Result<Course, AppError> {
        actor.require_teacher("create courses")?;
        Self::validate(&params.code, &params.name, params.start_date, params.end_date)?;

        let status = params.enrollment_status.unwrap_or(EnrollmentStatus::Open);
        let mut tx = pool.begin().await?;

        let course: Course = sqlx::query_as(
            r#"
            INSERT INTO courses (code, name, description, teacher_id, start_date, end_date, enrollment_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(params.code.trim())
        .bind(params.name.trim())
        .bind(&params.description)
        .bind(actor.user_id)
        .bind(params.start_date)
        .bind(params.end_date)
        .bind(status.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_constraint(e, format!("Course code '{}' already exists", params.code))
        })?;

        ChatRoomService::create_course_room(&mut tx, &course).await?;
        tx.commit().await?;

        tracing::info!(
            course_id = %course.id,
            code = %course.code,
            teacher_id = %actor.user_id,
            "Course created"
        );

        Ok(course)
    }

    /// Fetch a course by ID.
    pub async fn get(pool: &PgPool, course_id: Uuid) -> Result<Course, AppError> {
        sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
    }

    /// Fetch a course and hold its row lock until the transaction ends.
    pub async fn lock(conn: &mut PgConnection, course_id: Uuid) -> Result<Course, AppError> {
        sqlx::query_as("SELECT * FROM courses WHERE id = $1 FOR UPDATE")
            .bind(course_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
    }

    pub async fn summary(pool: &PgPool, course_id: Uuid) -> Result<CourseSummary, AppError> {
        sqlx::query_as(&format!("{} WHERE c.id = $1", SUMMARY_SELECT))
            .bind(course_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
    }

    /// Update a course. Only its teacher may do this.
    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        params: &UpdateCourseParams,
    ) -> Result<Course, AppError> {
        let existing = Self::get(pool, course_id).await?;
        actor.require_course_teacher(&existing, "edit this course")?;

        let code = params.code.clone().unwrap_or_else(|| existing.code.clone());
        let name = params.name.clone().unwrap_or_else(|| existing.name.clone());
        let description = params
            .description
            .clone()
            .unwrap_or_else(|| existing.description.clone());
        let start_date = params.start_date.unwrap_or(existing.start_date);
        let end_date = params.end_date.unwrap_or(existing.end_date);
        let status = params
            .enrollment_status
            .unwrap_or(existing.enrollment_status);
        Self::validate(&code, &name, start_date, end_date)?;

        let mut tx = pool.begin().await?;
        let course: Course = sqlx::query_as(
            r#"
            UPDATE courses
            SET code = $1, name = $2, description = $3, start_date = $4, end_date = $5,
                enrollment_status = $6
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(code.trim())
        .bind(name.trim())
        .bind(&description)
        .bind(start_date)
        .bind(end_date)
        .bind(status.to_string())
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_constraint(e, format!("Course code '{}' already exists", code)))?;

        if course.code != existing.code {
            ChatRoomService::rename_course_room(&mut tx, &course).await?;
        }
        tx.commit().await?;

        tracing::info!(course_id = %course_id, "Course updated");
        Ok(course)
    }

    /// Delete a course and everything hanging off it.
    pub async fn delete(pool: &PgPool, actor: &Actor, course_id: Uuid) -> Result<(), AppError> {
        let course = Self::get(pool, course_id).await?;
        actor.require_course_teacher(&course, "delete this course")?;

        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(course_id)
            .execute(pool)
            .await?;

        tracing::info!(course_id = %course_id, code = %course.code, "Course deleted");
        Ok(())
    }

    /// Open or close the enrollment window.
    pub async fn set_enrollment_status(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        status: EnrollmentStatus,
    ) -> Result<Course, AppError> {
        let course = Self::get(pool, course_id).await?;
        actor.require_course_teacher(&course, "change enrollment")?;

        let course: Course = sqlx::query_as(
            "UPDATE courses SET enrollment_status = $1 WHERE id = $2 RETURNING *",
        )
        .bind(status.to_string())
        .bind(course_id)
        .fetch_one(pool)
        .await?;

        tracing::info!(course_id = %course_id, status = %status, "Enrollment status changed");
        Ok(course)
    }

    /// Course catalogue: teachers see what they teach, everyone else sees open courses.
    pub async fn list(
        pool: &PgPool,
        actor: &Actor,
        query: &CourseQuery,
        default_page_size: i64,
    ) -> Result<Page<CourseSummary>, AppError> {
        let teacher_filter = actor.is_teacher().then_some(actor.user_id);
        let status_filter = (!actor.is_teacher()).then(|| EnrollmentStatus::Open.to_string());
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let code = query.code.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let (limit, offset) = query.page_params().limit_offset(default_page_size);

        let filter = r#"
            WHERE ($1::uuid IS NULL OR c.teacher_id = $1)
              AND ($2::text IS NULL OR c.enrollment_status = $2)
              AND ($3::text IS NULL OR c.name ILIKE '%' || $3 || '%')
              AND ($4::text IS NULL OR c.code = $4)
        "#;

        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM courses c {}", filter))
            .bind(teacher_filter)
            .bind(&status_filter)
            .bind(search)
            .bind(code)
            .fetch_one(pool)
            .await?;

        let results: Vec<CourseSummary> = sqlx::query_as(&format!(
            "{} {} ORDER BY c.start_date DESC, c.code LIMIT $5 OFFSET $6",
            SUMMARY_SELECT, filter
        ))
        .bind(teacher_filter)
        .bind(&status_filter)
        .bind(search)
        .bind(code)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(Page { count, results })
    }

    /// Courses a student is enrolled in.
    pub async fn enrolled_courses(
        pool: &PgPool,
        student_id: Uuid,
    ) -> Result<Vec<CourseSummary>, AppError> {
        let courses = sqlx::query_as(&format!(
            "{} JOIN enrollments e ON e.course_id = c.id WHERE e.student_id = $1 ORDER BY c.start_date DESC",
            SUMMARY_SELECT
        ))
        .bind(student_id)
        .fetch_all(pool)
        .await?;
        Ok(courses)
    }

    /// Courses a teacher teaches.
    pub async fn taught_courses(
        pool: &PgPool,
        teacher_id: Uuid,
    ) -> Result<Vec<CourseSummary>, AppError> {
        let courses = sqlx::query_as(&format!(
            "{} WHERE c.teacher_id = $1 ORDER BY c.start_date DESC",
            SUMMARY_SELECT
        ))
        .bind(teacher_id)
        .fetch_all(pool)
        .await?;
        Ok(courses)
    }

    /// The caller's own courses, by role.
    pub async fn mine(pool: &PgPool, actor: &Actor) -> Result<Vec<CourseSummary>, AppError> {
        if actor.is_teacher() {
            Self::taught_courses(pool, actor.user_id).await
        } else if actor.is_student() {
            Self::enrolled_courses(pool, actor.user_id).await
        } else {
            Ok(Vec::new())
        }
    }

    /// Course page for the caller.
    pub async fn detail(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<CourseDetail, AppError> {
        let course = Self::get(pool, course_id).await?;
        let summary = Self::summary(pool, course_id).await?;
        let materials = MaterialService::list_for_course(pool, actor, &course).await?;
        let is_enrolled = access::is_enrolled(pool, actor.user_id, course_id).await?;
        let participant = is_enrolled || actor.teaches(&course);

        let discussion_room = if participant {
            ChatRoomService::course_room(pool, course_id)
                .await?
                .map(|room| room.chat_name)
        } else {
            None
        };

        let (students, blocked_students) = if actor.teaches(&course) {
            (
                Some(Self::students(pool, course_id).await?),
                Some(Self::blocked_students(pool, course_id).await?),
            )
        } else {
            (None, None)
        };

        Ok(CourseDetail {
            course: summary,
            materials,
            is_enrolled,
            discussion_room,
            students,
            blocked_students,
        })
    }

    /// Students currently enrolled in a course.
    pub async fn students(pool: &PgPool, course_id: Uuid) -> Result<Vec<UserSummary>, AppError> {
        let students = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.profile_picture, eu.user_type
            FROM enrollments e
            JOIN users u ON u.id = e.student_id
            JOIN elearn_users eu ON eu.user_id = u.id
            WHERE e.course_id = $1
            ORDER BY u.last_name, u.first_name
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;
        Ok(students)
    }

    /// Students blocked from a course.
    pub async fn blocked_students(
        pool: &PgPool,
        course_id: Uuid,
    ) -> Result<Vec<UserSummary>, AppError> {
        let students = sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.profile_picture, eu.user_type
            FROM course_blocked_students b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN elearn_users eu ON eu.user_id = u.id
            WHERE b.course_id = $1
            ORDER BY b.blocked_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_accepts_single_day_course() {
        assert!(CourseService::validate("CM101", "Intro", date(2024, 9, 1), date(2024, 9, 1)).is_ok());
    }

    #[test]
    fn test_validate_rejects_reversed_dates() {
        let result = CourseService::validate("CM101", "Intro", date(2024, 12, 31), date(2024, 9, 1));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert!(CourseService::validate("  ", "Intro", date(2024, 9, 1), date(2024, 12, 1)).is_err());
        assert!(CourseService::validate("CM101", "", date(2024, 9, 1), date(2024, 12, 1)).is_err());
    }

    #[test]
    fn test_course_query_page_params() {
        let query: CourseQuery =
            serde_json::from_value(serde_json::json!({"search": "web", "page": 2})).unwrap();
        assert_eq!(query.search.as_deref(), Some("web"));
        assert_eq!(query.page_params().limit_offset(20), (20, 20));
    }
}
