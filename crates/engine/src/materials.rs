//! Material service: upload records, visibility, and material fan-out.
//!
//! Visibility on a course page: the course teacher sees every material,
//! everyone else sees the teacher's uploads plus their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{Course, Material, UserType};

use crate::access::{self, Actor};
use crate::courses::CourseService;
use crate::fanout::NotificationFanout;

/// Name given to materials uploaded without one.
pub const DEFAULT_MATERIAL_NAME: &str = "Untitled Material";

/// Material joined with course and uploader details.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MaterialView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_name: String,
    pub name: String,
    pub description: String,
    pub file: String,
    pub file_type: String,
    pub upload_date: DateTime<Utc>,
    pub uploader_id: Uuid,
    pub uploader_name: String,
    pub uploader_type: UserType,
}

/// Parameters for adding a material to a course.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMaterialParams {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Storage reference (path or URL) of the uploaded file.
    pub file: String,
    pub file_type: Option<String>,
}

/// Partial material update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMaterialParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub file: Option<String>,
    pub file_type: Option<String>,
}

/// Result of a material upload, including how many students were notified.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedMaterial {
    pub material: Material,
    pub notified_students: u64,
}

const VIEW_SELECT: &str = r#"
    SELECT m.id, m.course_id, c.name AS course_name, m.name, m.description, m.file,
           m.file_type, m.upload_date, m.uploader_id,
           (u.first_name || ' ' || u.last_name) AS uploader_name,
           eu.user_type AS uploader_type
    FROM materials m
    JOIN courses c ON c.id = m.course_id
    JOIN elearn_users eu ON eu.user_id = m.uploader_id
    JOIN users u ON u.id = m.uploader_id
"#;

/// Service layer for course materials.
pub struct MaterialService;

impl MaterialService {
    /// Lower-cased extension of the file reference, without query strings.
    pub fn derive_file_type(file: &str) -> String {
        let path = file.split(['?', '#']).next().unwrap_or(file);
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    fn resolve_name(name: Option<&str>) -> String {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => DEFAULT_MATERIAL_NAME.to_string(),
        }
    }

    /// Upload a material and notify every enrolled student.
    ///
    /// The uploader must be the course teacher or a student enrolled in it.
    pub async fn create(
        pool: &PgPool,
        actor: &Actor,
        course_id: Uuid,
        params: &CreateMaterialParams,
    ) -> Result<CreatedMaterial, AppError> {
        let course = CourseService::get(pool, course_id).await?;
        if actor.user_type.is_none() || !access::is_participant(pool, actor, &course).await? {
            return Err(AppError::Forbidden(
                "Only the course teacher or enrolled students can add materials".to_string(),
            ));
        }

        let file = params.file.trim();
        if file.is_empty() {
            return Err(AppError::Validation("A file reference is required".to_string()));
        }
        let name = Self::resolve_name(params.name.as_deref());
        let file_type = params
            .file_type
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Self::derive_file_type(file));

        let mut tx = pool.begin().await?;
        let material: Material = sqlx::query_as(
            r#"
            INSERT INTO materials (course_id, uploader_id, file, file_type, name, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(course.id)
        .bind(actor.user_id)
        .bind(file)
        .bind(&file_type)
        .bind(&name)
        .bind(&params.description)
        .fetch_one(&mut *tx)
        .await?;

        let notified_students = NotificationFanout::on_material_created(&mut tx, &material).await?;
        tx.commit().await?;

        tracing::info!(
            material_id = %material.id,
            course_id = %course.id,
            uploader_id = %actor.user_id,
            notified_students,
            "Material added"
        );

        Ok(CreatedMaterial {
            material,
            notified_students,
        })
    }

    pub async fn get_raw(pool: &PgPool, material_id: Uuid) -> Result<Material, AppError> {
        sqlx::query_as("SELECT * FROM materials WHERE id = $1")
            .bind(material_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Material {} not found", material_id)))
    }

    /// Fetch one material, applying the course visibility rule.
    pub async fn get(
        pool: &PgPool,
        actor: &Actor,
        material_id: Uuid,
    ) -> Result<MaterialView, AppError> {
        let view: MaterialView = sqlx::query_as(&format!("{} WHERE m.id = $1", VIEW_SELECT))
            .bind(material_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Material {} not found", material_id)))?;

        let course = CourseService::get(pool, view.course_id).await?;
        if !Self::is_visible(actor, &course, view.uploader_id) {
            return Err(AppError::NotFound(format!("Material {} not found", material_id)));
        }
        Ok(view)
    }

    /// Visibility rule shared by single fetches and course listings.
    pub fn is_visible(actor: &Actor, course: &Course, uploader_id: Uuid) -> bool {
        actor.teaches(course) || uploader_id == course.teacher_id || uploader_id == actor.user_id
    }

    /// Materials of one course visible to the caller.
    pub async fn list_for_course(
        pool: &PgPool,
        actor: &Actor,
        course: &Course,
    ) -> Result<Vec<MaterialView>, AppError> {
        let materials = sqlx::query_as(&format!(
            r#"
            {} WHERE m.course_id = $1
              AND ($2 OR m.uploader_id = c.teacher_id OR m.uploader_id = $3)
            ORDER BY m.upload_date DESC
            "#,
            VIEW_SELECT
        ))
        .bind(course.id)
        .bind(actor.teaches(course))
        .bind(actor.user_id)
        .fetch_all(pool)
        .await?;
        Ok(materials)
    }

    /// Every material the caller can reach: teachers get what they teach,
    /// students get materials of enrolled courses plus their own uploads.
    pub async fn list_visible(pool: &PgPool, actor: &Actor) -> Result<Vec<MaterialView>, AppError> {
        let materials = if actor.is_teacher() {
            sqlx::query_as(&format!(
                "{} WHERE c.teacher_id = $1 ORDER BY m.upload_date DESC",
                VIEW_SELECT
            ))
            .bind(actor.user_id)
            .fetch_all(pool)
            .await?
        } else {
            sqlx::query_as(&format!(
                r#"
                {} WHERE m.uploader_id = $1
                   OR (m.uploader_id = c.teacher_id
                       AND EXISTS (SELECT 1 FROM enrollments e
                                   WHERE e.course_id = m.course_id AND e.student_id = $1))
                ORDER BY m.upload_date DESC
                "#,
                VIEW_SELECT
            ))
            .bind(actor.user_id)
            .fetch_all(pool)
            .await?
        };
        Ok(materials)
    }

    fn require_editor(actor: &Actor, course: &Course, material: &Material) -> Result<(), AppError> {
        if material.uploader_id == actor.user_id || actor.teaches(course) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only the uploader or the course teacher can change this material".to_string(),
            ))
        }
    }

    /// Update a material's metadata or file. Does not re-notify students.
    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        material_id: Uuid,
        params: &UpdateMaterialParams,
    ) -> Result<Material, AppError> {
        let existing = Self::get_raw(pool, material_id).await?;
        let course = CourseService::get(pool, existing.course_id).await?;
        Self::require_editor(actor, &course, &existing)?;

        let file = match params.file.as_deref().map(str::trim) {
            Some("") => {
                return Err(AppError::Validation("A file reference is required".to_string()));
            }
            Some(f) => f.to_string(),
            None => existing.file.clone(),
        };
        let file_type = match (&params.file_type, &params.file) {
            (Some(t), _) if !t.trim().is_empty() => t.clone(),
            (_, Some(_)) => Self::derive_file_type(&file),
            _ => existing.file_type.clone(),
        };
        let name = match &params.name {
            Some(n) => Self::resolve_name(Some(n)),
            None => existing.name.clone(),
        };
        let description = params
            .description
            .clone()
            .unwrap_or_else(|| existing.description.clone());

        let material: Material = sqlx::query_as(
            r#"
            UPDATE materials
            SET file = $1, file_type = $2, name = $3, description = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&file)
        .bind(&file_type)
        .bind(&name)
        .bind(&description)
        .bind(material_id)
        .fetch_one(pool)
        .await?;

        tracing::info!(material_id = %material_id, "Material updated");
        Ok(material)
    }

    /// Delete a material; its notifications go with it.
    pub async fn delete(pool: &PgPool, actor: &Actor, material_id: Uuid) -> Result<(), AppError> {
        let existing = Self::get_raw(pool, material_id).await?;
        let course = CourseService::get(pool, existing.course_id).await?;
        Self::require_editor(actor, &course, &existing)?;

        sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(material_id)
            .execute(pool)
            .await?;

        tracing::info!(material_id = %material_id, course_id = %course.id, "Material deleted");
        Ok(())
    }
}
