//! Accounts: registration, credential checks, profiles and user search.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use elearn_common::error::AppError;
use elearn_common::types::{ChatRoom, StatusUpdate, User, UserSummary, UserType};

use crate::access::Actor;
use crate::chat::ChatRoomService;
use crate::courses::{CourseService, CourseSummary};
use crate::notifications::{Inbox, NotificationService};
use crate::status::StatusService;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_USERNAME_CHARS: usize = 150;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterParams {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileParams {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

/// The caller's own dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: UserSummary,
    /// Enrolled courses for students, taught courses for teachers.
    pub courses: Vec<CourseSummary>,
    pub unread_notifications: Inbox,
    pub chat_rooms: Vec<ChatRoom>,
    pub status_updates: Vec<StatusUpdate>,
}

/// What anyone can see about another user.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub user: UserSummary,
    pub courses: Vec<CourseSummary>,
    pub status_updates: Vec<StatusUpdate>,
}

const SUMMARY_SELECT: &str = r#"
    SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.profile_picture, eu.user_type
    FROM users u
    LEFT JOIN elearn_users eu ON eu.user_id = u.id
"#;

pub struct AccountService;

impl AccountService {
    pub fn validate_email(email: &str) -> Result<(), AppError> {
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(AppError::Validation(format!("Invalid email address '{}'", email))),
        }
    }

    pub fn validate_profile_picture(reference: &str) -> Result<(), AppError> {
        let ext = reference
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Profile picture must be one of: {}",
                IMAGE_EXTENSIONS.join(", ")
            )))
        }
    }

    pub fn validate_registration(params: &RegisterParams) -> Result<(), AppError> {
        let username = params.username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AppError::Validation(format!(
                "Username exceeds {} characters",
                MAX_USERNAME_CHARS
            )));
        }
        if params.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Self::validate_email(params.email.trim())?;
        if let Some(picture) = params.profile_picture.as_deref() {
            Self::validate_profile_picture(picture)?;
        }
        Ok(())
    }

    async fn hash_password(password: String) -> Result<String, AppError> {
        tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Create an account with its role.
    pub async fn register(
        pool: &PgPool,
        user_type: UserType,
        params: &RegisterParams,
    ) -> Result<User, AppError> {
        Self::validate_registration(params)?;
        let username = params.username.trim().to_string();
        let password_hash = Self::hash_password(params.password.clone()).await?;

        let mut tx = pool.begin().await?;
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (username, password_hash, first_name, last_name, email, profile_picture)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&username)
        .bind(&password_hash)
        .bind(params.first_name.trim())
        .bind(params.last_name.trim())
        .bind(params.email.trim())
        .bind(&params.profile_picture)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_constraint(e, format!("Username '{}' is taken", username)))?;

        sqlx::query("INSERT INTO elearn_users (user_id, user_type) VALUES ($1, $2)")
            .bind(user.id)
            .bind(user_type.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, username = %user.username, user_type = %user_type, "Account registered");
        Ok(user)
    }

    /// Check a username/password pair.
    pub async fn authenticate(pool: &PgPool, username: &str, password: &str) -> Result<User, AppError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username.trim())
            .fetch_optional(pool)
            .await?;

        let invalid = || AppError::Auth("Invalid username or password".to_string());
        let user = user.ok_or_else(invalid)?;

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?
            .unwrap_or(false);

        if !valid {
            tracing::debug!(username = %user.username, "Rejected login");
            return Err(invalid());
        }
        Ok(user)
    }

    pub async fn summary(pool: &PgPool, user_id: Uuid) -> Result<UserSummary, AppError> {
        sqlx::query_as(&format!("{} WHERE u.id = $1", SUMMARY_SELECT))
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn courses_for(pool: &PgPool, user: &UserSummary) -> Result<Vec<CourseSummary>, AppError> {
        match user.user_type {
            Some(UserType::Teacher) => CourseService::taught_courses(pool, user.id).await,
            Some(UserType::Student) => CourseService::enrolled_courses(pool, user.id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn profile(pool: &PgPool, actor: &Actor) -> Result<Profile, AppError> {
        let user = Self::summary(pool, actor.user_id).await?;
        let courses = Self::courses_for(pool, &user).await?;
        let unread_notifications = NotificationService::inbox(pool, actor, true).await?;
        let chat_rooms = ChatRoomService::list_for_member(pool, actor.user_id).await?;
        let status_updates = StatusService::list_for_user(pool, actor.user_id).await?;

        Ok(Profile {
            user,
            courses,
            unread_notifications,
            chat_rooms,
            status_updates,
        })
    }

    pub async fn update_profile(
        pool: &PgPool,
        actor: &Actor,
        params: &UpdateProfileParams,
    ) -> Result<UserSummary, AppError> {
        if let Some(email) = params.email.as_deref() {
            Self::validate_email(email.trim())?;
        }
        if let Some(picture) = params.profile_picture.as_deref() {
            Self::validate_profile_picture(picture)?;
        }

        sqlx::query(
            r#"
            UPDATE users
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                profile_picture = COALESCE($4, profile_picture),
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(params.first_name.as_deref().map(str::trim))
        .bind(params.last_name.as_deref().map(str::trim))
        .bind(params.email.as_deref().map(str::trim))
        .bind(params.profile_picture.as_deref())
        .bind(actor.user_id)
        .execute(pool)
        .await?;

        Self::summary(pool, actor.user_id).await
    }

    pub async fn public_profile(pool: &PgPool, user_id: Uuid) -> Result<PublicProfile, AppError> {
        let user = Self::summary(pool, user_id).await?;
        let courses = Self::courses_for(pool, &user).await?;
        let status_updates = StatusService::list_for_user(pool, user_id).await?;
        Ok(PublicProfile {
            user,
            courses,
            status_updates,
        })
    }

    /// Case-insensitive substring search over username and names.
    pub async fn search(pool: &PgPool, query: &str) -> Result<Vec<UserSummary>, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", escape_like(query));
        let users = sqlx::query_as(&format!(
            r#"
            {} WHERE u.username ILIKE $1 OR u.first_name ILIKE $1 OR u.last_name ILIKE $1
            ORDER BY u.username
            LIMIT $2
            "#,
            SUMMARY_SELECT
        ))
        .bind(&pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(pool)
        .await?;
        Ok(users)
    }
}

/// Escape LIKE wildcards so user input matches literally.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
