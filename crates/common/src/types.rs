use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role attached to an account. Accounts without a role (staff) can still
/// chat and post status updates but cannot teach or enroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Student,
    Teacher,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Student => write!(f, "student"),
            UserType::Teacher => write!(f, "teacher"),
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(UserType::Student),
            "teacher" => Ok(UserType::Teacher),
            other => Err(format!("Unknown user type '{}'", other)),
        }
    }
}

/// Whether a course currently accepts new enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Open,
    Closed,
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentStatus::Open => write!(f, "open"),
            EnrollmentStatus::Closed => write!(f, "closed"),
        }
    }
}

/// The three kinds of derived notification rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Enrollment,
    Material,
    Block,
}

impl NotificationKind {
    /// Backing table for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            NotificationKind::Enrollment => "enrollment_notifications",
            NotificationKind::Material => "material_notifications",
            NotificationKind::Block => "block_notifications",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Enrollment => write!(f, "enrollment"),
            NotificationKind::Material => write!(f, "material"),
            NotificationKind::Block => write!(f, "block"),
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrollment" => Ok(NotificationKind::Enrollment),
            "material" => Ok(NotificationKind::Material),
            "block" => Ok(NotificationKind::Block),
            other => Err(format!("Invalid notification type '{}'", other)),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Public view of an account together with its role.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub user_type: Option<UserType>,
}

/// Role row for an account (one-to-one with `users`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ElearnUser {
    pub user_id: Uuid,
    pub user_type: UserType,
}

/// A course taught by one teacher.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: String,
    pub teacher_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub enrollment_status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn is_open(&self) -> bool {
        self.enrollment_status == EnrollmentStatus::Open
    }

    /// Name of the discussion chat room that belongs to this course.
    pub fn discussion_room_name(&self) -> String {
        format!("Course {} Discussion", self.code)
    }
}

/// True for names of the `Course {code} Discussion` form owned by courses.
pub fn is_discussion_room_name(name: &str) -> bool {
    name.strip_prefix("Course ")
        .and_then(|rest| rest.strip_suffix(" Discussion"))
        .is_some_and(|code| !code.trim().is_empty())
}

/// An uploaded course material.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Material {
    pub id: Uuid,
    pub course_id: Uuid,
    pub uploader_id: Uuid,
    pub file: String,
    pub upload_date: DateTime<Utc>,
    pub file_type: String,
    pub name: String,
    pub description: String,
}

/// Course feedback left by a student.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A short post on a user's profile.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusUpdate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A chat room. Course discussion rooms carry the owning `course_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: Uuid,
    pub chat_name: String,
    pub admin_id: Uuid,
    pub course_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A student's enrollment in a course.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Derived from an `Enrollment`; addressed to both the student and the teacher.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentNotification {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Derived from a `Material`, one per enrolled student.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MaterialNotification {
    pub id: Uuid,
    pub material_id: Uuid,
    pub student_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Created when a teacher blocks a student from a course.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockNotification {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub message: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

/// Frame delivered to every session connected to a chat room group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub message_id: Uuid,
    pub room: String,
    pub user_id: Uuid,
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything carried on a chat room group.
///
/// Control events tell live sessions to re-check membership or follow a
/// renamed room; they are never forwarded to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    Message(ChatEvent),
    MembershipChanged,
    Renamed { chat_name: String },
}

/// Query parameters for paginated list endpoints (1-based page number).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Upper bound on a requested page size.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Upper bound on a requested page number.
pub const MAX_PAGE: i64 = 1_000_000;

impl PageParams {
    /// Resolve `(limit, offset)` using `default_size` when no size was given.
    pub fn limit_offset(&self, default_size: i64) -> (i64, i64) {
        let size = self
            .page_size
            .unwrap_or(default_size)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        (size, (page - 1).saturating_mul(size))
    }
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub results: Vec<T>,
}
