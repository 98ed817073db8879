use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::ai::analysis::ClassAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    /// Set for teachers and admins.
    pub login_id: Option<String>,
    /// Set for students; unique among active students of a class.
    pub student_number: Option<String>,
    pub class_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_first_login: bool,
    pub is_active: bool,
    /// Gemini key sealed by [`crate::ai::ApiKeyVault`].
    #[serde(skip_serializing)]
    pub ai_api_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new_staff(role: Role, name: String, login_id: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role,
            name,
            login_id: Some(login_id),
            student_number: None,
            class_id: None,
            password_hash,
            is_first_login: true,
            is_active: true,
            ai_api_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_student(name: String, student_number: String, class_id: Uuid, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role: Role::Student,
            name,
            login_id: None,
            student_number: Some(student_number),
            class_id: Some(class_id),
            password_hash,
            is_first_login: true,
            is_active: true,
            ai_api_key: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: Uuid,
    pub name: String,
    pub year: String,
    pub teacher_id: Uuid,
    pub target_days: i32,
    pub created_at: DateTime<Utc>,
}

impl ClassInfo {
    pub fn new(name: String, year: String, teacher_id: Uuid, target_days: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            year,
            teacher_id,
            target_days,
            created_at: Utc::now(),
        }
    }

    /// Share of target days covered, as a rounded percentage.
    pub fn completion_rate(&self, submitted: usize) -> i64 {
        if self.target_days <= 0 {
            return 0;
        }
        (submitted as f64 / self.target_days as f64 * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sentiment", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub attitude_rating: i32,
    pub learned_content: String,
    pub activities: String,
    pub collaboration: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ai_feedback: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub teacher_feedback: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AnalysisEntry {
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub result: Json<ClassAnalysis>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisEntry {
    pub fn new(class_id: Uuid, date: NaiveDate, result: ClassAnalysis) -> Self {
        Self {
            class_id,
            date,
            result: Json(result),
            generated_at: Utc::now(),
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.class_id, self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: Uuid, now: DateTime<Utc>, expires_in_hours: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            expires_at: now + chrono::Duration::hours(expires_in_hours),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_activity > idle_timeout
    }
}
