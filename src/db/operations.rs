use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::models::{AnalysisEntry, ClassInfo, Reflection, Role, Sentiment, User, UserSession};
use crate::db::store::{StudentProfile, Store};
use crate::error::DatabaseError;
use crate::{AppError, Result};

const USER_COLUMNS: &str = "id, role, name, login_id, student_number, class_id, password_hash, \
     is_first_login, is_active, ai_api_key, created_at, updated_at";
const CLASS_COLUMNS: &str = "id, name, year, teacher_id, target_days, created_at";
const REFLECTION_COLUMNS: &str = "id, student_id, date, attitude_rating, learned_content, activities, \
     collaboration, created_at, updated_at, ai_feedback, sentiment, teacher_feedback";
const ANALYSIS_COLUMNS: &str = "class_id, date, result, generated_at";
const SESSION_COLUMNS: &str = "id, user_id, expires_at, created_at, last_activity";

/// Postgres-backed [`Store`].
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub fn pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for DbOperations {
    async fn insert_user(&self, user: &User) -> Result<User> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.role)
            .bind(&user.name)
            .bind(&user.login_id)
            .bind(&user.student_number)
            .bind(user.class_id)
            .bind(&user.password_hash)
            .bind(user.is_first_login)
            .bind(user.is_active)
            .bind(&user.ai_api_key)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn find_user_by_login_id(&self, login_id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE login_id = $1 LIMIT 1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(login_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn find_students_by_number(&self, class_id: Uuid, student_number: &str) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = 'STUDENT' AND class_id = $1 AND student_number = $2"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(class_id)
            .bind(student_number)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(users)
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(role)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(users)
    }

    async fn list_students(&self, class_id: Uuid) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = 'STUDENT' AND class_id = $1 ORDER BY student_number"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(class_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(users)
    }

    async fn count_students_in_class(&self, class_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'STUDENT' AND class_id = $1",
        )
        .bind(class_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str, is_first_login: bool) -> Result<User> {
        let sql = format!(
            "UPDATE users SET password_hash = $1, is_first_login = $2, updated_at = $3 \
             WHERE id = $4 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(password_hash)
            .bind(is_first_login)
            .bind(Utc::now())
            .bind(user_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn update_student_profile(&self, user_id: Uuid, profile: &StudentProfile) -> Result<User> {
        let sql = format!(
            "UPDATE users SET name = $1, student_number = $2, class_id = $3, updated_at = $4 \
             WHERE id = $5 AND role = 'STUDENT' RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(&profile.name)
            .bind(&profile.student_number)
            .bind(profile.class_id)
            .bind(Utc::now())
            .bind(user_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Result<User> {
        let sql = format!(
            "UPDATE users SET is_active = $1, updated_at = $2 WHERE id = $3 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(is_active)
            .bind(Utc::now())
            .bind(user_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn set_ai_api_key(&self, user_id: Uuid, sealed_key: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE users SET ai_api_key = $1, updated_at = $2 WHERE id = $3")
            .bind(sealed_key)
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound.into());
        }
        Ok(())
    }

    async fn insert_class(&self, class: &ClassInfo) -> Result<ClassInfo> {
        let sql = format!(
            "INSERT INTO classes ({CLASS_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {CLASS_COLUMNS}"
        );
        let class = sqlx::query_as::<_, ClassInfo>(&sql)
            .bind(class.id)
            .bind(&class.name)
            .bind(&class.year)
            .bind(class.teacher_id)
            .bind(class.target_days)
            .bind(class.created_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(class)
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<ClassInfo>> {
        let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1");
        let class = sqlx::query_as::<_, ClassInfo>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(class)
    }

    async fn list_classes(&self, year: Option<&str>) -> Result<Vec<ClassInfo>> {
        let sql = format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE ($1::TEXT IS NULL OR year = $1) ORDER BY year DESC, name"
        );
        let classes = sqlx::query_as::<_, ClassInfo>(&sql)
            .bind(year)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(classes)
    }

    async fn list_classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassInfo>> {
        let sql = format!("SELECT {CLASS_COLUMNS} FROM classes WHERE teacher_id = $1 ORDER BY year DESC, name");
        let classes = sqlx::query_as::<_, ClassInfo>(&sql)
            .bind(teacher_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(classes)
    }

    async fn update_class(&self, class: &ClassInfo) -> Result<ClassInfo> {
        let sql = format!(
            "UPDATE classes SET name = $1, year = $2, target_days = $3 WHERE id = $4 RETURNING {CLASS_COLUMNS}"
        );
        let class = sqlx::query_as::<_, ClassInfo>(&sql)
            .bind(&class.name)
            .bind(&class.year)
            .bind(class.target_days)
            .bind(class.id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(class)
    }

    async fn delete_class(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound.into());
        }
        Ok(())
    }

    async fn insert_reflection(&self, reflection: &Reflection) -> Result<Reflection> {
        let sql = format!(
            "INSERT INTO reflections ({REFLECTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {REFLECTION_COLUMNS}"
        );
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(reflection.id)
            .bind(reflection.student_id)
            .bind(reflection.date)
            .bind(reflection.attitude_rating)
            .bind(&reflection.learned_content)
            .bind(&reflection.activities)
            .bind(&reflection.collaboration)
            .bind(reflection.created_at)
            .bind(reflection.updated_at)
            .bind(&reflection.ai_feedback)
            .bind(reflection.sentiment)
            .bind(&reflection.teacher_feedback)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>> {
        let sql = format!("SELECT {REFLECTION_COLUMNS} FROM reflections WHERE id = $1");
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn find_reflection(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<Reflection>> {
        let sql = format!("SELECT {REFLECTION_COLUMNS} FROM reflections WHERE student_id = $1 AND date = $2");
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(student_id)
            .bind(date)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn update_reflection_content(&self, reflection: &Reflection) -> Result<Reflection> {
        let sql = format!(
            "UPDATE reflections SET attitude_rating = $1, learned_content = $2, activities = $3, \
             collaboration = $4, updated_at = $5, ai_feedback = NULL, sentiment = NULL \
             WHERE id = $6 RETURNING {REFLECTION_COLUMNS}"
        );
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(reflection.attitude_rating)
            .bind(&reflection.learned_content)
            .bind(&reflection.activities)
            .bind(&reflection.collaboration)
            .bind(reflection.updated_at)
            .bind(reflection.id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn set_ai_feedback(&self, id: Uuid, feedback: &str, sentiment: Sentiment) -> Result<Reflection> {
        let sql = format!(
            "UPDATE reflections SET ai_feedback = $1, sentiment = $2 WHERE id = $3 RETURNING {REFLECTION_COLUMNS}"
        );
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(feedback)
            .bind(sentiment)
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn set_teacher_feedback(&self, id: Uuid, feedback: Option<&str>, at: DateTime<Utc>) -> Result<Reflection> {
        let sql = format!(
            "UPDATE reflections SET teacher_feedback = $1, updated_at = $2 WHERE id = $3 RETURNING {REFLECTION_COLUMNS}"
        );
        let reflection = sqlx::query_as::<_, Reflection>(&sql)
            .bind(feedback)
            .bind(at)
            .bind(id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(reflection)
    }

    async fn list_reflections_for_student(&self, student_id: Uuid) -> Result<Vec<Reflection>> {
        let sql = format!("SELECT {REFLECTION_COLUMNS} FROM reflections WHERE student_id = $1 ORDER BY date DESC");
        let reflections = sqlx::query_as::<_, Reflection>(&sql)
            .bind(student_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(reflections)
    }

    async fn list_reflections_for_students(&self, student_ids: &[Uuid], date: Option<NaiveDate>) -> Result<Vec<Reflection>> {
        let sql = format!(
            "SELECT {REFLECTION_COLUMNS} FROM reflections \
             WHERE student_id = ANY($1) AND ($2::DATE IS NULL OR date = $2) ORDER BY date DESC"
        );
        let reflections = sqlx::query_as::<_, Reflection>(&sql)
            .bind(student_ids)
            .bind(date)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(reflections)
    }

    async fn put_analysis(&self, entry: &AnalysisEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO analyses (class_id, date, result, generated_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (class_id, date) DO UPDATE SET result = EXCLUDED.result, generated_at = EXCLUDED.generated_at",
        )
        .bind(entry.class_id)
        .bind(entry.date)
        .bind(&entry.result)
        .bind(entry.generated_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<Option<AnalysisEntry>> {
        let sql = format!("SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE class_id = $1 AND date = $2");
        let entry = sqlx::query_as::<_, AnalysisEntry>(&sql)
            .bind(class_id)
            .bind(date)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(entry)
    }

    async fn list_analyses(&self, class_id: Uuid) -> Result<Vec<AnalysisEntry>> {
        let sql = format!("SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE class_id = $1 ORDER BY date DESC");
        let entries = sqlx::query_as::<_, AnalysisEntry>(&sql)
            .bind(class_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(entries)
    }

    async fn delete_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<bool> {
        let result = sqlx::query("DELETE FROM analyses WHERE class_id = $1 AND date = $2")
            .bind(class_id)
            .bind(date)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(&self, session: &UserSession) -> Result<()> {
        let sql = format!("INSERT INTO user_sessions ({SESSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5)");
        sqlx::query(&sql)
            .bind(session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .bind(session.last_activity)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<UserSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, UserSession>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(session)
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE user_sessions SET last_activity = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM user_sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_stale_sessions(&self, idle_cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE last_activity < $1 OR expires_at < $2")
            .bind(idle_cutoff)
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
