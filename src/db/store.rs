use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::models::{AnalysisEntry, ClassInfo, Reflection, Role, Sentiment, User, UserSession};
use crate::Result;

/// Field subset a teacher may change on an existing student.
#[derive(Debug, Clone)]
pub struct StudentProfile {
    pub name: String,
    pub student_number: String,
    pub class_id: Uuid,
}

/// Persistence boundary. Every mutation targets a single record (or a
/// single field subset of one); there is no whole-collection replace.
#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> Result<User>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Any role, active or not.
    async fn find_user_by_login_id(&self, login_id: &str) -> Result<Option<User>>;
    /// Students of a class holding `student_number`, active or not.
    async fn find_students_by_number(&self, class_id: Uuid, student_number: &str) -> Result<Vec<User>>;
    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>>;
    /// Students of a class, active or not, ordered by student number.
    async fn list_students(&self, class_id: Uuid) -> Result<Vec<User>>;
    async fn count_students_in_class(&self, class_id: Uuid) -> Result<i64>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str, is_first_login: bool) -> Result<User>;
    async fn update_student_profile(&self, user_id: Uuid, profile: &StudentProfile) -> Result<User>;
    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Result<User>;
    async fn set_ai_api_key(&self, user_id: Uuid, sealed_key: Option<&str>) -> Result<()>;

    // classes
    async fn insert_class(&self, class: &ClassInfo) -> Result<ClassInfo>;
    async fn get_class(&self, id: Uuid) -> Result<Option<ClassInfo>>;
    async fn list_classes(&self, year: Option<&str>) -> Result<Vec<ClassInfo>>;
    async fn list_classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassInfo>>;
    async fn update_class(&self, class: &ClassInfo) -> Result<ClassInfo>;
    async fn delete_class(&self, id: Uuid) -> Result<()>;

    // reflections
    async fn insert_reflection(&self, reflection: &Reflection) -> Result<Reflection>;
    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>>;
    async fn find_reflection(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<Reflection>>;
    /// Rewrites the submitted fields and `updated_at`, clearing any previous
    /// AI feedback.
    async fn update_reflection_content(&self, reflection: &Reflection) -> Result<Reflection>;
    async fn set_ai_feedback(&self, id: Uuid, feedback: &str, sentiment: Sentiment) -> Result<Reflection>;
    async fn set_teacher_feedback(&self, id: Uuid, feedback: Option<&str>, at: DateTime<Utc>) -> Result<Reflection>;
    /// Newest first.
    async fn list_reflections_for_student(&self, student_id: Uuid) -> Result<Vec<Reflection>>;
    /// Newest first; restricted to `date` when given.
    async fn list_reflections_for_students(&self, student_ids: &[Uuid], date: Option<NaiveDate>) -> Result<Vec<Reflection>>;

    // analyses
    async fn put_analysis(&self, entry: &AnalysisEntry) -> Result<()>;
    async fn get_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<Option<AnalysisEntry>>;
    /// Newest first.
    async fn list_analyses(&self, class_id: Uuid) -> Result<Vec<AnalysisEntry>>;
    /// Returns whether an entry existed.
    async fn delete_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<bool>;

    // sessions
    async fn insert_session(&self, session: &UserSession) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Option<UserSession>>;
    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn delete_session(&self, id: Uuid) -> Result<()>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64>;
    /// Removes sessions idle since before `idle_cutoff` or past `now`'s hard expiry.
    async fn delete_stale_sessions(&self, idle_cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64>;
}
