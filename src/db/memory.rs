//! In-process [`Store`] used for development runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{AnalysisEntry, ClassInfo, Reflection, Role, Sentiment, User, UserSession};
use crate::db::store::{StudentProfile, Store};
use crate::error::DatabaseError;
use crate::Result;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    classes: HashMap<Uuid, ClassInfo>,
    reflections: HashMap<Uuid, Reflection>,
    analyses: HashMap<(Uuid, NaiveDate), AnalysisEntry>,
    sessions: HashMap<Uuid, UserSession>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut reflections: Vec<Reflection>) -> Vec<Reflection> {
    reflections.sort_by(|a, b| b.date.cmp(&a.date));
    reflections
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(DatabaseError::Duplicate.into());
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_login_id(&self, login_id: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.login_id.as_deref() == Some(login_id))
            .cloned())
    }

    async fn find_students_by_number(&self, class_id: Uuid, student_number: &str) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| {
                u.role == Role::Student
                    && u.class_id == Some(class_id)
                    && u.student_number.as_deref() == Some(student_number)
            })
            .cloned()
            .collect())
    }

    async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().filter(|u| u.role == role).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn list_students(&self, class_id: Uuid) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.role == Role::Student && u.class_id == Some(class_id))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.student_number.cmp(&b.student_number));
        Ok(users)
    }

    async fn count_students_in_class(&self, class_id: Uuid) -> Result<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.role == Role::Student && u.class_id == Some(class_id))
            .count() as i64)
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str, is_first_login: bool) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(DatabaseError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.is_first_login = is_first_login;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_student_profile(&self, user_id: Uuid, profile: &StudentProfile) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .filter(|u| u.role == Role::Student)
            .ok_or(DatabaseError::NotFound)?;
        user.name = profile.name.clone();
        user.student_number = Some(profile.student_number.clone());
        user.class_id = Some(profile.class_id);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(DatabaseError::NotFound)?;
        user.is_active = is_active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_ai_api_key(&self, user_id: Uuid, sealed_key: Option<&str>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(DatabaseError::NotFound)?;
        user.ai_api_key = sealed_key.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_class(&self, class: &ClassInfo) -> Result<ClassInfo> {
        let mut tables = self.tables.write().await;
        if tables.classes.contains_key(&class.id) {
            return Err(DatabaseError::Duplicate.into());
        }
        tables.classes.insert(class.id, class.clone());
        Ok(class.clone())
    }

    async fn get_class(&self, id: Uuid) -> Result<Option<ClassInfo>> {
        Ok(self.tables.read().await.classes.get(&id).cloned())
    }

    async fn list_classes(&self, year: Option<&str>) -> Result<Vec<ClassInfo>> {
        let tables = self.tables.read().await;
        let mut classes: Vec<ClassInfo> = tables
            .classes
            .values()
            .filter(|c| year.map_or(true, |y| c.year == y))
            .cloned()
            .collect();
        classes.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.name.cmp(&b.name)));
        Ok(classes)
    }

    async fn list_classes_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<ClassInfo>> {
        let tables = self.tables.read().await;
        let mut classes: Vec<ClassInfo> = tables
            .classes
            .values()
            .filter(|c| c.teacher_id == teacher_id)
            .cloned()
            .collect();
        classes.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.name.cmp(&b.name)));
        Ok(classes)
    }

    async fn update_class(&self, class: &ClassInfo) -> Result<ClassInfo> {
        let mut tables = self.tables.write().await;
        let stored = tables.classes.get_mut(&class.id).ok_or(DatabaseError::NotFound)?;
        stored.name = class.name.clone();
        stored.year = class.year.clone();
        stored.target_days = class.target_days;
        Ok(stored.clone())
    }

    async fn delete_class(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.classes.remove(&id).ok_or(DatabaseError::NotFound)?;
        tables.analyses.retain(|(class_id, _), _| *class_id != id);
        Ok(())
    }

    async fn insert_reflection(&self, reflection: &Reflection) -> Result<Reflection> {
        let mut tables = self.tables.write().await;
        let clash = tables.reflections.values().any(|r| {
            r.id == reflection.id || (r.student_id == reflection.student_id && r.date == reflection.date)
        });
        if clash {
            return Err(DatabaseError::Duplicate.into());
        }
        tables.reflections.insert(reflection.id, reflection.clone());
        Ok(reflection.clone())
    }

    async fn get_reflection(&self, id: Uuid) -> Result<Option<Reflection>> {
        Ok(self.tables.read().await.reflections.get(&id).cloned())
    }

    async fn find_reflection(&self, student_id: Uuid, date: NaiveDate) -> Result<Option<Reflection>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reflections
            .values()
            .find(|r| r.student_id == student_id && r.date == date)
            .cloned())
    }

    async fn update_reflection_content(&self, reflection: &Reflection) -> Result<Reflection> {
        let mut tables = self.tables.write().await;
        let stored = tables.reflections.get_mut(&reflection.id).ok_or(DatabaseError::NotFound)?;
        stored.attitude_rating = reflection.attitude_rating;
        stored.learned_content = reflection.learned_content.clone();
        stored.activities = reflection.activities.clone();
        stored.collaboration = reflection.collaboration.clone();
        stored.updated_at = reflection.updated_at;
        stored.ai_feedback = None;
        stored.sentiment = None;
        Ok(stored.clone())
    }

    async fn set_ai_feedback(&self, id: Uuid, feedback: &str, sentiment: Sentiment) -> Result<Reflection> {
        let mut tables = self.tables.write().await;
        let stored = tables.reflections.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        stored.ai_feedback = Some(feedback.to_string());
        stored.sentiment = Some(sentiment);
        Ok(stored.clone())
    }

    async fn set_teacher_feedback(&self, id: Uuid, feedback: Option<&str>, at: DateTime<Utc>) -> Result<Reflection> {
        let mut tables = self.tables.write().await;
        let stored = tables.reflections.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        stored.teacher_feedback = feedback.map(str::to_string);
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn list_reflections_for_student(&self, student_id: Uuid) -> Result<Vec<Reflection>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .reflections
                .values()
                .filter(|r| r.student_id == student_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_reflections_for_students(&self, student_ids: &[Uuid], date: Option<NaiveDate>) -> Result<Vec<Reflection>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .reflections
                .values()
                .filter(|r| student_ids.contains(&r.student_id) && date.map_or(true, |d| r.date == d))
                .cloned()
                .collect(),
        ))
    }

    async fn put_analysis(&self, entry: &AnalysisEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.analyses.insert((entry.class_id, entry.date), entry.clone());
        Ok(())
    }

    async fn get_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<Option<AnalysisEntry>> {
        Ok(self.tables.read().await.analyses.get(&(class_id, date)).cloned())
    }

    async fn list_analyses(&self, class_id: Uuid) -> Result<Vec<AnalysisEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<AnalysisEntry> = tables
            .analyses
            .values()
            .filter(|e| e.class_id == class_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(entries)
    }

    async fn delete_analysis(&self, class_id: Uuid, date: NaiveDate) -> Result<bool> {
        Ok(self.tables.write().await.analyses.remove(&(class_id, date)).is_some())
    }

    async fn insert_session(&self, session: &UserSession) -> Result<()> {
        self.tables.write().await.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<UserSession>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(session) = self.tables.write().await.sessions.get_mut(&id) {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.tables.write().await.sessions.remove(&id);
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_stale_sessions(&self, idle_cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|_, s| s.last_activity >= idle_cutoff && s.expires_at >= now);
        Ok((before - tables.sessions.len()) as u64)
    }
}
