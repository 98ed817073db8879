use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::db::{Role, Store, User};
use crate::error::DatabaseError;
use crate::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub name: String,
    pub login_id: String,
    /// Falls back to the default credential.
    #[serde(default)]
    pub password: Option<String>,
}

pub struct AdminService {
    store: Arc<dyn Store>,
    auth: Arc<AuthService>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, auth: Arc<AuthService>) -> Self {
        Self { store, auth }
    }

    /// Active and inactive teachers.
    pub async fn list_teachers(&self) -> Result<Vec<User>> {
        self.store.list_users_by_role(Role::Teacher).await
    }

    pub async fn add_teacher(&self, new: &NewTeacher) -> Result<User> {
        let name = new.name.trim();
        let login_id = new.login_id.trim();
        if name.is_empty() || login_id.is_empty() {
            return Err(AppError::ValidationError("name and loginId are required".to_string()));
        }
        if self.store.find_user_by_login_id(login_id).await?.is_some() {
            return Err(AppError::UniquenessConflict(format!("login id '{}' is taken", login_id)));
        }

        let hash = self.auth.hash_initial_password(new.password.as_deref())?;
        let teacher = User::new_staff(Role::Teacher, name.to_string(), login_id.to_string(), hash);
        let teacher = self.store.insert_user(&teacher).await?;
        info!("Admin created teacher {} ({})", teacher.id, login_id);
        Ok(teacher)
    }

    async fn teacher(&self, id: Uuid) -> Result<User> {
        Ok(self
            .store
            .get_user(id)
            .await?
            .filter(|u| u.role == Role::Teacher)
            .ok_or(DatabaseError::NotFound)?)
    }

    /// Soft-deactivates or reactivates; deactivation ends open sessions.
    pub async fn set_teacher_active(&self, id: Uuid, active: bool) -> Result<User> {
        let teacher = self.teacher(id).await?;
        let updated = self.store.set_user_active(teacher.id, active).await?;
        if !active {
            self.auth.revoke_sessions(teacher.id).await?;
        }
        info!("Admin set teacher {} active={}", teacher.id, active);
        Ok(updated)
    }

    pub async fn reset_teacher_password(&self, id: Uuid) -> Result<User> {
        let teacher = self.teacher(id).await?;
        self.auth.reset_password(teacher.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::clock::SystemClock;
    use crate::config::Settings;
    use crate::db::MemoryStore;

    fn service() -> (AdminService, Arc<AuthService>) {
        let settings = Settings::new_for_test().unwrap();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let auth = Arc::new(AuthService::new(store.clone(), Arc::new(SystemClock), &settings.auth));
        (AdminService::new(store, auth.clone()), auth)
    }

    fn new_teacher(login_id: &str) -> NewTeacher {
        NewTeacher { name: "박선생님".into(), login_id: login_id.into(), password: None }
    }

    #[tokio::test]
    async fn test_login_ids_are_unique() {
        let (admin, _) = service();
        let teacher = admin.add_teacher(&new_teacher("teacher2")).await.unwrap();
        assert!(teacher.is_first_login);
        assert!(matches!(
            admin.add_teacher(&new_teacher(" teacher2 ")).await,
            Err(AppError::UniquenessConflict(_))
        ));
        assert_eq!(admin.list_teachers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivated_teacher_cannot_log_in() {
        let (admin, auth) = service();
        let teacher = admin.add_teacher(&new_teacher("teacher2")).await.unwrap();
        let credentials = Credentials::Staff { role: Role::Teacher, login_id: "teacher2".into() };
        let outcome = auth.login(&credentials, "0000").await.unwrap();

        admin.set_teacher_active(teacher.id, false).await.unwrap();
        assert!(auth.validate_token(&outcome.token).await.is_err());
        assert!(auth.login(&credentials, "0000").await.is_err());
        // data is retained
        assert_eq!(admin.list_teachers().await.unwrap().len(), 1);

        admin.set_teacher_active(teacher.id, true).await.unwrap();
        assert!(auth.login(&credentials, "0000").await.is_ok());
    }

    #[tokio::test]
    async fn test_only_teachers_are_managed() {
        let (admin, _) = service();
        assert!(matches!(
            admin.reset_teacher_password(Uuid::new_v4()).await,
            Err(AppError::DatabaseError(DatabaseError::NotFound))
        ));
    }
}
