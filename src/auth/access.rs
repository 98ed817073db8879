//! Per-role operation table and the request-scoped session context.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{Role, User};
use crate::error::AuthError;
use crate::{AppError, AppState, Result};

/// Every operation a signed-in user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewSession,
    Logout,
    RotatePassword,
    // admin
    ManageTeachers,
    // teacher
    ManageClasses,
    ManageStudents,
    ReviewReflections,
    WriteTeacherFeedback,
    ManageAiKey,
    RunAnalysis,
    // student
    SubmitReflection,
    ViewOwnReflections,
    TransferOwnReflections,
}

impl Operation {
    /// Allowed while the first-login rotation is still outstanding.
    pub fn allowed_before_rotation(self) -> bool {
        matches!(self, Operation::ViewSession | Operation::Logout | Operation::RotatePassword)
    }
}

impl Role {
    pub fn permits(self, op: Operation) -> bool {
        use Operation::*;

        if matches!(op, ViewSession | Logout | RotatePassword) {
            return true;
        }
        match self {
            Role::Admin => matches!(op, ManageTeachers),
            Role::Teacher => matches!(
                op,
                ManageClasses
                    | ManageStudents
                    | ReviewReflections
                    | WriteTeacherFeedback
                    | ManageAiKey
                    | RunAnalysis
            ),
            Role::Student => matches!(op, SubmitReflection | ViewOwnReflections | TransferOwnReflections),
        }
    }
}

/// The authenticated caller, rebuilt from the store on every request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: Uuid,
    pub user: User,
    /// When the session lapses if no further request arrives.
    pub idle_deadline: DateTime<Utc>,
}

impl SessionContext {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn authorize(&self, op: Operation) -> Result<()> {
        if self.user.is_first_login && !op.allowed_before_rotation() {
            return Err(AuthError::PasswordRotationRequired.into());
        }
        if !self.user.role.permits(op) {
            return Err(AuthError::Forbidden(format!("{} accounts cannot perform {:?}", self.user.role, op)).into());
        }
        Ok(())
    }
}

pub(crate) fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

impl FromRequest for SessionContext {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state = state.ok_or_else(|| AppError::InternalError("application state not registered".to_string()))?;
            let token = token.ok_or(AuthError::InvalidToken)?;
            state.auth.validate_token(&token).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(role: Role, first_login: bool) -> SessionContext {
        let mut user = User::new_staff(role, "user".into(), "user".into(), "hash".into());
        user.is_first_login = first_login;
        SessionContext {
            session_id: Uuid::new_v4(),
            user,
            idle_deadline: Utc::now(),
        }
    }

    #[test]
    fn test_role_table() {
        assert!(Role::Admin.permits(Operation::ManageTeachers));
        assert!(!Role::Admin.permits(Operation::SubmitReflection));
        assert!(Role::Teacher.permits(Operation::RunAnalysis));
        assert!(!Role::Teacher.permits(Operation::ManageTeachers));
        assert!(Role::Student.permits(Operation::SubmitReflection));
        assert!(!Role::Student.permits(Operation::ReviewReflections));
        for role in [Role::Admin, Role::Teacher, Role::Student] {
            assert!(role.permits(Operation::RotatePassword));
        }
    }

    #[test]
    fn test_first_login_gate() {
        let ctx = context(Role::Teacher, true);
        assert!(ctx.authorize(Operation::RotatePassword).is_ok());
        assert!(ctx.authorize(Operation::ViewSession).is_ok());
        assert!(matches!(
            ctx.authorize(Operation::ManageClasses),
            Err(AppError::AuthError(AuthError::PasswordRotationRequired))
        ));

        let ctx = context(Role::Teacher, false);
        assert!(ctx.authorize(Operation::ManageClasses).is_ok());
        assert!(matches!(
            ctx.authorize(Operation::ManageTeachers),
            Err(AppError::AuthError(AuthError::Forbidden(_)))
        ));
    }

    async fn state_with_admin() -> AppState {
        use crate::ai::client::MockTextGenerator;
        use crate::clock::SystemClock;
        use crate::db::MemoryStore;
        use std::sync::Arc;

        let config = crate::Settings::new_for_test().unwrap();
        let state = AppState::with_parts(
            config.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(MockTextGenerator::new()),
        )
        .unwrap();
        state.auth.bootstrap(&config.bootstrap).await.unwrap();
        state
    }

    #[actix_rt::test]
    async fn test_extractor_resolves_bearer_session() {
        use crate::auth::Credentials;
        use actix_web::test::TestRequest;

        let state = state_with_admin().await;
        let credentials = Credentials::Staff {
            role: Role::Admin,
            login_id: "admin".to_string(),
        };
        let outcome = state.auth.login(&credentials, "0000").await.unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", outcome.token)))
            .app_data(web::Data::new(state.clone()))
            .to_http_request();
        let ctx = SessionContext::extract(&req).await.unwrap();
        assert_eq!(ctx.user_id(), outcome.user.id);
        assert_eq!(ctx.role(), Role::Admin);

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .app_data(web::Data::new(state))
            .to_http_request();
        assert!(matches!(
            SessionContext::extract(&req).await,
            Err(AppError::AuthError(AuthError::InvalidToken))
        ));
    }
}
