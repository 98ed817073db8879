use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::access::SessionContext;
use crate::auth::password::{hash_password, validate_password_policy, verify_password};
use crate::clock::Clock;
use crate::config::{AuthConfig, BootstrapConfig};
use crate::db::{ClassInfo, Role, Store, User, UserSession};
use crate::error::AuthError;
use crate::{AppError, Result};

const DEMO_TARGET_DAYS: i32 = 190;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub sid: String, // session id
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// What identifies an account at login.
#[derive(Debug, Clone)]
pub enum Credentials {
    Student { class_id: Uuid, student_number: String },
    Staff { role: Role, login_id: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    pub idle_deadline: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    jwt_secret: String,
    token_expiry_hours: i64,
    idle_timeout: Duration,
    default_password: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            jwt_secret: config.jwt_secret.clone(),
            token_expiry_hours: config.token_expiry_hours,
            idle_timeout: Duration::minutes(config.session_idle_minutes),
            default_password: config.default_password.clone(),
        }
    }

    /// Resolves an active account matching `credentials` and `password`.
    /// Every mismatch, inactive accounts included, is the same error.
    pub async fn authenticate(&self, credentials: &Credentials, password: &str) -> Result<User> {
        let candidates = match credentials {
            Credentials::Student { class_id, student_number } => {
                self.store.find_students_by_number(*class_id, student_number).await?
            }
            Credentials::Staff { role, login_id } => self
                .store
                .find_user_by_login_id(login_id)
                .await?
                .into_iter()
                .filter(|u| u.role == *role)
                .collect(),
        };

        candidates
            .into_iter()
            .filter(|u| u.is_active)
            .find(|u| verify_password(password, &u.password_hash).unwrap_or(false))
            .ok_or_else(|| AuthError::InvalidCredentials.into())
    }

    pub async fn login(&self, credentials: &Credentials, password: &str) -> Result<LoginOutcome> {
        let user = match self.authenticate(credentials, password).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Rejected login attempt for {}", describe(credentials));
                return Err(e);
            }
        };

        let now = self.clock.now();
        let session = UserSession::new(user.id, now, self.token_expiry_hours);
        self.store.insert_session(&session).await?;
        let token = self.issue_token(&user, &session)?;

        info!("User {} ({}) logged in", user.id, user.role);
        Ok(LoginOutcome {
            token,
            user,
            idle_deadline: now + self.idle_timeout,
        })
    }

    /// Validates a bearer token and rebuilds the caller's context from the
    /// store, refreshing the session's last activity.
    pub async fn validate_token(&self, token: &str) -> Result<SessionContext> {
        let claims = self.decode_token(token)?;
        let now = self.clock.now();
        if claims.exp < now.timestamp() {
            return Err(AuthError::SessionExpired.into());
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let session_id = Uuid::parse_str(&claims.sid).map_err(|_| AuthError::InvalidToken)?;

        let session = self
            .store
            .get_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(AuthError::SessionExpired)?;

        if session.is_expired(now) || session.is_idle(now, self.idle_timeout) {
            self.store.delete_session(session_id).await?;
            info!("Session {} for user {} timed out", session_id, user_id);
            return Err(AuthError::SessionExpired.into());
        }

        let user = match self.store.get_user(user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                self.store.delete_session(session_id).await?;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        self.store.touch_session(session_id, now).await?;
        Ok(SessionContext {
            session_id,
            user,
            idle_deadline: now + self.idle_timeout,
        })
    }

    pub async fn logout(&self, ctx: &SessionContext) -> Result<()> {
        self.store.delete_session(ctx.session_id).await?;
        info!("User {} logged out", ctx.user_id());
        Ok(())
    }

    /// Replaces the caller's credential and clears the first-login flag in
    /// one write. Returns the updated user.
    pub async fn rotate_password(
        &self,
        ctx: &SessionContext,
        current: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<User> {
        if !verify_password(current, &ctx.user.password_hash).unwrap_or(false) {
            return Err(AppError::ValidationError("Current password does not match".to_string()));
        }
        if new_password != confirmation {
            return Err(AppError::ValidationError("Password confirmation does not match".to_string()));
        }
        validate_password_policy(ctx.role(), new_password).map_err(AppError::ValidationError)?;

        let hash = hash_password(new_password)?;
        let user = self.store.update_password(ctx.user_id(), &hash, false).await?;
        info!("User {} rotated their password", user.id);
        Ok(user)
    }

    /// Puts `user` back on the default credential with rotation pending and
    /// ends all of their sessions.
    pub async fn reset_password(&self, user_id: Uuid) -> Result<User> {
        let hash = self.default_password_hash()?;
        let user = self.store.update_password(user_id, &hash, true).await?;
        let revoked = self.store.delete_user_sessions(user_id).await?;
        info!("Password reset for user {} ({} sessions revoked)", user_id, revoked);
        Ok(user)
    }

    pub async fn revoke_sessions(&self, user_id: Uuid) -> Result<u64> {
        self.store.delete_user_sessions(user_id).await
    }

    pub fn default_password_hash(&self) -> Result<String> {
        Ok(hash_password(&self.default_password)?)
    }

    pub fn hash_initial_password(&self, password: Option<&str>) -> Result<String> {
        match password.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Ok(hash_password(p)?),
            None => self.default_password_hash(),
        }
    }

    /// Drops sessions that went idle or hit their hard expiry.
    pub async fn sweep_idle_sessions(&self) -> Result<u64> {
        let now = self.clock.now();
        let removed = self.store.delete_stale_sessions(now - self.idle_timeout, now).await?;
        if removed > 0 {
            info!("Swept {} idle sessions", removed);
        }
        Ok(removed)
    }

    /// Creates the admin account when none exists and, optionally, a demo
    /// teacher with one class and one student.
    pub async fn bootstrap(&self, config: &BootstrapConfig) -> Result<()> {
        if self.store.list_users_by_role(Role::Admin).await?.is_empty() {
            let admin = User::new_staff(
                Role::Admin,
                "시스템 관리자".to_string(),
                config.admin_login_id.clone(),
                self.default_password_hash()?,
            );
            self.store.insert_user(&admin).await?;
            info!("Created bootstrap admin '{}'", config.admin_login_id);
        }

        if config.seed_demo && self.store.find_user_by_login_id("teacher1").await?.is_none() {
            let mut teacher = User::new_staff(
                Role::Teacher,
                "김선생님".to_string(),
                "teacher1".to_string(),
                self.default_password_hash()?,
            );
            teacher.is_first_login = false;
            let teacher = self.store.insert_user(&teacher).await?;

            let year = self.clock.now().format("%Y").to_string();
            let class = ClassInfo::new("1학년 3반".to_string(), year, teacher.id, DEMO_TARGET_DAYS);
            let class = self.store.insert_class(&class).await?;

            let student = User::new_student(
                "홍길동".to_string(),
                "10301".to_string(),
                class.id,
                self.default_password_hash()?,
            );
            self.store.insert_user(&student).await?;
            info!("Seeded demo teacher, class {} and student", class.id);
        }
        Ok(())
    }

    fn issue_token(&self, user: &User, session: &UserSession) -> Result<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            sid: session.id.to_string(),
            role: user.role,
            exp: session.expires_at.timestamp(),
            iat: session.created_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    fn decode_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the injected clock instead
        validation.validate_exp = false;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

fn describe(credentials: &Credentials) -> String {
    match credentials {
        Credentials::Student { class_id, student_number } => format!("student {} in class {}", student_number, class_id),
        Credentials::Staff { role, login_id } => format!("{} '{}'", role, login_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Settings;
    use crate::db::MemoryStore;
    use chrono::TimeZone;

    struct Harness {
        store: MemoryStore,
        clock: Arc<FixedClock>,
        auth: AuthService,
    }

    fn harness() -> Harness {
        let settings = Settings::new_for_test().unwrap();
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()));
        let auth = AuthService::new(Arc::new(store.clone()), clock.clone(), &settings.auth);
        Harness { store, clock, auth }
    }

    fn admin_credentials() -> Credentials {
        Credentials::Staff { role: Role::Admin, login_id: "admin".to_string() }
    }

    async fn bootstrapped() -> Harness {
        let h = harness();
        let config = BootstrapConfig { admin_login_id: "admin".to_string(), seed_demo: true };
        h.auth.bootstrap(&config).await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let h = bootstrapped().await;
        let config = BootstrapConfig { admin_login_id: "admin".to_string(), seed_demo: true };
        h.auth.bootstrap(&config).await.unwrap();

        assert_eq!(h.store.list_users_by_role(Role::Admin).await.unwrap().len(), 1);
        assert_eq!(h.store.list_users_by_role(Role::Teacher).await.unwrap().len(), 1);
        let classes = h.store.list_classes(Some("2024")).await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].target_days, 190);
    }

    #[tokio::test]
    async fn test_authentication_failures_are_uniform() {
        let h = bootstrapped().await;

        let wrong_password = h.auth.authenticate(&admin_credentials(), "1111").await.unwrap_err();
        let unknown = h
            .auth
            .authenticate(&Credentials::Staff { role: Role::Admin, login_id: "nobody".into() }, "0000")
            .await
            .unwrap_err();
        let wrong_role = h
            .auth
            .authenticate(&Credentials::Staff { role: Role::Teacher, login_id: "admin".into() }, "0000")
            .await
            .unwrap_err();

        for err in [wrong_password, unknown, wrong_role] {
            assert!(matches!(err, AppError::AuthError(AuthError::InvalidCredentials)));
        }
    }

    #[tokio::test]
    async fn test_student_login_and_inactive_rejection() {
        let h = bootstrapped().await;
        let class = h.store.list_classes(None).await.unwrap().remove(0);
        let credentials = Credentials::Student { class_id: class.id, student_number: "10301".into() };

        let outcome = h.auth.login(&credentials, "0000").await.unwrap();
        assert_eq!(outcome.user.role, Role::Student);
        assert!(outcome.user.is_first_login);

        h.store.set_user_active(outcome.user.id, false).await.unwrap();
        assert!(h.auth.login(&credentials, "0000").await.is_err());
        assert!(h.auth.validate_token(&outcome.token).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let h = bootstrapped().await;
        let outcome = h.auth.login(&admin_credentials(), "0000").await.unwrap();

        h.clock.advance(Duration::minutes(119));
        assert!(h.auth.validate_token(&outcome.token).await.is_ok());

        // the request above counted as activity
        h.clock.advance(Duration::minutes(119));
        assert!(h.auth.validate_token(&outcome.token).await.is_ok());

        h.clock.advance(Duration::minutes(121));
        let err = h.auth.validate_token(&outcome.token).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::SessionExpired)));
    }

    #[tokio::test]
    async fn test_sweeper_removes_idle_sessions() {
        let h = bootstrapped().await;
        let outcome = h.auth.login(&admin_credentials(), "0000").await.unwrap();

        h.clock.advance(Duration::minutes(30));
        assert_eq!(h.auth.sweep_idle_sessions().await.unwrap(), 0);

        h.clock.advance(Duration::minutes(100));
        assert_eq!(h.auth.sweep_idle_sessions().await.unwrap(), 1);
        assert!(h.auth.validate_token(&outcome.token).await.is_err());
    }

    #[tokio::test]
    async fn test_rotation_clears_first_login() {
        let h = bootstrapped().await;
        let outcome = h.auth.login(&admin_credentials(), "0000").await.unwrap();
        let ctx = h.auth.validate_token(&outcome.token).await.unwrap();

        assert!(h.auth.rotate_password(&ctx, "9999", "abcd123!", "abcd123!").await.is_err());
        assert!(h.auth.rotate_password(&ctx, "0000", "abcd123!", "abcd123?").await.is_err());
        assert!(h.auth.rotate_password(&ctx, "0000", "short", "short").await.is_err());

        let user = h.auth.rotate_password(&ctx, "0000", "abcd123!", "abcd123!").await.unwrap();
        assert!(!user.is_first_login);

        let ctx = h.auth.validate_token(&outcome.token).await.unwrap();
        assert!(!ctx.user.is_first_login);
        assert!(h.auth.authenticate(&admin_credentials(), "abcd123!").await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_revokes_sessions() {
        let h = bootstrapped().await;
        let teacher = Credentials::Staff { role: Role::Teacher, login_id: "teacher1".into() };
        let outcome = h.auth.login(&teacher, "0000").await.unwrap();
        assert!(!outcome.user.is_first_login);

        let user = h.auth.reset_password(outcome.user.id).await.unwrap();
        assert!(user.is_first_login);
        assert!(h.auth.validate_token(&outcome.token).await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let h = bootstrapped().await;
        let outcome = h.auth.login(&admin_credentials(), "0000").await.unwrap();
        let tampered = format!("{}x", outcome.token);
        let err = h.auth.validate_token(&tampered).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(AuthError::InvalidToken)));
    }
}
