use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::access::{Operation, SessionContext};
use crate::auth::service::Credentials;
use crate::db::Role;
use crate::{AppError, AppState, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub role: Role,
    pub login_id: Option<String>,
    pub class_id: Option<Uuid>,
    pub student_number: Option<String>,
    pub password: String,
}

impl LoginRequest {
    fn credentials(&self) -> Result<Credentials> {
        match self.role {
            Role::Student => match (self.class_id, self.student_number.as_deref()) {
                (Some(class_id), Some(number)) if !number.trim().is_empty() => Ok(Credentials::Student {
                    class_id,
                    student_number: number.trim().to_string(),
                }),
                _ => Err(AppError::ValidationError("Students sign in with a class and student number".to_string())),
            },
            role => match self.login_id.as_deref().map(str::trim) {
                Some(login_id) if !login_id.is_empty() => Ok(Credentials::Staff {
                    role,
                    login_id: login_id.to_string(),
                }),
                _ => Err(AppError::ValidationError("Login id is required".to_string())),
            },
        }
    }
}

pub async fn login(req: web::Json<LoginRequest>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let credentials = req.credentials()?;
    let outcome = state.auth.login(&credentials, &req.password).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn logout(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::Logout)?;
    state.auth.logout(&ctx).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

pub async fn session(ctx: SessionContext) -> Result<HttpResponse> {
    ctx.authorize(Operation::ViewSession)?;
    Ok(HttpResponse::Ok().json(ctx))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub async fn change_password(
    ctx: SessionContext,
    req: web::Json<PasswordChangeRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RotatePassword)?;
    let user = state
        .auth
        .rotate_password(&ctx, &req.current_password, &req.new_password, &req.confirm_password)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Debug, Deserialize)]
pub struct ClassPickerQuery {
    pub year: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassOption {
    pub id: Uuid,
    pub name: String,
    pub year: String,
}

/// Unauthenticated class list for the student login form.
pub async fn public_classes(
    query: web::Query<ClassPickerQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let year = query.year.as_deref().map(str::trim).filter(|y| !y.is_empty());
    let classes: Vec<ClassOption> = state
        .store
        .list_classes(year)
        .await?
        .into_iter()
        .map(|c| ClassOption { id: c.id, name: c.name, year: c.year })
        .collect();
    info!("Served {} classes to the login picker", classes.len());
    Ok(HttpResponse::Ok().json(classes))
}
