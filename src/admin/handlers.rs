use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::admin::service::NewTeacher;
use crate::auth::{Operation, SessionContext};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

pub async fn list_teachers(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageTeachers)?;
    Ok(HttpResponse::Ok().json(state.admin.list_teachers().await?))
}

pub async fn add_teacher(
    ctx: SessionContext,
    req: web::Json<NewTeacher>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageTeachers)?;
    let teacher = state.admin.add_teacher(&req).await?;
    Ok(HttpResponse::Created().json(teacher))
}

pub async fn set_teacher_active(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<ActiveRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageTeachers)?;
    let teacher = state.admin.set_teacher_active(path.into_inner(), req.active).await?;
    Ok(HttpResponse::Ok().json(teacher))
}

pub async fn reset_teacher_password(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageTeachers)?;
    let teacher = state.admin.reset_teacher_password(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(teacher))
}
