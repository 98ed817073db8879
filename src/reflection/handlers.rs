use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Operation, SessionContext};
use crate::export;
use crate::reflection::service::{ReflectionBackup, ReflectionInput};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TeacherFeedbackRequest {
    pub feedback: Option<String>,
}

// student

pub async fn submit(
    ctx: SessionContext,
    req: web::Json<ReflectionInput>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::SubmitReflection)?;
    let reflection = state.reflections.submit(&ctx.user, &req).await?;
    Ok(HttpResponse::Ok().json(reflection))
}

pub async fn edit(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<ReflectionInput>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::SubmitReflection)?;
    let reflection = state.reflections.edit(&ctx.user, path.into_inner(), &req).await?;
    Ok(HttpResponse::Ok().json(reflection))
}

pub async fn own_history(
    ctx: SessionContext,
    query: web::Query<RangeQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ViewOwnReflections)?;
    let reflections = state.reflections.history(ctx.user_id(), query.from, query.to).await?;
    Ok(HttpResponse::Ok().json(reflections))
}

pub async fn summary(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::ViewOwnReflections)?;
    let summary = state.reflections.summary(&ctx.user).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn export_backup(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::TransferOwnReflections)?;
    let backup = state.reflections.export_backup(&ctx.user).await?;
    Ok(HttpResponse::Ok().json(backup))
}

pub async fn import_backup(
    ctx: SessionContext,
    req: web::Json<ReflectionBackup>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::TransferOwnReflections)?;
    let report = state.reflections.import_backup(&ctx.user, &req).await?;
    Ok(HttpResponse::Ok().json(report))
}

// teacher

pub async fn class_reflections(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    query: web::Query<DateQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ReviewReflections)?;
    let rows = state.reflections.list_for_class(&ctx.user, path.into_inner(), query.date).await?;
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn class_reflections_csv(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    query: web::Query<DateQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ReviewReflections)?;
    let rows = state.reflections.list_for_class(&ctx.user, path.into_inner(), query.date).await?;
    Ok(export::csv_response("reflections.csv", export::reflections_csv(&rows)))
}

pub async fn student_reflections(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ReviewReflections)?;
    let reflections = state
        .reflections
        .student_history_for_teacher(&ctx.user, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(reflections))
}

pub async fn teacher_feedback(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<TeacherFeedbackRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::WriteTeacherFeedback)?;
    let reflection = state
        .reflections
        .set_teacher_feedback(&ctx.user, path.into_inner(), req.feedback.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(reflection))
}
