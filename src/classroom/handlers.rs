use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Operation, SessionContext};
use crate::classroom::roster::{ClassDraft, NewStudent, RosterFormat, StudentUpdate};
use crate::export;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct RosterTextRequest {
    pub format: RosterFormat,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub date: Option<NaiveDate>,
}

// classes

pub async fn list_classes(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageClasses)?;
    Ok(HttpResponse::Ok().json(state.roster.list_classes(&ctx.user).await?))
}

pub async fn create_class(
    ctx: SessionContext,
    req: web::Json<ClassDraft>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageClasses)?;
    let class = state.roster.create_class(&ctx.user, &req).await?;
    Ok(HttpResponse::Created().json(class))
}

pub async fn update_class(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<ClassDraft>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageClasses)?;
    let class = state.roster.update_class(&ctx.user, path.into_inner(), &req).await?;
    Ok(HttpResponse::Ok().json(class))
}

pub async fn delete_class(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageClasses)?;
    state.roster.delete_class(&ctx.user, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn completion_rates(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ReviewReflections)?;
    let rates = state.roster.completion_rates(&ctx.user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rates))
}

// students

pub async fn list_students(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    query: web::Query<StudentListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let students = state
        .roster
        .list_students(&ctx.user, path.into_inner(), query.include_inactive)
        .await?;
    Ok(HttpResponse::Ok().json(students))
}

pub async fn add_student(
    ctx: SessionContext,
    req: web::Json<NewStudent>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let student = state.roster.add_student(&ctx.user, &req).await?;
    Ok(HttpResponse::Created().json(student))
}

pub async fn bulk_add_students(
    ctx: SessionContext,
    req: web::Json<Vec<NewStudent>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let report = state.roster.bulk_add(&ctx.user, &req).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn import_roster(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<RosterTextRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let report = state
        .roster
        .import_roster_text(&ctx.user, path.into_inner(), req.format, &req.text)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn roster_csv(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let body = state.roster.roster_csv(&ctx.user, path.into_inner()).await?;
    Ok(export::csv_response("roster.csv", body))
}

pub async fn update_student(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<StudentUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let student = state.roster.update_student(&ctx.user, path.into_inner(), &req).await?;
    Ok(HttpResponse::Ok().json(student))
}

pub async fn set_student_active(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    req: web::Json<ActiveRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let student = state
        .roster
        .set_student_active(&ctx.user, path.into_inner(), req.active)
        .await?;
    Ok(HttpResponse::Ok().json(student))
}

pub async fn reset_student_password(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageStudents)?;
    let student = state.roster.reset_student_password(&ctx.user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(student))
}

// AI key

pub async fn api_key_status(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageAiKey)?;
    let configured = state.advisor.has_api_key(&ctx.user).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "configured": configured })))
}

pub async fn set_api_key(
    ctx: SessionContext,
    req: web::Json<ApiKeyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageAiKey)?;
    let configured = state.advisor.set_api_key(&ctx.user, req.api_key.as_deref()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "configured": configured })))
}

pub async fn clear_api_key(ctx: SessionContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.authorize(Operation::ManageAiKey)?;
    state.advisor.set_api_key(&ctx.user, None).await?;
    Ok(HttpResponse::NoContent().finish())
}

// analysis

pub async fn run_analysis(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    query: web::Query<AnalyzeQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RunAnalysis)?;
    let view = state.analysis.analyze(&ctx.user, path.into_inner(), query.date).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn cached_analysis(
    ctx: SessionContext,
    path: web::Path<(Uuid, NaiveDate)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RunAnalysis)?;
    let (class_id, date) = path.into_inner();
    match state.analysis.get_cached(&ctx.user, class_id, date).await? {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": { "status": 404, "message": "No analysis cached for this date" }
        }))),
    }
}

pub async fn analysis_history(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RunAnalysis)?;
    let history = state.analysis.history(&ctx.user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(history))
}

pub async fn delete_analysis(
    ctx: SessionContext,
    path: web::Path<(Uuid, NaiveDate)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RunAnalysis)?;
    let (class_id, date) = path.into_inner();
    state.analysis.delete(&ctx.user, class_id, date).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn weekly_analysis(
    ctx: SessionContext,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.authorize(Operation::RunAnalysis)?;
    let rollup = state.analysis.weekly(&ctx.user, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rollup))
}
