use actix_web::web;

use crate::{admin, auth, classroom, health_check, reflection};

/// Registers every HTTP route. Shared by `main` and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/public/classes", web::get().to(auth::handlers::public_classes))
        .service(
            web::scope("/auth")
                .route("/login", web::post().to(auth::handlers::login))
                .route("/logout", web::post().to(auth::handlers::logout))
                .route("/session", web::get().to(auth::handlers::session))
                .route("/password", web::post().to(auth::handlers::change_password)),
        )
        .service(
            web::scope("/admin")
                .route("/teachers", web::get().to(admin::handlers::list_teachers))
                .route("/teachers", web::post().to(admin::handlers::add_teacher))
                .route("/teachers/{id}/active", web::put().to(admin::handlers::set_teacher_active))
                .route("/teachers/{id}/reset", web::post().to(admin::handlers::reset_teacher_password)),
        )
        .service(teacher_scope())
        .service(
            web::scope("/student")
                .route("/reflections", web::get().to(reflection::handlers::own_history))
                .route("/reflections", web::post().to(reflection::handlers::submit))
                .route("/reflections/{id}", web::put().to(reflection::handlers::edit))
                .route("/summary", web::get().to(reflection::handlers::summary))
                .route("/backup", web::get().to(reflection::handlers::export_backup))
                .route("/backup", web::post().to(reflection::handlers::import_backup)),
        );
}

fn teacher_scope() -> actix_web::Scope {
    use classroom::handlers as c;
    use reflection::handlers as r;

    web::scope("/teacher")
        .route("/classes", web::get().to(c::list_classes))
        .route("/classes", web::post().to(c::create_class))
        .route("/classes/{id}", web::put().to(c::update_class))
        .route("/classes/{id}", web::delete().to(c::delete_class))
        .route("/classes/{id}/completion", web::get().to(c::completion_rates))
        .route("/classes/{id}/students", web::get().to(c::list_students))
        .route("/classes/{id}/students/import", web::post().to(c::import_roster))
        .route("/classes/{id}/students.csv", web::get().to(c::roster_csv))
        .route("/classes/{id}/reflections", web::get().to(r::class_reflections))
        .route("/classes/{id}/reflections.csv", web::get().to(r::class_reflections_csv))
        .route("/classes/{id}/analyses", web::get().to(c::analysis_history))
        .route("/classes/{id}/analyses", web::post().to(c::run_analysis))
        .route("/classes/{id}/analyses/weekly", web::get().to(c::weekly_analysis))
        .route("/classes/{id}/analyses/{date}", web::get().to(c::cached_analysis))
        .route("/classes/{id}/analyses/{date}", web::delete().to(c::delete_analysis))
        .route("/students", web::post().to(c::add_student))
        .route("/students/bulk", web::post().to(c::bulk_add_students))
        .route("/students/{id}", web::put().to(c::update_student))
        .route("/students/{id}/active", web::put().to(c::set_student_active))
        .route("/students/{id}/reset", web::post().to(c::reset_student_password))
        .route("/students/{id}/reflections", web::get().to(r::student_reflections))
        .route("/reflections/{id}/feedback", web::put().to(r::teacher_feedback))
        .route("/api-key", web::get().to(c::api_key_status))
        .route("/api-key", web::put().to(c::set_api_key))
        .route("/api-key", web::delete().to(c::clear_api_key))
}
