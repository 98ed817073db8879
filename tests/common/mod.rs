#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use reflection_notes_server::ai::GeminiClient;
use reflection_notes_server::clock::FixedClock;
use reflection_notes_server::db::MemoryStore;
use reflection_notes_server::{AppState, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const FEEDBACK_PATH: &str = "/v1beta/models/gemini-3-flash-preview:generateContent";
pub const ANALYSIS_PATH: &str = "/v1beta/models/gemini-3-pro-preview:generateContent";

/// 2024-05-01 10:00 in UTC+9.
pub fn school_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()
}

pub struct Harness {
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub gemini: MockServer,
}

/// Memory-backed state with the demo roster seeded and Gemini pointed at a
/// local mock server.
pub async fn harness() -> Harness {
    let gemini = MockServer::start().await;
    let mut config = Settings::new_for_test().expect("Failed to load test config");
    config.ai.base_url = gemini.uri();
    config.bootstrap.seed_demo = true;

    let clock = Arc::new(FixedClock::new(school_morning()));
    let generator = GeminiClient::new(&gemini.uri(), Duration::from_secs(5)).unwrap();
    let state = AppState::with_parts(
        config.clone(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
        Arc::new(generator),
    )
    .unwrap();
    state.auth.bootstrap(&config.bootstrap).await.unwrap();

    Harness { state, clock, gemini }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Wraps a model reply in a `generateContent` response body.
pub fn candidate(reply: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": reply.to_string() }] } }]
    }))
}

pub async fn mount_feedback(server: &MockServer, feedback: &str) {
    Mock::given(method("POST"))
        .and(path(FEEDBACK_PATH))
        .respond_with(candidate(json!({ "feedback": feedback, "sentiment": "positive" })))
        .mount(server)
        .await;
}

pub fn analysis_reply(summary: &str) -> Value {
    json!({
        "summary": summary,
        "detectedIssues": [{
            "studentName": "홍길동",
            "issueType": "학업부진",
            "severity": "medium",
            "description": "분수 개념을 어려워함",
            "actionTip": "개별 보충 지도"
        }],
        "statistics": { "averageRating": 4.0, "positiveCount": 1, "alertCount": 1 }
    })
}

pub fn reflection_body() -> Value {
    json!({
        "attitudeRating": 4,
        "learnedContent": "분수의 덧셈과 뺄셈을 배웠습니다. 통분이 중요했어요.",
        "activities": "모둠별로 분수 카드 게임을 하면서 문제를 풀었습니다.",
        "collaboration": "친구에게 통분하는 방법을 설명해 주면서 함께 풀었어요."
    })
}

pub fn teacher_login() -> Value {
    json!({ "role": "TEACHER", "loginId": "teacher1", "password": "0000" })
}

pub fn admin_login(password: &str) -> Value {
    json!({ "role": "ADMIN", "loginId": "admin", "password": password })
}

pub fn student_login(class_id: &str, number: &str, password: &str) -> Value {
    json!({ "role": "STUDENT", "classId": class_id, "studentNumber": number, "password": password })
}

/// Builds the routed test service for a harness.
#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(reflection_notes_server::routes::configure),
        )
        .await
    };
}

/// Signs in and returns the token.
#[macro_export]
macro_rules! login {
    ($app:expr, $body:expr) => {{
        let resp = actix_web::test::TestRequest::post()
            .uri("/auth/login")
            .set_json($body)
            .send_request(&$app)
            .await;
        assert_eq!(resp.status(), 200, "login should succeed");
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body["token"].as_str().expect("token in login response").to_string()
    }};
}

/// Id of the seeded demo class, read from the public picker.
#[macro_export]
macro_rules! demo_class_id {
    ($app:expr) => {{
        let resp = actix_web::test::TestRequest::get()
            .uri("/public/classes")
            .send_request(&$app)
            .await;
        let classes: serde_json::Value = actix_web::test::read_body_json(resp).await;
        classes[0]["id"].as_str().expect("demo class").to_string()
    }};
}

/// Signs the demo student in and rotates the first-login password to `1234`.
#[macro_export]
macro_rules! active_student {
    ($app:expr, $class_id:expr) => {{
        let token = login!($app, common::student_login(&$class_id, "10301", "0000"));
        let resp = actix_web::test::TestRequest::post()
            .uri("/auth/password")
            .insert_header(common::bearer(&token))
            .set_json(serde_json::json!({
                "currentPassword": "0000",
                "newPassword": "1234",
                "confirmPassword": "1234"
            }))
            .send_request(&$app)
            .await;
        assert_eq!(resp.status(), 200, "password rotation should succeed");
        token
    }};
}
