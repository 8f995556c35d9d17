//! Templates, time tracking and pomodoro endpoints against a real database.
//! `DATABASE_URL` must point at a scratch database.

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{bearer, db_state, register_user, send};

#[actix_rt::test]
async fn test_template_instantiation_survives_category_delete() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "template").await;

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "Reports" }))
        .to_request();
    let (_, category) = send(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/templates")
        .insert_header(bearer(&token))
        .set_json(json!({
            "name": "Weekly report",
            "title": "Write weekly report",
            "priority": "high",
            "category_id": category["id"],
            "tag_names": ["report", " Report ", "weekly"],
            "estimated_minutes": 45
        }))
        .to_request();
    let (status, template) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Template failed: {}", template);
    assert_eq!(template["tag_names"], json!(["report", "weekly"]));
    let template_id = template["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/templates/{}/instantiate", template_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, todo) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Instantiate failed: {}", todo);
    assert_eq!(todo["title"], "Write weekly report");
    assert_eq!(todo["priority"], "high");
    assert_eq!(todo["category_id"], category["id"]);
    assert_eq!(todo["tags"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::post()
        .uri(&format!("/api/templates/{}/instantiate", template_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Report for week 12" }))
        .to_request();
    let (status, todo) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(todo["title"], "Report for week 12");

    // Tags created by the first instantiation are reused.
    let req = test::TestRequest::get()
        .uri("/api/tags")
        .insert_header(bearer(&token))
        .to_request();
    let (_, tags) = send(&app, req).await;
    assert_eq!(tags.as_array().unwrap().len(), 2);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/categories/{}", category["id"].as_str().unwrap()))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/templates/{}", template_id))
        .insert_header(bearer(&token))
        .to_request();
    let (_, template) = send(&app, req).await;
    assert!(template["category_id"].is_null());

    let req = test::TestRequest::post()
        .uri(&format!("/api/templates/{}/instantiate", template_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, todo) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Instantiate failed: {}", todo);
    assert!(todo["category_id"].is_null());
}

#[actix_rt::test]
async fn test_only_one_timer_runs_at_a_time() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "timer").await;

    let mut todo_ids = Vec::new();
    for title in ["Draft", "Review"] {
        let req = test::TestRequest::post()
            .uri("/api/todos")
            .insert_header(bearer(&token))
            .set_json(json!({ "title": title }))
            .to_request();
        let (_, todo) = send(&app, req).await;
        todo_ids.push(todo["id"].as_str().unwrap().to_string());
    }

    let req = test::TestRequest::get()
        .uri("/api/time-entries/current")
        .insert_header(bearer(&token))
        .to_request();
    let (status, current) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(current.is_null());

    let req = test::TestRequest::post()
        .uri("/api/time-entries/stop")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri(&format!("/api/todos/{}/timer/start", todo_ids[0]))
        .insert_header(bearer(&token))
        .set_json(json!({ "note": "first pass" }))
        .to_request();
    let (status, first) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Start failed: {}", first);

    let req = test::TestRequest::post()
        .uri(&format!("/api/todos/{}/timer/start", todo_ids[1]))
        .insert_header(bearer(&token))
        .to_request();
    let (status, second) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/todos/{}/time-entries", todo_ids[0]))
        .insert_header(bearer(&token))
        .to_request();
    let (_, entries) = send(&app, req).await;
    assert_eq!(entries[0]["id"], first["id"]);
    assert!(entries[0]["ended_at"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/time-entries/current")
        .insert_header(bearer(&token))
        .to_request();
    let (_, current) = send(&app, req).await;
    assert_eq!(current["id"], second["id"]);

    let req = test::TestRequest::post()
        .uri("/api/time-entries/stop")
        .insert_header(bearer(&token))
        .to_request();
    let (status, stopped) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["id"], second["id"]);

    let req = test::TestRequest::get()
        .uri("/api/time-entries/summary")
        .insert_header(bearer(&token))
        .to_request();
    let (status, summary) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary.as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri("/api/time-entries/summary?from=2030-01-02T00:00:00Z&to=2030-01-01T00:00:00Z")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_timer_on_foreign_todo_is_not_found() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, owner) = register_user(&app, "timerowner").await;
    let (_, intruder) = register_user(&app, "timerintruder").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&owner))
        .set_json(json!({ "title": "Private" }))
        .to_request();
    let (_, todo) = send(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/todos/{}/timer/start", todo["id"].as_str().unwrap()))
        .insert_header(bearer(&intruder))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_pomodoro_next_phase_follows_history() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "pomodoro").await;

    let req = test::TestRequest::get()
        .uri("/api/pomodoro/next")
        .insert_header(bearer(&token))
        .to_request();
    let (status, next) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["phase"], "work");
    assert_eq!(next["completed_work_sessions_today"], 0);

    let now = Utc::now();
    let started = (now - Duration::seconds(60)).max(doable::db::start_of_day(now));
    let req = test::TestRequest::post()
        .uri("/api/pomodoro/sessions")
        .insert_header(bearer(&token))
        .set_json(json!({
            "phase": "work",
            "started_at": started,
            "ended_at": started
        }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/pomodoro/sessions")
        .insert_header(bearer(&token))
        .set_json(json!({
            "phase": "work",
            "started_at": started,
            "ended_at": started + Duration::seconds(1)
        }))
        .to_request();
    let (status, record) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Record failed: {}", record);
    assert_eq!(record["duration_seconds"], 1);

    let req = test::TestRequest::get()
        .uri("/api/pomodoro/next")
        .insert_header(bearer(&token))
        .to_request();
    let (_, next) = send(&app, req).await;
    assert_eq!(next["phase"], "short_break");
    assert_eq!(next["completed_work_sessions_today"], 1);

    let req = test::TestRequest::get()
        .uri("/api/pomodoro/stats")
        .insert_header(bearer(&token))
        .to_request();
    let (status, stats) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["work_sessions"], 1);
    assert_eq!(stats["focus_seconds"], 1);
}
