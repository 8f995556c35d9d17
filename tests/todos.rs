//! Todo, category, tag and export endpoints against a real database. `DATABASE_URL`
//! must point at a scratch database.

#[macro_use]
mod common;

use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{json, Value};

use common::{bearer, db_state, register_user, send};

#[actix_rt::test]
async fn test_todo_crud_with_category_and_tags() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "crud").await;

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "Work", "color": "#336699" }))
        .to_request();
    let (status, category) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Category failed: {}", category);

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "work" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/tags")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "urgent-ish" }))
        .to_request();
    let (status, tag) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Tag failed: {}", tag);

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&token))
        .set_json(json!({
            "title": "Write quarterly report",
            "description": "Numbers from finance",
            "priority": "high",
            "category_id": category["id"],
            "tag_ids": [tag["id"]]
        }))
        .to_request();
    let (status, todo) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Create failed: {}", todo);
    assert_eq!(todo["status"], "pending");
    assert_eq!(todo["tags"][0]["name"], "urgent-ish");
    let todo_id = todo["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::patch()
        .uri(&format!("/api/todos/{}/status", todo_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "status": "completed" }))
        .to_request();
    let (status, completed) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(completed["completed_at"].is_string());

    let req = test::TestRequest::patch()
        .uri(&format!("/api/todos/{}/status", todo_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "status": "in_progress" }))
        .to_request();
    let (_, reopened) = send(&app, req).await;
    assert!(reopened["completed_at"].is_null());

    // Category listing counts the todo.
    let req = test::TestRequest::get()
        .uri("/api/categories")
        .insert_header(bearer(&token))
        .to_request();
    let (_, categories) = send(&app, req).await;
    assert_eq!(categories[0]["todo_count"], 1);

    // Deleting the category keeps the todo.
    let req = test::TestRequest::delete()
        .uri(&format!("/api/categories/{}", category["id"].as_str().unwrap()))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/todos/{}", todo_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, fetched) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(fetched["category_id"].is_null());

    // Soft delete, then restore.
    let req = test::TestRequest::delete()
        .uri(&format!("/api/todos/{}", todo_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/todos/{}", todo_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri(&format!("/api/todos/{}/restore", todo_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, restored) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(restored["deleted_at"].is_null());
}

#[actix_rt::test]
async fn test_foreign_category_is_rejected() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, owner) = register_user(&app, "owner").await;
    let (_, other) = register_user(&app, "other").await;

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&owner))
        .set_json(json!({ "name": "Private" }))
        .to_request();
    let (_, category) = send(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&other))
        .set_json(json!({ "title": "Sneaky", "category_id": category["id"] }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_users_cannot_see_each_others_todos() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, alice) = register_user(&app, "alice").await;
    let (_, bob) = register_user(&app, "bob").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&alice))
        .set_json(json!({ "title": "Alice's secret" }))
        .to_request();
    let (_, todo) = send(&app, req).await;
    let todo_id = todo["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/todos")
        .insert_header(bearer(&bob))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);

    for req in [
        test::TestRequest::get().uri(&format!("/api/todos/{}", todo_id)),
        test::TestRequest::delete().uri(&format!("/api/todos/{}", todo_id)),
        test::TestRequest::put()
            .uri(&format!("/api/todos/{}", todo_id))
            .set_json(json!({ "title": "Hijacked" })),
    ] {
        let (status, _) = send(&app, req.insert_header(bearer(&bob)).to_request()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[actix_rt::test]
async fn test_list_filters_pagination_and_bulk() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "bulk").await;

    let mut ids = Vec::new();
    for (title, priority) in [
        ("Buy milk", "low"),
        ("File taxes", "urgent"),
        ("Call plumber", "high"),
        ("Read book", "medium"),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/todos")
            .insert_header(bearer(&token))
            .set_json(json!({ "title": title, "priority": priority }))
            .to_request();
        let (_, todo) = send(&app, req).await;
        ids.push(todo["id"].clone());
    }

    let req = test::TestRequest::get()
        .uri("/api/todos?search=TAX")
        .insert_header(bearer(&token))
        .to_request();
    let (_, page) = send(&app, req).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["title"], "File taxes");

    let req = test::TestRequest::get()
        .uri("/api/todos?per_page=3&page=2&sort_by=title&order=asc")
        .insert_header(bearer(&token))
        .to_request();
    let (_, page) = send(&app, req).await;
    assert_eq!(page["total"], 4);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["title"], "Read book");

    let req = test::TestRequest::get()
        .uri("/api/todos/focus?limit=2")
        .insert_header(bearer(&token))
        .to_request();
    let (status, focus) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(focus[0]["title"], "File taxes");
    assert_eq!(focus[1]["title"], "Call plumber");

    let req = test::TestRequest::post()
        .uri("/api/todos/bulk")
        .insert_header(bearer(&token))
        .set_json(json!({ "ids": [ids[0], ids[1]], "action": "complete" }))
        .to_request();
    let (status, result) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Bulk failed: {}", result);
    assert_eq!(result["affected"], 2);

    let req = test::TestRequest::post()
        .uri("/api/todos/bulk")
        .insert_header(bearer(&token))
        .set_json(json!({ "ids": [], "action": "delete" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/todos/stats")
        .insert_header(bearer(&token))
        .to_request();
    let (_, stats) = send(&app, req).await;
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["completed"], 2);
    assert_eq!(stats["pending"], 2);
    assert_eq!(stats["completed_today"], 2);

    let req = test::TestRequest::get()
        .uri("/api/todos?status=completed")
        .insert_header(bearer(&token))
        .to_request();
    let (_, page) = send(&app, req).await;
    assert_eq!(page["total"], 2);
}

async fn wait_for_export(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    token: &str,
    job_id: &str,
) -> Value {
    for _ in 0..50 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/exports/{}", job_id))
            .insert_header(bearer(token))
            .to_request();
        let (_, job) = send(app, req).await;
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Export {} did not finish", job_id);
}

#[actix_rt::test]
async fn test_csv_export_round_trip() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "export").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Quote \"this\", please" }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/exports")
        .insert_header(bearer(&token))
        .set_json(json!({ "format": "csv" }))
        .to_request();
    let (status, job) = send(&app, req).await;
    assert_eq!(status, StatusCode::ACCEPTED, "Export request failed: {}", job);
    let job_id = job["id"].as_str().unwrap().to_string();

    let job = wait_for_export(&app, &token, &job_id).await;
    assert_eq!(job["status"], "completed", "Export failed: {}", job);
    assert_eq!(job["row_count"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/exports/{}/download", job_id))
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .contains(".csv"));
    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("id,title,description,status,priority,category,tags,due_date,completed_at,created_at"));
    assert!(text.contains("\"Quote \"\"this\"\", please\""));
}

#[actix_rt::test]
async fn test_page_far_past_the_end_is_empty() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "farpage").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(bearer(&token))
        .set_json(json!({ "title": "Only one" }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/todos?page=922337203685477580&per_page=100")
        .insert_header(bearer(&token))
        .to_request();
    let (status, page) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Listing failed: {}", page);
    assert_eq!(page["total"], 1);
    assert!(page["items"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_focus_orders_by_priority_then_due_date() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "focusorder").await;

    let now = chrono::Utc::now();
    let todos = [
        ("Overdue chore", "low", Some(now - chrono::Duration::days(3))),
        ("High, no date", "high", None),
        ("High, later", "high", Some(now + chrono::Duration::days(5))),
        ("High, sooner", "high", Some(now + chrono::Duration::days(1))),
    ];
    for (title, priority, due) in todos {
        let req = test::TestRequest::post()
            .uri("/api/todos")
            .insert_header(bearer(&token))
            .set_json(json!({ "title": title, "priority": priority, "due_date": due }))
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED, "Create failed: {}", body);
    }

    let req = test::TestRequest::get()
        .uri("/api/todos/focus?limit=10")
        .insert_header(bearer(&token))
        .to_request();
    let (status, focus) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = focus
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(
        titles,
        vec!["High, sooner", "High, later", "High, no date", "Overdue chore"]
    );
}
