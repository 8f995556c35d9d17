use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{self, AuditEntry},
    auth::{AuthenticatedUser, ClientInfo},
    db,
    error::AppError,
    events::EventKind,
    models::{
        todo::MAX_BULK_IDS, BulkRequest, BulkResult, StatusUpdate, TodoInput, TodoQuery,
    },
    productivity::focus::focus_limit,
    state::AppState,
};

/// Retrieves one page of the authenticated user's todos.
///
/// ## Query Parameters:
/// - `status`, `priority`, `category_id`: exact filters.
/// - `tag`: tag name, case-insensitive.
/// - `search`: matched against title and description (case-insensitive).
/// - `due_before`, `due_after`: RFC 3339 timestamps.
/// - `overdue`: only open todos past their due date.
/// - `include_deleted`: also return soft-deleted todos.
/// - `sort_by` (`created_at`, `updated_at`, `due_date`, `priority`, `title`, `position`)
///   and `order` (`asc`, `desc`).
/// - `page` (from 1) and `per_page` (1 to 100, default 20).
///
/// ## Responses:
/// - `200 OK`: `{items, total, page, per_page}`.
/// - `401 Unauthorized`: missing or invalid credentials.
#[get("")]
pub async fn list_todos(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<TodoQuery>,
) -> Result<impl Responder, AppError> {
    let page = db::todos::list(&state.pool, user.user_id, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Creates a new todo for the authenticated user.
///
/// ## Responses:
/// - `201 Created`: the new todo with its tags.
/// - `400 Bad Request`: the category or a tag does not belong to the user.
/// - `422 Unprocessable Entity`: input validation failed (e.g. empty title).
#[post("")]
pub async fn create_todo(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_data: web::Json<TodoInput>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;

    let mut tx = state.pool.begin().await?;
    let todo = db::todos::create(&mut tx, user.user_id, &todo_data).await?;
    tx.commit().await?;

    state
        .events
        .publish_json(EventKind::TodoCreated, user.user_id, Some(todo.id), &todo);
    Ok(HttpResponse::Created().json(todo))
}

#[get("/{id}")]
pub async fn get_todo(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let todo = db::todos::find(&state.pool, user.user_id, todo_id.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(todo))
}

/// Replaces a todo. Tags are replaced by `tag_ids`.
#[put("/{id}")]
pub async fn update_todo(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    todo_data: web::Json<TodoInput>,
) -> Result<impl Responder, AppError> {
    todo_data.validate()?;

    let mut tx = state.pool.begin().await?;
    let todo = db::todos::update(&mut tx, user.user_id, todo_id.into_inner(), &todo_data).await?;
    tx.commit().await?;

    state
        .events
        .publish_json(EventKind::TodoUpdated, user.user_id, Some(todo.id), &todo);
    Ok(HttpResponse::Ok().json(todo))
}

#[patch("/{id}/status")]
pub async fn update_todo_status(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    body: web::Json<StatusUpdate>,
) -> Result<impl Responder, AppError> {
    let mut tx = state.pool.begin().await?;
    let todo =
        db::todos::set_status(&mut tx, user.user_id, todo_id.into_inner(), body.status).await?;
    tx.commit().await?;

    state
        .events
        .publish_json(EventKind::TodoUpdated, user.user_id, Some(todo.id), &todo);
    Ok(HttpResponse::Ok().json(todo))
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteQuery {
    #[serde(default)]
    pub permanent: bool,
}

/// Soft-deletes a todo, or removes it for good with `?permanent=true`.
#[delete("/{id}")]
pub async fn delete_todo(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
    query: web::Query<DeleteQuery>,
) -> Result<impl Responder, AppError> {
    let todo_id = todo_id.into_inner();
    if query.permanent {
        db::todos::hard_delete(&state.pool, user.user_id, todo_id).await?;
    } else {
        db::todos::soft_delete(&state.pool, user.user_id, todo_id).await?;
    }

    state.events.publish(
        EventKind::TodoDeleted,
        user.user_id,
        Some(todo_id),
        json!({ "id": todo_id, "permanent": query.permanent }),
    );
    Ok(HttpResponse::NoContent().finish())
}

#[post("/{id}/restore")]
pub async fn restore_todo(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    todo_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let todo = db::todos::restore(&state.pool, user.user_id, todo_id.into_inner()).await?;
    state
        .events
        .publish_json(EventKind::TodoRestored, user.user_id, Some(todo.id), &todo);
    Ok(HttpResponse::Ok().json(todo))
}

/// Applies one action to many todos in a single transaction.
///
/// Ids that do not belong to the caller are ignored; `affected` counts the rows
/// that actually changed.
#[post("/bulk")]
pub async fn bulk_update(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    body: web::Json<BulkRequest>,
) -> Result<impl Responder, AppError> {
    let request = body.into_inner();
    if request.ids.is_empty() {
        return Err(AppError::BadRequest("No todo ids given".into()));
    }
    if request.ids.len() > MAX_BULK_IDS {
        return Err(AppError::BadRequest(format!(
            "At most {} todos can be changed at once",
            MAX_BULK_IDS
        )));
    }

    let mut tx = state.pool.begin().await?;
    let affected = db::todos::bulk(&mut tx, user.user_id, &request.ids, &request.action).await?;
    tx.commit().await?;

    let action = request.action.name();
    log::debug!(
        "Bulk {} by user {}: {} of {} todos changed",
        action,
        user.user_id,
        affected,
        request.ids.len()
    );
    state.events.publish(
        EventKind::TodosBulkUpdated,
        user.user_id,
        None,
        json!({ "action": action, "ids": request.ids, "affected": affected }),
    );
    audit::record(
        &state.pool,
        AuditEntry::new(Some(user.user_id), audit::TODO_BULK)
            .metadata(json!({ "action": action, "requested": request.ids.len(), "affected": affected }))
            .client(client.ip_address, client.user_agent),
    )
    .await;

    Ok(HttpResponse::Ok().json(BulkResult {
        action: action.to_string(),
        affected,
    }))
}

#[get("/stats")]
pub async fn todo_stats(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let stats = db::todos::stats(&state.pool, user.user_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[derive(Debug, Deserialize, Default)]
pub struct FocusQuery {
    pub limit: Option<i64>,
}

/// The few open todos to work on next. `limit` defaults to the user's focus preference.
#[get("/focus")]
pub async fn focus_list(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<FocusQuery>,
) -> Result<impl Responder, AppError> {
    let preferred = match query.limit {
        Some(_) => None,
        None => {
            let account = db::users::get(&state.pool, user.user_id).await?;
            Some(account.preferences.0.focus.max_visible)
        }
    };
    let limit = focus_limit(query.limit, preferred);
    let todos = db::todos::focus(&state.pool, user.user_id, limit).await?;
    Ok(HttpResponse::Ok().json(todos))
}
