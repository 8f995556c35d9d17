use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    events::EventKind,
    models::{Tag, TagInput},
    state::AppState,
};

const TAG_COLUMNS: &str = "g.id, g.user_id, g.name, g.color, g.created_at, \
     (SELECT COUNT(*) FROM todo_tags tt JOIN todos t ON t.id = tt.todo_id \
      WHERE tt.tag_id = g.id AND t.deleted_at IS NULL) AS usage_count";

async fn find_tag(state: &AppState, user_id: i32, id: Uuid) -> Result<Tag, AppError> {
    let sql = format!(
        "SELECT {} FROM tags g WHERE g.id = $1 AND g.user_id = $2",
        TAG_COLUMNS
    );
    sqlx::query_as::<_, Tag>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Tag not found".into()))
}

async fn name_taken(
    state: &AppState,
    user_id: i32,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM tags WHERE user_id = $1 AND lower(name) = lower($2) \
         AND ($3::uuid IS NULL OR id <> $3))",
    )
    .bind(user_id)
    .bind(name.trim())
    .bind(except)
    .fetch_one(&state.pool)
    .await?;
    Ok(taken)
}

/// Lists the caller's tags, most used first.
#[get("")]
pub async fn list_tags(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM tags g WHERE g.user_id = $1 ORDER BY usage_count DESC, lower(g.name)",
        TAG_COLUMNS
    );
    let tags = sqlx::query_as::<_, Tag>(&sql)
        .bind(user.user_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(tags))
}

#[post("")]
pub async fn create_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<TagInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    if name_taken(&state, user.user_id, &body.name, None).await? {
        return Err(AppError::Conflict("A tag with this name already exists".into()));
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO tags (id, user_id, name, color) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(&body.color)
        .execute(&state.pool)
        .await?;

    let tag = find_tag(&state, user.user_id, id).await?;
    state
        .events
        .publish_json(EventKind::TagChanged, user.user_id, Some(id), &tag);
    Ok(HttpResponse::Created().json(tag))
}

#[put("/{id}")]
pub async fn update_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
    body: web::Json<TagInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let id = tag_id.into_inner();
    find_tag(&state, user.user_id, id).await?;
    if name_taken(&state, user.user_id, &body.name, Some(id)).await? {
        return Err(AppError::Conflict("A tag with this name already exists".into()));
    }

    sqlx::query("UPDATE tags SET name = $3, color = $4 WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(&body.color)
        .execute(&state.pool)
        .await?;

    let tag = find_tag(&state, user.user_id, id).await?;
    state
        .events
        .publish_json(EventKind::TagChanged, user.user_id, Some(id), &tag);
    Ok(HttpResponse::Ok().json(tag))
}

/// Deletes a tag and its links to todos.
#[delete("/{id}")]
pub async fn delete_tag(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let id = tag_id.into_inner();
    let result = sqlx::query("DELETE FROM tags WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tag not found".into()));
    }

    state.events.publish(
        EventKind::TagChanged,
        user.user_id,
        Some(id),
        json!({ "id": id, "deleted": true }),
    );
    Ok(HttpResponse::NoContent().finish())
}
