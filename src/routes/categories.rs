use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    events::EventKind,
    models::{Category, CategoryInput},
    state::AppState,
};

const CATEGORY_COLUMNS: &str = "c.id, c.user_id, c.name, c.color, c.icon, c.created_at, c.updated_at, \
     (SELECT COUNT(*) FROM todos t WHERE t.category_id = c.id AND t.deleted_at IS NULL) AS todo_count";

async fn find_category(
    state: &AppState,
    user_id: i32,
    id: Uuid,
) -> Result<Category, AppError> {
    let sql = format!(
        "SELECT {} FROM categories c WHERE c.id = $1 AND c.user_id = $2 AND c.deleted_at IS NULL",
        CATEGORY_COLUMNS
    );
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))
}

async fn name_taken(
    state: &AppState,
    user_id: i32,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE user_id = $1 AND lower(name) = lower($2) \
         AND deleted_at IS NULL AND ($3::uuid IS NULL OR id <> $3))",
    )
    .bind(user_id)
    .bind(name.trim())
    .bind(except)
    .fetch_one(&state.pool)
    .await?;
    Ok(taken)
}

/// Lists the caller's categories with the number of live todos in each.
#[get("")]
pub async fn list_categories(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM categories c WHERE c.user_id = $1 AND c.deleted_at IS NULL ORDER BY lower(c.name)",
        CATEGORY_COLUMNS
    );
    let categories = sqlx::query_as::<_, Category>(&sql)
        .bind(user.user_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[post("")]
pub async fn create_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CategoryInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    if name_taken(&state, user.user_id, &body.name, None).await? {
        return Err(AppError::Conflict("A category with this name already exists".into()));
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO categories (id, user_id, name, color, icon) VALUES ($1, $2, $3, $4, $5)")
        .bind(id)
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(&body.color)
        .bind(&body.icon)
        .execute(&state.pool)
        .await?;

    let category = find_category(&state, user.user_id, id).await?;
    state
        .events
        .publish_json(EventKind::CategoryChanged, user.user_id, Some(id), &category);
    Ok(HttpResponse::Created().json(category))
}

#[get("/{id}")]
pub async fn get_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let category = find_category(&state, user.user_id, category_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(category))
}

#[put("/{id}")]
pub async fn update_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
    body: web::Json<CategoryInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let id = category_id.into_inner();
    find_category(&state, user.user_id, id).await?;
    if name_taken(&state, user.user_id, &body.name, Some(id)).await? {
        return Err(AppError::Conflict("A category with this name already exists".into()));
    }

    sqlx::query(
        "UPDATE categories SET name = $3, color = $4, icon = $5, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.user_id)
    .bind(body.name.trim())
    .bind(&body.color)
    .bind(&body.icon)
    .execute(&state.pool)
    .await?;

    let category = find_category(&state, user.user_id, id).await?;
    state
        .events
        .publish_json(EventKind::CategoryChanged, user.user_id, Some(id), &category);
    Ok(HttpResponse::Ok().json(category))
}

/// Soft-deletes a category. Its todos and templates stay, without a category.
#[delete("/{id}")]
pub async fn delete_category(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    category_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let id = category_id.into_inner();
    let mut tx = state.pool.begin().await?;

    let result = sqlx::query(
        "UPDATE categories SET deleted_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(user.user_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Category not found".into()));
    }

    let detached = sqlx::query(
        "UPDATE todos SET category_id = NULL, updated_at = NOW() WHERE category_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    sqlx::query(
        "UPDATE todo_templates SET category_id = NULL, updated_at = NOW() \
         WHERE category_id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    state.events.publish(
        EventKind::CategoryChanged,
        user.user_id,
        Some(id),
        json!({ "id": id, "deleted": true, "detached_todos": detached }),
    );
    Ok(HttpResponse::NoContent().finish())
}
