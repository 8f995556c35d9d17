use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    db,
    error::AppError,
    events::EventKind,
    models::{InstantiateTemplateInput, TemplateInput, TodoInput, TodoStatus, TodoTemplate},
    state::AppState,
};

const TEMPLATE_COLUMNS: &str = "id, user_id, name, title, description, priority, category_id, \
     tag_names, estimated_minutes, created_at, updated_at";

async fn find_template(
    state: &AppState,
    user_id: i32,
    id: Uuid,
) -> Result<TodoTemplate, AppError> {
    let sql = format!(
        "SELECT {} FROM todo_templates WHERE id = $1 AND user_id = $2",
        TEMPLATE_COLUMNS
    );
    sqlx::query_as::<_, TodoTemplate>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Template not found".into()))
}

fn clean_tag_names(names: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().map(|n| n.trim()) {
        if !cleaned.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            cleaned.push(name.to_string());
        }
    }
    cleaned
}

#[get("")]
pub async fn list_templates(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let sql = format!(
        "SELECT {} FROM todo_templates WHERE user_id = $1 ORDER BY name",
        TEMPLATE_COLUMNS
    );
    let templates = sqlx::query_as::<_, TodoTemplate>(&sql)
        .bind(user.user_id)
        .fetch_all(&state.pool)
        .await?;
    Ok(HttpResponse::Ok().json(templates))
}

#[post("")]
pub async fn create_template(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<TemplateInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let mut conn = state.pool.acquire().await?;
    db::todos::ensure_category(&mut conn, user.user_id, body.category_id).await?;

    let sql = format!(
        "INSERT INTO todo_templates (id, user_id, name, title, description, priority, category_id, \
         tag_names, estimated_minutes) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
        TEMPLATE_COLUMNS
    );
    let template = sqlx::query_as::<_, TodoTemplate>(&sql)
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(body.title.trim())
        .bind(&body.description)
        .bind(body.priority)
        .bind(body.category_id)
        .bind(clean_tag_names(&body.tag_names))
        .bind(body.estimated_minutes)
        .fetch_one(&mut *conn)
        .await?;
    Ok(HttpResponse::Created().json(template))
}

#[get("/{id}")]
pub async fn get_template(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    template_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let template = find_template(&state, user.user_id, template_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(template))
}

#[put("/{id}")]
pub async fn update_template(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    template_id: web::Path<Uuid>,
    body: web::Json<TemplateInput>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let mut conn = state.pool.acquire().await?;
    db::todos::ensure_category(&mut conn, user.user_id, body.category_id).await?;

    let sql = format!(
        "UPDATE todo_templates SET name = $3, title = $4, description = $5, priority = $6, \
         category_id = $7, tag_names = $8, estimated_minutes = $9, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 RETURNING {}",
        TEMPLATE_COLUMNS
    );
    let template = sqlx::query_as::<_, TodoTemplate>(&sql)
        .bind(template_id.into_inner())
        .bind(user.user_id)
        .bind(body.name.trim())
        .bind(body.title.trim())
        .bind(&body.description)
        .bind(body.priority)
        .bind(body.category_id)
        .bind(clean_tag_names(&body.tag_names))
        .bind(body.estimated_minutes)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Template not found".into()))?;
    Ok(HttpResponse::Ok().json(template))
}

#[delete("/{id}")]
pub async fn delete_template(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    template_id: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let result = sqlx::query("DELETE FROM todo_templates WHERE id = $1 AND user_id = $2")
        .bind(template_id.into_inner())
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Template not found".into()));
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Creates a todo from a template. Tags named by the template are created if
/// the caller does not have them yet.
#[post("/{id}/instantiate")]
pub async fn instantiate_template(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    template_id: web::Path<Uuid>,
    body: Option<web::Json<InstantiateTemplateInput>>,
) -> Result<impl Responder, AppError> {
    let overrides = body.map(|b| b.into_inner()).unwrap_or_default();
    overrides.validate()?;
    let template = find_template(&state, user.user_id, template_id.into_inner()).await?;

    let mut tx = state.pool.begin().await?;
    let mut tag_ids = Vec::with_capacity(template.tag_names.len());
    for name in &template.tag_names {
        sqlx::query(
            "INSERT INTO tags (id, user_id, name) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, lower(name)) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;
        let id: Uuid =
            sqlx::query_scalar("SELECT id FROM tags WHERE user_id = $1 AND lower(name) = lower($2)")
                .bind(user.user_id)
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;
        tag_ids.push(id);
    }

    let input = TodoInput {
        title: overrides.title.unwrap_or_else(|| template.title.clone()),
        description: template.description.clone(),
        status: TodoStatus::Pending,
        priority: template.priority,
        due_date: overrides.due_date,
        category_id: template.category_id,
        tag_ids,
        estimated_minutes: template.estimated_minutes,
        position: None,
    };
    let todo = db::todos::create(&mut tx, user.user_id, &input).await?;
    tx.commit().await?;

    log::debug!("Todo {} created from template {}", todo.id, template.id);
    state
        .events
        .publish_json(EventKind::TodoCreated, user.user_id, Some(todo.id), &todo);
    Ok(HttpResponse::Created().json(todo))
}
