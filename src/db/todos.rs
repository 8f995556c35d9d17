use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::start_of_day;
use crate::error::AppError;
use crate::export::ExportRow;
use crate::productivity::focus::FOCUS_ORDER;
use crate::models::{
    BulkAction, ExportFilters, Paginated, Todo, TodoInput, TodoQuery, TodoStats, TodoStatus,
};

/// Columns of `Todo`, with the tags aggregated into a JSON array.
pub const TODO_COLUMNS: &str = "todos.id, todos.user_id, todos.category_id, todos.title, \
     todos.description, todos.status, todos.priority, todos.due_date, todos.completed_at, \
     todos.position, todos.estimated_minutes, \
     COALESCE((SELECT json_agg(json_build_object('id', tags.id, 'name', tags.name, 'color', tags.color) \
               ORDER BY lower(tags.name)) \
               FROM todo_tags JOIN tags ON tags.id = todo_tags.tag_id \
               WHERE todo_tags.todo_id = todos.id), '[]'::json) AS tags, \
     todos.created_at, todos.updated_at, todos.deleted_at";

fn not_found() -> AppError {
    AppError::NotFound("Todo not found".into())
}

/// Appends the `WHERE` conditions of `query` after an initial `todos.user_id = $1`.
fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &TodoQuery,
    now: DateTime<Utc>,
) {
    if !query.include_deleted.unwrap_or(false) {
        builder.push(" AND todos.deleted_at IS NULL");
    }
    if let Some(status) = query.status {
        builder.push(" AND todos.status = ").push_bind(status);
    }
    if let Some(priority) = query.priority {
        builder.push(" AND todos.priority = ").push_bind(priority);
    }
    if let Some(category_id) = query.category_id {
        builder.push(" AND todos.category_id = ").push_bind(category_id);
    }
    if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM todo_tags JOIN tags ON tags.id = todo_tags.tag_id \
                 WHERE todo_tags.todo_id = todos.id AND lower(tags.name) = lower(",
            )
            .push_bind(tag.to_string())
            .push("))");
    }
    if let Some(pattern) = query.search_pattern() {
        builder
            .push(" AND (todos.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR todos.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(before) = query.due_before {
        builder.push(" AND todos.due_date < ").push_bind(before);
    }
    if let Some(after) = query.due_after {
        builder.push(" AND todos.due_date > ").push_bind(after);
    }
    if query.overdue.unwrap_or(false) {
        builder
            .push(" AND todos.status IN ('pending', 'in_progress') AND todos.due_date < ")
            .push_bind(now);
    }
}

/// One page of the caller's todos.
pub async fn list(
    pool: &PgPool,
    user_id: i32,
    query: &TodoQuery,
) -> Result<Paginated<Todo>, AppError> {
    let now = Utc::now();

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM todos WHERE todos.user_id = ");
    count.push_bind(user_id);
    push_filters(&mut count, query, now);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::new(format!(
        "SELECT {} FROM todos WHERE todos.user_id = ",
        TODO_COLUMNS
    ));
    select.push_bind(user_id);
    push_filters(&mut select, query, now);

    let sort = query.sort_by.unwrap_or_default();
    let order = query.order.unwrap_or_default();
    // Both come from closed enums, never from request text.
    select.push(format!(
        " ORDER BY {} {} NULLS LAST, todos.created_at DESC, todos.id",
        sort.column(),
        order.sql()
    ));
    select
        .push(" LIMIT ")
        .push_bind(query.per_page())
        .push(" OFFSET ")
        .push_bind(query.offset());

    let items = select.build_query_as::<Todo>().fetch_all(pool).await?;

    Ok(Paginated {
        items,
        total,
        page: query.page(),
        per_page: query.per_page(),
    })
}

pub async fn find<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: i32,
    id: Uuid,
    include_deleted: bool,
) -> Result<Todo, AppError> {
    let sql = format!(
        "SELECT {} FROM todos WHERE todos.id = $1 AND todos.user_id = $2 \
         AND ($3 OR todos.deleted_at IS NULL)",
        TODO_COLUMNS
    );
    sqlx::query_as::<_, Todo>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(include_deleted)
        .fetch_optional(executor)
        .await?
        .ok_or_else(not_found)
}

/// Rejects categories that are missing, deleted or owned by someone else.
pub async fn ensure_category(
    conn: &mut PgConnection,
    user_id: i32,
    category_id: Option<Uuid>,
) -> Result<(), AppError> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL)",
    )
    .bind(category_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::BadRequest("Unknown category".into()))
    }
}

/// Rejects tag ids that do not all belong to the caller.
pub async fn ensure_tags(
    conn: &mut PgConnection,
    user_id: i32,
    tag_ids: &[Uuid],
) -> Result<(), AppError> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let mut distinct = tag_ids.to_vec();
    distinct.sort();
    distinct.dedup();

    let owned: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE user_id = $1 AND id = ANY($2)")
            .bind(user_id)
            .bind(&distinct)
            .fetch_one(&mut *conn)
            .await?;
    if owned == distinct.len() as i64 {
        Ok(())
    } else {
        Err(AppError::BadRequest("Unknown tag".into()))
    }
}

/// Replaces the tag links of a todo. Ownership must already be checked.
pub async fn replace_tags(
    conn: &mut PgConnection,
    todo_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM todo_tags WHERE todo_id = $1")
        .bind(todo_id)
        .execute(&mut *conn)
        .await?;
    if !tag_ids.is_empty() {
        sqlx::query(
            "INSERT INTO todo_tags (todo_id, tag_id) SELECT $1, unnest($2::uuid[]) ON CONFLICT DO NOTHING",
        )
        .bind(todo_id)
        .bind(tag_ids)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Inserts a todo with its tags and returns it.
pub async fn create(
    conn: &mut PgConnection,
    user_id: i32,
    input: &TodoInput,
) -> Result<Todo, AppError> {
    ensure_category(conn, user_id, input.category_id).await?;
    ensure_tags(conn, user_id, &input.tag_ids).await?;

    let id = Uuid::new_v4();
    let completed_at = crate::models::todo::completed_at_for(input.status, None, Utc::now());
    sqlx::query(
        "INSERT INTO todos (id, user_id, category_id, title, description, status, priority, \
         due_date, completed_at, estimated_minutes, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
         COALESCE($11, (SELECT COALESCE(MAX(position), 0) + 1 FROM todos WHERE user_id = $2)))",
    )
    .bind(id)
    .bind(user_id)
    .bind(input.category_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.status)
    .bind(input.priority)
    .bind(input.due_date)
    .bind(completed_at)
    .bind(input.estimated_minutes)
    .bind(input.position)
    .execute(&mut *conn)
    .await?;

    replace_tags(conn, id, &input.tag_ids).await?;
    find(&mut *conn, user_id, id, false).await
}

/// Full replacement of a live todo, tags included.
pub async fn update(
    conn: &mut PgConnection,
    user_id: i32,
    id: Uuid,
    input: &TodoInput,
) -> Result<Todo, AppError> {
    let current = find(&mut *conn, user_id, id, false).await?;
    ensure_category(conn, user_id, input.category_id).await?;
    ensure_tags(conn, user_id, &input.tag_ids).await?;

    let completed_at =
        crate::models::todo::completed_at_for(input.status, current.completed_at, Utc::now());
    sqlx::query(
        "UPDATE todos SET category_id = $3, title = $4, description = $5, status = $6, \
         priority = $7, due_date = $8, completed_at = $9, estimated_minutes = $10, \
         position = COALESCE($11, position), updated_at = NOW() \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .bind(input.category_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.status)
    .bind(input.priority)
    .bind(input.due_date)
    .bind(completed_at)
    .bind(input.estimated_minutes)
    .bind(input.position)
    .execute(&mut *conn)
    .await?;

    replace_tags(conn, id, &input.tag_ids).await?;
    find(&mut *conn, user_id, id, false).await
}

pub async fn set_status(
    conn: &mut PgConnection,
    user_id: i32,
    id: Uuid,
    status: TodoStatus,
) -> Result<Todo, AppError> {
    let current = find(&mut *conn, user_id, id, false).await?;
    let completed_at =
        crate::models::todo::completed_at_for(status, current.completed_at, Utc::now());
    sqlx::query(
        "UPDATE todos SET status = $3, completed_at = $4, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .bind(status)
    .bind(completed_at)
    .execute(&mut *conn)
    .await?;
    find(&mut *conn, user_id, id, false).await
}

pub async fn soft_delete(pool: &PgPool, user_id: i32, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE todos SET deleted_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    Ok(())
}

/// Removes the row for good, whether or not it was soft-deleted first.
pub async fn hard_delete(pool: &PgPool, user_id: i32, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    Ok(())
}

pub async fn restore(pool: &PgPool, user_id: i32, id: Uuid) -> Result<Todo, AppError> {
    let result = sqlx::query(
        "UPDATE todos SET deleted_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND deleted_at IS NOT NULL",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    find(pool, user_id, id, false).await
}

/// Applies one bulk action to the caller's todos among `ids`. Returns the number
/// of rows changed.
pub async fn bulk(
    conn: &mut PgConnection,
    user_id: i32,
    ids: &[Uuid],
    action: &BulkAction,
) -> Result<u64, AppError> {
    let result = match action {
        BulkAction::Complete => {
            sqlx::query(
                "UPDATE todos SET status = 'completed', completed_at = COALESCE(completed_at, NOW()), \
                 updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL AND status <> 'completed'",
            )
            .bind(user_id)
            .bind(ids)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::Reopen => {
            sqlx::query(
                "UPDATE todos SET status = 'pending', completed_at = NULL, updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL \
                 AND status IN ('completed', 'cancelled')",
            )
            .bind(user_id)
            .bind(ids)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::Delete => {
            sqlx::query(
                "UPDATE todos SET deleted_at = NOW(), updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(user_id)
            .bind(ids)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::Restore => {
            sqlx::query(
                "UPDATE todos SET deleted_at = NULL, updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NOT NULL",
            )
            .bind(user_id)
            .bind(ids)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::SetStatus { status } => {
            sqlx::query(
                "UPDATE todos SET status = $3, \
                 completed_at = CASE WHEN $3 = 'completed'::todo_status \
                     THEN COALESCE(completed_at, NOW()) ELSE NULL END, \
                 updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(user_id)
            .bind(ids)
            .bind(*status)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::SetPriority { priority } => {
            sqlx::query(
                "UPDATE todos SET priority = $3, updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(user_id)
            .bind(ids)
            .bind(*priority)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::SetCategory { category_id } => {
            ensure_category(conn, user_id, *category_id).await?;
            sqlx::query(
                "UPDATE todos SET category_id = $3, updated_at = NOW() \
                 WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(user_id)
            .bind(ids)
            .bind(*category_id)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::AddTag { tag_id } => {
            ensure_tags(conn, user_id, std::slice::from_ref(tag_id)).await?;
            sqlx::query(
                "INSERT INTO todo_tags (todo_id, tag_id) \
                 SELECT id, $3 FROM todos WHERE user_id = $1 AND id = ANY($2) AND deleted_at IS NULL \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(ids)
            .bind(*tag_id)
            .execute(&mut *conn)
            .await?
        }
        BulkAction::RemoveTag { tag_id } => {
            sqlx::query(
                "DELETE FROM todo_tags USING todos \
                 WHERE todo_tags.todo_id = todos.id AND todos.user_id = $1 \
                 AND todos.id = ANY($2) AND todo_tags.tag_id = $3",
            )
            .bind(user_id)
            .bind(ids)
            .bind(*tag_id)
            .execute(&mut *conn)
            .await?
        }
    };
    Ok(result.rows_affected())
}

pub async fn stats(pool: &PgPool, user_id: i32, now: DateTime<Utc>) -> Result<TodoStats, AppError> {
    let today = start_of_day(now);
    let stats = sqlx::query_as::<_, TodoStats>(
        "SELECT COUNT(*) AS total, \
         COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
         COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress, \
         COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
         COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled, \
         COUNT(*) FILTER (WHERE status IN ('pending', 'in_progress') AND due_date < $2) AS overdue, \
         COUNT(*) FILTER (WHERE status IN ('pending', 'in_progress') \
             AND due_date >= $3 AND due_date < $4) AS due_today, \
         COUNT(*) FILTER (WHERE completed_at >= $3) AS completed_today, \
         COUNT(*) FILTER (WHERE completed_at >= $5) AS completed_last_7_days \
         FROM todos WHERE user_id = $1 AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(now)
    .bind(today)
    .bind(today + Duration::days(1))
    .bind(now - Duration::days(7))
    .fetch_one(pool)
    .await?;
    Ok(stats)
}

/// The first `limit` open todos in focus order.
pub async fn focus(pool: &PgPool, user_id: i32, limit: i64) -> Result<Vec<Todo>, AppError> {
    let sql = format!(
        "SELECT {} FROM todos WHERE todos.user_id = $1 AND todos.deleted_at IS NULL \
         AND todos.status IN ('pending', 'in_progress') ORDER BY {} LIMIT $2",
        TODO_COLUMNS, FOCUS_ORDER
    );
    let todos = sqlx::query_as::<_, Todo>(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(todos)
}

/// Rows for an export, grouped by status then in list order.
pub async fn export_rows(
    pool: &PgPool,
    user_id: i32,
    filters: &ExportFilters,
) -> Result<Vec<ExportRow>, AppError> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {}, categories.name AS category_name FROM todos \
         LEFT JOIN categories ON categories.id = todos.category_id \
         WHERE todos.user_id = ",
        TODO_COLUMNS
    ));
    builder.push_bind(user_id);

    let query = TodoQuery {
        status: filters.status,
        category_id: filters.category_id,
        tag: filters.tag.clone(),
        include_deleted: Some(filters.include_deleted),
        ..Default::default()
    };
    push_filters(&mut builder, &query, Utc::now());
    builder.push(" ORDER BY todos.status, todos.position, todos.created_at");

    let rows = builder.build_query_as::<ExportRow>().fetch_all(pool).await?;
    Ok(rows)
}
