pub mod api_keys;
pub mod audit;
pub mod auth;
pub mod categories;
pub mod events;
pub mod exports;
pub mod health;
pub mod pomodoro;
pub mod sessions;
pub mod tags;
pub mod templates;
pub mod time_entries;
pub mod todos;
pub mod users;

use actix_web::web;

/// Everything under `/api`. Literal paths are registered before `/{id}` so they
/// are not parsed as ids.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::register)
            .service(auth::login)
            .service(auth::verify_two_factor)
            .service(auth::logout)
            .service(auth::logout_all)
            .service(auth::two_factor_setup)
            .service(auth::two_factor_enable)
            .service(auth::two_factor_disable)
            .service(auth::oauth_providers)
            .service(auth::oauth_start)
            .service(auth::oauth_callback)
            .service(
                web::scope("/sessions")
                    .service(sessions::list_sessions)
                    .service(sessions::revoke_session),
            )
            .service(
                web::scope("/api-keys")
                    .service(api_keys::list_api_keys)
                    .service(api_keys::create_api_key)
                    .service(api_keys::revoke_api_key),
            )
            .service(web::scope("/audit-logs").service(audit::list_audit_logs)),
    )
    .service(
        web::scope("/users")
            .service(users::get_me)
            .service(users::update_me)
            .service(users::delete_me)
            .service(users::change_password)
            .service(users::get_preferences)
            .service(users::update_preferences),
    )
    .service(
        web::scope("/todos")
            .service(todos::list_todos)
            .service(todos::create_todo)
            .service(todos::todo_stats)
            .service(todos::focus_list)
            .service(todos::bulk_update)
            .service(todos::get_todo)
            .service(todos::update_todo)
            .service(todos::delete_todo)
            .service(todos::update_todo_status)
            .service(todos::restore_todo)
            .service(time_entries::start_timer)
            .service(time_entries::list_todo_entries),
    )
    .service(
        web::scope("/time-entries")
            .service(time_entries::stop_timer)
            .service(time_entries::current_timer)
            .service(time_entries::time_summary),
    )
    .service(
        web::scope("/categories")
            .service(categories::list_categories)
            .service(categories::create_category)
            .service(categories::get_category)
            .service(categories::update_category)
            .service(categories::delete_category),
    )
    .service(
        web::scope("/tags")
            .service(tags::list_tags)
            .service(tags::create_tag)
            .service(tags::update_tag)
            .service(tags::delete_tag),
    )
    .service(
        web::scope("/exports")
            .service(exports::create_export)
            .service(exports::list_exports)
            .service(exports::get_export)
            .service(exports::download_export)
            .service(exports::delete_export),
    )
    .service(
        web::scope("/templates")
            .service(templates::list_templates)
            .service(templates::create_template)
            .service(templates::get_template)
            .service(templates::update_template)
            .service(templates::delete_template)
            .service(templates::instantiate_template),
    )
    .service(
        web::scope("/pomodoro")
            .service(pomodoro::record_session)
            .service(pomodoro::pomodoro_stats)
            .service(pomodoro::next_phase),
    )
    .service(web::scope("/events").service(events::event_stream));
}
