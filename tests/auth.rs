//! Account and login flows against a real database. `DATABASE_URL`
//! must point at a scratch database.

#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use common::{bearer, db_state, register_user, send, unique, PASSWORD};
use doable::auth::totp;
use doable::db;
use doable::oauth::{resolve_user, OAuthProfile, OAuthProvider};

#[actix_rt::test]
async fn test_register_login_logout_flow() {
    let state = db_state().await;
    let app = init_app!(state);

    let username = unique("flow");
    let email = format!("{}@example.com", username);
    let register_payload = json!({
        "username": username,
        "email": email,
        "password": PASSWORD,
        "display_name": "Flow Tester"
    });
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_payload)
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Registration failed: {}", body);
    assert!(body["token"].is_string());

    // Same email again
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_payload)
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Login failed: {}", body);
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&token))
        .to_request();
    let (status, me) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], email.as_str());
    assert!(me.get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/auth/logout")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_invalid_registration_inputs() {
    let state = db_state().await;
    let app = init_app!(state);

    let cases = vec![
        json!({ "username": "ab", "email": "short@example.com", "password": PASSWORD }),
        json!({ "username": "has space", "email": "space@example.com", "password": PASSWORD }),
        json!({ "username": unique("bademail"), "email": "not-an-email", "password": PASSWORD }),
        json!({ "username": unique("weak"), "email": "weak@example.com", "password": "password" }),
    ];
    for payload in cases {
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(&payload)
            .to_request();
        let (status, body) = send(&app, req).await;
        assert!(
            status.is_client_error(),
            "Expected rejection for {}, got {} {}",
            payload,
            status,
            body
        );
    }
}

#[actix_rt::test]
async fn test_wrong_password_locks_account() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, _) = register_user(&app, "lock").await;

    for _ in 0..state.config.max_failed_logins {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": email, "password": "Wrong12345" }))
            .to_request();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");
    }

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[actix_rt::test]
async fn test_unknown_email_is_indistinguishable() {
    let state = db_state().await;
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": format!("{}@example.com", unique("nobody")), "password": PASSWORD }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[actix_rt::test]
async fn test_two_factor_login_with_challenge_and_backup_code() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, token) = register_user(&app, "totp").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/setup")
        .insert_header(bearer(&token))
        .to_request();
    let (status, setup) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["otpauth_url"].as_str().unwrap().starts_with("otpauth://totp/"));

    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/enable")
        .insert_header(bearer(&token))
        .set_json(json!({ "code": "000000x" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let now = chrono::Utc::now().timestamp() as u64;
    let code = totp::code_at(&secret, now).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/enable")
        .insert_header(bearer(&token))
        .set_json(json!({ "code": code }))
        .to_request();
    let (status, enabled) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let backup_codes: Vec<String> = serde_json::from_value(enabled["backup_codes"].clone()).unwrap();
    assert!(!backup_codes.is_empty());

    // Password alone now yields a challenge.
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (status, challenge) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(challenge["requires_two_factor"], true);
    let challenge_token = challenge["challenge_token"].as_str().unwrap().to_string();

    // The challenge token is not an access token.
    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&challenge_token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let verify = |code: &str| {
        test::TestRequest::post()
            .uri("/api/auth/2fa/verify")
            .set_json(json!({ "challenge_token": challenge_token, "code": code }))
            .to_request()
    };
    let (status, body) = send(&app, verify(&backup_codes[0])).await;
    assert_eq!(status, StatusCode::OK, "Backup code rejected: {}", body);
    assert!(body["token"].is_string());

    // A backup code works only once.
    let (status, _) = send(&app, verify(&backup_codes[0])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_password_change_revokes_other_sessions() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, first_token) = register_user(&app, "pwchange").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (_, body) = send(&app, req).await;
    let second_token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::put()
        .uri("/api/users/me/password")
        .insert_header(bearer(&second_token))
        .set_json(json!({ "current_password": PASSWORD, "new_password": "NewPassword456" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "Password change failed: {}", body);
    assert_eq!(body["revoked_sessions"], 1);

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&first_token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&second_token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_api_key_lifecycle() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "apikey").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/api-keys")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "CI" }))
        .to_request();
    let (status, created) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "Key creation failed: {}", created);
    let key = created["key"].as_str().unwrap().to_string();
    let key_id = created["id"].as_str().unwrap().to_string();
    assert!(key.starts_with("dk_"));

    let req = test::TestRequest::get()
        .uri("/api/todos")
        .insert_header(bearer(&key))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    // Keys cannot mint more keys.
    let req = test::TestRequest::post()
        .uri("/api/auth/api-keys")
        .insert_header(bearer(&key))
        .set_json(json!({ "name": "nested" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/auth/api-keys/{}", key_id))
        .insert_header(bearer(&token))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/api/todos")
        .insert_header(bearer(&key))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_parallel_wrong_passwords_still_lock_account() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, _) = register_user(&app, "parallel").await;

    let attempts = (0..state.config.max_failed_logins * 2).map(|_| {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": email, "password": "Wrong12345" }))
            .to_request();
        send(&app, req)
    });
    for (status, _) in futures::future::join_all(attempts).await {
        assert!(
            status == StatusCode::UNAUTHORIZED || status == StatusCode::LOCKED,
            "Unexpected status {}",
            status
        );
    }

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::LOCKED);
}

/// Enables two-factor authentication and returns `(secret, backup codes)`.
async fn enable_two_factor(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    token: &str,
) -> (String, Vec<String>) {
    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/setup")
        .insert_header(bearer(token))
        .to_request();
    let (_, setup) = send(app, req).await;
    let secret = setup["secret"].as_str().unwrap().to_string();

    let code = totp::code_at(&secret, chrono::Utc::now().timestamp() as u64).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/enable")
        .insert_header(bearer(token))
        .set_json(json!({ "code": code }))
        .to_request();
    let (status, enabled) = send(app, req).await;
    assert_eq!(status, StatusCode::OK, "Enable failed: {}", enabled);
    let codes = serde_json::from_value(enabled["backup_codes"].clone()).unwrap();
    (secret, codes)
}

#[actix_rt::test]
async fn test_backup_code_wins_only_one_parallel_verification() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, token) = register_user(&app, "race").await;
    let (_, backup_codes) = enable_two_factor(&app, &token).await;

    let mut challenges = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": email, "password": PASSWORD }))
            .to_request();
        let (_, body) = send(&app, req).await;
        challenges.push(body["challenge_token"].as_str().unwrap().to_string());
    }

    let verifications = challenges.iter().map(|challenge| {
        let req = test::TestRequest::post()
            .uri("/api/auth/2fa/verify")
            .set_json(json!({ "challenge_token": challenge, "code": backup_codes[0] }))
            .to_request();
        send(&app, req)
    });
    let statuses: Vec<StatusCode> = futures::future::join_all(verifications)
        .await
        .into_iter()
        .map(|(status, _)| status)
        .collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "Statuses: {:?}",
        statuses
    );
}

#[actix_rt::test]
async fn test_disable_two_factor() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, token) = register_user(&app, "disable2fa").await;
    let (secret, _) = enable_two_factor(&app, &token).await;

    let code = totp::code_at(&secret, chrono::Utc::now().timestamp() as u64).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/disable")
        .insert_header(bearer(&token))
        .set_json(json!({ "code": code, "password": "Wrong12345" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/2fa/disable")
        .insert_header(bearer(&token))
        .set_json(json!({ "code": code, "password": PASSWORD }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "Disable failed: {}", body);

    // Password alone is enough again.
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": PASSWORD }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[actix_rt::test]
async fn test_api_key_cannot_manage_account() {
    let state = db_state().await;
    let app = init_app!(state);
    let (_, token) = register_user(&app, "keyguard").await;

    let req = test::TestRequest::post()
        .uri("/api/auth/api-keys")
        .insert_header(bearer(&token))
        .set_json(json!({ "name": "automation" }))
        .to_request();
    let (_, created) = send(&app, req).await;
    let key = created["key"].as_str().unwrap().to_string();

    let forbidden = vec![
        test::TestRequest::put()
            .uri("/api/users/me/password")
            .set_json(json!({ "new_password": "Takeover123" })),
        test::TestRequest::delete().uri("/api/users/me"),
        test::TestRequest::post().uri("/api/auth/2fa/setup"),
        test::TestRequest::post()
            .uri("/api/auth/2fa/enable")
            .set_json(json!({ "code": "123456" })),
        test::TestRequest::post()
            .uri("/api/auth/2fa/disable")
            .set_json(json!({ "code": "123456" })),
        test::TestRequest::post().uri("/api/auth/logout-all"),
    ];
    for req in forbidden {
        let req = req.insert_header(bearer(&key)).to_request();
        let path = req.path().to_string();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} accepted an API key", path);
    }

    // The account is untouched.
    let req = test::TestRequest::get()
        .uri("/api/users/me")
        .insert_header(bearer(&token))
        .to_request();
    let (status, me) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["two_factor_enabled"], false);
}

#[actix_rt::test]
async fn test_oauth_sign_in_links_verified_email() {
    let state = db_state().await;
    let app = init_app!(state);
    let (email, _) = register_user(&app, "oauthlink").await;
    let existing = db::users::find_by_email(&state.pool, &email)
        .await
        .unwrap()
        .unwrap();

    let profile = OAuthProfile {
        provider_user_id: unique("gh"),
        email: Some(email.clone()),
        email_verified: true,
        name: Some("Linked User".into()),
        login: None,
    };
    let outcome = resolve_user(&state.pool, OAuthProvider::GitHub, &profile)
        .await
        .unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.user.id, existing.id);

    // The provider id alone now finds the same user.
    let again = OAuthProfile {
        email: None,
        email_verified: false,
        ..profile.clone()
    };
    let outcome = resolve_user(&state.pool, OAuthProvider::GitHub, &again)
        .await
        .unwrap();
    assert_eq!(outcome.user.id, existing.id);

    // An unverified email never takes over an account.
    let stranger = OAuthProfile {
        provider_user_id: unique("gh"),
        email: Some(email.clone()),
        email_verified: false,
        name: None,
        login: Some(unique("octo")),
    };
    let outcome = resolve_user(&state.pool, OAuthProvider::GitHub, &stranger)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_ne!(outcome.user.id, existing.id);
    assert!(outcome.user.email.ends_with("@users.noreply.doable"));
}
