//! Integration tests for credential use after login: the session endpoint,
//! cookie handling, logout and the public key set.
mod common;

use admin_api::auth::orchestrator::ProvisioningMode;
use atrium_authz::{AuthorizationContext, CanonicalRole, CustomerClass};
use axum::body::Body;
use axum::http::header::SET_COOKIE;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common::{Harness, HarnessBuilder, get, login_request, read_json, with_bearer};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

fn context(role: CanonicalRole) -> AuthorizationContext {
    AuthorizationContext {
        user_id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        customer_type: CustomerClass::Partner,
        role,
    }
}

fn credential(harness: &Harness, ctx: &AuthorizationContext) -> String {
    harness
        .state
        .orchestrator
        .tokens()
        .issue(ctx)
        .expect("issue")
        .token
}

fn with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("cookie", cookie)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn session_reports_bearer_context() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let ctx = context(CanonicalRole::Approver);
    let token = credential(&harness, &ctx);

    let response = harness
        .app
        .clone()
        .oneshot(with_bearer("GET", "/v1/auth/session", &token))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user_id"], ctx.user_id.to_string());
    assert_eq!(body["organization_id"], ctx.organization_id.to_string());
    assert_eq!(body["role"], "approver");
    assert_eq!(body["customer_type"], "partner");
    let actions = body["allowed_actions"].as_array().expect("actions");
    assert!(actions.contains(&json!("approve")));
    assert!(!actions.contains(&json!("delete")));
}

#[tokio::test]
async fn session_accepts_cookie_credential() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let ctx = context(CanonicalRole::Viewer);
    let token = credential(&harness, &ctx);

    let response = harness
        .app
        .clone()
        .oneshot(with_cookie(
            "/v1/auth/session",
            &format!("theme=dark; session_token={token}"),
        ))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["role"], "viewer");
}

#[tokio::test]
async fn bearer_header_wins_over_cookie() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let admin = credential(&harness, &context(CanonicalRole::Admin));
    let viewer = credential(&harness, &context(CanonicalRole::Viewer));

    let request = Request::builder()
        .uri("/v1/auth/session")
        .header("authorization", format!("Bearer {admin}"))
        .header("cookie", format!("session_token={viewer}"))
        .body(Body::empty())
        .expect("request");
    let response = harness.app.clone().oneshot(request).await.expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["role"], "admin");
}

#[tokio::test]
async fn session_without_credential_is_unauthorized() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let response = harness
        .app
        .clone()
        .oneshot(get("/v1/auth/session"))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["reason"], "missing_token");
}

#[tokio::test]
async fn expired_credential_is_rejected() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let issued = harness
        .state
        .orchestrator
        .tokens()
        .issue_at(&context(CanonicalRole::Admin), Utc::now() - Duration::hours(2))
        .expect("issue");

    let response = harness
        .app
        .clone()
        .oneshot(with_bearer("GET", "/v1/auth/session", &issued.token))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["reason"], "token_expired");
}

#[tokio::test]
async fn tampered_credential_is_rejected() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let token = credential(&harness, &context(CanonicalRole::Viewer));
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let forged_claims = {
        use base64::Engine;
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let mut claims: serde_json::Value =
            serde_json::from_slice(&engine.decode(&parts[1]).expect("decode")).expect("claims");
        claims["role"] = json!("admin");
        engine.encode(claims.to_string())
    };
    parts[1] = forged_claims;
    let forged = parts.join(".");

    let response = harness
        .app
        .clone()
        .oneshot(with_bearer("GET", "/v1/auth/session", &forged))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["reason"], "invalid_token");
}

#[tokio::test]
async fn credential_from_another_key_is_rejected() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let other = atrium_authz::InternalTokenService::new(
        "atrium-auth",
        "atrium-admin",
        std::time::Duration::from_secs(3600),
        std::time::Duration::from_secs(0),
        atrium_authz::SigningKeys::single(atrium_authz::SigningKey::from_seed([7u8; 32])),
    )
    .expect("token service");
    let token = other
        .issue(&context(CanonicalRole::Admin))
        .expect("issue")
        .token;

    let response = harness
        .app
        .clone()
        .oneshot(with_bearer("GET", "/v1/auth/session", &token))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_cookie_authenticates_follow_up_requests() {
    let harness = HarnessBuilder::new(ProvisioningMode::Sync)
        .bearer(
            "idp-partner",
            json!({ "sub": "p-1", "customerType": "partner", "userRole": "viewer", "companyName": "Acme" }),
        )
        .build();
    let response = harness
        .app
        .clone()
        .oneshot(login_request("idp-partner"))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .expect("cookie")
        .to_string();

    let response = harness
        .app
        .clone()
        .oneshot(with_cookie("/v1/auth/session", &cookie))
        .await
        .expect("session");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["customer_type"], "partner");
}

#[tokio::test]
async fn logout_expires_cookie() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/logout")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("logout");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("cookie");
    assert!(cookie.starts_with("session_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn production_cookies_are_secure() {
    let harness = HarnessBuilder::new(ProvisioningMode::Sync)
        .bearer(
            "idp-staff",
            json!({ "sub": "s-1", "customerType": "staff", "companyName": "InternalOrgB" }),
        )
        .secure_cookies()
        .build();
    let response = harness
        .app
        .clone()
        .oneshot(login_request("idp-staff"))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=None"));
}

#[tokio::test]
async fn jwks_publishes_only_public_keys() {
    let harness = HarnessBuilder::new(ProvisioningMode::Strict).build();
    let response = harness
        .app
        .clone()
        .oneshot(get("/v1/auth/.well-known/jwks.json"))
        .await
        .expect("jwks");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let keys = body["keys"].as_array().expect("keys");
    assert_eq!(keys.len(), 1);
    let key = &keys[0];
    assert_eq!(key["kty"], "OKP");
    assert_eq!(key["crv"], "Ed25519");
    assert_eq!(key["alg"], "EdDSA");
    assert_eq!(key["use"], "sig");
    assert!(key.get("d").is_none());
    assert_eq!(
        key["kid"],
        harness.state.orchestrator.tokens().jwks().keys[0].kid
    );
}
