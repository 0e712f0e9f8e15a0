#![allow(dead_code)]

use admin_api::app::{AppState, build_router};
use admin_api::auth::oidc::{ExternalTokenValidator, OidcError};
use admin_api::auth::orchestrator::{LoginOrchestrator, ProvisioningMode};
use admin_api::model::{Organization, OrganizationStatus, User};
use admin_api::store::memory::InMemoryStore;
use async_trait::async_trait;
use atrium_authz::{
    CanonicalRole, InternalTokenService, OrganizationScopePolicy, RawClaims, SigningKey,
    SigningKeys,
};
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const STAFF_ORGANIZATIONS: [&str; 2] = ["InternalOrgA", "InternalOrgB"];

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// Maps opaque test bearers to claim bags; anything else is rejected.
#[derive(Default)]
pub struct StaticValidator {
    tokens: HashMap<String, RawClaims>,
}

impl StaticValidator {
    pub fn with(mut self, bearer: &str, claims: serde_json::Value) -> Self {
        let claims = claims.as_object().cloned().expect("claims object");
        self.tokens.insert(bearer.to_string(), claims);
        self
    }
}

#[async_trait]
impl ExternalTokenValidator for StaticValidator {
    async fn validate(&self, token: &str) -> Result<RawClaims, OidcError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(OidcError::IssuerNotAllowed)
    }
}

pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub store: InMemoryStore,
}

pub struct HarnessBuilder {
    mode: ProvisioningMode,
    validator: StaticValidator,
    secure_cookies: bool,
    store: InMemoryStore,
}

impl HarnessBuilder {
    pub fn new(mode: ProvisioningMode) -> Self {
        Self {
            mode,
            validator: StaticValidator::default(),
            secure_cookies: false,
            store: InMemoryStore::new(),
        }
    }

    pub fn bearer(mut self, bearer: &str, claims: serde_json::Value) -> Self {
        self.validator = self.validator.with(bearer, claims);
        self
    }

    pub fn secure_cookies(mut self) -> Self {
        self.secure_cookies = true;
        self
    }

    pub fn build(self) -> Harness {
        let tokens = InternalTokenService::new(
            "atrium-auth",
            "atrium-admin",
            Duration::from_secs(3600),
            Duration::from_secs(0),
            SigningKeys::single(SigningKey::from_seed([9u8; 32])),
        )
        .expect("token service");
        let store = self.store;
        let orchestrator = LoginOrchestrator::new(
            Arc::new(self.validator),
            Arc::new(store.clone()),
            OrganizationScopePolicy::new(STAFF_ORGANIZATIONS),
            tokens,
            self.mode,
        );
        let state = AppState {
            store: Arc::new(store.clone()),
            orchestrator: Arc::new(orchestrator),
            secure_cookies: self.secure_cookies,
        };
        Harness {
            app: build_router(state.clone()),
            state,
            store,
        }
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn with_bearer(method: &str, uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {bearer}"))
        .body(Body::empty())
        .expect("request")
}

pub fn login_request(bearer: &str) -> Request<Body> {
    with_bearer("POST", "/v1/auth/login", bearer)
}

pub async fn seed_organization(
    store: &InMemoryStore,
    name: &str,
    status: OrganizationStatus,
) -> Organization {
    let mut organization = Organization::new(name);
    organization.status = status;
    store
        .insert_organization(organization.clone())
        .await
        .expect("seed organization");
    organization
}

pub async fn seed_user(
    store: &InMemoryStore,
    external_subject_id: &str,
    organization: Option<&Organization>,
    role: CanonicalRole,
    customer_type: Option<&str>,
) -> User {
    let user = User {
        id: Uuid::new_v4(),
        external_subject_id: external_subject_id.to_string(),
        email: None,
        organization_id: organization.map(|org| org.id),
        role,
        customer_type: customer_type.map(str::to_string),
        is_active: true,
        last_login_at: None,
        created_at: chrono::Utc::now(),
    };
    store.insert_user(user.clone()).await.expect("seed user");
    user
}
