//! Login state machine: external bearer to internal credential.
//!
//! # Purpose
//! Drives a login through
//! `Unauthenticated -> ExternallyAuthenticated -> PolicyEvaluated ->
//! Provisioned -> InternallyAuthorized`, and verifies internal credentials on
//! every later request.
//!
//! # Key invariants
//! - The scope policy runs on normalized claims before any store call, so a
//!   denied login never creates or touches identity rows.
//! - Sync provisioning is the only path that creates rows. Strict
//!   provisioning only reads users and refreshes their login timestamp.
//! - In strict mode the stored role, organization and customer type are
//!   authoritative; claims only supply the subject and email.
//! - Request authorization does no I/O: the context is rebuilt from the
//!   credential alone.
//!
//! # Observability
//! Every terminal failure increments `atrium_auth_failures_total{reason}` and
//! is logged with the same reason code.
use crate::auth::oidc::ExternalTokenValidator;
use crate::model::{Organization, ProvisionOutcome, ProvisionRequest, User};
use crate::store::{IdentityStore, StoreError};
use atrium_authz::{
    AuthorizationContext, CustomerClass, DenyReason, InternalTokenService, IssuedCredential,
    NormalizedClaims, OrganizationScopePolicy, ScopeDecision, TokenError, Visibility,
    normalize_claims, normalize_optional_role,
};
use chrono::Utc;
use std::sync::Arc;

/// How `PolicyEvaluated -> Provisioned` is performed. Chosen per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvisioningMode {
    /// Users must exist beforehand; unknown identities are refused.
    #[default]
    Strict,
    /// Organizations and users are created or updated from claims.
    Sync,
}

impl ProvisioningMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningMode::Strict => "strict",
            ProvisioningMode::Sync => "sync",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown provisioning mode: {0}")]
pub struct ParseProvisioningModeError(String);

impl std::str::FromStr for ProvisioningMode {
    type Err = ParseProvisioningModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ProvisioningMode::Strict),
            "sync" => Ok(ProvisioningMode::Sync),
            other => Err(ParseProvisioningModeError(other.to_string())),
        }
    }
}

/// Terminal failure of a login or of request authorization.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("access denied: {0}")]
    PolicyDenied(DenyReason),
    #[error("user is not provisioned")]
    UserNotProvisioned,
    #[error("organization is not active")]
    OrganizationInactive,
    #[error("user profile is incomplete")]
    ProvisioningIncomplete,
    #[error("identity store failure: {0}")]
    Store(#[from] StoreError),
    #[error("credential signing failure: {0}")]
    Signing(#[source] TokenError),
}

impl AuthFailure {
    /// Machine-readable reason code returned to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::TokenExpired => "token_expired",
            AuthFailure::PolicyDenied(reason) => reason.as_str(),
            AuthFailure::UserNotProvisioned => "user_not_provisioned",
            AuthFailure::OrganizationInactive => "organization_inactive",
            AuthFailure::ProvisioningIncomplete => "incomplete_profile",
            AuthFailure::Store(_) | AuthFailure::Signing(_) => "internal_server_error",
        }
    }

    fn record(&self) {
        metrics::counter!("atrium_auth_failures_total", "reason" => self.reason()).increment(1);
        match self {
            AuthFailure::Store(_) | AuthFailure::Signing(_) => {
                tracing::error!(reason = self.reason(), error = %self, "authentication failed");
            }
            _ => tracing::warn!(reason = self.reason(), "authentication failed"),
        }
    }
}

/// Successful login: the context, its signed credential and the data view.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub context: AuthorizationContext,
    pub credential: IssuedCredential,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub enum LoginState {
    Unauthenticated {
        bearer: Option<String>,
    },
    ExternallyAuthenticated {
        claims: NormalizedClaims,
    },
    PolicyEvaluated {
        claims: NormalizedClaims,
        visibility: Visibility,
    },
    Provisioned {
        context: AuthorizationContext,
        visibility: Visibility,
    },
    InternallyAuthorized(LoginOutcome),
}

impl LoginState {
    pub fn name(&self) -> &'static str {
        match self {
            LoginState::Unauthenticated { .. } => "unauthenticated",
            LoginState::ExternallyAuthenticated { .. } => "externally_authenticated",
            LoginState::PolicyEvaluated { .. } => "policy_evaluated",
            LoginState::Provisioned { .. } => "provisioned",
            LoginState::InternallyAuthorized(_) => "internally_authorized",
        }
    }
}

pub struct LoginOrchestrator {
    validator: Arc<dyn ExternalTokenValidator>,
    store: Arc<dyn IdentityStore>,
    policy: OrganizationScopePolicy,
    tokens: InternalTokenService,
    mode: ProvisioningMode,
}

impl LoginOrchestrator {
    pub fn new(
        validator: Arc<dyn ExternalTokenValidator>,
        store: Arc<dyn IdentityStore>,
        policy: OrganizationScopePolicy,
        tokens: InternalTokenService,
        mode: ProvisioningMode,
    ) -> Self {
        Self {
            validator,
            store,
            policy,
            tokens,
            mode,
        }
    }

    pub fn mode(&self) -> ProvisioningMode {
        self.mode
    }

    pub fn tokens(&self) -> &InternalTokenService {
        &self.tokens
    }

    /// Run every transition from `Unauthenticated` to `InternallyAuthorized`.
    pub async fn login(&self, bearer: Option<&str>) -> Result<LoginOutcome, AuthFailure> {
        let mut state = LoginState::Unauthenticated {
            bearer: bearer.map(str::to_string),
        };
        loop {
            if let LoginState::InternallyAuthorized(outcome) = state {
                metrics::counter!("atrium_auth_logins_total", "mode" => self.mode.as_str())
                    .increment(1);
                tracing::info!(
                    user_id = %outcome.context.user_id,
                    organization_id = %outcome.context.organization_id,
                    role = %outcome.context.role,
                    customer_type = %outcome.context.customer_type,
                    "login succeeded"
                );
                return Ok(outcome);
            }
            let from = state.name();
            state = self.advance(state).await.inspect_err(AuthFailure::record)?;
            tracing::debug!(from, to = state.name(), "login transition");
        }
    }

    /// Perform exactly one transition. `InternallyAuthorized` is terminal and
    /// is returned unchanged.
    pub async fn advance(&self, state: LoginState) -> Result<LoginState, AuthFailure> {
        match state {
            LoginState::Unauthenticated { bearer } => {
                let claims = self.authenticate(bearer.as_deref()).await?;
                Ok(LoginState::ExternallyAuthenticated { claims })
            }
            LoginState::ExternallyAuthenticated { claims } => {
                match self.policy.evaluate(
                    claims.customer_type.as_deref(),
                    claims.organization_name.as_deref(),
                ) {
                    ScopeDecision::Allow { visibility } => {
                        Ok(LoginState::PolicyEvaluated { claims, visibility })
                    }
                    ScopeDecision::Deny(reason) => Err(AuthFailure::PolicyDenied(reason)),
                }
            }
            LoginState::PolicyEvaluated { claims, visibility } => {
                let (context, visibility) = match self.mode {
                    ProvisioningMode::Strict => self.provision_strict(&claims).await?,
                    ProvisioningMode::Sync => {
                        (self.provision_sync(&claims).await?, visibility)
                    }
                };
                Ok(LoginState::Provisioned {
                    context,
                    visibility,
                })
            }
            LoginState::Provisioned {
                context,
                visibility,
            } => {
                let credential = self.tokens.issue(&context).map_err(AuthFailure::Signing)?;
                Ok(LoginState::InternallyAuthorized(LoginOutcome {
                    context,
                    credential,
                    visibility,
                }))
            }
            done @ LoginState::InternallyAuthorized(_) => Ok(done),
        }
    }

    /// Verify the internal credential presented on a later request.
    pub fn authorize_request(
        &self,
        credential: Option<&str>,
    ) -> Result<AuthorizationContext, AuthFailure> {
        let credential = credential
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthFailure::MissingToken)
            .inspect_err(AuthFailure::record)?;
        self.tokens
            .verify(credential)
            .map_err(|err| match err {
                TokenError::Expired => AuthFailure::TokenExpired,
                _ => AuthFailure::InvalidToken,
            })
            .inspect_err(AuthFailure::record)
    }

    async fn authenticate(&self, bearer: Option<&str>) -> Result<NormalizedClaims, AuthFailure> {
        let bearer = bearer
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthFailure::MissingToken)?;
        let raw = self.validator.validate(bearer).await.map_err(|err| {
            tracing::debug!(error = %err, "external bearer rejected");
            AuthFailure::InvalidToken
        })?;
        normalize_claims(&raw).map_err(|err| {
            tracing::debug!(error = %err, "external claims incomplete");
            AuthFailure::InvalidToken
        })
    }

    async fn provision_strict(
        &self,
        claims: &NormalizedClaims,
    ) -> Result<(AuthorizationContext, Visibility), AuthFailure> {
        let user = self
            .store
            .find_user_by_external_id(&claims.external_subject_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthFailure::UserNotProvisioned)?;
        let (organization_id, customer_type) = stored_profile(&user)?;
        let organization = match self.store.get_organization(organization_id).await {
            Ok(organization) => organization,
            Err(StoreError::NotFound(_)) => return Err(AuthFailure::ProvisioningIncomplete),
            Err(err) => return Err(err.into()),
        };
        if !organization.is_active() {
            return Err(AuthFailure::OrganizationInactive);
        }
        let visibility = self.stored_visibility(customer_type, &organization)?;
        let user = self
            .store
            .record_login(user.id, claims.email.as_deref(), Utc::now())
            .await?;
        Ok((
            AuthorizationContext {
                user_id: user.id,
                organization_id: organization.id,
                customer_type,
                role: user.role,
            },
            visibility,
        ))
    }

    async fn provision_sync(
        &self,
        claims: &NormalizedClaims,
    ) -> Result<AuthorizationContext, AuthFailure> {
        let customer_type = claims
            .customer_type
            .as_deref()
            .and_then(CustomerClass::parse)
            .ok_or(AuthFailure::PolicyDenied(DenyReason::UnrecognizedCustomerType))?;
        let organization_name = claims
            .organization_name
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or(AuthFailure::ProvisioningIncomplete)?;
        let outcome = self
            .store
            .provision_identity(ProvisionRequest {
                external_subject_id: claims.external_subject_id.clone(),
                email: claims.email.clone(),
                organization_name,
                customer_type,
                role: normalize_optional_role(claims.user_role.as_deref()),
                login_at: Utc::now(),
            })
            .await?;
        let identity = match outcome {
            ProvisionOutcome::Provisioned(identity) => identity,
            ProvisionOutcome::OrganizationInactive(_) => {
                return Err(AuthFailure::OrganizationInactive);
            }
            ProvisionOutcome::UserInactive(_) => return Err(AuthFailure::UserNotProvisioned),
        };
        if identity.user_created {
            metrics::counter!("atrium_identities_provisioned_total").increment(1);
            tracing::info!(
                user_id = %identity.user.id,
                organization = %identity.organization.name,
                "provisioned new identity"
            );
        }
        Ok(AuthorizationContext {
            user_id: identity.user.id,
            organization_id: identity.organization.id,
            customer_type,
            role: identity.user.role,
        })
    }

    /// Re-run the scope policy on the stored customer type and organization,
    /// so a staff profile bound to an organization that has left the
    /// allow-list is refused even when its claims still name an allowed one.
    fn stored_visibility(
        &self,
        customer_type: CustomerClass,
        organization: &Organization,
    ) -> Result<Visibility, AuthFailure> {
        match self
            .policy
            .evaluate(Some(customer_type.as_str()), Some(&organization.name))
        {
            ScopeDecision::Allow { visibility } => Ok(visibility),
            ScopeDecision::Deny(reason) => Err(AuthFailure::PolicyDenied(reason)),
        }
    }
}

fn stored_profile(user: &User) -> Result<(uuid::Uuid, CustomerClass), AuthFailure> {
    if !user.has_complete_profile() {
        return Err(AuthFailure::ProvisioningIncomplete);
    }
    let organization_id = user
        .organization_id
        .ok_or(AuthFailure::ProvisioningIncomplete)?;
    let customer_type = user
        .customer_type
        .as_deref()
        .and_then(CustomerClass::parse)
        .ok_or(AuthFailure::ProvisioningIncomplete)?;
    Ok((organization_id, customer_type))
}
