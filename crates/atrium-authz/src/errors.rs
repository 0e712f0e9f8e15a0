use thiserror::Error;

/// Failures while turning a raw claims bag into [`crate::NormalizedClaims`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("missing required claim: {0}")]
    MissingRequiredClaim(&'static str),
}

/// Internal credential verification and signing failures.
///
/// `Expired` and `Invalid` are the only outcomes a caller presenting a
/// credential can observe; `Key` and `Signing` are operator problems.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("credential expired")]
    Expired,
    #[error("credential invalid: {0}")]
    Invalid(String),
    #[error("signing key error: {0}")]
    Key(String),
    #[error("credential signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("invalid resource kind: {0}")]
    InvalidResource(String),
    #[error("invalid customer class: {0}")]
    InvalidCustomerClass(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
