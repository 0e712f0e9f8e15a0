//! Postgres-backed implementation of the identity store.
//!
//! # Purpose
//! Durable organizations and users shared by every admin API replica.
//!
//! # Key invariants
//! - Sync provisioning runs in one transaction:
//!   `INSERT ... ON CONFLICT (name) DO NOTHING` then a locking select for the
//!   organization, a locking select for any existing user, and
//!   `INSERT ... ON CONFLICT (external_subject_id) DO UPDATE` for the user.
//!   Racing logins for the same subject converge on one row. An inactive
//!   organization or deactivated user rolls the transaction back before the
//!   user upsert.
//! - Admin operations open a transaction, apply the caller's
//!   [`SessionVariables`] with `set_config(name, value, true)`, and filter on
//!   `current_setting('app.current_organization_id')`. The settings disappear
//!   at commit or rollback, so pooled connections never leak scope.
//! - `users` has forced row-level security. Login-path statements (sync
//!   provisioning, subject lookup, login stamping) run in a transaction that
//!   sets `app.identity_login`; every other statement sees only the rows of
//!   the scoped organization.
//!
//! # Operational notes
//! - Migrations run at connect time via `sqlx::migrate!("./migrations")`.
//! - Database URLs may contain credentials and are never logged.
use super::{IdentityStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::model::{
    NewUser, Organization, OrganizationStatus, ProvisionOutcome, ProvisionRequest,
    ProvisionedIdentity, User, UserAccessPatch,
};
use anyhow::anyhow;
use async_trait::async_trait;
use atrium_authz::{CanonicalRole, SessionVariables};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const LOGIN_SETTING: &str = "app.identity_login";

const USER_COLUMNS: &str = "id, external_subject_id, email, organization_id, role, customer_type, is_active, last_login_at, created_at";

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbOrganization {
    id: Uuid,
    name: String,
    display_name: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbOrganization> for Organization {
    type Error = StoreError;

    fn try_from(row: DbOrganization) -> Result<Self, Self::Error> {
        let status = OrganizationStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("unknown organization status: {}", row.status))?;
        Ok(Organization {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    external_subject_id: String,
    email: Option<String>,
    organization_id: Option<Uuid>,
    role: String,
    customer_type: Option<String>,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = StoreError;

    fn try_from(row: DbUser) -> Result<Self, Self::Error> {
        // Stored roles are canonical by constraint; anything else is corruption.
        let role = CanonicalRole::from_canonical(&row.role)
            .ok_or_else(|| anyhow!("non-canonical stored role: {}", row.role))?;
        Ok(User {
            id: row.id,
            external_subject_id: row.external_subject_id,
            email: row.email,
            organization_id: row.organization_id,
            role,
            customer_type: row.customer_type,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbUpsertedUser {
    #[sqlx(flatten)]
    user: DbUser,
    inserted: bool,
}

impl PostgresStore {
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    #[cfg(any(test, feature = "pg-tests"))]
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;
        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Open a transaction carrying the caller's row-level security scope.
    async fn begin_scoped(
        &self,
        scope: &SessionVariables,
    ) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        for (name, value) in scope.as_pairs() {
            sqlx::query("SELECT set_config($1, $2, true)")
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }

    /// Open a transaction for the login path, which resolves users before any
    /// organization scope exists.
    async fn begin_login(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config($1, 'on', true)")
            .bind(LOGIN_SETTING)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    async fn provision_identity(&self, request: ProvisionRequest) -> StoreResult<ProvisionOutcome> {
        let mut tx = self.begin_login().await?;

        // A no-op for an existing name; a new organization is always active.
        sqlx::query(
            r#"INSERT INTO organizations (id, name, display_name) VALUES ($1, $2, $2)
               ON CONFLICT (name) DO NOTHING"#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.organization_name)
        .execute(&mut *tx)
        .await?;
        let organization: Organization = sqlx::query_as::<_, DbOrganization>(
            "SELECT id, name, display_name, status, created_at FROM organizations WHERE name = $1 FOR UPDATE",
        )
        .bind(&request.organization_name)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;
        if !organization.is_active() {
            tx.rollback().await?;
            return Ok(ProvisionOutcome::OrganizationInactive(organization));
        }

        let existing = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_subject_id = $1 FOR UPDATE"
        ))
        .bind(&request.external_subject_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(User::try_from)
        .transpose()?;
        if let Some(user) = existing.filter(|user| !user.is_active) {
            tx.rollback().await?;
            return Ok(ProvisionOutcome::UserInactive(user));
        }

        // `xmax = 0` only holds for a freshly inserted tuple.
        let upserted = sqlx::query_as::<_, DbUpsertedUser>(&format!(
            r#"INSERT INTO users (id, external_subject_id, email, organization_id, role, customer_type, is_active, last_login_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $7)
               ON CONFLICT (external_subject_id) DO UPDATE SET
                   email = COALESCE(EXCLUDED.email, users.email),
                   organization_id = EXCLUDED.organization_id,
                   role = EXCLUDED.role,
                   customer_type = EXCLUDED.customer_type,
                   last_login_at = EXCLUDED.last_login_at
               RETURNING {USER_COLUMNS}, (xmax = 0) AS inserted"#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.external_subject_id)
        .bind(request.email.as_deref())
        .bind(organization.id)
        .bind(request.role.as_str())
        .bind(request.customer_type.as_str())
        .bind(request.login_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ProvisionOutcome::Provisioned(ProvisionedIdentity {
            organization,
            user: upserted.user.try_into()?,
            user_created: upserted.inserted,
        }))
    }

    async fn find_user_by_external_id(
        &self,
        external_subject_id: &str,
    ) -> StoreResult<Option<User>> {
        let mut tx = self.begin_login().await?;
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_subject_id = $1"
        ))
        .bind(external_subject_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        row.map(User::try_from).transpose()
    }

    async fn record_login(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut tx = self.begin_login().await?;
        let row = sqlx::query_as::<_, DbUser>(&format!(
            r#"UPDATE users SET email = COALESCE($2, email), last_login_at = $3
               WHERE id = $1 RETURNING {USER_COLUMNS}"#
        ))
        .bind(user_id)
        .bind(email)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("user".into()))?;
        tx.commit().await?;
        row.try_into()
    }

    async fn get_organization(&self, organization_id: Uuid) -> StoreResult<Organization> {
        sqlx::query_as::<_, DbOrganization>(
            "SELECT id, name, display_name, status, created_at FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("organization".into()))?
        .try_into()
    }

    async fn create_user(&self, scope: &SessionVariables, user: NewUser) -> StoreResult<User> {
        let mut tx = self.begin_scoped(scope).await?;
        let insert = sqlx::query_as::<_, DbUser>(&format!(
            r#"INSERT INTO users (id, external_subject_id, email, organization_id, role, customer_type)
               VALUES ($1, $2, $3, current_setting('app.current_organization_id')::uuid, $4, $5)
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.external_subject_id)
        .bind(user.email.as_deref())
        .bind(user.role.as_str())
        .bind(user.customer_type.as_str())
        .fetch_one(&mut *tx)
        .await;
        let row = match insert {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::Conflict("user".into()));
            }
            Err(err) if is_foreign_key_violation(&err) => {
                return Err(StoreError::NotFound("organization".into()));
            }
            Err(err) => return Err(StoreError::Unexpected(err.into())),
        };
        tx.commit().await?;
        row.try_into()
    }

    async fn update_user_access(
        &self,
        scope: &SessionVariables,
        user_id: Uuid,
        patch: UserAccessPatch,
    ) -> StoreResult<User> {
        let mut tx = self.begin_scoped(scope).await?;
        let row = sqlx::query_as::<_, DbUser>(&format!(
            r#"UPDATE users SET
                   role = COALESCE($2, role),
                   customer_type = COALESCE($3, customer_type),
                   is_active = COALESCE($4, is_active)
               WHERE id = $1
                 AND organization_id = current_setting('app.current_organization_id')::uuid
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(user_id)
        .bind(patch.role.map(CanonicalRole::as_str))
        .bind(patch.customer_type.map(|value| value.as_str()))
        .bind(patch.is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("user".into()))?;
        tx.commit().await?;
        row.try_into()
    }

    async fn list_users(&self, scope: &SessionVariables) -> StoreResult<Vec<User>> {
        let mut tx = self.begin_scoped(scope).await?;
        let rows = sqlx::query_as::<_, DbUser>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users
               WHERE organization_id = current_setting('app.current_organization_id')::uuid
               ORDER BY external_subject_id"#
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    database_error_code(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    database_error_code(err).as_deref() == Some("23503")
}

fn database_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}
