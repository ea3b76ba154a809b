//! Maker-checker roles
//!
//! Every request resolves the acting user's role afresh from the role
//! directory. Nothing here caches across requests: a demoted checker loses
//! authority on their next call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::approval::error::ApprovalError;
use crate::db::{Database, SafeRow};

/// Exactly one role per actor, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Checker,
    Maker,
    None,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Checker => "CHECKER",
            Role::Maker => "MAKER",
            Role::None => "NONE",
        }
    }

    /// Admin submissions are approved in the same step
    #[inline]
    pub fn auto_approves(&self) -> bool {
        matches!(self, Role::Admin)
    }

    #[inline]
    pub fn can_submit(&self) -> bool {
        matches!(self, Role::Admin | Role::Maker)
    }

    #[inline]
    pub fn can_decide(&self) -> bool {
        matches!(self, Role::Admin | Role::Checker)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Submit,
    Approve,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Submit => "submit",
            Action::Approve => "approve",
            Action::Reject => "reject",
        })
    }
}

/// `checker_maker` flag values
pub const CHECKER_MAKER_MAKER: i16 = 1;
pub const CHECKER_MAKER_CHECKER: i16 = 2;

/// Raw role record as stored for an actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub role_name: String,
    /// Non-editable roles are the built-in administrator roles
    pub is_editable: bool,
    pub checker_maker: i16,
}

impl RoleRecord {
    pub fn admin(name: &str) -> Self {
        Self {
            role_name: name.to_string(),
            is_editable: false,
            checker_maker: 0,
        }
    }

    pub fn checker(name: &str) -> Self {
        Self {
            role_name: name.to_string(),
            is_editable: true,
            checker_maker: CHECKER_MAKER_CHECKER,
        }
    }

    pub fn maker(name: &str) -> Self {
        Self {
            role_name: name.to_string(),
            is_editable: true,
            checker_maker: CHECKER_MAKER_MAKER,
        }
    }

    pub fn role(&self) -> Role {
        if !self.is_editable {
            return Role::Admin;
        }
        match self.checker_maker {
            CHECKER_MAKER_CHECKER => Role::Checker,
            CHECKER_MAKER_MAKER => Role::Maker,
            _ => Role::None,
        }
    }
}

/// Source of role records
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_record(&self, actor: &str) -> Result<Option<RoleRecord>, ApprovalError>;
}

/// Resolves an actor to a [`Role`] on every call
#[derive(Clone)]
pub struct RoleResolver {
    directory: Arc<dyn RoleDirectory>,
}

impl RoleResolver {
    pub fn new(directory: Arc<dyn RoleDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, actor: &str) -> Result<Role, ApprovalError> {
        let role = self
            .directory
            .role_record(actor)
            .await?
            .map(|r| r.role())
            .unwrap_or(Role::None);
        tracing::debug!(actor, role = %role, "Resolved role");
        Ok(role)
    }

    /// Resolve and check that the role may perform `action`
    pub async fn authorize(&self, actor: &str, action: Action) -> Result<Role, ApprovalError> {
        let role = self.resolve(actor).await?;
        authorize(role, action)?;
        Ok(role)
    }
}

/// Authority check for a resolved role
pub fn authorize(role: Role, action: Action) -> Result<(), ApprovalError> {
    let allowed = match action {
        Action::Submit => role.can_submit(),
        Action::Approve | Action::Reject => role.can_decide(),
    };
    match (allowed, role) {
        (true, _) => Ok(()),
        (false, Role::None) => Err(ApprovalError::NoAuthority),
        (false, role) => Err(ApprovalError::Forbidden { role, action }),
    }
}

// ============================================================================
// Directories
// ============================================================================

/// `admin_roles_tb` lookup
pub struct PgRoleDirectory {
    db: Database,
}

impl PgRoleDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace an actor's role record
    pub async fn upsert(&self, actor: &str, record: &RoleRecord) -> Result<(), ApprovalError> {
        sqlx::query(
            r#"
            INSERT INTO admin_roles_tb (actor_id, role_name, is_editable, checker_maker)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (actor_id) DO UPDATE
            SET role_name = EXCLUDED.role_name,
                is_editable = EXCLUDED.is_editable,
                checker_maker = EXCLUDED.checker_maker
            "#,
        )
        .bind(actor)
        .bind(&record.role_name)
        .bind(record.is_editable)
        .bind(record.checker_maker)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RoleDirectory for PgRoleDirectory {
    async fn role_record(&self, actor: &str) -> Result<Option<RoleRecord>, ApprovalError> {
        let row = sqlx::query(
            r#"
            SELECT role_name, is_editable, checker_maker
            FROM admin_roles_tb
            WHERE actor_id = $1
            "#,
        )
        .bind(actor)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(RoleRecord {
                role_name: row.get_logged("role_name")?,
                is_editable: row.get_logged("is_editable")?,
                checker_maker: row.get_logged("checker_maker")?,
            })),
            None => Ok(None),
        }
    }
}

/// In-memory directory for tests and local runs
#[derive(Default)]
pub struct MemoryRoleDirectory {
    records: RwLock<HashMap<String, RoleRecord>>,
}

impl MemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, actor: &str, record: RoleRecord) {
        self.records.write().await.insert(actor.to_string(), record);
    }

    pub async fn remove(&self, actor: &str) {
        self.records.write().await.remove(actor);
    }
}

#[async_trait]
impl RoleDirectory for MemoryRoleDirectory {
    async fn role_record(&self, actor: &str) -> Result<Option<RoleRecord>, ApprovalError> {
        Ok(self.records.read().await.get(actor).cloned())
    }
}
