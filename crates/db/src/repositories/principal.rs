use async_trait::async_trait;
use chrono::Utc;

use countersign_core::directory::{DirectoryError, PrincipalDirectory};
use countersign_core::domain::{Principal, PrincipalId, Role};
use countersign_core::repository::RepositoryError;

use super::{column, storage_error};
use crate::DbPool;

/// Principals provisioned into the local database.
pub struct SqlPrincipalDirectory {
    pool: DbPool,
}

impl SqlPrincipalDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, principal: &Principal) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO principal (id, display_name, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 role = excluded.role,
                 updated_at = excluded.updated_at",
        )
        .bind(principal.id.as_str())
        .bind(&principal.display_name)
        .bind(principal.role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Principal>, RepositoryError> {
        let rows = sqlx::query("SELECT id, display_name, role FROM principal ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(row_to_principal).collect()
    }
}

fn row_to_principal(row: &sqlx::sqlite::SqliteRow) -> Result<Principal, RepositoryError> {
    let id: String = column(row, "id")?;
    let display_name: String = column(row, "display_name")?;
    let role_str: String = column(row, "role")?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_str}` for `{id}`")))?;

    Ok(Principal { id: PrincipalId(id), display_name, role })
}

#[async_trait]
impl PrincipalDirectory for SqlPrincipalDirectory {
    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        let row = sqlx::query("SELECT id, display_name, role FROM principal WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match row {
            Some(ref r) => {
                row_to_principal(r).map(Some).map_err(|e| DirectoryError::Unavailable(e.to_string()))
            }
            None => Ok(None),
        }
    }
}
