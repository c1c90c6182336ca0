use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use tracing::debug;

use countersign_core::domain::{
    Application, ApplicationId, ApplicationStatus, ApprovalRecord, Decision, Priority,
    PrincipalId, StageReassignment, StageRole, StageSlot,
};
use countersign_core::repository::{ApplicationRepository, RepositoryError};

use super::{column, from_i64, parse_optional_timestamp, parse_timestamp, storage_error, to_i64};
use crate::DbPool;

const APPLICATION_COLUMNS: &str = "SELECT id, requester_id, title, content, amount, priority,
            skip_manager_stage, status, current_stage_index, version,
            created_at, updated_at, submitted_at, completed_at
     FROM application";

const STAGE_COLUMNS: &str = "SELECT application_id, position, stage_role, approver_id
     FROM application_stage";

const RECORD_COLUMNS: &str = "SELECT application_id, sequence, stage_index, stage_role, actor_id,
            decision, comment, next_approver_id, decided_at
     FROM approval_record";

const REASSIGNMENT_COLUMNS: &str = "SELECT application_id, sequence, stage_index, stage_role,
            previous_approver_id, new_approver_id, reassigned_by, reassigned_at
     FROM stage_reassignment";

/// Applications stored across `application` and its child tables.
///
/// Every write runs in one transaction. `approval_record` and
/// `stage_reassignment` rows are only ever inserted, so the stored history is
/// append-only even if a caller hands back an aggregate with a rewritten past.
pub struct SqlApplicationRepository {
    pool: DbPool,
}

impl SqlApplicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_stage_role(raw: &str) -> Result<StageRole, RepositoryError> {
    StageRole::parse(raw).ok_or_else(|| RepositoryError::Decode(format!("unknown stage role `{raw}`")))
}

fn row_to_application(row: &SqliteRow) -> Result<Application, RepositoryError> {
    let id: String = column(row, "id")?;
    let requester_id: String = column(row, "requester_id")?;
    let title: String = column(row, "title")?;
    let content: String = column(row, "content")?;
    let amount_str: Option<String> = column(row, "amount")?;
    let priority_str: String = column(row, "priority")?;
    let skip_manager_stage: bool = column(row, "skip_manager_stage")?;
    let status_str: String = column(row, "status")?;
    let current_stage_index: i64 = column(row, "current_stage_index")?;
    let version: i64 = column(row, "version")?;
    let created_at_str: String = column(row, "created_at")?;
    let updated_at_str: String = column(row, "updated_at")?;
    let submitted_at_str: Option<String> = column(row, "submitted_at")?;
    let completed_at_str: Option<String> = column(row, "completed_at")?;

    let amount = amount_str
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|e| RepositoryError::Decode(format!("amount `{raw}` for `{id}`: {e}")))
        })
        .transpose()?;
    let priority = Priority::parse(&priority_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{priority_str}`")))?;
    let status = ApplicationStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;

    Ok(Application {
        id: ApplicationId(id),
        requester_id: PrincipalId(requester_id),
        title,
        content,
        amount,
        priority,
        skip_manager_stage,
        status,
        current_stage_index: from_i64(current_stage_index, "current_stage_index")?,
        effective_stages: Vec::new(),
        history: Vec::new(),
        reassignments: Vec::new(),
        version: from_i64(version, "version")?,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
        submitted_at: parse_optional_timestamp(submitted_at_str, "submitted_at")?,
        completed_at: parse_optional_timestamp(completed_at_str, "completed_at")?,
    })
}

fn row_to_stage(row: &SqliteRow) -> Result<(String, StageSlot), RepositoryError> {
    let application_id: String = column(row, "application_id")?;
    let role_str: String = column(row, "stage_role")?;
    let approver_id: Option<String> = column(row, "approver_id")?;

    Ok((
        application_id,
        StageSlot { role: parse_stage_role(&role_str)?, approver_id: approver_id.map(PrincipalId) },
    ))
}

fn row_to_record(row: &SqliteRow) -> Result<(String, ApprovalRecord), RepositoryError> {
    let application_id: String = column(row, "application_id")?;
    let sequence: i64 = column(row, "sequence")?;
    let stage_index: i64 = column(row, "stage_index")?;
    let role_str: String = column(row, "stage_role")?;
    let actor_id: String = column(row, "actor_id")?;
    let decision_str: String = column(row, "decision")?;
    let comment: Option<String> = column(row, "comment")?;
    let next_approver_id: Option<String> = column(row, "next_approver_id")?;
    let decided_at_str: String = column(row, "decided_at")?;

    let decision = Decision::parse(&decision_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision_str}`")))?;

    Ok((
        application_id,
        ApprovalRecord {
            sequence: from_i64(sequence, "sequence")?,
            stage_index: from_i64(stage_index, "stage_index")?,
            stage_role: parse_stage_role(&role_str)?,
            actor_id: PrincipalId(actor_id),
            decision,
            comment,
            next_approver_id: next_approver_id.map(PrincipalId),
            decided_at: parse_timestamp(&decided_at_str, "decided_at")?,
        },
    ))
}

fn row_to_reassignment(row: &SqliteRow) -> Result<(String, StageReassignment), RepositoryError> {
    let application_id: String = column(row, "application_id")?;
    let stage_index: i64 = column(row, "stage_index")?;
    let role_str: String = column(row, "stage_role")?;
    let previous_approver_id: Option<String> = column(row, "previous_approver_id")?;
    let new_approver_id: String = column(row, "new_approver_id")?;
    let reassigned_by: String = column(row, "reassigned_by")?;
    let reassigned_at_str: String = column(row, "reassigned_at")?;

    Ok((
        application_id,
        StageReassignment {
            stage_index: from_i64(stage_index, "stage_index")?,
            stage_role: parse_stage_role(&role_str)?,
            previous_approver_id: previous_approver_id.map(PrincipalId),
            new_approver_id: PrincipalId(new_approver_id),
            reassigned_by: PrincipalId(reassigned_by),
            reassigned_at: parse_timestamp(&reassigned_at_str, "reassigned_at")?,
        },
    ))
}

async fn load_application(
    conn: &mut SqliteConnection,
    id: &ApplicationId,
) -> Result<Option<Application>, RepositoryError> {
    let row = sqlx::query(&format!("{APPLICATION_COLUMNS} WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage_error)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut application = row_to_application(&row)?;

    let stages = sqlx::query(&format!("{STAGE_COLUMNS} WHERE application_id = ? ORDER BY position"))
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_error)?;
    for row in &stages {
        application.effective_stages.push(row_to_stage(row)?.1);
    }

    let records = sqlx::query(&format!("{RECORD_COLUMNS} WHERE application_id = ? ORDER BY sequence"))
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_error)?;
    for row in &records {
        application.history.push(row_to_record(row)?.1);
    }

    let reassignments =
        sqlx::query(&format!("{REASSIGNMENT_COLUMNS} WHERE application_id = ? ORDER BY sequence"))
            .bind(id.as_str())
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error)?;
    for row in &reassignments {
        application.reassignments.push(row_to_reassignment(row)?.1);
    }

    Ok(Some(application))
}

async fn replace_stages(
    conn: &mut SqliteConnection,
    application: &Application,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM application_stage WHERE application_id = ?")
        .bind(application.id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;

    for (position, stage) in application.effective_stages.iter().enumerate() {
        sqlx::query(
            "INSERT INTO application_stage (application_id, position, stage_role, approver_id)
             VALUES (?, ?, ?, ?)",
        )
        .bind(application.id.as_str())
        .bind(to_i64(position, "position")?)
        .bind(stage.role.as_str())
        .bind(stage.approver_id.as_ref().map(PrincipalId::as_str))
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    }

    Ok(())
}

async fn append_history(
    conn: &mut SqliteConnection,
    application: &Application,
) -> Result<(), RepositoryError> {
    for record in &application.history {
        sqlx::query(
            "INSERT INTO approval_record (application_id, sequence, stage_index, stage_role,
                                          actor_id, decision, comment, next_approver_id, decided_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(application_id, sequence) DO NOTHING",
        )
        .bind(application.id.as_str())
        .bind(i64::from(record.sequence))
        .bind(to_i64(record.stage_index, "stage_index")?)
        .bind(record.stage_role.as_str())
        .bind(record.actor_id.as_str())
        .bind(record.decision.as_str())
        .bind(record.comment.as_deref())
        .bind(record.next_approver_id.as_ref().map(PrincipalId::as_str))
        .bind(record.decided_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    }

    for (sequence, reassignment) in application.reassignments.iter().enumerate() {
        sqlx::query(
            "INSERT INTO stage_reassignment (application_id, sequence, stage_index, stage_role,
                                             previous_approver_id, new_approver_id,
                                             reassigned_by, reassigned_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(application_id, sequence) DO NOTHING",
        )
        .bind(application.id.as_str())
        .bind(to_i64(sequence, "sequence")?)
        .bind(to_i64(reassignment.stage_index, "stage_index")?)
        .bind(reassignment.stage_role.as_str())
        .bind(reassignment.previous_approver_id.as_ref().map(PrincipalId::as_str))
        .bind(reassignment.new_approver_id.as_str())
        .bind(reassignment.reassigned_by.as_str())
        .bind(reassignment.reassigned_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    }

    Ok(())
}

#[async_trait]
impl ApplicationRepository for SqlApplicationRepository {
    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let application = load_application(&mut tx, id).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(application)
    }

    async fn insert(&self, application: Application) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let result = sqlx::query(
            "INSERT INTO application (id, requester_id, title, content, amount, priority,
                                      skip_manager_stage, status, current_stage_index, version,
                                      created_at, updated_at, submitted_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(application.id.as_str())
        .bind(application.requester_id.as_str())
        .bind(&application.title)
        .bind(&application.content)
        .bind(application.amount.map(|amount| amount.to_string()))
        .bind(application.priority.as_str())
        .bind(application.skip_manager_stage)
        .bind(application.status.as_str())
        .bind(to_i64(application.current_stage_index, "current_stage_index")?)
        .bind(to_i64(application.version, "version")?)
        .bind(application.created_at.to_rfc3339())
        .bind(application.updated_at.to_rfc3339())
        .bind(application.submitted_at.map(|dt| dt.to_rfc3339()))
        .bind(application.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_error)?;
            return Err(RepositoryError::AlreadyExists { application_id: application.id });
        }

        replace_stages(&mut tx, &application).await?;
        append_history(&mut tx, &application).await?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        application: Application,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let result = sqlx::query(
            "UPDATE application SET
                 title = ?,
                 content = ?,
                 amount = ?,
                 priority = ?,
                 skip_manager_stage = ?,
                 status = ?,
                 current_stage_index = ?,
                 version = ?,
                 updated_at = ?,
                 submitted_at = ?,
                 completed_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&application.title)
        .bind(&application.content)
        .bind(application.amount.map(|amount| amount.to_string()))
        .bind(application.priority.as_str())
        .bind(application.skip_manager_stage)
        .bind(application.status.as_str())
        .bind(to_i64(application.current_stage_index, "current_stage_index")?)
        .bind(to_i64(application.version, "version")?)
        .bind(application.updated_at.to_rfc3339())
        .bind(application.submitted_at.map(|dt| dt.to_rfc3339()))
        .bind(application.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(application.id.as_str())
        .bind(to_i64(expected_version, "expected_version")?)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM application WHERE id = ?")
                    .bind(application.id.as_str())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage_error)?;
            tx.rollback().await.map_err(storage_error)?;

            return match actual {
                None => Err(RepositoryError::Missing { application_id: application.id }),
                Some(actual) => {
                    debug!(
                        application_id = %application.id,
                        expected_version,
                        actual_version = actual,
                        "compare-and-swap lost to a concurrent writer"
                    );
                    Err(RepositoryError::VersionConflict {
                        application_id: application.id,
                        expected: expected_version,
                        actual: from_i64(actual, "version")?,
                    })
                }
            };
        }

        replace_stages(&mut tx, &application).await?;
        append_history(&mut tx, &application).await?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<Application>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let rows = sqlx::query(&format!("{APPLICATION_COLUMNS} ORDER BY created_at, id"))
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_error)?;
        let stage_rows =
            sqlx::query(&format!("{STAGE_COLUMNS} ORDER BY application_id, position"))
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_error)?;
        let record_rows =
            sqlx::query(&format!("{RECORD_COLUMNS} ORDER BY application_id, sequence"))
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_error)?;
        let reassignment_rows =
            sqlx::query(&format!("{REASSIGNMENT_COLUMNS} ORDER BY application_id, sequence"))
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        let mut applications = Vec::with_capacity(rows.len());
        let mut positions = HashMap::with_capacity(rows.len());
        for row in &rows {
            let application = row_to_application(row)?;
            positions.insert(application.id.0.clone(), applications.len());
            applications.push(application);
        }

        for row in &stage_rows {
            let (application_id, stage) = row_to_stage(row)?;
            if let Some(&index) = positions.get(&application_id) {
                applications[index].effective_stages.push(stage);
            }
        }
        for row in &record_rows {
            let (application_id, record) = row_to_record(row)?;
            if let Some(&index) = positions.get(&application_id) {
                applications[index].history.push(record);
            }
        }
        for row in &reassignment_rows {
            let (application_id, reassignment) = row_to_reassignment(row)?;
            if let Some(&index) = positions.get(&application_id) {
                applications[index].reassignments.push(reassignment);
            }
        }

        Ok(applications)
    }
}
