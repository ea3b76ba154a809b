//! Change request database layer
//!
//! PostgreSQL persistence for maker-checker records. The payload is stored as
//! JSON text; every terminal write is a conditional update on the PENDING
//! flags.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;

use super::error::ApprovalError;
use super::payload::ChangePayload;
use super::state::ApprovalState;
use super::store::ChangeRequestStore;
use super::types::{
    ApprovalCommit, ChangeDomain, ChangeRequest, ChangeRequestId, CheckerDecision, Decision,
    ListQuery, NewChangeRequest, Verdict,
};
use crate::db::{Database, SafeRow};

const SELECT_COLUMNS: &str = r#"
    SELECT id, domain, subject_ref, payload, maker_by, maker_at, maker_approved,
           checker_approved, checker_by, checker_at, checker_remark,
           checker_rejected, rejected_by, rejected_at, rejected_remark,
           external_ref, external_raw_response, previous_balance, sync_unconfirmed
    FROM change_requests_tb
"#;

pub struct PgChangeRequestStore {
    db: Database,
}

impl PgChangeRequestStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn row_to_record(row: &PgRow) -> Result<ChangeRequest, ApprovalError> {
        let id: i64 = row.get_logged("id")?;
        let domain_id: i16 = row.get_logged("domain")?;
        let domain = ChangeDomain::from_id(domain_id)
            .ok_or_else(|| ApprovalError::Database(format!("unknown domain id {domain_id}")))?;

        let payload_text: String = row.get_logged("payload")?;
        let payload: ChangePayload = serde_json::from_str(&payload_text)?;
        if payload.domain() != domain {
            return Err(ApprovalError::Database(format!(
                "change request {id}: payload domain {} differs from column {domain}",
                payload.domain()
            )));
        }

        let approved: bool = row.get_logged("checker_approved")?;
        let rejected: bool = row.get_logged("checker_rejected")?;
        let state = ApprovalState::from_flags(approved, rejected).ok_or_else(|| {
            ApprovalError::Database(format!("change request {id} is both approved and rejected"))
        })?;

        let checker = match state {
            ApprovalState::Pending => None,
            ApprovalState::Approved => Some(CheckerDecision {
                verdict: Verdict::Approved,
                decision: Self::decision(row, "checker_by", "checker_at", "checker_remark")?,
            }),
            ApprovalState::Rejected => Some(CheckerDecision {
                verdict: Verdict::Rejected,
                decision: Self::decision(row, "rejected_by", "rejected_at", "rejected_remark")?,
            }),
        };

        Ok(ChangeRequest {
            id,
            subject_ref: row.get_logged("subject_ref")?,
            payload,
            maker_by: row.get_logged("maker_by")?,
            maker_at: row.get_logged("maker_at")?,
            maker_approved: row.get_logged("maker_approved")?,
            checker,
            external_ref: row.get_logged("external_ref")?,
            external_raw_response: row.get_logged("external_raw_response")?,
            previous_balance: row.get_logged("previous_balance")?,
            sync_unconfirmed: row.get_logged("sync_unconfirmed")?,
        })
    }

    fn decision(row: &PgRow, by: &str, at: &str, remark: &str) -> Result<Decision, ApprovalError> {
        let by: Option<String> = row.get_logged(by)?;
        let at: Option<DateTime<Utc>> = row.get_logged(at)?;
        let remark: Option<String> = row.get_logged(remark)?;
        Ok(Decision {
            by: by.unwrap_or_default(),
            at: at.unwrap_or_default(),
            remark: remark.unwrap_or_default(),
        })
    }

    fn rows_to_records(rows: &[PgRow]) -> Result<Vec<ChangeRequest>, ApprovalError> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl ChangeRequestStore for PgChangeRequestStore {
    async fn create(&self, request: NewChangeRequest) -> Result<ChangeRequest, ApprovalError> {
        let payload_text = serde_json::to_string(&request.payload)?;
        let approval = request.approval.as_ref();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO change_requests_tb
                (domain, subject_ref, payload, maker_by, maker_at, maker_approved,
                 checker_approved, checker_by, checker_at, checker_remark,
                 external_ref, external_raw_response, previous_balance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(request.payload.domain().id())
        .bind(request.payload.subject_ref())
        .bind(&payload_text)
        .bind(&request.maker_by)
        .bind(request.maker_at)
        .bind(request.maker_approved)
        .bind(approval.is_some())
        .bind(approval.map(|a| a.decision.by.as_str()))
        .bind(approval.map(|a| a.decision.at))
        .bind(approval.map(|a| a.decision.remark.as_str()))
        .bind(approval.map(|a| a.external_ref.as_str()).unwrap_or(""))
        .bind(approval.map(|a| a.raw_response.as_str()))
        .bind(approval.and_then(|a| a.previous_balance))
        .fetch_one(self.db.pool())
        .await?;

        self.get(id).await?.ok_or(ApprovalError::NotFound(id))
    }

    async fn get(&self, id: ChangeRequestId) -> Result<Option<ChangeRequest>, ApprovalError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_pending_for_subject(
        &self,
        domain: ChangeDomain,
        subject_ref: &str,
    ) -> Result<Option<ChangeRequest>, ApprovalError> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE domain = $1 AND subject_ref = $2
               AND NOT checker_approved AND NOT checker_rejected
             ORDER BY id DESC
             LIMIT 1"
        ))
        .bind(domain.id())
        .bind(subject_ref)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn approve_if_pending(
        &self,
        id: ChangeRequestId,
        commit: &ApprovalCommit,
    ) -> Result<bool, ApprovalError> {
        let result = sqlx::query(
            r#"
            UPDATE change_requests_tb
            SET checker_approved = TRUE,
                checker_by = $2, checker_at = $3, checker_remark = $4,
                external_ref = $5, external_raw_response = $6,
                previous_balance = $7
            WHERE id = $1 AND NOT checker_approved AND NOT checker_rejected
            "#,
        )
        .bind(id)
        .bind(&commit.decision.by)
        .bind(commit.decision.at)
        .bind(&commit.decision.remark)
        .bind(&commit.external_ref)
        .bind(&commit.raw_response)
        .bind(commit.previous_balance)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reject_if_pending(
        &self,
        id: ChangeRequestId,
        decision: &Decision,
    ) -> Result<bool, ApprovalError> {
        let result = sqlx::query(
            r#"
            UPDATE change_requests_tb
            SET checker_rejected = TRUE,
                rejected_by = $2, rejected_at = $3, rejected_remark = $4
            WHERE id = $1 AND NOT checker_approved AND NOT checker_rejected
            "#,
        )
        .bind(id)
        .bind(&decision.by)
        .bind(decision.at)
        .bind(&decision.remark)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_sync_response(
        &self,
        id: ChangeRequestId,
        raw_response: &str,
        unconfirmed: bool,
    ) -> Result<(), ApprovalError> {
        sqlx::query(
            r#"
            UPDATE change_requests_tb
            SET external_raw_response = $2,
                sync_unconfirmed = sync_unconfirmed OR $3
            WHERE id = $1 AND NOT checker_approved AND NOT checker_rejected
            "#,
        )
        .bind(id)
        .bind(raw_response)
        .bind(unconfirmed)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<ChangeRequest>, ApprovalError> {
        let state_id: Option<i16> = query.state.map(|s| s.id());
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE ($1::SMALLINT IS NULL OR domain = $1)
               AND ($2::SMALLINT IS NULL
                    OR (CASE WHEN checker_approved THEN {approved}
                             WHEN checker_rejected THEN {rejected}
                             ELSE {pending} END) = $2)
             ORDER BY id DESC
             LIMIT $3 OFFSET $4",
            approved = ApprovalState::Approved.id(),
            rejected = ApprovalState::Rejected.id(),
            pending = ApprovalState::Pending.id(),
        ))
        .bind(query.domain.map(|d| d.id()))
        .bind(state_id)
        .bind(query.limit.max(0))
        .bind(query.offset.max(0))
        .fetch_all(self.db.pool())
        .await?;

        Self::rows_to_records(&rows)
    }

    async fn history(&self, subject_ref: &str) -> Result<Vec<ChangeRequest>, ApprovalError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE subject_ref = $1 ORDER BY id DESC"
        ))
        .bind(subject_ref)
        .fetch_all(self.db.pool())
        .await?;

        Self::rows_to_records(&rows)
    }
}
