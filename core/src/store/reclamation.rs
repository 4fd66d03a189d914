use super::{parse_column, parse_money, ReclamationStore};
use crate::{
    error::{EngineError, EngineResult},
    reclamation::{Reclamation, ReclamationStats, ReclamationStatus, StatusBreakdown},
    types::{BookingId, ReclamationId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "SELECT id, booking_id, complainant_id, complainant_role,
        target_user_id, reclamation_type, title, description, severity, status,
        refund_amount, penalty_points, resolution_notes, created_at, updated_at,
        resolved_at
     FROM reclamation";

/// Guard shared by every write that requires a non-terminal record.
const ACTIVE_GUARD: &str = "status IN ('OPEN', 'IN_REVIEW')";

/// Raw column values; enum and decimal parsing happens outside the
/// rusqlite closure so failures surface as `EngineError`.
struct ReclamationRow {
    id:               ReclamationId,
    booking_id:       BookingId,
    complainant_id:   UserId,
    complainant_role: String,
    target_user_id:   Option<UserId>,
    reclamation_type: String,
    title:            String,
    description:      String,
    severity:         String,
    status:           String,
    refund_amount:    String,
    penalty_points:   i64,
    resolution_notes: Option<String>,
    created_at:       DateTime<Utc>,
    updated_at:       DateTime<Utc>,
    resolved_at:      Option<DateTime<Utc>>,
}

impl ReclamationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id:               row.get(0)?,
            booking_id:       row.get(1)?,
            complainant_id:   row.get(2)?,
            complainant_role: row.get(3)?,
            target_user_id:   row.get(4)?,
            reclamation_type: row.get(5)?,
            title:            row.get(6)?,
            description:      row.get(7)?,
            severity:         row.get(8)?,
            status:           row.get(9)?,
            refund_amount:    row.get(10)?,
            penalty_points:   row.get(11)?,
            resolution_notes: row.get(12)?,
            created_at:       row.get(13)?,
            updated_at:       row.get(14)?,
            resolved_at:      row.get(15)?,
        })
    }

    fn into_reclamation(self) -> EngineResult<Reclamation> {
        Ok(Reclamation {
            id:               self.id,
            booking_id:       self.booking_id,
            complainant_id:   self.complainant_id,
            complainant_role: parse_column(&self.complainant_role)?,
            target_user_id:   self.target_user_id,
            reclamation_type: parse_column(&self.reclamation_type)?,
            title:            self.title,
            description:      self.description,
            severity:         parse_column(&self.severity)?,
            status:           parse_column(&self.status)?,
            refund_amount:    parse_money("refund_amount", &self.refund_amount)?,
            penalty_points:   u32::try_from(self.penalty_points).unwrap_or(0),
            resolution_notes: self.resolution_notes,
            created_at:       self.created_at,
            updated_at:       self.updated_at,
            resolved_at:      self.resolved_at,
        })
    }
}

impl ReclamationStore {
    /// Insert a new record and return its assigned id.
    pub fn insert_reclamation(&self, r: &Reclamation) -> EngineResult<ReclamationId> {
        self.conn.execute(
            "INSERT INTO reclamation (
                booking_id, complainant_id, complainant_role, target_user_id,
                reclamation_type, title, description, severity, status,
                refund_amount, penalty_points, resolution_notes,
                created_at, updated_at, resolved_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                r.booking_id,
                r.complainant_id,
                r.complainant_role.as_str(),
                r.target_user_id,
                r.reclamation_type.as_str(),
                r.title,
                r.description,
                r.severity.as_str(),
                r.status.as_str(),
                r.refund_amount.to_string(),
                r.penalty_points,
                r.resolution_notes,
                r.created_at,
                r.updated_at,
                r.resolved_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_reclamation(&self, id: ReclamationId) -> EngineResult<Option<Reclamation>> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                ReclamationRow::from_row,
            )
            .optional()?;
        row.map(ReclamationRow::into_reclamation).transpose()
    }

    pub fn require_reclamation(&self, id: ReclamationId) -> EngineResult<Reclamation> {
        self.get_reclamation(id)?
            .ok_or(EngineError::ReclamationNotFound { id })
    }

    /// Persist filer/adjudicator edits of a non-terminal record.
    /// Fails with Conflict if the row went terminal in the meantime.
    pub fn update_active(&self, r: &Reclamation) -> EngineResult<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE reclamation
                 SET title = ?2, description = ?3, severity = ?4, status = ?5,
                     target_user_id = ?6, updated_at = ?7
                 WHERE id = ?1 AND {ACTIVE_GUARD}"
            ),
            params![
                r.id,
                r.title,
                r.description,
                r.severity.as_str(),
                r.status.as_str(),
                r.target_user_id,
                r.updated_at,
            ],
        )?;
        self.expect_one_row(r.id, changed, "update")
    }

    /// Compare-and-set into a terminal state. Exactly one caller can win
    /// for a given id; every other caller gets Conflict. The severity the
    /// verdict was priced from must still be the stored one.
    pub fn finalize_reclamation(&self, r: &Reclamation) -> EngineResult<()> {
        if !r.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "finalize called with non-terminal status {}",
                r.status
            )));
        }
        let changed = self.conn.execute(
            &format!(
                "UPDATE reclamation
                 SET status = ?2, refund_amount = ?3, penalty_points = ?4,
                     resolution_notes = ?5, target_user_id = ?6, updated_at = ?7,
                     resolved_at = COALESCE(resolved_at, ?8)
                 WHERE id = ?1 AND severity = ?9 AND {ACTIVE_GUARD}"
            ),
            params![
                r.id,
                r.status.as_str(),
                r.refund_amount.to_string(),
                r.penalty_points,
                r.resolution_notes,
                r.target_user_id,
                r.updated_at,
                r.resolved_at,
                r.severity.as_str(),
            ],
        )?;
        self.expect_one_row(r.id, changed, "resolve")
    }

    /// Remove a non-terminal record.
    pub fn delete_active(&self, id: ReclamationId) -> EngineResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM reclamation WHERE id = ?1 AND {ACTIVE_GUARD}"),
            params![id],
        )?;
        self.expect_one_row(id, changed, "delete")
    }

    fn expect_one_row(&self, id: ReclamationId, changed: usize, action: &str) -> EngineResult<()> {
        if changed == 1 {
            return Ok(());
        }
        match self.get_reclamation(id)? {
            None => Err(EngineError::ReclamationNotFound { id }),
            Some(current) if current.status.is_terminal() => Err(EngineError::Conflict(format!(
                "cannot {action} reclamation {id} with status {}",
                current.status
            ))),
            Some(current) => Err(EngineError::Conflict(format!(
                "reclamation {id} changed during {action} (severity now {}); retry",
                current.severity
            ))),
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn list_reclamations(&self) -> EngineResult<Vec<Reclamation>> {
        self.query_reclamations(&format!("{SELECT_COLUMNS} ORDER BY id ASC"), [])
    }

    pub fn reclamations_by_status(
        &self,
        status: ReclamationStatus,
    ) -> EngineResult<Vec<Reclamation>> {
        self.query_reclamations(
            &format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id ASC"),
            params![status.as_str()],
        )
    }

    pub fn reclamations_by_complainant(&self, user_id: UserId) -> EngineResult<Vec<Reclamation>> {
        self.query_reclamations(
            &format!("{SELECT_COLUMNS} WHERE complainant_id = ?1 ORDER BY id ASC"),
            params![user_id],
        )
    }

    pub fn reclamations_by_target(&self, user_id: UserId) -> EngineResult<Vec<Reclamation>> {
        self.query_reclamations(
            &format!("{SELECT_COLUMNS} WHERE target_user_id = ?1 ORDER BY id ASC"),
            params![user_id],
        )
    }

    /// Oldest reclamation a user filed on a booking.
    pub fn first_by_booking_and_complainant(
        &self,
        booking_id: BookingId,
        complainant_id: UserId,
    ) -> EngineResult<Option<Reclamation>> {
        let mut found = self.query_reclamations(
            &format!(
                "{SELECT_COLUMNS} WHERE booking_id = ?1 AND complainant_id = ?2
                 ORDER BY id ASC LIMIT 1"
            ),
            params![booking_id, complainant_id],
        )?;
        Ok(found.pop())
    }

    fn query_reclamations(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> EngineResult<Vec<Reclamation>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, ReclamationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReclamationRow::into_reclamation).collect()
    }

    // ── Statistics ─────────────────────────────────────────────

    pub fn stats_for_user(&self, user_id: UserId) -> EngineResult<ReclamationStats> {
        let (total_filed, pending_filed, resolved_filed) = self.conn.query_row(
            &format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN {ACTIVE_GUARD} THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = 'RESOLVED' THEN 1 ELSE 0 END), 0)
                 FROM reclamation WHERE complainant_id = ?1"
            ),
            params![user_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )?;
        let total_received: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reclamation WHERE target_user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(ReclamationStats {
            user_id,
            total_filed:    total_filed as u64,
            total_received: total_received as u64,
            pending_filed:  pending_filed as u64,
            resolved_filed: resolved_filed as u64,
        })
    }

    pub fn status_breakdown(&self) -> EngineResult<StatusBreakdown> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM reclamation GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut breakdown = StatusBreakdown::default();
        for (status, count) in counts {
            let count = count as u64;
            breakdown.total += count;
            match parse_column::<ReclamationStatus>(&status)? {
                ReclamationStatus::Open => breakdown.open = count,
                ReclamationStatus::InReview => breakdown.in_review = count,
                ReclamationStatus::Resolved => breakdown.resolved = count,
                ReclamationStatus::Rejected => breakdown.rejected = count,
            }
        }
        Ok(breakdown)
    }
}
