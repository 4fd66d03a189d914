use super::{parse_money, ReclamationStore};
use crate::{
    directory::PoolSource,
    error::{EngineError, EngineResult},
    fund_distribution::Party,
    settlement::SettlementRecord,
    types::ReclamationId,
};
use rusqlite::params;

const SELECT_COLUMNS: &str = "SELECT id, plan_id, seq, reclamation_id, booking_id, party,
        recipient, amount, pool, tx_id, error, created_at
     FROM settlement_ledger";

fn parse_party(text: &str) -> EngineResult<Party> {
    match text {
        "GUEST" => Ok(Party::Guest),
        "HOST" => Ok(Party::Host),
        "PLATFORM" => Ok(Party::Platform),
        other => Err(EngineError::Validation(format!("unknown Party value '{other}'"))),
    }
}

fn parse_pool(text: &str) -> EngineResult<PoolSource> {
    match text {
        "RENT" => Ok(PoolSource::Rent),
        "DEPOSIT" => Ok(PoolSource::Deposit),
        other => Err(EngineError::Validation(format!("unknown PoolSource value '{other}'"))),
    }
}

impl ReclamationStore {
    pub fn insert_settlement(&self, record: &SettlementRecord) -> EngineResult<i64> {
        self.conn.execute(
            "INSERT INTO settlement_ledger
             (plan_id, seq, reclamation_id, booking_id, party, recipient,
              amount, pool, tx_id, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.plan_id,
                record.seq,
                record.reclamation_id,
                record.booking_id,
                record.party.as_str(),
                record.recipient,
                record.amount.to_string(),
                record.pool.as_str(),
                record.tx_id,
                record.error,
                record.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn settlements_for(&self, reclamation_id: ReclamationId) -> EngineResult<Vec<SettlementRecord>> {
        self.query_settlements(
            &format!("{SELECT_COLUMNS} WHERE reclamation_id = ?1 ORDER BY id ASC"),
            params![reclamation_id],
        )
    }

    /// Ledger rows whose transfer never went through. These are the
    /// out-of-band reconciliation queue.
    pub fn failed_settlements(&self) -> EngineResult<Vec<SettlementRecord>> {
        self.query_settlements(
            &format!("{SELECT_COLUMNS} WHERE tx_id IS NULL OR error IS NOT NULL ORDER BY id ASC"),
            [],
        )
    }

    fn query_settlements(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> EngineResult<Vec<SettlementRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, chrono::DateTime<chrono::Utc>>(11)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, plan_id, seq, reclamation_id, booking_id, party, recipient, amount, pool, tx_id, error, created_at)| {
                    Ok(SettlementRecord {
                        id: Some(id),
                        plan_id,
                        seq,
                        reclamation_id,
                        booking_id,
                        party: parse_party(&party)?,
                        recipient,
                        amount: parse_money("amount", &amount)?,
                        pool: parse_pool(&pool)?,
                        tx_id,
                        error,
                        created_at,
                    })
                },
            )
            .collect()
    }
}
