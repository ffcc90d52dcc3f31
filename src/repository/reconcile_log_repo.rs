// ==========================================
// 工序产能台账 - 全量对账运行日志仓储
// ==========================================
// 职责: capacity_reconcile_log 表（审计用, 每次全量对账一行）
// ==========================================

use crate::db::LedgerStore;
use crate::domain::types::ReconcileAllSummary;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// 对账运行日志实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileLogEntity {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub summary: ReconcileAllSummary,
}

pub struct ReconcileLogRepository {
    conn: LedgerStore,
}

impl ReconcileLogRepository {
    pub fn from_connection(conn: LedgerStore) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert_tx(
        conn: &Connection,
        started_at: &str,
        finished_at: &str,
        summary: &ReconcileAllSummary,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO capacity_reconcile_log (
                run_id, started_at, finished_at, scanned, updated, failed, net_hours_released
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                summary.run_id,
                started_at,
                finished_at,
                summary.scanned as i64,
                summary.updated as i64,
                summary.failed as i64,
                summary.net_hours_released,
            ],
        )?;
        Ok(())
    }

    /// 最近一次对账记录
    pub fn find_latest(&self) -> RepositoryResult<Option<ReconcileLogEntity>> {
        let conn = self.get_conn()?;
        let entity = conn
            .query_row(
                r#"
                SELECT run_id, started_at, finished_at, scanned, updated, failed, net_hours_released
                FROM capacity_reconcile_log
                ORDER BY finished_at DESC, rowid DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    let run_id: String = row.get(0)?;
                    Ok(ReconcileLogEntity {
                        run_id: run_id.clone(),
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        summary: ReconcileAllSummary {
                            run_id,
                            scanned: row.get::<_, i64>(3)? as usize,
                            updated: row.get::<_, i64>(4)? as usize,
                            failed: row.get::<_, i64>(5)? as usize,
                            net_hours_released: row.get(6)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(entity)
    }
}
