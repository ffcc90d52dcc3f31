// ==========================================
// 工序产能台账 - 工序计划占用数据仓储
// ==========================================
// 职责: 各来源工序计划表的读写与工时汇总
// 说明: 表名来自 CommitmentSource::table_name（静态白名单）, 不接受外部拼接
// ==========================================

use crate::db::{date_from_row, date_to_sql, open_sqlite_connection, LedgerStore};
use crate::domain::commitment::{Commitment, CommitmentSource};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl CommitmentSource {
    /// 该来源在 (工序, 日期) 上的承诺工时合计
    pub fn sum_committed_hours(
        &self,
        conn: &Connection,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<f64> {
        let total: f64 = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(committed_hours), 0) FROM {} WHERE process_name = ?1 AND plan_date = ?2",
                self.table_name()
            ),
            params![process_name, date_to_sql(plan_date)],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

/// 所有来源合计（对账口径）
pub fn sum_all_sources(
    conn: &Connection,
    process_name: &str,
    plan_date: NaiveDate,
) -> RepositoryResult<f64> {
    let mut total = 0.0;
    for source in CommitmentSource::ALL {
        total += source.sum_committed_hours(conn, process_name, plan_date)?;
    }
    Ok(total)
}

pub struct CommitmentRepository {
    conn: LedgerStore,
}

impl CommitmentRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: LedgerStore) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入占用记录, 返回自增ID
    pub fn insert_tx(
        conn: &Connection,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        committed_hours: f64,
    ) -> RepositoryResult<i64> {
        conn.execute(
            &format!(
                "INSERT INTO {} (process_name, plan_date, committed_hours, created_at) VALUES (?1, ?2, ?3, datetime('now'))",
                source.table_name()
            ),
            params![process_name, date_to_sql(plan_date), committed_hours],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 删除占用记录, 返回被删除的记录
    pub fn delete_tx(
        conn: &Connection,
        source: CommitmentSource,
        commitment_id: i64,
    ) -> RepositoryResult<Option<Commitment>> {
        let existing = Self::find_by_id_tx(conn, source, commitment_id)?;
        if existing.is_some() {
            conn.execute(
                &format!("DELETE FROM {} WHERE commitment_id = ?1", source.table_name()),
                params![commitment_id],
            )?;
        }
        Ok(existing)
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        source: CommitmentSource,
        commitment_id: i64,
    ) -> RepositoryResult<Option<Commitment>> {
        let found = conn
            .query_row(
                &format!(
                    "SELECT commitment_id, process_name, plan_date, committed_hours, created_at FROM {} WHERE commitment_id = ?1",
                    source.table_name()
                ),
                params![commitment_id],
                |row| map_commitment(row, source),
            )
            .optional()?;
        Ok(found)
    }

    /// 查询某来源在 (工序, 日期) 上的全部占用（按插入顺序）
    pub fn find_by_key(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Vec<Commitment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT commitment_id, process_name, plan_date, committed_hours, created_at
            FROM {}
            WHERE process_name = ?1 AND plan_date = ?2
            ORDER BY commitment_id
            "#,
            source.table_name()
        ))?;
        let rows = stmt
            .query_map(params![process_name, date_to_sql(plan_date)], |row| {
                map_commitment(row, source)
            })?
            .collect::<SqliteResult<Vec<Commitment>>>()?;
        Ok(rows)
    }

    /// 所有来源在 (工序, 日期) 上的承诺工时合计
    pub fn sum_all_sources(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        sum_all_sources(&conn, process_name, plan_date)
    }

    /// 单一来源中排名在 before_sequence 之前的承诺工时合计
    ///
    /// # 说明
    /// - 排名: 同 (工序, 日期) 内按 (plan_date, commitment_id) 升序, 从 1 开始
    /// - 严格小于 before_sequence; before_sequence <= 1 时结果为 0
    pub fn cumulative_committed_before(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        before_sequence: i64,
    ) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let total: f64 = conn.query_row(
            &format!(
                r#"
                SELECT COALESCE(SUM(committed_hours), 0)
                FROM (
                    SELECT committed_hours,
                           ROW_NUMBER() OVER (ORDER BY plan_date, commitment_id) AS seq
                    FROM {}
                    WHERE process_name = ?1 AND plan_date = ?2
                )
                WHERE seq < ?3
                "#,
                source.table_name()
            ),
            params![process_name, date_to_sql(plan_date), before_sequence],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn map_commitment(row: &rusqlite::Row<'_>, source: CommitmentSource) -> SqliteResult<Commitment> {
    let created_raw: String = row.get(4)?;
    let created_at = NaiveDateTime::parse_from_str(&created_raw, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Commitment {
        commitment_id: row.get(0)?,
        source,
        process_name: row.get(1)?,
        plan_date: date_from_row(row, 2)?,
        committed_hours: row.get(3)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_repo() -> (LedgerStore, CommitmentRepository) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_ledger_schema(&conn).unwrap();
        let store = Arc::new(Mutex::new(conn));
        (store.clone(), CommitmentRepository::from_connection(store))
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_sum_spans_all_sources() {
        let (store, repo) = setup_repo();
        {
            let conn = store.lock().unwrap();
            CommitmentRepository::insert_tx(&conn, CommitmentSource::SalesOrder, "P", d(1), 2.0).unwrap();
            CommitmentRepository::insert_tx(&conn, CommitmentSource::Rework, "P", d(1), 1.5).unwrap();
            CommitmentRepository::insert_tx(&conn, CommitmentSource::StockUp, "P", d(2), 4.0).unwrap();
            CommitmentRepository::insert_tx(&conn, CommitmentSource::TrialProduction, "Q", d(1), 9.0).unwrap();
        }
        assert_eq!(repo.sum_all_sources("P", d(1)).unwrap(), 3.5);
        assert_eq!(repo.sum_all_sources("P", d(3)).unwrap(), 0.0);
    }

    #[test]
    fn test_cumulative_before_uses_insertion_rank() {
        let (store, repo) = setup_repo();
        {
            let conn = store.lock().unwrap();
            for hours in [1.0, 2.0, 4.0] {
                CommitmentRepository::insert_tx(&conn, CommitmentSource::SalesOrder, "P", d(5), hours)
                    .unwrap();
            }
            // 其他日期/来源不计入
            CommitmentRepository::insert_tx(&conn, CommitmentSource::SalesOrder, "P", d(6), 100.0).unwrap();
            CommitmentRepository::insert_tx(&conn, CommitmentSource::Rework, "P", d(5), 100.0).unwrap();
        }
        let src = CommitmentSource::SalesOrder;
        assert_eq!(repo.cumulative_committed_before(src, "P", d(5), 1).unwrap(), 0.0);
        assert_eq!(repo.cumulative_committed_before(src, "P", d(5), 2).unwrap(), 1.0);
        assert_eq!(repo.cumulative_committed_before(src, "P", d(5), 3).unwrap(), 3.0);
        assert_eq!(repo.cumulative_committed_before(src, "P", d(5), 99).unwrap(), 7.0);
    }

    #[test]
    fn test_delete_returns_removed_row() {
        let (store, repo) = setup_repo();
        let conn = store.lock().unwrap();
        let id = CommitmentRepository::insert_tx(&conn, CommitmentSource::StockUp, "P", d(1), 3.0).unwrap();
        let removed = CommitmentRepository::delete_tx(&conn, CommitmentSource::StockUp, id)
            .unwrap()
            .unwrap();
        assert_eq!(removed.committed_hours, 3.0);
        assert!(CommitmentRepository::delete_tx(&conn, CommitmentSource::StockUp, id)
            .unwrap()
            .is_none());
        drop(conn);
        assert!(repo.find_by_key(CommitmentSource::StockUp, "P", d(1)).unwrap().is_empty());
    }
}
