// ==========================================
// 工序产能台账 - 工作日历数据仓储
// ==========================================
// 职责: 管理 work_calendar 表, 并作为默认 CalendarProvider
// ==========================================

use crate::db::{date_from_row, date_to_sql, open_sqlite_connection, LedgerStore};
use crate::domain::calendar::{CalendarDay, CalendarProvider};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

fn map_calendar_day(row: &rusqlite::Row<'_>) -> SqliteResult<CalendarDay> {
    Ok(CalendarDay {
        calendar_date: date_from_row(row, 0)?,
        is_workday: row.get::<_, i64>(1)? != 0,
        standard_work_hours: row.get(2)?,
    })
}

pub struct WorkCalendarRepository {
    conn: LedgerStore,
}

impl WorkCalendarRepository {
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

    /// 插入或更新单个日历日
    pub fn upsert(&self, day: &CalendarDay) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::upsert_tx(&conn, day)
    }

    /// 批量插入或更新日历日（单事务）
    pub fn upsert_batch(&self, days: &[CalendarDay]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        for day in days {
            Self::upsert_tx(&tx, day)?;
        }
        tx.commit()?;
        Ok(days.len())
    }

    fn upsert_tx(conn: &Connection, day: &CalendarDay) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO work_calendar (calendar_date, is_workday, standard_work_hours, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(calendar_date) DO UPDATE SET
                is_workday = excluded.is_workday,
                standard_work_hours = excluded.standard_work_hours,
                updated_at = excluded.updated_at
            "#,
            params![
                date_to_sql(day.calendar_date),
                day.is_workday as i64,
                day.standard_work_hours,
            ],
        )?;
        Ok(())
    }

    /// 按日期查询
    pub fn find_by_date(&self, date: NaiveDate) -> RepositoryResult<Option<CalendarDay>> {
        let conn = self.get_conn()?;
        let day = conn
            .query_row(
                r#"
                SELECT calendar_date, is_workday, standard_work_hours
                FROM work_calendar
                WHERE calendar_date = ?1
                "#,
                params![date_to_sql(date)],
                map_calendar_day,
            )
            .optional()?;
        Ok(day)
    }

    /// 按日期范围查询（含两端）
    pub fn find_by_date_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<CalendarDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT calendar_date, is_workday, standard_work_hours
            FROM work_calendar
            WHERE calendar_date BETWEEN ?1 AND ?2
            ORDER BY calendar_date
            "#,
        )?;
        let days = stmt
            .query_map(
                params![date_to_sql(start_date), date_to_sql(end_date)],
                map_calendar_day,
            )?
            .collect::<SqliteResult<Vec<CalendarDay>>>()?;
        Ok(days)
    }
}

impl CalendarProvider for WorkCalendarRepository {
    fn get_shift_hours(&self, date: NaiveDate) -> RepositoryResult<Option<CalendarDay>> {
        self.find_by_date(date)
    }

    fn get_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> RepositoryResult<Vec<CalendarDay>> {
        self.find_by_date_range(start_date, end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_repo() -> WorkCalendarRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_ledger_schema(&conn).unwrap();
        WorkCalendarRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_provider_maps_rest_day_to_none() {
        let repo = setup_repo();
        let sat = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        let mon = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        repo.upsert_batch(&[
            CalendarDay { calendar_date: sat, is_workday: false, standard_work_hours: Some(8.0) },
            CalendarDay { calendar_date: mon, is_workday: true, standard_work_hours: Some(8.0) },
        ])
        .unwrap();

        assert_eq!(repo.shift_hours_for(sat).unwrap(), None);
        assert_eq!(repo.shift_hours_for(mon).unwrap(), Some(8.0));
        assert_eq!(
            repo.shift_hours_for(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()).unwrap(),
            None
        );
    }

    #[test]
    fn test_upsert_overwrites_existing_day() {
        let repo = setup_repo();
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        repo.upsert(&CalendarDay { calendar_date: date, is_workday: true, standard_work_hours: Some(8.0) })
            .unwrap();
        repo.upsert(&CalendarDay { calendar_date: date, is_workday: true, standard_work_hours: Some(10.0) })
            .unwrap();
        let found = repo.find_by_date(date).unwrap().unwrap();
        assert_eq!(found.standard_work_hours, Some(10.0));
        assert_eq!(repo.find_by_date_range(date, date).unwrap().len(), 1);
    }
}
