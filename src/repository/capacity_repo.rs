// ==========================================
// 工序产能台账 - 产能日数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（派生字段统一按 derive_remaining 的公式写入）
// 约定: `*_tx` 关联函数接收 &Connection, 供引擎在事务/保存点内调用
// ==========================================

use crate::db::{date_from_row, date_to_sql, open_sqlite_connection, LedgerStore};
use crate::domain::capacity::{derive_remaining, CapacityDay};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    process_name, plan_date, available_workstations, shift_hours,
    occupied_hours, remaining_hours, remaining_shift, overtime_shift
"#;

fn map_capacity_day(row: &rusqlite::Row<'_>) -> SqliteResult<CapacityDay> {
    Ok(CapacityDay {
        process_name: row.get(0)?,
        plan_date: date_from_row(row, 1)?,
        available_workstations: row.get(2)?,
        shift_hours: row.get(3)?,
        occupied_hours: row.get(4)?,
        remaining_hours: row.get(5)?,
        remaining_shift: row.get(6)?,
        overtime_shift: row.get(7)?,
    })
}

// ==========================================
// CapacityDayRepository - 产能日仓储
// ==========================================

/// 产能日仓储
/// 职责: 管理 capacity_day 表的读写
pub struct CapacityDayRepository {
    conn: LedgerStore,
}

impl CapacityDayRepository {
    /// 创建新的产能日仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: LedgerStore) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 读取（每次均为新读, 无缓存）
    // ==========================================

    /// 按工序和日期查询单个产能日
    ///
    /// # 返回
    /// - Ok(Some(CapacityDay)): 找到
    /// - Ok(None): 未找到
    pub fn find_by_key(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Option<CapacityDay>> {
        let conn = self.get_conn()?;
        Self::find_by_key_tx(&conn, process_name, plan_date)
    }

    /// 按工序和日期范围查询（含两端, 按日期升序）
    pub fn find_by_date_range(
        &self,
        process_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<Vec<CapacityDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM capacity_day
            WHERE process_name = ?1
              AND plan_date BETWEEN ?2 AND ?3
            ORDER BY plan_date
            "#
        ))?;

        let days = stmt
            .query_map(
                params![process_name, date_to_sql(start_date), date_to_sql(end_date)],
                map_capacity_day,
            )?
            .collect::<SqliteResult<Vec<CapacityDay>>>()?;
        Ok(days)
    }

    /// 查询某工序全部产能日（按日期升序）
    pub fn find_by_process(&self, process_name: &str) -> RepositoryResult<Vec<CapacityDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM capacity_day WHERE process_name = ?1 ORDER BY plan_date"
        ))?;
        let days = stmt
            .query_map(params![process_name], map_capacity_day)?
            .collect::<SqliteResult<Vec<CapacityDay>>>()?;
        Ok(days)
    }

    /// 查询所有工序的指定日期产能日
    pub fn find_all_processes_by_date(
        &self,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Vec<CapacityDay>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM capacity_day WHERE plan_date = ?1 ORDER BY process_name"
        ))?;
        let days = stmt
            .query_map(params![date_to_sql(plan_date)], map_capacity_day)?
            .collect::<SqliteResult<Vec<CapacityDay>>>()?;
        Ok(days)
    }

    /// 全表读取（按工序、日期排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<CapacityDay>> {
        let conn = self.get_conn()?;
        Self::list_all_tx(&conn)
    }

    /// 截止日(含)之前、剩余工时 >= min_slack 的最大日期
    pub fn find_latest_date_with_slack(
        &self,
        process_name: &str,
        deadline: NaiveDate,
        min_slack: f64,
    ) -> RepositoryResult<Option<NaiveDate>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn.query_row(
            r#"
            SELECT MAX(plan_date)
            FROM capacity_day
            WHERE process_name = ?1
              AND plan_date <= ?2
              AND remaining_hours >= ?3
            "#,
            params![process_name, date_to_sql(deadline), min_slack],
            |row| row.get(0),
        )?;
        raw.map(|s| parse_plan_date(&s)).transpose()
    }

    /// 完工日(含)之前、剩余工时 >= min_slack 的 (日期, 剩余工时), 按日期降序
    pub fn find_slack_days_desc(
        &self,
        process_name: &str,
        finish_date: NaiveDate,
        min_slack: f64,
    ) -> RepositoryResult<Vec<(NaiveDate, f64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT plan_date, remaining_hours
            FROM capacity_day
            WHERE process_name = ?1
              AND plan_date <= ?2
              AND remaining_hours >= ?3
            ORDER BY plan_date DESC
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![process_name, date_to_sql(finish_date), min_slack],
                |row| Ok((date_from_row(row, 0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<SqliteResult<Vec<(NaiveDate, f64)>>>()?;
        Ok(rows)
    }

    /// (after, upto] 区间内剩余工时严格大于 min_slack 的最小日期
    pub fn find_next_date_above_slack(
        &self,
        process_name: &str,
        after: NaiveDate,
        upto: NaiveDate,
        min_slack: f64,
    ) -> RepositoryResult<Option<NaiveDate>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn.query_row(
            r#"
            SELECT MIN(plan_date)
            FROM capacity_day
            WHERE process_name = ?1
              AND plan_date > ?2
              AND plan_date <= ?3
              AND remaining_hours > ?4
            "#,
            params![process_name, date_to_sql(after), date_to_sql(upto), min_slack],
            |row| row.get(0),
        )?;
        raw.map(|s| parse_plan_date(&s)).transpose()
    }

    // ==========================================
    // 事务内读写（调用方负责事务边界）
    // ==========================================

    pub fn find_by_key_tx(
        conn: &Connection,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<Option<CapacityDay>> {
        let day = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM capacity_day WHERE process_name = ?1 AND plan_date = ?2"
                ),
                params![process_name, date_to_sql(plan_date)],
                map_capacity_day,
            )
            .optional()?;
        Ok(day)
    }

    pub fn list_all_tx(conn: &Connection) -> RepositoryResult<Vec<CapacityDay>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM capacity_day ORDER BY process_name, plan_date"
        ))?;
        let days = stmt
            .query_map([], map_capacity_day)?
            .collect::<SqliteResult<Vec<CapacityDay>>>()?;
        Ok(days)
    }

    /// 读取全部主键的原始文本（不解析日期, 坏行留给逐行处理时报错）
    pub fn list_raw_keys_tx(conn: &Connection) -> RepositoryResult<Vec<(String, String)>> {
        let mut stmt =
            conn.prepare("SELECT process_name, plan_date FROM capacity_day ORDER BY process_name, plan_date")?;
        let keys = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<Vec<(String, String)>>>()?;
        Ok(keys)
    }

    /// 读取全部不重复日期
    pub fn list_distinct_dates_tx(conn: &Connection) -> RepositoryResult<Vec<NaiveDate>> {
        let mut stmt = conn.prepare("SELECT DISTINCT plan_date FROM capacity_day ORDER BY plan_date")?;
        let dates = stmt
            .query_map([], |row| date_from_row(row, 0))?
            .collect::<SqliteResult<Vec<NaiveDate>>>()?;
        Ok(dates)
    }

    /// 台账生成用插入或更新
    ///
    /// # 说明
    /// - 不存在: 按传入行插入, 派生字段由传入的工位数/班次/占用重算
    /// - 已存在: 只更新工位数/班次, 派生字段在 SQL 内按库中 occupied_hours 重算,
    ///   不覆盖 occupied_hours 与 overtime_shift
    ///
    /// # 返回
    /// - true: 新插入
    /// - false: 已存在, 已更新
    pub fn upsert_horizon_row_tx(conn: &Connection, day: &CapacityDay) -> RepositoryResult<bool> {
        let (remaining_hours, remaining_shift) =
            derive_remaining(day.available_workstations, day.shift_hours, day.occupied_hours);
        let inserted = conn.execute(
            r#"
            INSERT INTO capacity_day (
                process_name, plan_date, available_workstations, shift_hours,
                occupied_hours, remaining_hours, remaining_shift, overtime_shift, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            ON CONFLICT(process_name, plan_date) DO NOTHING
            "#,
            params![
                day.process_name,
                date_to_sql(day.plan_date),
                day.available_workstations,
                day.shift_hours,
                day.occupied_hours,
                remaining_hours,
                remaining_shift,
                day.overtime_shift,
            ],
        )?;
        if inserted > 0 {
            return Ok(true);
        }

        conn.execute(
            r#"
            UPDATE capacity_day SET
                available_workstations = ?3,
                shift_hours = ?4,
                remaining_hours = ?3 * COALESCE(?4, 0.0) - occupied_hours,
                remaining_shift = CASE
                    WHEN ?3 > 0 THEN (?3 * COALESCE(?4, 0.0) - occupied_hours) / ?3
                    ELSE NULL
                END,
                updated_at = datetime('now')
            WHERE process_name = ?1 AND plan_date = ?2
            "#,
            params![
                day.process_name,
                date_to_sql(day.plan_date),
                day.available_workstations,
                day.shift_hours,
            ],
        )?;
        Ok(false)
    }

    /// 写回占用工时及派生字段
    pub fn update_occupied_tx(conn: &Connection, day: &CapacityDay) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE capacity_day
            SET occupied_hours = ?3,
                remaining_hours = ?4,
                remaining_shift = ?5,
                updated_at = datetime('now')
            WHERE process_name = ?1 AND plan_date = ?2
            "#,
            params![
                day.process_name,
                date_to_sql(day.plan_date),
                day.occupied_hours,
                day.remaining_hours,
                day.remaining_shift,
            ],
        )?;
        Ok(affected)
    }

    /// 写回班次工时及派生字段
    pub fn update_shift_tx(conn: &Connection, day: &CapacityDay) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE capacity_day
            SET shift_hours = ?3,
                remaining_hours = ?4,
                remaining_shift = ?5,
                updated_at = datetime('now')
            WHERE process_name = ?1 AND plan_date = ?2
            "#,
            params![
                day.process_name,
                date_to_sql(day.plan_date),
                day.shift_hours,
                day.remaining_hours,
                day.remaining_shift,
            ],
        )?;
        Ok(affected)
    }

    /// 仅写回派生字段
    pub fn update_derived_tx(conn: &Connection, day: &CapacityDay) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE capacity_day
            SET remaining_hours = ?3,
                remaining_shift = ?4,
                updated_at = datetime('now')
            WHERE process_name = ?1 AND plan_date = ?2
            "#,
            params![
                day.process_name,
                date_to_sql(day.plan_date),
                day.remaining_hours,
                day.remaining_shift,
            ],
        )?;
        Ok(affected)
    }

    /// 设置加班班次
    pub fn update_overtime_tx(
        conn: &Connection,
        process_name: &str,
        plan_date: NaiveDate,
        overtime_shift: Option<f64>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE capacity_day
            SET overtime_shift = ?3, updated_at = datetime('now')
            WHERE process_name = ?1 AND plan_date = ?2
            "#,
            params![process_name, date_to_sql(plan_date), overtime_shift],
        )?;
        Ok(affected)
    }

    /// 删除 cutoff 之前的产能日
    pub fn delete_before_tx(conn: &Connection, cutoff: NaiveDate) -> RepositoryResult<usize> {
        let affected = conn.execute(
            "DELETE FROM capacity_day WHERE plan_date < ?1",
            params![date_to_sql(cutoff)],
        )?;
        Ok(affected)
    }
}

/// 解析台账日期文本
pub fn parse_plan_date(raw: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, crate::db::DATE_FORMAT).map_err(|e| {
        RepositoryError::FieldValueError {
            field: "plan_date".to_string(),
            message: format!("{} ({})", e, raw),
        }
    })
}
