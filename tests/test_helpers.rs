// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================

#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use process_capacity_ledger::db::{init_ledger_schema, open_sqlite_connection};
use process_capacity_ledger::domain::CalendarDay;
use process_capacity_ledger::repository::WorkCalendarRepository;
use rusqlite::Connection;
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_ledger_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试数据库连接
pub fn open_test_connection(db_path: &str) -> Result<Connection, Box<dyn Error>> {
    Ok(open_sqlite_connection(db_path)?)
}

/// 日期简写
pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// 从 start 起连续 days 天
pub fn date_seq(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .map(|offset| start.checked_add_days(Days::new(offset as u64)).unwrap())
        .collect()
}

/// 写入连续工作日日历（标准工时相同）
pub fn seed_workdays(
    calendar_repo: &WorkCalendarRepository,
    start: NaiveDate,
    days: u32,
    hours: f64,
) -> Result<(), Box<dyn Error>> {
    let calendar_days: Vec<CalendarDay> = date_seq(start, days)
        .into_iter()
        .map(|calendar_date| CalendarDay {
            calendar_date,
            is_workday: true,
            standard_work_hours: Some(hours),
        })
        .collect();
    calendar_repo.upsert_batch(&calendar_days)?;
    Ok(())
}

/// 写入一条配置
pub fn insert_test_config(conn: &Connection, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}
