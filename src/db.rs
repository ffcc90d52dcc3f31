// ==========================================
// 工序产能台账 - SQLite 连接与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 显式 open / close 生命周期, 存储句柄逐层传入, 不依赖进程级全局初始化
// ==========================================

use crate::domain::commitment::CommitmentSource;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 日期存储格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 共享存储句柄
pub type LedgerStore = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化台账 schema（幂等）
pub fn init_ledger_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS capacity_day (
            process_name TEXT NOT NULL,
            plan_date TEXT NOT NULL,
            available_workstations INTEGER NOT NULL DEFAULT 0
                CHECK (available_workstations >= 0),
            shift_hours REAL,
            occupied_hours REAL NOT NULL DEFAULT 0
                CHECK (occupied_hours >= 0),
            remaining_hours REAL NOT NULL DEFAULT 0,
            remaining_shift REAL,
            overtime_shift REAL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (process_name, plan_date)
        );

        CREATE INDEX IF NOT EXISTS idx_capacity_day_date
            ON capacity_day(plan_date);

        CREATE TABLE IF NOT EXISTS work_calendar (
            calendar_date TEXT PRIMARY KEY,
            is_workday INTEGER NOT NULL,
            standard_work_hours REAL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS capacity_reconcile_log (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            scanned INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            net_hours_released REAL NOT NULL
        );
        "#,
    )?;

    for source in CommitmentSource::ALL {
        let table = source.table_name();
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                commitment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                process_name TEXT NOT NULL,
                plan_date TEXT NOT NULL,
                committed_hours REAL NOT NULL CHECK (committed_hours >= 0),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_key
                ON {table}(process_name, plan_date);
            "#
        ))?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 打开台账存储: 连接 + PRAGMA + schema + SQL 统计
pub fn open_ledger_store(db_path: &str) -> RepositoryResult<LedgerStore> {
    let mut conn = open_sqlite_connection(db_path)
        .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
    init_ledger_schema(&conn)?;
    crate::perf::install_sqlite_tracing(&mut conn);

    match read_schema_version(&conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                db_version = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序"
            );
        }
        _ => {}
    }

    Ok(Arc::new(Mutex::new(conn)))
}

/// 关闭台账存储
///
/// 所有组件持有的句柄都释放后才能关闭
pub fn close_ledger_store(store: LedgerStore) -> RepositoryResult<()> {
    let mutex = Arc::try_unwrap(store).map_err(|_| {
        RepositoryError::DatabaseConnectionError("存储句柄仍被其他组件持有".to_string())
    })?;
    let conn = mutex
        .into_inner()
        .map_err(|e| RepositoryError::LockError(e.to_string()))?;
    conn.close()
        .map_err(|(_, e)| RepositoryError::DatabaseConnectionError(e.to_string()))
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 日期 → 存储文本
pub fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 行内日期列解析（失败时返回列转换错误, 不做静默回退）
pub fn date_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
