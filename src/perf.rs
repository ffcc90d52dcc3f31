// ==========================================
// 工序产能台账 - SQL 性能统计
// ==========================================
// 机制: rusqlite trace/profile 回调 + 线程内计数
// 输出: 每个 API 调用一条 perf 日志（耗时 / SQL 数 / 慢 SQL 数）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 开关环境变量
pub const ENV_PERF_SQL: &str = "CAPACITY_LEDGER_PERF_SQL";
/// 慢 SQL 阈值环境变量（毫秒）
pub const ENV_SLOW_SQL_MS: &str = "CAPACITY_LEDGER_SLOW_SQL_MS";

const SLOW_SQL_LOG_MAX_CHARS: usize = 420;

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static PERF_DEPTH: Cell<u32> = const { Cell::new(0) };
    static SQL_COUNT: Cell<u64> = const { Cell::new(0) };
    static SLOW_SQL_COUNT: Cell<u64> = const { Cell::new(0) };
}

/// 由环境变量解析出的统计设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfSettings {
    pub enabled: bool,
    pub slow_sql_ms: u64,
}

impl PerfSettings {
    /// Debug 默认开启, Release 默认关闭; 环境变量优先
    pub fn from_env() -> Self {
        Self::resolve(
            std::env::var(ENV_PERF_SQL).ok().as_deref(),
            std::env::var(ENV_SLOW_SQL_MS).ok().as_deref(),
        )
    }

    fn resolve(enabled_raw: Option<&str>, slow_ms_raw: Option<&str>) -> Self {
        let enabled = match enabled_raw {
            Some(v) => is_true(v),
            None => cfg!(debug_assertions),
        };
        let slow_sql_ms = slow_ms_raw
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
        Self {
            enabled,
            slow_sql_ms,
        }
    }
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// 单行化并按字符截断（不会切断多字节字符）
fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let s = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &s[..byte_idx]),
        None => s,
    }
}

/// 在连接上安装 SQL 统计回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let settings = PerfSettings::from_env();
    PERF_SQL_ENABLED.store(settings.enabled, Ordering::Relaxed);

    if !settings.enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    SLOW_SQL_THRESHOLD_MS.store(settings.slow_sql_ms, Ordering::Relaxed);
    conn.trace(Some(sql_trace_callback));
    conn.profile(Some(sql_profile_callback));
}

fn in_perf_scope() -> bool {
    PERF_DEPTH.with(|d| d.get() > 0)
}

fn sql_trace_callback(_sql: &str) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) || !in_perf_scope() {
        return;
    }
    SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }

    tracing::warn!(
        target: "slow_sql",
        duration_ms = ms,
        sql = %truncate_sql(sql, SLOW_SQL_LOG_MAX_CHARS),
        "slow sql"
    );
    if in_perf_scope() {
        SLOW_SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

/// 性能统计 Guard：drop 时记录 elapsed_ms + SQL 语句数 + 慢 SQL 数
///
/// 计数按线程统计, 须在执行 SQL 的线程上创建（spawn_blocking 闭包内部）。
///
/// ```ignore
/// let _perf = process_capacity_ledger::perf::PerfGuard::new("debit_capacity");
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    sql_start: u64,
    slow_sql_start: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            sql_start: SQL_COUNT.with(|c| c.get()),
            slow_sql_start: SLOW_SQL_COUNT.with(|c| c.get()),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let sql_count = SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start);
        let slow_sql_count = SLOW_SQL_COUNT
            .with(|c| c.get())
            .saturating_sub(self.slow_sql_start);

        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms,
            sql_count,
            slow_sql_count,
            "done"
        );

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_resolve() {
        let s = PerfSettings::resolve(Some("on"), Some(" 75 "));
        assert!(s.enabled);
        assert_eq!(s.slow_sql_ms, 75);

        let s = PerfSettings::resolve(Some("0"), Some("bad"));
        assert!(!s.enabled);
        assert!(s.slow_sql_ms == 50 || s.slow_sql_ms == 200);
    }

    #[test]
    fn test_truncate_sql_is_char_safe() {
        assert_eq!(truncate_sql("SELECT  1\n FROM t", 100), "SELECT 1 FROM t");
        assert_eq!(truncate_sql("工序工序工序", 2), "工序…");
    }

    #[test]
    fn test_guard_restores_depth() {
        {
            let _outer = PerfGuard::new("outer");
            let _inner = PerfGuard::new("inner");
            assert!(in_perf_scope());
        }
        assert!(!in_perf_scope());
    }
}
