// ==========================================
// 工序产能台账 - 台账生成与刷新引擎
// ==========================================
// 职责:
// - 按滚动周期生成产能日（存在则更新参数并保留占用, 不存在则插入）
// - 按工作日历刷新班次工时
// - 全量重算派生字段
// 红线: Engine 不拼 SQL
// 锁顺序: 日历查询必须在持有台账连接锁之前完成（日历仓储可能共享同一连接）
// ==========================================

use crate::db::LedgerStore;
use crate::domain::calendar::CalendarProvider;
use crate::domain::capacity::{opt_hours_eq, CapacityDay, ProcessSpec};
use crate::domain::types::{HorizonSummary, RefreshSummary};
use crate::repository::capacity_repo::CapacityDayRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Days, NaiveDate};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info, instrument, warn};

// ==========================================
// CapacityHorizonInitializer - 台账生成器
// ==========================================
pub struct CapacityHorizonInitializer {
    conn: LedgerStore,
    calendar: Arc<dyn CalendarProvider>,
}

impl CapacityHorizonInitializer {
    pub fn new(conn: LedgerStore, calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { conn, calendar }
    }

    fn lock_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 生成滚动周期台账
    ///
    /// # 参数
    /// - `processes`: 工序及工位数
    /// - `horizon_days`: 天数（从 start_date 起, 含当天）
    /// - `start_date`: 起始日期
    ///
    /// # 说明
    /// - 幂等, 可重复执行以延长周期或修正工位数
    /// - 单行失败记录日志并计入 failed, 不影响其余行
    #[instrument(skip(self, processes), fields(process_count = processes.len()))]
    pub fn generate_horizon(
        &self,
        processes: &[ProcessSpec],
        horizon_days: u32,
        start_date: NaiveDate,
    ) -> RepositoryResult<HorizonSummary> {
        for process in processes {
            validate_process(process)?;
        }

        let mut dates = Vec::with_capacity(horizon_days as usize);
        for offset in 0..horizon_days {
            let date = start_date
                .checked_add_days(Days::new(offset as u64))
                .ok_or_else(|| {
                    RepositoryError::ValidationError(format!("日期越界: {} + {}天", start_date, offset))
                })?;
            dates.push(date);
        }
        let shifts: Vec<(NaiveDate, Option<f64>)> = match (dates.first(), dates.last()) {
            (Some(&first), Some(&last)) => {
                let calendar = self.calendar.shift_hours_in_range(first, last)?;
                dates
                    .into_iter()
                    .map(|date| (date, calendar.get(&date).copied().flatten()))
                    .collect()
            }
            _ => Vec::new(),
        };

        let mut conn = self.lock_conn()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = HorizonSummary::default();

        for process in processes {
            for (date, shift_hours) in &shifts {
                let sp = tx.savepoint()?;
                match upsert_horizon_day(&sp, process, *date, *shift_hours) {
                    Ok(inserted) => {
                        sp.commit()?;
                        if inserted {
                            summary.inserted += 1;
                        } else {
                            summary.updated += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            process = %process.process_name,
                            date = %date,
                            error = %e,
                            "产能日生成失败, 跳过"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        tx.commit()?;
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            failed = summary.failed,
            "台账生成完成"
        );
        Ok(summary)
    }

    /// 按工作日历刷新班次工时
    ///
    /// 工作日 → 标准工时; 休息日/日历缺失 → None。占用工时不变, 派生字段随之重算。
    #[instrument(skip(self))]
    pub fn refresh_shift_hours(&self) -> RepositoryResult<RefreshSummary> {
        let dates = {
            let conn = self.lock_conn()?;
            CapacityDayRepository::list_distinct_dates_tx(&conn)?
        };

        let mut shift_by_date: HashMap<NaiveDate, Option<f64>> = HashMap::with_capacity(dates.len());
        if let (Some(&first), Some(&last)) = (dates.first(), dates.last()) {
            let calendar = self.calendar.shift_hours_in_range(first, last)?;
            for date in dates {
                shift_by_date.insert(date, calendar.get(&date).copied().flatten());
            }
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = RefreshSummary::default();

        for mut day in CapacityDayRepository::list_all_tx(&tx)? {
            // 读取日期之后新生成的行已带最新日历, 跳过
            let Some(shift_hours) = shift_by_date.get(&day.plan_date).copied() else {
                continue;
            };
            if opt_hours_eq(day.shift_hours, shift_hours) {
                continue;
            }
            day.reshape(day.available_workstations, shift_hours);
            CapacityDayRepository::update_shift_tx(&tx, &day)?;
            summary.updated += 1;
        }

        tx.commit()?;
        info!(updated = summary.updated, "班次工时刷新完成");
        Ok(summary)
    }

    /// 全量重算剩余工时/剩余班次
    #[instrument(skip(self))]
    pub fn recompute_remaining(&self) -> RepositoryResult<RefreshSummary> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = RefreshSummary::default();

        for mut day in CapacityDayRepository::list_all_tx(&tx)? {
            if day.recompute_derived() {
                CapacityDayRepository::update_derived_tx(&tx, &day)?;
                summary.updated += 1;
            }
        }

        tx.commit()?;
        info!(updated = summary.updated, "剩余工时重算完成");
        Ok(summary)
    }

    /// 设置加班班次（不计入剩余工时）
    ///
    /// # 返回
    /// - Ok(true): 已更新
    /// - Ok(false): 台账行不存在
    pub fn set_overtime_shift(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        overtime_shift: Option<f64>,
    ) -> RepositoryResult<bool> {
        if let Some(v) = overtime_shift {
            if !v.is_finite() || v < 0.0 {
                return Err(RepositoryError::ValidationError(format!(
                    "加班班次必须为非负数: {}",
                    v
                )));
            }
        }
        let conn = self.lock_conn()?;
        let affected =
            CapacityDayRepository::update_overtime_tx(&conn, process_name, plan_date, overtime_shift)?;
        debug!(process = process_name, date = %plan_date, affected, "加班班次已设置");
        Ok(affected > 0)
    }

    /// 清理 cutoff 之前的历史产能日
    pub fn purge_before(&self, cutoff: NaiveDate) -> RepositoryResult<RefreshSummary> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = CapacityDayRepository::delete_before_tx(&tx, cutoff)?;
        tx.commit()?;
        info!(cutoff = %cutoff, deleted, "历史产能日已清理");
        Ok(RefreshSummary { updated: deleted })
    }
}

fn validate_process(process: &ProcessSpec) -> RepositoryResult<()> {
    if process.process_name.trim().is_empty() {
        return Err(RepositoryError::ValidationError("工序名称不能为空".to_string()));
    }
    if process.available_workstations < 0 {
        return Err(RepositoryError::ValidationError(format!(
            "工位数不能为负数: process={}, workstations={}",
            process.process_name, process.available_workstations
        )));
    }
    Ok(())
}

/// 单行插入或更新, 返回是否为新插入
fn upsert_horizon_day(
    conn: &Connection,
    process: &ProcessSpec,
    plan_date: NaiveDate,
    shift_hours: Option<f64>,
) -> RepositoryResult<bool> {
    let day = CapacityDay::new(
        process.process_name.clone(),
        plan_date,
        process.available_workstations,
        shift_hours,
    );
    CapacityDayRepository::upsert_horizon_row_tx(conn, &day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar::CalendarDay;
    use crate::repository::calendar_repo::WorkCalendarRepository;
    use std::sync::Mutex;

    fn setup() -> (LedgerStore, Arc<WorkCalendarRepository>, CapacityHorizonInitializer) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_ledger_schema(&conn).unwrap();
        let store = Arc::new(Mutex::new(conn));
        let calendar = Arc::new(WorkCalendarRepository::from_connection(store.clone()));
        let init = CapacityHorizonInitializer::new(store.clone(), calendar.clone());
        (store, calendar, init)
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn workday(day: u32, hours: f64) -> CalendarDay {
        CalendarDay { calendar_date: d(day), is_workday: true, standard_work_hours: Some(hours) }
    }

    #[test]
    fn test_generate_inserts_then_updates() {
        let (store, calendar, init) = setup();
        calendar.upsert_batch(&[workday(6, 8.0), workday(7, 8.0)]).unwrap();

        let first = init.generate_horizon(&[ProcessSpec::new("P", 2)], 3, d(6)).unwrap();
        assert_eq!(first, HorizonSummary { inserted: 3, updated: 0, failed: 0 });

        let second = init.generate_horizon(&[ProcessSpec::new("P", 2)], 3, d(6)).unwrap();
        assert_eq!(second, HorizonSummary { inserted: 0, updated: 3, failed: 0 });

        let conn = store.lock().unwrap();
        let day8 = CapacityDayRepository::find_by_key_tx(&conn, "P", d(8)).unwrap().unwrap();
        assert_eq!(day8.shift_hours, None);
        assert_eq!(day8.remaining_hours, 0.0);
    }

    #[test]
    fn test_generate_rejects_blank_process() {
        let (_store, _calendar, init) = setup();
        let err = init.generate_horizon(&[ProcessSpec::new("  ", 1)], 1, d(6)).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_refresh_follows_calendar_change() {
        let (store, calendar, init) = setup();
        calendar.upsert(&workday(6, 8.0)).unwrap();
        init.generate_horizon(&[ProcessSpec::new("P", 2)], 1, d(6)).unwrap();

        calendar
            .upsert(&CalendarDay { calendar_date: d(6), is_workday: false, standard_work_hours: Some(8.0) })
            .unwrap();
        assert_eq!(init.refresh_shift_hours().unwrap().updated, 1);
        assert_eq!(init.refresh_shift_hours().unwrap().updated, 0);

        let conn = store.lock().unwrap();
        let day = CapacityDayRepository::find_by_key_tx(&conn, "P", d(6)).unwrap().unwrap();
        assert_eq!(day.shift_hours, None);
        assert!(day.is_derived_consistent());
    }

    #[test]
    fn test_recompute_repairs_stale_cache() {
        let (store, calendar, init) = setup();
        calendar.upsert(&workday(6, 8.0)).unwrap();
        init.generate_horizon(&[ProcessSpec::new("P", 2)], 1, d(6)).unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute("UPDATE capacity_day SET remaining_hours = 123", []).unwrap();
        }
        assert_eq!(init.recompute_remaining().unwrap().updated, 1);
        assert_eq!(init.recompute_remaining().unwrap().updated, 0);
    }

    #[test]
    fn test_overtime_is_not_folded_into_remaining() {
        let (store, calendar, init) = setup();
        calendar.upsert(&workday(6, 8.0)).unwrap();
        init.generate_horizon(&[ProcessSpec::new("P", 1)], 1, d(6)).unwrap();
        assert!(init.set_overtime_shift("P", d(6), Some(2.0)).unwrap());
        assert!(!init.set_overtime_shift("P", d(7), Some(2.0)).unwrap());

        let conn = store.lock().unwrap();
        let day = CapacityDayRepository::find_by_key_tx(&conn, "P", d(6)).unwrap().unwrap();
        assert_eq!(day.overtime_shift, Some(2.0));
        assert_eq!(day.remaining_hours, 8.0);
    }

    /// 记录调用次数的日历: 单日查询直接报错, 只允许区间读取
    struct CountingCalendar {
        inner: Arc<WorkCalendarRepository>,
        range_calls: std::sync::atomic::AtomicUsize,
    }

    impl CalendarProvider for CountingCalendar {
        fn get_shift_hours(&self, date: NaiveDate) -> RepositoryResult<Option<CalendarDay>> {
            Err(RepositoryError::ValidationError(format!("不应逐日查询: {}", date)))
        }

        fn get_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> RepositoryResult<Vec<CalendarDay>> {
            self.range_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.find_by_date_range(start_date, end_date)
        }
    }

    #[test]
    fn test_calendar_read_once_per_pass() {
        let (store, calendar, _) = setup();
        calendar
            .upsert_batch(&[
                workday(6, 8.0),
                CalendarDay { calendar_date: d(7), is_workday: false, standard_work_hours: Some(8.0) },
                workday(9, 6.0),
            ])
            .unwrap();
        let counting = Arc::new(CountingCalendar {
            inner: calendar.clone(),
            range_calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let init = CapacityHorizonInitializer::new(store.clone(), counting.clone());

        let summary = init.generate_horizon(&[ProcessSpec::new("P", 2)], 5, d(6)).unwrap();
        assert_eq!(summary.inserted, 5);
        assert_eq!(counting.range_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        {
            let conn = store.lock().unwrap();
            let shifts: Vec<Option<f64>> = (6..=10)
                .map(|day| {
                    CapacityDayRepository::find_by_key_tx(&conn, "P", d(day))
                        .unwrap()
                        .unwrap()
                        .shift_hours
                })
                .collect();
            assert_eq!(shifts, vec![Some(8.0), None, None, Some(6.0), None]);
        }

        calendar.upsert(&workday(8, 4.0)).unwrap();
        assert_eq!(init.refresh_shift_hours().unwrap().updated, 1);
        assert_eq!(counting.range_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
