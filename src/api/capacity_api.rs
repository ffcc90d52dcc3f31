// ==========================================
// 工序产能台账 - 产能台账 API
// ==========================================
// 职责: 面向上游计划协作方的操作入口
// 执行: 先校验（不访问存储）, 再经 spawn_blocking 在阻塞线程池执行 SQLite 操作
// 默认值: min_slack / horizon_days 未指定时读取 LedgerConfigReader
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};

use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::{
    validate_date_window, validate_horizon_days, validate_hours, validate_optional_hours,
    validate_process_name, validate_process_specs,
};
use crate::config::LedgerConfigReader;
use crate::domain::capacity::{CapacityDay, ProcessSpec};
use crate::domain::commitment::CommitmentSource;
use crate::domain::types::{
    EarliestStartOutcome, HorizonSummary, LedgerMutationOutcome, NextFeasibleDate,
    ReconcileAllSummary, ReconcileOutcome, RefreshSummary,
};
use crate::engine::{
    CapacityHorizonInitializer, CommitmentConsistencyEngine, CommitmentRecorded,
    CommitmentRemoved, SchedulingQueryService,
};
use crate::importer::{CalendarImportReport, WorkCalendarImporter};
use crate::perf::PerfGuard;
use crate::repository::{CapacityDayRepository, ReconcileLogEntity, ReconcileLogRepository};

/// 在阻塞线程池执行, 并在该线程上统计 SQL
async fn run_blocking<T, F>(op: &'static str, f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _perf = PerfGuard::new(op);
        f()
    })
    .await?
}

// ==========================================
// CapacityApi - 产能台账 API
// ==========================================

/// 产能台账API
///
/// 职责：
/// 1. 占用扣减/释放（增量）与对账
/// 2. 台账生成、班次刷新、剩余重算、加班、清理
/// 3. 排产日期查询
/// 4. 工作日历导入
pub struct CapacityApi {
    capacity_repo: Arc<CapacityDayRepository>,
    reconcile_log_repo: Arc<ReconcileLogRepository>,
    initializer: Arc<CapacityHorizonInitializer>,
    consistency: Arc<CommitmentConsistencyEngine>,
    query: Arc<SchedulingQueryService>,
    calendar_importer: Arc<WorkCalendarImporter>,
    config: Arc<dyn LedgerConfigReader>,
}

impl CapacityApi {
    pub fn new(
        capacity_repo: Arc<CapacityDayRepository>,
        reconcile_log_repo: Arc<ReconcileLogRepository>,
        initializer: Arc<CapacityHorizonInitializer>,
        consistency: Arc<CommitmentConsistencyEngine>,
        query: Arc<SchedulingQueryService>,
        calendar_importer: Arc<WorkCalendarImporter>,
        config: Arc<dyn LedgerConfigReader>,
    ) -> Self {
        Self {
            capacity_repo,
            reconcile_log_repo,
            initializer,
            consistency,
            query,
            calendar_importer,
            config,
        }
    }

    async fn resolve_min_slack(&self, min_slack: Option<f64>) -> ApiResult<f64> {
        match min_slack {
            Some(v) => {
                validate_hours("最小余量", v)?;
                Ok(v)
            }
            None => Ok(self.config.get_min_slack_hours().await?),
        }
    }

    // ==========================================
    // 占用变更
    // ==========================================

    /// 占用产能（增量扣减）
    ///
    /// # 返回
    /// - Applied / ZeroDelta / NotFound（台账未初始化时为 NotFound, 不报错）
    pub async fn commit_capacity(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        hours: f64,
    ) -> ApiResult<LedgerMutationOutcome> {
        let process = validate_process_name(process_name)?;
        validate_hours("占用工时", hours)?;

        let engine = self.consistency.clone();
        run_blocking("api.commit_capacity", move || {
            Ok(engine.debit(&process, plan_date, hours)?)
        })
        .await
    }

    /// 释放产能（增量回补, 占用下限为 0）
    pub async fn release_capacity(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        hours: f64,
    ) -> ApiResult<LedgerMutationOutcome> {
        let process = validate_process_name(process_name)?;
        validate_hours("释放工时", hours)?;

        let engine = self.consistency.clone();
        run_blocking("api.release_capacity", move || {
            Ok(engine.credit(&process, plan_date, hours)?)
        })
        .await
    }

    /// 新建工序计划占用并同步扣减台账
    pub async fn record_commitment(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        committed_hours: f64,
    ) -> ApiResult<CommitmentRecorded> {
        let process = validate_process_name(process_name)?;
        validate_hours("承诺工时", committed_hours)?;

        let engine = self.consistency.clone();
        run_blocking("api.record_commitment", move || {
            Ok(engine.record_commitment(source, &process, plan_date, committed_hours)?)
        })
        .await
    }

    /// 删除工序计划占用并同步释放台账
    ///
    /// # 返回
    /// - Ok(None): 记录不存在
    pub async fn remove_commitment(
        &self,
        source: CommitmentSource,
        commitment_id: i64,
    ) -> ApiResult<Option<CommitmentRemoved>> {
        let engine = self.consistency.clone();
        run_blocking("api.remove_commitment", move || {
            Ok(engine.remove_commitment(source, commitment_id)?)
        })
        .await
    }

    /// 单行对账
    pub async fn reconcile_capacity(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> ApiResult<ReconcileOutcome> {
        let process = validate_process_name(process_name)?;

        let engine = self.consistency.clone();
        run_blocking("api.reconcile_capacity", move || {
            Ok(engine.reconcile(&process, plan_date)?)
        })
        .await
    }

    /// 全量对账（尽力而为, 见 failed 计数）
    pub async fn reconcile_all_capacity(&self) -> ApiResult<ReconcileAllSummary> {
        let engine = self.consistency.clone();
        run_blocking("api.reconcile_all_capacity", move || Ok(engine.reconcile_all()?)).await
    }

    /// 最近一次全量对账记录
    pub async fn latest_reconcile_log(&self) -> ApiResult<Option<ReconcileLogEntity>> {
        let repo = self.reconcile_log_repo.clone();
        run_blocking("api.latest_reconcile_log", move || Ok(repo.find_latest()?)).await
    }

    // ==========================================
    // 台账维护
    // ==========================================

    /// 生成/扩展台账窗口
    ///
    /// # 参数
    /// - horizon_days: None 时读取配置（默认 120）
    /// - start_date: None 时为今天
    pub async fn generate_horizon(
        &self,
        processes: &[ProcessSpec],
        horizon_days: Option<u32>,
        start_date: Option<NaiveDate>,
    ) -> ApiResult<HorizonSummary> {
        let processes = validate_process_specs(processes)?;
        let horizon_days = match horizon_days {
            Some(days) => days,
            None => self.config.get_horizon_days().await?,
        };
        validate_horizon_days(horizon_days)?;
        let start_date = start_date.unwrap_or_else(|| Local::now().date_naive());

        let initializer = self.initializer.clone();
        run_blocking("api.generate_horizon", move || {
            Ok(initializer.generate_horizon(&processes, horizon_days, start_date)?)
        })
        .await
    }

    /// 按工作日历刷新班次工时
    pub async fn refresh_shift_hours(&self) -> ApiResult<RefreshSummary> {
        let initializer = self.initializer.clone();
        run_blocking("api.refresh_shift_hours", move || {
            Ok(initializer.refresh_shift_hours()?)
        })
        .await
    }

    /// 全表重算剩余工时/剩余班次
    pub async fn recompute_remaining(&self) -> ApiResult<RefreshSummary> {
        let initializer = self.initializer.clone();
        run_blocking("api.recompute_remaining", move || {
            Ok(initializer.recompute_remaining()?)
        })
        .await
    }

    /// 设置加班班次（None 为清除）
    ///
    /// # 返回
    /// - Err(NotFound): 台账行不存在
    pub async fn set_overtime_shift(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        overtime_shift: Option<f64>,
    ) -> ApiResult<()> {
        let process = validate_process_name(process_name)?;
        validate_optional_hours("加班班次", overtime_shift)?;

        let initializer = self.initializer.clone();
        run_blocking("api.set_overtime_shift", move || {
            if initializer.set_overtime_shift(&process, plan_date, overtime_shift)? {
                Ok(())
            } else {
                Err(ApiError::NotFound(format!(
                    "产能日(process={}, date={})不存在",
                    process, plan_date
                )))
            }
        })
        .await
    }

    /// 清理历史台账
    ///
    /// # 参数
    /// - cutoff: 删除 plan_date < cutoff 的行; None 时为 今天 - 保留天数（配置）
    pub async fn purge_before(&self, cutoff: Option<NaiveDate>) -> ApiResult<RefreshSummary> {
        let cutoff = match cutoff {
            Some(date) => date,
            None => {
                let keep_days = self.config.get_purge_keep_days().await?;
                let today = Local::now().date_naive();
                today
                    .checked_sub_days(Days::new(u64::from(keep_days)))
                    .ok_or_else(|| ApiError::InvalidInput(format!("保留天数过大: {}", keep_days)))?
            }
        };

        let initializer = self.initializer.clone();
        run_blocking("api.purge_before", move || Ok(initializer.purge_before(cutoff)?)).await
    }

    /// 导入工作日历 CSV
    pub async fn import_work_calendar(&self, path: PathBuf) -> ApiResult<CalendarImportReport> {
        let importer = self.calendar_importer.clone();
        run_blocking("api.import_work_calendar", move || {
            Ok(importer.import_from_csv(&path)?)
        })
        .await
    }

    // ==========================================
    // 台账读取
    // ==========================================

    pub async fn get_capacity_day(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> ApiResult<Option<CapacityDay>> {
        let process = validate_process_name(process_name)?;
        let repo = self.capacity_repo.clone();
        run_blocking("api.get_capacity_day", move || {
            Ok(repo.find_by_key(&process, plan_date)?)
        })
        .await
    }

    /// 按工序和日期范围列出台账（含两端）
    pub async fn list_capacity_days(
        &self,
        process_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ApiResult<Vec<CapacityDay>> {
        let process = validate_process_name(process_name)?;
        validate_date_window(start_date, end_date)?;

        let repo = self.capacity_repo.clone();
        run_blocking("api.list_capacity_days", move || {
            Ok(repo.find_by_date_range(&process, start_date, end_date)?)
        })
        .await
    }

    /// 列出某日所有工序的台账
    pub async fn list_capacity_by_date(&self, plan_date: NaiveDate) -> ApiResult<Vec<CapacityDay>> {
        let repo = self.capacity_repo.clone();
        run_blocking("api.list_capacity_by_date", move || {
            Ok(repo.find_all_processes_by_date(plan_date)?)
        })
        .await
    }

    // ==========================================
    // 排产查询
    // ==========================================

    pub async fn latest_feasible_date(
        &self,
        process_name: &str,
        deadline: NaiveDate,
        min_slack: Option<f64>,
    ) -> ApiResult<Option<NaiveDate>> {
        let process = validate_process_name(process_name)?;
        let min_slack = self.resolve_min_slack(min_slack).await?;

        let query = self.query.clone();
        run_blocking("api.latest_feasible_date", move || {
            Ok(query.latest_feasible_date(&process, deadline, min_slack)?)
        })
        .await
    }

    pub async fn earliest_start_date(
        &self,
        process_name: &str,
        finish_date: NaiveDate,
        required_hours: f64,
        min_slack: Option<f64>,
    ) -> ApiResult<EarliestStartOutcome> {
        let process = validate_process_name(process_name)?;
        if !required_hours.is_finite() {
            return Err(ApiError::ValidationError(format!(
                "需求工时必须为有限数: {}",
                required_hours
            )));
        }
        let min_slack = self.resolve_min_slack(min_slack).await?;

        let query = self.query.clone();
        run_blocking("api.earliest_start_date", move || {
            Ok(query.earliest_start_date(&process, finish_date, required_hours, min_slack)?)
        })
        .await
    }

    /// 下一可排日期（窗口内无满足余量的日期时使用回退日期, 见 fallback_used）
    ///
    /// after 晚于 deadline 时窗口为空, 直接回退到 after 次日, 不视为输入错误
    pub async fn next_feasible_date(
        &self,
        process_name: &str,
        after: NaiveDate,
        deadline: NaiveDate,
        min_slack: Option<f64>,
    ) -> ApiResult<NextFeasibleDate> {
        let process = validate_process_name(process_name)?;
        let min_slack = self.resolve_min_slack(min_slack).await?;

        let query = self.query.clone();
        run_blocking("api.next_feasible_date", move || {
            Ok(query.next_feasible_date(&process, after, deadline, min_slack)?)
        })
        .await
    }

    pub async fn daily_total_capacity(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> ApiResult<f64> {
        let process = validate_process_name(process_name)?;
        let query = self.query.clone();
        run_blocking("api.daily_total_capacity", move || {
            Ok(query.daily_total_capacity(&process, plan_date)?)
        })
        .await
    }

    pub async fn cumulative_committed_before(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        before_sequence: i64,
    ) -> ApiResult<f64> {
        let process = validate_process_name(process_name)?;
        let query = self.query.clone();
        run_blocking("api.cumulative_committed_before", move || {
            Ok(query.cumulative_committed_before(source, &process, plan_date, before_sequence)?)
        })
        .await
    }
}
