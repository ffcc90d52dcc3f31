// ==========================================
// 工序产能台账 - 排产查询服务
// ==========================================
// 职责: 只读查询, 回答可排性/日期搜索问题
// 红线: 不写库, 不加锁重试; 结果可能与并发写入交错（最终一致）
// 约定: "找不到"与"不够用"以显式结果返回, 不抛错
// ==========================================

use crate::domain::capacity::HOURS_EPSILON;
use crate::domain::commitment::CommitmentSource;
use crate::domain::types::{EarliestStartOutcome, NextFeasibleDate};
use crate::repository::capacity_repo::CapacityDayRepository;
use crate::repository::commitment_repo::CommitmentRepository;
use crate::repository::error::RepositoryResult;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::{debug, instrument};

// ==========================================
// SchedulingQueryService - 排产查询服务
// ==========================================
pub struct SchedulingQueryService {
    capacity_repo: Arc<CapacityDayRepository>,
    commitment_repo: Arc<CommitmentRepository>,
}

impl SchedulingQueryService {
    pub fn new(
        capacity_repo: Arc<CapacityDayRepository>,
        commitment_repo: Arc<CommitmentRepository>,
    ) -> Self {
        Self {
            capacity_repo,
            commitment_repo,
        }
    }

    /// 截止日(含)之前最晚的可排日期
    ///
    /// # 参数
    /// - min_slack: 剩余工时下限（含）
    ///
    /// # 返回
    /// - Ok(None): 没有满足余量的日期
    #[instrument(skip(self))]
    pub fn latest_feasible_date(
        &self,
        process_name: &str,
        deadline: NaiveDate,
        min_slack: f64,
    ) -> RepositoryResult<Option<NaiveDate>> {
        self.capacity_repo
            .find_latest_date_with_slack(process_name, deadline, min_slack)
    }

    /// 从完工日倒推最早开工日期
    ///
    /// # 说明
    /// - 完工日(含)之前、剩余工时 >= min_slack 的日期按降序累加剩余工时
    /// - 第一次累计达到 required_hours 的日期即开工日, 同时返回实际累计值（可能超出）
    /// - required_hours <= 0: 直接返回完工日, 累计 0, 不查询
    #[instrument(skip(self))]
    pub fn earliest_start_date(
        &self,
        process_name: &str,
        finish_date: NaiveDate,
        required_hours: f64,
        min_slack: f64,
    ) -> RepositoryResult<EarliestStartOutcome> {
        if required_hours <= 0.0 {
            return Ok(EarliestStartOutcome::Found {
                start_date: finish_date,
                accumulated_hours: 0.0,
            });
        }

        let days = self
            .capacity_repo
            .find_slack_days_desc(process_name, finish_date, min_slack)?;
        Ok(accumulate_backward(&days, required_hours))
    }

    /// (after, before_or_equal] 内第一个剩余工时严格大于 min_slack 的日期
    ///
    /// 窗口内没有满足条件的日期时回退到 after + 1 天, 并置 fallback_used。
    /// 回退日期不保证有余量。
    #[instrument(skip(self))]
    pub fn next_feasible_date(
        &self,
        process_name: &str,
        after: NaiveDate,
        before_or_equal: NaiveDate,
        min_slack: f64,
    ) -> RepositoryResult<NextFeasibleDate> {
        if let Some(date) = self.capacity_repo.find_next_date_above_slack(
            process_name,
            after,
            before_or_equal,
            min_slack,
        )? {
            return Ok(NextFeasibleDate {
                date,
                fallback_used: false,
            });
        }

        let date = after.checked_add_days(Days::new(1)).unwrap_or(after);
        debug!(process = process_name, %after, %date, "窗口内无可排日期, 使用回退日期");
        Ok(NextFeasibleDate {
            date,
            fallback_used: true,
        })
    }

    /// 当日总产能 = 工位数 × 班次工时; 台账行不存在时为 0
    pub fn daily_total_capacity(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<f64> {
        Ok(self
            .capacity_repo
            .find_by_key(process_name, plan_date)?
            .map(|day| day.total_capacity_hours())
            .unwrap_or(0.0))
    }

    /// 单一来源中排名严格小于 before_sequence 的承诺工时合计
    pub fn cumulative_committed_before(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        before_sequence: i64,
    ) -> RepositoryResult<f64> {
        self.commitment_repo
            .cumulative_committed_before(source, process_name, plan_date, before_sequence)
    }
}

/// 按给定顺序累加剩余工时直到达到需求
///
/// days 必须已按日期降序（离完工日最近的在前）。
pub fn accumulate_backward(days: &[(NaiveDate, f64)], required_hours: f64) -> EarliestStartOutcome {
    if days.is_empty() {
        return EarliestStartOutcome::NotFound;
    }

    let mut accumulated = 0.0;
    for (date, remaining) in days {
        accumulated += remaining;
        if accumulated + HOURS_EPSILON >= required_hours {
            return EarliestStartOutcome::Found {
                start_date: *date,
                accumulated_hours: accumulated,
            };
        }
    }

    EarliestStartOutcome::Insufficient {
        available_hours: accumulated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn five_days_of_two() -> Vec<(NaiveDate, f64)> {
        (1..=5).rev().map(|day| (d(day), 2.0)).collect()
    }

    #[test]
    fn test_accumulate_overshoots_on_third_day() {
        let outcome = accumulate_backward(&five_days_of_two(), 5.0);
        assert_eq!(
            outcome,
            EarliestStartOutcome::Found {
                start_date: d(3),
                accumulated_hours: 6.0
            }
        );
    }

    #[test]
    fn test_accumulate_insufficient_vs_not_found() {
        assert_eq!(
            accumulate_backward(&five_days_of_two(), 11.0),
            EarliestStartOutcome::Insufficient {
                available_hours: 10.0
            }
        );
        assert_eq!(accumulate_backward(&[], 1.0), EarliestStartOutcome::NotFound);
    }

    #[test]
    fn test_accumulate_exact_match_stops() {
        let outcome = accumulate_backward(&five_days_of_two(), 4.0);
        assert_eq!(
            outcome,
            EarliestStartOutcome::Found {
                start_date: d(4),
                accumulated_hours: 4.0
            }
        );
    }

    #[test]
    fn test_accumulate_tolerates_float_noise() {
        let days = vec![(d(3), 0.1), (d(2), 0.2)];
        let outcome = accumulate_backward(&days, 0.3);
        assert!(matches!(
            outcome,
            EarliestStartOutcome::Found { start_date, .. } if start_date == d(2)
        ));
    }
}
