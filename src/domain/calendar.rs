// ==========================================
// 工序产能台账 - 工作日历领域模型
// ==========================================
// 职责: 定义日历日与日历提供者接口
// 说明: 日历是外部协作方, 台账只通过 CalendarProvider 读取
// ==========================================

use crate::repository::error::RepositoryResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// CalendarDay - 日历日
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub calendar_date: NaiveDate,
    pub is_workday: bool,
    pub standard_work_hours: Option<f64>,
}

impl CalendarDay {
    /// 台账使用的班次工时: 工作日取标准工时, 休息日为 None
    pub fn shift_hours(&self) -> Option<f64> {
        if self.is_workday {
            self.standard_work_hours
        } else {
            None
        }
    }
}

// ==========================================
// Trait: CalendarProvider
// ==========================================
// 实现者: WorkCalendarRepository（work_calendar 表）
pub trait CalendarProvider: Send + Sync {
    /// 查询某日日历
    ///
    /// # 返回
    /// - Ok(Some(CalendarDay)): 日历中存在该日
    /// - Ok(None): 日历缺失
    fn get_shift_hours(&self, date: NaiveDate) -> RepositoryResult<Option<CalendarDay>>;

    /// 某日台账班次工时（缺失或休息日为 None）
    fn shift_hours_for(&self, date: NaiveDate) -> RepositoryResult<Option<f64>> {
        Ok(self.get_shift_hours(date)?.and_then(|d| d.shift_hours()))
    }

    /// 区间内（含两端）日历中存在的日期
    fn get_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> RepositoryResult<Vec<CalendarDay>>;

    /// 区间内各日的台账班次工时, 一次读取; 日历缺失的日期不在结果中（按 None 处理）
    fn shift_hours_in_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> RepositoryResult<HashMap<NaiveDate, Option<f64>>> {
        Ok(self
            .get_range(start_date, end_date)?
            .into_iter()
            .map(|d| (d.calendar_date, d.shift_hours()))
            .collect())
    }
}
