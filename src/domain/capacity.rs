// ==========================================
// 工序产能台账 - 产能日领域模型
// ==========================================
// 主键: (process_name, plan_date)
// 红线: remaining_hours / remaining_shift 只是缓存,
//       必须始终可由 workstations / shift / occupied 重算
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 工时比较精度（判断"是否变化"时使用）
pub const HOURS_EPSILON: f64 = 1e-9;

/// 两个工时值是否视为相等
pub fn hours_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= HOURS_EPSILON
}

/// 可选工时是否视为相等
pub fn opt_hours_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => hours_eq(x, y),
        (None, None) => true,
        _ => false,
    }
}

/// 由三个权威字段推导剩余工时与剩余班次
///
/// # 返回
/// (remaining_hours, remaining_shift)
/// - remaining_hours 不截断, 超排时可为负
/// - 工位数为 0 时 remaining_shift 为 None
pub fn derive_remaining(
    available_workstations: i64,
    shift_hours: Option<f64>,
    occupied_hours: f64,
) -> (f64, Option<f64>) {
    let total = available_workstations as f64 * shift_hours.unwrap_or(0.0);
    let remaining_hours = total - occupied_hours;
    let remaining_shift = if available_workstations > 0 {
        Some(remaining_hours / available_workstations as f64)
    } else {
        None
    };
    (remaining_hours, remaining_shift)
}

// ==========================================
// CapacityDay - 工序产能日
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityDay {
    // ===== 主键 =====
    pub process_name: String,      // 工序名称
    pub plan_date: NaiveDate,      // 日期

    // ===== 产能参数 =====
    pub available_workstations: i64, // 可用工位数
    pub shift_hours: Option<f64>,    // 班次工时 (None = 非工作日/未知)

    // ===== 占用 =====
    pub occupied_hours: f64,       // 已占用工时

    // ===== 派生缓存 =====
    pub remaining_hours: f64,       // 剩余工时
    pub remaining_shift: Option<f64>, // 剩余班次

    // ===== 加班 =====
    pub overtime_shift: Option<f64>, // 加班班次（不计入剩余工时）
}

impl CapacityDay {
    /// 新建产能日（占用工时为 0）
    pub fn new(
        process_name: impl Into<String>,
        plan_date: NaiveDate,
        available_workstations: i64,
        shift_hours: Option<f64>,
    ) -> Self {
        let (remaining_hours, remaining_shift) =
            derive_remaining(available_workstations, shift_hours, 0.0);
        Self {
            process_name: process_name.into(),
            plan_date,
            available_workstations,
            shift_hours,
            occupied_hours: 0.0,
            remaining_hours,
            remaining_shift,
            overtime_shift: None,
        }
    }

    /// 当日总产能 = 工位数 × 班次工时（班次缺失按 0）
    pub fn total_capacity_hours(&self) -> f64 {
        self.available_workstations as f64 * self.shift_hours.unwrap_or(0.0)
    }

    /// 重算派生字段
    ///
    /// # 返回
    /// - true: 派生字段发生变化
    pub fn recompute_derived(&mut self) -> bool {
        let (remaining_hours, remaining_shift) = derive_remaining(
            self.available_workstations,
            self.shift_hours,
            self.occupied_hours,
        );
        let changed = !hours_eq(remaining_hours, self.remaining_hours)
            || !opt_hours_eq(remaining_shift, self.remaining_shift);
        self.remaining_hours = remaining_hours;
        self.remaining_shift = remaining_shift;
        changed
    }

    /// 派生字段是否与权威字段一致
    pub fn is_derived_consistent(&self) -> bool {
        let (remaining_hours, remaining_shift) = derive_remaining(
            self.available_workstations,
            self.shift_hours,
            self.occupied_hours,
        );
        hours_eq(remaining_hours, self.remaining_hours)
            && opt_hours_eq(remaining_shift, self.remaining_shift)
    }

    /// 占用工时增加 delta
    pub fn apply_debit(&mut self, delta: f64) {
        self.occupied_hours += delta;
        self.recompute_derived();
    }

    /// 占用工时减少 delta, 下限为 0
    pub fn apply_credit(&mut self, delta: f64) {
        self.occupied_hours = (self.occupied_hours - delta).max(0.0);
        self.recompute_derived();
    }

    /// 设置占用工时（对账用）, 返回旧值
    pub fn set_occupied(&mut self, occupied_hours: f64) -> f64 {
        let previous = self.occupied_hours;
        self.occupied_hours = occupied_hours.max(0.0);
        self.recompute_derived();
        previous
    }

    /// 更新产能参数（工位数/班次）, 保留占用工时
    pub fn reshape(&mut self, available_workstations: i64, shift_hours: Option<f64>) {
        self.available_workstations = available_workstations;
        self.shift_hours = shift_hours;
        self.recompute_derived();
    }
}

/// 工序及其工位数（生成台账的输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub process_name: String,
    pub available_workstations: i64,
}

impl ProcessSpec {
    pub fn new(process_name: impl Into<String>, available_workstations: i64) -> Self {
        Self {
            process_name: process_name.into(),
            available_workstations,
        }
    }
}
