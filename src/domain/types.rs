// ==========================================
// 工序产能台账 - 领域结果类型
// ==========================================
// 约定: 查询"找不到"与"不够用"用显式结果表达, 不抛错
// 序列化格式: SCREAMING_SNAKE_CASE 状态标签
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 台账增量变更结果 (Debit / Credit)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerMutationOutcome {
    /// 已写入
    Applied {
        previous_occupied_hours: f64,
        occupied_hours: f64,
        remaining_hours: f64,
    },
    /// delta = 0, 未写入
    ZeroDelta,
    /// 台账行不存在（可能尚未初始化）, 未写入
    NotFound,
}

impl LedgerMutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerMutationOutcome::Applied { .. })
    }
}

impl fmt::Display for LedgerMutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerMutationOutcome::Applied { .. } => write!(f, "APPLIED"),
            LedgerMutationOutcome::ZeroDelta => write!(f, "ZERO_DELTA"),
            LedgerMutationOutcome::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

// ==========================================
// 单行对账结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    Reconciled {
        changed: bool,
        previous: f64,
        updated: f64,
    },
    NotFound,
}

/// 全量对账汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileAllSummary {
    pub run_id: String,
    pub scanned: usize,
    pub updated: usize,
    pub failed: usize,
    /// Σ(previous - updated), 仅统计发生变化的行
    pub net_hours_released: f64,
}

/// 台账生成汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// 批量刷新汇总（班次刷新/剩余重算/清理）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub updated: usize,
}

// ==========================================
// 查询结果
// ==========================================

/// 最早开工日期查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarliestStartOutcome {
    /// 累计到需求工时的日期及实际累计值（可能超出）
    Found {
        start_date: NaiveDate,
        accumulated_hours: f64,
    },
    /// 有可用日但合计不足
    Insufficient { available_hours: f64 },
    /// 没有任何可用日
    NotFound,
}

/// 下一可用日期（始终返回）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextFeasibleDate {
    pub date: NaiveDate,
    /// true: 窗口内无满足余量的日期, date 为 after + 1 天, 不保证可排
    pub fallback_used: bool,
}
