// ==========================================
// 工序产能台账 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod calendar;
pub mod capacity;
pub mod commitment;
pub mod types;

// 重导出核心类型
pub use calendar::{CalendarDay, CalendarProvider};
pub use capacity::{derive_remaining, hours_eq, opt_hours_eq, CapacityDay, ProcessSpec, HOURS_EPSILON};
pub use commitment::{Commitment, CommitmentSource};
pub use types::{
    EarliestStartOutcome, HorizonSummary, LedgerMutationOutcome, NextFeasibleDate,
    ReconcileAllSummary, ReconcileOutcome, RefreshSummary,
};
