// ==========================================
// 工序产能台账 - 引擎层
// ==========================================
// 职责: 台账生成/刷新、占用一致性、排产查询
// 红线: Engine 不拼 SQL, 数据访问全部经由 Repository
// ==========================================

pub mod consistency;
pub mod horizon;
pub mod scheduling_query;

// 重导出核心引擎
pub use consistency::{CommitmentConsistencyEngine, CommitmentRecorded, CommitmentRemoved};
pub use horizon::CapacityHorizonInitializer;
pub use scheduling_query::{accumulate_backward, SchedulingQueryService};
