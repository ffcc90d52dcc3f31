// ==========================================
// 工序产能台账 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod calendar_repo;
pub mod capacity_repo;
pub mod commitment_repo;
pub mod error;
pub mod reconcile_log_repo;

// 重导出核心仓储
pub use calendar_repo::WorkCalendarRepository;
pub use capacity_repo::CapacityDayRepository;
pub use commitment_repo::CommitmentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use reconcile_log_repo::{ReconcileLogEntity, ReconcileLogRepository};
