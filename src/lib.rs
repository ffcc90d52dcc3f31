// ==========================================
// 工序产能台账 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 工序产能台账与排产日期查询（不做排产决策）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 台账维护/一致性/查询
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能统计
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体与结果类型
pub use domain::{
    CalendarDay, CalendarProvider, CapacityDay, Commitment, CommitmentSource,
    EarliestStartOutcome, HorizonSummary, LedgerMutationOutcome, NextFeasibleDate, ProcessSpec,
    ReconcileAllSummary, ReconcileOutcome, RefreshSummary,
};

// 引擎
pub use engine::{CapacityHorizonInitializer, CommitmentConsistencyEngine, SchedulingQueryService};

// API
pub use api::{ApiError, ApiResult, CapacityApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "工序产能台账";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
