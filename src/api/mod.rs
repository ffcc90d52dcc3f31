// ==========================================
// 工序产能台账 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 CLI 与上游计划协作方调用
// ==========================================

pub mod capacity_api;
pub mod error;
pub mod validator;

// 重导出核心类型
pub use capacity_api::CapacityApi;
pub use error::{ApiError, ApiResult};
