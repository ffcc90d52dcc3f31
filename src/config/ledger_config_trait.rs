// ==========================================
// 工序产能台账 - 台账配置读取 Trait
// ==========================================
// 职责: 定义 API 层所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// LedgerConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait LedgerConfigReader: Send + Sync {
    /// 台账滚动窗口天数
    ///
    /// # 默认值
    /// - 120
    async fn get_horizon_days(&self) -> RepositoryResult<u32>;

    /// 查询时的最小余量工时（调用方未指定时使用）
    ///
    /// # 默认值
    /// - 0.5
    async fn get_min_slack_hours(&self) -> RepositoryResult<f64>;

    /// 清理过期台账时保留的历史天数
    ///
    /// # 默认值
    /// - 30
    async fn get_purge_keep_days(&self) -> RepositoryResult<u32>;
}
