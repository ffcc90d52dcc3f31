// ==========================================
// 工序产能台账 - 配置层
// ==========================================
// 职责: 台账配置读取与覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod ledger_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use ledger_config_trait::LedgerConfigReader;
