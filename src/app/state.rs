// ==========================================
// 工序产能台账 - 应用状态
// ==========================================
// 职责: 打开存储句柄, 组装仓储/引擎/API, 持有共享实例
// 生命周期: AppState::new 打开, AppState::close 关闭（显式, 无全局初始化）
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{ApiError, ApiResult, CapacityApi};
use crate::config::{ConfigManager, LedgerConfigReader};
use crate::db::{close_ledger_store, open_ledger_store, LedgerStore};
use crate::domain::calendar::CalendarProvider;
use crate::engine::{CapacityHorizonInitializer, CommitmentConsistencyEngine, SchedulingQueryService};
use crate::importer::WorkCalendarImporter;
use crate::repository::{
    CapacityDayRepository, CommitmentRepository, ReconcileLogRepository, WorkCalendarRepository,
};

/// 数据库路径环境变量
pub const ENV_DB_PATH: &str = "CAPACITY_LEDGER_DB_PATH";

const DB_FILE_NAME: &str = "capacity_ledger.db";

/// 应用状态
///
/// 所有组件共享同一个存储句柄
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 产能台账API
    pub capacity_api: Arc<CapacityApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 工作日历仓储
    pub calendar_repo: Arc<WorkCalendarRepository>,

    /// 工序计划占用仓储
    pub commitment_repo: Arc<CommitmentRepository>,

    store: LedgerStore,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开存储（PRAGMA + 建表）
    /// 2. 初始化所有Repository
    /// 3. 初始化所有Engine
    /// 4. 创建API实例
    pub fn new(db_path: String) -> ApiResult<Self> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let store = open_ledger_store(&db_path)?;

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let capacity_repo = Arc::new(CapacityDayRepository::from_connection(store.clone()));
        let commitment_repo = Arc::new(CommitmentRepository::from_connection(store.clone()));
        let calendar_repo = Arc::new(WorkCalendarRepository::from_connection(store.clone()));
        let reconcile_log_repo = Arc::new(ReconcileLogRepository::from_connection(store.clone()));
        let config_manager = Arc::new(ConfigManager::from_connection(store.clone()));

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let calendar: Arc<dyn CalendarProvider> = calendar_repo.clone();
        let initializer = Arc::new(CapacityHorizonInitializer::new(store.clone(), calendar));
        let consistency = Arc::new(CommitmentConsistencyEngine::new(store.clone()));
        let query = Arc::new(SchedulingQueryService::new(
            capacity_repo.clone(),
            commitment_repo.clone(),
        ));
        let calendar_importer = Arc::new(WorkCalendarImporter::new(calendar_repo.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================
        let config_reader: Arc<dyn LedgerConfigReader> = config_manager.clone();
        let capacity_api = Arc::new(CapacityApi::new(
            capacity_repo,
            reconcile_log_repo,
            initializer,
            consistency,
            query,
            calendar_importer,
            config_reader,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            capacity_api,
            config_manager,
            calendar_repo,
            commitment_repo,
            store,
        })
    }

    /// 关闭存储
    ///
    /// 调用方仍持有的 Arc（例如 capacity_api 的克隆）会导致关闭失败
    pub fn close(self) -> ApiResult<()> {
        let AppState {
            db_path,
            capacity_api,
            config_manager,
            calendar_repo,
            commitment_repo,
            store,
        } = self;
        drop((capacity_api, config_manager, calendar_repo, commitment_repo));

        close_ledger_store(store).map_err(ApiError::from)?;
        tracing::info!(db_path = %db_path, "存储已关闭");
        Ok(())
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 CAPACITY_LEDGER_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(ENV_DB_PATH) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from(".").join(DB_FILE_NAME);
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("process-capacity-ledger");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join(DB_FILE_NAME);
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
    }

    #[test]
    fn test_open_and_close() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let state = AppState::new(db_path).unwrap();
        assert!(state.close().is_ok());
    }

    #[test]
    fn test_close_fails_while_shared() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let state = AppState::new(db_path).unwrap();
        let leaked = state.capacity_api.clone();
        assert!(matches!(state.close(), Err(ApiError::DatabaseConnectionError(_))));
        drop(leaked);
    }
}
