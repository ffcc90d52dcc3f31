// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 验证配置读取、默认值回退、快照恢复, 以及 API 对配置默认值的使用
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use process_capacity_ledger::app::AppState;
use process_capacity_ledger::config::{config_keys, ConfigManager, LedgerConfigReader};
use process_capacity_ledger::domain::ProcessSpec;
use test_helpers::{create_test_db, insert_test_config, open_test_connection, seed_workdays, ymd};

#[tokio::test]
async fn test_config_manager_creation() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    let config_manager = ConfigManager::new(&db_path);
    assert!(
        config_manager.is_ok(),
        "ConfigManager should be created successfully"
    );
}

#[tokio::test]
async fn test_defaults_when_missing() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    assert_eq!(config_manager.get_horizon_days().await.unwrap(), 120);
    assert_eq!(config_manager.get_min_slack_hours().await.unwrap(), 0.5);
    assert_eq!(config_manager.get_purge_keep_days().await.unwrap(), 30);
}

#[tokio::test]
async fn test_reads_stored_values() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    insert_test_config(&conn, config_keys::HORIZON_DAYS, "90").unwrap();
    insert_test_config(&conn, config_keys::MIN_SLACK_HOURS, " 1.25 ").unwrap();
    insert_test_config(&conn, config_keys::PURGE_KEEP_DAYS, "7").unwrap();

    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    assert_eq!(config_manager.get_horizon_days().await.unwrap(), 90);
    assert_eq!(config_manager.get_min_slack_hours().await.unwrap(), 1.25);
    assert_eq!(config_manager.get_purge_keep_days().await.unwrap(), 7);
}

#[tokio::test]
async fn test_malformed_value_falls_back() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let conn = open_test_connection(&db_path).expect("Failed to open db");
    insert_test_config(&conn, config_keys::HORIZON_DAYS, "半年").unwrap();
    insert_test_config(&conn, config_keys::MIN_SLACK_HOURS, "").unwrap();

    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");
    assert_eq!(config_manager.get_horizon_days().await.unwrap(), 120);
    assert_eq!(config_manager.get_min_slack_hours().await.unwrap(), 0.5);
}

#[test]
fn test_snapshot_and_restore() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    config_manager
        .set_global_config_value(config_keys::HORIZON_DAYS, "60")
        .unwrap();
    let snapshot = config_manager.get_config_snapshot().unwrap();

    config_manager
        .set_global_config_value(config_keys::HORIZON_DAYS, "200")
        .unwrap();
    assert_eq!(
        config_manager
            .get_global_config_value(config_keys::HORIZON_DAYS)
            .unwrap()
            .as_deref(),
        Some("200")
    );

    let restored = config_manager.restore_config_from_snapshot(&snapshot).unwrap();
    assert_eq!(restored, 1);
    assert_eq!(
        config_manager
            .get_global_config_value(config_keys::HORIZON_DAYS)
            .unwrap()
            .as_deref(),
        Some("60")
    );

    assert!(config_manager.restore_config_from_snapshot("not json").is_err());
}

#[tokio::test]
async fn test_api_uses_configured_defaults() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let state = AppState::new(db_path).expect("Failed to create AppState");
    let api = state.capacity_api.clone();

    seed_workdays(&state.calendar_repo, ymd(2025, 1, 1), 5, 1.0).unwrap();
    state
        .config_manager
        .set_global_config_value(config_keys::HORIZON_DAYS, "5")
        .unwrap();

    // 窗口天数取配置值
    let summary = api
        .generate_horizon(&[ProcessSpec::new("P", 1)], None, Some(ymd(2025, 1, 1)))
        .await
        .unwrap();
    assert_eq!(summary.inserted, 5);

    // 剩余工时 [0, 1, 1, 1, 0.75]
    api.commit_capacity("P", ymd(2025, 1, 1), 1.0).await.unwrap();
    api.commit_capacity("P", ymd(2025, 1, 5), 0.25).await.unwrap();

    // 默认最小余量 0.5
    assert_eq!(
        api.latest_feasible_date("P", ymd(2025, 1, 5), None).await.unwrap(),
        Some(ymd(2025, 1, 5))
    );

    state
        .config_manager
        .set_global_config_value(config_keys::MIN_SLACK_HOURS, "0.8")
        .unwrap();
    assert_eq!(
        api.latest_feasible_date("P", ymd(2025, 1, 5), None).await.unwrap(),
        Some(ymd(2025, 1, 4))
    );

    // 显式参数优先于配置
    assert_eq!(
        api.latest_feasible_date("P", ymd(2025, 1, 5), Some(0.0)).await.unwrap(),
        Some(ymd(2025, 1, 5))
    );
    assert!(api
        .latest_feasible_date("P", ymd(2025, 1, 5), Some(-1.0))
        .await
        .is_err());
}
