// ==========================================
// 工作日历导入集成测试
// ==========================================
// 流程: 导入 CSV → 生成台账 → 修改日历重新导入 → 刷新班次
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use std::io::Write;

use process_capacity_ledger::api::ApiError;
use process_capacity_ledger::app::AppState;
use process_capacity_ledger::domain::ProcessSpec;
use tempfile::{Builder, NamedTempFile};
use test_helpers::{create_test_db, ymd};

fn write_csv(content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_import_generate_and_refresh() {
    let (_temp_db, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.capacity_api.clone();

    let csv = write_csv(
        "calendar_date,is_workday,standard_work_hours\n\
         2025-03-03,1,8\n\
         2025-03-04,是,7.5\n\
         2025-03-05,0,\n\
         2025-03-06,maybe,8\n\
         2025-03-07,1,30\n",
    );
    let report = api.import_work_calendar(csv.path().to_path_buf()).await.unwrap();
    assert_eq!(report.imported, 3);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].line, 5);
    assert_eq!(report.skipped[1].line, 6);

    api.generate_horizon(&[ProcessSpec::new("装配", 2)], Some(4), Some(ymd(2025, 3, 3)))
        .await
        .unwrap();

    let rows = api
        .list_capacity_days("装配", ymd(2025, 3, 3), ymd(2025, 3, 6))
        .await
        .unwrap();
    let shifts: Vec<Option<f64>> = rows.iter().map(|r| r.shift_hours).collect();
    assert_eq!(shifts, vec![Some(8.0), Some(7.5), None, None]);
    assert_eq!(rows[1].remaining_hours, 15.0);
    assert_eq!(rows[2].remaining_hours, 0.0);

    // 日历变更: 3/5 调为工作日, 3/3 缩短工时
    api.commit_capacity("装配", ymd(2025, 3, 3), 4.0).await.unwrap();
    let csv = write_csv(
        "calendar_date,is_workday,standard_work_hours\n\
         2025-03-03,true,6\n\
         2025-03-05,yes,8\n",
    );
    let report = api.import_work_calendar(csv.path().to_path_buf()).await.unwrap();
    assert_eq!(report.imported, 2);
    assert!(report.skipped.is_empty());

    let refreshed = api.refresh_shift_hours().await.unwrap();
    assert_eq!(refreshed.updated, 2);

    let day3 = api.get_capacity_day("装配", ymd(2025, 3, 3)).await.unwrap().unwrap();
    assert_eq!(day3.shift_hours, Some(6.0));
    assert_eq!(day3.occupied_hours, 4.0);
    assert_eq!(day3.remaining_hours, 8.0);
    assert_eq!(day3.remaining_shift, Some(4.0));

    let day5 = api.get_capacity_day("装配", ymd(2025, 3, 5)).await.unwrap().unwrap();
    assert_eq!(day5.shift_hours, Some(8.0));
    assert_eq!(day5.remaining_hours, 16.0);
}

#[tokio::test]
async fn test_import_rejects_bad_files() {
    let (_temp_db, db_path) = create_test_db().unwrap();
    let state = AppState::new(db_path).unwrap();
    let api = state.capacity_api.clone();

    let missing = api
        .import_work_calendar("/nonexistent/calendar.csv".into())
        .await;
    assert!(matches!(missing, Err(ApiError::ImportError(_))));

    let no_column = write_csv("calendar_date,is_workday\n2025-03-03,1\n");
    let result = api.import_work_calendar(no_column.path().to_path_buf()).await;
    assert!(matches!(result, Err(ApiError::ImportError(_))));

    let mut wrong_ext = Builder::new().suffix(".xlsx").tempfile().unwrap();
    wrong_ext.write_all(b"irrelevant").unwrap();
    let result = api.import_work_calendar(wrong_ext.path().to_path_buf()).await;
    assert!(matches!(result, Err(ApiError::ImportError(_))));
}
