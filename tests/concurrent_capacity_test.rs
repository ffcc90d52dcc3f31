// ==========================================
// 并发占用测试
// ==========================================
// 场景: 多个独立连接同时对同一 (工序, 日期) 创建占用记录
// 期望: 不丢失更新, 增量结果与对账结果一致
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_capacity_test {
    use std::sync::Arc;
    use std::thread;

    use process_capacity_ledger::db::open_ledger_store;
    use process_capacity_ledger::domain::{CommitmentSource, ProcessSpec, ReconcileOutcome};
    use process_capacity_ledger::engine::{CapacityHorizonInitializer, CommitmentConsistencyEngine};
    use process_capacity_ledger::repository::{CapacityDayRepository, WorkCalendarRepository};

    use crate::test_helpers::{create_test_db, ymd};

    const THREADS: usize = 4;
    const COMMITS_PER_THREAD: usize = 20;

    #[test]
    fn test_concurrent_commitments_do_not_lose_updates() {
        process_capacity_ledger::logging::init_test();
        let (_temp_file, db_path) = create_test_db().unwrap();
        let date = ymd(2025, 1, 1);

        // 主线程准备台账行（日历缺失, 班次为空, 剩余工时为负也允许）
        {
            let store = open_ledger_store(&db_path).unwrap();
            let calendar = Arc::new(WorkCalendarRepository::from_connection(store.clone()));
            let initializer = CapacityHorizonInitializer::new(store, calendar);
            initializer
                .generate_horizon(&[ProcessSpec::new("P", 4)], 1, date)
                .unwrap();
        }

        // 每个线程一个独立存储句柄, 在主线程依次打开
        let stores: Vec<_> = (0..THREADS)
            .map(|_| open_ledger_store(&db_path).unwrap())
            .collect();

        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(i, store)| {
                thread::spawn(move || {
                    let engine = CommitmentConsistencyEngine::new(store);
                    let source = CommitmentSource::ALL[i % CommitmentSource::ALL.len()];
                    for _ in 0..COMMITS_PER_THREAD {
                        let recorded = engine.record_commitment(source, "P", date, 1.0).unwrap();
                        assert!(recorded.ledger.is_applied());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let store = open_ledger_store(&db_path).unwrap();
        let repo = CapacityDayRepository::from_connection(store.clone());
        let row = repo.find_by_key("P", date).unwrap().unwrap();
        let expected = (THREADS * COMMITS_PER_THREAD) as f64;
        assert_eq!(row.occupied_hours, expected);
        assert!(row.is_derived_consistent());

        let engine = CommitmentConsistencyEngine::new(store);
        assert_eq!(
            engine.reconcile("P", date).unwrap(),
            ReconcileOutcome::Reconciled {
                changed: false,
                previous: expected,
                updated: expected
            }
        );
    }
}
