// ==========================================
// 工序产能台账 - 占用一致性引擎
// ==========================================
// 两种策略, 相同占用状态下必须收敛到同一 occupied_hours:
// - 增量: debit / credit（占用记录创建/删除时的同步快路径）
// - 对账: reconcile / reconcile_all（按所有来源重算, 派生缓存不一致时同时修复）
// 事务: 单行变更一个事务, 失败回滚并向上传播;
//       全量对账逐行保存点, 单行失败记录日志后跳过
// 并发: 读后写使用 BEGIN IMMEDIATE, 同键并发由 SQLite 写锁串行化
// ==========================================

use crate::db::LedgerStore;
use crate::domain::capacity::hours_eq;
use crate::domain::commitment::{Commitment, CommitmentSource};
use crate::domain::types::{LedgerMutationOutcome, ReconcileAllSummary, ReconcileOutcome};
use crate::repository::capacity_repo::{parse_plan_date, CapacityDayRepository};
use crate::repository::commitment_repo::{sum_all_sources, CommitmentRepository};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::reconcile_log_repo::ReconcileLogRepository;
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeltaKind {
    Debit,
    Credit,
}

/// 占用记录创建结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRecorded {
    pub commitment_id: i64,
    pub ledger: LedgerMutationOutcome,
}

/// 占用记录删除结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRemoved {
    pub commitment: Commitment,
    pub ledger: LedgerMutationOutcome,
}

// ==========================================
// CommitmentConsistencyEngine - 占用一致性引擎
// ==========================================
pub struct CommitmentConsistencyEngine {
    conn: LedgerStore,
}

impl CommitmentConsistencyEngine {
    pub fn new(conn: LedgerStore) -> Self {
        Self { conn }
    }

    fn lock_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 增量
    // ==========================================

    /// 占用工时增加 delta
    ///
    /// # 返回
    /// - Applied: 已写入
    /// - ZeroDelta: delta 为 0, 未访问存储
    /// - NotFound: 台账行不存在, 未写入
    #[instrument(skip(self))]
    pub fn debit(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        delta: f64,
    ) -> RepositoryResult<LedgerMutationOutcome> {
        self.apply_delta(process_name, plan_date, delta, DeltaKind::Debit)
    }

    /// 占用工时减少 delta（下限为 0）
    #[instrument(skip(self))]
    pub fn credit(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        delta: f64,
    ) -> RepositoryResult<LedgerMutationOutcome> {
        self.apply_delta(process_name, plan_date, delta, DeltaKind::Credit)
    }

    fn apply_delta(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
        delta: f64,
        kind: DeltaKind,
    ) -> RepositoryResult<LedgerMutationOutcome> {
        validate_delta(delta)?;
        if hours_eq(delta, 0.0) {
            return Ok(LedgerMutationOutcome::ZeroDelta);
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_delta_tx(&tx, process_name, plan_date, delta, kind)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// 新建占用记录并同步扣减台账（同一事务）
    ///
    /// 台账行不存在时记录仍会写入, ledger 结果为 NotFound, 由后续对账补齐。
    #[instrument(skip(self))]
    pub fn record_commitment(
        &self,
        source: CommitmentSource,
        process_name: &str,
        plan_date: NaiveDate,
        committed_hours: f64,
    ) -> RepositoryResult<CommitmentRecorded> {
        validate_delta(committed_hours)?;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let commitment_id =
            CommitmentRepository::insert_tx(&tx, source, process_name, plan_date, committed_hours)?;
        let ledger = if hours_eq(committed_hours, 0.0) {
            LedgerMutationOutcome::ZeroDelta
        } else {
            apply_delta_tx(&tx, process_name, plan_date, committed_hours, DeltaKind::Debit)?
        };
        tx.commit()?;

        Ok(CommitmentRecorded {
            commitment_id,
            ledger,
        })
    }

    /// 删除占用记录并同步释放台账（同一事务）
    ///
    /// # 返回
    /// - Ok(None): 记录不存在
    #[instrument(skip(self))]
    pub fn remove_commitment(
        &self,
        source: CommitmentSource,
        commitment_id: i64,
    ) -> RepositoryResult<Option<CommitmentRemoved>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(commitment) = CommitmentRepository::delete_tx(&tx, source, commitment_id)? else {
            return Ok(None);
        };
        let ledger = if hours_eq(commitment.committed_hours, 0.0) {
            LedgerMutationOutcome::ZeroDelta
        } else {
            apply_delta_tx(
                &tx,
                &commitment.process_name,
                commitment.plan_date,
                commitment.committed_hours,
                DeltaKind::Credit,
            )?
        };
        tx.commit()?;

        Ok(Some(CommitmentRemoved { commitment, ledger }))
    }

    // ==========================================
    // 对账
    // ==========================================

    /// 单行对账: occupied := 所有来源承诺工时之和
    ///
    /// 占用值变化或派生字段（剩余工时/剩余班次）与权威字段不一致时写入。
    /// 返回的 changed 只反映占用工时是否变化, 仅修复派生缓存时为 false。
    #[instrument(skip(self))]
    pub fn reconcile(
        &self,
        process_name: &str,
        plan_date: NaiveDate,
    ) -> RepositoryResult<ReconcileOutcome> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = reconcile_tx(&tx, process_name, plan_date)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// 全量对账（尽力而为）
    ///
    /// # 说明
    /// - 每行一个保存点, 单行失败回滚该行、记录日志、计入 failed 后继续
    /// - 成功的行随外层事务一起提交
    /// - 每次运行写入一条 capacity_reconcile_log
    #[instrument(skip(self))]
    pub fn reconcile_all(&self) -> RepositoryResult<ReconcileAllSummary> {
        let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut summary = ReconcileAllSummary {
            run_id: Uuid::new_v4().to_string(),
            ..Default::default()
        };

        let mut conn = self.lock_conn()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for (process_name, raw_date) in CapacityDayRepository::list_raw_keys_tx(&tx)? {
            summary.scanned += 1;
            let sp = tx.savepoint()?;
            let result = parse_plan_date(&raw_date)
                .and_then(|plan_date| reconcile_tx(&sp, &process_name, plan_date));

            match result {
                Ok(ReconcileOutcome::Reconciled {
                    changed: true,
                    previous,
                    updated,
                }) => {
                    sp.commit()?;
                    summary.updated += 1;
                    summary.net_hours_released += previous - updated;
                }
                Ok(_) => sp.commit()?,
                Err(e) => {
                    warn!(
                        process = %process_name,
                        date = %raw_date,
                        error = %e,
                        "产能日对账失败, 跳过"
                    );
                    summary.failed += 1;
                }
            }
        }

        let finished_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        ReconcileLogRepository::insert_tx(&tx, &started_at, &finished_at, &summary)?;
        tx.commit()?;

        info!(
            run_id = %summary.run_id,
            scanned = summary.scanned,
            updated = summary.updated,
            failed = summary.failed,
            net_hours_released = summary.net_hours_released,
            "全量对账完成"
        );
        Ok(summary)
    }
}

fn validate_delta(delta: f64) -> RepositoryResult<()> {
    if !delta.is_finite() || delta < 0.0 {
        return Err(RepositoryError::ValidationError(format!(
            "工时必须为非负有限数: {}",
            delta
        )));
    }
    Ok(())
}

fn apply_delta_tx(
    conn: &Connection,
    process_name: &str,
    plan_date: NaiveDate,
    delta: f64,
    kind: DeltaKind,
) -> RepositoryResult<LedgerMutationOutcome> {
    let Some(mut day) = CapacityDayRepository::find_by_key_tx(conn, process_name, plan_date)? else {
        warn!(process = process_name, date = %plan_date, ?kind, "台账行不存在, 跳过增量更新");
        return Ok(LedgerMutationOutcome::NotFound);
    };

    let previous_occupied_hours = day.occupied_hours;
    match kind {
        DeltaKind::Debit => day.apply_debit(delta),
        DeltaKind::Credit => day.apply_credit(delta),
    }
    CapacityDayRepository::update_occupied_tx(conn, &day)?;

    debug!(
        process = process_name,
        date = %plan_date,
        ?kind,
        delta,
        previous = previous_occupied_hours,
        occupied = day.occupied_hours,
        "台账占用已更新"
    );

    Ok(LedgerMutationOutcome::Applied {
        previous_occupied_hours,
        occupied_hours: day.occupied_hours,
        remaining_hours: day.remaining_hours,
    })
}

fn reconcile_tx(
    conn: &Connection,
    process_name: &str,
    plan_date: NaiveDate,
) -> RepositoryResult<ReconcileOutcome> {
    let Some(mut day) = CapacityDayRepository::find_by_key_tx(conn, process_name, plan_date)? else {
        return Ok(ReconcileOutcome::NotFound);
    };

    let authoritative = sum_all_sources(conn, process_name, plan_date)?;
    let derived_stale = !day.is_derived_consistent();
    let previous = day.set_occupied(authoritative);
    let changed = !hours_eq(previous, day.occupied_hours);

    if changed || derived_stale {
        CapacityDayRepository::update_occupied_tx(conn, &day)?;
    }
    if changed {
        debug!(
            process = process_name,
            date = %plan_date,
            previous,
            updated = day.occupied_hours,
            "对账修正占用工时"
        );
    }

    Ok(ReconcileOutcome::Reconciled {
        changed,
        previous,
        updated: day.occupied_hours,
    })
}
