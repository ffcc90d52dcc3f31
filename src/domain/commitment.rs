// ==========================================
// 工序产能台账 - 产能占用来源
// ==========================================
// 占用工时的权威定义: 所有来源中 (工序, 日期) 匹配行的承诺工时之和
// 新增计划类别 = 新增一个枚举变体, 对账算法不变
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 占用来源类别 (Commitment Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitmentSource {
    SalesOrder,      // 销售订单工序计划
    StockUp,         // 备库工序计划
    Rework,          // 返修工序计划
    TrialProduction, // 试制工序计划
}

impl CommitmentSource {
    /// 对账时遍历的固定来源列表
    pub const ALL: [CommitmentSource; 4] = [
        CommitmentSource::SalesOrder,
        CommitmentSource::StockUp,
        CommitmentSource::Rework,
        CommitmentSource::TrialProduction,
    ];

    /// 来源对应的工序计划表
    pub fn table_name(&self) -> &'static str {
        match self {
            CommitmentSource::SalesOrder => "process_plan_sales_order",
            CommitmentSource::StockUp => "process_plan_stock_up",
            CommitmentSource::Rework => "process_plan_rework",
            CommitmentSource::TrialProduction => "process_plan_trial",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentSource::SalesOrder => "SALES_ORDER",
            CommitmentSource::StockUp => "STOCK_UP",
            CommitmentSource::Rework => "REWORK",
            CommitmentSource::TrialProduction => "TRIAL_PRODUCTION",
        }
    }
}

impl fmt::Display for CommitmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CommitmentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SALES_ORDER" => Ok(CommitmentSource::SalesOrder),
            "STOCK_UP" => Ok(CommitmentSource::StockUp),
            "REWORK" => Ok(CommitmentSource::Rework),
            "TRIAL_PRODUCTION" => Ok(CommitmentSource::TrialProduction),
            other => Err(format!("未知占用来源: {}", other)),
        }
    }
}

// ==========================================
// Commitment - 工序计划占用记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub commitment_id: i64, // 自增ID（即插入顺序）
    pub source: CommitmentSource,
    pub process_name: String,
    pub plan_date: NaiveDate,
    pub committed_hours: f64,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip_through_str() {
        for source in CommitmentSource::ALL {
            assert_eq!(source.as_str().parse::<CommitmentSource>().unwrap(), source);
        }
        assert!("UNKNOWN".parse::<CommitmentSource>().is_err());
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut names: Vec<_> = CommitmentSource::ALL.iter().map(|s| s.table_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CommitmentSource::ALL.len());
    }
}
