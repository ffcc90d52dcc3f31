// ==========================================
// 工序产能台账 - 工作日历导入
// ==========================================
// 格式: CSV, 表头 calendar_date,is_workday,standard_work_hours
// 规则: 逐行校验, 非法行跳过并记录原因, 合法行单事务写入
// ==========================================

use crate::domain::calendar::CalendarDay;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::calendar_repo::WorkCalendarRepository;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const COL_DATE: &str = "calendar_date";
const COL_WORKDAY: &str = "is_workday";
const COL_HOURS: &str = "standard_work_hours";

/// 被跳过的行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub line: u64, // 文件行号（表头为第 1 行）
    pub reason: String,
}

/// 日历导入结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedLine>,
}

// ==========================================
// WorkCalendarImporter - 工作日历导入器
// ==========================================
pub struct WorkCalendarImporter {
    calendar_repo: Arc<WorkCalendarRepository>,
}

impl WorkCalendarImporter {
    pub fn new(calendar_repo: Arc<WorkCalendarRepository>) -> Self {
        Self { calendar_repo }
    }

    /// 从 CSV 文件导入
    pub fn import_from_csv<P: AsRef<Path>>(&self, path: P) -> ImportResult<CalendarImportReport> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        if let Some(ext) = path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(path)?;
        let report = self.import_from_reader(file)?;
        info!(
            path = %path.display(),
            imported = report.imported,
            skipped = report.skipped.len(),
            "工作日历导入完成"
        );
        Ok(report)
    }

    /// 从任意 reader 导入（同一日期多次出现时以最后一行为准）
    pub fn import_from_reader<R: Read>(&self, reader: R) -> ImportResult<CalendarImportReport> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &str| -> ImportResult<usize> {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| ImportError::MissingColumn(name.to_string()))
        };
        let date_idx = column(COL_DATE)?;
        let workday_idx = column(COL_WORKDAY)?;
        let hours_idx = column(COL_HOURS)?;

        let mut report = CalendarImportReport::default();
        let mut days = Vec::new();

        for result in reader.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            // 跳过完全空白的行
            if record.iter().all(|v| v.is_empty()) {
                continue;
            }

            let parsed = parse_calendar_row(
                record.get(date_idx).unwrap_or(""),
                record.get(workday_idx).unwrap_or(""),
                record.get(hours_idx).unwrap_or(""),
            );
            match parsed {
                Ok(day) => days.push(day),
                Err(reason) => {
                    warn!(line, %reason, "日历行跳过");
                    report.skipped.push(SkippedLine { line, reason });
                }
            }
        }

        self.calendar_repo.upsert_batch(&days)?;
        report.imported = days.len();
        Ok(report)
    }
}

/// 解析单行; Err 为跳过原因
fn parse_calendar_row(date: &str, workday: &str, hours: &str) -> Result<CalendarDay, String> {
    let calendar_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("日期格式错误, 期望 YYYY-MM-DD: '{}'", date))?;
    let is_workday = parse_workday_flag(workday)
        .ok_or_else(|| format!("工作日标志无法识别: '{}'", workday))?;

    let standard_work_hours = if hours.is_empty() {
        None
    } else {
        let value: f64 = hours
            .parse()
            .map_err(|_| format!("标准工时不是数字: '{}'", hours))?;
        if !value.is_finite() || !(0.0..=24.0).contains(&value) {
            return Err(format!("标准工时超出范围 [0, 24]: {}", value));
        }
        Some(value)
    };

    if is_workday && standard_work_hours.is_none() {
        return Err("工作日缺少标准工时".to_string());
    }

    Ok(CalendarDay {
        calendar_date,
        is_workday,
        standard_work_hours,
    })
}

fn parse_workday_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "y" | "yes" => Some(true),
        "0" | "false" | "n" | "no" => Some(false),
        "是" => Some(true),
        "否" => Some(false),
        _ => None,
    }
}
