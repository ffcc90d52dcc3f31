// ==========================================
// 工序产能台账 - 导入模块
// ==========================================
// 职责: 外部数据文件导入（工作日历 CSV）
// ==========================================

pub mod calendar_importer;
pub mod error;

pub use calendar_importer::{CalendarImportReport, SkippedLine, WorkCalendarImporter};
pub use error::{ImportError, ImportResult};
