// ==========================================
// 工序产能台账 - 输入校验
// ==========================================
// 职责: 在访问存储之前拒绝非法输入（ValidationError / InvalidInput）
// ==========================================

use chrono::NaiveDate;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::capacity::ProcessSpec;

/// 单次生成的最大窗口天数
pub const MAX_HORIZON_DAYS: u32 = 3_660;

/// 工序名称不能为空白; 返回去除首尾空白后的名称
pub fn validate_process_name(process_name: &str) -> ApiResult<String> {
    let trimmed = process_name.trim();
    if trimmed.is_empty() {
        return Err(ApiError::ValidationError("工序名称不能为空".to_string()));
    }
    Ok(trimmed.to_string())
}

/// 工时必须为非负有限数
pub fn validate_hours(field: &str, hours: f64) -> ApiResult<()> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(ApiError::ValidationError(format!(
            "{}必须为非负有限数: {}",
            field, hours
        )));
    }
    Ok(())
}

/// 可选工时（None 合法）
pub fn validate_optional_hours(field: &str, hours: Option<f64>) -> ApiResult<()> {
    match hours {
        Some(h) => validate_hours(field, h),
        None => Ok(()),
    }
}

/// 起止日期不能倒置
pub fn validate_date_window(start: NaiveDate, end: NaiveDate) -> ApiResult<()> {
    if start > end {
        return Err(ApiError::InvalidInput(format!(
            "日期范围倒置: {} > {}",
            start, end
        )));
    }
    Ok(())
}

/// 窗口天数 1..=MAX_HORIZON_DAYS
pub fn validate_horizon_days(horizon_days: u32) -> ApiResult<()> {
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(ApiError::InvalidInput(format!(
            "窗口天数必须在 1..={} 之间: {}",
            MAX_HORIZON_DAYS, horizon_days
        )));
    }
    Ok(())
}

/// 工序列表: 非空、名称非空白、工位数非负、名称不重复
pub fn validate_process_specs(processes: &[ProcessSpec]) -> ApiResult<Vec<ProcessSpec>> {
    if processes.is_empty() {
        return Err(ApiError::ValidationError("工序列表不能为空".to_string()));
    }

    let mut normalized: Vec<ProcessSpec> = Vec::with_capacity(processes.len());
    for spec in processes {
        let name = validate_process_name(&spec.process_name)?;
        if spec.available_workstations < 0 {
            return Err(ApiError::ValidationError(format!(
                "工序{}的工位数不能为负: {}",
                name, spec.available_workstations
            )));
        }
        if normalized.iter().any(|p| p.process_name == name) {
            return Err(ApiError::ValidationError(format!("工序重复: {}", name)));
        }
        normalized.push(ProcessSpec::new(name, spec.available_workstations));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name() {
        assert_eq!(validate_process_name("  焊接 ").unwrap(), "焊接");
        assert!(matches!(
            validate_process_name("   "),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_hours() {
        assert!(validate_hours("工时", 0.0).is_ok());
        assert!(validate_hours("工时", -0.1).is_err());
        assert!(validate_hours("工时", f64::NAN).is_err());
        assert!(validate_optional_hours("加班", None).is_ok());
    }

    #[test]
    fn test_process_specs() {
        let ok = validate_process_specs(&[ProcessSpec::new(" P ", 2), ProcessSpec::new("Q", 0)])
            .unwrap();
        assert_eq!(ok[0].process_name, "P");

        assert!(validate_process_specs(&[]).is_err());
        assert!(validate_process_specs(&[ProcessSpec::new("P", -1)]).is_err());
        assert!(validate_process_specs(&[ProcessSpec::new("P", 1), ProcessSpec::new("P ", 2)]).is_err());
    }

    #[test]
    fn test_windows() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert!(validate_date_window(a, b).is_ok());
        assert!(validate_date_window(b, a).is_err());
        assert!(validate_horizon_days(0).is_err());
        assert!(validate_horizon_days(120).is_ok());
    }
}
