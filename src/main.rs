// ==========================================
// 工序产能台账 - 管理命令行入口
// ==========================================
// 用法:
//   capacity-ledger [--db <path>] <command> [args...]
//
// 命令:
//   init                          建库（幂等）
//   generate <days> <proc:ws>...  生成/扩展台账窗口（从今天开始）
//   refresh-shift                 按工作日历刷新班次工时
//   recompute                     全表重算剩余工时
//   reconcile-all                 全量对账
//   import-calendar <csv>         导入工作日历
//   purge [YYYY-MM-DD]            清理早于该日期的台账（缺省按配置保留天数）
//   show <proc> <from> <to>       查看台账
// ==========================================

use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use process_capacity_ledger::app::{get_default_db_path, AppState};
use process_capacity_ledger::domain::ProcessSpec;
use process_capacity_ledger::logging;
use serde::Serialize;
use std::path::PathBuf;

const USAGE: &str = "用法: capacity-ledger [--db <path>] <init|generate|refresh-shift|recompute|reconcile-all|import-calendar|purge|show> [args...]";

#[derive(Debug, PartialEq)]
enum Command {
    Init,
    Generate {
        horizon_days: u32,
        processes: Vec<ProcessSpec>,
    },
    RefreshShift,
    Recompute,
    ReconcileAll,
    ImportCalendar(PathBuf),
    Purge(Option<NaiveDate>),
    Show {
        process_name: String,
        from: NaiveDate,
        to: NaiveDate,
    },
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("日期格式错误（应为YYYY-MM-DD）: {}", raw))
}

/// `名称:工位数`, 名称中允许出现冒号（以最后一个为准）
fn parse_process_spec(raw: &str) -> anyhow::Result<ProcessSpec> {
    let (name, ws) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("工序参数格式错误（应为 名称:工位数）: {}", raw))?;
    let ws: i64 = ws
        .trim()
        .parse()
        .with_context(|| format!("工位数不是整数: {}", raw))?;
    Ok(ProcessSpec::new(name.trim(), ws))
}

/// 解析参数, 返回 (db_path, command)
fn parse_args(args: &[String]) -> anyhow::Result<(Option<String>, Command)> {
    let mut db_path = None;
    let mut rest = args;
    if rest.first().map(String::as_str) == Some("--db") {
        let path = rest.get(1).ok_or_else(|| anyhow!("--db 缺少路径"))?;
        db_path = Some(path.clone());
        rest = &rest[2..];
    }

    let (cmd, params) = rest.split_first().ok_or_else(|| anyhow!(USAGE))?;
    let command = match cmd.as_str() {
        "init" => Command::Init,
        "generate" => {
            let (days, specs) = params
                .split_first()
                .ok_or_else(|| anyhow!("generate 需要 <days> <proc:ws>..."))?;
            let horizon_days: u32 = days
                .parse()
                .with_context(|| format!("天数不是正整数: {}", days))?;
            if specs.is_empty() {
                bail!("generate 至少需要一个 <proc:ws>");
            }
            let processes = specs
                .iter()
                .map(|s| parse_process_spec(s))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Command::Generate {
                horizon_days,
                processes,
            }
        }
        "refresh-shift" => Command::RefreshShift,
        "recompute" => Command::Recompute,
        "reconcile-all" => Command::ReconcileAll,
        "import-calendar" => {
            let path = params
                .first()
                .ok_or_else(|| anyhow!("import-calendar 需要 CSV 路径"))?;
            Command::ImportCalendar(PathBuf::from(path))
        }
        "purge" => Command::Purge(params.first().map(|d| parse_date(d)).transpose()?),
        "show" => match params {
            [process_name, from, to] => Command::Show {
                process_name: process_name.clone(),
                from: parse_date(from)?,
                to: parse_date(to)?,
            },
            _ => bail!("show 需要 <proc> <from> <to>"),
        },
        other => bail!("未知命令: {}\n{}", other, USAGE),
    };
    Ok((db_path, command))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, command) = parse_args(&args)?;
    let db_path = db_path.unwrap_or_else(get_default_db_path);

    tracing::info!(
        version = process_capacity_ledger::VERSION,
        db_path = %db_path,
        "{}",
        process_capacity_ledger::APP_NAME
    );

    let state = AppState::new(db_path)?;
    let api = state.capacity_api.clone();

    match command {
        Command::Init => println!("ok"),
        Command::Generate {
            horizon_days,
            processes,
        } => print_json(&api.generate_horizon(&processes, Some(horizon_days), None).await?)?,
        Command::RefreshShift => print_json(&api.refresh_shift_hours().await?)?,
        Command::Recompute => print_json(&api.recompute_remaining().await?)?,
        Command::ReconcileAll => print_json(&api.reconcile_all_capacity().await?)?,
        Command::ImportCalendar(path) => print_json(&api.import_work_calendar(path).await?)?,
        Command::Purge(cutoff) => print_json(&api.purge_before(cutoff).await?)?,
        Command::Show {
            process_name,
            from,
            to,
        } => print_json(&api.list_capacity_days(&process_name, from, to).await?)?,
    }

    drop(api);
    state.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_generate() {
        let (db, cmd) = parse_args(&args(&["--db", "x.db", "generate", "30", "焊接:2", "a:b:1"])).unwrap();
        assert_eq!(db.as_deref(), Some("x.db"));
        assert_eq!(
            cmd,
            Command::Generate {
                horizon_days: 30,
                processes: vec![ProcessSpec::new("焊接", 2), ProcessSpec::new("a:b", 1)],
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["generate", "30"])).is_err());
        assert!(parse_args(&args(&["generate", "30", "P"])).is_err());
        assert!(parse_args(&args(&["purge", "2025-02-30"])).is_err());
        assert!(parse_args(&args(&["bogus"])).is_err());
    }

    #[test]
    fn test_parse_purge_and_show() {
        let (_, cmd) = parse_args(&args(&["purge"])).unwrap();
        assert_eq!(cmd, Command::Purge(None));

        let (_, cmd) = parse_args(&args(&["show", "P", "2025-01-01", "2025-01-05"])).unwrap();
        assert!(matches!(cmd, Command::Show { ref process_name, .. } if process_name == "P"));
    }
}
