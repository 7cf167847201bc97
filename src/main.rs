use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use guobu_lib::config::{get_config_path, load_config, save_config};
use guobu_lib::models::RunReport;
use guobu_lib::{run_command, Command, Step};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "guobu")]
#[command(about = "国补订单登记与垫资款二次登记工具", version)]
struct Cli {
    /// 配置文件路径（默认使用用户配置目录下的 guobu/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖配置中的工作目录
    #[arg(long, global = true)]
    work_dir: Option<String>,

    /// 以 JSON 输出运行结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行登记流程（0=全部，1-5=单个步骤）
    Run {
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=5))]
        step: u8,
    },
    /// 二次登记：按店铺回填国补表
    Reconcile {
        /// 店铺序号（见 shops 命令）
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        shop: u32,
        /// 并行线程数
        #[arg(long)]
        workers: Option<usize>,
    },
    /// 列出可选店铺
    Shops,
    /// 显示当前配置
    Config {
        /// 把当前配置写入配置文件
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = load_config(cli.config.as_deref());
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }

    match cli.command {
        Commands::Run { step } => {
            let step = Step::from_number(step).ok_or_else(|| anyhow!("无效的步骤: {}", step))?;
            let report = run_command(&config, &Command::Run(step))?;
            print_report(&report, cli.json)?;
            Ok(report.success())
        }
        Commands::Reconcile { shop, workers } => {
            let command = Command::Reconcile {
                shop: shop as usize,
                workers,
            };
            let report = run_command(&config, &command)?;
            print_report(&report, cli.json)?;
            Ok(report.success())
        }
        Commands::Shops => {
            for (i, shop) in config.shops.iter().enumerate() {
                println!("{}. {}", i + 1, shop);
            }
            Ok(true)
        }
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                let path = save_config(&config, cli.config.as_deref())?;
                println!("配置已保存: {}", path.display());
            } else if cli.config.is_none() {
                println!("配置文件: {}", get_config_path().display());
            }
            Ok(true)
        }
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match report {
        RunReport::Pipeline { steps } => {
            for step in steps {
                let mark = if step.success { "成功" } else { "失败" };
                println!("步骤{} {}：{} {}", step.step, step.title, mark, step.message);
                for failure in &step.failures {
                    println!("  - {}: {}", failure.file, failure.error);
                }
                for output in &step.outputs {
                    println!("  输出: {}", output.written_path().display());
                }
            }
        }
        RunReport::Reconcile(report) => {
            println!("店铺：{}", report.shop);
            println!("表1 {} 行，表2 {} 行", report.ledger_rows, report.order_rows);
            for (status, count) in &report.status_counts {
                println!("  {}: {}", status, count);
            }
            if report.skipped_fills > 0 {
                println!(
                    "  重复回填已跳过: {}（表1行号: {:?}）",
                    report.skipped_fills, report.skipped_rows
                );
            }
            for output in &report.outputs {
                println!("  输出: {}", output.written_path().display());
            }
        }
    }
    Ok(())
}
