pub mod columns;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod excel_parser;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod spec_match;
pub mod table;
pub mod writer;

use anyhow::{anyhow, Context, Result};
use columns::{BATCH, FILL_COLUMNS, SHOP_SUBJECT};
use data_processor::{
    build_product_summary, create_registration, format_registration, match_specifications,
    merge_shop_exports, LEDGER_FILE,
};
use excel_parser::{read_table, ReadOptions};
use log::{error, info};
use models::{AppConfig, ReconcileReport, RunReport, StepReport};
use std::thread;
use table::Table;
use writer::{write_table, WriteOptions};

/// 国补表的表头在第 2 行（第 1 行是标题）
const ORDERS_HEADER_ROW: usize = 1;

/// 流程步骤，0 表示依次执行全部步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    All,
    ProductNames,
    ShopExports,
    Registration,
    Specifications,
    Format,
}

impl Step {
    pub const STAGES: [Step; 5] = [
        Step::ProductNames,
        Step::ShopExports,
        Step::Registration,
        Step::Specifications,
        Step::Format,
    ];

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            0 => Some(Step::All),
            1 => Some(Step::ProductNames),
            2 => Some(Step::ShopExports),
            3 => Some(Step::Registration),
            4 => Some(Step::Specifications),
            5 => Some(Step::Format),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Step::All => 0,
            Step::ProductNames => 1,
            Step::ShopExports => 2,
            Step::Registration => 3,
            Step::Specifications => 4,
            Step::Format => 5,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::All => "执行全部步骤",
            Step::ProductNames => "处理3c商品表",
            Step::ShopExports => "处理抖音店铺文件",
            Step::Registration => "比对并生成结果",
            Step::Specifications => "匹配名称及规格",
            Step::Format => "整理表格格式",
        }
    }
}

/// 一次运行的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Step),
    /// 二次登记，shop 为 1 开始的店铺序号
    Reconcile { shop: usize, workers: Option<usize> },
}

pub fn run_command(config: &AppConfig, command: &Command) -> Result<RunReport> {
    match command {
        Command::Run(step) => Ok(RunReport::Pipeline {
            steps: run_pipeline(config, *step),
        }),
        Command::Reconcile { shop, workers } => {
            Ok(RunReport::Reconcile(run_reconcile(config, *shop, *workers)?))
        }
    }
}

/// 执行单个步骤
pub fn run_step(config: &AppConfig, step: Step) -> Result<StepReport> {
    let mut report = StepReport::new(step.number(), step.title());
    match step {
        Step::ProductNames => build_product_summary(config, &mut report)?,
        Step::ShopExports => merge_shop_exports(config, &mut report)?,
        Step::Registration => create_registration(config, &mut report)?,
        Step::Specifications => match_specifications(config, &mut report)?,
        Step::Format => format_registration(config, &mut report)?,
        Step::All => {
            return Err(anyhow!("步骤 0 需要通过 run_pipeline 执行"));
        }
    }
    Ok(report)
}

/// 执行一个或全部步骤；某一步失败时记录下来，后续步骤照常执行
pub fn run_pipeline(config: &AppConfig, step: Step) -> Vec<StepReport> {
    let stages: Vec<Step> = match step {
        Step::All => Step::STAGES.to_vec(),
        single => vec![single],
    };

    let mut reports = Vec::new();
    for stage in stages {
        info!("===== 步骤{}：{} =====", stage.number(), stage.title());
        let report = match run_step(config, stage) {
            Ok(report) => {
                info!("步骤{}完成：{}", stage.number(), report.message);
                report
            }
            Err(e) => {
                error!("步骤{}执行失败: {:#}", stage.number(), e);
                StepReport::failed(stage.number(), stage.title(), format!("{:#}", e))
            }
        };
        reports.push(report);
    }
    reports
}

/// 二次登记：用垫资款回填所选店铺的国补表
pub fn run_reconcile(
    config: &AppConfig,
    shop_number: usize,
    workers: Option<usize>,
) -> Result<ReconcileReport> {
    let shop = config
        .shop_by_number(shop_number)
        .ok_or_else(|| {
            anyhow!(
                "店铺序号超出范围！请输入1-{}（当前：{}）",
                config.shops.len(),
                shop_number
            )
        })?
        .to_string();
    info!("已选择店铺：{}", shop);

    let ledger_path = config.intermediate(LEDGER_FILE);
    let orders_path = config.resolve(&config.subsidy_order_file);
    let orders_options = ReadOptions::sheet(shop.as_str())
        .header_row(ORDERS_HEADER_ROW)
        .fill_merged();

    // 两张表互不依赖，并行读取
    let (mut ledger, mut orders) = thread::scope(|s| -> Result<(Table, Table)> {
        let ledger = s.spawn(|| {
            read_table(&ledger_path, &ReadOptions::first_sheet())
                .with_context(|| format!("读取表1失败: {:?}", ledger_path))
        });
        let orders = s.spawn(|| {
            read_table(&orders_path, &orders_options)
                .with_context(|| format!("读取表2失败: {:?}", orders_path))
        });
        let ledger = ledger
            .join()
            .map_err(|_| anyhow!("读取表1的线程异常退出"))??;
        let orders = orders
            .join()
            .map_err(|_| anyhow!("读取表2的线程异常退出"))??;
        Ok((ledger, orders))
    })?;
    info!("表1 {} 行，表2 {} 行", ledger.len(), orders.len());

    let workers = workers
        .filter(|&n| n > 0)
        .unwrap_or_else(|| config.worker_count());
    let outcome = reconcile::reconcile(&mut ledger, &mut orders, workers)?;

    for (_, target) in FILL_COLUMNS {
        orders.ensure_column(target);
    }

    let mut outputs = Vec::new();
    outputs.push(write_table(
        &ledger,
        &config.resolve(&config.ledger_output),
        &WriteOptions::new("Sheet1", &config.text_columns),
    )?);
    outputs.push(write_table(
        &orders,
        &config.resolve(&config.orders_output),
        &WriteOptions::new("Sheet1", &config.text_columns),
    )?);

    orders.require_columns("表2", &[BATCH, SHOP_SUBJECT])?;
    let merge_options = WriteOptions::new("Sheet1", &config.text_columns)
        .merge(BATCH, &[SHOP_SUBJECT])
        .merge_blanks()
        .backup_suffix("_merge_backup");
    outputs.push(write_table(
        &orders,
        &config.resolve(&config.merged_orders_output),
        &merge_options,
    )?);

    info!(
        "二次登记完成：回填 {} 行，跳过重复回填 {} 次",
        outcome.filled_rows, outcome.skipped_fills
    );

    Ok(ReconcileReport {
        shop,
        ledger_rows: ledger.len(),
        order_rows: orders.len(),
        status_counts: outcome.status_counts,
        skipped_fills: outcome.skipped_fills,
        skipped_rows: outcome.skipped_rows,
        outputs,
    })
}
