use crate::columns::*;
use crate::error::PipelineError;
use crate::excel_parser::{read_table, ReadOptions};
use crate::models::{AppConfig, FileFailure, StepReport};
use crate::normalize::{clean_key, strip_letter_suffix};
use crate::spec_match::{apply_spec_matching, load_catalog, sheet_for_shop, Catalog};
use crate::table::{Table, Value};
use crate::writer::{write_table, WriteOptions};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 中间文件名，各步骤之间按文件名交接
pub const PRODUCT_SUMMARY_FILE: &str = "网店单号汇总表.xlsx";
pub const MERGED_EXPORT_FILE: &str = "抖音订单合并结果.xlsx";
pub const UNNAMED_REGISTRATION_FILE: &str = "国补登记结果_未匹配名称.xlsx";
pub const UNFORMATTED_REGISTRATION_FILE: &str = "国补登记结果_未处理.xlsx";
pub const LEDGER_FILE: &str = "垫资款结果_未处理.xlsx";

pub const NAME_NOT_FOUND: &str = "未找到对应商品名，请检查3c商品名表格中是否存在";

const UNKNOWN_SHOP: &str = "未知店铺";
const UNKNOWN_SUBJECT: &str = "未知主体";
const UNKNOWN_BATCH: &str = "未知批次";

/// 扫描目录中的所有 Excel 文件
pub fn scan_excel_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::MissingFile(dir.to_path_buf()).into());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();
            if ext_str == "xls" || ext_str == "xlsx" || ext_str == "xlsm" {
                // 跳过临时文件
                if !path
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .starts_with("~$")
                {
                    files.push(path.to_path_buf());
                }
            }
        }
    }

    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn relative_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// 整列填同一个值，列不存在时追加
fn fill_column(table: &mut Table, name: &str, value: &str) {
    let col = table.ensure_column(name);
    for row in 0..table.len() {
        table.set(row, col, Value::text(value));
    }
}

// ---------------------------------------------------------------------------
// 步骤1：3c 商品名表格汇总
// ---------------------------------------------------------------------------

/// 读取一个 3c 商品表，在 "网店单号" 后插入去后缀的单号
pub fn process_order_numbers(file_path: &Path) -> Result<Table> {
    let mut table = read_table(file_path, &ReadOptions::first_sheet())?;
    let Some(order_col) = table.column_index(WEB_ORDER_NO) else {
        anyhow::bail!("Excel中缺少'{}'列，请检查列名", WEB_ORDER_NO);
    };

    table.insert_column(order_col + 1, WEB_ORDER_NO_STRIPPED, Value::Empty)?;
    for row in 0..table.len() {
        let value = table.cell(row, order_col);
        if value.is_empty() {
            continue;
        }
        let stripped = strip_letter_suffix(&value.to_text());
        table.set(row, order_col + 1, Value::text(stripped));
    }
    Ok(table)
}

pub fn build_product_summary(config: &AppConfig, report: &mut StepReport) -> Result<()> {
    let input_dir = config.resolve(&config.product_name_dir);
    let files = scan_excel_files(&input_dir)?;
    info!("找到 {} 个 3c 商品表", files.len());

    let mut tables = Vec::new();
    for file in &files {
        match process_order_numbers(file) {
            Ok(mut table) => {
                fill_column(&mut table, SOURCE_FILE, &file_name(file));
                fill_column(&mut table, SOURCE_PATH, &relative_path(file, &input_dir));
                info!("已处理文件: {}，记录数：{}", file_name(file), table.len());
                tables.push(table);
                report.processed_files += 1;
            }
            Err(e) => {
                error!("处理失败 {}: {:#}", file_name(file), e);
                report.failures.push(FileFailure {
                    file: file_name(file),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    if tables.is_empty() {
        warn!("没有可汇总的数据，未生成汇总表");
        report.message = "没有可汇总的数据".to_string();
        return Ok(());
    }

    let summary = Table::concat(tables);
    report.records = summary.len();
    let output = config.intermediate(PRODUCT_SUMMARY_FILE);
    report.outputs.push(write_table(
        &summary,
        &output,
        &WriteOptions::new("汇总数据", &[]),
    )?);
    report.message = format!(
        "处理完成 | 成功: {} | 失败: {}",
        report.processed_files,
        report.failures.len()
    );
    info!("汇总表已生成，共 {} 条记录", summary.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// 步骤2：抖音店铺导出文件按账单批次合并
// ---------------------------------------------------------------------------

/// 从导出文件名中解析的店铺信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFileInfo {
    pub shop_name: String,
    pub shop_subject: String,
    pub bill_batch: String,
}

impl ExportFileInfo {
    pub fn is_known(&self) -> bool {
        self.bill_batch != UNKNOWN_BATCH
    }
}

/// 文件名格式：国补_店铺名_店铺主体_时间_账单批次（按 "_" 拆分）
pub fn parse_export_file_name(stem: &str) -> ExportFileInfo {
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() >= 5 {
        ExportFileInfo {
            shop_name: parts[1].to_string(),
            shop_subject: parts[2].to_string(),
            bill_batch: parts[4].to_string(),
        }
    } else {
        ExportFileInfo {
            shop_name: UNKNOWN_SHOP.to_string(),
            shop_subject: UNKNOWN_SUBJECT.to_string(),
            bill_batch: UNKNOWN_BATCH.to_string(),
        }
    }
}

/// 读取一个导出文件，在最前面插入店铺主体、店铺名、账单批次
pub fn read_shop_export(file_path: &Path, info: &ExportFileInfo) -> Result<Table> {
    let mut table = read_table(file_path, &ReadOptions::first_sheet())?;
    if !table.has_column(SKU) {
        anyhow::bail!("文件 {} 缺少订单字段: {}", file_name(file_path), SKU);
    }
    table.insert_column(0, SHOP_SUBJECT, Value::text(info.shop_subject.clone()))?;
    table.insert_column(1, SHOP_NAME, Value::text(info.shop_name.clone()))?;
    table.insert_column(2, BATCH, Value::text(info.bill_batch.clone()))?;
    Ok(table)
}

pub fn merge_shop_exports(config: &AppConfig, report: &mut StepReport) -> Result<()> {
    let input_dir = config.resolve(&config.shop_export_dir);
    let files = scan_excel_files(&input_dir)?;
    info!("找到 {} 个店铺导出文件", files.len());

    let mut tables = Vec::new();
    let mut seen_batches: HashSet<String> = HashSet::new();

    for file in &files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let info = parse_export_file_name(&stem);
        if !info.is_known() {
            warn!("文件名格式不标准 {}，店铺信息使用默认值", file_name(file));
        } else if seen_batches.contains(&info.bill_batch) {
            warn!("订单批次重复，已跳过: {}（批次: {}）", file_name(file), info.bill_batch);
            report.skipped_files.push(file_name(file));
            continue;
        }

        match read_shop_export(file, &info) {
            Ok(mut table) => {
                fill_column(&mut table, SOURCE_FILE, &file_name(file));
                fill_column(&mut table, SOURCE_PATH, &relative_path(file, &input_dir));
                info!(
                    "已读取: {} (记录数: {})，批次: {}，店铺主体: {}",
                    file_name(file),
                    table.len(),
                    info.bill_batch,
                    info.shop_subject
                );
                if info.is_known() {
                    seen_batches.insert(info.bill_batch.clone());
                }
                tables.push(table);
                report.processed_files += 1;
            }
            Err(e) => {
                error!("读取失败 {}: {:#}", file_name(file), e);
                report.failures.push(FileFailure {
                    file: file_name(file),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    if tables.is_empty() {
        warn!("未找到可合并的有效数据");
        report.message = "未找到可合并的有效数据".to_string();
        return Ok(());
    }

    let merged = Table::concat(tables);
    report.records = merged.len();
    let output = config.intermediate(MERGED_EXPORT_FILE);
    report.outputs.push(write_table(
        &merged,
        &output,
        &WriteOptions::new("合并数据", &config.text_columns),
    )?);
    report.message = format!(
        "处理的文件数: {}，跳过的重复批次文件数: {}，失败: {}",
        report.processed_files,
        report.skipped_files.len(),
        report.failures.len()
    );
    info!("合并完成，总记录数: {}", merged.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// 步骤3：拆分订单货款 / 垫资款，并填充 3c 商品名称
// ---------------------------------------------------------------------------

const EXPORT_REQUIRED: [&str; 8] = [
    SHOP_SUBJECT,
    SKU,
    PAYABLE,
    GOV_SUBSIDY,
    COST,
    SERVICE_FEE,
    ROW_TYPE,
    BATCH,
];

/// 在 "政府补贴（元）" 之后插入自营补贴、店铺补贴两个空列
fn insert_subsidy_columns(table: &mut Table) -> Result<()> {
    if let Some(idx) = table.column_index(GOV_SUBSIDY) {
        table.insert_column(idx + 1, SHOP_SUBSIDY, Value::Empty)?;
        table.insert_column(idx + 1, SELF_SUBSIDY, Value::Empty)?;
    }
    Ok(())
}

fn is_order_row(table: &Table, row: usize) -> bool {
    table.get(row, ROW_TYPE).to_text().starts_with("订单")
}

/// 按行类型拆分为 (订单货款登记表, 垫资款表)
pub fn split_registration(merged: &Table) -> Result<(Table, Table)> {
    merged.require_columns("抖音订单表", &EXPORT_REQUIRED)?;

    let mut orders = merged
        .filter_rows(is_order_row)
        .select("订单货款", &ORDER_FIELDS)?;
    if let Some(idx) = orders.column_index(CATEGORY) {
        orders.insert_column(idx + 1, SPEC_NAME, Value::Empty)?;
        orders.insert_column(idx + 2, SPEC_MODEL, Value::Empty)?;
        orders.insert_column(idx + 3, PRODUCT_3C_NAME, Value::Empty)?;
    }
    insert_subsidy_columns(&mut orders)?;

    let mut ledger = merged
        .filter_rows(|t, row| !is_order_row(t, row))
        .select("垫资款", &LEDGER_FIELDS)?;
    insert_subsidy_columns(&mut ledger)?;

    Ok((orders, ledger))
}

/// 用网店单号汇总表填充 3c 商品名称，返回匹配到的行数
pub fn fill_product_names(orders: &mut Table, summary: &Table) -> Result<usize> {
    summary.require_columns("网店单号汇总表", &[WEB_ORDER_NO_STRIPPED, PRODUCT_NAME])?;

    // 同一单号只取第一次出现的商品名称
    let mut name_map: HashMap<String, String> = HashMap::new();
    for row in 0..summary.len() {
        let key = clean_key(summary.get(row, WEB_ORDER_NO_STRIPPED));
        name_map
            .entry(key)
            .or_insert_with(|| summary.get(row, PRODUCT_NAME).to_text());
    }
    info!("已创建商品名称映射，共 {} 条唯一匹配关系", name_map.len());

    let name_col = orders.ensure_column(PRODUCT_3C_NAME);
    let mut matched = 0;
    for row in 0..orders.len() {
        let key = clean_key(orders.get(row, SKU));
        let name = match name_map.get(&key) {
            Some(name) if !name.is_empty() => {
                matched += 1;
                name.clone()
            }
            _ => NAME_NOT_FOUND.to_string(),
        };
        orders.set(row, name_col, Value::text(name));
    }
    Ok(matched)
}

pub fn create_registration(config: &AppConfig, report: &mut StepReport) -> Result<()> {
    let merged_path = config.intermediate(MERGED_EXPORT_FILE);
    let merged = read_table(&merged_path, &ReadOptions::first_sheet())
        .with_context(|| format!("读取抖音订单表失败: {:?}", merged_path))?;
    info!("成功读取抖音订单表，共 {} 条记录", merged.len());

    let (mut orders, ledger) = split_registration(&merged)?;

    report.outputs.push(write_table(
        &ledger,
        &config.intermediate(LEDGER_FILE),
        &WriteOptions::new("垫资款", &config.text_columns),
    )?);
    info!("垫资款表格共 {} 条记录", ledger.len());

    let summary_path = config.intermediate(PRODUCT_SUMMARY_FILE);
    let summary = read_table(&summary_path, &ReadOptions::first_sheet())
        .with_context(|| format!("读取网店单号汇总表失败: {:?}", summary_path))?;
    let matched = fill_product_names(&mut orders, &summary)?;
    info!(
        "匹配完成，成功填充 {} 条商品名称（共 {} 条记录）",
        matched,
        orders.len()
    );

    report.outputs.push(write_table(
        &orders,
        &config.intermediate(UNNAMED_REGISTRATION_FILE),
        &WriteOptions::new("国补登记结果", &config.text_columns),
    )?);
    report.records = orders.len();
    report.message = format!(
        "订单货款 {} 条（已匹配商品名 {} 条），垫资款 {} 条",
        orders.len(),
        matched,
        ledger.len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// 步骤4：根据 3c 商品名称与企业规格表匹配名称
// ---------------------------------------------------------------------------

pub fn match_specifications(config: &AppConfig, report: &mut StepReport) -> Result<()> {
    let input = config.intermediate(UNNAMED_REGISTRATION_FILE);
    let mut table = read_table(&input, &ReadOptions::first_sheet())?;
    table.require_columns("国补登记结果", &[SHOP_NAME])?;

    let inventory = config.resolve(&config.inventory_file);
    if !inventory.exists() {
        return Err(PipelineError::MissingFile(inventory).into());
    }

    let mut sheets: Vec<String> = Vec::new();
    for value in table.column_values(SHOP_NAME) {
        if value.is_empty() {
            continue;
        }
        let sheet = sheet_for_shop(&config.shop_sheets, &value.to_text());
        if !sheets.contains(&sheet) {
            sheets.push(sheet);
        }
    }
    info!("表格中共有 {} 个对应的规格表: {:?}", sheets.len(), sheets);

    let mut catalogs: HashMap<String, Catalog> = HashMap::new();
    for sheet in sheets {
        match load_catalog(&inventory, &sheet) {
            Ok(catalog) => {
                info!("工作表 {}：成功提取 {} 个规格型号", sheet, catalog.len());
                catalogs.insert(sheet, catalog);
            }
            Err(e) => {
                warn!("处理规格表 {} 失败：{:#}", sheet, e);
                report.failures.push(FileFailure {
                    file: format!("{}[{}]", file_name(&inventory), sheet),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    let counts = apply_spec_matching(
        &mut table,
        &catalogs,
        &config.shop_sheets,
        &config.non_standard_versions,
    )?;
    info!("规格匹配结果：{:?}", counts);

    report.outputs.push(write_table(
        &table,
        &config.intermediate(UNFORMATTED_REGISTRATION_FILE),
        &WriteOptions::new("数据结果", &config.text_columns),
    )?);
    report.records = table.len();
    report.message = format!("规格匹配结果：{:?}", counts);
    Ok(())
}

// ---------------------------------------------------------------------------
// 步骤5：整理表格格式
// ---------------------------------------------------------------------------

pub fn format_registration(config: &AppConfig, report: &mut StepReport) -> Result<()> {
    let input = config.intermediate(UNFORMATTED_REGISTRATION_FILE);
    let mut table = read_table(&input, &ReadOptions::first_sheet())?;
    table.require_columns("国补登记结果", &[BATCH, SHOP_SUBJECT, SKU])?;

    // 相同账单批次排在一起才能合并
    table.sort_by_column(BATCH);

    let options = WriteOptions::new("国补登记结果", &config.text_columns)
        .merge(BATCH, &[BATCH, SHOP_SUBJECT]);
    let outcome = write_table(&table, &config.resolve(&config.registration_output), &options)?;
    report.message = format!("处理完成，文件已保存至: {:?}", outcome.written_path());
    report.outputs.push(outcome);
    report.records = table.len();
    Ok(())
}
