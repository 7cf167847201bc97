// End-to-end runs of the registration pipeline and the second registration
// on real xlsx files built in a temp directory.

use calamine::{open_workbook, Reader, Xlsx};
use guobu_lib::columns::*;
use guobu_lib::excel_parser::{read_table, ReadOptions};
use guobu_lib::models::AppConfig;
use guobu_lib::table::{Table, Value};
use guobu_lib::{run_pipeline, run_reconcile, Step};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// (首行, 首列, 末行, 末列, 文本)
type Merge = (u32, u16, u32, u16, &'static str);

struct SheetData {
    name: &'static str,
    rows: Vec<Vec<Value>>,
    merges: Vec<Merge>,
}

fn sheet(name: &'static str, rows: Vec<Vec<Value>>) -> SheetData {
    SheetData {
        name,
        rows,
        merges: Vec::new(),
    }
}

fn write_workbook(path: &Path, sheets: Vec<SheetData>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut workbook = Workbook::new();
    let format = Format::new();
    for data in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(data.name).unwrap();
        for (r, row) in data.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match value {
                    Value::Text(s) => {
                        worksheet.write_string(r, c, s).unwrap();
                    }
                    Value::Number(n) => {
                        worksheet.write_number(r, c, *n).unwrap();
                    }
                    _ => {}
                }
            }
        }
        for (r1, c1, r2, c2, text) in data.merges {
            worksheet.merge_range(r1, c1, r2, c2, text, &format).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

fn text_row(cells: &[&str]) -> Vec<Value> {
    cells.iter().map(|s| Value::text(*s)).collect()
}

fn config_for(dir: &Path) -> AppConfig {
    AppConfig {
        work_dir: dir.to_string_lossy().to_string(),
        workers: Some(2),
        ..AppConfig::default()
    }
}

fn merged_regions(path: &Path, sheet: &str) -> Vec<((u32, u32), (u32, u32))> {
    let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
    workbook.load_merged_regions().unwrap();
    let mut regions: Vec<_> = workbook
        .merged_regions_by_sheet(sheet)
        .into_iter()
        .map(|(_, _, dims)| (dims.start, dims.end))
        .collect();
    regions.sort();
    regions
}

/// 抖音导出文件的列：店铺主体、店铺名、账单批次由文件名生成
fn export_columns() -> Vec<&'static str> {
    let mut columns: Vec<&str> = Vec::new();
    for &c in ORDER_FIELDS.iter().chain(LEDGER_FIELDS.iter()) {
        if ![SHOP_SUBJECT, SHOP_NAME, BATCH].contains(&c) && !columns.contains(&c) {
            columns.push(c);
        }
    }
    columns
}

fn export_rows(rows: &[(&str, &str)]) -> Vec<Vec<Value>> {
    let columns = export_columns();
    let mut out = vec![text_row(&columns)];
    for (row_type, sku) in rows {
        let mut row = vec![Value::Empty; columns.len()];
        for (i, c) in columns.iter().enumerate() {
            if *c == ROW_TYPE {
                row[i] = Value::text(*row_type);
            } else if *c == SKU {
                row[i] = Value::text(*sku);
            } else if *c == COST {
                row[i] = Value::Number(100.0);
            }
        }
        out.push(row);
    }
    out
}

fn seed_pipeline_inputs(dir: &Path) {
    write_workbook(
        &dir.join("3c商品名表格").join("七月.xlsx"),
        vec![sheet(
            "Sheet1",
            vec![
                text_row(&[WEB_ORDER_NO, PRODUCT_NAME]),
                text_row(&["1001A", "HUAWEI MatePad 11.5 BTKR-W00 8G+128G 深空灰"]),
                text_row(&["1002", "HUAWEI MatePad 11.5 BTKR-W00 16G+512G 深空灰"]),
            ],
        )],
    );

    let exports = dir.join("抖音表格");
    write_workbook(
        &exports.join("国补_华为星桥专卖店_主体A_2025_B001.xlsx"),
        vec![sheet(
            "Sheet1",
            export_rows(&[("订单货款", "1001"), ("垫资款", "1001"), ("订单退款", "1001")]),
        )],
    );
    write_workbook(
        &exports.join("国补_华为星桥专卖店_主体A_2025_B002.xlsx"),
        vec![sheet("Sheet1", export_rows(&[("订单货款", "1002")]))],
    );
    // 同一批次的重复下载
    write_workbook(
        &exports.join("国补_华为星桥专卖店_主体A_2026_B001.xlsx"),
        vec![sheet("Sheet1", export_rows(&[("订单货款", "1001")]))],
    );

    write_workbook(
        &dir.join("企业库存数量.xlsx"),
        vec![SheetData {
            name: "河北星桥",
            rows: vec![
                text_row(&["企业库存"]),
                vec![],
                text_row(&[SPEC_NAME, CATALOG_MODEL]),
                text_row(&["MatePad 11.5 8GB+128GB 深空灰"]),
                text_row(&["MatePad 11.5 16GB+512GB 冰霜银"]),
            ],
            merges: vec![(3, 1, 4, 1, "BTKR-W00")],
        }],
    );
}

#[test]
fn full_pipeline_produces_registration() {
    let dir = tempfile::tempdir().unwrap();
    seed_pipeline_inputs(dir.path());
    let config = config_for(dir.path());

    let reports = run_pipeline(&config, Step::All);
    assert_eq!(reports.len(), 5);
    for report in &reports {
        assert!(report.success, "步骤{}失败: {}", report.step, report.message);
    }

    let merge_report = &reports[1];
    assert_eq!(merge_report.processed_files, 2);
    assert_eq!(
        merge_report.skipped_files,
        vec!["国补_华为星桥专卖店_主体A_2026_B001.xlsx".to_string()]
    );

    let ledger = read_table(
        &config.intermediate("垫资款结果_未处理.xlsx"),
        &ReadOptions::first_sheet(),
    )
    .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.get(0, ROW_TYPE).to_text(), "垫资款");
    assert_eq!(ledger.get(0, BATCH).to_text(), "B001");

    let output = dir.path().join("国补登记结果.xlsx");
    let result = read_table(&output, &ReadOptions::first_sheet().fill_merged()).unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result.get(0, SKU).to_text(), "1001");
    assert_eq!(result.get(0, SHOP_SUBJECT).to_text(), "主体A");
    assert_eq!(result.get(1, BATCH).to_text(), "B001");
    assert_eq!(
        result.get(0, PRODUCT_3C_NAME).to_text(),
        "HUAWEI MatePad 11.5 BTKR-W00 8G+128G 深空灰"
    );
    assert_eq!(result.get(0, SPEC_NAME).to_text(), "MatePad 11.5 8GB+128GB 深空灰");
    assert_eq!(result.get(0, SPEC_MODEL).to_text(), "BTKR-W00");
    assert_eq!(result.get(2, SKU).to_text(), "1002");
    assert_eq!(result.get(2, BATCH).to_text(), "B002");
    assert_eq!(
        result.get(2, SPEC_NAME).to_text(),
        "有BTKR-W00规格，但是没有对应的配置"
    );

    // 账单批次、店铺主体两列的 B001 区间被合并
    assert_eq!(
        merged_regions(&output, "国补登记结果"),
        vec![((1, 0), (2, 0)), ((1, 1), (2, 1))]
    );
}

#[test]
fn single_step_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    let reports = run_pipeline(&config, Step::Format);
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].success);
    assert!(reports[0].message.contains("国补登记结果_未处理.xlsx"));
}

#[test]
fn format_step_leaves_blank_batches_unmerged() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    write_workbook(
        &config.intermediate("国补登记结果_未处理.xlsx"),
        vec![sheet(
            "数据结果",
            vec![
                text_row(&[BATCH, SHOP_SUBJECT, SKU]),
                text_row(&["", "主体X", "3001"]),
                text_row(&["", "主体X", "3002"]),
                text_row(&["B1", "主体A", "1"]),
                text_row(&["B1", "主体A", "2"]),
            ],
        )],
    );

    let reports = run_pipeline(&config, Step::Format);
    assert!(reports[0].success, "{}", reports[0].message);

    // 排序后空批次在最后，只合并 B1
    let output = dir.path().join("国补登记结果.xlsx");
    assert_eq!(
        merged_regions(&output, "国补登记结果"),
        vec![((1, 0), (2, 0)), ((1, 1), (2, 1))]
    );
    let result = read_table(&output, &ReadOptions::first_sheet()).unwrap();
    assert_eq!(result.get(2, SKU).to_text(), "3001");
    assert_eq!(result.get(3, SHOP_SUBJECT).to_text(), "主体X");
}

#[test]
fn product_summary_skips_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let input = dir.path().join("3c商品名表格");
    write_workbook(
        &input.join("a.xlsx"),
        vec![sheet(
            "Sheet1",
            vec![
                text_row(&[WEB_ORDER_NO, PRODUCT_NAME]),
                text_row(&["1001A", "MatePad"]),
            ],
        )],
    );
    write_workbook(
        &input.join("b.xlsx"),
        vec![sheet(
            "Sheet1",
            vec![text_row(&["订单号", PRODUCT_NAME]), text_row(&["1002", "MatePad"])],
        )],
    );

    let reports = run_pipeline(&config, Step::ProductNames);
    let report = &reports[0];
    assert!(report.success, "{}", report.message);
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].file, "b.xlsx");
    assert!(report.failures[0].error.contains(WEB_ORDER_NO));

    let summary = read_table(
        &config.intermediate("网店单号汇总表.xlsx"),
        &ReadOptions::first_sheet(),
    )
    .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary.get(0, WEB_ORDER_NO_STRIPPED).to_text(), "1001");
    assert_eq!(summary.get(0, SOURCE_FILE).to_text(), "a.xlsx");
}

#[test]
fn shop_export_merge_skips_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let exports = dir.path().join("抖音表格");
    write_workbook(
        &exports.join("国补_华为星桥专卖店_主体A_2025_B001.xlsx"),
        vec![sheet("Sheet1", export_rows(&[("订单货款", "1001")]))],
    );
    write_workbook(
        &exports.join("国补_华为星桥专卖店_主体A_2025_B002.xlsx"),
        vec![sheet(
            "Sheet1",
            vec![text_row(&[ROW_TYPE, "订单号"]), text_row(&["订单货款", "1002"])],
        )],
    );

    let reports = run_pipeline(&config, Step::ShopExports);
    let report = &reports[0];
    assert!(report.success, "{}", report.message);
    assert_eq!(report.processed_files, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].file,
        "国补_华为星桥专卖店_主体A_2025_B002.xlsx"
    );
    assert!(report.failures[0].error.contains(SKU));

    let merged = read_table(
        &config.intermediate("抖音订单合并结果.xlsx"),
        &ReadOptions::first_sheet(),
    )
    .unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged.get(0, BATCH).to_text(), "B001");
    assert_eq!(merged.columns()[..3], [SHOP_SUBJECT, SHOP_NAME, BATCH]);
}

fn seed_reconcile_inputs(dir: &Path, config: &AppConfig) {
    let ledger = vec![
        text_row(&[SKU, BATCH, ROW_TYPE, COST, SERVICE_FEE]),
        vec!["1001".into(), "L1".into(), "垫资款".into(), 100.0.into(), 5.0.into()],
        vec!["1001".into(), "L2".into(), "垫资款".into(), (-100.0).into(), 5.0.into()],
        vec!["1002".into(), "L3".into(), "垫资款".into(), "abc".into(), 5.0.into()],
        vec!["9999".into(), "L4".into(), "垫资款".into(), 10.0.into(), 5.0.into()],
        vec!["1002".into(), "L5".into(), "垫资款".into(), "￥30".into(), 5.0.into()],
    ];
    write_workbook(
        &config.intermediate("垫资款结果_未处理.xlsx"),
        vec![sheet("垫资款", ledger)],
    );

    let orders = vec![
        vec![],
        text_row(&[SHOP_SUBJECT, BATCH, SKU, ORDER_AMOUNT, TARGET_BATCH]),
        vec![Value::Empty, "B001".into(), "1001".into(), 100.0.into()],
        vec![Value::Empty, "B001".into(), "1001".into(), (-100.0).into()],
        vec!["主体B".into(), "B002".into(), "1002".into(), 50.0.into()],
        // 账单批次为空的连续行
        vec!["主体C".into(), Value::Empty, "2001".into(), 10.0.into()],
        vec!["主体C".into(), Value::Empty, "2002".into(), 20.0.into()],
    ];
    write_workbook(
        &dir.join("国补表.xlsx"),
        vec![
            sheet("抖音-vivo丽坤专卖店", vec![text_row(&["其他店铺"])]),
            SheetData {
                name: "抖音-华为星桥专卖店",
                rows: orders,
                merges: vec![(0, 0, 0, 4, "国补登记表"), (2, 0, 3, 0, "主体A")],
            },
        ],
    );
}

#[test]
fn reconcile_marks_ledger_and_fills_orders() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    seed_reconcile_inputs(dir.path(), &config);

    let report = run_reconcile(&config, 1, None).unwrap();
    assert_eq!(report.shop, "抖音-华为星桥专卖店");
    assert_eq!(report.ledger_rows, 5);
    assert_eq!(report.order_rows, 5);
    assert_eq!(report.skipped_fills, 0);
    assert!(report.skipped_rows.is_empty());
    let expected: BTreeMap<String, usize> = [
        ("两个单号".to_string(), 2),
        ("未匹配_采购成本格式错误".to_string(), 1),
        ("未匹配_未找到匹配".to_string(), 1),
        ("正常匹配".to_string(), 1),
    ]
    .into();
    assert_eq!(report.status_counts, expected);
    assert_eq!(report.outputs.len(), 3);

    let ledger = read_table(
        &dir.path().join("垫资款_已标记.xlsx"),
        &ReadOptions::first_sheet(),
    )
    .unwrap();
    let statuses: Vec<String> = ledger
        .column_values(RECONCILE_STATUS)
        .iter()
        .map(|v| v.to_text())
        .collect();
    assert_eq!(
        statuses,
        vec![
            "两个单号",
            "两个单号",
            "未匹配_采购成本格式错误",
            "未匹配_未找到匹配",
            "正常匹配"
        ]
    );

    let orders: Table =
        read_table(&dir.path().join("国补_已更新.xlsx"), &ReadOptions::first_sheet()).unwrap();
    for (_, target) in FILL_COLUMNS {
        assert!(orders.has_column(target), "缺少列 {}", target);
    }
    assert_eq!(orders.get(0, SHOP_SUBJECT).to_text(), "主体A");
    assert_eq!(orders.get(1, SHOP_SUBJECT).to_text(), "主体A");
    assert_eq!(orders.get(0, TARGET_BATCH).to_text(), "L1");
    assert_eq!(orders.get(1, TARGET_BATCH).to_text(), "L2");
    assert_eq!(orders.get(2, TARGET_BATCH).to_text(), "L5");
    assert_eq!(orders.get(2, "采购成本（元）—1").to_text(), "￥30");
    assert_eq!(orders.get(0, "服务费用（元）—1"), &Value::Number(5.0));

    assert_eq!(
        merged_regions(&dir.path().join("国补_已合并.xlsx"), "Sheet1"),
        vec![((1, 0), (2, 0)), ((4, 0), (5, 0))]
    );
}

#[test]
fn reconcile_requires_selected_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    seed_reconcile_inputs(dir.path(), &config);

    // 第 3 家店铺在国补表中没有工作表
    let err = run_reconcile(&config, 3, Some(1)).unwrap_err();
    assert!(format!("{:#}", err).contains("抖音-华为崇云专卖店"));
}
