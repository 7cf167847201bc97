use crate::error::PipelineError;
use crate::models::SaveOutcome;
use crate::table::{Table, Value};
use anyhow::{Context, Result};
use log::{info, warn};
use rust_xlsxwriter::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// 合并单元格设置：按基准列的连续相同值，合并目标列
#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub group_column: String,
    pub merge_columns: Vec<String>,
    /// 连续的空值是否也合并
    pub merge_blanks: bool,
}

/// 写表设置
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub sheet_name: String,
    /// 以文本格式写入的列（单号类），避免科学计数法
    pub text_columns: Vec<String>,
    pub merge: Option<MergeSpec>,
    /// 保存失败时备份文件名后缀
    pub backup_suffix: String,
}

impl WriteOptions {
    pub fn new(sheet_name: &str, text_columns: &[String]) -> Self {
        Self {
            sheet_name: sheet_name.to_string(),
            text_columns: text_columns.to_vec(),
            merge: None,
            backup_suffix: "_backup".to_string(),
        }
    }

    pub fn merge(mut self, group_column: &str, merge_columns: &[&str]) -> Self {
        self.merge = Some(MergeSpec {
            group_column: group_column.to_string(),
            merge_columns: merge_columns.iter().map(|c| c.to_string()).collect(),
            merge_blanks: false,
        });
        self
    }

    /// 空值也按连续区间合并，需在 `merge` 之后调用
    pub fn merge_blanks(mut self) -> Self {
        if let Some(spec) = &mut self.merge {
            spec.merge_blanks = true;
        }
        self
    }

    pub fn backup_suffix(mut self, suffix: &str) -> Self {
        self.backup_suffix = suffix.to_string();
        self
    }
}

/// 计算连续相同值的区间（数据行下标，闭区间）
///
/// 只返回长度至少为 2 的区间；`merge_blanks` 为 false 时空值不参与合并；
/// 超出 `row_limit` 的区间直接跳过。
pub fn merge_runs(
    values: &[&Value],
    row_limit: usize,
    merge_blanks: bool,
) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    while start < values.len() {
        let current = values[start];
        let mut end = start;
        while end + 1 < values.len() && same_group(values[end + 1], current) {
            end += 1;
        }
        if end > start && (merge_blanks || !current.is_empty()) && end < row_limit {
            runs.push((start, end));
        }
        start = end + 1;
    }
    runs
}

/// 空字符串与空单元格视为同一组
fn same_group(a: &Value, b: &Value) -> bool {
    a == b || (a.is_empty() && b.is_empty())
}

/// 把表格写入工作簿（尚未保存）
pub fn build_workbook(table: &Table, options: &WriteOptions) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&options.sheet_name)?;

    let header_format = Format::new().set_bold().set_border(FormatBorder::Thin);
    let text_format = Format::new().set_num_format("@");
    let center_format = Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let center_text_format = center_format.clone().set_num_format("@");

    let text_cols: HashSet<usize> = options
        .text_columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    // 合并区间：(列, 起始数据行, 结束数据行)
    let mut merges: Vec<(usize, usize, usize)> = Vec::new();
    if let Some(spec) = &options.merge {
        let mut required = vec![spec.group_column.as_str()];
        required.extend(spec.merge_columns.iter().map(String::as_str));
        table.require_columns(&options.sheet_name, &required)?;

        let runs = merge_runs(
            &table.column_values(&spec.group_column),
            table.len(),
            spec.merge_blanks,
        );
        for column in &spec.merge_columns {
            if let Some(col) = table.column_index(column) {
                merges.extend(runs.iter().map(|&(first, last)| (col, first, last)));
            }
        }
    }
    let covered: HashSet<(usize, usize)> = merges
        .iter()
        .flat_map(|&(col, first, last)| (first + 1..=last).map(move |row| (row, col)))
        .collect();

    for (col, name) in table.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
        if text_cols.contains(&col) {
            worksheet.set_column_format(col as u16, &text_format)?;
        }
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let sheet_row = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            if covered.contains(&(row_idx, col)) {
                continue;
            }
            let col_num = col as u16;
            if text_cols.contains(&col) {
                worksheet.write_string_with_format(
                    sheet_row,
                    col_num,
                    value.to_text(),
                    &text_format,
                )?;
                continue;
            }
            match value {
                Value::Empty => {}
                Value::Text(s) => {
                    worksheet.write_string(sheet_row, col_num, s)?;
                }
                Value::Number(n) => {
                    worksheet.write_number(sheet_row, col_num, *n)?;
                }
                Value::Bool(b) => {
                    worksheet.write_boolean(sheet_row, col_num, *b)?;
                }
            }
        }
    }

    for &(col, first, last) in &merges {
        let value = table.cell(first, col);
        let (first_row, last_row) = ((first + 1) as u32, (last + 1) as u32);
        let is_text = text_cols.contains(&col);
        let format = if is_text { &center_text_format } else { &center_format };
        worksheet.merge_range(
            first_row,
            col as u16,
            last_row,
            col as u16,
            &value.to_text(),
            format,
        )?;
        // merge_range 只能写字符串，数字需要覆盖左上角单元格
        if let (Value::Number(n), false) = (value, is_text) {
            worksheet.write_number_with_format(first_row, col as u16, *n, format)?;
        }
    }

    if !merges.is_empty() {
        info!("合并单元格完成：共 {} 个区域", merges.len());
    }
    Ok(workbook)
}

/// 写表并保存
pub fn write_table(table: &Table, path: &Path, options: &WriteOptions) -> Result<SaveOutcome> {
    let mut workbook = build_workbook(table, options)
        .with_context(|| format!("生成工作表失败: {}", options.sheet_name))?;
    save_workbook(&mut workbook, path, &options.backup_suffix)
}

/// 保存工作簿，主文件写入失败时改写到备份文件
pub fn save_workbook(
    workbook: &mut Workbook,
    path: &Path,
    backup_suffix: &str,
) -> Result<SaveOutcome> {
    let buffer = workbook.save_to_buffer().context("生成工作簿内容失败")?;

    match write_file(path, &buffer) {
        Ok(()) => {
            info!("已保存: {:?}", path);
            Ok(SaveOutcome::Saved {
                path: path.to_path_buf(),
            })
        }
        Err(err) => {
            let backup = backup_path(path, backup_suffix);
            match write_file(&backup, &buffer) {
                Ok(()) => {
                    warn!("主文件保存失败，已备份至：{:?}，错误：{}", backup, err);
                    Ok(SaveOutcome::BackedUp {
                        path: path.to_path_buf(),
                        backup,
                        reason: err.to_string(),
                    })
                }
                Err(backup_err) => Err(PipelineError::Save {
                    path: path.to_path_buf(),
                    backup,
                    reason: format!("{}; {}", err, backup_err),
                }
                .into()),
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)
}

/// a/b/结果.xlsx + "_backup" -> a/b/结果_backup.xlsx
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "xlsx".to_string());
    path.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};

    fn values(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::text(*s)).collect()
    }

    #[test]
    fn runs_cover_maximal_groups() {
        let vals = values(&["A", "A", "A", "B", "B"]);
        let refs: Vec<&Value> = vals.iter().collect();
        assert_eq!(merge_runs(&refs, vals.len(), false), vec![(0, 2), (3, 4)]);
    }

    #[test]
    fn single_rows_and_blanks_are_never_merged() {
        let vals = values(&["A", "B", "B", "", "", "C"]);
        let refs: Vec<&Value> = vals.iter().collect();
        assert_eq!(merge_runs(&refs, vals.len(), false), vec![(1, 2)]);
    }

    #[test]
    fn blank_runs_merge_when_enabled() {
        let vals = vec![Value::Empty, Value::text(""), Value::text("A"), Value::text("A")];
        let refs: Vec<&Value> = vals.iter().collect();
        assert_eq!(merge_runs(&refs, vals.len(), true), vec![(0, 1), (2, 3)]);
        assert_eq!(merge_runs(&refs, vals.len(), false), vec![(2, 3)]);
    }

    #[test]
    fn runs_past_row_limit_are_skipped() {
        let vals = values(&["A", "A", "B", "B"]);
        let refs: Vec<&Value> = vals.iter().collect();
        assert_eq!(merge_runs(&refs, 3, true), vec![(0, 1)]);
    }

    #[test]
    fn backup_path_keeps_directory_and_extension() {
        assert_eq!(
            backup_path(Path::new("out/国补_已合并.xlsx"), "_merge_backup"),
            PathBuf::from("out/国补_已合并_merge_backup.xlsx")
        );
    }

    fn sample() -> Table {
        Table::with_rows(
            vec!["账单批次".into(), "店铺主体".into(), "sku单号".into(), "金额".into()],
            vec![
                vec!["B1".into(), "公司甲".into(), "6923456789012345678".into(), 10.0.into()],
                vec!["B1".into(), "公司甲".into(), "6923456789012345679".into(), 20.0.into()],
                vec!["B2".into(), "公司乙".into(), "0012".into(), (-5.0).into()],
            ],
        )
    }

    #[test]
    fn writes_text_ids_and_merged_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("结果.xlsx");
        let options = WriteOptions::new("数据", &["sku单号".to_string()])
            .merge("账单批次", &["账单批次", "店铺主体"]);

        let outcome = write_table(&sample(), &path, &options).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { path: path.clone() });

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range("数据").unwrap();
        assert_eq!(
            range.get_value((1, 2)),
            Some(&Data::String("6923456789012345678".into()))
        );
        assert_eq!(range.get_value((3, 2)), Some(&Data::String("0012".into())));
        assert_eq!(range.get_value((1, 3)), Some(&Data::Float(10.0)));

        workbook.load_merged_regions().unwrap();
        let mut merged: Vec<(u32, u32, u32, u32)> = workbook
            .merged_regions_by_sheet("数据")
            .into_iter()
            .map(|(_, _, d)| (d.start.0, d.start.1, d.end.0, d.end.1))
            .collect();
        merged.sort();
        assert_eq!(merged, vec![(1, 0, 2, 0), (1, 1, 2, 1)]);
    }

    #[test]
    fn failed_save_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        // 目标路径是目录，主文件写入必然失败
        let path = dir.path().join("占用.xlsx");
        fs::create_dir(&path).unwrap();

        let options = WriteOptions::new("数据", &[]).backup_suffix("_merge_backup");
        let outcome = write_table(&sample(), &path, &options).unwrap();
        match outcome {
            SaveOutcome::BackedUp { backup, .. } => {
                assert_eq!(backup, dir.path().join("占用_merge_backup.xlsx"));
                assert!(backup.is_file());
            }
            other => panic!("expected backup, got {:?}", other),
        }
    }
}
