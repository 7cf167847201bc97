use crate::error::PipelineError;
use crate::table::{Table, Value};
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Dimensions, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use log::debug;
use std::io::{Read, Seek};
use std::path::Path;

/// 读取选项
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// 工作表名称，None 取第一个
    pub sheet: Option<String>,
    /// 表头所在行（从 0 开始），数据从下一行开始
    pub header_row: usize,
    /// 是否先把合并单元格的左上角值填满整个区域
    pub fill_merged: bool,
}

impl ReadOptions {
    pub fn first_sheet() -> Self {
        Self::default()
    }

    pub fn sheet(name: impl Into<String>) -> Self {
        Self {
            sheet: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn header_row(mut self, row: usize) -> Self {
        self.header_row = row;
        self
    }

    pub fn fill_merged(mut self) -> Self {
        self.fill_merged = true;
        self
    }
}

/// 从 Excel 文件读取一张表
pub fn read_table(file_path: &Path, options: &ReadOptions) -> Result<Table> {
    if !file_path.exists() {
        return Err(PipelineError::MissingFile(file_path.to_path_buf()).into());
    }

    let mut workbook = open_workbook_auto(file_path)
        .with_context(|| format!("无法打开文件: {:?}", file_path))?;

    let sheet_name = match &options.sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|s| s == name) {
                return Err(PipelineError::MissingSheet {
                    file: file_path.to_path_buf(),
                    sheet: name.clone(),
                }
                .into());
            }
            name.clone()
        }
        None => workbook
            .sheet_names()
            .first()
            .context("工作簿没有工作表")?
            .clone(),
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("无法读取工作表: {}", sheet_name))?;

    let merged = if options.fill_merged {
        merged_regions(&mut workbook, &sheet_name)?
    } else {
        Vec::new()
    };

    let grid = build_grid(&range, &merged);
    let table = table_from_grid(grid, options.header_row)
        .with_context(|| format!("解析工作表失败: {:?} [{}]", file_path, sheet_name))?;

    debug!(
        "读取 {:?} [{}]: {} 列, {} 行",
        file_path,
        sheet_name,
        table.columns().len(),
        table.len()
    );
    Ok(table)
}

/// 合并区域，目前只有 xlsx 能取到
fn merged_regions<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet: &str,
) -> Result<Vec<Dimensions>> {
    match workbook {
        Sheets::Xlsx(xlsx) => {
            xlsx.load_merged_regions().context("无法读取合并单元格")?;
            Ok(xlsx
                .merged_regions_by_sheet(sheet)
                .into_iter()
                .map(|(_, _, dims)| dims.clone())
                .collect())
        }
        _ => {
            debug!("工作表 {} 不是 xlsx 格式，跳过合并单元格处理", sheet);
            Ok(Vec::new())
        }
    }
}

/// 按绝对坐标展开成二维网格，并把合并区域填满
fn build_grid(range: &Range<Data>, merged: &[Dimensions]) -> Vec<Vec<Value>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let (end_row, end_col) = range.end().unwrap_or((start_row, start_col));

    let height = merged
        .iter()
        .map(|d| d.end.0)
        .fold(end_row, u32::max) as usize
        + 1;
    let width = merged
        .iter()
        .map(|d| d.end.1)
        .fold(end_col, u32::max) as usize
        + 1;

    let mut grid = vec![vec![Value::Empty; width]; height];
    for (row, col, cell) in range.cells() {
        grid[start_row as usize + row][start_col as usize + col] = cell_value(cell);
    }

    for dims in merged {
        let (top, left) = (dims.start.0 as usize, dims.start.1 as usize);
        let (bottom, right) = (dims.end.0 as usize, dims.end.1 as usize);
        let value = grid[top][left].clone();
        for row in grid.iter_mut().take(bottom + 1).skip(top) {
            for cell in row.iter_mut().take(right + 1).skip(left) {
                *cell = value.clone();
            }
        }
    }
    grid
}

fn table_from_grid(grid: Vec<Vec<Value>>, header_row: usize) -> Result<Table> {
    let mut rows = grid.into_iter().skip(header_row);
    let header = rows
        .next()
        .with_context(|| format!("表头行 {} 不存在", header_row + 1))?;
    let data: Vec<Vec<Value>> = rows
        .filter(|row| row.iter().any(|v| !v.is_empty()))
        .collect();

    // 去掉既没有表头也没有数据的尾部列
    let mut width = header.len();
    while width > 0
        && header[width - 1].is_empty()
        && data.iter().all(|row| row[width - 1].is_empty())
    {
        width -= 1;
    }

    let columns = header_names(&header[..width]);
    let rows = data
        .into_iter()
        .map(|mut row| {
            row.truncate(width);
            row
        })
        .collect();
    Ok(Table::with_rows(columns, rows))
}

/// 空表头命名为 "Unnamed: n"，重复表头依次加 ".1"、".2"
fn header_names(header: &[Value]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(header.len());
    for (idx, cell) in header.iter().enumerate() {
        let base = match cell.to_text().trim() {
            "" => format!("Unnamed: {}", idx),
            s => s.to_string(),
        };
        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        names.push(name);
    }
    names
}

/// 单元格转换为内部值
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::String(s) => Value::text(s.clone()),
        Data::Float(f) => Value::Number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Value::text(excel_serial_to_string(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::text(s.clone()),
        _ => Value::Empty,
    }
}

/// Excel 日期序列号转日期字符串，带时间部分时保留到秒
fn excel_serial_to_string(serial: f64) -> String {
    // Excel 日期从 1899-12-30 开始（因为 Excel 的 1900 年闰年 bug）
    let Some(base) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return serial.to_string();
    };
    let seconds = (serial * 86_400.0).round() as i64;
    let datetime = base + Duration::seconds(seconds);
    if seconds % 86_400 == 0 {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
