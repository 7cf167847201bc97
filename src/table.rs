use crate::error::PipelineError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 单元格值
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Value::Empty
        } else {
            Value::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 文本形式，整数型数字不带小数点（避免单号变成 "123.0"）
    pub fn to_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// 带列名的内存表，行顺序即原始表格顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// 返回缺失的列名（保持传入顺序）
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    /// 单表校验，缺列时返回 Schema 错误
    pub fn require_columns(&self, table_name: &str, required: &[&str]) -> Result<()> {
        if let Some(err) = PipelineError::schema([(table_name, self.missing_columns(required))]) {
            return Err(err.into());
        }
        Ok(())
    }

    /// 补齐到列数后追加一行，多余的单元格被截断
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Empty);
        self.rows.push(row);
    }

    pub fn cell(&self, row: usize, col: usize) -> &Value {
        static EMPTY: Value = Value::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn get(&self, row: usize, column: &str) -> &Value {
        static EMPTY: Value = Value::Empty;
        match self.column_index(column) {
            Some(col) => self.cell(row, col),
            None => &EMPTY,
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    pub fn set_by_name(&mut self, row: usize, column: &str, value: Value) {
        if let Some(col) = self.column_index(column) {
            self.set(row, col, value);
        }
    }

    /// 在指定位置插入新列，列名已存在时报错
    pub fn insert_column(&mut self, at: usize, name: &str, fill: Value) -> Result<()> {
        if self.has_column(name) {
            bail!("列 '{}' 已存在", name);
        }
        let at = at.min(self.columns.len());
        self.columns.insert(at, name.to_string());
        for row in &mut self.rows {
            row.insert(at, fill.clone());
        }
        Ok(())
    }

    /// 列存在则返回其位置，否则在末尾追加空列
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Value::Empty);
        }
        self.columns.len() - 1
    }

    pub fn column_values(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(col) => self.rows.iter().map(|r| &r[col]).collect(),
            None => Vec::new(),
        }
    }

    /// 按给定列名投影出新表，任一列不存在时报 Schema 错误
    pub fn select(&self, table_name: &str, columns: &[&str]) -> Result<Table> {
        self.require_columns(table_name, columns)?;
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Table, usize) -> bool,
    {
        let rows = (0..self.rows.len())
            .filter(|&i| keep(self, i))
            .map(|i| self.rows[i].clone())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// 按某列文本稳定排序，空值排在最后
    pub fn sort_by_column(&mut self, name: &str) {
        let Some(col) = self.column_index(name) else {
            return;
        };
        self.rows.sort_by(|a, b| match (a[col].is_empty(), b[col].is_empty()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => a[col].to_text().cmp(&b[col].to_text()),
        });
    }

    /// 纵向合并多张表，列取并集（按首次出现顺序），缺失单元格留空
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for col in &table.columns {
                if !columns.contains(col) {
                    columns.push(col.clone());
                }
            }
        }
        let positions: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut rows = Vec::new();
        for table in &tables {
            let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c.as_str()]).collect();
            for row in &table.rows {
                let mut out = vec![Value::Empty; columns.len()];
                for (src, value) in row.iter().enumerate() {
                    out[mapping[src]] = value.clone();
                }
                rows.push(out);
            }
        }
        Table { columns, rows }
    }
}
