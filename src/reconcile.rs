//! 垫资款 -> 国补订单的二次登记匹配
//!
//! 每行垫资款按 sku 单号在国补表中查找候选订单，按候选数量分类：
//! 0 个未匹配，1 个直接回填，2 个按采购成本与订单金额的正负号挑选，
//! 超过 2 个无法排除。匹配阶段按行区间并行、只读；回填阶段单线程按
//! 垫资款原始顺序执行，因此结果与线程数无关。

use crate::columns::{
    BATCH, COST, FILL_COLUMNS, ORDER_AMOUNT, RECONCILE_STATUS, SERVICE_FEE, SKU, TARGET_BATCH,
};
use crate::error::PipelineError;
use crate::normalize::{clean_key, parse_cost, parse_order_amount};
use crate::table::{Table, Value};
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::thread;
use std::time::Instant;

pub const LEDGER_REQUIRED: [&str; 4] = [SKU, BATCH, COST, SERVICE_FEE];
pub const ORDERS_REQUIRED: [&str; 3] = [SKU, TARGET_BATCH, ORDER_AMOUNT];

/// 二次登记状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchStatus {
    /// 唯一候选，已回填
    Matched,
    /// 两个候选，按正负号选中一个并回填
    TwoCandidates,
    MalformedCost,
    NoMatch,
    /// 两个候选但采购成本为 0，无法按正负号区分
    ZeroCostUnresolved,
    NoSignMatch,
    TooManyCandidates,
}

impl MatchStatus {
    pub fn label(self) -> &'static str {
        match self {
            MatchStatus::Matched => "正常匹配",
            MatchStatus::TwoCandidates => "两个单号",
            MatchStatus::MalformedCost => "未匹配_采购成本格式错误",
            MatchStatus::NoMatch => "未匹配_未找到匹配",
            MatchStatus::ZeroCostUnresolved => "未匹配_采购成本为零",
            MatchStatus::NoSignMatch => "未匹配_无对应正负订单金额",
            MatchStatus::TooManyCandidates => "未匹配_匹配过多，无法排除",
        }
    }
}

/// 国补表按 sku 单号分组的行下标，组内保持原始行序
#[derive(Debug, Default)]
pub struct OrderIndex {
    groups: HashMap<String, Vec<usize>>,
}

impl OrderIndex {
    pub fn build(orders: &Table) -> Self {
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (row, value) in orders.column_values(SKU).into_iter().enumerate() {
            let key = clean_key(value);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(row);
        }
        Self { groups }
    }

    pub fn candidates(&self, key: &str) -> &[usize] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn distinct_keys(&self) -> usize {
        self.groups.len()
    }

    pub fn max_group(&self) -> usize {
        self.groups.values().map(Vec::len).max().unwrap_or(0)
    }
}

/// 单行匹配结果（回填意图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOutcome {
    pub ledger_row: usize,
    pub status: MatchStatus,
    pub target: Option<usize>,
}

/// 对一行垫资款做匹配分类，不修改任何表
pub fn classify_row(
    ledger: &Table,
    row: usize,
    orders: &Table,
    index: &OrderIndex,
) -> RowOutcome {
    let outcome = |status, target| RowOutcome {
        ledger_row: row,
        status,
        target,
    };

    let Some(cost) = parse_cost(ledger.get(row, COST)) else {
        return outcome(MatchStatus::MalformedCost, None);
    };

    let key = clean_key(ledger.get(row, SKU));
    let candidates = index.candidates(&key);
    match candidates.len() {
        0 => outcome(MatchStatus::NoMatch, None),
        1 => outcome(MatchStatus::Matched, Some(candidates[0])),
        2 => {
            if cost == 0.0 {
                return outcome(MatchStatus::ZeroCostUnresolved, None);
            }
            let target = candidates.iter().copied().find(|&order_row| {
                let amount = parse_order_amount(orders.get(order_row, ORDER_AMOUNT));
                if cost > 0.0 {
                    amount > 0.0
                } else {
                    amount < 0.0
                }
            });
            match target {
                Some(t) => outcome(MatchStatus::TwoCandidates, Some(t)),
                None => outcome(MatchStatus::NoSignMatch, None),
            }
        }
        _ => outcome(MatchStatus::TooManyCandidates, None),
    }
}

/// 把 0..total 切成最多 workers 个连续区间，最后一段包含余数
pub fn partition(total: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    if total == 0 {
        return Vec::new();
    }
    let batch = if total >= workers { total / workers } else { total };
    let mut ranges = Vec::new();
    for i in 0..workers {
        let start = i * batch;
        let end = if i < workers - 1 {
            ((i + 1) * batch).min(total)
        } else {
            total
        };
        if start >= end {
            break;
        }
        ranges.push(start..end);
    }
    ranges
}

/// 并行计算全部行的匹配结果，按垫资款行序返回
pub fn plan(
    ledger: &Table,
    orders: &Table,
    index: &OrderIndex,
    workers: usize,
) -> Result<Vec<RowOutcome>> {
    let ranges = partition(ledger.len(), workers);
    let batches = thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .into_iter()
            .enumerate()
            .map(|(batch_idx, range)| {
                scope.spawn(move || {
                    let started = Instant::now();
                    debug!("线程{}开始处理，批次数据量：{}行", batch_idx + 1, range.len());
                    let outcomes: Vec<RowOutcome> = range
                        .map(|row| classify_row(ledger, row, orders, index))
                        .collect();
                    debug!(
                        "线程{}处理完成，耗时：{:.2}秒",
                        batch_idx + 1,
                        started.elapsed().as_secs_f64()
                    );
                    outcomes
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("匹配线程异常退出")))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(batches.into_iter().flatten().collect())
}

/// 一次二次登记的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub status_counts: BTreeMap<String, usize>,
    /// 实际被回填的国补表行数
    pub filled_rows: usize,
    /// 目标行已被更早的垫资款行回填，因此跳过的次数
    pub skipped_fills: usize,
    /// 被跳过回填的垫资款行（表格行号，表头为第 1 行）
    pub skipped_rows: Vec<usize>,
}

/// 执行二次登记：写入垫资款的状态列，并回填国补表的 "—1" 列
pub fn reconcile(
    ledger: &mut Table,
    orders: &mut Table,
    workers: usize,
) -> Result<ReconcileOutcome> {
    if let Some(err) = PipelineError::schema([
        ("表1", ledger.missing_columns(&LEDGER_REQUIRED)),
        ("表2", orders.missing_columns(&ORDERS_REQUIRED)),
    ]) {
        return Err(err.into());
    }

    let index = OrderIndex::build(orders);
    info!(
        "表2 SKU统计：{}个不同SKU，最多重复{}次",
        index.distinct_keys(),
        index.max_group()
    );

    let outcomes = plan(ledger, orders, &index, workers)?;

    let status_col = ledger.ensure_column(RECONCILE_STATUS);
    let fills: Vec<(usize, usize)> = FILL_COLUMNS
        .iter()
        .filter_map(|(source, target)| {
            ledger
                .column_index(source)
                .map(|src| (src, orders.ensure_column(target)))
        })
        .collect();

    let mut result = ReconcileOutcome::default();
    let mut filled = vec![false; orders.len()];
    for outcome in &outcomes {
        if let Some(target) = outcome.target {
            if filled[target] {
                warn!(
                    "表1第{}行匹配到的表2第{}行已被回填，跳过",
                    outcome.ledger_row + 2,
                    target + 2
                );
                result.skipped_fills += 1;
                result.skipped_rows.push(outcome.ledger_row + 2);
            } else {
                for &(src, dst) in &fills {
                    let value = ledger.cell(outcome.ledger_row, src).clone();
                    orders.set(target, dst, value);
                }
                filled[target] = true;
                result.filled_rows += 1;
            }
        }
        ledger.set(outcome.ledger_row, status_col, Value::text(outcome.status.label()));
        *result
            .status_counts
            .entry(outcome.status.label().to_string())
            .or_default() += 1;
    }

    info!("匹配状态：{:?}", result.status_counts);
    Ok(result)
}
