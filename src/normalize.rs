use crate::table::Value;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static LETTER_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]+$").unwrap());
static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}A-Za-z]+版").unwrap());
static MODEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+-[A-Za-z0-9]+").unwrap());
static MEMORY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+G\+[0-9]+G").unwrap());
static GIGABYTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9]+)G").unwrap());

/// 去掉货币符号与所有空白后解析金额
fn parse_money(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches(['¥', '￥'])
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()
        }
        Value::Empty | Value::Bool(_) => None,
    };
    // "nan"/"inf" 也能被 f64 解析，这里一并视为无效
    parsed.filter(|n| n.is_finite())
}

/// 采购成本：无法解析时返回 None，使该行不参与匹配
pub fn parse_cost(value: &Value) -> Option<f64> {
    parse_money(value)
}

/// 订单金额：无法解析时按 0 处理，正负筛选都不会选中
pub fn parse_order_amount(value: &Value) -> f64 {
    parse_money(value).unwrap_or(0.0)
}

/// 单号比对前的清洗：去掉首尾空白以及 Excel 文本标记引号
pub fn clean_key(value: &Value) -> String {
    value
        .to_text()
        .trim()
        .trim_matches(['\'', '"'])
        .trim()
        .to_string()
}

/// 去掉网店单号末尾的字母后缀，全部是字母时保留原值
pub fn strip_letter_suffix(order_no: &str) -> String {
    let cleaned = LETTER_SUFFIX.replace(order_no, "");
    if cleaned.is_empty() {
        order_no.to_string()
    } else {
        cleaned.into_owned()
    }
}

/// 8G+256G -> 8GB+256GB
pub fn convert_memory_format(memory: &str) -> String {
    GIGABYTES.replace_all(memory, "${1}GB").into_owned()
}

/// 从 3c 商品名称中拆出的规格信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductSpec {
    /// 版本，如 "标准版"
    pub version: String,
    /// 型号，如 "BTKR-W00"
    pub model: String,
    /// 内存+存储，已转换为 "8GB+128GB"
    pub memory: String,
    /// 颜色，取名称最后一段
    pub color: String,
}

pub fn parse_product_name(name: &str) -> ProductSpec {
    let first = |re: &Regex| {
        re.find(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };
    ProductSpec {
        version: first(&VERSION),
        model: first(&MODEL),
        memory: convert_memory_format(&first(&MEMORY)),
        color: name.split_whitespace().last().unwrap_or_default().to_string(),
    }
}
