use crate::columns::{CATALOG_MODEL, PRODUCT_3C_NAME, SHOP_NAME, SPEC_MODEL, SPEC_NAME};
use crate::excel_parser::{read_table, ReadOptions};
use crate::normalize::parse_product_name;
use crate::table::{Table, Value};
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// 规格型号 -> 名称列表（去重，保持表内顺序）
pub type Catalog = HashMap<String, Vec<String>>;

/// 规格表的表头在第 3 行
const CATALOG_HEADER_ROW: usize = 2;

/// 店铺名映射到规格表的工作表名，未配置的店铺返回 "未匹配_店铺名"
pub fn sheet_for_shop(shop_sheets: &BTreeMap<String, String>, shop: &str) -> String {
    shop_sheets
        .get(shop)
        .cloned()
        .unwrap_or_else(|| format!("未匹配_{}", shop))
}

pub fn build_catalog(table: &Table) -> Result<Catalog> {
    table.require_columns("规格表", &[SPEC_NAME, CATALOG_MODEL])?;
    let mut catalog: Catalog = HashMap::new();
    for row in 0..table.len() {
        let model = table.get(row, CATALOG_MODEL).to_text().trim().to_string();
        let name = table.get(row, SPEC_NAME).to_text().trim().to_string();
        if model.is_empty() || name.is_empty() {
            continue;
        }
        let names = catalog.entry(model).or_default();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(catalog)
}

/// 从企业库存数量表的某个工作表读取规格字典
pub fn load_catalog(inventory_file: &Path, sheet: &str) -> Result<Catalog> {
    let options = ReadOptions::sheet(sheet)
        .header_row(CATALOG_HEADER_ROW)
        .fill_merged();
    build_catalog(&read_table(inventory_file, &options)?)
}

/// 一行商品的规格匹配结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpecMatch {
    Resolved { name: String, model: String },
    /// 版本筛选后仍有多个候选
    Ambiguous,
    /// 版本筛选后一个候选都不剩
    NoVersionMatch,
    /// 型号存在，但没有同时包含内存和颜色的名称
    NoConfiguration { model: String },
    UnknownModel { model: String },
    MissingCatalog { sheet: String },
}

impl SpecMatch {
    /// 写入 "名称" 列的文本
    pub fn name_text(&self) -> String {
        match self {
            SpecMatch::Resolved { name, .. } => name.clone(),
            SpecMatch::Ambiguous => "无法排除到唯一值_请向工程师反馈".to_string(),
            SpecMatch::NoVersionMatch => "版本筛选后无匹配_请向工程师反馈".to_string(),
            SpecMatch::NoConfiguration { model } => format!("有{}规格，但是没有对应的配置", model),
            SpecMatch::UnknownModel { model } => format!("未匹配到该型号{}", model),
            SpecMatch::MissingCatalog { sheet } => format!("未找到规格表_{}", sheet),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SpecMatch::Resolved { .. } => "已匹配",
            SpecMatch::Ambiguous => "无法排除",
            SpecMatch::NoVersionMatch => "版本无匹配",
            SpecMatch::NoConfiguration { .. } => "无对应配置",
            SpecMatch::UnknownModel { .. } => "型号未匹配",
            SpecMatch::MissingCatalog { .. } => "无规格表",
        }
    }
}

/// 按商品名称中的型号、内存、颜色、版本在规格字典中找唯一名称
pub fn match_product(
    product_name: &str,
    catalog: Option<&Catalog>,
    sheet: &str,
    non_standard_versions: &[String],
) -> SpecMatch {
    let Some(catalog) = catalog else {
        return SpecMatch::MissingCatalog {
            sheet: sheet.to_string(),
        };
    };
    let spec = parse_product_name(product_name);
    let Some(names) = catalog.get(&spec.model) else {
        return SpecMatch::UnknownModel { model: spec.model };
    };

    let resolved = |name: &str| SpecMatch::Resolved {
        name: name.to_string(),
        model: spec.model.clone(),
    };

    let candidates: Vec<&String> = names
        .iter()
        .filter(|n| n.contains(&spec.memory) && n.contains(&spec.color))
        .collect();

    match candidates.as_slice() {
        [] => SpecMatch::NoConfiguration {
            model: spec.model.clone(),
        },
        [only] => resolved(only),
        _ => {
            let narrowed: Vec<&String> = if spec.version == "标准版" {
                candidates
                    .into_iter()
                    .filter(|n| !non_standard_versions.iter().any(|v| n.contains(v.as_str())))
                    .collect()
            } else {
                candidates
                    .into_iter()
                    .filter(|n| n.contains(&spec.version))
                    .collect()
            };
            match narrowed.as_slice() {
                [only] => resolved(only),
                [] => SpecMatch::NoVersionMatch,
                _ => SpecMatch::Ambiguous,
            }
        }
    }
}

/// 对登记表逐行匹配规格，回写 "名称" 与 "规格" 列；返回各结果的数量
pub fn apply_spec_matching(
    table: &mut Table,
    catalogs: &HashMap<String, Catalog>,
    shop_sheets: &BTreeMap<String, String>,
    non_standard_versions: &[String],
) -> Result<BTreeMap<String, usize>> {
    table.require_columns("国补登记结果", &[SHOP_NAME, PRODUCT_3C_NAME])?;
    let name_col = table.ensure_column(SPEC_NAME);
    let model_col = table.ensure_column(SPEC_MODEL);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..table.len() {
        let shop = table.get(row, SHOP_NAME).to_text();
        let product_name = table.get(row, PRODUCT_3C_NAME).to_text();
        let sheet = sheet_for_shop(shop_sheets, &shop);

        let result = match_product(
            &product_name,
            catalogs.get(&sheet),
            &sheet,
            non_standard_versions,
        );
        if let SpecMatch::Resolved { model, .. } = &result {
            table.set(row, model_col, Value::text(model.clone()));
        }
        table.set(row, name_col, Value::text(result.name_text()));
        *counts.entry(result.kind().to_string()).or_default() += 1;
    }
    Ok(counts)
}
