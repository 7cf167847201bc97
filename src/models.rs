use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 工作目录，下面所有相对路径都基于它
    pub work_dir: String,
    /// 3c 商品名表格目录
    pub product_name_dir: String,
    /// 抖音店铺导出表格目录
    pub shop_export_dir: String,
    /// 中间文件目录
    pub intermediate_dir: String,
    /// 企业库存数量（规格表）
    pub inventory_file: String,
    /// 国补订单表（二次登记的订单来源）
    pub subsidy_order_file: String,
    /// 最终国补登记结果
    pub registration_output: String,
    /// 已标记的垫资款
    pub ledger_output: String,
    /// 已更新的国补表
    pub orders_output: String,
    /// 合并单元格后的国补表
    pub merged_orders_output: String,
    /// 店铺列表（二次登记时按序号选择，对应国补表的工作表名）
    pub shops: Vec<String>,
    /// 店铺名 -> 规格表工作表名
    pub shop_sheets: BTreeMap<String, String>,
    /// 非标准版本关键词
    pub non_standard_versions: Vec<String>,
    /// 以文本格式写出的单号列
    pub text_columns: Vec<String>,
    /// 二次登记的并行线程数，None 时取 CPU 核心数
    pub workers: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let shop_sheets = [
            ("华为崇云专卖店", "河北崇云"),
            ("华为浩昌数码专卖店", "山东浩昌"),
            ("华为星桥专卖店", "河北星桥"),
            ("荣耀星桥专卖店", "河北星桥"),
            ("抖音-vivo平板旗舰店", "河北丽坤"),
            ("崇云平板旗舰店（店名:崇云卖场店）", "河北丽坤"),
            ("抖音-vivo丽坤专卖店 (前身店名-抖音-vivo全场景专卖店)", "河北丽坤"),
            ("华为智慧通达专卖店", "河北智慧"),
        ]
        .into_iter()
        .map(|(shop, sheet)| (shop.to_string(), sheet.to_string()))
        .collect();

        Self {
            work_dir: ".".to_string(),
            product_name_dir: "3c商品名表格".to_string(),
            shop_export_dir: "抖音表格".to_string(),
            intermediate_dir: "中间文件—可忽略".to_string(),
            inventory_file: "企业库存数量.xlsx".to_string(),
            subsidy_order_file: "国补表.xlsx".to_string(),
            registration_output: "国补登记结果.xlsx".to_string(),
            ledger_output: "垫资款_已标记.xlsx".to_string(),
            orders_output: "国补_已更新.xlsx".to_string(),
            merged_orders_output: "国补_已合并.xlsx".to_string(),
            shops: [
                "抖音-华为星桥专卖店",
                "抖音-vivo丽坤专卖店",
                "抖音-华为崇云专卖店",
                "抖音-华为浩昌数码专卖店",
                "京东-崇云平板旗舰店",
                "抖音-荣耀星桥专卖店",
                "抖音-华为智慧通达专卖店",
                "抖音-vivo平板旗舰店",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shop_sheets,
            non_standard_versions: ["柔光版", "灵动版", "Pro版", "青春版"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            text_columns: vec!["sku单号".to_string()],
            workers: None,
        }
    }
}

impl AppConfig {
    pub fn resolve(&self, relative: &str) -> PathBuf {
        PathBuf::from(&self.work_dir).join(relative)
    }

    pub fn intermediate(&self, file_name: &str) -> PathBuf {
        self.resolve(&self.intermediate_dir).join(file_name)
    }

    /// 按 1 开始的序号选择店铺
    pub fn shop_by_number(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.shops.get(idx))
            .map(String::as_str)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(4)
    }
}

/// 文件保存结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { path: PathBuf },
    /// 主文件保存失败，内容已写入备份文件
    BackedUp {
        path: PathBuf,
        backup: PathBuf,
        reason: String,
    },
}

impl SaveOutcome {
    /// 实际写入的文件
    pub fn written_path(&self) -> &PathBuf {
        match self {
            SaveOutcome::Saved { path } => path,
            SaveOutcome::BackedUp { backup, .. } => backup,
        }
    }
}

/// 文件处理错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// 单个步骤的处理结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u8,
    pub title: String,
    pub success: bool,
    pub message: String,
    /// 成功处理的文件数
    pub processed_files: usize,
    /// 输出的记录数
    pub records: usize,
    /// 因批次重复跳过的文件
    pub skipped_files: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub outputs: Vec<SaveOutcome>,
}

impl StepReport {
    pub fn new(step: u8, title: &str) -> Self {
        Self {
            step,
            title: title.to_string(),
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(step: u8, title: &str, message: String) -> Self {
        Self {
            success: false,
            message,
            ..Self::new(step, title)
        }
    }
}

/// 二次登记结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub shop: String,
    pub ledger_rows: usize,
    pub order_rows: usize,
    /// 状态 -> 行数
    pub status_counts: BTreeMap<String, usize>,
    /// 已被更早的垫资款行填充过、因此未再写入的次数
    pub skipped_fills: usize,
    /// 状态为匹配、但因目标行已被回填而没有写入数据的垫资款行号
    pub skipped_rows: Vec<usize>,
    pub outputs: Vec<SaveOutcome>,
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunReport {
    Pipeline { steps: Vec<StepReport> },
    Reconcile(ReconcileReport),
}

impl RunReport {
    pub fn success(&self) -> bool {
        match self {
            RunReport::Pipeline { steps } => steps.iter().all(|s| s.success),
            RunReport::Reconcile(_) => true,
        }
    }
}
