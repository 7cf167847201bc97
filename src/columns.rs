//! 各阶段表格之间约定的列名，全角标点也是约定的一部分

pub const SKU: &str = "sku单号";
pub const BATCH: &str = "账单批次";
pub const ROW_TYPE: &str = "行类型";
pub const SHOP_SUBJECT: &str = "店铺主体";
pub const SHOP_NAME: &str = "店铺名";
pub const SOURCE_FILE: &str = "来源文件";
pub const SOURCE_PATH: &str = "来源路径";

pub const PAYABLE: &str = "订单应付金额（元）";
pub const GOV_SUBSIDY: &str = "政府补贴（元）";
pub const SHOP_SUBSIDY: &str = "店铺补贴（元）";
pub const SELF_SUBSIDY: &str = "自营补贴（元）";
pub const COST: &str = "采购成本（元）";
pub const SERVICE_FEE: &str = "服务费用（元）";

pub const ORDER_AMOUNT: &str = "订单金额";
pub const TARGET_BATCH: &str = "账单批次—1";
pub const RECONCILE_STATUS: &str = "二次登记状态";

pub const WEB_ORDER_NO: &str = "网店单号";
pub const WEB_ORDER_NO_STRIPPED: &str = "网店单号-去后缀";
pub const PRODUCT_NAME: &str = "商品名称";

pub const CATEGORY: &str = "商品一级类目";
pub const SPEC_NAME: &str = "名称";
pub const SPEC_MODEL: &str = "规格";
pub const PRODUCT_3C_NAME: &str = "3c商品名称";
pub const CATALOG_MODEL: &str = "规格型号";

/// 垫资款 -> 国补表的回填列，(来源列, 目标列)，按顺序写入
pub const FILL_COLUMNS: [(&str, &str); 16] = [
    ("账单批次", "账单批次—1"),
    ("行类型", "行类型—1"),
    ("订单应付金额（元）", "订单应付金额（元）—1"),
    ("政府补贴（元）", "政府补贴（元）—1"),
    ("店铺补贴（元）", "店铺补贴（元）—1"),
    ("自营补贴（元）", "自营补贴（元）—1"),
    ("分账金额（元）", "分账金额（元）—1"),
    ("服务费用（元）", "服务费用（元）—1"),
    ("平台折扣（元）", "平台折扣（元）—1"),
    ("订单实付（元）", "订单实付（元）—1"),
    ("采购折扣比例", "采购折扣比例—1"),
    ("采购折扣金额（元）", "采购折扣金额（元）—1"),
    ("采购成本（元）", "采购成本（元）—1"),
    ("结算金额（元）", "结算金额（元）—1"),
    ("创建时间", "创建时间—1"),
    ("备注", "备注—1"),
];

/// 订单货款登记表的列
pub const ORDER_FIELDS: [&str; 21] = [
    "账单批次",
    "店铺主体",
    "费用项名称",
    "行类型",
    "sku单号",
    "商品一级类目",
    "商品信息.1",
    "税率",
    "订单应付金额（元）",
    "政府补贴（元）",
    "分账金额（元）",
    "服务费用（元）",
    "平台折扣（元）",
    "订单实付（元）",
    "采购折扣比例",
    "采购折扣金额（元）",
    "采购成本（元）",
    "结算金额（元）",
    "创建时间",
    "备注",
    "店铺名",
];

/// 垫资款登记表的列
pub const LEDGER_FIELDS: [&str; 17] = [
    "店铺主体",
    "sku单号",
    "账单批次",
    "行类型",
    "订单应付金额（元）",
    "政府补贴（元）",
    "分账金额（元）",
    "服务费用（元）",
    "平台折扣（元）",
    "订单实付（元）",
    "采购折扣比例",
    "采购折扣金额（元）",
    "采购成本（元）",
    "结算金额（元）",
    "创建时间",
    "备注",
    "店铺名",
];
