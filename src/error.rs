use std::fmt;
use std::path::PathBuf;

/// 流程中可识别的错误类型，其余错误通过 anyhow 携带上下文向上传递
#[derive(Debug)]
pub enum PipelineError {
    /// 必需的输入文件或目录不存在
    MissingFile(PathBuf),
    /// 工作簿中找不到指定工作表
    MissingSheet { file: PathBuf, sheet: String },
    /// 表格缺少必要列，每项为 (表名, 缺失列)
    Schema(Vec<(String, Vec<String>)>),
    /// 主文件与备份文件均保存失败
    Save { path: PathBuf, backup: PathBuf, reason: String },
}

impl PipelineError {
    /// 汇总多张表的缺失列，全部为空时返回 None
    pub fn schema<I, S>(tables: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, Vec<String>)>,
        S: Into<String>,
    {
        let missing: Vec<(String, Vec<String>)> = tables
            .into_iter()
            .filter(|(_, cols)| !cols.is_empty())
            .map(|(name, cols)| (name.into(), cols))
            .collect();
        if missing.is_empty() {
            None
        } else {
            Some(Self::Schema(missing))
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile(path) => write!(f, "输入文件不存在: {}", path.display()),
            Self::MissingSheet { file, sheet } => {
                write!(f, "文件 {} 中没有工作表 '{sheet}'", file.display())
            }
            Self::Schema(tables) => {
                let parts: Vec<String> = tables
                    .iter()
                    .map(|(table, cols)| format!("{table}缺少字段: {}", cols.join(", ")))
                    .collect();
                write!(f, "{}", parts.join("; "))
            }
            Self::Save { path, backup, reason } => write!(
                f,
                "保存失败: {}（备份 {} 也未能写入）: {reason}",
                path.display(),
                backup.display()
            ),
        }
    }
}

impl std::error::Error for PipelineError {}
