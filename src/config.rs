use crate::models::AppConfig;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("guobu")
        .join(CONFIG_FILE)
}

/// 加载配置，文件不存在或无法解析时使用默认配置
pub fn load_config(path: Option<&Path>) -> AppConfig {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    if !config_path.exists() {
        debug!("配置文件不存在，使用默认配置: {:?}", config_path);
        return AppConfig::default();
    }

    match fs::read_to_string(&config_path)
        .map_err(anyhow::Error::from)
        .and_then(|content| Ok(serde_json::from_str::<AppConfig>(&content)?))
    {
        Ok(config) => config,
        Err(e) => {
            warn!("配置文件无法读取，使用默认配置 {:?}: {}", config_path, e);
            AppConfig::default()
        }
    }
}

/// 保存配置
pub fn save_config(config: &AppConfig, path: Option<&Path>) -> Result<PathBuf> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);

    // 创建配置目录
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
    }

    // 序列化并保存
    let content = serde_json::to_string_pretty(config).context("序列化配置失败")?;
    fs::write(&config_path, content)
        .with_context(|| format!("保存配置失败: {:?}", config_path))?;

    Ok(config_path)
}
