//! 统一环境变量加载逻辑
//!
//! 集中维护 fallback 链，避免在业务代码中重复 `or_else` 调用。

use std::env;

/// 加载当前目录下的 `.env` 到环境变量（不覆盖已存在的变量）
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = env::current_dir()
            .map(|d| d.join(".env"))
            .unwrap_or_else(|_| std::path::PathBuf::from(".env"));
        if let Ok(content) = std::fs::read_to_string(&path) {
            for (key, value) in parse_dotenv(&content) {
                if env::var(&key).is_err() {
                    #[allow(unsafe_code)]
                    unsafe {
                        env::set_var(&key, &value);
                    }
                }
            }
        }
    });
}

/// 解析 `.env` 内容：跳过注释与空行，去掉行尾注释和成对引号
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    pairs
}

/// 从主变量或别名链读取环境变量，失败时使用默认值
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// 从主变量或别名链读取，返回 Option（空值视为未设置）
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// 解析布尔型环境变量：0/false/no/off 为 false，其余非空值为 true
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// 解析数值型环境变量，无法解析时回退默认值
pub fn env_u64(primary: &str, aliases: &[&str], default: u64) -> u64 {
    match env_optional(primary, aliases) {
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}, using default ({})", primary, raw, default);
            default
        }),
        None => default,
    }
}

/// 逗号分隔列表 → 去空白、去空项
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
