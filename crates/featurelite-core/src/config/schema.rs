//! 按领域分组的配置结构体
//!
//! 从环境变量加载，统一 fallback 逻辑。进程启动时读取一次，之后以不可变值传给构造函数。

use super::env_keys::{limits as lim_keys, observability as obv_keys, paths, policy};
use super::loader::{env_bool, env_optional, env_or, env_u64, load_dotenv, parse_list};
use std::path::PathBuf;

/// 默认源码上限（字节）
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 50_000;
/// 默认执行时间上限（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// 默认堆增长上限（字节）
pub const DEFAULT_MAX_HEAP_BYTES: u64 = 64 * 1024 * 1024;
/// 默认允许加载的沙箱模块
pub const DEFAULT_ALLOWED_MODULES: &str = "json,math,text";

/// 数据目录：`FEATURELITE_HOME` 或 `~/.featurelite`
fn data_home() -> PathBuf {
    env_optional(paths::FEATURELITE_HOME, &[])
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".featurelite")
        })
}

/// 存储路径配置
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Feature 持久化目录（每个 Feature 一个文件）
    pub storage_root: PathBuf,
    /// 被拒绝代码的隔离记录目录
    pub quarantine_dir: PathBuf,
    /// Plan 声明文件允许落入的唯一可写根
    pub writable_root: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let home = data_home();
        let storage_root = env_optional(
            paths::FEATURELITE_STORAGE_ROOT,
            paths::STORAGE_ROOT_ALIASES,
        )
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("features"));
        let quarantine_dir = env_optional(paths::FEATURELITE_QUARANTINE_DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("quarantine"));
        let writable_root = env_optional(paths::FEATURELITE_WRITABLE_ROOT, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_root.clone());
        Self {
            storage_root,
            quarantine_dir,
            writable_root,
        }
    }
}

/// 资源上限原始配置（沙箱 crate 据此构造 `ResourceLimits`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    pub max_source_bytes: u64,
    pub max_execution_ms: u64,
    pub max_heap_delta_bytes: u64,
    pub allowed_modules: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_execution_ms: DEFAULT_TIMEOUT_MS,
            max_heap_delta_bytes: DEFAULT_MAX_HEAP_BYTES,
            allowed_modules: parse_list(DEFAULT_ALLOWED_MODULES),
        }
    }
}

impl LimitsConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            max_source_bytes: env_u64(
                lim_keys::FEATURELITE_MAX_SOURCE_BYTES,
                lim_keys::MAX_SOURCE_BYTES_ALIASES,
                DEFAULT_MAX_SOURCE_BYTES,
            ),
            max_execution_ms: env_u64(
                lim_keys::FEATURELITE_TIMEOUT_MS,
                lim_keys::TIMEOUT_MS_ALIASES,
                DEFAULT_TIMEOUT_MS,
            ),
            max_heap_delta_bytes: env_u64(
                lim_keys::FEATURELITE_MAX_HEAP_BYTES,
                &[],
                DEFAULT_MAX_HEAP_BYTES,
            ),
            allowed_modules: parse_list(&env_or(
                lim_keys::FEATURELITE_ALLOWED_MODULES,
                &[],
                || DEFAULT_ALLOWED_MODULES.to_string(),
            )),
        }
    }

    /// CLI 参数覆盖（在冻结为不可变值之前调用）
    pub fn with_cli_overrides(mut self, timeout_ms: Option<u64>, max_source_bytes: Option<u64>) -> Self {
        if let Some(t) = timeout_ms {
            self.max_execution_ms = t;
        }
        if let Some(m) = max_source_bytes {
            self.max_source_bytes = m;
        }
        self
    }
}

/// Plan / 静态分析策略配置
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Plan 可声明的依赖白名单
    pub allowed_dependencies: Vec<String>,
    /// 静态分析自定义规则文件
    pub rules_file: Option<PathBuf>,
}

impl PolicyConfig {
    pub fn from_env(limits: &LimitsConfig) -> Self {
        load_dotenv();
        let allowed_dependencies = env_optional(policy::FEATURELITE_ALLOWED_DEPENDENCIES, &[])
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|| limits.allowed_modules.clone());
        let rules_file = env_optional(policy::FEATURELITE_RULES_FILE, &[]).map(PathBuf::from);
        Self {
            allowed_dependencies,
            rules_file,
        }
    }
}

/// 可观测性配置：quiet、log_level、log_json、audit_log、security_events_log
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
    pub security_events_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::FEATURELITE_QUIET, &[], false),
                log_level: env_or(obv_keys::FEATURELITE_LOG_LEVEL, &[], || {
                    "featurelite=info".to_string()
                }),
                log_json: env_bool(obv_keys::FEATURELITE_LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::FEATURELITE_AUDIT_LOG, &[]),
                security_events_log: env_optional(obv_keys::FEATURELITE_SECURITY_EVENTS_LOG, &[]),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_source_bytes, 50_000);
        assert_eq!(limits.max_execution_ms, 5_000);
        assert_eq!(limits.allowed_modules, vec!["json", "math", "text"]);
    }

    #[test]
    fn test_limits_cli_overrides() {
        let limits = LimitsConfig::default().with_cli_overrides(Some(250), None);
        assert_eq!(limits.max_execution_ms, 250);
        assert_eq!(limits.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
    }
}
