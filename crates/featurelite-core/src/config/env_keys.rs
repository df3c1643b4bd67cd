//! 环境变量 key 常量与别名定义
//!
//! 主变量统一使用 `FEATURELITE_*` 前缀。

/// 存储根、隔离区、可写根
pub mod paths {
    /// 数据根目录，其余路径默认位于其下
    pub const FEATURELITE_HOME: &str = "FEATURELITE_HOME";

    pub const FEATURELITE_STORAGE_ROOT: &str = "FEATURELITE_STORAGE_ROOT";
    pub const STORAGE_ROOT_ALIASES: &[&str] = &["FEATURELITE_FEATURES_DIR"];

    pub const FEATURELITE_QUARANTINE_DIR: &str = "FEATURELITE_QUARANTINE_DIR";

    /// Plan 中声明文件必须落在此目录内
    pub const FEATURELITE_WRITABLE_ROOT: &str = "FEATURELITE_WRITABLE_ROOT";
}

/// 资源上限
pub mod limits {
    pub const FEATURELITE_MAX_SOURCE_BYTES: &str = "FEATURELITE_MAX_SOURCE_BYTES";
    pub const MAX_SOURCE_BYTES_ALIASES: &[&str] = &["FEATURELITE_MAX_CODE_BYTES"];

    pub const FEATURELITE_TIMEOUT_MS: &str = "FEATURELITE_TIMEOUT_MS";
    pub const TIMEOUT_MS_ALIASES: &[&str] = &["FEATURELITE_MAX_EXECUTION_MS"];

    pub const FEATURELITE_MAX_HEAP_BYTES: &str = "FEATURELITE_MAX_HEAP_BYTES";

    /// 逗号分隔，如 "json,math,text"
    pub const FEATURELITE_ALLOWED_MODULES: &str = "FEATURELITE_ALLOWED_MODULES";
}

/// 策略
pub mod policy {
    /// 逗号分隔；未设置时与 FEATURELITE_ALLOWED_MODULES 相同
    pub const FEATURELITE_ALLOWED_DEPENDENCIES: &str = "FEATURELITE_ALLOWED_DEPENDENCIES";

    /// 静态分析自定义规则文件 (YAML)
    pub const FEATURELITE_RULES_FILE: &str = "FEATURELITE_RULES_FILE";
}

/// 可观测性与日志
pub mod observability {
    pub const FEATURELITE_QUIET: &str = "FEATURELITE_QUIET";

    pub const FEATURELITE_LOG_LEVEL: &str = "FEATURELITE_LOG_LEVEL";

    pub const FEATURELITE_LOG_JSON: &str = "FEATURELITE_LOG_JSON";

    pub const FEATURELITE_AUDIT_LOG: &str = "FEATURELITE_AUDIT_LOG";

    pub const FEATURELITE_SECURITY_EVENTS_LOG: &str = "FEATURELITE_SECURITY_EVENTS_LOG";
}
