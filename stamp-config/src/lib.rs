use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "DXFSTAMP_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub substitution: SubstitutionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `DXFSTAMP_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 图框模板所在的布局与块名。
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "TemplateConfig::default_layout")]
    pub layout: String,
    #[serde(default = "TemplateConfig::default_block")]
    pub block: String,
}

impl TemplateConfig {
    fn default_layout() -> String {
        "master".to_string()
    }

    fn default_block() -> String {
        "ssp_ARCH_24x36".to_string()
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            layout: Self::default_layout(),
            block: Self::default_block(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubstitutionConfig {
    /// 参与替换的属性标记。
    #[serde(default = "SubstitutionConfig::default_fields")]
    pub fields: Vec<String>,
}

impl SubstitutionConfig {
    fn default_fields() -> Vec<String> {
        vec!["JOB_LOC1".to_string()]
    }
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            fields: Self::default_fields(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "UploadConfig::default_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl UploadConfig {
    fn default_extensions() -> Vec<String> {
        vec!["dxf".to_string()]
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: Self::default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "BatchConfig::default_parallel")]
    pub parallel: bool,
}

impl BatchConfig {
    fn default_parallel() -> bool {
        true
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_directory")]
    pub directory: PathBuf,
}

impl OutputConfig {
    fn default_directory() -> PathBuf {
        PathBuf::from(".")
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: Self::default_directory(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_title_block_template() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.template.layout, "master");
        assert_eq!(cfg.template.block, "ssp_ARCH_24x36");
        assert_eq!(cfg.substitution.fields, ["JOB_LOC1"]);
        assert_eq!(cfg.upload.allowed_extensions, ["dxf"]);
        assert!(cfg.batch.parallel);
        assert_eq!(cfg.output.directory, PathBuf::from("."));
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [template]
            block = "ssp_ARCH_11x17"

            [substitution]
            fields = ["JOB_LOC1", "JOB_LOC2"]

            [batch]
            parallel = false

            [output]
            directory = "out"
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.template.layout, "master");
        assert_eq!(cfg.template.block, "ssp_ARCH_11x17");
        assert_eq!(cfg.substitution.fields, ["JOB_LOC1", "JOB_LOC2"]);
        assert_eq!(cfg.upload.allowed_extensions, ["dxf"]);
        assert!(!cfg.batch.parallel);
        assert_eq!(cfg.output.directory, PathBuf::from("out"));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[batch]\nparallel = \"sometimes\"").unwrap();
        match AppConfig::from_file(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            AppConfig::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
