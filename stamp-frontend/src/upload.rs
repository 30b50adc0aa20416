use std::collections::BTreeMap;

use stamp_config::AppConfig;
use stamp_engine::batch::{BatchItem, BatchOptions, ItemFailure, process_batch};
use stamp_engine::substitution::{SubstitutionMap, TemplateTarget};
use stamp_io::DxfCodec;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::delivery::Delivery;
use crate::errors::FrontendError;

/// Windows 保留设备名，净化后的文件名若以此为主名则加 `_` 前缀。
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// 一次上传：文件列表加表单字段。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub files: Vec<UploadedFile>,
    pub fields: BTreeMap<String, String>,
}

/// 由表单字段生成替换表，每个配置的标记都会出现在结果中。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionSchema {
    fields: Vec<String>,
}

impl SubstitutionSchema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// 缺失的字段映射为空串，即清空该属性。
    pub fn build(&self, supplied: &BTreeMap<String, String>) -> SubstitutionMap {
        self.fields
            .iter()
            .map(|field| {
                let value = supplied.get(field).cloned().unwrap_or_default();
                (field.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub target: TemplateTarget,
    pub schema: SubstitutionSchema,
    pub allowed_extensions: Vec<String>,
    pub batch: BatchOptions,
}

impl UploadSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            target: TemplateTarget::new(&config.template.layout, &config.template.block),
            schema: SubstitutionSchema::new(config.substitution.fields.iter().cloned()),
            allowed_extensions: config.upload.allowed_extensions.clone(),
            batch: BatchOptions {
                parallel: config.batch.parallel,
            },
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 文件名含 `.` 且最后一个扩展名（不区分大小写）在允许列表中。
pub fn allowed_file(filename: &str, extensions: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, extension)) => extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension)),
        None => false,
    }
}

/// 将客户端提供的文件名净化为可安全落盘的名称。
///
/// 先做 NFKD 分解，带重音的字母退化为 ASCII 字母。路径分隔符视为空白，空白串以 `_` 连接，仅保留 ASCII 字母数字与 `_.-`，
/// 去掉首尾的 `.` 与 `_`。结果可能为空串。
pub fn secure_filename(filename: &str) -> String {
    let spaced: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|ch| if matches!(ch, '/' | '\\') { ' ' } else { ch })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|ch| ch == '.' || ch == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if !trimmed.is_empty()
        && RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// 一次上传的结果：交付内容，以及未能处理的文件。
#[derive(Debug)]
pub struct UploadOutcome {
    pub delivery: Delivery,
    pub failures: Vec<ItemFailure>,
    /// 通过扩展名与文件名检查、参与替换的文件数。
    pub eligible: usize,
}

impl UploadOutcome {
    /// 有文件参与替换，且全部失败。
    pub fn all_failed(&self) -> bool {
        self.eligible > 0 && self.failures.len() == self.eligible
    }
}

/// 处理一次上传：过滤、净化文件名、替换属性并生成交付结果。
pub fn handle_upload(
    request: UploadRequest,
    settings: &UploadSettings,
) -> Result<UploadOutcome, FrontendError> {
    if request.files.is_empty() {
        return Err(FrontendError::NoFiles);
    }

    let mut items = Vec::new();
    for file in request.files {
        if !allowed_file(&file.filename, &settings.allowed_extensions) {
            info!(file = %file.filename, "扩展名不受支持，已跳过");
            continue;
        }
        let name = secure_filename(&file.filename);
        if name.is_empty() {
            warn!(file = %file.filename, "文件名净化后为空，已跳过");
            continue;
        }
        items.push(BatchItem::new(name, file.bytes));
    }

    let map = settings.schema.build(&request.fields);
    let report = process_batch(&DxfCodec::new(), &items, &settings.target, &map, settings.batch)?;
    for failure in &report.failures {
        warn!(file = %failure.name, error = %failure.error, "文件未能处理");
    }
    Ok(UploadOutcome {
        delivery: Delivery::from(report.outcome),
        failures: report.failures,
        eligible: items.len(),
    })
}
