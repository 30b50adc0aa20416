use std::collections::HashSet;
use std::io::{Cursor, Write};

use rayon::prelude::*;
use stamp_io::{DocumentDecoder, DocumentEncoder, FormatError};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::EngineError;
use crate::substitution::{SubstitutionMap, TemplateTarget};
use crate::{ARCHIVE_NAME, DXF_MEDIA_TYPE, MODIFIED_PREFIX, ZIP_MEDIA_TYPE};

/// 一个待处理的输入：原始文件名与内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPayload {
    pub filename: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// 没有任何文件被修改。
    Empty,
    Single(NamedPayload),
    Archive(NamedPayload),
}

/// 单个输入解码失败，不影响其它输入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub error: FormatError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    /// 被修改的原始文件名，按输入顺序。
    pub modified: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// 使用 rayon 并行处理各输入。
    pub parallel: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

enum ItemResult {
    Modified { name: String, bytes: Vec<u8> },
    Unchanged,
    Failed(ItemFailure),
}

#[inline]
pub fn modified_name(name: &str) -> String {
    format!("{MODIFIED_PREFIX}{name}")
}

/// 对每个输入执行解码、替换、编码，并按修改数量打包结果。
///
/// 单个输入的解码失败记录在 [`BatchReport::failures`] 中；只有压缩包写入失败才返回错误。
pub fn process_batch<C>(
    codec: &C,
    items: &[BatchItem],
    target: &TemplateTarget,
    map: &SubstitutionMap,
    options: BatchOptions,
) -> Result<BatchReport, EngineError>
where
    C: DocumentDecoder + DocumentEncoder + Sync,
{
    let results: Vec<ItemResult> = if options.parallel {
        items
            .par_iter()
            .map(|item| process_item(codec, item, target, map))
            .collect()
    } else {
        items
            .iter()
            .map(|item| process_item(codec, item, target, map))
            .collect()
    };

    let mut modified = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            ItemResult::Modified { name, bytes } => modified.push((name, bytes)),
            ItemResult::Unchanged => {}
            ItemResult::Failed(failure) => {
                warn!(file = %failure.name, error = %failure.error, "解析 DXF 失败，已跳过");
                failures.push(failure);
            }
        }
    }
    info!(
        total = items.len(),
        modified = modified.len(),
        failed = failures.len(),
        "批处理完成"
    );

    let names = modified.iter().map(|(name, _)| name.clone()).collect();
    let outcome = package(modified)?;
    Ok(BatchReport {
        outcome,
        modified: names,
        failures,
    })
}

fn process_item<C>(
    codec: &C,
    item: &BatchItem,
    target: &TemplateTarget,
    map: &SubstitutionMap,
) -> ItemResult
where
    C: DocumentDecoder + DocumentEncoder,
{
    let mut document = match codec.decode(&item.bytes) {
        Ok(document) => document,
        Err(error) => {
            return ItemResult::Failed(ItemFailure {
                name: item.name.clone(),
                error,
            });
        }
    };
    let report = target.apply(&mut document, map);
    if !report.changed() {
        debug!(file = %item.name, "未找到可替换的属性");
        return ItemResult::Unchanged;
    }
    ItemResult::Modified {
        name: item.name.clone(),
        bytes: codec.encode(&document),
    }
}

fn package(mut modified: Vec<(String, Vec<u8>)>) -> Result<BatchOutcome, EngineError> {
    match modified.len() {
        0 => Ok(BatchOutcome::Empty),
        1 => {
            let (name, bytes) = modified.remove(0);
            Ok(BatchOutcome::Single(NamedPayload {
                filename: modified_name(&name),
                media_type: DXF_MEDIA_TYPE,
                bytes,
            }))
        }
        _ => Ok(BatchOutcome::Archive(NamedPayload {
            filename: ARCHIVE_NAME.to_string(),
            media_type: ZIP_MEDIA_TYPE,
            bytes: build_archive(&modified)?,
        })),
    }
}

/// 将修改后的文件写入 zip，每个条目名为 `modified_<原文件名>`。
pub fn build_archive(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>, EngineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();
    for (name, bytes) in files {
        let entry = unique_entry_name(&modified_name(name), &mut used);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(entry.as_str(), options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// 重名条目在扩展名前追加序号：`a.dxf`、`a_1.dxf`、`a_2.dxf`。
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (name, None),
    };
    let mut counter = 1;
    loop {
        let candidate = match extension {
            Some(extension) => format!("{stem}_{counter}.{extension}"),
            None => format!("{stem}_{counter}"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_entry_names_get_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name("modified_a.dxf", &mut used), "modified_a.dxf");
        assert_eq!(unique_entry_name("modified_a.dxf", &mut used), "modified_a_1.dxf");
        assert_eq!(unique_entry_name("modified_a.dxf", &mut used), "modified_a_2.dxf");
        assert_eq!(unique_entry_name("modified_a_1.dxf", &mut used), "modified_a_1_1.dxf");
        assert_eq!(unique_entry_name("README", &mut used), "README");
        assert_eq!(unique_entry_name("README", &mut used), "README_1");
    }

    #[test]
    fn modified_name_prefixes_original() {
        assert_eq!(modified_name("plan.dxf"), "modified_plan.dxf");
    }

    #[test]
    fn empty_batch_is_empty_outcome() {
        assert_eq!(package(Vec::new()).unwrap(), BatchOutcome::Empty);
    }
}
