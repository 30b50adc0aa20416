use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use stamp_config::AppConfig;
use stamp_core::document::{Document, LayoutKind};
use tracing::info;

use crate::delivery::Delivery;
use crate::errors::FrontendError;
use crate::loader::{load_document, read_uploads};
use crate::upload::{SubstitutionSchema, UploadRequest, UploadSettings, handle_upload};

/// `apply` 子命令的参数，未给出的项取自配置。
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub files: Vec<PathBuf>,
    pub fields: Vec<(String, String)>,
    pub layout: Option<String>,
    pub block: Option<String>,
    pub output: Option<PathBuf>,
    pub sequential: bool,
}

/// 解析 `KEY=VALUE`，值可以为空或包含 `=`。
pub fn parse_field(raw: &str) -> Result<(String, String), FrontendError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(FrontendError::InvalidField(raw.to_string())),
    }
}

/// 命令行给出的字段追加到配置的字段表之后。
fn settings_for(options: &ApplyOptions, config: &AppConfig) -> UploadSettings {
    let mut settings = UploadSettings::from_config(config);
    if let Some(layout) = &options.layout {
        settings.target.layout = layout.clone();
    }
    if let Some(block) = &options.block {
        settings.target.block = block.clone();
    }
    if options.sequential {
        settings.batch.parallel = false;
    }
    let mut fields = settings.schema.fields().to_vec();
    for (key, _) in &options.fields {
        if !fields.contains(key) {
            fields.push(key.clone());
        }
    }
    settings.schema = SubstitutionSchema::new(fields);
    settings
}

/// 对磁盘上的 DXF 执行替换并写出结果，返回写出的路径。
pub fn run_apply(
    options: &ApplyOptions,
    config: &AppConfig,
) -> Result<Option<PathBuf>, FrontendError> {
    let settings = settings_for(options, config);
    let request = UploadRequest {
        files: read_uploads(&options.files)?,
        fields: options.fields.iter().cloned().collect::<BTreeMap<_, _>>(),
    };
    info!(
        files = request.files.len(),
        layout = %settings.target.layout,
        block = %settings.target.block,
        "开始处理上传文件"
    );

    let outcome = handle_upload(request, &settings)?;
    for failure in &outcome.failures {
        println!("未能处理 {}：{}", failure.name, failure.error);
    }
    if outcome.all_failed() {
        return Err(FrontendError::AllInputsFailed(outcome.eligible));
    }
    let delivery = outcome.delivery;
    let directory = options
        .output
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());
    let written = delivery.write_to_dir(&directory)?;
    match (&delivery, &written) {
        (Delivery::NoContent { message }, _) => println!("{message}"),
        (_, Some(path)) => println!("已写出：{}", path.display()),
        (_, None) => {}
    }
    Ok(written)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub version: Option<String>,
    pub layouts: Vec<LayoutSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutSummary {
    pub name: String,
    pub kind: LayoutKind,
    pub entities: usize,
    pub inserts: Vec<InsertSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

pub fn summarize(document: &Document) -> DocumentSummary {
    let layouts = document
        .layouts()
        .filter_map(|layout| document.layout(&layout.name))
        .map(|view| LayoutSummary {
            name: view.name().to_string(),
            kind: view.layout().kind,
            entities: view.entities().count(),
            inserts: view
                .entities()
                .filter_map(|entity| entity.as_block_insert())
                .map(|insert| InsertSummary {
                    name: insert.name.clone(),
                    attributes: insert
                        .attributes
                        .iter()
                        .map(|attribute| (attribute.tag.clone(), attribute.text.clone()))
                        .collect(),
                })
                .collect(),
        })
        .collect();
    DocumentSummary {
        version: document.header_variable("$ACADVER").map(str::to_string),
        layouts,
    }
}

/// 生成 `inspect` 子命令的输出文本。
pub fn render_inspect(path: &Path, json: bool) -> Result<String, FrontendError> {
    let summary = summarize(&load_document(path)?);
    if json {
        return Ok(serde_json::to_string_pretty(&summary)?);
    }

    let mut out = format!(
        "{}（版本 {}）\n",
        path.display(),
        summary.version.as_deref().unwrap_or("未知")
    );
    for layout in &summary.layouts {
        out.push_str(&format!(
            "布局 {} [{:?}]：{} 个实体\n",
            layout.name, layout.kind, layout.entities
        ));
        for insert in &layout.inserts {
            out.push_str(&format!("  块参照 {}\n", insert.name));
            for (tag, text) in &insert.attributes {
                out.push_str(&format!("    {tag} = {text}\n"));
            }
        }
    }
    Ok(out)
}

pub fn run_inspect(path: &Path, json: bool) -> Result<(), FrontendError> {
    print!("{}", render_inspect(path, json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_splits_on_first_equals() {
        assert_eq!(
            parse_field("JOB_LOC1=A=B").unwrap(),
            ("JOB_LOC1".to_string(), "A=B".to_string())
        );
        assert_eq!(
            parse_field("JOB_LOC1=").unwrap(),
            ("JOB_LOC1".to_string(), String::new())
        );
        assert!(matches!(
            parse_field("JOB_LOC1"),
            Err(FrontendError::InvalidField(_))
        ));
        assert!(parse_field("=x").is_err());
    }

    #[test]
    fn cli_overrides_take_precedence_over_config() {
        let options = ApplyOptions {
            fields: vec![("SHEET".to_string(), "A-1".to_string())],
            layout: Some("Layout1".to_string()),
            sequential: true,
            ..ApplyOptions::default()
        };
        let settings = settings_for(&options, &AppConfig::default());
        assert_eq!(settings.target.layout, "Layout1");
        assert_eq!(settings.target.block, "ssp_ARCH_24x36");
        assert!(!settings.batch.parallel);
        assert_eq!(settings.schema.fields(), ["JOB_LOC1", "SHEET"]);
    }
}
