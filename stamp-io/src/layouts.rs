use std::collections::HashMap;

use stamp_core::document::{Document, Layout, LayoutId, LayoutKind, Section, SourceFormat};
use stamp_core::record::{Record, split_records};

use crate::FormatError;

const MODEL_SPACE: &str = "*Model_Space";
const PAPER_SPACE: &str = "*Paper_Space";
// R12 的模型/图纸空间块名
const R12_MODEL_SPACE: &str = "$MODEL_SPACE";
const R12_PAPER_SPACE: &str = "$PAPER_SPACE";

/// 解析布局并为每个实体标注所属布局，随后组装文档。
pub(crate) fn assemble(
    mut sections: Vec<Section>,
    format: SourceFormat,
) -> Result<Document, FormatError> {
    let block_records = collect_block_records(&sections);
    let layouts = collect_layouts(&sections, &block_records);
    place_entities(&mut sections, &layouts, &block_records);
    Ok(Document::from_parts(sections, layouts, format)?)
}

#[inline]
fn normalize_handle(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn generic_records(sections: &[Section], section_name: &str) -> Vec<Record> {
    sections
        .iter()
        .filter_map(|section| match section {
            Section::Generic { name, pairs } if name == section_name => Some(split_records(pairs)),
            _ => None,
        })
        .flatten()
        .collect()
}

/// BLOCK_RECORD 句柄 → 名称。
fn collect_block_records(sections: &[Section]) -> HashMap<String, String> {
    generic_records(sections, "TABLES")
        .into_iter()
        .filter(|record| record.is_kind("BLOCK_RECORD"))
        .filter_map(|record| {
            let handle = normalize_handle(record.handle()?);
            let name = record.value(2)?.trim().to_string();
            Some((handle, name))
        })
        .collect()
}

fn kind_for_block_name(name: &str) -> Option<LayoutKind> {
    if name.eq_ignore_ascii_case(MODEL_SPACE) || name.eq_ignore_ascii_case(R12_MODEL_SPACE) {
        Some(LayoutKind::Model)
    } else if name.eq_ignore_ascii_case(PAPER_SPACE) || name.eq_ignore_ascii_case(R12_PAPER_SPACE)
    {
        Some(LayoutKind::ActivePaper)
    } else {
        None
    }
}

fn collect_layouts(sections: &[Section], block_records: &HashMap<String, String>) -> Vec<Layout> {
    let mut found: Vec<(i32, Layout)> = generic_records(sections, "OBJECTS")
        .iter()
        .filter(|record| record.is_kind("LAYOUT"))
        .filter_map(|record| {
            // AcDbPlotSettings 子类中的组码 1 是页面设置名，布局名只取 AcDbLayout 子类
            let name = record.subclass_value("AcDbLayout", 1)?.trim().to_string();
            let block_record = record
                .subclass_value("AcDbLayout", 330)
                .map(normalize_handle)
                .filter(|handle| !handle.is_empty());
            let tab_order = record
                .subclass_value("AcDbLayout", 71)
                .and_then(|raw| raw.trim().parse::<i32>().ok())
                .unwrap_or(0);
            let kind = block_record
                .as_ref()
                .and_then(|handle| block_records.get(handle))
                .and_then(|record_name| kind_for_block_name(record_name))
                .unwrap_or(if name == "Model" {
                    LayoutKind::Model
                } else {
                    LayoutKind::Paper
                });
            let mut layout = Layout::new(name, kind);
            layout.block_record = block_record;
            Some((tab_order, layout))
        })
        .collect();

    if found.is_empty() {
        return synthetic_layouts(block_records);
    }
    found.sort_by_key(|(tab_order, _)| *tab_order);
    found.into_iter().map(|(_, layout)| layout).collect()
}

/// 没有 LAYOUT 对象（R12）时使用固定的 `Model` 与 `Layout1`。
fn synthetic_layouts(block_records: &HashMap<String, String>) -> Vec<Layout> {
    let handle_of = |kind: LayoutKind| {
        block_records
            .iter()
            .find(|(_, name)| kind_for_block_name(name) == Some(kind))
            .map(|(handle, _)| handle.clone())
    };
    let mut model = Layout::new("Model", LayoutKind::Model);
    model.block_record = handle_of(LayoutKind::Model);
    let mut paper = Layout::new("Layout1", LayoutKind::ActivePaper);
    paper.block_record = handle_of(LayoutKind::ActivePaper);
    vec![model, paper]
}

fn place_entities(
    sections: &mut [Section],
    layouts: &[Layout],
    block_records: &HashMap<String, String>,
) {
    let by_record: HashMap<&str, LayoutId> = layouts
        .iter()
        .enumerate()
        .filter_map(|(index, layout)| {
            layout
                .block_record
                .as_deref()
                .map(|handle| (handle, LayoutId::new(index)))
        })
        .collect();
    let first_of = |kind: LayoutKind| {
        layouts
            .iter()
            .position(|layout| layout.kind == kind)
            .map(LayoutId::new)
    };
    let model = first_of(LayoutKind::Model);
    let active_paper = first_of(LayoutKind::ActivePaper);

    for section in sections.iter_mut() {
        match section {
            Section::Entities(entities) => {
                for placed in entities.iter_mut() {
                    let owned = placed
                        .entity
                        .owner()
                        .and_then(|owner| by_record.get(normalize_handle(owner).as_str()))
                        .copied();
                    placed.layout = owned.or(if placed.entity.in_paper_space() {
                        active_paper
                    } else {
                        model
                    });
                }
            }
            Section::Blocks(blocks) => {
                for block in blocks.iter_mut() {
                    let by_owner = block
                        .record
                        .owner()
                        .and_then(|owner| by_record.get(normalize_handle(owner).as_str()))
                        .copied();
                    let target = by_owner.or_else(|| {
                        let name = block.name()?;
                        match kind_for_block_name(name) {
                            Some(LayoutKind::Model) => model,
                            Some(_) => active_paper,
                            None => layouts
                                .iter()
                                .position(|layout| {
                                    layout
                                        .block_record
                                        .as_ref()
                                        .and_then(|handle| block_records.get(handle))
                                        .is_some_and(|record_name| {
                                            record_name.eq_ignore_ascii_case(name)
                                        })
                                })
                                .map(LayoutId::new),
                        }
                    });
                    for placed in block.entities.iter_mut() {
                        placed.layout = target;
                    }
                }
            }
            Section::Generic { .. } => {}
        }
    }
}
