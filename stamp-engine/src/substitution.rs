use std::collections::BTreeMap;

use stamp_core::document::Document;
use tracing::debug;

use crate::{DEFAULT_BLOCK, DEFAULT_LAYOUT};

/// 属性标记 → 替换文本。按标记排序遍历。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionMap(BTreeMap<String, String>);

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>, text: impl Into<String>) -> Option<String> {
        self.0.insert(tag.into(), text.into())
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.0.get(tag).map(String::as_str)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(tag, text)| (tag.as_str(), text.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstitutionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(tag, text)| (tag.into(), text.into()))
                .collect(),
        )
    }
}

/// 要替换的图框：布局名 + 块名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTarget {
    pub layout: String,
    pub block: String,
}

impl TemplateTarget {
    pub fn new(layout: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            block: block.into(),
        }
    }

    pub fn apply(&self, document: &mut Document, map: &SubstitutionMap) -> SubstitutionReport {
        substitute_report(document, &self.layout, &self.block, map)
    }
}

impl Default for TemplateTarget {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT, DEFAULT_BLOCK)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    /// 名称匹配的块参照数量。
    pub matched_inserts: usize,
    /// 被赋值的属性数量。
    pub assigned_attributes: usize,
}

impl SubstitutionReport {
    #[inline]
    pub fn changed(&self) -> bool {
        self.assigned_attributes > 0
    }
}

/// 替换 `layout` 中所有名为 `block` 的块参照里标记命中 `map` 的属性文本。
///
/// 布局或块不存在时返回 `false`，文档保持不变。
pub fn substitute(
    document: &mut Document,
    layout: &str,
    block: &str,
    map: &SubstitutionMap,
) -> bool {
    substitute_report(document, layout, block, map).changed()
}

pub fn substitute_report(
    document: &mut Document,
    layout: &str,
    block: &str,
    map: &SubstitutionMap,
) -> SubstitutionReport {
    let mut report = SubstitutionReport::default();
    if map.is_empty() {
        return report;
    }
    let Some(mut view) = document.layout_mut(layout) else {
        debug!(layout, "未找到布局，跳过替换");
        return report;
    };

    for insert in view.block_inserts_mut(block) {
        report.matched_inserts += 1;
        for attribute in insert.attributes.iter_mut() {
            // 同一块参照中的重复标记各自替换
            if let Some(text) = map.get(&attribute.tag) {
                attribute.text = text.to_string();
                report.assigned_attributes += 1;
            }
        }
    }
    debug!(
        layout,
        block,
        matched_inserts = report.matched_inserts,
        assigned_attributes = report.assigned_attributes,
        "属性替换完成"
    );
    report
}
