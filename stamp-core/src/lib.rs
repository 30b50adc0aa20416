pub mod record {
    use serde::{Deserialize, Serialize};

    /// DXF 文件中的一组（组码，值）。值保持原样，不做裁剪。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GroupPair {
        pub code: i32,
        pub value: String,
    }

    impl GroupPair {
        #[inline]
        pub fn new(code: i32, value: impl Into<String>) -> Self {
            Self {
                code,
                value: value.into(),
            }
        }
    }

    /// 以组码 0 开头的一条记录（实体、表项或对象）。`pairs` 不包含开头的 0 组。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Record {
        pub kind: String,
        pub pairs: Vec<GroupPair>,
    }

    impl Record {
        pub fn new(kind: impl Into<String>) -> Self {
            Self {
                kind: kind.into(),
                pairs: Vec::new(),
            }
        }

        pub fn with_pair(mut self, code: i32, value: impl Into<String>) -> Self {
            self.push(code, value);
            self
        }

        #[inline]
        pub fn push(&mut self, code: i32, value: impl Into<String>) {
            self.pairs.push(GroupPair::new(code, value));
        }

        #[inline]
        pub fn is_kind(&self, kind: &str) -> bool {
            self.kind.trim().eq_ignore_ascii_case(kind)
        }

        /// 返回记录自身的首个组码值。
        ///
        /// `102 {...}` 应用组内的组码属于反应器/扩展字典，不计入；遇到 `101`
        /// （嵌入对象）后停止查找。
        pub fn value(&self, code: i32) -> Option<&str> {
            self.own_position(code)
                .map(|index| self.pairs[index].value.as_str())
        }

        /// 改写记录自身首个组码的值，若不存在则返回 `false`。
        pub fn set_value(&mut self, code: i32, value: impl Into<String>) -> bool {
            match self.own_position(code) {
                Some(index) => {
                    self.pairs[index].value = value.into();
                    true
                }
                None => false,
            }
        }

        /// 改写组码值；缺失时插入到扩展数据（1000 以上组码）与嵌入对象之前。
        pub fn set_or_insert(&mut self, code: i32, value: impl Into<String>) {
            let value = value.into();
            if self.set_value(code, value.clone()) {
                return;
            }
            let position = self
                .pairs
                .iter()
                .position(|pair| pair.code == 101 || pair.code >= 1000)
                .unwrap_or(self.pairs.len());
            self.pairs.insert(position, GroupPair::new(code, value));
        }

        /// 句柄（组码 5）。
        pub fn handle(&self) -> Option<&str> {
            self.value(5).map(str::trim).filter(|h| !h.is_empty())
        }

        /// 所有者句柄（组码 330），跳过反应器组。
        pub fn owner(&self) -> Option<&str> {
            self.value(330).map(str::trim).filter(|h| !h.is_empty())
        }

        /// 返回指定子类标记（组码 100）之后首个匹配组码的值。
        pub fn subclass_value(&self, subclass: &str, code: i32) -> Option<&str> {
            let mut current: Option<&str> = None;
            let mut in_group = false;
            for pair in &self.pairs {
                match pair.code {
                    102 => in_group = pair.value.trim_start().starts_with('{'),
                    _ if in_group => {}
                    100 => current = Some(pair.value.trim()),
                    c if c == code && current == Some(subclass) => {
                        return Some(pair.value.as_str());
                    }
                    _ => {}
                }
            }
            None
        }

        fn own_position(&self, code: i32) -> Option<usize> {
            let mut in_group = false;
            for (index, pair) in self.pairs.iter().enumerate() {
                match pair.code {
                    102 => in_group = pair.value.trim_start().starts_with('{'),
                    101 => break,
                    _ if in_group => {}
                    c if c == code => return Some(index),
                    _ => {}
                }
            }
            None
        }
    }

    /// 将扁平组码序列按组码 0 切分为记录，首个 0 组之前的组码被忽略。
    pub fn split_records(pairs: &[GroupPair]) -> Vec<Record> {
        let mut records: Vec<Record> = Vec::new();
        for pair in pairs {
            if pair.code == 0 {
                records.push(Record::new(pair.value.trim()));
            } else if let Some(current) = records.last_mut() {
                current.pairs.push(pair.clone());
            }
        }
        records
    }
}

pub mod text {
    use std::borrow::Cow;

    const ESCAPE_PREFIX: &str = "\\U+";

    /// 将 DXF 的 `\U+XXXX` 转义还原为字符，无法识别的序列原样保留。
    pub fn decode_escapes(raw: &str) -> Cow<'_, str> {
        if !raw.contains(ESCAPE_PREFIX) {
            return Cow::Borrowed(raw);
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(index) = rest.find(ESCAPE_PREFIX) {
            out.push_str(&rest[..index]);
            let tail = &rest[index + ESCAPE_PREFIX.len()..];
            let decoded = tail
                .get(..4)
                .filter(|hex| hex.bytes().all(|byte| byte.is_ascii_hexdigit()))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .and_then(char::from_u32);
            match decoded {
                Some(ch) => {
                    out.push(ch);
                    rest = &tail[4..];
                }
                None => {
                    out.push_str(ESCAPE_PREFIX);
                    rest = tail;
                }
            }
        }
        out.push_str(rest);
        Cow::Owned(out)
    }

    /// 将大于 `limit` 的字符写成 `\U+XXXX`。
    pub fn escape_above(text: &str, limit: char) -> Cow<'_, str> {
        if text.chars().all(|ch| ch <= limit) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len() + 8);
        for ch in text.chars() {
            if ch <= limit {
                out.push(ch);
            } else {
                out.push_str(&format!("{ESCAPE_PREFIX}{:04X}", u32::from(ch)));
            }
        }
        Cow::Owned(out)
    }

}

pub mod document {
    use std::collections::HashSet;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::record::{GroupPair, Record};
    use crate::text::decode_escapes;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LayoutId(usize);

    impl LayoutId {
        #[inline]
        pub fn new(index: usize) -> Self {
            Self(index)
        }

        /// 布局在文档中的序号。
        #[inline]
        pub fn get(self) -> usize {
            self.0
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum LayoutKind {
        /// 模型空间（`*Model_Space`）。
        Model,
        /// 当前激活的图纸空间（`*Paper_Space`），实体位于 ENTITIES 段且带 67=1 标记。
        ActivePaper,
        /// 其它图纸空间（`*Paper_SpaceN`），实体位于 BLOCKS 段对应块中。
        Paper,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Layout {
        pub name: String,
        pub kind: LayoutKind,
        /// 关联的 BLOCK_RECORD 句柄（大写十六进制）。R12 文档没有该信息。
        pub block_record: Option<String>,
    }

    impl Layout {
        pub fn new(name: impl Into<String>, kind: LayoutKind) -> Self {
            Self {
                name: name.into(),
                kind,
                block_record: None,
            }
        }

        pub fn with_block_record(mut self, handle: impl Into<String>) -> Self {
            self.block_record = Some(handle.into());
            self
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
        pub record: Record,
    }

    impl Attribute {
        pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
            let tag = tag.into();
            let text = text.into();
            let record = Record::new("ATTRIB")
                .with_pair(100, "AcDbEntity")
                .with_pair(8, "0")
                .with_pair(100, "AcDbText")
                .with_pair(10, "0.0")
                .with_pair(20, "0.0")
                .with_pair(30, "0.0")
                .with_pair(40, "2.5")
                .with_pair(1, text.clone())
                .with_pair(100, "AcDbAttribute")
                .with_pair(2, tag.clone())
                .with_pair(70, "0");
            Self { tag, text, record }
        }

        /// 从 ATTRIB 记录构造属性，缺少标记（组码 2）时返回 `None`。
        /// 缺失的文本视为空串，`\U+XXXX` 转义被还原。
        pub fn from_record(record: Record) -> Option<Self> {
            let tag = record.value(2)?.trim().to_string();
            let text = decode_escapes(record.value(1).unwrap_or_default()).into_owned();
            Some(Self { tag, text, record })
        }

        /// 文本与原始记录中的值不同。
        pub fn is_modified(&self) -> bool {
            decode_escapes(self.record.value(1).unwrap_or_default()).as_ref() != self.text.as_str()
        }

        /// 生成带有当前标记与文本的记录，其余组码保持原样。
        pub fn to_record(&self) -> Record {
            let mut record = self.record.clone();
            if self.is_modified() {
                record.set_or_insert(1, self.text.clone());
            }
            if record.value(2).map(str::trim) != Some(self.tag.as_str()) {
                record.set_or_insert(2, self.tag.clone());
            }
            record
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BlockInsert {
        pub name: String,
        pub record: Record,
        pub attributes: Vec<Attribute>,
        /// 属性序列的结束记录；没有属性的块参照通常为空。
        pub seqend: Option<Record>,
    }

    impl BlockInsert {
        pub fn new(name: impl Into<String>) -> Self {
            let name = name.into();
            let record = Record::new("INSERT")
                .with_pair(100, "AcDbEntity")
                .with_pair(8, "0")
                .with_pair(100, "AcDbBlockReference")
                .with_pair(2, name.clone())
                .with_pair(10, "0.0")
                .with_pair(20, "0.0")
                .with_pair(30, "0.0");
            Self {
                name,
                record,
                attributes: Vec::new(),
                seqend: None,
            }
        }

        /// 从 INSERT 记录构造块参照（尚不含属性），缺少块名时返回 `None`。
        pub fn from_record(record: Record) -> Option<Self> {
            let name = record.value(2)?.trim().to_string();
            Some(Self {
                name,
                record,
                attributes: Vec::new(),
                seqend: None,
            })
        }

        /// 追加属性，并补齐 66 标记与 SEQEND。
        pub fn with_attribute(mut self, attribute: Attribute) -> Self {
            if self.record.value(66).is_none() {
                self.record.set_or_insert(66, "1");
            }
            if self.seqend.is_none() {
                self.seqend = Some(Record::new("SEQEND").with_pair(8, "0"));
            }
            self.attributes.push(attribute);
            self
        }

        pub fn attributes_tagged<'s>(&'s self, tag: &'s str) -> impl Iterator<Item = &'s Attribute> {
            self.attributes.iter().filter(move |attribute| attribute.tag == tag)
        }

        pub fn to_record(&self) -> Record {
            let mut record = self.record.clone();
            if record.value(2).map(str::trim) != Some(self.name.as_str()) {
                record.set_or_insert(2, self.name.clone());
            }
            record
        }
    }

    /// 不参与属性替换的实体，按原始组码保存以保证无损回写。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OpaqueEntity {
        pub record: Record,
        /// 附属记录，例如 POLYLINE 之后的 VERTEX 与 SEQEND。
        pub followers: Vec<Record>,
    }

    impl OpaqueEntity {
        pub fn new(record: Record) -> Self {
            Self {
                record,
                followers: Vec::new(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Entity {
        BlockInsert(BlockInsert),
        Opaque(OpaqueEntity),
    }

    impl Entity {
        #[inline]
        pub fn record(&self) -> &Record {
            match self {
                Entity::BlockInsert(insert) => &insert.record,
                Entity::Opaque(opaque) => &opaque.record,
            }
        }

        #[inline]
        pub fn kind(&self) -> &str {
            self.record().kind.as_str()
        }

        pub fn handle(&self) -> Option<&str> {
            self.record().handle()
        }

        pub fn owner(&self) -> Option<&str> {
            self.record().owner()
        }

        /// 组码 67 = 1 表示实体位于图纸空间。
        pub fn in_paper_space(&self) -> bool {
            self.record().value(67).map(str::trim) == Some("1")
        }

        pub fn as_block_insert(&self) -> Option<&BlockInsert> {
            match self {
                Entity::BlockInsert(insert) => Some(insert),
                Entity::Opaque(_) => None,
            }
        }
    }

    /// 实体及其所属布局。不属于任何布局（普通块定义中的实体）时 `layout` 为空。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PlacedEntity {
        pub layout: Option<LayoutId>,
        pub entity: Entity,
    }

    impl PlacedEntity {
        pub fn new(layout: Option<LayoutId>, entity: Entity) -> Self {
            Self { layout, entity }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub record: Record,
        pub entities: Vec<PlacedEntity>,
        pub end: Record,
    }

    impl BlockDefinition {
        pub fn name(&self) -> Option<&str> {
            self.record.value(2).map(str::trim)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Section {
        /// HEADER、TABLES、OBJECTS 等不需要建模的段，保留全部组码。
        Generic { name: String, pairs: Vec<GroupPair> },
        Blocks(Vec<BlockDefinition>),
        Entities(Vec<PlacedEntity>),
    }

    impl Section {
        pub fn name(&self) -> &str {
            match self {
                Section::Generic { name, .. } => name,
                Section::Blocks(_) => "BLOCKS",
                Section::Entities(_) => "ENTITIES",
            }
        }

        pub fn placed(&self) -> Box<dyn Iterator<Item = &PlacedEntity> + '_> {
            match self {
                Section::Entities(entities) => Box::new(entities.iter()),
                Section::Blocks(blocks) => {
                    Box::new(blocks.iter().flat_map(|block| block.entities.iter()))
                }
                Section::Generic { .. } => Box::new(std::iter::empty()),
            }
        }

        pub fn placed_mut(&mut self) -> Box<dyn Iterator<Item = &mut PlacedEntity> + '_> {
            match self {
                Section::Entities(entities) => Box::new(entities.iter_mut()),
                Section::Blocks(blocks) => {
                    Box::new(blocks.iter_mut().flat_map(|block| block.entities.iter_mut()))
                }
                Section::Generic { .. } => Box::new(std::iter::empty()),
            }
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub enum TextEncoding {
        #[default]
        Utf8,
        /// 非 UTF-8 字节按 Latin-1 逐字节映射，回写时保持原字节。
        Latin1,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub enum LineEnding {
        #[default]
        Lf,
        CrLf,
    }

    impl LineEnding {
        #[inline]
        pub fn as_str(self) -> &'static str {
            match self {
                LineEnding::Lf => "\n",
                LineEnding::CrLf => "\r\n",
            }
        }
    }

    /// 来源文件的文本格式，回写时沿用。
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SourceFormat {
        pub encoding: TextEncoding,
        pub line_ending: LineEnding,
        pub byte_order_mark: bool,
        /// R2007 之前的文件按 `$DWGCODEPAGE` 代码页保存，改写的非 ASCII 文本写成 `\U+XXXX`。
        pub escape_non_ascii: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum DocumentError {
        #[error("布局名称重复：{0}")]
        DuplicateLayout(String),
        #[error("布局序号 {0} 不存在")]
        UnknownLayout(usize),
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Document {
        sections: Vec<Section>,
        layouts: Vec<Layout>,
        format: SourceFormat,
    }

    impl Default for Document {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Document {
        /// 创建仅含模型空间布局与空 ENTITIES 段的文档。
        pub fn new() -> Self {
            Self {
                sections: vec![Section::Entities(Vec::new())],
                layouts: vec![Layout::new("Model", LayoutKind::Model)],
                format: SourceFormat::default(),
            }
        }

        /// 由解码器组装文档，校验布局名称唯一且实体引用的布局存在。
        pub fn from_parts(
            sections: Vec<Section>,
            layouts: Vec<Layout>,
            format: SourceFormat,
        ) -> Result<Self, DocumentError> {
            let mut names = HashSet::new();
            for layout in &layouts {
                if !names.insert(layout.name.as_str()) {
                    return Err(DocumentError::DuplicateLayout(layout.name.clone()));
                }
            }
            for placed in sections.iter().flat_map(Section::placed) {
                if let Some(id) = placed.layout {
                    if id.get() >= layouts.len() {
                        return Err(DocumentError::UnknownLayout(id.get()));
                    }
                }
            }
            Ok(Self {
                sections,
                layouts,
                format,
            })
        }

        #[inline]
        pub fn format(&self) -> SourceFormat {
            self.format
        }

        pub fn set_format(&mut self, format: SourceFormat) {
            self.format = format;
        }

        pub fn sections(&self) -> &[Section] {
            &self.sections
        }

        pub fn layouts(&self) -> impl Iterator<Item = &Layout> {
            self.layouts.iter()
        }

        pub fn layout_id(&self, name: &str) -> Option<LayoutId> {
            self.layouts
                .iter()
                .position(|layout| layout.name == name)
                .map(LayoutId::new)
        }

        pub fn layout(&self, name: &str) -> Option<LayoutView<'_>> {
            let id = self.layout_id(name)?;
            Some(LayoutView {
                id,
                layout: &self.layouts[id.get()],
                sections: &self.sections,
            })
        }

        pub fn layout_mut(&mut self, name: &str) -> Option<LayoutViewMut<'_>> {
            let id = self.layout_id(name)?;
            let Self {
                sections, layouts, ..
            } = self;
            Some(LayoutViewMut {
                id,
                layout: &layouts[id.get()],
                sections: sections.as_mut_slice(),
            })
        }

        pub fn add_layout(&mut self, layout: Layout) -> Result<LayoutId, DocumentError> {
            if self.layout_id(&layout.name).is_some() {
                return Err(DocumentError::DuplicateLayout(layout.name));
            }
            self.layouts.push(layout);
            Ok(LayoutId::new(self.layouts.len() - 1))
        }

        /// 将实体追加到 ENTITIES 段末尾（不存在时创建该段）。
        pub fn push_entity(&mut self, layout: LayoutId, entity: Entity) -> Result<(), DocumentError> {
            if layout.get() >= self.layouts.len() {
                return Err(DocumentError::UnknownLayout(layout.get()));
            }
            let placed = PlacedEntity::new(Some(layout), entity);
            let existing = self.sections.iter_mut().find_map(|section| match section {
                Section::Entities(entities) => Some(entities),
                _ => None,
            });
            match existing {
                Some(entities) => entities.push(placed),
                None => self.sections.push(Section::Entities(vec![placed])),
            }
            Ok(())
        }

        /// 按文件顺序遍历所有实体（含块定义内部实体）。
        pub fn entities(&self) -> impl Iterator<Item = &PlacedEntity> {
            self.sections.iter().flat_map(Section::placed)
        }

        /// 读取 HEADER 段变量，例如 `$ACADVER`。
        pub fn header_variable(&self, name: &str) -> Option<&str> {
            let pairs = self.sections.iter().find_map(|section| match section {
                Section::Generic {
                    name: section_name,
                    pairs,
                } if section_name == "HEADER" => Some(pairs),
                _ => None,
            })?;
            let mut iter = pairs.iter();
            while let Some(pair) = iter.next() {
                if pair.code == 9 && pair.value.trim() == name {
                    return iter.next().map(|value| value.value.trim());
                }
            }
            None
        }
    }

    /// 布局的只读视图。
    #[derive(Debug, Clone, Copy)]
    pub struct LayoutView<'a> {
        id: LayoutId,
        layout: &'a Layout,
        sections: &'a [Section],
    }

    impl<'a> LayoutView<'a> {
        #[inline]
        pub fn id(&self) -> LayoutId {
            self.id
        }

        #[inline]
        pub fn layout(&self) -> &'a Layout {
            self.layout
        }

        #[inline]
        pub fn name(&self) -> &'a str {
            &self.layout.name
        }

        pub fn entities(&self) -> impl Iterator<Item = &'a Entity> + 'a {
            let id = self.id;
            self.sections
                .iter()
                .flat_map(Section::placed)
                .filter(move |placed| placed.layout == Some(id))
                .map(|placed| &placed.entity)
        }

        /// 按文档顺序线性扫描名称等于 `name` 的块参照。
        pub fn block_inserts<'s>(
            &'s self,
            name: &'s str,
        ) -> impl Iterator<Item = &'a BlockInsert> + 's {
            self.entities().filter_map(move |entity| match entity {
                Entity::BlockInsert(insert) if insert.name == name => Some(insert),
                _ => None,
            })
        }
    }

    /// 布局的可变视图，持有文档各段的独占借用。
    #[derive(Debug)]
    pub struct LayoutViewMut<'a> {
        id: LayoutId,
        layout: &'a Layout,
        sections: &'a mut [Section],
    }

    impl<'a> LayoutViewMut<'a> {
        #[inline]
        pub fn id(&self) -> LayoutId {
            self.id
        }

        #[inline]
        pub fn name(&self) -> &str {
            &self.layout.name
        }

        pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> + '_ {
            let id = self.id;
            self.sections
                .iter_mut()
                .flat_map(Section::placed_mut)
                .filter(move |placed| placed.layout == Some(id))
                .map(|placed| &mut placed.entity)
        }

        pub fn block_inserts_mut<'s>(
            &'s mut self,
            name: &'s str,
        ) -> impl Iterator<Item = &'s mut BlockInsert> + 's {
            self.entities_mut().filter_map(move |entity| match entity {
                Entity::BlockInsert(insert) if insert.name == name => Some(insert),
                _ => None,
            })
        }
    }

}
