use stamp_core::document::{
    Attribute, BlockDefinition, BlockInsert, Entity, OpaqueEntity, PlacedEntity, Section,
};
use stamp_core::record::{GroupPair, Record};

use crate::FormatError;
use crate::reader::DxfReader;

/// 将 DXF 文本解析为段序列。实体的布局归属由 [`crate::layouts`] 在之后补全。
pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    pub(crate) fn parse(mut self) -> Result<Vec<Section>, FormatError> {
        let mut sections = Vec::new();
        let mut saw_eof = false;
        while let Some((code, value)) = self.reader.next_pair()? {
            if code != 0 {
                return Err(self.malformed(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => sections.push(self.parse_section()?),
                "EOF" => {
                    saw_eof = true;
                    break;
                }
                unexpected => {
                    return Err(self.malformed(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }

        if sections.is_empty() && !saw_eof {
            return Err(FormatError::Empty);
        }
        if !saw_eof {
            return Err(FormatError::Truncated("文档缺少 EOF 终止标记".to_string()));
        }
        Ok(sections)
    }

    fn parse_section(&mut self) -> Result<Section, FormatError> {
        let (name_code, name) = self
            .reader
            .next_pair()?
            .ok_or_else(|| FormatError::Truncated("SECTION 缺少名称（组码 2）".to_string()))?;
        if name_code != 2 {
            return Err(self.malformed(format!(
                "SECTION 名称使用了组码 {name_code}（期望 2）"
            )));
        }
        let name = name.trim().to_string();
        match name.as_str() {
            "ENTITIES" => {
                let (entities, _) = self.parse_entity_list("ENDSEC", "ENTITIES 段")?;
                Ok(Section::Entities(entities))
            }
            "BLOCKS" => self.parse_blocks(),
            _ => self.parse_generic(name),
        }
    }

    fn parse_generic(&mut self, name: String) -> Result<Section, FormatError> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((code, value)) => pairs.push(GroupPair::new(code, value)),
                None => {
                    return Err(FormatError::Truncated(format!(
                        "{name} 段未找到 ENDSEC 终止标记"
                    )));
                }
            }
        }
        Ok(Section::Generic { name, pairs })
    }

    fn parse_blocks(&mut self) -> Result<Section, FormatError> {
        let mut blocks = Vec::new();
        loop {
            let (code, value) = self
                .reader
                .next_pair()?
                .ok_or_else(|| FormatError::Truncated("BLOCKS 段提前结束".to_string()))?;
            if code != 0 {
                return Err(self.malformed(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示 BLOCK 起始）"
                )));
            }
            match value.trim() {
                "ENDSEC" => {
                    self.read_body()?;
                    break;
                }
                "BLOCK" => {
                    let record = Record {
                        kind: "BLOCK".to_string(),
                        pairs: self.read_body()?,
                    };
                    let (entities, end) = self.parse_entity_list("ENDBLK", "BLOCK 定义")?;
                    blocks.push(BlockDefinition {
                        record,
                        entities,
                        end,
                    });
                }
                other => {
                    return Err(self.malformed(format!("BLOCKS 段出现游离记录 {other}")));
                }
            }
        }
        Ok(Section::Blocks(blocks))
    }

    /// 读取实体直到 `terminator`，返回实体列表与终止记录。
    fn parse_entity_list(
        &mut self,
        terminator: &str,
        context: &str,
    ) -> Result<(Vec<PlacedEntity>, Record), FormatError> {
        let mut entities = Vec::new();
        loop {
            let (code, value) = self.reader.next_pair()?.ok_or_else(|| {
                FormatError::Truncated(format!("{context}未找到 {terminator} 终止标记"))
            })?;
            if code != 0 {
                return Err(self.malformed(format!(
                    "{context}遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }
            let kind = value.trim().to_string();
            if kind == terminator {
                let pairs = self.read_body()?;
                return Ok((entities, Record { kind, pairs }));
            }
            if matches!(kind.as_str(), "ENDSEC" | "SECTION" | "EOF") {
                return Err(FormatError::Truncated(format!(
                    "{context}未找到 {terminator} 终止标记（提前遇到 {kind}）"
                )));
            }
            let record = Record {
                kind,
                pairs: self.read_body()?,
            };
            let entity = self.parse_entity(record)?;
            entities.push(PlacedEntity::new(None, entity));
        }
    }

    fn parse_entity(&mut self, record: Record) -> Result<Entity, FormatError> {
        match record.kind.as_str() {
            "INSERT" => self.parse_insert(record),
            "POLYLINE" => {
                let followers = self.parse_vertices()?;
                Ok(Entity::Opaque(OpaqueEntity { record, followers }))
            }
            // 其余实体（包括游离的 ATTRIB/VERTEX/SEQEND）原样保留。
            _ => Ok(Entity::Opaque(OpaqueEntity::new(record))),
        }
    }

    fn parse_insert(&mut self, record: Record) -> Result<Entity, FormatError> {
        let announces_attributes = record.value(66).map(str::trim) == Some("1");
        let mut insert = BlockInsert::from_record(record)
            .ok_or_else(|| self.malformed("INSERT 缺少块名（组码 2）"))?;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ATTRIB" => {
                        let record = Record {
                            kind: "ATTRIB".to_string(),
                            pairs: self.read_body()?,
                        };
                        let attribute = Attribute::from_record(record)
                            .ok_or_else(|| self.malformed("ATTRIB 缺少标记（组码 2）"))?;
                        insert.attributes.push(attribute);
                    }
                    "SEQEND" if announces_attributes || !insert.attributes.is_empty() => {
                        insert.seqend = Some(Record {
                            kind: "SEQEND".to_string(),
                            pairs: self.read_body()?,
                        });
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(self.malformed(format!(
                        "INSERT 属性段出现意外组码 {code} 值 {value}"
                    )));
                }
                None => break,
            }
        }

        Ok(Entity::BlockInsert(insert))
    }

    fn parse_vertices(&mut self) -> Result<Vec<Record>, FormatError> {
        let mut followers = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if matches!(value.trim(), "VERTEX" | "SEQEND") => {
                    let kind = value.trim().to_string();
                    let done = kind == "SEQEND";
                    followers.push(Record {
                        kind,
                        pairs: self.read_body()?,
                    });
                    if done {
                        break;
                    }
                }
                Some(pair) => {
                    self.reader.put_back(pair);
                    break;
                }
                None => break,
            }
        }
        Ok(followers)
    }

    /// 读取到下一个 0 组为止的全部组码，0 组被回退。
    fn read_body(&mut self) -> Result<Vec<GroupPair>, FormatError> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => pairs.push(GroupPair::new(code, value)),
                None => break,
            }
        }
        Ok(pairs)
    }

    fn malformed(&self, message: impl Into<String>) -> FormatError {
        FormatError::Malformed {
            line: self.reader.line_number(),
            message: message.into(),
        }
    }
}
