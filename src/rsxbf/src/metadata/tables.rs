
use super::*;

/// # Metadata tables
///
/// The header is followed by six metadata tables plus, in v2, a node section
/// directory. Each table is an i32 record count followed by that many
/// fixed-layout records. The tables appear in this order:
///
/// | Table          | Record layout |
/// | -------------- | ------------- |
/// | String         | i32 character count, UTF-16 code units, u16 `0x0000` terminator. |
/// | Assembly       | `{ kind: i32, name_id: i32 }` |
/// | TypeNamespace  | `{ assembly_id: i32, name_id: i32 }` |
/// | Type           | `{ flags: i32, namespace_id: i32, name_id: i32 }` |
/// | Property       | `{ flags: i32, type_id: i32, name_id: i32 }` |
/// | XmlNamespace   | `{ name_id: i32 }` |
/// | NodeSection    | `{ node_offset: i32, positional_offset: i32 }` |
///
/// The byte immediately after the node section directory is the base every
/// `node_offset` / `positional_offset` is relative to.
#[derive(Debug)]
pub struct XbfMetadata {
    pub header: XbfHeader,
    pub strings: Vec<String>,
    pub assemblies: Vec<AssemblyRow>,
    pub type_namespaces: Vec<TypeNamespaceRow>,
    pub types: Vec<TypeRow>,
    pub properties: Vec<PropertyRow>,
    pub xml_namespaces: Vec<XmlNamespaceRow>,
    pub node_sections: Vec<NodeSection>,
    pub node_section_base: u64,
}

impl XbfMetadata {
    pub fn read_from(buffer: &mut Buffer) -> Result<XbfMetadata> {
        let header = XbfHeader::read_from(buffer)?;

        let strings = read_string_table(buffer)?;
        let assemblies = read_rows(buffer)?;
        let type_namespaces = read_rows(buffer)?;
        let types = read_rows(buffer)?;
        let properties = read_rows(buffer)?;
        let xml_namespaces = read_rows(buffer)?;
        let node_sections = read_rows(buffer)?;
        let node_section_base = buffer.position();

        debug!(
            "loaded XBF metadata: {} strings, {} types, {} properties, {} node sections",
            strings.len(),
            types.len(),
            properties.len(),
            node_sections.len()
        );

        Ok(XbfMetadata {
            header,
            strings,
            assemblies,
            type_namespaces,
            types,
            properties,
            xml_namespaces,
            node_sections,
            node_section_base,
        })
    }

    pub fn string(&self, id: u32) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    pub fn type_row(&self, id: u16) -> Option<&TypeRow> {
        self.types.get(id as usize)
    }

    pub fn property_row(&self, id: u16) -> Option<&PropertyRow> {
        self.properties.get(id as usize)
    }

    pub fn xml_namespace(&self, id: u16) -> Option<&str> {
        self.xml_namespaces
            .get(id as usize)
            .and_then(|row| self.string(row.name_id as u32))
    }

    pub fn node_section(&self, index: usize) -> Option<&NodeSection> {
        self.node_sections.get(index)
    }
}

fn read_rows<T: TableRow>(buffer: &mut Buffer) -> Result<Vec<T>> {
    let count = buffer.read_i32::<LittleEndian>()?;
    let mut rows = Vec::new();
    for _ in 0..count {
        rows.push(T::read_from(buffer)?);
    }
    Ok(rows)
}

fn read_string_table(buffer: &mut Buffer) -> Result<Vec<String>> {
    let count = buffer.read_i32::<LittleEndian>()?;
    let mut strings = Vec::new();
    for _ in 0..count {
        let string = buffer.read_len_string()?;
        // v2 strings carry a u16 terminator that is always zero.
        let position = buffer.position();
        if buffer.read_u16::<LittleEndian>()? != 0 {
            return Err(XbfError::UnexpectedByte { position });
        }
        strings.push(string);
    }
    Ok(strings)
}

pub trait TableRow {
    fn read_from(buffer: &mut Buffer) -> Result<Self>
    where
        Self: Sized;
}

/// The provider an assembly record points at. The values are documented for
/// XBF v1 and not re-verified for v2, so [`AssemblyRow`] keeps the raw
/// integer around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    Unknown,
    Native,
    Managed,
    System,
    Parser,
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyRow {
    pub kind: i32,
    pub name_id: i32,
}

impl AssemblyRow {
    pub fn kind(&self) -> Option<AssemblyKind> {
        match self.kind {
            0 => Some(AssemblyKind::Unknown),
            1 => Some(AssemblyKind::Native),
            2 => Some(AssemblyKind::Managed),
            3 => Some(AssemblyKind::System),
            4 => Some(AssemblyKind::Parser),
            5 => Some(AssemblyKind::Alternate),
            _ => None,
        }
    }
}

impl TableRow for AssemblyRow {
    fn read_from(buffer: &mut Buffer) -> Result<AssemblyRow> {
        Ok(AssemblyRow {
            kind: buffer.read_i32::<LittleEndian>()?,
            name_id: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeNamespaceRow {
    pub assembly_id: i32,
    pub name_id: i32,
}

impl TableRow for TypeNamespaceRow {
    fn read_from(buffer: &mut Buffer) -> Result<TypeNamespaceRow> {
        Ok(TypeNamespaceRow {
            assembly_id: buffer.read_i32::<LittleEndian>()?,
            name_id: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

/// The flags are documented for XBF v1 and surfaced raw rather than decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeRow {
    pub flags: i32,
    pub namespace_id: i32,
    pub name_id: i32,
}

impl TableRow for TypeRow {
    fn read_from(buffer: &mut Buffer) -> Result<TypeRow> {
        Ok(TypeRow {
            flags: buffer.read_i32::<LittleEndian>()?,
            namespace_id: buffer.read_i32::<LittleEndian>()?,
            name_id: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

/// `type_id` is the declaring type; it occupies the slot `namespace_id` has
/// in [`TypeRow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRow {
    pub flags: i32,
    pub type_id: i32,
    pub name_id: i32,
}

impl TableRow for PropertyRow {
    fn read_from(buffer: &mut Buffer) -> Result<PropertyRow> {
        Ok(PropertyRow {
            flags: buffer.read_i32::<LittleEndian>()?,
            type_id: buffer.read_i32::<LittleEndian>()?,
            name_id: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XmlNamespaceRow {
    pub name_id: i32,
}

impl TableRow for XmlNamespaceRow {
    fn read_from(buffer: &mut Buffer) -> Result<XmlNamespaceRow> {
        Ok(XmlNamespaceRow {
            name_id: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

/// One entry of the v2 node section directory. `node_offset` locates the
/// section's node bytes relative to the first node section base;
/// `positional_offset` marks the end of the nodes and the start of the
/// positional (line/column) metadata, and doubles as the section's end
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSection {
    pub node_offset: i32,
    pub positional_offset: i32,
}

impl TableRow for NodeSection {
    fn read_from(buffer: &mut Buffer) -> Result<NodeSection> {
        Ok(NodeSection {
            node_offset: buffer.read_i32::<LittleEndian>()?,
            positional_offset: buffer.read_i32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_string(s: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(s.len() as i32).to_le_bytes());
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn string_table_round_trip() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend(table_string("Grid"));
        bytes.extend(table_string(""));
        let strings = read_string_table(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(strings, vec!["Grid".to_string(), String::new()]);
    }

    #[test]
    fn string_table_rejects_nonzero_terminator() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        let err = read_string_table(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, XbfError::UnexpectedByte { .. }));
    }

    #[test]
    fn assembly_kind_keeps_raw_value() {
        let row = AssemblyRow { kind: 17, name_id: 0 };
        assert!(row.kind().is_none());
        assert_eq!(row.kind, 17);
        let row = AssemblyRow { kind: 2, name_id: 0 };
        assert_eq!(row.kind(), Some(AssemblyKind::Managed));
    }
}
