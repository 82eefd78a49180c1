
use super::*;

// "XBF\0"
static XBF_MAGIC: [u8; 4] = [0x58, 0x42, 0x46, 0x00];

/// # XBF file header
///
/// Every XBF file starts with a fixed-layout header:
///
/// | Offset | Size | Field          | Description |
/// | ------ | ---- | -------------- | ----------- |
/// | 0x00   | 4    | Magic          | `58 42 46 00`, "XBF\0". |
/// | 0x04   | 4    | MetadataSize   | Size in bytes of the metadata tables following the header. |
/// | 0x08   | 4    | NodeSize       | Size in bytes of the node stream region. |
/// | 0x0C   | 4    | MajorVersion   | `2` for XBF v2; this reader rejects anything else. |
/// | 0x10   | 4    | MinorVersion   | Minor format version. |
/// | 0x14   | 8    | StringTableOffset        | Offsets of the individual metadata |
/// | 0x1C   | 8    | AssemblyTableOffset      | tables. The tables are laid out |
/// | 0x24   | 8    | TypeNamespaceTableOffset | back to back in this same order, |
/// | 0x2C   | 8    | TypeTableOffset          | so the reader consumes them |
/// | 0x34   | 8    | PropertyTableOffset      | sequentially and keeps the offsets |
/// | 0x3C   | 8    | XmlNamespaceTableOffset  | only for the caller. |
/// | 0x44   | 64   | Hash           | 32 UTF-16 characters of build hash. |
#[derive(Debug)]
pub struct XbfHeader {
    pub metadata_size: u32,
    pub node_size: u32,
    pub major_version: u32,
    pub minor_version: u32,
    pub string_table_offset: u64,
    pub assembly_table_offset: u64,
    pub type_namespace_table_offset: u64,
    pub type_table_offset: u64,
    pub property_table_offset: u64,
    pub xml_namespace_table_offset: u64,
    pub hash: String,
}

impl XbfHeader {
    pub fn read_from(buffer: &mut Buffer) -> Result<XbfHeader> {
        let mut magic = [0u8; 4];
        buffer.read_exact(&mut magic)?;
        if magic != XBF_MAGIC {
            return Err(XbfError::InvalidMagic);
        }

        let metadata_size = buffer.read_u32::<LittleEndian>()?;
        let node_size = buffer.read_u32::<LittleEndian>()?;
        let major_version = buffer.read_u32::<LittleEndian>()?;
        let minor_version = buffer.read_u32::<LittleEndian>()?;

        if major_version != 2 {
            return Err(XbfError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let string_table_offset = buffer.read_u64::<LittleEndian>()?;
        let assembly_table_offset = buffer.read_u64::<LittleEndian>()?;
        let type_namespace_table_offset = buffer.read_u64::<LittleEndian>()?;
        let type_table_offset = buffer.read_u64::<LittleEndian>()?;
        let property_table_offset = buffer.read_u64::<LittleEndian>()?;
        let xml_namespace_table_offset = buffer.read_u64::<LittleEndian>()?;
        let hash = buffer.read_chars(32)?;

        Ok(XbfHeader {
            metadata_size,
            node_size,
            major_version,
            minor_version,
            string_table_offset,
            assembly_table_offset,
            type_namespace_table_offset,
            type_table_offset,
            property_table_offset,
            xml_namespace_table_offset,
            hash,
        })
    }
}
