
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XbfError>;

/// Failures raised while loading or interpreting an XBF v2 file.
///
/// Every failure is fatal to the parse call that raised it; nothing is
/// retried and nothing is skipped. Errors coming out of the node stream
/// interpreter are wrapped in [`XbfError::NodeStream`] with the absolute
/// position at which dispatch began, keeping the inner cause intact.
#[derive(Debug, Error)]
pub enum XbfError {
    #[error("invalid magic number, not an XBF file")]
    InvalidMagic,

    #[error("unsupported XBF version {major}.{minor}, only 2.x is supported")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("unexpected byte at position 0x{position:X}")]
    UnexpectedByte { position: u64 },

    #[error("unknown opcode 0x{opcode:02X} at position 0x{position:X}")]
    UnknownOpcode { opcode: u8, position: u64 },

    #[error("unknown property value type 0x{tag:02X}")]
    UnknownValueType { tag: u8 },

    #[error("unknown node section kind {kind}")]
    UnknownSectionKind { kind: u32 },

    #[error("object or collection stack corrupted")]
    StackCorruption,

    #[error("reader has been closed")]
    Disposed,

    #[error("node section recursion deeper than the configured limit")]
    DepthExceeded,

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error("i/o error reading the file")]
    Io(#[source] std::io::Error),

    #[error("node stream error at position 0x{position:X} (node section base 0x{section_base:X})")]
    NodeStream {
        position: u64,
        section_base: u64,
        #[source]
        source: Box<XbfError>,
    },
}

impl XbfError {
    /// Peels [`XbfError::NodeStream`] wrappers down to the innermost cause.
    pub fn root_cause(&self) -> &XbfError {
        match self {
            XbfError::NodeStream { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for XbfError {
    fn from(error: std::io::Error) -> XbfError {
        // Parsing reads the in-memory buffer, where the only reachable io
        // error is running off the end. Anything else comes from opening
        // the file.
        match error.kind() {
            std::io::ErrorKind::UnexpectedEof => XbfError::UnexpectedEof,
            _ => XbfError::Io(error),
        }
    }
}
