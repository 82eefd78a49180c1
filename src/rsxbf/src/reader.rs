
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use log::debug;

use crate::error::{Result, XbfError};
use crate::framework::Framework;
use crate::metadata::{Buffer, XbfMetadata};
use crate::nodes::{Disassembly, NodeReader, ObjectId, XamlGraph};

/// Default bound on node section recursion depth.
pub const DEFAULT_DEPTH_LIMIT: usize = 256;

/// The object tree assembled by a root parse: the arena plus the handle of
/// the root object.
#[derive(Debug)]
pub struct XamlDocument {
    pub graph: XamlGraph,
    pub root: ObjectId,
}

/// Reader over one XBF v2 file.
///
/// Opening loads the header and the metadata tables; they stay available for
/// the reader's lifetime. The node stream is interpreted on demand, either
/// into an object tree or into a disassembly trace. The reader is stateful
/// and single-threaded; concurrent use needs one reader per caller. A parse
/// that fails leaves no usable partial result, but the reader itself can
/// start over from the same bytes.
#[derive(Debug)]
pub struct XbfReader {
    buffer: Option<Buffer>,
    metadata: XbfMetadata,
    depth_limit: usize,
}

impl XbfReader {
    pub fn open(path: impl AsRef<Path>) -> Result<XbfReader> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        XbfReader::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<XbfReader> {
        let mut buffer = Cursor::new(data);
        let metadata = XbfMetadata::read_from(&mut buffer)?;
        Ok(XbfReader {
            buffer: Some(buffer),
            metadata,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        })
    }

    pub fn metadata(&self) -> &XbfMetadata {
        &self.metadata
    }

    /// Caps how deep section references may recurse before the parse fails
    /// with [`XbfError::DepthExceeded`].
    pub fn set_depth_limit(&mut self, depth_limit: usize) {
        self.depth_limit = depth_limit;
    }

    /// Parses node section 0 as a root and returns the assembled tree.
    pub fn read_root_node_section(&mut self, framework: &dyn Framework) -> Result<XamlDocument> {
        let buffer = self.buffer.as_mut().ok_or(XbfError::Disposed)?;
        let base = self.metadata.node_section_base;
        debug!("reading root node section at base 0x{:X}", base);

        let mut nodes = NodeReader::new(buffer, &self.metadata, framework, self.depth_limit, false);
        let result = nodes.read_root_section();
        let position = nodes.last_dispatch();
        let graph = nodes.into_graph();
        match result {
            Ok(root) => Ok(XamlDocument { graph, root }),
            Err(error) => Err(XbfError::NodeStream {
                position,
                section_base: base,
                source: Box::new(error),
            }),
        }
    }

    /// Parses node section 0 as a root with trace recording on.
    pub fn disassemble_root_node_section(&mut self, framework: &dyn Framework) -> Result<Disassembly> {
        self.disassemble(framework, None)
    }

    /// Interprets one node section with trace recording on. Sections that
    /// expect interpreter context from their referrer (style setter values,
    /// for instance) may not disassemble standalone.
    pub fn disassemble_node_section(
        &mut self,
        framework: &dyn Framework,
        index: usize,
    ) -> Result<Disassembly> {
        self.disassemble(framework, Some(index))
    }

    fn disassemble(&mut self, framework: &dyn Framework, section: Option<usize>) -> Result<Disassembly> {
        let buffer = self.buffer.as_mut().ok_or(XbfError::Disposed)?;
        let base = self.metadata.node_section_base;

        let mut nodes = NodeReader::new(buffer, &self.metadata, framework, self.depth_limit, true);
        let result = match section {
            None => nodes.read_root_section().map(|_| ()),
            Some(index) => nodes.read_section(index),
        };
        let position = nodes.last_dispatch();
        let disassembly = nodes.into_disassembly();
        match result {
            Ok(()) => Ok(disassembly),
            Err(error) => Err(XbfError::NodeStream {
                position,
                section_base: base,
                source: Box::new(error),
            }),
        }
    }

    /// Releases the underlying bytes. Any later parse fails with
    /// [`XbfError::Disposed`].
    pub fn close(&mut self) {
        self.buffer = None;
    }
}
