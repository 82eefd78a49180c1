mod disasm;
mod name;
mod object;
mod opcode;
mod stream;
mod value;

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use crate::error::{Result, XbfError};
use crate::framework::Framework;
use crate::metadata::{Buffer, BufferExt, NodeSection, XbfMetadata};

pub use disasm::{Command, Disassembly};
pub use object::{CollectionId, ObjectId, PropertyValue, XamlCollection, XamlGraph, XamlObject};
pub use opcode::Opcode;
pub use value::Value;

pub(crate) use name::NameResolver;
pub(crate) use stream::NodeReader;
use value::read_value;
