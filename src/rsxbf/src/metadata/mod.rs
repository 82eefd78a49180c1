mod buffer;
mod header;
mod tables;

use std::io::{Cursor, Read};
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::error::{Result, XbfError};

pub(crate) use buffer::{Buffer, BufferExt};
pub use header::XbfHeader;
pub use tables::*;
