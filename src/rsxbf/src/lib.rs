mod error;
mod framework;
mod metadata;
mod nodes;
mod reader;

pub use error::{Result, XbfError};
pub use framework::{Framework, NoFramework};
pub use metadata::*;
pub use nodes::*;
pub use reader::{XamlDocument, XbfReader, DEFAULT_DEPTH_LIMIT};
