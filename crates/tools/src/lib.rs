//! Built-in tools for mnemo.
//!
//! - [`registry`]: `Tool` trait and the tag-aware `ToolRegistry`
//! - [`memory`]: MEMORY.md / dated-note writers, memory reader, recall search
//! - [`file_ops`]: workspace-confined `read_file` / `write_file` / `list_dir`

pub mod file_ops;
pub mod memory;
pub mod registry;

pub use memory::{register_memory_tools, DAILY_NOTE_TOOL, RECALL_TOOL};
pub use file_ops::register_file_tools;
pub use registry::{Tool, ToolAccess, ToolRegistry, ToolTags};
