// ABOUTME: Query catalog over the mirrored component documentation
// ABOUTME: Markdown/MDX filters, component lookup and the immutable tool/resource table

pub mod capabilities;
pub mod catalog;
pub mod error;
pub mod markdown;

pub use capabilities::{CapabilitySet, DocsTool};
pub use catalog::{ComponentDoc, ComponentName, ComponentSummary, DocsLayout, DocsLibrary};
pub use error::ToolError;
