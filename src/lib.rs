pub mod filename;
pub mod frontmatter;
pub mod index;
pub mod links;
pub mod pipeline;

use std::fs;
use std::path::Path;

pub use frontmatter::types::{FieldValue, Frontmatter};
pub use frontmatter::FrontmatterParser;
pub use index::{
    FileRecord, GraphEdge, GraphExport, GraphNode, IndexStats, KnowledgeIndex,
    DEFAULT_MAX_RESULTS, DEFAULT_MIN_RELEVANCE,
};
pub use links::{LinkInferencer, LinkOpportunity, AUTO_LINK_MIN_CONFIDENCE};
pub use pipeline::{GraphStats, NotePipeline};

/// Atomic file write: write to a temp file in the same directory, then rename.
/// A crash mid-write leaves the previous file contents intact; readers never
/// observe a truncated file.
pub(crate) fn atomic_write_file(path: &Path, content: &[u8]) -> Result<(), String> {
    use std::io::Write;

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}.notegraph-tmp", file_name));

    let mut file = fs::File::create(&temp_path)
        .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;
    file.write_all(content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;
    file.sync_all()
        .map_err(|e| format!("Failed to sync temp file {:?}: {}", temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} -> {:?}: {}", temp_path, path, e))?;

    Ok(())
}
