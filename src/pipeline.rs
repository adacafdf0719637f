use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::atomic_write_file;
use crate::filename;
use crate::frontmatter::FrontmatterParser;
use crate::index::{KnowledgeIndex, DEFAULT_MAX_RESULTS, DEFAULT_MIN_RELEVANCE};
use crate::links::{LinkInferencer, AUTO_LINK_MIN_CONFIDENCE};

/// Topics come from the first few second-level headings of a body.
const MAX_TOPICS_PER_NOTE: usize = 5;

static TOPIC_HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## (.+)$").unwrap());

/// Aggregate view over the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub total_files: usize,
    pub total_links: usize,
    pub unique_topics: usize,
    pub unique_tags: usize,
}

/// Drives one note at a time through parse -> index -> link inference ->
/// persist. Owns the knowledge index handle for its lifetime; collaborators
/// that produce the raw text or load documents stay outside.
pub struct NotePipeline {
    output_dir: PathBuf,
    index: KnowledgeIndex,
}

impl NotePipeline {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
    ) -> Result<Self, String> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .map_err(|e| format!("Failed to create {:?}: {}", output_dir, e))?;
        let index = KnowledgeIndex::load(index_path)?;
        Ok(Self { output_dir, index })
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    /// Process one piece of raw generative output into an indexed, linked
    /// note on disk. Returns the path of the written note.
    pub fn process_note(&mut self, raw_output: &str, fallback_name: &str) -> Result<PathBuf, String> {
        let (frontmatter, body) = FrontmatterParser::parse(raw_output);

        let mut note_name = filename::derive(
            frontmatter.main_topic().unwrap_or(""),
            frontmatter.title().unwrap_or(""),
            fallback_name,
        );
        if !note_name.ends_with(".md") {
            note_name.push_str(".md");
        }

        let title = match frontmatter.title() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => note_name.trim_end_matches(".md").to_string(),
        };
        let tags = frontmatter.tags();
        let topics = extract_topics(&body);

        self.index.add_file(&note_name, &title, tags, topics, None, None);

        let enriched = LinkInferencer::new(&self.index).generate_links(
            &note_name,
            &body,
            AUTO_LINK_MIN_CONFIDENCE,
        );

        // Related links and backlinks are separate operations on the index;
        // the pipeline invokes both so the stored graph matches what the
        // related-topics section shows.
        let related: Vec<String> = self
            .index
            .find_related(&note_name, DEFAULT_MAX_RESULTS, DEFAULT_MIN_RELEVANCE)
            .into_iter()
            .map(|(target, _)| target)
            .collect();
        for target in &related {
            self.index.update_backlink(&note_name, target);
        }
        self.index.update_related_links(&note_name, related);

        let output_path = self.output_dir.join(&note_name);
        let markdown = FrontmatterParser::to_markdown(&frontmatter, &enriched);
        atomic_write_file(&output_path, markdown.as_bytes())?;

        self.index.save()?;
        log::info!("Note saved: {:?}", output_path);

        Ok(output_path)
    }

    /// Knowledge base statistics, including unique topic and tag counts.
    pub fn graph_stats(&self) -> GraphStats {
        let stats = self.index.stats();
        GraphStats {
            total_files: stats.total_files,
            total_links: stats.total_links,
            unique_topics: self.index.topic_count(),
            unique_tags: self.index.tag_count(),
        }
    }

    /// Files with no incoming backlinks and no outgoing related links.
    pub fn orphaned_files(&self) -> Vec<String> {
        self.index
            .files()
            .filter(|(name, record)| {
                self.index.get_backlinks(name).is_empty() && record.related.is_empty()
            })
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Up to five `## ` headings of the body, lowercased, spaces to underscores.
pub fn extract_topics(body: &str) -> Vec<String> {
    TOPIC_HEADING_RE
        .captures_iter(body)
        .take(MAX_TOPICS_PER_NOTE)
        .map(|caps| caps[1].to_lowercase().replace(' ', "_"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_topics_from_second_level_headings() {
        let body = "# Title\n\n## First Topic\ntext\n\n### Deeper\n\n## Second\nmore";
        assert_eq!(extract_topics(body), ["first_topic", "second"]);
    }

    #[test]
    fn extracts_at_most_five_topics() {
        let body = "## A\n## B\n## C\n## D\n## E\n## F\n";
        assert_eq!(extract_topics(body).len(), 5);
    }

    #[test]
    fn no_headings_mean_no_topics() {
        assert!(extract_topics("plain prose, no structure").is_empty());
    }
}
