use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::atomic_write_file;

/// Current snapshot schema version - increment when the structure changes.
pub const INDEX_VERSION: u32 = 1;

/// Default result cap for similarity queries.
pub const DEFAULT_MAX_RESULTS: usize = 5;
/// Default relevance floor for similarity queries.
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.3;

/// Weights of the tag and topic Jaccard terms in the relevance score.
const TAG_WEIGHT: f64 = 0.6;
const TOPIC_WEIGHT: f64 = 0.4;

/// One indexed note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub title: String,
    pub tags: Vec<String>,
    pub topics: Vec<String>,
    pub created: NaiveDate,
    pub updated: NaiveDate,
    pub size_chars: usize,
    pub parent: Option<String>,
    #[serde(default)]
    pub related: Vec<String>,
}

/// Derived aggregate counters; always recomputable from the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_links: usize,
}

/// The whole persisted structure. Maps are BTreeMaps so iteration and
/// serialization order are deterministic.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    last_updated: String,
    stats: IndexStats,
    files: BTreeMap<String, FileRecord>,
    topics_index: BTreeMap<String, Vec<String>>,
    tags_index: BTreeMap<String, Vec<String>>,
    /// Absent in snapshots written before backlinks existed; healed to empty.
    #[serde(default)]
    backlinks: BTreeMap<String, Vec<String>>,
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            last_updated: Local::now().to_rfc3339(),
            stats: IndexStats::default(),
            files: BTreeMap::new(),
            topics_index: BTreeMap::new(),
            tags_index: BTreeMap::new(),
            backlinks: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub tags: Vec<String>,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: IndexStats,
}

/// Jaccard similarity of two sets; zero when both are empty.
pub fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Durable store and query surface over file records, the tag/topic
/// inverted indices and the backlink graph. Loaded once, mutated in
/// memory, flushed as a single snapshot.
pub struct KnowledgeIndex {
    index_path: PathBuf,
    data: IndexSnapshot,
}

impl KnowledgeIndex {
    /// Load an existing snapshot or start an empty one. A snapshot that is
    /// present but unreadable is a fatal error.
    pub fn load(index_path: impl Into<PathBuf>) -> Result<Self, String> {
        let index_path = index_path.into();
        if let Some(parent) = index_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create {:?}: {}", parent, e))?;
            }
        }

        let data = if index_path.exists() {
            let raw = fs::read_to_string(&index_path)
                .map_err(|e| format!("Failed to read index {:?}: {}", index_path, e))?;
            serde_json::from_str(&raw)
                .map_err(|e| format!("Failed to parse index {:?}: {}", index_path, e))?
        } else {
            IndexSnapshot::empty()
        };

        Ok(Self { index_path, data })
    }

    /// Persist the complete in-memory snapshot, stamping `last_updated`.
    pub fn save(&mut self) -> Result<(), String> {
        self.data.last_updated = Local::now().to_rfc3339();
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| format!("Failed to serialize index: {}", e))?;
        atomic_write_file(&self.index_path, json.as_bytes())?;
        log::info!("Index saved to {:?}", self.index_path);
        Ok(())
    }

    /// Insert or overwrite a record. Last write wins; on overwrite the
    /// filename is first removed from inverted-index lists it no longer
    /// belongs to, so the indices stay a faithful view of the records.
    pub fn add_file(
        &mut self,
        filename: &str,
        title: &str,
        tags: Vec<String>,
        topics: Vec<String>,
        parent: Option<String>,
        related: Option<Vec<String>>,
    ) {
        if self.data.files.contains_key(filename) {
            self.remove_from_indices(filename);
        }

        let today = Local::now().date_naive();
        let record = FileRecord {
            title: title.to_string(),
            tags,
            topics,
            created: today,
            updated: today,
            size_chars: 0,
            parent,
            related: related.unwrap_or_default(),
        };

        for topic in &record.topics {
            append_unique(
                self.data.topics_index.entry(topic.clone()).or_default(),
                filename,
            );
        }
        for tag in &record.tags {
            append_unique(
                self.data.tags_index.entry(tag.clone()).or_default(),
                filename,
            );
        }

        self.data.files.insert(filename.to_string(), record);
        self.update_stats();
        log::info!("File added: {}", filename);
    }

    fn remove_from_indices(&mut self, filename: &str) {
        self.data.topics_index.retain(|_, files| {
            files.retain(|f| f != filename);
            !files.is_empty()
        });
        self.data.tags_index.retain(|_, files| {
            files.retain(|f| f != filename);
            !files.is_empty()
        });
    }

    /// Files carrying the given tag; empty for unknown tags.
    pub fn find_by_tag(&self, tag: &str) -> &[String] {
        self.data.tags_index.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files indexed under the given topic; empty for unknown topics.
    pub fn find_by_topic(&self, topic: &str) -> &[String] {
        self.data.topics_index.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_file_info(&self, filename: &str) -> Option<&FileRecord> {
        self.data.files.get(filename)
    }

    /// Overwrite the related list of an existing record; unknown filenames
    /// are a no-op.
    pub fn update_related_links(&mut self, filename: &str, related: Vec<String>) {
        if let Some(record) = self.data.files.get_mut(filename) {
            record.related = related;
            self.update_stats();
            log::info!("Links updated for {}", filename);
        }
    }

    /// Record that `source` links to `target`. Idempotent.
    pub fn update_backlink(&mut self, source: &str, target: &str) {
        let sources = self.data.backlinks.entry(target.to_string()).or_default();
        append_unique(sources, source);
    }

    /// Files that link to the given file.
    pub fn get_backlinks(&self, filename: &str) -> &[String] {
        self.data.backlinks.get(filename).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rank every other record by weighted Jaccard similarity over tags and
    /// topics. Results at or above `min_relevance`, best first; equal scores
    /// order by filename so the ranking is deterministic.
    pub fn find_related(
        &self,
        filename: &str,
        max_results: usize,
        min_relevance: f64,
    ) -> Vec<(String, f64)> {
        let Some(current) = self.data.files.get(filename) else {
            return Vec::new();
        };
        let current_tags: HashSet<&str> = current.tags.iter().map(String::as_str).collect();
        let current_topics: HashSet<&str> = current.topics.iter().map(String::as_str).collect();

        let mut related: Vec<(String, f64)> = Vec::new();
        for (other_name, other) in &self.data.files {
            if other_name == filename {
                continue;
            }
            let other_tags: HashSet<&str> = other.tags.iter().map(String::as_str).collect();
            let other_topics: HashSet<&str> = other.topics.iter().map(String::as_str).collect();

            let score = TAG_WEIGHT * jaccard(&current_tags, &other_tags)
                + TOPIC_WEIGHT * jaccard(&current_topics, &other_topics);

            if score >= min_relevance {
                related.push((other_name.clone(), score));
            }
        }

        related.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        related.truncate(max_results);
        related
    }

    /// Export the graph for visualization: one node per record, one edge
    /// per related link.
    pub fn export_graph(&self) -> GraphExport {
        let nodes = self
            .data
            .files
            .iter()
            .map(|(filename, record)| GraphNode {
                id: filename.clone(),
                label: record.title.clone(),
                tags: record.tags.clone(),
                group: record.tags.first().cloned().unwrap_or_else(|| "other".to_string()),
            })
            .collect();

        let mut edges = Vec::new();
        for (filename, record) in &self.data.files {
            for related in &record.related {
                edges.push(GraphEdge {
                    source: filename.clone(),
                    target: related.clone(),
                    weight: 1,
                });
            }
        }

        GraphExport {
            nodes,
            edges,
            stats: self.data.stats.clone(),
        }
    }

    pub fn stats(&self) -> &IndexStats {
        &self.data.stats
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileRecord)> {
        self.data.files.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn topics(&self) -> impl Iterator<Item = (&str, &Vec<String>)> {
        self.data.topics_index.iter().map(|(topic, files)| (topic.as_str(), files))
    }

    pub fn topic_count(&self) -> usize {
        self.data.topics_index.len()
    }

    pub fn tag_count(&self) -> usize {
        self.data.tags_index.len()
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }

    fn update_stats(&mut self) {
        self.data.stats.total_files = self.data.files.len();
        self.data.stats.total_links = self.data.files.values().map(|r| r.related.len()).sum();
    }
}

fn append_unique(files: &mut Vec<String>, filename: &str) {
    if !files.iter().any(|f| f == filename) {
        files.push(filename.to_string());
    }
}
