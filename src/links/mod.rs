use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::index::{KnowledgeIndex, DEFAULT_MAX_RESULTS, DEFAULT_MIN_RELEVANCE};

/// Confidence assigned to mention/topic matches.
const MENTION_CONFIDENCE: f64 = 0.8;
/// Opportunities above this confidence enter the related-topics section.
const RELATED_SECTION_MIN_CONFIDENCE: f64 = 0.4;
/// Default threshold for rewriting bold spans into links.
pub const AUTO_LINK_MIN_CONFIDENCE: f64 = 0.6;

const RELATED_HEADING: &str = "## Related Topics";

static BOLD_SPAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());

/// A place where a cross-reference could be added: the target file, the
/// bold span to rewrite (absent for similarity-only results), and how
/// confident the source is.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOpportunity {
    pub target: String,
    pub anchor: Option<String>,
    pub confidence: f64,
}

/// Enriches note bodies with cross-references, using the knowledge index
/// as a read-only oracle. Never persists anything itself.
pub struct LinkInferencer<'a> {
    index: &'a KnowledgeIndex,
}

impl<'a> LinkInferencer<'a> {
    pub fn new(index: &'a KnowledgeIndex) -> Self {
        Self { index }
    }

    /// Lowercased text of every bold span in the body, in order of
    /// appearance. Lazy and restartable.
    pub fn extract_mentions<'b>(&self, body: &'b str) -> impl Iterator<Item = String> + 'b {
        BOLD_SPAN_RE.captures_iter(body).map(|caps| caps[1].to_lowercase())
    }

    /// Collect link opportunities from two sources: mentions that overlap an
    /// indexed topic, and the similarity ranking for this file.
    pub fn find_link_opportunities(
        &self,
        filename: &str,
        body: &str,
        min_relevance: f64,
    ) -> Vec<LinkOpportunity> {
        let mut opportunities = Vec::new();

        for mention in self.extract_mentions(body) {
            for (topic, files) in self.index.topics() {
                if !(mention.contains(topic) || topic.contains(&mention)) {
                    continue;
                }
                for target in files {
                    if target != filename {
                        opportunities.push(LinkOpportunity {
                            target: target.clone(),
                            anchor: Some(mention.clone()),
                            confidence: MENTION_CONFIDENCE,
                        });
                    }
                }
            }
        }

        for (target, score) in self.index.find_related(filename, DEFAULT_MAX_RESULTS, min_relevance)
        {
            opportunities.push(LinkOpportunity {
                target,
                anchor: None,
                confidence: score,
            });
        }

        opportunities
    }

    /// Rewrite mentioned bold spans into wiki links and upsert the
    /// related-topics section. Returns the enriched body; a body with no
    /// opportunities comes back unchanged.
    pub fn generate_links(
        &self,
        filename: &str,
        body: &str,
        auto_link_min_confidence: f64,
    ) -> String {
        let opportunities = self.find_link_opportunities(filename, body, DEFAULT_MIN_RELEVANCE);

        let mut content = body.to_string();
        for opportunity in &opportunities {
            if opportunity.confidence < auto_link_min_confidence {
                continue;
            }
            let Some(anchor) = &opportunity.anchor else { continue };
            let target_name = opportunity
                .target
                .strip_suffix(".md")
                .unwrap_or(&opportunity.target);

            // Mentions are lowercased, so the span match is case-insensitive.
            // A converted span is no longer bold markup, so repeated passes
            // find nothing further to convert.
            let pattern = format!(r"(?i)\*\*{}\*\*", regex::escape(anchor));
            let Ok(re) = Regex::new(&pattern) else { continue };
            if re.is_match(&content) {
                let replacement = format!("[[{}|{}]]", target_name, anchor);
                content = re.replace(&content, NoExpand(&replacement)).into_owned();
                log::debug!("Linked {} -> {}", anchor, opportunity.target);
            }
        }

        if !opportunities.is_empty() {
            content = self.upsert_related_section(&content, &opportunities);
        }

        content
    }

    /// Build or replace the related-topics section. Replacement spans from
    /// the heading to the next heading (or the end of the text), so calling
    /// again with an unchanged index converges to the same body.
    fn upsert_related_section(&self, content: &str, opportunities: &[LinkOpportunity]) -> String {
        let mut section = format!("{}\n", RELATED_HEADING);
        let mut seen: HashSet<&str> = HashSet::new();

        for opportunity in opportunities {
            if opportunity.confidence <= RELATED_SECTION_MIN_CONFIDENCE {
                continue;
            }
            if !seen.insert(opportunity.target.as_str()) {
                continue;
            }
            let target_name = opportunity
                .target
                .strip_suffix(".md")
                .unwrap_or(&opportunity.target);
            let title = self
                .index
                .get_file_info(&opportunity.target)
                .map(|record| record.title.as_str())
                .unwrap_or(target_name);
            section.push_str(&format!("- [[{}]] - {}\n", target_name, title));
        }

        if let Some(start) = content.find(RELATED_HEADING) {
            let after_heading = start + RELATED_HEADING.len();
            let rest = match content[after_heading..].find("\n##") {
                Some(idx) => &content[after_heading + idx..],
                None => "",
            };
            format!("{}{}{}", &content[..start], section, rest)
        } else {
            let mut out = content.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&section);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KnowledgeIndex;
    use tempfile::TempDir;

    fn index_with(files: &[(&str, &[&str], &[&str])]) -> (TempDir, KnowledgeIndex) {
        let dir = TempDir::new().unwrap();
        let mut index = KnowledgeIndex::load(dir.path().join("index.json")).unwrap();
        for (filename, tags, topics) in files {
            index.add_file(
                filename,
                filename.trim_end_matches(".md"),
                tags.iter().map(|t| t.to_string()).collect(),
                topics.iter().map(|t| t.to_string()).collect(),
                None,
                None,
            );
        }
        (dir, index)
    }

    #[test]
    fn extracts_mentions_in_order_lowercased() {
        let (_dir, index) = index_with(&[]);
        let inferencer = LinkInferencer::new(&index);
        let mentions: Vec<String> = inferencer
            .extract_mentions("**First** then **SECOND** and **third**")
            .collect();
        assert_eq!(mentions, ["first", "second", "third"]);

        // Restartable: a second pass yields the same sequence.
        let again: Vec<String> = inferencer
            .extract_mentions("**First** then **SECOND** and **third**")
            .collect();
        assert_eq!(mentions, again);
    }

    #[test]
    fn mention_matching_topic_becomes_opportunity() {
        let (_dir, index) = index_with(&[
            ("calculus-derivative.md", &["math"], &["derivative"]),
            ("note.md", &["essay"], &["prose"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        let opportunities =
            inferencer.find_link_opportunities("note.md", "About the **Derivative** rule.", 0.3);
        let mention_ops: Vec<&LinkOpportunity> =
            opportunities.iter().filter(|o| o.anchor.is_some()).collect();
        assert_eq!(mention_ops.len(), 1);
        assert_eq!(mention_ops[0].target, "calculus-derivative.md");
        assert_eq!(mention_ops[0].anchor.as_deref(), Some("derivative"));
        assert!((mention_ops[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn opportunities_never_target_the_file_itself() {
        let (_dir, index) = index_with(&[("self.md", &["math"], &["topic"])]);
        let inferencer = LinkInferencer::new(&index);
        let opportunities =
            inferencer.find_link_opportunities("self.md", "On **topic** again.", 0.3);
        assert!(opportunities.is_empty());
    }

    #[test]
    fn converts_exactly_one_bold_occurrence() {
        let (_dir, index) = index_with(&[
            ("calculus-derivative.md", &["math"], &["derivative"]),
            ("note.md", &["essay"], &["prose"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        let body = "The **Derivative** measures change. The **Derivative** again.";
        let enriched = inferencer.generate_links("note.md", body, 0.6);

        assert!(enriched.contains("[[calculus-derivative|derivative]]"));
        // The second occurrence stays bold.
        assert_eq!(enriched.matches("**Derivative**").count(), 1);
        assert_eq!(enriched.matches("[[calculus-derivative|derivative]]").count(), 1);
        assert!(enriched.contains("## Related Topics"));
        assert!(enriched.contains("- [[calculus-derivative]] - calculus-derivative"));
    }

    #[test]
    fn second_pass_converts_nothing_further() {
        let (_dir, index) = index_with(&[
            ("calculus-derivative.md", &["math"], &["derivative"]),
            ("note.md", &["essay"], &["prose"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        let body = "The **Derivative** measures change.";
        let once = inferencer.generate_links("note.md", body, 0.6);
        let twice = inferencer.generate_links("note.md", &once, 0.6);
        assert_eq!(once, twice);
    }

    #[test]
    fn related_section_replacement_converges() {
        let (_dir, index) = index_with(&[
            ("a.md", &["math"], &["x"]),
            ("b.md", &["math"], &["x"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        let body = "Intro.\n\n## Related Topics\n- stale entry\n\n## Outro\nTail.";
        let once = inferencer.generate_links("a.md", body, 0.6);
        let twice = inferencer.generate_links("a.md", &once, 0.6);

        assert_eq!(once, twice);
        assert!(once.contains("- [[b]] - b"));
        assert!(!once.contains("stale entry"));
        assert!(once.contains("## Outro\nTail."));
    }

    #[test]
    fn body_without_opportunities_is_unchanged() {
        let (_dir, index) = index_with(&[("lone.md", &["math"], &["x"])]);
        let inferencer = LinkInferencer::new(&index);
        let body = "Nothing bold, nothing related.";
        assert_eq!(inferencer.generate_links("lone.md", body, 0.6), body);
    }

    #[test]
    fn related_results_alone_produce_section_without_rewrites() {
        let (_dir, index) = index_with(&[
            ("a.md", &["math"], &["x"]),
            ("b.md", &["math"], &["x"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        let enriched = inferencer.generate_links("a.md", "Plain prose only.", 0.6);
        assert!(enriched.starts_with("Plain prose only.\n"));
        assert!(enriched.contains("## Related Topics"));
        assert!(enriched.contains("- [[b]] - b"));
        assert!(!enriched.contains("[[b|"));
    }

    #[test]
    fn section_dedupes_targets_first_wins() {
        let (_dir, index) = index_with(&[
            ("calculus-derivative.md", &["math"], &["derivative", "slope"]),
            ("note.md", &["essay"], &["prose"]),
        ]);
        let inferencer = LinkInferencer::new(&index);

        // Both topics of the target overlap the two mentions, producing two
        // opportunities for the same file.
        let body = "On **derivative** and **slope**.";
        let enriched = inferencer.generate_links("note.md", body, 0.6);
        assert_eq!(enriched.matches("- [[calculus-derivative]]").count(), 1);
    }
}
