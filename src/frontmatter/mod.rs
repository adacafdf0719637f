pub mod types;

use once_cell::sync::Lazy;
use regex::Regex;

use types::{FieldValue, Frontmatter};

/// Keys the line scanner consumes when no frontmatter block is present.
const RECOGNIZED_KEYS: [&str; 5] = ["title", "main_topic", "date", "summary", "tags"];

static FRONTMATTER_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^---\n(.*?)\n---\n(.*)$").unwrap());

pub struct FrontmatterParser;

impl FrontmatterParser {
    /// Parse raw generative output into frontmatter and body.
    ///
    /// Never fails: malformed input degrades through an ordered chain of
    /// attempts (strict `---` block, then a line scan for recognized keys,
    /// then fixed default frontmatter with the whole input as body).
    pub fn parse(raw: &str) -> (Frontmatter, String) {
        let text = strip_code_fence(raw);

        if let Some(caps) = FRONTMATTER_BLOCK_RE.captures(&text) {
            let frontmatter = parse_block(&caps[1]);
            let body = caps[2].trim_start_matches('\n').to_string();
            return (frontmatter, body);
        }

        log::warn!("Frontmatter block not found, scanning content for metadata");
        scan_for_metadata(&text)
    }

    /// Render frontmatter and body back into markdown.
    pub fn to_markdown(frontmatter: &Frontmatter, body: &str) -> String {
        let mut lines = String::new();
        for (key, value) in frontmatter.iter() {
            let rendered = match value {
                FieldValue::List(items) => format!("{}: [{}]", key, items.join(", ")),
                FieldValue::Str(s) => format!("{}: \"{}\"", key, s),
                FieldValue::Bool(b) => format!("{}: {}", key, b),
                FieldValue::Int(n) => format!("{}: {}", key, n),
            };
            lines.push_str(&rendered);
            lines.push('\n');
        }
        format!("---\n{}---\n\n{}", lines, body)
    }
}

/// Strip an enclosing code fence, with or without a language tag.
fn strip_code_fence(raw: &str) -> String {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(idx) => text[idx + 1..].trim(),
            None => "",
        };
    }
    if text.ends_with("```") {
        text = text[..text.len() - 3].trim_end();
    }
    text.to_string()
}

/// Parse a frontmatter block: YAML first, permissive line parser on failure.
fn parse_block(block: &str) -> Frontmatter {
    match serde_yaml::from_str::<serde_yaml::Mapping>(block) {
        Ok(mapping) => {
            let mut frontmatter = Frontmatter::new();
            for (key, value) in &mapping {
                if let Some(key) = key.as_str() {
                    frontmatter.insert(key, yaml_to_field(value));
                }
            }
            frontmatter
        }
        Err(e) => {
            log::warn!("YAML parsing failed: {}. Using fallback parsing.", e);
            parse_block_permissive(block)
        }
    }
}

fn yaml_to_field(value: &serde_yaml::Value) -> FieldValue {
    match value {
        serde_yaml::Value::Bool(b) => FieldValue::Bool(*b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            None => FieldValue::Str(n.to_string()),
        },
        serde_yaml::Value::String(s) => FieldValue::Str(s.clone()),
        serde_yaml::Value::Sequence(seq) => FieldValue::List(
            seq.iter()
                .map(|item| match item.as_str() {
                    Some(s) => s.to_string(),
                    None => serde_yaml::to_string(item).unwrap_or_default().trim().to_string(),
                })
                .collect(),
        ),
        serde_yaml::Value::Null => FieldValue::Str(String::new()),
        other => FieldValue::Str(
            serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
        ),
    }
}

/// Line-based block parser for YAML that would not load. Every key is kept,
/// recognized or not.
fn parse_block_permissive(block: &str) -> Frontmatter {
    let mut frontmatter = Frontmatter::new();

    for line in block.trim().lines() {
        let Some(colon) = line.find(':') else { continue };
        let key = line[..colon].trim();
        if key.is_empty() {
            continue;
        }
        let value = strip_quotes(line[colon + 1..].trim());
        frontmatter.insert(key, coerce_scalar(value));
    }

    frontmatter
}

/// Coerce a raw value string: `[...]` list, bool, integer, plain string.
fn coerce_scalar(value: &str) -> FieldValue {
    if value.starts_with('[') && value.ends_with(']') && value.len() >= 2 {
        return FieldValue::List(parse_inline_list(value));
    }
    match value.to_lowercase().as_str() {
        "true" => return FieldValue::Bool(true),
        "false" => return FieldValue::Bool(false),
        _ => {}
    }
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return FieldValue::Int(n);
        }
    }
    FieldValue::Str(value.to_string())
}

fn parse_inline_list(value: &str) -> Vec<String> {
    let inner = &value[1..value.len() - 1];
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| strip_quotes(item.trim()).to_string())
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Scan plain content for `key: value` lines with recognized keys. Stops at
/// the first heading or a line whose colon has no key before it.
fn scan_for_metadata(text: &str) -> (Frontmatter, String) {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut frontmatter = Frontmatter::new();
    let mut content_start = 0;

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with('#') {
            break;
        }
        let Some(colon) = line.find(':') else { continue };
        let key = line[..colon].trim().to_lowercase();
        if key.is_empty() {
            break;
        }
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            continue;
        }

        let value = strip_quotes(line[colon + 1..].trim());
        if key == "tags" {
            let tags = if value.starts_with('[') && value.ends_with(']') && value.len() >= 2 {
                parse_inline_list(value)
            } else {
                vec![value.to_string()]
            };
            frontmatter.insert("tags", FieldValue::List(tags));
        } else {
            frontmatter.insert(&key, FieldValue::Str(value.to_string()));
        }
        content_start = i + 1;
    }

    if frontmatter.is_empty() {
        return (Frontmatter::untitled(), text.to_string());
    }

    log::debug!("Frontmatter extracted from content");
    let body = lines[content_start..].join("\n").trim().to_string();
    (frontmatter, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_block() {
        let (fm, body) = FrontmatterParser::parse("---\ntitle: X\n---\nBody");
        assert_eq!(fm.title(), Some("X"));
        assert_eq!(fm.len(), 1);
        assert_eq!(body, "Body");
    }

    #[test]
    fn parses_strict_block_with_list() {
        let raw = "---\ntitle: \"Limits\"\nmain_topic: analysis\ntags: [math, calculus]\n---\n# Limits\n\nBody here.";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("Limits"));
        assert_eq!(fm.main_topic(), Some("analysis"));
        assert_eq!(fm.tags(), vec!["math", "calculus"]);
        assert!(body.starts_with("# Limits"));
    }

    #[test]
    fn strict_block_keeps_unrecognized_keys() {
        let raw = "---\ntitle: X\ncustom_field: kept\n---\nBody";
        let (fm, _) = FrontmatterParser::parse(raw);
        assert_eq!(fm.get_str("custom_field"), Some("kept"));
    }

    #[test]
    fn malformed_yaml_falls_back_to_line_parser() {
        // The unclosed quote makes the block invalid YAML.
        let raw = "---\ntitle: \"Broken\ntags: [a, b]\npublished: true\ncount: 42\n---\nBody";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("Broken"));
        assert_eq!(fm.tags(), vec!["a", "b"]);
        assert_eq!(fm.get("published"), Some(&FieldValue::Bool(true)));
        assert_eq!(fm.get("count"), Some(&FieldValue::Int(42)));
        assert_eq!(body, "Body");
    }

    #[test]
    fn strips_code_fence_around_block() {
        let raw = "```markdown\n---\ntitle: Fenced\n---\nBody\n```";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("Fenced"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn strips_bare_code_fence() {
        let raw = "```\ntitle: Scanned\n\nProse after.\n```";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("Scanned"));
        assert_eq!(body, "Prose after.");
    }

    #[test]
    fn scans_loose_metadata_lines() {
        let raw = "title: My Note\ntags: [a, b]\nunknown: skipped\n\n# Heading\nprose";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("My Note"));
        assert_eq!(fm.tags(), vec!["a", "b"]);
        // Only lines up to the last recognized key are consumed.
        assert_eq!(body, "unknown: skipped\n\n# Heading\nprose");
    }

    #[test]
    fn scan_wraps_bare_tags_value() {
        let raw = "title: T\ntags: calculus\n\nBody";
        let (fm, _) = FrontmatterParser::parse(raw);
        assert_eq!(fm.tags(), vec!["calculus"]);
    }

    #[test]
    fn scan_stops_at_heading() {
        let raw = "# A Heading First\ntitle: ignored\n";
        let (fm, body) = FrontmatterParser::parse(raw);
        assert_eq!(fm.title(), Some("Untitled"));
        assert_eq!(body, "# A Heading First\ntitle: ignored");
    }

    #[test]
    fn plain_prose_gets_default_frontmatter() {
        let (fm, body) = FrontmatterParser::parse("no metadata here\njust prose");
        assert_eq!(fm.title(), Some("Untitled"));
        assert_eq!(fm.main_topic(), Some("general"));
        assert_eq!(fm.tags(), Vec::<String>::new());
        assert_eq!(body, "no metadata here\njust prose");
    }

    #[test]
    fn to_markdown_renders_writer_shape() {
        let mut fm = Frontmatter::new();
        fm.insert("title", FieldValue::Str("X".to_string()));
        fm.insert("tags", FieldValue::List(vec!["a".to_string(), "b".to_string()]));
        let rendered = FrontmatterParser::to_markdown(&fm, "Body");
        assert_eq!(rendered, "---\ntags: [a, b]\ntitle: \"X\"\n---\n\nBody");
    }

    #[test]
    fn parse_and_render_round_trip() {
        let raw = "---\ntitle: Round\ntags: [x]\n---\nBody";
        let (fm, body) = FrontmatterParser::parse(raw);
        let rendered = FrontmatterParser::to_markdown(&fm, &body);
        let (fm2, body2) = FrontmatterParser::parse(&rendered);
        assert_eq!(fm, fm2);
        assert_eq!(body, body2);
    }
}
