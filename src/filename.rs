use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SEPARATOR_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// Word length a title word must exceed to qualify for the filename suffix.
const MIN_SUFFIX_WORD_LEN: usize = 3;
/// At most this many title words are appended to the topic slug.
const MAX_SUFFIX_WORDS: usize = 2;

/// Normalize free text into a URL-safe slug: lowercase, word characters
/// only, runs of whitespace and hyphens collapsed to a single hyphen.
/// Idempotent: sanitizing a slug returns it unchanged.
pub fn sanitize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lowered, "");
    let collapsed = SEPARATOR_RUN_RE.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

/// Derive a stable filename slug from a main topic and title.
///
/// The topic slug leads; when the title says more than the topic, up to two
/// of its longer words that the topic does not already contain are appended.
/// An empty topic falls back to the title, and an empty title to the
/// caller-supplied default.
pub fn derive(main_topic: &str, title: &str, fallback: &str) -> String {
    let topic = main_topic.trim().to_lowercase();
    let topic_slug = sanitize(&topic);

    if topic_slug.is_empty() {
        let title_slug = sanitize(title);
        if title_slug.is_empty() {
            return fallback.to_string();
        }
        return title_slug;
    }

    let title = title.trim().to_lowercase();
    let title_slug = sanitize(&title);
    if !title_slug.is_empty() && title_slug != topic_slug {
        let key_words: Vec<String> = title
            .split_whitespace()
            .filter(|w| w.chars().count() > MIN_SUFFIX_WORD_LEN && !topic.contains(*w))
            .take(MAX_SUFFIX_WORDS)
            .map(sanitize)
            .filter(|w| !w.is_empty())
            .collect();
        if !key_words.is_empty() {
            return format!("{}-{}", topic_slug, key_words.join("-"));
        }
    }

    topic_slug
}
