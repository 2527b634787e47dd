//! Attribution aggregation.
//!
//! Sources carry attribution HTML such as
//! `<a href="https://www.openstreetmap.org/copyright">© OpenStreetMap</a>`.
//! The aggregator keeps one consolidated list: strings contained in a longer
//! string are dropped, and each remaining link is reduced to a short host
//! label (`openstreetmap`).

use std::fmt;
use std::rc::Rc;

const COPYRIGHT_MARKERS: &[&str] = &["©", "&copy;", "(c)"];

/// Callback receiving the host labels of the current attributions.
pub type LabelCallback = Rc<dyn Fn(&[String])>;

/// Deduplicates attributions by containment.
///
/// Strings are trimmed and sorted by length (stable); a string is dropped if
/// it occurs in any string after it. A string starting with a copyright
/// marker is also dropped when its remaining text occurs as whole words in a
/// later string, so `© A` goes next to `Data from A and B` but `© OSM` stays
/// next to `OSMand tiles`. Exact duplicates collapse to one.
///
/// # Examples
///
/// ```
/// use mapweave::style::attribution::deduplicate;
///
/// let raw = ["© A", "Data from A and B", "© A"].map(String::from);
/// assert_eq!(deduplicate(&raw), vec!["Data from A and B".to_string()]);
/// ```
pub fn deduplicate(attributions: &[String]) -> Vec<String> {
    let mut sorted: Vec<&str> = attributions
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    sorted.sort_by_key(|s| s.chars().count());

    sorted
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            let later = &sorted[i + 1..];
            if later.iter().any(|l| l.contains(*candidate)) {
                return false;
            }
            match strip_marker(candidate) {
                Some(text) => !later.iter().any(|l| contains_words(l, text)),
                None => true,
            }
        })
        .map(|(_, kept)| (*kept).to_string())
        .collect()
}

/// Text after a leading copyright marker, if there is any.
fn strip_marker(text: &str) -> Option<&str> {
    COPYRIGHT_MARKERS
        .iter()
        .find_map(|marker| text.strip_prefix(marker))
        .map(str::trim_start)
        .filter(|stripped| !stripped.is_empty())
}

/// Whether `needle` occurs in `haystack` with no word character on either
/// side.
fn contains_words(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Second-level domain label of every `href` target in `attribution`.
///
/// Only absolute or protocol-relative links (`https://host/...`,
/// `//host/...`) have a host; `mailto:` and relative links are skipped.
/// Labels are lowercased and returned in document order, repeats included.
///
/// # Examples
///
/// ```
/// use mapweave::style::attribution::host_labels;
///
/// let html = r#"<a href="https://www.openstreetmap.org/copyright">© OSM</a> <a href="mailto:maps@example.com">Contact</a>"#;
/// assert_eq!(host_labels(html), vec!["openstreetmap".to_string()]);
/// ```
pub fn host_labels(attribution: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut rest = attribution;
    while let Some(start) = rest.find("href=") {
        rest = &rest[start + "href=".len()..];
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        rest = &rest[quote.len_utf8()..];
        let end = rest.find(quote).unwrap_or(rest.len());
        if let Some(label) = host_label(&rest[..end]) {
            labels.push(label);
        }
        rest = &rest[end..];
    }
    labels
}

fn host_label(url: &str) -> Option<String> {
    let (_, authority) = url.split_once("//")?;
    let host = authority
        .split(|c: char| matches!(c, '/' | ':' | '?' | '#'))
        .next()
        .filter(|h| !h.is_empty())?;
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    let label = match parts.len() {
        0 => return None,
        1 => parts[0],
        n => parts[n - 2],
    };
    Some(label.to_ascii_lowercase())
}

/// Current attribution state of one map.
///
/// # Examples
///
/// ```
/// use mapweave::style::AttributionAggregator;
///
/// let mut aggregator = AttributionAggregator::new(" | ");
/// let labels = aggregator.update(&[
///     r#"<a href="https://openmaptiles.org/">© OpenMapTiles</a>"#.to_string(),
///     "© Local Survey".to_string(),
/// ]);
/// assert_eq!(labels, vec!["openmaptiles".to_string()]);
/// assert_eq!(aggregator.current().len(), 2);
/// assert!(aggregator.formatted().contains(" | "));
/// ```
pub struct AttributionAggregator {
    separator: String,
    current: Vec<String>,
    callback: Option<LabelCallback>,
}

impl AttributionAggregator {
    /// An empty aggregator joining attributions with `separator`.
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            current: Vec::new(),
            callback: None,
        }
    }

    /// Routes future updates to `callback` instead of the formatted string.
    pub fn set_callback(&mut self, callback: LabelCallback) {
        self.callback = Some(callback);
    }

    /// The label callback, if one is set.
    pub fn callback(&self) -> Option<LabelCallback> {
        self.callback.clone()
    }

    /// Replaces the state with the deduplicated `raw` attributions and returns
    /// their host labels, without repeats.
    ///
    /// The callback is not called here; the map publishes the returned
    /// labels to it.
    pub fn update(&mut self, raw: &[String]) -> Vec<String> {
        self.current = deduplicate(raw);
        let mut labels: Vec<String> = Vec::new();
        for label in self.current.iter().flat_map(|a| host_labels(a)) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        tracing::debug!(attributions = self.current.len(), labels = labels.len(), "attribution updated");
        labels
    }

    /// Attributions from the last update.
    pub fn current(&self) -> &[String] {
        &self.current
    }

    /// The attributions joined by the separator.
    pub fn formatted(&self) -> String {
        self.current.join(&self.separator)
    }
}

impl fmt::Debug for AttributionAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributionAggregator")
            .field("separator", &self.separator)
            .field("current", &self.current)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
