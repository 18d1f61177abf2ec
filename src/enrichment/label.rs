//! Closed pattern vocabulary and the normalizer that maps free-text oracle
//! responses onto it.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternLabel {
    Geometric,
    Floral,
    Striped,
    Solid,
    Abstract,
    Medallion,
    Tribal,
    Chevron,
    Paisley,
    Damask,
    Ikat,
    Herringbone,
    PlaidCheckered,
    PolkaDot,
    AnimalPrint,
}

impl PatternLabel {
    pub const ALL: [PatternLabel; 15] = [
        PatternLabel::Geometric,
        PatternLabel::Floral,
        PatternLabel::Striped,
        PatternLabel::Solid,
        PatternLabel::Abstract,
        PatternLabel::Medallion,
        PatternLabel::Tribal,
        PatternLabel::Chevron,
        PatternLabel::Paisley,
        PatternLabel::Damask,
        PatternLabel::Ikat,
        PatternLabel::Herringbone,
        PatternLabel::PlaidCheckered,
        PatternLabel::PolkaDot,
        PatternLabel::AnimalPrint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternLabel::Geometric => "Geometric",
            PatternLabel::Floral => "Floral",
            PatternLabel::Striped => "Striped",
            PatternLabel::Solid => "Solid",
            PatternLabel::Abstract => "Abstract",
            PatternLabel::Medallion => "Medallion",
            PatternLabel::Tribal => "Tribal",
            PatternLabel::Chevron => "Chevron",
            PatternLabel::Paisley => "Paisley",
            PatternLabel::Damask => "Damask",
            PatternLabel::Ikat => "Ikat",
            PatternLabel::Herringbone => "Herringbone",
            PatternLabel::PlaidCheckered => "Plaid/Checkered",
            PatternLabel::PolkaDot => "Polka Dot",
            PatternLabel::AnimalPrint => "Animal Print",
        }
    }

    /// Lowercase spellings recognised in responses, canonical name first.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            PatternLabel::Geometric => &["geometric"],
            PatternLabel::Floral => &["floral"],
            PatternLabel::Striped => &["striped", "stripes", "stripe"],
            PatternLabel::Solid => &["solid"],
            PatternLabel::Abstract => &["abstract"],
            PatternLabel::Medallion => &["medallion"],
            PatternLabel::Tribal => &["tribal"],
            PatternLabel::Chevron => &["chevron"],
            PatternLabel::Paisley => &["paisley"],
            PatternLabel::Damask => &["damask"],
            PatternLabel::Ikat => &["ikat"],
            PatternLabel::Herringbone => &["herringbone"],
            PatternLabel::PlaidCheckered => {
                &["plaid/checkered", "plaid", "checkered", "checked", "tartan"]
            }
            PatternLabel::PolkaDot => &["polka dot", "polka-dot", "polka dots", "polkadot"],
            PatternLabel::AnimalPrint => &["animal print", "animal-print"],
        }
    }

    /// Exact (case-insensitive) match against any alias.
    pub fn parse(text: &str) -> Option<PatternLabel> {
        let lowered = text.trim().to_lowercase();
        PatternLabel::ALL
            .into_iter()
            .find(|label| label.aliases().iter().any(|alias| *alias == lowered))
    }
}

impl fmt::Display for PatternLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The label recorded for one enriched item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetectedLabel {
    Pattern(PatternLabel),
    Unknown,
    /// All attempts failed.
    Error,
    /// The oracle reported a permanently exhausted quota.
    QuotaExceeded,
    /// A short response that named no vocabulary term; kept verbatim.
    Unlisted(String),
}

impl DetectedLabel {
    pub fn as_str(&self) -> &str {
        match self {
            DetectedLabel::Pattern(p) => p.as_str(),
            DetectedLabel::Unknown => "Unknown",
            DetectedLabel::Error => "Error",
            DetectedLabel::QuotaExceeded => "QuotaExceeded",
            DetectedLabel::Unlisted(text) => text,
        }
    }

    /// Reads a label back from a stored result row.
    pub fn parse(text: &str) -> DetectedLabel {
        let trimmed = text.trim();
        if let Some(pattern) = PatternLabel::parse(trimmed) {
            return DetectedLabel::Pattern(pattern);
        }
        match trimmed.to_lowercase().as_str() {
            "unknown" | "" => DetectedLabel::Unknown,
            "error" => DetectedLabel::Error,
            "quotaexceeded" | "quota_exceeded" => DetectedLabel::QuotaExceeded,
            _ => DetectedLabel::Unlisted(trimmed.to_string()),
        }
    }

    /// True for the two failure sentinels, which are never offered for review.
    pub fn is_failure(&self) -> bool {
        matches!(self, DetectedLabel::Error | DetectedLabel::QuotaExceeded)
    }
}

impl fmt::Display for DetectedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DetectedLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Style names the oracle tends to answer with instead of a pattern.
pub const EXCLUDED_STYLES: [&str; 8] = [
    "Oriental",
    "Persian",
    "Moroccan",
    "Turkish",
    "Traditional",
    "Modern",
    "Contemporary",
    "Boho",
];

pub const DEFAULT_LONG_RESPONSE_THRESHOLD: usize = 20;

/// Maps a free-text oracle response onto a [`DetectedLabel`].
///
/// Priority order:
/// 1. the cleaned first line is exactly a vocabulary term or "unknown";
/// 2. the earliest vocabulary term contained anywhere in the response;
/// 3. an explicit "unknown" elsewhere;
/// 4. for responses no longer than `long_response_threshold`, the first
///    token, unless it is an excluded style name;
/// 5. `Unknown`.
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    long_response_threshold: usize,
}

impl Default for LabelNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_RESPONSE_THRESHOLD)
    }
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Byte offset of the first whole-word occurrence of `needle` in `haystack`.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        if is_word_boundary(haystack, start, end) {
            return Some(start);
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn clean_first_line(response: &str) -> String {
    let first_line = response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let without_prefix = first_line
        .strip_prefix("Pattern:")
        .or_else(|| first_line.strip_prefix("pattern:"))
        .unwrap_or(first_line);
    let head = without_prefix
        .split(['.', ','])
        .next()
        .unwrap_or("");
    head.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '*' | '`'))
        .to_string()
}

impl LabelNormalizer {
    pub fn new(long_response_threshold: usize) -> Self {
        Self {
            long_response_threshold,
        }
    }

    pub fn long_response_threshold(&self) -> usize {
        self.long_response_threshold
    }

    pub fn normalize(&self, response: &str) -> DetectedLabel {
        let cleaned = clean_first_line(response);
        if let Some(pattern) = PatternLabel::parse(&cleaned) {
            return DetectedLabel::Pattern(pattern);
        }
        if cleaned.eq_ignore_ascii_case("unknown") {
            return DetectedLabel::Unknown;
        }

        let lowered = response.to_lowercase();
        let haystack = lowered.as_str();
        let earliest = PatternLabel::ALL
            .into_iter()
            .flat_map(|label| {
                label
                    .aliases()
                    .iter()
                    .filter_map(move |alias| find_word(haystack, alias))
                    .map(move |pos| (pos, label))
            })
            .min_by_key(|(pos, _)| *pos);
        if let Some((_, pattern)) = earliest {
            return DetectedLabel::Pattern(pattern);
        }

        if find_word(haystack, "unknown").is_some() {
            return DetectedLabel::Unknown;
        }

        if response.trim().chars().count() <= self.long_response_threshold {
            if let Some(token) = cleaned.split_whitespace().next() {
                let is_style = EXCLUDED_STYLES
                    .iter()
                    .any(|style| style.eq_ignore_ascii_case(token));
                if !is_style {
                    return DetectedLabel::Unlisted(token.to_string());
                }
            }
        }

        DetectedLabel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(text: &str) -> DetectedLabel {
        LabelNormalizer::default().normalize(text)
    }

    #[test]
    fn test_unknown_first_line_beats_later_terms() {
        assert_eq!(normalize("Unknown. Possibly floral"), DetectedLabel::Unknown);
        assert_eq!(normalize("unknown\nMaybe geometric?"), DetectedLabel::Unknown);
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(
            normalize("Geometric"),
            DetectedLabel::Pattern(PatternLabel::Geometric)
        );
        assert_eq!(
            normalize("  damask\n"),
            DetectedLabel::Pattern(PatternLabel::Damask)
        );
        assert_eq!(
            normalize("\"Polka Dot\"."),
            DetectedLabel::Pattern(PatternLabel::PolkaDot)
        );
        assert_eq!(
            normalize("Checkered"),
            DetectedLabel::Pattern(PatternLabel::PlaidCheckered)
        );
        assert_eq!(
            normalize("Pattern: Ikat"),
            DetectedLabel::Pattern(PatternLabel::Ikat)
        );
    }

    #[test]
    fn test_containment_picks_earliest_term() {
        assert_eq!(
            normalize("This rug shows a floral design with geometric borders"),
            DetectedLabel::Pattern(PatternLabel::Floral)
        );
        assert_eq!(
            normalize("Mostly geometric, some floral touches"),
            DetectedLabel::Pattern(PatternLabel::Geometric)
        );
    }

    #[test]
    fn test_containment_requires_whole_words() {
        // "solidly" must not count as Solid
        assert_eq!(
            normalize("The weave is solidly made and hard to classify"),
            DetectedLabel::Unknown
        );
    }

    #[test]
    fn test_unknown_response() {
        assert_eq!(normalize("Unknown"), DetectedLabel::Unknown);
        assert_eq!(
            normalize("I am not sure, the pattern is unknown to me"),
            DetectedLabel::Unknown
        );
    }

    #[test]
    fn test_short_response_falls_back_to_first_token() {
        assert_eq!(
            normalize("Trellis"),
            DetectedLabel::Unlisted("Trellis".to_string())
        );
        assert_eq!(
            normalize("Lattice work."),
            DetectedLabel::Unlisted("Lattice".to_string())
        );
    }

    #[test]
    fn test_style_names_are_never_returned() {
        assert_eq!(normalize("Persian"), DetectedLabel::Unknown);
        assert_eq!(normalize("modern"), DetectedLabel::Unknown);
    }

    #[test]
    fn test_long_response_without_term_is_unknown() {
        assert_eq!(
            normalize("The image is too blurry to make out any design at all"),
            DetectedLabel::Unknown
        );
    }

    #[test]
    fn test_threshold_is_configurable() {
        let text = "Trellis lattice arrangement";
        assert_eq!(LabelNormalizer::new(10).normalize(text), DetectedLabel::Unknown);
        assert_eq!(
            LabelNormalizer::new(40).normalize(text),
            DetectedLabel::Unlisted("Trellis".to_string())
        );
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(normalize(""), DetectedLabel::Unknown);
        assert_eq!(normalize("   \n  "), DetectedLabel::Unknown);
    }

    #[test]
    fn test_detected_label_parse() {
        assert_eq!(
            DetectedLabel::parse("Plaid/Checkered"),
            DetectedLabel::Pattern(PatternLabel::PlaidCheckered)
        );
        assert_eq!(DetectedLabel::parse("QuotaExceeded"), DetectedLabel::QuotaExceeded);
        assert_eq!(DetectedLabel::parse("ERROR"), DetectedLabel::Error);
        assert_eq!(DetectedLabel::parse("Unknown"), DetectedLabel::Unknown);
        assert_eq!(
            DetectedLabel::parse("Trellis"),
            DetectedLabel::Unlisted("Trellis".to_string())
        );
        for label in PatternLabel::ALL {
            assert_eq!(DetectedLabel::parse(label.as_str()), DetectedLabel::Pattern(label));
        }
    }

    #[test]
    fn test_failure_sentinels() {
        assert!(DetectedLabel::Error.is_failure());
        assert!(DetectedLabel::QuotaExceeded.is_failure());
        assert!(!DetectedLabel::Unknown.is_failure());
        assert!(!DetectedLabel::Pattern(PatternLabel::Solid).is_failure());
    }
}
