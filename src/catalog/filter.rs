/// Literal a spreadsheet round-trip leaves behind for an empty cell.
const NAN_SENTINEL: &str = "nan";

/// True when a label cell carries no value: absent, empty, whitespace only,
/// or the textual `nan` (any case).
pub fn is_blank_label(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let trimmed = v.trim();
            trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NAN_SENTINEL)
        }
    }
}

/// Case-insensitive substring predicate over the category column.
///
/// Blank categories never match, whatever the needle.
#[derive(Debug, Clone)]
pub struct CategoryFilter {
    needle: String,
}

impl CategoryFilter {
    pub fn new(substring: &str) -> Self {
        Self {
            needle: substring.trim().to_lowercase(),
        }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn matches(&self, category: Option<&str>) -> bool {
        if is_blank_label(category) {
            return false;
        }
        category
            .map(|c| c.trim().to_lowercase().contains(&self.needle))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_label_variants() {
        assert!(is_blank_label(None));
        assert!(is_blank_label(Some("")));
        assert!(is_blank_label(Some("   ")));
        assert!(is_blank_label(Some("nan")));
        assert!(is_blank_label(Some("NaN")));
        assert!(is_blank_label(Some(" NAN ")));
        assert!(!is_blank_label(Some("Floral")));
        assert!(!is_blank_label(Some("banana")));
    }

    #[test]
    fn category_matches_substring_case_insensitively() {
        let filter = CategoryFilter::new("rug");
        assert!(filter.matches(Some("Rugs")));
        assert!(filter.matches(Some("Rug Accessories")));
        assert!(filter.matches(Some(" Custom Size RUGS ")));
        assert!(!filter.matches(Some("Chair")));
    }

    #[test]
    fn blank_category_never_matches() {
        let filter = CategoryFilter::new("");
        assert!(filter.matches(Some("Chair")));
        assert!(!filter.matches(Some("nan")));
        assert!(!filter.matches(Some("  ")));
        assert!(!filter.matches(None));
    }
}
