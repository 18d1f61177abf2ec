use super::label::{PatternLabel, EXCLUDED_STYLES};

/// Builds the fixed instruction sent with every image.
pub fn build_instruction() -> String {
    let patterns = PatternLabel::ALL
        .iter()
        .map(PatternLabel::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let styles = EXCLUDED_STYLES.join(", ");

    format!(
        "You are an expert in rug patterns and design. Analyze this rug image and identify the VISUAL PATTERN type.\n\
         \n\
         Return ONLY the pattern name, nothing else. No explanations, no sentences. \
         Patterns describe the visual design elements (shapes, lines, motifs); styles describe cultural or design movements.\n\
         \n\
         PATTERNS: {patterns}\n\
         \n\
         STYLES (never return these): {styles}\n\
         \n\
         If you cannot determine the pattern, return \"Unknown\".\n\
         \n\
         Pattern:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_lists_vocabulary_and_exclusions() {
        let instruction = build_instruction();
        for label in PatternLabel::ALL {
            assert!(instruction.contains(label.as_str()), "{}", label);
        }
        for style in EXCLUDED_STYLES {
            assert!(instruction.contains(style));
        }
        assert!(instruction.contains("Unknown"));
    }
}
