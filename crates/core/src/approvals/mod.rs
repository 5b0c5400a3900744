//! Pure decision logic for approver resolution, definition validation and workflow matching.
//! Callers load the inputs; nothing in here performs I/O.

pub mod definition;
pub mod matching;
pub mod resolution;

pub use definition::{apply_patch, build_definition, validate_levels, DefinitionRules};
pub use matching::select_applicable;
pub use resolution::{select_assignment, ResolutionSnapshot};

pub(crate) fn trimmed_len(raw: &str) -> usize {
    raw.trim().chars().count()
}

/// True when `text` is non-blank and its trimmed form has at least `min_chars` characters.
pub fn meets_minimum(text: Option<&str>, min_chars: usize) -> bool {
    text.map_or(false, |text| {
        let len = trimmed_len(text);
        len > 0 && len >= min_chars
    })
}

#[cfg(test)]
mod tests {
    use super::meets_minimum;

    #[test]
    fn minimum_counts_trimmed_characters() {
        assert!(meets_minimum(Some("budget cut"), 10));
        assert!(!meets_minimum(Some("   too short   "), 10));
        assert!(!meets_minimum(Some("   "), 0));
        assert!(!meets_minimum(None, 1));
        assert!(meets_minimum(Some("ação válida"), 11));
    }
}
