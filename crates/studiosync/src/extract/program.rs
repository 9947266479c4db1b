//! Program category lookup by lesson-name prefix.

/// Catch-all category for names matching no known prefix.
pub const DEFAULT_CATCH_ALL: &str = "OTHER";

/// Known program prefixes in the order the site introduced them.
pub const DEFAULT_PROGRAMS: &[&str] = &[
    "BB1", "BB2", "BB3", "BSL", "BSB", "BSBi", "BSW", "BSWi", "FSW", "FSB", "SKT", "HIIT",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCatalog {
    prefixes: Vec<String>,
    catch_all: String,
}

impl Default for ProgramCatalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROGRAMS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_CATCH_ALL,
        )
    }
}

impl ProgramCatalog {
    pub fn new(prefixes: Vec<String>, catch_all: impl Into<String>) -> Self {
        Self {
            prefixes,
            catch_all: catch_all.into(),
        }
    }

    /// Longest known prefix of `lesson_name`, else the catch-all.
    pub fn classify(&self, lesson_name: &str) -> String {
        let name = lesson_name.trim();
        self.prefixes
            .iter()
            .filter(|p| !p.is_empty() && name.starts_with(p.as_str()))
            .max_by_key(|p| p.len())
            .unwrap_or(&self.catch_all)
            .clone()
    }
}
