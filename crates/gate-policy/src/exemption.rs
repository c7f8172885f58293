// exemption.rs — configured glob allowlist of write targets exempt from
// intent-artifact validation (e.g. a designated failure-reports area).
//
// Deliberately not inferred from naming conventions: a target is exempt iff
// it matches one of these patterns, loaded from `.atlas-gate/intent-exempt`
// or supplied programmatically.

use glob::Pattern;

#[derive(Debug, Clone)]
pub struct ExemptPaths {
    patterns: Vec<Pattern>,
    raw: Vec<String>,
}

impl ExemptPaths {
    pub fn parse_content(content: &str) -> Self {
        let mut patterns = Vec::new();
        let mut raw = Vec::new();
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            raw.push(trimmed.to_string());
            if let Ok(pattern) = Pattern::new(trimmed) {
                patterns.push(pattern);
            }
        }
        Self { patterns, raw }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse_content(&content))
    }

    pub fn load_or_default(path: &std::path::Path) -> Self {
        if path.exists() {
            Self::from_file(path).unwrap_or_else(|_| Self::empty())
        } else {
            Self::empty()
        }
    }

    /// No exemptions — every write requires an intent artifact.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Workspace-relative path, forward-slash separated.
    pub fn is_exempt(&self, workspace_relative_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches(workspace_relative_path))
    }

    pub fn raw_patterns(&self) -> &[String] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_exempts_nothing() {
        let ex = ExemptPaths::empty();
        assert!(!ex.is_exempt("docs/reports/failure-1.md"));
    }

    #[test]
    fn glob_pattern_matches() {
        let ex = ExemptPaths::parse_content("docs/reports/**\n");
        assert!(ex.is_exempt("docs/reports/failure-1.md"));
        assert!(!ex.is_exempt("src/main.rs"));
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let ex = ExemptPaths::parse_content("# comment\n\ndocs/reports/**\n");
        assert_eq!(ex.raw_patterns().len(), 1);
    }

    #[test]
    fn load_or_default_for_missing_file_is_empty() {
        let ex = ExemptPaths::load_or_default(std::path::Path::new("/nonexistent/intent-exempt"));
        assert!(!ex.is_exempt("anything"));
    }

    #[test]
    fn load_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent-exempt");
        std::fs::write(&path, "docs/reports/**\n").unwrap();
        let ex = ExemptPaths::from_file(&path).unwrap();
        assert!(ex.is_exempt("docs/reports/x.md"));
    }
}
