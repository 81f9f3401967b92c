//! Memory entry validation.
//!
//! Errors make an entry unstorable; warnings are advisory and travel with
//! the response.

use super::entry::{MemoryEntry, RESERVED_FIELD_NAMES};

const MAX_CONTENT_BYTES: usize = 100_000;
const MAX_FILES: usize = 50;
const MAX_FILE_PATH_LEN: usize = 260;
const MAX_EXTENDED_FIELDS: usize = 20;
const MAX_FIELD_NAME_LEN: usize = 50;
const MAX_FIELD_VALUE_LEN: usize = 1_000;

/// Tokens that smell like script injection. Matching content draws a
/// warning, not an error.
const INJECTION_TOKENS: &[&str] = &["<script", "javascript:", "onerror=", "onload="];

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every invariant a stored memory entry must hold.
pub fn validate_memory(entry: &MemoryEntry) -> ValidationReport {
    let mut report = ValidationReport::default();

    if entry.content.trim().is_empty() {
        report.errors.push("content must not be empty".into());
    }
    if entry.content.len() > MAX_CONTENT_BYTES {
        report.errors.push(format!(
            "content is {} bytes, limit is {MAX_CONTENT_BYTES}",
            entry.content.len()
        ));
    }
    if entry.entry_type.trim().is_empty() {
        report.errors.push("type must not be empty".into());
    }

    if entry.files_involved.len() > MAX_FILES {
        report.errors.push(format!(
            "{} file paths, limit is {MAX_FILES}",
            entry.files_involved.len()
        ));
    }
    for path in &entry.files_involved {
        if path.len() > MAX_FILE_PATH_LEN {
            report
                .errors
                .push(format!("file path longer than {MAX_FILE_PATH_LEN}: '{path}'"));
        }
        if has_traversal(path) {
            report
                .errors
                .push(format!("file path contains traversal segments: '{path}'"));
        }
    }

    if entry.fields.len() > MAX_EXTENDED_FIELDS {
        report.errors.push(format!(
            "{} extended fields, limit is {MAX_EXTENDED_FIELDS}",
            entry.fields.len()
        ));
    }
    for (name, value) in &entry.fields {
        if name.len() > MAX_FIELD_NAME_LEN {
            report
                .errors
                .push(format!("field name longer than {MAX_FIELD_NAME_LEN}: '{name}'"));
        }
        if RESERVED_FIELD_NAMES.contains(&name.as_str()) {
            report
                .errors
                .push(format!("field name '{name}' is reserved"));
        }
        let serialized = value.to_string();
        if serialized.len() > MAX_FIELD_VALUE_LEN {
            report.errors.push(format!(
                "value of field '{name}' is {} chars, limit is {MAX_FIELD_VALUE_LEN}",
                serialized.len()
            ));
        }
    }

    let lowered = entry.content.to_lowercase();
    for token in INJECTION_TOKENS {
        if lowered.contains(token) {
            report
                .warnings
                .push(format!("content contains suspicious token '{token}'"));
        }
    }

    report
}

/// Parent-directory or home-expansion segments, raw or URL-encoded.
fn has_traversal(path: &str) -> bool {
    let lowered = path.to_lowercase();
    if lowered.contains("%2e%2e") || lowered.contains("%2e.") || lowered.contains(".%2e") {
        return true;
    }
    path.split(['/', '\\'])
        .any(|segment| segment == ".." || segment == "~")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> MemoryEntry {
        MemoryEntry::new("TechnicalDebt", "the indexer rebuilds too eagerly")
    }

    #[test]
    fn valid_entry_passes() {
        let report = validate_memory(&entry());
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn empty_content_and_type_fail() {
        let mut e = entry();
        e.content = "   ".into();
        e.entry_type = "".into();
        let report = validate_memory(&e);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn oversized_content_fails() {
        let mut e = entry();
        e.content = "x".repeat(MAX_CONTENT_BYTES + 1);
        assert!(!validate_memory(&e).is_valid());
    }

    #[test]
    fn traversal_paths_fail() {
        for bad in ["../etc/passwd", "src/../../secret", "~/private", "a/%2E%2E/b"] {
            let mut e = entry();
            e.files_involved = vec![bad.to_string()];
            assert!(!validate_memory(&e).is_valid(), "should reject '{bad}'");
        }
        let mut ok = entry();
        ok.files_involved = vec!["src/lib.rs".into(), "docs/adr/0001.md".into()];
        assert!(validate_memory(&ok).is_valid());
    }

    #[test]
    fn too_many_files_fail() {
        let mut e = entry();
        e.files_involved = (0..51).map(|i| format!("f{i}.rs")).collect();
        assert!(!validate_memory(&e).is_valid());
    }

    #[test]
    fn reserved_and_oversized_fields_fail() {
        let mut e = entry();
        e.fields
            .insert("type".into(), serde_json::json!("sneaky"));
        assert!(!validate_memory(&e).is_valid());

        let mut e = entry();
        e.fields.insert(
            "notes".into(),
            serde_json::json!("y".repeat(MAX_FIELD_VALUE_LEN + 10)),
        );
        assert!(!validate_memory(&e).is_valid());

        let mut e = entry();
        for i in 0..21 {
            e.fields.insert(format!("field{i}"), serde_json::json!(i));
        }
        assert!(!validate_memory(&e).is_valid());
    }

    #[test]
    fn injection_tokens_warn_but_do_not_fail() {
        let mut e = entry();
        e.content = "see <script>alert(1)</script> in the template".into();
        let report = validate_memory(&e);
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }
}
