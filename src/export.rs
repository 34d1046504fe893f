//! Download a document's code as a file.

use crate::types::Document;

const FALLBACK_STEM: &str = "code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: String,
}

/// `<title>.<ext>` with the extension chosen by language.
#[must_use]
pub fn export(document: &Document) -> ExportFile {
    let title = document.title.trim();
    let stem = if title.is_empty() { FALLBACK_STEM } else { title };
    ExportFile {
        file_name: format!("{}.{}", sanitize(stem), document.language.extension()),
        contents: document.code.clone(),
    }
}

// Path separators and quotes would break Content-Disposition or the client's filesystem.
fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | '"' | '\r' | '\n' | '\0' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::types::Language;

    fn doc(title: &str, language: Language) -> Document {
        Document {
            id: "d1".to_string(),
            owner: Some("alice".to_string()),
            collaborators: Some(BTreeSet::new()),
            title: title.to_string(),
            code: "print('hi')".to_string(),
            language,
            created_at: Utc::now(),
            last_edited: Utc::now(),
        }
    }

    #[test]
    fn test_extension_by_language() {
        assert_eq!(export(&doc("main", Language::Python)).file_name, "main.py");
        assert_eq!(export(&doc("Main", Language::Java)).file_name, "Main.java");
        assert_eq!(export(&doc("prog", Language::C)).file_name, "prog.c");
        assert_eq!(export(&doc("notes", Language::Plaintext)).file_name, "notes.txt");
    }

    #[test]
    fn test_empty_title_falls_back() {
        let file = export(&doc("  ", Language::Python));
        assert_eq!(file.file_name, "code.py");
        assert_eq!(file.contents, "print('hi')");
    }

    #[test]
    fn test_title_is_sanitized() {
        assert_eq!(export(&doc("a/b\"c", Language::C)).file_name, "a_b_c.c");
    }
}
