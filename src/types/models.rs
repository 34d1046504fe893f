use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Untitled";

/// Syntax and execution mode of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    C,
    #[default]
    Plaintext,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::Java,
        Language::C,
        Language::Plaintext,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::C => "c",
            Language::Plaintext => "plaintext",
        }
    }

    /// Parses a stored language tag. Unknown tags are not accepted.
    pub fn parse(s: &str) -> Option<Language> {
        match s {
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "plaintext" => Some(Language::Plaintext),
            _ => None,
        }
    }

    /// File extension used when exporting a document.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
            Language::C => "c",
            Language::Plaintext => "txt",
        }
    }

    #[must_use]
    pub const fn is_executable(self) -> bool {
        !matches!(self, Language::Plaintext)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored document as the store returns it.
///
/// `owner` and `collaborators` are optional because a record can be observed
/// before it is fully written. See [`Document::is_initialized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<BTreeSet<String>>,
    pub title: String,
    pub code: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub last_edited: DateTime<Utc>,
}

impl Document {
    /// A document is ready once it has an owner and a well-formed collaborator set.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.owner.is_some() && self.collaborators.is_some()
    }

    #[must_use]
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner.as_deref() == Some(uid)
    }
}

/// Fields supplied when creating a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner: Option<String>,
    pub collaborators: Option<BTreeSet<String>>,
    pub title: String,
    pub code: String,
    pub language: Language,
}

impl NewDocument {
    /// An empty document owned by `uid` with no collaborators.
    #[must_use]
    pub fn for_owner(uid: &str) -> Self {
        Self {
            owner: Some(uid.to_string()),
            collaborators: Some(BTreeSet::new()),
            title: DEFAULT_TITLE.to_string(),
            code: String::new(),
            language: Language::Plaintext,
        }
    }
}

/// Partial update applied by an explicit save. `last_edited` is always bumped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse_roundtrip() {
        for lang in Language::ALL {
            assert_eq!(Language::parse(lang.as_str()), Some(lang));
        }
        assert_eq!(Language::parse("rust"), None);
    }

    #[test]
    fn test_language_extensions() {
        assert_eq!(Language::Python.extension(), "py");
        assert_eq!(Language::Java.extension(), "java");
        assert_eq!(Language::C.extension(), "c");
        assert_eq!(Language::Plaintext.extension(), "txt");
    }

    #[test]
    fn test_language_serde_lowercase() {
        let json = serde_json::to_string(&Language::Python).unwrap();
        assert_eq!(json, "\"python\"");
        let lang: Language = serde_json::from_str("\"c\"").unwrap();
        assert_eq!(lang, Language::C);
    }

    #[test]
    fn test_new_document_defaults() {
        let doc = NewDocument::for_owner("alice");
        assert_eq!(doc.owner.as_deref(), Some("alice"));
        assert_eq!(doc.collaborators, Some(BTreeSet::new()));
        assert_eq!(doc.title, "Untitled");
        assert_eq!(doc.language, Language::Plaintext);
    }
}
