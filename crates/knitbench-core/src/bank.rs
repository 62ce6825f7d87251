//! TOML question bank parser.
//!
//! The bank is the static reference corpus read at generation time:
//! passages for counting, obfuscation and long-context cases, and
//! multiple-choice items for the obfuscated-choice variants.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BANK: &str = include_str!("../data/default_bank.toml");

/// A reference passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub text: String,
}

impl Passage {
    /// Sentences of the passage, split on terminal punctuation.
    pub fn sentences(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut start = 0;
        let text = self.text.as_str();
        for (i, c) in text.char_indices() {
            if matches!(c, '.' | '!' | '?') {
                let end = i + c.len_utf8();
                let s = text[start..end].trim();
                if !s.is_empty() {
                    out.push(s);
                }
                start = end;
            }
        }
        let rest = text[start..].trim();
        if !rest.is_empty() {
            out.push(rest);
        }
        out
    }
}

/// A multiple-choice item with a zero-based answer index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqItem {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    pub question: String,
    pub options: Vec<String>,
    pub answer: usize,
}

impl McqItem {
    /// Text of the correct option, if the index is in range.
    pub fn answer_text(&self) -> Option<&str> {
        self.options.get(self.answer).map(String::as_str)
    }
}

/// The full reference corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    pub passages: Vec<Passage>,
    pub mmlu: Vec<McqItem>,
    pub medmcqa: Vec<McqItem>,
}

impl QuestionBank {
    /// The bank compiled into the crate.
    pub fn builtin() -> Result<Self> {
        parse_bank_str(DEFAULT_BANK, Path::new("<builtin>"))
    }

    /// Append another bank's content to this one.
    pub fn merge(&mut self, other: QuestionBank) {
        self.passages.extend(other.passages);
        self.mmlu.extend(other.mmlu);
        self.medmcqa.extend(other.medmcqa);
    }
}

#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    passages: Vec<Passage>,
    #[serde(default)]
    mmlu: Vec<McqItem>,
    #[serde(default)]
    medmcqa: Vec<McqItem>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    #[serde(default)]
    name: String,
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let passages = parsed
        .passages
        .into_iter()
        .map(|p| Passage {
            text: p.text.trim().to_string(),
            ..p
        })
        .collect();

    Ok(QuestionBank {
        name: if parsed.bank.name.is_empty() {
            parsed.bank.id.clone()
        } else {
            parsed.bank.name
        },
        id: parsed.bank.id,
        passages,
        mmlu: parsed.mmlu,
        medmcqa: parsed.medmcqa,
    })
}

/// Recursively load and merge every `.toml` bank under a directory.
pub fn load_bank_directory(dir: &Path) -> Result<QuestionBank> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut merged = QuestionBank {
        id: dir.display().to_string(),
        name: dir.display().to_string(),
        ..Default::default()
    };

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    // read_dir order is platform-dependent; generation must not be.
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            merged.merge(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => merged.merge(bank),
                Err(e) => tracing::warn!("skipping {}: {e:#}", path.display()),
            }
        }
    }

    Ok(merged)
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a bank for issues that would break or weaken generation.
pub fn validate_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    let ids = bank
        .passages
        .iter()
        .map(|p| &p.id)
        .chain(bank.mmlu.iter().map(|m| &m.id))
        .chain(bank.medmcqa.iter().map(|m| &m.id));
    for id in ids {
        if !seen.insert(id) {
            warnings.push(ValidationWarning {
                item_id: Some(id.clone()),
                message: format!("duplicate item ID: {id}"),
            });
        }
    }

    for p in &bank.passages {
        if p.text.split_whitespace().count() < 20 {
            warnings.push(ValidationWarning {
                item_id: Some(p.id.clone()),
                message: "passage has fewer than 20 words".into(),
            });
        }
    }

    for item in bank.mmlu.iter().chain(&bank.medmcqa) {
        if item.options.len() < 2 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: "fewer than 2 options".into(),
            });
        }
        if item.options.len() > 26 {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: "more than 26 options cannot be labelled".into(),
            });
        }
        if item.answer >= item.options.len() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: format!(
                    "answer index {} out of range for {} options",
                    item.answer,
                    item.options.len()
                ),
            });
        }
        let distinct: HashSet<String> = item.options.iter().map(|o| o.to_lowercase()).collect();
        if distinct.len() != item.options.len() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id.clone()),
                message: "options are not distinct".into(),
            });
        }
    }

    if bank.passages.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "no passages: text-based cases cannot be generated".into(),
        });
    }
    if bank.mmlu.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "no mmlu items: mmlu cases cannot be generated".into(),
        });
    }
    if bank.medmcqa.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "no medmcqa items: medical cases cannot be generated".into(),
        });
    }

    warnings
}
