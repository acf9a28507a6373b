//! Voice command vocabulary.
//!
//! The engine reports recognized speech as `VCCOM:<utterance>`. A vocabulary
//! maps the leading words of an utterance to a canonical command name and
//! leaves the rest as arguments, e.g. `"dial alpha bravo"` with `dial` aliased
//! to `call` yields `call` + `"alpha bravo"`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    commands: Vec<CommandEntry>,
}

#[derive(Debug, Deserialize)]
struct CommandEntry {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
}

/// A recognized command and the words that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCommand {
    pub name: String,
    pub args: String,
}

/// Lowercased keyword (name or alias) → canonical command name.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    keywords: HashMap<String, String>,
}

impl Vocabulary {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary '{}'", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("failed to parse vocabulary '{}'", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: VocabularyFile = serde_yaml::from_str(text)?;
        let mut vocabulary = Self::default();
        for entry in file.commands {
            let name = normalize(&entry.name);
            if name.is_empty() {
                continue;
            }
            for alias in &entry.aliases {
                let alias = normalize(alias);
                if !alias.is_empty() {
                    vocabulary.keywords.insert(alias, name.clone());
                }
            }
            vocabulary.keywords.insert(name.clone(), name);
        }
        Ok(vocabulary)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Grow the command one word at a time while the prefix is still a
    /// keyword; the last matching prefix wins. A whole-utterance match is a
    /// command with no arguments.
    pub fn parse(&self, utterance: &str) -> Option<VoiceCommand> {
        let words: Vec<&str> = utterance.split_whitespace().collect();
        let mut best = None;
        for split in 1..=words.len() {
            let prefix = normalize(&words[..split].join(" "));
            match self.keywords.get(&prefix) {
                Some(name) => best = Some((name, split)),
                None => break,
            }
        }
        best.map(|(name, split)| VoiceCommand {
            name: name.clone(),
            args: words[split..].join(" "),
        })
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
