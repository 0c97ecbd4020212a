use crate::config::{INCREMENT, JSON_EXT};
use crate::utils::ids::IdGenerator;
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer as _, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("error opening JSON file {identifier} for processing: {source}")]
    OpenSource {
        identifier: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error during file {path} create: {source}")]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error occurred when decoding JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("error occurred when encoding JSON: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("error occurred in writing to JSON file: {0}")]
    Write(#[source] std::io::Error),
}

/// One element of an uploaded JSON array. Every field is optional and unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,
}

impl PlayerEntry {
    /// Drops text fields starting with a vowel and bumps even integers by [`INCREMENT`].
    pub fn transformed(self) -> Self {
        Self {
            player_name: keep_text(self.player_name),
            avatar_name: keep_text(self.avatar_name),
            player_score: self.player_score.map(bump_even),
            life_count: self.life_count.map(bump_even),
            game: keep_text(self.game),
        }
    }
}

/// Empty strings never start with a vowel.
pub fn starts_with_vowel(value: &str) -> bool {
    value
        .chars()
        .next()
        .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
}

fn keep_text(value: Option<String>) -> Option<String> {
    value.filter(|v| !starts_with_vowel(v))
}

// zero counts as even
fn bump_even(value: i64) -> i64 {
    if value % 2 == 0 {
        value.saturating_add(INCREMENT)
    } else {
        value
    }
}

/// Produces a derivative of an uploaded file and returns the derivative's identifier.
///
/// Implementations block; the dispatcher runs them on the blocking pool.
pub trait Transformer: Send + Sync {
    fn transform(&self, source_identifier: &str) -> Result<String, TransformError>;
}

/// Filters and rewrites a JSON array of [`PlayerEntry`] into a new file.
pub struct JsonTransformer {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
    ids: Arc<dyn IdGenerator>,
}

impl JsonTransformer {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
            ids,
        }
    }
}

impl Transformer for JsonTransformer {
    fn transform(&self, source_identifier: &str) -> Result<String, TransformError> {
        let source = File::open(self.upload_dir.join(source_identifier)).map_err(|source| {
            TransformError::OpenSource {
                identifier: source_identifier.to_string(),
                source,
            }
        })?;

        let filename = format!("{}{}", self.ids.generate(), JSON_EXT);
        let path = self.processed_dir.join(&filename);
        let mut output = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| TransformError::CreateOutput {
                path: path.clone(),
                source,
            })?;

        // One element is decoded at a time; only the transformed entries are kept.
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(source));
        let entries = (&mut de)
            .deserialize_seq(EntryVisitor)
            .map_err(TransformError::Decode)?;

        let encoded = serde_json::to_vec(&entries).map_err(TransformError::Encode)?;
        output.write_all(&encoded).map_err(TransformError::Write)?;

        tracing::info!(
            "file {} processed to {} ({} entries)",
            source_identifier,
            filename,
            entries.len()
        );

        Ok(filename)
    }
}

struct EntryVisitor;

impl<'de> Visitor<'de> for EntryVisitor {
    type Value = Vec<PlayerEntry>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array of entries")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut entries = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(entry) = seq.next_element::<PlayerEntry>()? {
            entries.push(entry.transformed());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, score: i64, lives: i64) -> PlayerEntry {
        PlayerEntry {
            player_name: Some(name.to_string()),
            player_score: Some(score),
            life_count: Some(lives),
            ..Default::default()
        }
    }

    #[test]
    fn test_starts_with_vowel() {
        for value in ["apple", "Eve", "igloo", "Oscar", "umbrella", "A"] {
            assert!(starts_with_vowel(value), "{value}");
        }
        for value in ["", "bob", "Zed", "yak", "1up", " eve", "émile"] {
            assert!(!starts_with_vowel(value), "{value}");
        }
    }

    #[test]
    fn test_vowel_led_name_is_dropped() {
        let out = entry("Eve", 4, 3).transformed();
        assert_eq!(
            out,
            PlayerEntry {
                player_score: Some(4 + INCREMENT),
                life_count: Some(3),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_consonant_led_fields_are_kept() {
        let input = PlayerEntry {
            player_name: Some("Bob".to_string()),
            avatar_name: Some("Knight".to_string()),
            game: Some("Chess".to_string()),
            ..Default::default()
        };
        assert_eq!(input.clone().transformed(), input);
    }

    #[test]
    fn test_all_text_fields_filtered() {
        let input = PlayerEntry {
            player_name: Some("alice".to_string()),
            avatar_name: Some("Orc".to_string()),
            game: Some("Uno".to_string()),
            ..Default::default()
        };
        assert_eq!(input.transformed(), PlayerEntry::default());
    }

    #[test]
    fn test_empty_strings_are_kept() {
        let input = PlayerEntry {
            player_name: Some(String::new()),
            game: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(input.clone().transformed(), input);
    }

    #[test]
    fn test_parity_rules() {
        assert_eq!(bump_even(0), INCREMENT);
        assert_eq!(bump_even(2), 2 + INCREMENT);
        assert_eq!(bump_even(-4), -4 + INCREMENT);
        assert_eq!(bump_even(1), 1);
        assert_eq!(bump_even(-3), -3);
        assert_eq!(bump_even(i64::MAX - 1), i64::MAX);
    }

    #[test]
    fn test_absent_integers_stay_absent() {
        let out = PlayerEntry::default().transformed();
        assert_eq!(out.player_score, None);
        assert_eq!(out.life_count, None);
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let out = entry("Eve", 4, 3).transformed();
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(json, r#"{"playerScore":1004,"lifeCount":3}"#);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let parsed: PlayerEntry =
            serde_json::from_str(r#"{"playerName":"Bob","level":7,"lifeCount":null}"#).unwrap();
        assert_eq!(parsed.player_name.as_deref(), Some("Bob"));
        assert_eq!(parsed.life_count, None);
    }
}
