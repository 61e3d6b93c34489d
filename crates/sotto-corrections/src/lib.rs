//! Sotto corrections crate - learned wrong→right text substitutions.
//!
//! The correction store is a durable mapping from (wrong text, language) to a
//! preferred replacement, with usage statistics. It feeds the pipeline twice:
//! before inference as a vocabulary bias, and after grammar cleanup as a
//! whole-word auto-replacement pass.
//!
//! Persistence is best-effort by design: a dictation run must never fail
//! because the corrections file could not be read or written.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use regex::{NoExpand, RegexBuilder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sotto_core::error::{Result, SottoError};

/// How many top entries feed the inference vocabulary hint.
const PROMPT_BIAS_LIMIT: usize = 50;

/// Current on-disk schema version.
const FILE_VERSION: u32 = 1;

// =============================================================================
// Entry
// =============================================================================

/// A learned wrong→right substitution with usage metadata.
///
/// Uniqueness key is `(wrong_text.to_lowercase(), language)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub id: Uuid,
    pub wrong_text: String,
    pub correct_text: String,
    pub language: String,
    /// How many times this mistake has been submitted.
    pub occurrence_count: u64,
    /// Whether `apply_corrections` substitutes this entry automatically.
    pub always_replace: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Versioned on-disk representation of the whole store.
#[derive(Debug, Serialize, Deserialize)]
struct CorrectionsFile {
    version: u32,
    entries: Vec<CorrectionEntry>,
}

// =============================================================================
// Store
// =============================================================================

/// Durable collection of correction entries.
///
/// All access is serialized through an internal lock; the file is rewritten
/// wholesale on every mutation. I/O failures are swallowed with a warning and
/// the store keeps operating in memory.
pub struct CorrectionStore {
    entries: Mutex<Vec<CorrectionEntry>>,
    path: Option<PathBuf>,
}

impl CorrectionStore {
    /// Open a store backed by the given file, loading existing entries.
    ///
    /// A missing or unreadable file yields an empty store.
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::load_from(&path);
        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    /// Create an unpersisted store (used by tests and as the fallback when no
    /// data directory is available).
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path: None,
        }
    }

    fn load_from(path: &PathBuf) -> Vec<CorrectionEntry> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<CorrectionsFile>(&data) {
            Ok(file) => {
                tracing::debug!(
                    count = file.entries.len(),
                    version = file.version,
                    "Correction store loaded"
                );
                file.entries
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt corrections file, starting empty");
                Vec::new()
            }
        }
    }

    /// Rewrite the whole file. Best-effort: failures are logged and dropped.
    fn save(&self, entries: &[CorrectionEntry]) {
        let Some(path) = &self.path else { return };

        let file = CorrectionsFile {
            version: FILE_VERSION,
            entries: entries.to_vec(),
        };
        let json = match serde_json::to_string_pretty(&file) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize corrections");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, json) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write corrections file");
        }
    }

    /// Upsert a correction.
    ///
    /// A repeated (wrong, language) pair increments the occurrence count and
    /// overwrites the replacement text and flag; a new pair creates an entry.
    /// The file is rewritten before this returns.
    pub fn add(
        &self,
        wrong: &str,
        correct: &str,
        language: &str,
        always_replace: bool,
    ) -> CorrectionEntry {
        let key = wrong.to_lowercase();
        let mut entries = self.entries.lock().expect("corrections mutex poisoned");

        let position = entries
            .iter()
            .position(|e| e.wrong_text.to_lowercase() == key && e.language == language);

        let entry = match position {
            Some(idx) => {
                let existing = &mut entries[idx];
                existing.occurrence_count += 1;
                existing.correct_text = correct.to_string();
                existing.always_replace = always_replace;
                existing.last_used_at = Utc::now();
                existing.clone()
            }
            None => {
                let now = Utc::now();
                let entry = CorrectionEntry {
                    id: Uuid::new_v4(),
                    wrong_text: wrong.to_string(),
                    correct_text: correct.to_string(),
                    language: language.to_string(),
                    occurrence_count: 1,
                    always_replace,
                    created_at: now,
                    last_used_at: now,
                };
                entries.push(entry.clone());
                entry
            }
        };

        self.save(&entries);
        entry
    }

    /// Remove an entry by id. Returns whether anything was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock().expect("corrections mutex poisoned");
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() < before;
        if removed {
            self.save(&entries);
        }
        removed
    }

    /// All entries, in store order.
    pub fn all(&self) -> Vec<CorrectionEntry> {
        self.entries
            .lock()
            .expect("corrections mutex poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("corrections mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the whole store as JSON for export.
    pub fn export_snapshot(&self) -> Result<String> {
        let entries = self.entries.lock().expect("corrections mutex poisoned");
        let file = CorrectionsFile {
            version: FILE_VERSION,
            entries: entries.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Replace the whole store with the given snapshot. Prior entries are
    /// discarded. Returns the number of imported entries.
    pub fn import_snapshot(&self, json: &str) -> Result<usize> {
        let file: CorrectionsFile = serde_json::from_str(json)
            .map_err(|e| SottoError::Correction(format!("invalid snapshot: {}", e)))?;
        let mut entries = self.entries.lock().expect("corrections mutex poisoned");
        *entries = file.entries;
        let count = entries.len();
        self.save(&entries);
        tracing::info!(count, "Correction snapshot imported");
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Pipeline integration
    // -------------------------------------------------------------------------

    /// Substitute every `always_replace` entry into `text`.
    ///
    /// Matching is case-insensitive and whole-word: the match may not touch a
    /// word character on either side. Entries are applied in store order, each
    /// pass replacing all leftmost-first matches of that entry.
    pub fn apply_corrections(&self, text: &str) -> String {
        let entries = self.entries.lock().expect("corrections mutex poisoned");
        let mut result = text.to_string();
        for entry in entries.iter().filter(|e| e.always_replace) {
            let pattern = format!(r"\b{}\b", regex::escape(&entry.wrong_text));
            let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => regex,
                Err(e) => {
                    tracing::warn!(wrong = %entry.wrong_text, error = %e, "Skipping unmatchable correction");
                    continue;
                }
            };
            result = regex
                .replace_all(&result, NoExpand(&entry.correct_text))
                .into_owned();
        }
        result
    }

    /// Vocabulary hint for the inference engine, built from the most frequent
    /// corrections. `None` when the store is empty.
    pub fn prompt_bias(&self) -> Option<String> {
        let mut entries = self
            .entries
            .lock()
            .expect("corrections mutex poisoned")
            .clone();
        if entries.is_empty() {
            return None;
        }
        // Stable sort: ties keep insertion order.
        entries.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        let words: Vec<&str> = entries
            .iter()
            .take(PROMPT_BIAS_LIMIT)
            .map(|e| e.correct_text.as_str())
            .collect();
        Some(format!("Vocabulary: {}", words.join(", ")))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_creates_entry() {
        let store = CorrectionStore::in_memory();
        let entry = store.add("teh", "the", "en", true);
        assert_eq!(entry.wrong_text, "teh");
        assert_eq!(entry.correct_text, "the");
        assert_eq!(entry.occurrence_count, 1);
        assert!(entry.always_replace);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_twice_is_one_entry_with_count_two() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", true);
        let second = store.add("teh", "the", "en", true);
        assert_eq!(store.len(), 1);
        assert_eq!(second.occurrence_count, 2);
    }

    #[test]
    fn test_add_key_is_case_insensitive() {
        let store = CorrectionStore::in_memory();
        store.add("Teh", "the", "en", true);
        let second = store.add("teh", "the", "en", true);
        assert_eq!(store.len(), 1);
        assert_eq!(second.occurrence_count, 2);
    }

    #[test]
    fn test_same_wrong_different_language_is_two_entries() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", true);
        store.add("teh", "tee", "de", true);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_repeat_overwrites_replacement_and_flag() {
        let store = CorrectionStore::in_memory();
        store.add("helo", "hello", "en", true);
        let updated = store.add("helo", "hullo", "en", false);
        assert_eq!(updated.correct_text, "hullo");
        assert!(!updated.always_replace);
        assert_eq!(updated.occurrence_count, 2);
    }

    #[test]
    fn test_remove() {
        let store = CorrectionStore::in_memory();
        let entry = store.add("teh", "the", "en", true);
        assert!(store.remove(entry.id));
        assert!(store.is_empty());
        assert!(!store.remove(entry.id));
    }

    #[test]
    fn test_apply_corrections_whole_word_case_insensitive() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", true);
        assert_eq!(store.apply_corrections("I saw Teh dog"), "I saw the dog");
        // Not a whole-word match.
        assert_eq!(store.apply_corrections("reteha"), "reteha");
    }

    #[test]
    fn test_apply_corrections_noop_without_flagged_entries() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", false);
        assert_eq!(store.apply_corrections("teh quick fox"), "teh quick fox");
    }

    #[test]
    fn test_apply_corrections_noop_without_matches() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", true);
        let input = "nothing to fix here";
        assert_eq!(store.apply_corrections(input), input);
    }

    #[test]
    fn test_apply_corrections_replaces_all_occurrences() {
        let store = CorrectionStore::in_memory();
        store.add("teh", "the", "en", true);
        assert_eq!(
            store.apply_corrections("teh cat and teh dog"),
            "the cat and the dog"
        );
    }

    #[test]
    fn test_apply_corrections_multiple_entries_in_store_order() {
        let store = CorrectionStore::in_memory();
        store.add("helo", "hello", "en", true);
        store.add("wrld", "world", "en", true);
        assert_eq!(store.apply_corrections("helo wrld"), "hello world");
    }

    #[test]
    fn test_apply_corrections_escapes_pattern_metacharacters() {
        let store = CorrectionStore::in_memory();
        store.add("a+b", "sum", "en", true);
        assert_eq!(store.apply_corrections("compute a+b now"), "compute sum now");
    }

    #[test]
    fn test_apply_corrections_replacement_is_literal() {
        let store = CorrectionStore::in_memory();
        store.add("cost", "$100", "en", true);
        assert_eq!(store.apply_corrections("the cost total"), "the $100 total");
    }

    #[test]
    fn test_prompt_bias_empty_store() {
        let store = CorrectionStore::in_memory();
        assert!(store.prompt_bias().is_none());
    }

    #[test]
    fn test_prompt_bias_ranked_by_occurrence() {
        let store = CorrectionStore::in_memory();
        store.add("aa", "alpha", "en", true);
        store.add("bb", "beta", "en", true);
        store.add("bb", "beta", "en", true); // count 2
        let bias = store.prompt_bias().unwrap();
        assert_eq!(bias, "Vocabulary: beta, alpha");
    }

    #[test]
    fn test_prompt_bias_ties_keep_insertion_order() {
        let store = CorrectionStore::in_memory();
        store.add("aa", "alpha", "en", true);
        store.add("bb", "beta", "en", true);
        store.add("cc", "gamma", "en", true);
        let bias = store.prompt_bias().unwrap();
        assert_eq!(bias, "Vocabulary: alpha, beta, gamma");
    }

    #[test]
    fn test_prompt_bias_caps_at_limit() {
        let store = CorrectionStore::in_memory();
        for i in 0..60 {
            store.add(&format!("w{}", i), &format!("c{}", i), "en", true);
        }
        let bias = store.prompt_bias().unwrap();
        let listed = bias.trim_start_matches("Vocabulary: ").split(", ").count();
        assert_eq!(listed, PROMPT_BIAS_LIMIT);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");

        {
            let store = CorrectionStore::open(path.clone());
            store.add("teh", "the", "en", true);
            store.add("helo", "hello", "en", true);
        }

        let reopened = CorrectionStore::open(path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.apply_corrections("teh helo"), "the hello");
    }

    #[test]
    fn test_corrupt_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = CorrectionStore::open(path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_file_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CorrectionStore::open(dir.path().join("absent.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_export_import_replace_all() {
        let source = CorrectionStore::in_memory();
        source.add("teh", "the", "en", true);
        source.add("helo", "hello", "en", true);
        let snapshot = source.export_snapshot().unwrap();

        let target = CorrectionStore::in_memory();
        target.add("old", "stale", "en", true);
        let count = target.import_snapshot(&snapshot).unwrap();
        assert_eq!(count, 2);
        assert_eq!(target.len(), 2);
        // The pre-import entry is gone.
        assert_eq!(target.apply_corrections("old"), "old");
    }

    #[test]
    fn test_import_invalid_snapshot_fails() {
        let store = CorrectionStore::in_memory();
        assert!(store.import_snapshot("nonsense").is_err());
    }

    #[test]
    fn test_mutation_persists_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        let store = CorrectionStore::open(path.clone());

        store.add("teh", "the", "en", true);
        // The file is fully rewritten before add() returns.
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk["version"], 1);
        assert_eq!(on_disk["entries"].as_array().unwrap().len(), 1);
    }
}
