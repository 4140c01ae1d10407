// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Loads the word ↔ index mapping shared by the dataset pipeline,
// the model and the evaluation harness.
//
// The vocabulary file is the JSON written by the preprocessing
// scripts:
//   { "word2idx": { "<pad>": 0, "<start>": 1, ... }, "idx2word": ..., "idx": N }
//
// Only `word2idx` is read. It is turned into a WordLevel tokenizer
// JSON in HuggingFace format and loaded with the tokenizers crate,
// so text → ids goes through the same normaliser and
// pre-tokeniser every time.
//
// Reference: tokenizers crate, WordLevel model

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use serde::Deserialize;
use tokenizers::Tokenizer;

use crate::domain::error::IqError;
use crate::domain::traits::WordMapper;

pub const SYM_PAD: &str = "<pad>";
pub const SYM_SOQ: &str = "<start>";
pub const SYM_EOS: &str = "<end>";
pub const SYM_UNK: &str = "<unk>";

#[derive(Debug, Deserialize)]
struct VocabFile {
    word2idx: HashMap<String, u32>,
}

/// Read-only vocabulary, loaded once at startup.
#[derive(Clone)]
pub struct Vocabulary {
    tokenizer: Tokenizer,
    size:      usize,
    pad_id:    u32,
    sos_id:    u32,
    eos_id:    u32,
    unk_id:    u32,
}

impl Vocabulary {
    /// Load a vocabulary JSON file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read vocabulary from '{}'", path.display()))?;
        let file: VocabFile = serde_json::from_str(&json)
            .with_context(|| format!("Malformed vocabulary file '{}'", path.display()))?;
        let vocab = Self::from_word2idx(file.word2idx)?;
        tracing::info!("Loaded vocabulary with {} words from '{}'", vocab.len(), path.display());
        Ok(vocab)
    }

    /// Build a vocabulary from an in-memory word → index map.
    /// All four reserved symbols must be present.
    pub fn from_word2idx(word2idx: HashMap<String, u32>) -> Result<Self> {
        let id_of = |sym: &str| -> Result<u32> {
            word2idx
                .get(sym)
                .copied()
                .ok_or_else(|| IqError::MissingSymbol(sym.to_string()).into())
        };
        let pad_id = id_of(SYM_PAD)?;
        let sos_id = id_of(SYM_SOQ)?;
        let eos_id = id_of(SYM_EOS)?;
        let unk_id = id_of(SYM_UNK)?;

        // Ids may be sparse; the output layer must cover the largest one.
        let size = word2idx.values().copied().max().map_or(0, |m| m as usize + 1);

        let added_tokens: Vec<serde_json::Value> = [SYM_PAD, SYM_SOQ, SYM_EOS, SYM_UNK]
            .iter()
            .map(|sym| serde_json::json!({
                "id": word2idx[*sym], "content": sym, "single_word": false,
                "lstrip": false, "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": word2idx,
                "unk_token": SYM_UNK
            }
        });

        let tokenizer = Tokenizer::from_bytes(serde_json::to_vec(&tokenizer_json)?)
            .map_err(|e| anyhow::anyhow!("Cannot build word-level tokenizer: {e}"))?;

        let vocab = Self { tokenizer, size, pad_id, sos_id, eos_id, unk_id };

        // Reserved symbols must resolve to the ids the file gave them.
        for (sym, id) in [(SYM_PAD, pad_id), (SYM_SOQ, sos_id), (SYM_EOS, eos_id), (SYM_UNK, unk_id)] {
            if vocab.word_to_id(sym) != id {
                return Err(IqError::MissingSymbol(sym.to_string()).into());
            }
        }
        Ok(vocab)
    }

    /// Number of output classes (largest id + 1)
    pub fn len(&self) -> usize { self.size }

    pub fn pad_id(&self) -> u32 { self.pad_id }
    pub fn sos_id(&self) -> u32 { self.sos_id }
    pub fn eos_id(&self) -> u32 { self.eos_id }
    pub fn unk_id(&self) -> u32 { self.unk_id }

    /// Index of a single word, `<unk>` when unknown.
    pub fn word_to_id(&self, word: &str) -> u32 {
        self.tokenizer.token_to_id(word).unwrap_or(self.unk_id)
    }

    /// Encode text into a fixed-width row:
    /// `[<start>]? w1 .. wn <end> <pad> ...`, truncated so that the
    /// end symbol always fits. Returns the row and its unpadded length.
    pub fn encode_padded(
        &self,
        text:       &str,
        width:      usize,
        with_start: bool,
    ) -> Result<(Vec<u32>, usize)> {
        let words = self.encode(text)?;
        let mut row = Vec::with_capacity(width);
        if with_start {
            row.push(self.sos_id);
        }
        let room = width.saturating_sub(row.len() + 1);
        row.extend(words.into_iter().take(room));
        row.push(self.eos_id);
        row.truncate(width);
        let length = row.len();
        row.resize(width, self.pad_id);
        Ok((row, length))
    }
}

impl WordMapper for Vocabulary {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self.tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error for '{text}': {e}"))?;
        Ok(enc.get_ids().to_vec())
    }

    fn tokens_to_words(&self, tokens: &[u32]) -> String {
        let mut words = Vec::new();
        for &token in tokens {
            if token == self.eos_id {
                break;
            }
            if token == self.pad_id || token == self.sos_id {
                continue;
            }
            let word = self.tokenizer
                .id_to_token(token)
                .unwrap_or_else(|| SYM_UNK.to_string());
            words.push(word);
        }
        words.join(" ")
    }
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("size", &self.size)
            .field("sos_id", &self.sos_id)
            .field("eos_id", &self.eos_id)
            .finish()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Ten-word vocabulary used across the crate's tests.
    pub(crate) fn toy_vocab() -> Vocabulary {
        let words = [
            SYM_PAD, SYM_SOQ, SYM_EOS, SYM_UNK,
            "what", "color", "is", "the", "ball", "red",
        ];
        let map = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_string(), i as u32))
            .collect();
        Vocabulary::from_word2idx(map).expect("toy vocabulary")
    }

    #[test]
    fn test_reserved_ids() {
        let v = toy_vocab();
        assert_eq!(v.len(), 10);
        assert_eq!(v.pad_id(), 0);
        assert_eq!(v.sos_id(), 1);
        assert_eq!(v.eos_id(), 2);
        assert_eq!(v.unk_id(), 3);
    }

    #[test]
    fn test_encode_lowercases_and_falls_back_to_unk() {
        let v = toy_vocab();
        assert_eq!(v.encode("What COLOR is the kite").unwrap(), vec![4, 5, 6, 7, 3]);
        assert_eq!(v.word_to_id("zebra"), v.unk_id());
    }

    #[test]
    fn test_tokens_to_words_stops_at_end() {
        let v = toy_vocab();
        let tokens = [1, 4, 5, 6, 7, 8, 2, 9, 9];
        assert_eq!(v.tokens_to_words(&tokens), "what color is the ball");
    }

    #[test]
    fn test_tokens_to_words_skips_padding() {
        let v = toy_vocab();
        assert_eq!(v.tokens_to_words(&[0, 9, 0, 8]), "red ball");
    }

    #[test]
    fn test_encode_padded_layout() {
        let v = toy_vocab();
        let (row, len) = v.encode_padded("the red ball", 7, true).unwrap();
        assert_eq!(row, vec![1, 7, 9, 8, 2, 0, 0]);
        assert_eq!(len, 5);
    }

    #[test]
    fn test_encode_padded_truncates_but_keeps_end() {
        let v = toy_vocab();
        let (row, len) = v.encode_padded("what color is the ball", 4, true).unwrap();
        assert_eq!(row, vec![1, 4, 5, 2]);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_missing_symbol_is_rejected() {
        let map = [("<pad>".to_string(), 0u32)].into_iter().collect();
        let err = Vocabulary::from_word2idx(map).unwrap_err();
        assert_eq!(
            err.downcast_ref::<IqError>(),
            Some(&IqError::MissingSymbol(SYM_SOQ.to_string())),
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(
            &path,
            r#"{"word2idx": {"<pad>": 0, "<start>": 1, "<end>": 2, "<unk>": 3, "dog": 4},
                "idx2word": {"0": "<pad>"}, "idx": 5}"#,
        ).unwrap();
        let v = Vocabulary::load(&path).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(v.tokens_to_words(&[4, 2]), "dog");
    }
}
