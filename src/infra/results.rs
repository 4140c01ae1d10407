// ============================================================
// Layer 6 — Result Files
// ============================================================
// Persists one evaluation run as three JSON files next to the
// checkpoint:
//
//   results.json   { "Bleu_1": 0.41, "CIDEr": 0.87, ... }
//   preds.json     [ "what color is the bus", ... ]
//   gts.json       [ "what color is the bus", ... ]
//
// preds[i] and gts[i] belong to the same example, in loader order.
// Nothing is written until the whole pass has finished.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::generation::EvaluationReport;

pub const DEFAULT_RESULTS: &str = "results.json";
pub const DEFAULT_PREDS:   &str = "preds.json";
pub const DEFAULT_GTS:     &str = "gts.json";

#[derive(Debug, Clone)]
pub struct ResultWriter {
    pub results: PathBuf,
    pub preds:   PathBuf,
    pub gts:     PathBuf,
}

impl ResultWriter {
    /// Result file names are resolved inside `dir`.
    pub fn new(dir: &Path, results: &str, preds: &str, gts: &str) -> Self {
        Self {
            results: dir.join(results),
            preds:   dir.join(preds),
            gts:     dir.join(gts),
        }
    }

    pub fn write(&self, report: &EvaluationReport) -> Result<()> {
        write_json(&self.results, &report.scores)?;
        write_json(&self.preds, &report.predictions)?;
        write_json(&self.gts, &report.references)?;
        tracing::info!(
            "Wrote {} metrics and {} predictions to '{}'",
            report.scores.len(),
            report.predictions.len(),
            self.results.parent().unwrap_or_else(|| Path::new(".")).display(),
        );
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}
