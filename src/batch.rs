//! Many documents against one shared mapping.

use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::engine::{extract_with, ExtractOptions};
use crate::error::SelectorError;
use crate::input::Loaded;
use crate::query::Document;
use crate::schema::Mapping;
use crate::value::Extraction;

const CHUNK_SIZE: usize = 500;

/// One document's result, tagged with where it came from.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub source: String,
    #[serde(flatten)]
    pub result: OutcomeResult,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutcomeResult {
    Extracted(Extraction),
    Error { error: String },
}

impl Outcome {
    pub fn extraction(&self) -> Option<&Extraction> {
        match &self.result {
            OutcomeResult::Extracted(extraction) => Some(extraction),
            OutcomeResult::Error { .. } => None,
        }
    }

    pub fn error(source: &str, error: impl fmt::Display) -> Self {
        Self {
            source: source.to_string(),
            result: OutcomeResult::Error {
                error: error.to_string(),
            },
        }
    }

    fn from_result(source: &str, result: Result<Extraction, SelectorError>) -> Self {
        match result {
            Ok(extraction) => Self {
                source: source.to_string(),
                result: OutcomeResult::Extracted(extraction),
            },
            Err(e) => Self::error(source, e),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub clean: usize,
    pub partial: usize,
    pub failed: usize,
    pub errors: usize,
}

impl BatchStats {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut stats = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.extraction() {
                None => stats.errors += 1,
                Some(e) if e.is_failed() => stats.failed += 1,
                Some(e) if e.is_clean() => stats.clean += 1,
                Some(_) => stats.partial += 1,
            }
        }
        stats
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents: {} clean, {} with diagnostics, {} failed, {} errors",
            self.total, self.clean, self.partial, self.failed, self.errors
        )
    }
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Extract every page on the rayon pool. Each worker parses its own
/// document; the mapping is shared read-only. Output keeps input order.
pub fn extract_all(
    pages: &[Loaded],
    mapping: &Mapping,
    options: &ExtractOptions,
    progress: Option<&ProgressBar>,
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(pages.len());
    for chunk in pages.chunks(CHUNK_SIZE) {
        let results: Vec<Outcome> = chunk
            .par_iter()
            .map(|page| {
                let document = match &page.url {
                    Some(url) => Document::parse_with_url(&page.markup, url.clone()),
                    None => Document::parse(&page.markup),
                };
                Outcome::from_result(&page.source, extract_with(&document, mapping, options))
            })
            .collect();
        outcomes.extend(results);
        if let Some(pb) = progress {
            pb.inc(chunk.len() as u64);
        }
    }
    info!(mapping = mapping.name(), "{}", BatchStats::from_outcomes(&outcomes));
    outcomes
}
