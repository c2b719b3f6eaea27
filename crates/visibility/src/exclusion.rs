//! Per-stage node exclusions and the skip-sort flag set.
//!
//! File format, one section per stage:
//! ```text
//! ; comments start with ';' or '#'
//! [Stage 12 - Canyon]
//! SkipQuickSort = true
//! 3 = 120, 121, 0x7F
//! 0x10 = 4
//! ```
//! The stage number is the first run of decimal digits in the header. Keys
//! are object numbers, values are node ids, both decimal or `0x` hex.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use horizon_common::{NodeId, ObjectId, StageId};

const SKIP_SORT_KEY: &str = "SkipQuickSort";

/// Errors from reading an exclusion file. Content problems are never errors;
/// they show up as [`ParseIssue`]s in the [`LoadReport`].
#[derive(Debug, thiserror::Error)]
pub enum ExclusionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no exclusion file has been loaded")]
    NoSource,
}

/// Why a line (or part of one) was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIssueKind {
    #[error("unterminated section header")]
    UnterminatedHeader,
    #[error("section header {0:?} has no stage number")]
    NoStageNumber(String),
    #[error("stage {0} is out of range")]
    StageOutOfRange(String),
    #[error("entry appears outside of any stage section")]
    OrphanEntry,
    #[error("line is not a key = value pair")]
    NotKeyValue,
    #[error("object key {0:?} is not a number")]
    BadObjectKey(String),
    #[error("object {0} is out of range")]
    ObjectOutOfRange(u32),
    #[error("node id {0:?} is not a 16-bit number")]
    BadNodeId(String),
    #[error("SkipQuickSort value {0:?} is not a boolean")]
    BadBool(String),
}

/// A skipped line or list item, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub line: usize,
    pub kind: ParseIssueKind,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

/// Outcome of parsing one exclusion document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Stage sections that were accepted.
    pub stages: usize,
    /// Distinct suppressed (stage, object, node) triples.
    pub entries: usize,
    pub skip_sort_stages: usize,
    pub issues: Vec<ParseIssue>,
}

/// Immutable set of suppressed (stage, object, node) triples plus the stages
/// whose renderer sort step is bypassed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionTable {
    suppressed: HashSet<(StageId, ObjectId, NodeId)>,
    skip_sort: HashSet<StageId>,
}

impl ExclusionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_excluded(&self, stage: StageId, object: ObjectId, node: NodeId) -> bool {
        self.suppressed.contains(&(stage, object, node))
    }

    /// Returns false if the triple was already present.
    pub fn insert(&mut self, stage: StageId, object: ObjectId, node: NodeId) -> bool {
        self.suppressed.insert((stage, object, node))
    }

    pub fn skip_sort(&self, stage: StageId) -> bool {
        self.skip_sort.contains(&stage)
    }

    pub fn set_skip_sort(&mut self, stage: StageId, skip: bool) {
        if skip {
            self.skip_sort.insert(stage);
        } else {
            self.skip_sort.remove(&stage);
        }
    }

    /// Number of suppressed triples.
    pub fn len(&self) -> usize {
        self.suppressed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppressed.is_empty() && self.skip_sort.is_empty()
    }

    /// Suppressed nodes for one object in one stage, sorted.
    pub fn excluded_nodes(&self, stage: StageId, object: ObjectId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .suppressed
            .iter()
            .filter(|(s, o, _)| *s == stage && *o == object)
            .map(|(_, _, n)| *n)
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Parse a whole document. Bad lines are skipped one at a time.
    pub fn parse(text: &str) -> (Self, LoadReport) {
        let mut table = Self::new();
        let mut report = LoadReport::default();
        let mut stages = HashSet::new();
        // `None` before the first header; `Some(None)` inside a rejected section.
        let mut current: Option<Option<StageId>> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let mut issue = |kind| report.issues.push(ParseIssue { line: line_no, kind });

            if let Some(header) = line.strip_prefix('[') {
                let stage = match header.strip_suffix(']') {
                    None => {
                        issue(ParseIssueKind::UnterminatedHeader);
                        None
                    }
                    Some(name) => match stage_from_header(name) {
                        Ok(stage) => Some(stage),
                        Err(kind) => {
                            issue(kind);
                            None
                        }
                    },
                };
                if let Some(stage) = stage {
                    stages.insert(stage);
                }
                current = Some(stage);
                continue;
            }

            let stage = match current {
                Some(Some(stage)) => stage,
                // Lines under a rejected header were already reported with it.
                Some(None) => continue,
                None => {
                    issue(ParseIssueKind::OrphanEntry);
                    continue;
                }
            };

            let Some((key, value)) = line.split_once('=') else {
                issue(ParseIssueKind::NotKeyValue);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if key.eq_ignore_ascii_case(SKIP_SORT_KEY) {
                match parse_bool(value) {
                    Some(skip) => table.set_skip_sort(stage, skip),
                    None => issue(ParseIssueKind::BadBool(value.to_string())),
                }
                continue;
            }

            let object = match parse_number(key) {
                None => {
                    issue(ParseIssueKind::BadObjectKey(key.to_string()));
                    continue;
                }
                Some(raw) => match ObjectId::new(raw) {
                    Some(object) => object,
                    None => {
                        issue(ParseIssueKind::ObjectOutOfRange(raw));
                        continue;
                    }
                },
            };

            for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                match parse_number(item).and_then(|n| u16::try_from(n).ok()) {
                    Some(node) => {
                        table.insert(stage, object, NodeId(node));
                    }
                    None => issue(ParseIssueKind::BadNodeId(item.to_string())),
                }
            }
        }

        for issue in &report.issues {
            tracing::warn!(line = issue.line, "skipping exclusion entry: {}", issue.kind);
        }
        report.stages = stages.len();
        report.entries = table.len();
        report.skip_sort_stages = table.skip_sort.len();
        (table, report)
    }
}

fn stage_from_header(name: &str) -> Result<StageId, ParseIssueKind> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return Err(ParseIssueKind::NoStageNumber(name.to_string()));
    }
    digits
        .parse::<u32>()
        .ok()
        .and_then(StageId::new)
        .ok_or(ParseIssueKind::StageOutOfRange(digits))
}

/// Drop a `;` or `#` comment, whole-line or trailing.
fn strip_comment(line: &str) -> &str {
    line.find([';', '#']).map_or(line, |at| &line[..at])
}

fn parse_number(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shared, live-reloadable holder of the current [`ExclusionTable`].
///
/// Readers take an `Arc` snapshot and keep it for a whole pass; a reload
/// builds a fresh table and swaps the pointer, so nobody ever sees a partial
/// rebuild and readers never wait on the parse.
#[derive(Debug, Default)]
pub struct ExclusionStore {
    table: RwLock<Arc<ExclusionTable>>,
    source: Mutex<Option<PathBuf>>,
}

impl ExclusionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: ExclusionTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            source: Mutex::new(None),
        }
    }

    /// The table as of now. Hold on to it for the duration of a pass.
    pub fn snapshot(&self) -> Arc<ExclusionTable> {
        Arc::clone(&self.table.read())
    }

    pub fn skip_sort(&self, stage: StageId) -> bool {
        self.table.read().skip_sort(stage)
    }

    /// Swap in a whole new table.
    pub fn replace(&self, table: ExclusionTable) {
        *self.table.write() = Arc::new(table);
    }

    pub fn clear(&self) {
        self.replace(ExclusionTable::new());
    }

    /// Throw the current table away and rebuild it from `text`.
    pub fn reload_from_str(&self, text: &str) -> LoadReport {
        let (table, report) = ExclusionTable::parse(text);
        self.replace(table);
        tracing::info!(
            stages = report.stages,
            entries = report.entries,
            skip_sort_stages = report.skip_sort_stages,
            skipped = report.issues.len(),
            "exclusion table reloaded"
        );
        report
    }

    /// Read and apply a file, remembering it for [`ExclusionStore::reload`].
    ///
    /// On a read error the current table stays in place.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<LoadReport, ExclusionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ExclusionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        *self.source.lock() = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "reading exclusion file");
        Ok(self.reload_from_str(&text))
    }

    /// Re-read the file last passed to [`ExclusionStore::reload_from_path`].
    pub fn reload(&self) -> Result<LoadReport, ExclusionError> {
        let path = self.source.lock().clone().ok_or(ExclusionError::NoSource)?;
        self.reload_from_path(path)
    }

    pub fn source_path(&self) -> Option<PathBuf> {
        self.source.lock().clone()
    }
}
