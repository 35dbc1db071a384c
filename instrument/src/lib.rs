//! Turn log: collects the simulation's structured `tracing` events into
//! column-oriented tables, one table per event target.
//!
//! Columns are created on first sight of a field, so the schema of each table
//! is whatever the core emits for that target. Every core event carries a
//! `turn` field, which makes the tables joinable on it.
//!
//! # Usage
//!
//! ```ignore
//! let log = instrument::TurnLog::new();
//! tracing::subscriber::with_default(log.subscriber(), || {
//!     for _ in 0..20 {
//!         state.advance_turn();
//!     }
//! });
//! let tables = log.drain_to_dataframes();
//! let per_turn = instrument::events_per_turn(&tables["caravan"])?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use polars::prelude::*;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Id, Level, Metadata, Subscriber};

// ============================================================================
// Tables
// ============================================================================

/// A column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pad_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        match self {
            TypedColumn::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            TypedColumn::F64(v) => v.extend(std::iter::repeat_n(0.0, missing)),
            TypedColumn::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            TypedColumn::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }

    fn to_column(&self, name: &str) -> Column {
        match self {
            TypedColumn::U64(v) => Column::new(name.into(), v),
            TypedColumn::I64(v) => Column::new(name.into(), v),
            TypedColumn::F64(v) => Column::new(name.into(), v),
            TypedColumn::Bool(v) => Column::new(name.into(), v),
            TypedColumn::Str(v) => Column::new(name.into(), v),
        }
    }
}

/// One target's rows. Every column always holds `row_count` values; a field
/// missing from an event gets the column type's zero value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicTable {
    pub columns: BTreeMap<String, TypedColumn>,
    pub row_count: usize,
}

impl DynamicTable {
    fn align(&mut self) {
        for column in self.columns.values_mut() {
            column.pad_to(self.row_count);
        }
    }

    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| column.to_column(name))
            .collect();
        DataFrame::new(columns)
    }
}

/// All tables recorded so far, keyed by event target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorder {
    pub tables: BTreeMap<String, DynamicTable>,
}

impl Recorder {
    /// Tables that fail to convert are skipped.
    pub fn to_dataframes(&self) -> BTreeMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }

    fn record(&mut self, event: &Event<'_>) {
        let table = self
            .tables
            .entry(event.metadata().target().to_string())
            .or_default();
        table.align();
        let row = table.row_count;
        event.record(&mut RowVisitor { table, row });
        table.row_count += 1;
        table.align();
    }
}

/// Writes one event's fields into the current row.
struct RowVisitor<'a> {
    table: &'a mut DynamicTable,
    row: usize,
}

impl RowVisitor<'_> {
    fn column(&mut self, field: &Field, empty: impl FnOnce(usize) -> TypedColumn) -> &mut TypedColumn {
        let row = self.row;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(row))
    }
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let TypedColumn::U64(v) = self.column(field, |n| TypedColumn::U64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let TypedColumn::I64(v) = self.column(field, |n| TypedColumn::I64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let TypedColumn::F64(v) = self.column(field, |n| TypedColumn::F64(vec![0.0; n])) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let TypedColumn::Bool(v) = self.column(field, |n| TypedColumn::Bool(vec![false; n])) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let TypedColumn::Str(v) =
            self.column(field, |n| TypedColumn::Str(vec![String::new(); n]))
        {
            v.push(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

// ============================================================================
// TurnLog
// ============================================================================

/// Shared handle to a recorder. Clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct TurnLog {
    recorder: Arc<Mutex<Recorder>>,
    targets: Option<Arc<BTreeSet<String>>>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only record events whose target is listed
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(Arc::new(targets.into_iter().map(Into::into).collect()));
        self
    }

    pub fn subscriber(&self) -> TurnLogSubscriber {
        TurnLogSubscriber {
            log: self.clone(),
            next_span: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepts(&self, target: &str) -> bool {
        self.targets.as_ref().is_none_or(|t| t.contains(target))
    }

    /// Take everything recorded so far, leaving the log empty
    pub fn drain(&self) -> Recorder {
        std::mem::take(&mut *self.lock())
    }

    pub fn clear(&self) {
        *self.lock() = Recorder::default();
    }

    pub fn row_count(&self, target: &str) -> usize {
        self.lock().tables.get(target).map_or(0, |t| t.row_count)
    }

    pub fn table(&self, target: &str) -> Option<DynamicTable> {
        self.lock().tables.get(target).cloned()
    }

    pub fn drain_to_dataframes(&self) -> BTreeMap<String, DataFrame> {
        self.drain().to_dataframes()
    }
}

/// `tracing` subscriber feeding a `TurnLog`. Records events at INFO and above;
/// spans are accepted but carry no data.
pub struct TurnLogSubscriber {
    log: TurnLog,
    next_span: AtomicU64,
}

impl Subscriber for TurnLogSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= Level::INFO && self.log.accepts(metadata.target())
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(self.next_span.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        self.log.lock().record(event);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

// ============================================================================
// Analysis / Export
// ============================================================================

/// Row count per turn, sorted by turn. The frame must have a `turn` column.
pub fn events_per_turn(df: &DataFrame) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .group_by([col("turn")])
        .agg([len().alias("events")])
        .sort(["turn"], SortMultipleOptions::default())
        .collect()
}

fn io_error(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

/// Write each table to `{dir}/{target}.parquet`.
pub fn save_parquet(dfs: &mut BTreeMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{}.parquet", name))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

/// RAII recording of one simulation run.
///
/// While alive, a fresh `TurnLog` is the thread's default subscriber. On drop
/// the tables are written to `{parent}/{run_name}/` followed by a `_ready`
/// marker file.
///
/// ```ignore
/// let mut run = instrument::RunRecorder::new("runs", "hanza_opening");
/// // ... advance turns ...
/// let caravans = &run.get()["caravan"];
/// ```
pub struct RunRecorder {
    log: TurnLog,
    run_dir: PathBuf,
    dfs: Option<BTreeMap<String, DataFrame>>,
    guard: Option<DefaultGuard>,
}

impl RunRecorder {
    pub fn new(parent: impl Into<PathBuf>, run_name: &str) -> Self {
        let log = TurnLog::new();
        let guard = tracing::subscriber::set_default(log.subscriber());
        Self {
            run_dir: parent.into().join(sanitize(run_name)),
            log,
            dfs: None,
            guard: Some(guard),
        }
    }

    pub fn log(&self) -> &TurnLog {
        &self.log
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Stop recording and return the tables. Later calls return the same data.
    pub fn get(&mut self) -> &BTreeMap<String, DataFrame> {
        self.guard.take();
        let log = &self.log;
        self.dfs.get_or_insert_with(|| log.drain_to_dataframes())
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        self.guard.take();
        let mut dfs = self
            .dfs
            .take()
            .unwrap_or_else(|| self.log.drain_to_dataframes());
        if dfs.is_empty() {
            return;
        }
        if let Err(e) = save_parquet(&mut dfs, &self.run_dir) {
            eprintln!("RunRecorder({}): failed to write parquet: {}", self.run_dir.display(), e);
            return;
        }
        if let Err(e) = std::fs::File::create(self.run_dir.join("_ready")) {
            eprintln!("RunRecorder({}): failed to write _ready: {}", self.run_dir.display(), e);
        }
    }
}

/// Directory-safe run name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(60)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;

    #[test]
    fn test_events_become_rows() {
        let log = TurnLog::new();
        with_default(log.subscriber(), || {
            tracing::info!(target: "caravan", turn = 1u32, caravan = "c1", arrived = false);
            tracing::info!(target: "caravan", turn = 2u32, caravan = "c1", arrived = true);
            tracing::info!(target: "victory", turn = 2u32, progress = 0.25f64);
        });

        assert_eq!(log.row_count("caravan"), 2);
        assert_eq!(log.row_count("victory"), 1);
        let caravans = log.table("caravan").unwrap();
        assert_eq!(caravans.column("turn"), Some(&TypedColumn::U64(vec![1, 2])));
        assert_eq!(
            caravans.column("arrived"),
            Some(&TypedColumn::Bool(vec![false, true]))
        );
    }

    #[test]
    fn test_missing_fields_are_padded() {
        let log = TurnLog::new();
        with_default(log.subscriber(), || {
            tracing::info!(target: "trade", turn = 1u32, route = "a-b");
            tracing::info!(target: "trade", turn = 2u32, delta = -5i64);
            tracing::info!(target: "trade", turn = 3u32);
        });

        let table = log.table("trade").unwrap();
        assert_eq!(table.row_count, 3);
        assert_eq!(
            table.column("route"),
            Some(&TypedColumn::Str(vec!["a-b".into(), String::new(), String::new()]))
        );
        assert_eq!(table.column("delta"), Some(&TypedColumn::I64(vec![0, -5, 0])));
    }

    #[test]
    fn test_target_filter_and_levels() {
        let log = TurnLog::new().with_targets(["combat"]);
        with_default(log.subscriber(), || {
            tracing::info!(target: "combat", turn = 1u32, casualties = 3u32);
            tracing::warn!(target: "combat", turn = 1u32, "defender routed");
            tracing::debug!(target: "combat", turn = 1u32, detail = "ignored");
            tracing::info!(target: "ai", turn = 1u32);
        });

        assert_eq!(log.row_count("combat"), 2);
        assert_eq!(log.row_count("ai"), 0);
        let combat = log.table("combat").unwrap();
        assert_eq!(
            combat.column("message"),
            Some(&TypedColumn::Str(vec![String::new(), "defender routed".into()]))
        );
    }

    #[test]
    fn test_drain_empties_log() {
        let log = TurnLog::new();
        let handle = log.clone();
        with_default(log.subscriber(), || {
            tracing::info!(target: "turn", turn = 4u32);
        });
        assert_eq!(handle.drain().tables.len(), 1);
        assert_eq!(log.row_count("turn"), 0);
    }

    #[test]
    fn test_events_per_turn() {
        let log = TurnLog::new();
        with_default(log.subscriber(), || {
            for turn in [3u32, 1, 3, 2, 3] {
                tracing::info!(target: "event", turn = turn);
            }
        });
        let dfs = log.drain_to_dataframes();
        let counts = events_per_turn(&dfs["event"]).unwrap();

        let turns: Vec<u64> = counts
            .column("turn")
            .unwrap()
            .u64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let events: Vec<u32> = counts
            .column("events")
            .unwrap()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(turns, vec![1, 2, 3]);
        assert_eq!(events, vec![1, 1, 3]);
    }
}
