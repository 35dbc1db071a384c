//! Recorded turn logs, analysed as DataFrames.

#![cfg(feature = "instrument")]

use metro_core::instrument::{RunRecorder, TurnLog, events_per_turn};
use metro_core::{Action, ActionKind, GameState, SimConfig};
use polars::prelude::*;

fn col_u64(df: &DataFrame, name: &str) -> Vec<u64> {
    df.column(name)
        .unwrap()
        .u64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn play(turns: usize) -> GameState {
    let mut state = GameState::new(SimConfig::default()).unwrap();
    state
        .execute_action(&Action::new(ActionKind::Trade, "VDNKh").targeting("Polis"))
        .unwrap();
    for _ in 0..turns {
        state.advance_turn();
    }
    state
}

#[test]
fn every_turn_is_logged_once_with_resources() {
    let log = TurnLog::new().with_targets(["turn"]);
    tracing::subscriber::with_default(log.subscriber(), || play(12));

    let dfs = log.drain_to_dataframes();
    let turns = dfs["turn"]
        .clone()
        .lazy()
        // advance rows carry neither an action nor a message
        .filter(col("action").eq(lit("")).and(col("message").eq(lit(""))))
        .collect()
        .unwrap();
    assert_eq!(col_u64(&turns, "turn"), (2..=13).collect::<Vec<u64>>());

    let per_turn = events_per_turn(&dfs["turn"]).unwrap();
    let total: u32 = per_turn
        .column("events")
        .unwrap()
        .u32()
        .unwrap()
        .into_no_null_iter()
        .sum();
    assert_eq!(total as usize, dfs["turn"].height());
}

#[test]
fn caravan_table_tracks_dispatch_and_fate() {
    let log = TurnLog::new().with_targets(["caravan"]);
    tracing::subscriber::with_default(log.subscriber(), || play(20));
    assert!(log.row_count("caravan") >= 2);

    let caravans = log.drain_to_dataframes().remove("caravan").unwrap();
    let by_status = caravans
        .lazy()
        .group_by([col("status")])
        .agg([len().alias("rows"), col("turn").min().alias("first_turn")])
        .sort(["status"], SortMultipleOptions::default())
        .collect()
        .unwrap();

    let statuses: Vec<String> = by_status
        .column("status")
        .unwrap()
        .str()
        .unwrap()
        .into_no_null_iter()
        .map(str::to_string)
        .collect();
    assert!(statuses.contains(&"dispatched".to_string()));
    // one caravan, so exactly one terminal row
    let terminal = statuses
        .iter()
        .filter(|s| s.as_str() == "completed" || s.as_str() == "lost")
        .count();
    assert_eq!(terminal, 1, "statuses: {:?}", statuses);

    let first_turns = col_u64(&by_status, "first_turn");
    let dispatched_at = statuses.iter().position(|s| s == "dispatched").unwrap();
    assert_eq!(first_turns[dispatched_at], 1);
}

#[test]
fn run_recorder_writes_parquet_tables() {
    let parent = std::env::temp_dir().join("metro_core_turn_log");
    let run_dir = {
        let mut run = RunRecorder::new(&parent, "seeded run");
        play(5);
        let tables = run.get();
        assert!(tables.contains_key("turn"));
        run.run_dir().to_path_buf()
    };
    assert!(run_dir.join("turn.parquet").exists());
    assert!(run_dir.join("_ready").exists());
    std::fs::remove_dir_all(&run_dir).unwrap();
}
