//! Headless runner: loads every bundled line, runs it, prints stage stats and
//! verifies determinism.
//!
//! Run with: `cargo run --package prodline-data --example headless_runner`
//! Set `RUST_LOG=debug` (or `trace`) to follow individual tokens.

use std::path::Path;

use prodline_core::event::EventKind;
use prodline_core::stage::StageKind;
use prodline_data::loader::{list_pipeline_files, load_line};

const TICKS: u64 = 200;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let lines_dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/lines"));
    let files = list_pipeline_files(lines_dir).expect("failed to list lines");

    for path in &files {
        // Run 1
        let mut line1 = load_line(path).unwrap_or_else(|e| {
            panic!("failed to load '{}': {e}", path.display());
        });
        println!("--- {} ({}) ---", line1.title(), path.display());
        for issue in line1.issues() {
            println!("    issue: {issue}");
        }

        let result = line1.advance(TICKS);
        let hash1 = line1.state_hash();
        println!(
            "    After {TICKS} ticks: delivered={}, rejected={}, live tokens={}, state hash = {hash1:#018x}",
            result.delivered,
            result.rejected,
            line1.live_token_count(),
        );

        for kind in line1.stage_kinds() {
            for name in line1.stage_names(kind) {
                let Some(snap) = line1.stage_snapshot(&name) else {
                    continue;
                };
                let progress = snap
                    .progress
                    .map(|p| format!("{}/{}", p.elapsed, p.total))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "      [{:>14}] {:<12} held={:<4} emitted={:<5} progress={progress}",
                    snap.name,
                    kind.name(),
                    snap.held_count(),
                    snap.emitted,
                );
            }
        }

        let events: Vec<String> = [
            EventKind::TokenEmitted,
            EventKind::TokenArrived,
            EventKind::TokenRejected,
        ]
        .iter()
        .map(|&kind| format!("{kind:?}={}", line1.event_bus.total_emitted(kind)))
        .collect();
        println!("    Events: {}", events.join(", "));

        if let Some(name) = line1.stage_names(StageKind::QualityGate).first() {
            println!("\n{}\n", line1.stage_stats(StageKind::QualityGate, name));
        }

        // Run 2 -- determinism check
        let mut line2 = load_line(path).unwrap_or_else(|e| {
            panic!("failed to load '{}' (run 2): {e}", path.display());
        });
        line2.advance(TICKS);
        let hash2 = line2.state_hash();

        if hash1 == hash2 {
            println!("    Determinism: PASS (hashes match)");
        } else {
            println!("    Determinism: FAIL! hash1={hash1:#018x} != hash2={hash2:#018x}");
            std::process::exit(1);
        }

        println!();
    }

    println!("All {} lines passed.", files.len());
}
