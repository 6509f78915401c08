//! Line-oriented replay of recorded updates.

use std::io::{BufRead, Write};

use lvt_engine::{EngineError, TreeEngine};

/// Counters for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
    pub diagnostics: usize,
}

/// Apply every non-empty line of `input` as one update and write
/// `changed=<bool>` followed by the rendered HTML to `output`.
///
/// Lines that are not valid JSON are logged and skipped.
pub fn replay<R: BufRead, W: Write>(
    engine: &mut TreeEngine,
    input: R,
    mut output: W,
) -> Result<ReplaySummary, EngineError> {
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let payload = line.trim();
        if payload.is_empty() {
            continue;
        }

        match engine.apply_update_json(payload) {
            Ok(result) => {
                summary.applied += 1;
                summary.diagnostics += result.diagnostics.len();
                writeln!(output, "changed={}", result.changed)?;
                writeln!(output, "{}", result.html)?;
            }
            Err(err) => {
                summary.skipped += 1;
                log::warn!("Skipping line {}: {err}", index + 1);
            }
        }
    }

    output.flush()?;
    Ok(summary)
}
