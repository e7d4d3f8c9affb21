//! Recorded position traces
//!
//! A trace is a JSON-lines file with one `RawFix` per line:
//!
//! ```text
//! {"latitude":45.0686,"longitude":7.6843,"accuracy":8.0,"timestamp":1700000000000}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A trace replays as a
//! position script whose pauses follow the recorded timestamps.

use crate::error::Result;
use crate::position::RawFix;
use crate::simulation::ScriptStep;
use museum_common::time;
use museum_common::Error as CommonError;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Parse a JSON-lines trace
pub fn parse_trace(content: &str) -> Result<Vec<RawFix>> {
    let mut fixes = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fix: RawFix = serde_json::from_str(line).map_err(|e| {
            CommonError::InvalidInput(format!("trace line {}: {}", index + 1, e))
        })?;
        fixes.push(fix);
    }
    Ok(fixes)
}

/// Load a JSON-lines trace from disk
pub fn load_trace(path: &Path) -> Result<Vec<RawFix>> {
    let content = std::fs::read_to_string(path).map_err(CommonError::from)?;
    let fixes = parse_trace(&content)?;
    match fixes.first().and_then(|fix| time::from_epoch_millis(fix.timestamp)) {
        Some(recorded) => info!(
            path = %path.display(),
            fixes = fixes.len(),
            %recorded,
            "Loaded position trace"
        ),
        None => info!(path = %path.display(), fixes = fixes.len(), "Loaded position trace"),
    }
    Ok(fixes)
}

/// Turn a trace into a position script
///
/// The pause before each fix is the recorded gap divided by `speed`.
/// Out-of-order timestamps give no pause; a non-positive or non-finite
/// speed replays without pauses. Fails when a pause is too long to
/// represent, which only happens for vanishingly small speeds.
pub fn trace_to_script(fixes: &[RawFix], speed: f64) -> Result<Vec<ScriptStep>> {
    let mut script = Vec::with_capacity(fixes.len() * 2);
    let mut previous: Option<i64> = None;

    for fix in fixes {
        if let Some(previous) = previous {
            let gap_ms = fix.timestamp.saturating_sub(previous);
            if gap_ms > 0 && speed.is_finite() && speed > 0.0 {
                let pause = Duration::try_from_secs_f64(gap_ms as f64 / 1000.0 / speed)
                    .map_err(|e| {
                        CommonError::InvalidInput(format!(
                            "replay speed {} gives an unusable {} ms gap: {}",
                            speed, gap_ms, e
                        ))
                    })?;
                script.push(ScriptStep::Wait(pause));
            }
        }
        script.push(ScriptStep::Fix(*fix));
        previous = Some(fix.timestamp);
    }

    Ok(script)
}
