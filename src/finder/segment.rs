//! Calibration batch segmentation
//!
//! A calibration query over a two-day window routinely returns frames from
//! several distinct calibration sequences, taken for different programs on
//! the same nights. Only timestamp proximity reliably says which sequence
//! belongs with a given science observation, so segmentation narrows a
//! candidate table down to the single batch whose time midpoint is closest
//! to the science midpoint.
//!
//! Segmentation fails open: an observation id that cannot be parsed into a
//! batch name passes the whole input through with a warning instead of
//! aborting the run.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::models::FrameTable;

/// Derive the batch name by stripping the trailing 3-digit sequence number.
///
/// "GN-CAL20190404-10-013" -> "GN-CAL20190404-10"
pub fn observation_name(observation_id: &str) -> Option<&str> {
    static BATCH_RE: OnceLock<Regex> = OnceLock::new();

    let re = BATCH_RE.get_or_init(|| Regex::new(r"^(.+)-\d{3}$").expect("Invalid regex pattern"));

    re.captures(observation_id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Narrow `table` down to the batch closest in time to `mjd_date`.
///
/// Ties between batches at the same distance break lexicographically by
/// batch name so the result is deterministic.
pub fn segment(table: FrameTable, mjd_date: f64) -> FrameTable {
    debug!(frames = table.len(), "Segmentation starting");

    if table.is_empty() {
        warn!("Segmentation skipped: empty input");
        return table;
    }
    if table.len() == 1 {
        return table;
    }

    // Group start times by batch name; BTreeMap iteration order doubles as
    // the lexicographic tie-break.
    let mut batches: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in table.iter() {
        match observation_name(&row.observation_id) {
            Some(name) => batches.entry(name).or_default().push(row.time_lower),
            None => {
                warn!(
                    observation_id = %row.observation_id,
                    "Unable to parse observation id; quitting segmentation"
                );
                return table;
            }
        }
    }

    let mut closest: Option<(&str, f64)> = None;
    for (name, times) in &batches {
        let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let midpoint = (min + max) / 2.0;
        let delta = (midpoint - mjd_date).abs();

        if closest.map_or(true, |(_, best)| delta < best) {
            closest = Some((name, delta));
        }
    }

    let Some((winner, delta)) = closest else {
        warn!("Segmentation failed");
        return table;
    };
    let winner = winner.to_string();

    let mut out = table;
    out.retain(|row| observation_name(&row.observation_id) == Some(winner.as_str()));

    debug!(
        batch = %winner,
        delta_days = delta,
        frames = out.len(),
        "Segmentation finished"
    );
    out
}
