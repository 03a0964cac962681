use std::fmt::Write;

use crate::device::DeviceId;
use crate::engine::Summary;
use crate::models::{Timed, TimedRecord};

/// Merges the summary's scores and nightmare entries into one newest-first log.
pub fn timeline(summary: &Summary) -> Vec<TimedRecord> {
    let mut entries: Vec<TimedRecord> = summary
        .filtered_scores
        .iter()
        .cloned()
        .map(TimedRecord::from)
        .chain(
            summary
                .filtered_nightmares
                .iter()
                .cloned()
                .map(TimedRecord::from),
        )
        .collect();
    entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    entries
}

pub fn build_report(device: &DeviceId, summary: &Summary) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Sleep Summary");
    let _ = writeln!(
        output,
        "Generated for device {} ({} window, {} to {})",
        device,
        summary.window,
        summary.interval.start.format("%Y-%m-%d %H:%M UTC"),
        summary.interval.end.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Sleep Scores");

    if summary.filtered_scores.is_empty() {
        let _ = writeln!(output, "No sleep scores recorded for this window.");
    } else {
        let _ = writeln!(
            output,
            "Average score {:.1} across {} nights",
            summary.average,
            summary.filtered_scores.len()
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Nightmares");
    let _ = writeln!(output, "{} nightmares reported", summary.nightmare_count);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Night Log");

    let entries = timeline(summary);
    if entries.is_empty() {
        let _ = writeln!(output, "Nothing logged for this window.");
    } else {
        for entry in entries.iter().take(14) {
            let when = entry.timestamp().format("%a %b %-d %H:%M");
            match entry {
                TimedRecord::Score(record) => {
                    let _ = writeln!(output, "- {when}: sleep score {}", record.score);
                }
                TimedRecord::Nightmare(record) if record.occurred => {
                    let detail = record.description.as_deref().unwrap_or("no description");
                    match record.intensity {
                        Some(intensity) => {
                            let _ = writeln!(
                                output,
                                "- {when}: nightmare ({intensity}): {detail}"
                            );
                        }
                        None => {
                            let _ = writeln!(output, "- {when}: nightmare: {detail}");
                        }
                    }
                }
                TimedRecord::Nightmare(_) => {
                    let _ = writeln!(output, "- {when}: no nightmare");
                }
            }
        }
    }

    output
}
