//! Terminal rendering of upload events, tables and the phase summary.

use colored::Colorize;
use s3check_upload::{ListedPart, PartReport, UploadEvent, UploadOutcome, UploadStatus};

const RULE_WIDTH: usize = 80;

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

/// Prints events as they arrive.
pub struct Printer {
    verbose: bool,
}

impl Printer {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn event(&self, event: &UploadEvent) {
        if let Some(text) = self.render_event(event) {
            println!("{text}");
        }
    }

    /// Renders one event, or `None` when it is not shown at this verbosity.
    pub fn render_event(&self, event: &UploadEvent) -> Option<String> {
        let text = match event {
            UploadEvent::Stage { message } => format!("\n{message}..."),
            UploadEvent::RemoteCall {
                operation,
                request,
                response,
            } => {
                if !self.verbose {
                    return None;
                }
                let request = serde_json::to_string_pretty(request).unwrap_or_default();
                let response = serde_json::to_string_pretty(response).unwrap_or_default();
                format!(
                    "{}\n{operation}:\n\nRequest:\n{request}\nResponse:\n{response}\n{}",
                    rule('='),
                    rule('=')
                )
            }
            UploadEvent::PartQueued { part_number } => format!("Queueing part {part_number}..."),
            UploadEvent::PartUploaded {
                part_number,
                bytes_uploaded,
                total_bytes,
                ..
            } => format!(
                "{} Part {part_number} uploaded ({bytes_uploaded}/{total_bytes} bytes)",
                "✓".green()
            ),
            UploadEvent::PartsListed { parts } => listed_parts_table(parts),
            UploadEvent::Verified { parts } => {
                format!("{} All {parts} parts verified successfully", "✓".green())
            }
            UploadEvent::PartSelected {
                part_number,
                included,
            } => {
                if *included {
                    format!("Including part {part_number}")
                        .truecolor(255, 165, 0)
                        .to_string()
                } else {
                    format!("Skipping part {part_number}")
                }
            }
            UploadEvent::Aborted { upload_id } => {
                format!("{} Upload {upload_id} aborted", "!".yellow())
            }
            UploadEvent::AbortFailed { upload_id, error } => format!(
                "{}: {error}",
                format!("Failed to abort upload {upload_id}").red()
            ),
            UploadEvent::Completed { target } => {
                format!("{} Upload completed: {target}", "✓".green())
            }
        };
        Some(text)
    }
}

fn listed_parts_table(parts: &[ListedPart]) -> String {
    let mut out = format!("\nFound {} parts:\n{}\n", parts.len(), rule('-'));
    out.push_str(&format!(
        "{:<8} {:<12} {:<32} {:<24} {}\n",
        "Part #", "Size", "ETag", "Last Modified", "Checksum (CRC32)"
    ));
    out.push_str(&rule('-'));
    for part in parts {
        let modified = part
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "\n{:<8} {:<12} {:<32} {:<24} {}",
            part.part_number,
            part.size,
            part.etag,
            modified,
            part.checksum_crc32.as_deref().unwrap_or("-")
        ));
    }
    out.push('\n');
    out.push_str(&rule('-'));
    out
}

/// Per-part checksum table plus the final object checksum.
pub fn checksum_table(outcome: &UploadOutcome) -> String {
    let mut out = String::from("\n=== Checksums Summary ===\n");
    out.push_str(
        &format!(
            "{:<8} {:<12} {:<15} {}",
            "Part #", "Size (bytes)", "Status", "Checksum (CRC32)"
        )
        .green()
        .to_string(),
    );
    out.push('\n');
    out.push_str(&rule('-'));
    for part in &outcome.parts {
        out.push('\n');
        out.push_str(&part_row(part));
    }
    out.push('\n');
    out.push_str(&rule('-'));

    out.push_str(&format!(
        "\n{} {}",
        "Payload CRC32:".green(),
        outcome.object_checksum.yellow()
    ));
    if let Some(server) = &outcome.server_checksum {
        out.push_str(&format!(
            "\n{} {}",
            "Final object CRC32:".green(),
            server.yellow()
        ));
        match (outcome.server_checksum_matches(), outcome.expected_server_checksum()) {
            (Some(true), _) => out.push_str(&format!(" {}", "(matches local)".green())),
            (Some(false), Some(local)) => {
                out.push_str(&format!(" {}", format!("(local: {local})").red()))
            }
            _ => {}
        }
    }
    if let Some(composite) = &outcome.composite_checksum {
        out.push_str(&format!("\n{} {composite}", "Composite CRC32:".green()));
    }
    out
}

fn part_row(part: &PartReport) -> String {
    let status = if part.included { "included" } else { "skipped" };
    let lead = format!("{:<8} {:<12} {:<15}", part.part_number, part.size, status);
    let lead = if part.included {
        lead.truecolor(255, 165, 0).to_string()
    } else {
        lead
    };
    format!("{lead} {}", part.checksum_crc32.yellow())
}

/// Phase history, colored by outcome.
pub fn phase_summary(status: &UploadStatus) -> String {
    let mut out = String::from("\n=== Upload Phase Summary ===");
    for phase in status.phases() {
        let line = phase.summary_line();
        out.push('\n');
        if phase.success {
            out.push_str(&line.green().to_string());
        } else {
            out.push_str(&line.red().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3check_upload::{Operation, PhaseKind};

    fn plain() {
        colored::control::set_override(false);
    }

    fn outcome() -> UploadOutcome {
        let mut status = UploadStatus::new();
        status
            .record(PhaseKind::Initialization, None, true, "Upload initiated successfully", None)
            .unwrap();
        UploadOutcome {
            upload_id: "u-1".into(),
            location: None,
            etag: None,
            version_id: None,
            server_checksum: Some("y/Q5Jg==".into()),
            object_checksum: "0MvXcg==".into(),
            assembled_checksum: "y/Q5Jg==".into(),
            composite_checksum: Some("AAAAAA==-2".into()),
            parts: vec![
                PartReport {
                    part_number: 1,
                    size: 5,
                    checksum_crc32: "c1".into(),
                    included: true,
                },
                PartReport {
                    part_number: 2,
                    size: 4,
                    checksum_crc32: "c2".into(),
                    included: false,
                },
            ],
            status,
        }
    }

    #[test]
    fn checksum_table_marks_included_and_skipped() {
        plain();
        let table = checksum_table(&outcome());
        let lines: Vec<&str> = table.lines().collect();

        let row = |n: &str, status: &str, checksum: &str| {
            lines
                .iter()
                .any(|l| l.starts_with(n) && l.contains(status) && l.ends_with(checksum))
        };
        assert!(row("1 ", "included", "c1"));
        assert!(row("2 ", "skipped", "c2"));
        assert!(table.contains("Payload CRC32: 0MvXcg=="));
        assert!(table.contains("Final object CRC32: y/Q5Jg== (matches local)"));
        assert!(table.contains("Composite CRC32: AAAAAA==-2"));
    }

    #[test]
    fn phase_summary_lists_phases() {
        plain();
        let summary = phase_summary(&outcome().status);
        assert_eq!(
            summary.trim_start().lines().collect::<Vec<_>>(),
            vec![
                "=== Upload Phase Summary ===",
                "✓ upload initialization: Upload initiated successfully"
            ]
        );
    }

    #[test]
    fn remote_calls_only_when_verbose() {
        plain();
        let event = UploadEvent::RemoteCall {
            operation: Operation::ListParts,
            request: serde_json::json!({"UploadId": "u-1"}),
            response: serde_json::json!({"parts": []}),
        };
        assert!(Printer::new(false).render_event(&event).is_none());
        let text = Printer::new(true).render_event(&event).unwrap();
        assert!(text.contains("ListParts:"));
        assert!(text.contains("\"UploadId\": \"u-1\""));
    }

    #[test]
    fn part_selection_lines() {
        plain();
        let printer = Printer::new(false);
        let skipped = UploadEvent::PartSelected {
            part_number: 3,
            included: false,
        };
        assert_eq!(printer.render_event(&skipped).unwrap(), "Skipping part 3");
    }
}
