//! Markdown overview of a report.

use std::fmt::Write as _;
use std::path::Path;

use crate::config::SupportedMappers;
use crate::error::ReportError;
use crate::report::{ReportRow, write_atomic};
use crate::signal::Note;

/// Renders the summary for `rows`.
pub fn render_summary(rows: &[ReportRow], supported: &SupportedMappers) -> String {
    let total = rows.len();
    let unsupported: Vec<&ReportRow> = rows.iter().filter(|row| row.supported_now == "no").collect();

    let with_note = |note: Note| tally(rows, |row| has_note(row, note));

    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# ROM Regression Matrix Summary\n");
    let _ = writeln!(out, "- Total ROMs scanned: **{total}**");
    let _ = writeln!(
        out,
        "- Supported mappers ({supported}): **{}**",
        total - unsupported.len()
    );
    let _ = writeln!(out, "- Unsupported mapper ROMs: **{}**\n", unsupported.len());

    let _ = writeln!(out, "## Runtime Signals\n");
    let _ = writeln!(out, "- Booted: **{}**", tally(rows, |row| row.auto_boot == "yes"));
    let _ = writeln!(
        out,
        "- Title stable: **{}**",
        tally(rows, |row| row.auto_title_stable == "yes")
    );
    let _ = writeln!(out, "- CPU jammed: **{}**", tally(rows, |row| row.auto_jammed == "yes"));
    let _ = writeln!(out, "- Timed out: **{}**", with_note(Note::Timeout));
    let _ = writeln!(out, "- Runner errors: **{}**", with_note(Note::RunnerError));
    let _ = writeln!(out, "- Not run: **{}**\n", with_note(Note::NotRun));

    let _ = writeln!(out, "## Unsupported Mapper ROMs\n");
    if unsupported.is_empty() {
        let _ = writeln!(out, "All scanned ROMs are currently mapper-supported.");
    } else {
        let _ = writeln!(out, "| ROM | Mapper |\n|---|---:|");
        for row in unsupported {
            let _ = writeln!(out, "| `{}` | {} |", row.rom, row.mapper);
        }
    }
    out
}

fn tally(rows: &[ReportRow], pred: impl Fn(&ReportRow) -> bool) -> usize {
    rows.iter().filter(|row| pred(row)).count()
}

fn has_note(row: &ReportRow, note: Note) -> bool {
    row.auto_notes.split(';').any(|n| n == note.as_str())
}

pub fn write_summary(
    path: &Path,
    rows: &[ReportRow],
    supported: &SupportedMappers,
) -> Result<(), ReportError> {
    write_atomic(path, render_summary(rows, supported).as_bytes())
}
