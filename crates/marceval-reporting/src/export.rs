use std::io::Write;
use std::path::Path;

use marceval_core::{AggregateResult, EvaluationOutcome, MatchKind, RecordComparison};
use marceval_core::similarity::DIFF_THRESHOLD;

use crate::{EvaluationReport, ExportFormat, ReportError};

/// Longest value shown for a difference in the text report.
const DIFF_DISPLAY_LEN: usize = 80;

/// Render `report` in `format`.
pub fn render_report(report: &EvaluationReport, format: ExportFormat) -> Result<String, ReportError> {
    Ok(match format {
        ExportFormat::Text => render_text(report),
        ExportFormat::Json => render_json(report)?,
        ExportFormat::Csv => render_csv(report),
    })
}

/// Render `report` and write it to `path`.
pub fn export_report(
    report: &EvaluationReport,
    format: ExportFormat,
    path: &Path,
) -> Result<(), ReportError> {
    let content = render_report(report, format)?;
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    tracing::debug!(path = %path.display(), %format, "exported report");
    Ok(())
}

/// Shorten `s` to at most `max_len` characters, ending in `...` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// ── JSON ─────────────────────────────────────────────────────────────────

pub fn render_json(report: &EvaluationReport) -> Result<String, ReportError> {
    let mut out = serde_json::to_string_pretty(report)?;
    out.push('\n');
    Ok(out)
}

// ── CSV ──────────────────────────────────────────────────────────────────

/// Quote a cell when it holds a delimiter, a quote or a line break.
fn csv_cell(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per record; one score column per configured selector, in
/// configuration order. Records without a comparison score 0 everywhere.
pub fn render_csv(report: &EvaluationReport) -> String {
    let columns = report.selector_columns();

    let mut out = String::from("id,overall_score,missing_fields,extra_fields,error");
    for column in &columns {
        out.push(',');
        out.push_str(&csv_cell(column));
    }
    out.push('\n');

    for result in &report.results {
        let mut row = vec![csv_cell(&result.id)];
        match &result.comparison {
            Some(c) => {
                row.push(format!("{:.4}", c.overall_score));
                row.push(csv_cell(&c.missing_fields.join(";")));
                row.push(csv_cell(&c.extra_fields.join(";")));
                row.push(String::new());
                for column in &columns {
                    row.push(format!("{:.4}", c.score_of(column).unwrap_or(0.0)));
                }
            }
            None => {
                let error = if result.withdrawn {
                    "skipped: withdrawn"
                } else {
                    result.error.as_deref().unwrap_or("")
                };
                row.push("0".to_string());
                row.push(String::new());
                row.push(String::new());
                row.push(csv_cell(error));
                row.extend(columns.iter().map(|_| "0".to_string()));
            }
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

// ── Text ─────────────────────────────────────────────────────────────────

pub fn render_text(report: &EvaluationReport) -> String {
    let mut out = String::from("MARC Cataloging Evaluation Report\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');

    write_summary(&mut out, &report.aggregate);

    let title = "Detailed Results";
    out.push_str(&format!("\n{}\n", title));
    out.push_str(&"-".repeat(title.len()));
    out.push('\n');

    for (i, result) in report.results.iter().enumerate() {
        write_record(&mut out, i + 1, result);
    }
    out
}

fn write_summary(out: &mut String, agg: &AggregateResult) {
    let meta = &agg.metadata;
    out.push_str(&format!(
        "Evaluated: {}\n",
        meta.evaluated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Provider:  {}\n", meta.provider.as_deref().unwrap_or("-")));
    out.push_str(&format!("Model:     {}\n", meta.model.as_deref().unwrap_or("-")));
    if let Some(dataset) = &meta.dataset {
        out.push_str(&format!("Dataset:   {}\n", dataset));
    }
    out.push_str(&format!("Sample:    {}\n", meta.sample_size));

    let total = agg.total_records;
    out.push_str(&format!("\n  Total records:   {}\n", total));
    out.push_str(&format!(
        "  Successful:      {} ({:.1}%)\n",
        agg.success_count,
        pct(agg.success_count, total)
    ));
    out.push_str(&format!(
        "  Failed:          {} ({:.1}%)\n",
        agg.failure_count,
        pct(agg.failure_count, total)
    ));
    if agg.withdrawn_count > 0 {
        out.push_str(&format!("  Withdrawn:       {} (skipped)\n", agg.withdrawn_count));
    }

    let fields_total = agg.fields_matched + agg.fields_missing + agg.fields_incorrect;
    out.push_str(&format!(
        "  Fields:          {} matched ({:.1}%) | {} missing | {} incorrect | {} edits\n",
        agg.fields_matched,
        pct(agg.fields_matched, fields_total),
        agg.fields_missing,
        agg.fields_incorrect,
        agg.levenshtein_total,
    ));
    if agg.success_count > 0 {
        out.push_str(&format!(
            "  Processing time: {} ms total | {:.1} ms average\n",
            agg.total_processing_time_ms, agg.average_processing_time_ms
        ));
    }

    let d = &agg.distribution;
    out.push_str(&format!(
        "\n  Score: mean {:.2}% | median {:.2}% | min {:.2}% | max {:.2}%\n",
        d.mean * 100.0,
        d.median * 100.0,
        d.min * 100.0,
        d.max * 100.0,
    ));

    if agg.selectors.is_empty() {
        return;
    }
    let width = agg.selectors.iter().map(|s| s.name.len()).max().unwrap_or(0);
    out.push_str("\n  Field accuracy:\n");
    for stats in &agg.selectors {
        let histogram: Vec<String> = stats
            .histogram
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(kind, n)| format!("{kind} {n}"))
            .collect();
        out.push_str(&format!(
            "    {:<width$}  {:>7.2}%  ({})\n",
            stats.name,
            stats.average * 100.0,
            histogram.join(", "),
        ));
    }
}

fn write_record(out: &mut String, num: usize, result: &EvaluationOutcome) {
    out.push_str(&format!("\n  [{}] {}\n", num, result.id));

    if result.withdrawn {
        out.push_str("       Skipped: reference record is withdrawn\n");
        return;
    }
    let Some(c) = &result.comparison else {
        out.push_str(&format!(
            "       Error: {}\n",
            result.error.as_deref().unwrap_or("unknown error")
        ));
        return;
    };

    out.push_str(&format!("       Overall score: {:.2}%\n", c.overall_score * 100.0));
    if !c.missing_fields.is_empty() {
        out.push_str(&format!("       Missing: {}\n", c.missing_fields.join(", ")));
    }
    if !c.extra_fields.is_empty() {
        out.push_str(&format!("       Extra:   {}\n", c.extra_fields.join(", ")));
    }
    write_field_scores(out, c);
}

fn write_field_scores(out: &mut String, c: &RecordComparison) {
    out.push_str("       Field scores:\n");
    for field in c.configured() {
        let kind = if field.method == MatchKind::Exact {
            String::new()
        } else {
            format!(" ({})", field.method)
        };
        out.push_str(&format!(
            "         {}: {:.2}%{}\n",
            field.selector,
            field.score * 100.0,
            kind
        ));
    }

    let significant: Vec<_> = c
        .differences
        .iter()
        .filter(|d| d.similarity < DIFF_THRESHOLD)
        .collect();
    if significant.is_empty() {
        return;
    }
    out.push_str("       Significant differences:\n");
    for diff in significant {
        out.push_str(&format!(
            "         {} ({:.0}% similar)\n",
            diff.selector,
            diff.similarity * 100.0
        ));
        out.push_str(&format!(
            "           Reference: {}\n",
            truncate(&diff.expected, DIFF_DISPLAY_LEN)
        ));
        out.push_str(&format!(
            "           Generated: {}\n",
            truncate(&diff.actual, DIFF_DISPLAY_LEN)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marceval_core::{FieldComparator, RunMetadata, SelectorSet, aggregate};

    const REFERENCE: &str =
        "=LDR  00000nam  2200000   4500\n=100  1\\$aMelville, Herman\n=245  10$aMoby Dick, or, The whale\n=650  \\0$aWhaling";
    const CANDIDATE: &str = "=245  10$aMoby Dick\n=500  \\\\$aA note";

    fn make_success(id: &str) -> EvaluationOutcome {
        let comparator = FieldComparator::new(SelectorSet::five_field());
        let comparison = comparator
            .compare_raw(REFERENCE.as_bytes(), None, CANDIDATE.as_bytes(), None)
            .unwrap();
        EvaluationOutcome::success(id, comparison).with_processing_time(Some(120))
    }

    fn make_report(results: Vec<EvaluationOutcome>) -> EvaluationReport {
        let mut meta = RunMetadata::now(results.len());
        meta.provider = Some("ollama".into());
        meta.model = Some("llava".into());
        let agg = aggregate(&results, meta);
        EvaluationReport::new(agg, &SelectorSet::five_field(), results)
    }

    // ── CSV ─────────────────────────────────────────────────────────────

    #[test]
    fn test_csv_record_id_with_comma_is_quoted() {
        let report = make_report(vec![make_success("ocm,12345")]);
        let csv = render_csv(&report);
        assert!(csv.lines().nth(1).unwrap().starts_with("\"ocm,12345\","));
    }

    #[test]
    fn test_csv_error_quotes_are_doubled() {
        let report = make_report(vec![EvaluationOutcome::failure(
            "bad",
            r#"failed to parse candidate record: unexpected "$" at line 3, col 1"#,
        )]);
        let csv = render_csv(&report);
        assert_eq!(
            csv.lines().nth(1).unwrap(),
            r#"bad,0,,,"failed to parse candidate record: unexpected ""$"" at line 3, col 1",0,0,0,0,0"#
        );
    }

    #[test]
    fn test_csv_multiline_error_stays_in_one_cell() {
        let report = make_report(vec![EvaluationOutcome::failure(
            "ml",
            "generation failed: upstream said\nrate limited",
        )]);
        let csv = render_csv(&report);
        assert!(csv.contains(",\"generation failed: upstream said\nrate limited\","));
        assert_eq!(csv.matches('\n').count(), 3);
    }

    #[test]
    fn test_csv_columns_follow_selector_order() {
        let report = make_report(vec![make_success("r1")]);
        let csv = render_csv(&report);
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "id,overall_score,missing_fields,extra_fields,error,title,author,date,isbn,subject"
        );
    }

    #[test]
    fn test_csv_success_row() {
        let report = make_report(vec![make_success("r1")]);
        let csv = render_csv(&report);
        let row: Vec<&str> = csv.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(row[0], "r1");
        assert_eq!(row[2], "author;subject");
        assert_eq!(row[3], "500");
        assert_eq!(row[4], "");
        // title is a substring match, author missing
        assert_eq!(row[5], "0.8000");
        assert_eq!(row[6], "0.0000");
    }

    #[test]
    fn test_csv_failure_row_scores_zero() {
        let report = make_report(vec![
            make_success("ok"),
            EvaluationOutcome::failure("bad", "failed to parse candidate record: no fields"),
        ]);
        let csv = render_csv(&report);
        let row = csv.lines().nth(2).unwrap();
        assert_eq!(
            row,
            "bad,0,,,failed to parse candidate record: no fields,0,0,0,0,0"
        );
    }

    #[test]
    fn test_csv_columns_recovered_without_selector_list() {
        let mut report = make_report(vec![make_success("r1")]);
        report.selectors.clear();
        assert_eq!(
            report.selector_columns(),
            vec!["title", "author", "date", "isbn", "subject"]
        );
    }

    // ── Text ────────────────────────────────────────────────────────────

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 80), "short");
        let long = "x".repeat(100);
        let cut = truncate(&long, 80);
        assert_eq!(cut.chars().count(), 80);
        assert!(cut.ends_with("..."));
        // multibyte input is cut on character boundaries
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_text_report_sections() {
        let report = make_report(vec![
            make_success("r1"),
            EvaluationOutcome::failure("r2", "no candidate record"),
            EvaluationOutcome::withdrawn("r3"),
        ]);
        let text = render_text(&report);
        assert!(text.starts_with("MARC Cataloging Evaluation Report\n"));
        assert!(text.contains("Provider:  ollama"));
        assert!(text.contains("Successful:      1 (50.0%)"));
        assert!(text.contains("Withdrawn:       1 (skipped)"));
        assert!(text.contains("[1] r1"));
        assert!(text.contains("Missing: author, subject"));
        assert!(text.contains("Extra:   500"));
        assert!(text.contains("Significant differences:"));
        assert!(text.contains("Error: no candidate record"));
        assert!(text.contains("Skipped: reference record is withdrawn"));
    }

    #[test]
    fn test_text_report_empty_run() {
        let text = render_text(&make_report(vec![]));
        assert!(text.contains("Total records:   0"));
        assert!(text.contains("mean 0.00%"));
    }

    // ── JSON / files ────────────────────────────────────────────────────

    #[test]
    fn test_json_has_aggregate_and_results() {
        let report = make_report(vec![make_success("r1")]);
        let json = render_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["aggregate"]["success_count"], 1);
        assert_eq!(value["results"][0]["id"], "r1");
        assert_eq!(
            value["results"][0]["comparison"]["fields"]["title"]["method"],
            "substring"
        );
    }

    #[test]
    fn test_export_report_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let report = make_report(vec![make_success("r1")]);
        export_report(&report, ExportFormat::Csv, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_csv(&report));
    }
}
