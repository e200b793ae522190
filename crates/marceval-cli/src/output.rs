use std::io::Write;

use marceval_core::similarity::{HIGH_SIMILARITY_THRESHOLD, MEDIUM_SIMILARITY_THRESHOLD};
use marceval_core::{AggregateResult, MatchKind, RecordComparison};
use marceval_record::{CanonicalRecord, RecordFormat};
use marceval_reporting::truncate;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Score band used for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Good,
    Fair,
    Poor,
}

/// Same strict cut-offs as the `high` / `medium` match classes, so a field
/// scored exactly at a threshold is colored like its class.
fn band(score: f64) -> Band {
    if score > HIGH_SIMILARITY_THRESHOLD {
        Band::Good
    } else if score > MEDIUM_SIMILARITY_THRESHOLD {
        Band::Fair
    } else {
        Band::Poor
    }
}

fn fmt_pct(score: f64, color: ColorMode) -> String {
    let text = format!("{:6.2}%", score * 100.0);
    if !color.enabled() {
        return text;
    }
    match band(score) {
        Band::Good => text.green().to_string(),
        Band::Fair => text.yellow().to_string(),
        Band::Poor => text.red().to_string(),
    }
}

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", title.bold())?;
    } else {
        writeln!(w, "{}", title)?;
    }
    writeln!(w, "{}", "-".repeat(title.len()))
}

/// Print one record comparison as a per-field table.
pub fn print_comparison(
    w: &mut dyn Write,
    comparison: &RecordComparison,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "Field comparison", color)?;

    let width = comparison
        .configured()
        .map(|f| f.selector.len())
        .max()
        .unwrap_or(0);
    for field in comparison.configured() {
        writeln!(
            w,
            "  {:<width$}  {}  {:<12}  {}",
            field.selector,
            fmt_pct(field.score, color),
            field.method.as_str(),
            field.notes,
        )?;
        if field.method != MatchKind::Exact && field.method != MatchKind::BothMissing {
            let expected = truncate(&field.expected, 70);
            let actual = truncate(&field.actual, 70);
            if color.enabled() {
                writeln!(w, "  {:<width$}    ref: {}", "", expected.dimmed())?;
                writeln!(w, "  {:<width$}    gen: {}", "", actual.dimmed())?;
            } else {
                writeln!(w, "  {:<width$}    ref: {}", "", expected)?;
                writeln!(w, "  {:<width$}    gen: {}", "", actual)?;
            }
        }
    }

    writeln!(w)?;
    if !comparison.missing_fields.is_empty() {
        writeln!(w, "Missing: {}", comparison.missing_fields.join(", "))?;
    }
    if !comparison.extra_fields.is_empty() {
        writeln!(w, "Extra:   {}", comparison.extra_fields.join(", "))?;
    }
    writeln!(
        w,
        "Fields:  {} matched | {} missing | {} incorrect | {} edits",
        comparison.fields_matched,
        comparison.fields_missing,
        comparison.fields_incorrect,
        comparison.levenshtein_total,
    )?;
    writeln!(w, "Overall: {}", fmt_pct(comparison.overall_score, color))?;
    Ok(())
}

/// Print a parsed record and its status flags.
pub fn print_record(
    w: &mut dyn Write,
    name: &str,
    format: RecordFormat,
    record: &CanonicalRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("{} ({})", name, format), color)?;

    let flag = |set: bool| if set { "yes" } else { "no" };
    writeln!(w, "  Fields:     {}", record.len())?;
    writeln!(w, "  Book:       {}", flag(record.is_book()))?;
    if record.is_withdrawn() {
        if color.enabled() {
            writeln!(w, "  Withdrawn:  {}", "yes".red())?;
        } else {
            writeln!(w, "  Withdrawn:  yes")?;
        }
    } else {
        writeln!(w, "  Withdrawn:  no")?;
    }
    writeln!(w, "  Suppressed: {}", flag(record.is_suppressed()))?;
    writeln!(w)?;
    write!(w, "{}", record.to_mnemonic())?;
    Ok(())
}

/// Print the dataset-level summary after an evaluation run.
pub fn print_summary(
    w: &mut dyn Write,
    agg: &AggregateResult,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(60))?;
    if color.enabled() {
        writeln!(w, "{}", "EVALUATION SUMMARY".bold())?;
    } else {
        writeln!(w, "EVALUATION SUMMARY")?;
    }
    writeln!(w, "{}", "=".repeat(60))?;

    writeln!(w, "Total records:  {}", agg.total_records)?;
    if color.enabled() {
        writeln!(w, "  Successful:   {}", agg.success_count.to_string().green())?;
        writeln!(w, "  Failed:       {}", agg.failure_count.to_string().red())?;
    } else {
        writeln!(w, "  Successful:   {}", agg.success_count)?;
        writeln!(w, "  Failed:       {}", agg.failure_count)?;
    }
    if agg.withdrawn_count > 0 {
        writeln!(w, "  Withdrawn:    {} (skipped)", agg.withdrawn_count)?;
    }
    writeln!(w, "  Success rate: {:.1}%", agg.success_rate())?;
    writeln!(w)?;

    let d = &agg.distribution;
    writeln!(w, "Average score:  {}", fmt_pct(d.mean, color))?;
    writeln!(w, "Median score:   {}", fmt_pct(d.median, color))?;
    writeln!(w, "Min score:      {}", fmt_pct(d.min, color))?;
    writeln!(w, "Max score:      {}", fmt_pct(d.max, color))?;

    if !agg.selectors.is_empty() {
        writeln!(w)?;
        writeln!(w, "Field accuracy:")?;
        let width = agg.selectors.iter().map(|s| s.name.len()).max().unwrap_or(0);
        for stats in &agg.selectors {
            writeln!(
                w,
                "  {:<width$}  {}  (n={})",
                stats.name,
                fmt_pct(stats.average, color),
                stats.count
            )?;
        }
    }
    writeln!(w, "{}", "=".repeat(60))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marceval_core::{FieldComparator, SelectorSet};

    fn make_comparison() -> RecordComparison {
        let comparator = FieldComparator::new(SelectorSet::five_field());
        comparator
            .compare_raw(
                b"=100  1\\$aFitzgerald, F. Scott\n=245  14$aThe great Gatsby",
                None,
                b"=100  1\\$aFitzgerlad, F. Scott\n=245  14$aThe great Gatsby",
                None,
            )
            .unwrap()
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_band_thresholds() {
        assert_eq!(band(1.0), Band::Good);
        assert_eq!(band(0.81), Band::Good);
        assert_eq!(band(0.8), Band::Fair);
        assert_eq!(band(0.51), Band::Fair);
        assert_eq!(band(0.5), Band::Poor);
        assert_eq!(band(0.49), Band::Poor);
    }

    #[test]
    fn test_band_agrees_with_match_class() {
        use marceval_core::similarity::classify;
        for score in [0.0, 0.5, 0.500001, 0.8, 0.800001, 0.95] {
            let expected = match classify(score) {
                MatchKind::High => Band::Good,
                MatchKind::Medium => Band::Fair,
                _ => Band::Poor,
            };
            assert_eq!(band(score), expected, "score {score}");
        }
    }

    #[test]
    fn test_plain_comparison_has_no_escape_codes() {
        let out = render(|w| print_comparison(w, &make_comparison(), ColorMode(false)));
        assert!(!out.contains('\x1b'));
        assert!(out.contains("title"));
        assert!(out.contains("high"));
        assert!(out.contains("gen: Fitzgerlad, F. Scott"));
    }

    #[test]
    fn test_record_flags() {
        let record =
            marceval_record::parse(b"=LDR  00000dam  2200000   4500\n=245  10$aGone", None).unwrap();
        let out = render(|w| {
            print_record(w, "gone.mrk", RecordFormat::Mnemonic, &record, ColorMode(false))
        });
        assert!(out.contains("Withdrawn:  yes"));
        assert!(out.contains("Book:       yes"));
        assert!(out.contains("=245  10$aGone"));
    }
}
