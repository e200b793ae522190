use marceval_core::{EvaluationOutcome, FieldComparator, RunMetadata, SelectorSet, aggregate};
use marceval_reporting::{
    EvaluationReport, ExportFormat, RESULTS_FILE, load_results, render_report, save_results,
};

const GATSBY_REFERENCE: &str = "=020  \\\\$a978-0-7432-7356-5\n=245  14$aThe great Gatsby /";
const GATSBY_CANDIDATE: &str = "=020  \\\\$a9780743273565\n=245  10$aGreat Gatsby";

fn make_report() -> EvaluationReport {
    let selectors = SelectorSet::marc_default();
    let comparator = FieldComparator::new(selectors.clone());
    let comparison = comparator
        .compare_raw(
            GATSBY_REFERENCE.as_bytes(),
            None,
            GATSBY_CANDIDATE.as_bytes(),
            None,
        )
        .unwrap();

    let results = vec![
        EvaluationOutcome::success("gatsby", comparison)
            .with_processing_time(Some(900))
            .with_records(Some(GATSBY_REFERENCE.into()), Some(GATSBY_CANDIDATE.into())),
        EvaluationOutcome::failure("broken", "failed to parse candidate record: record is empty")
            .with_records(Some("=245  10$aBroken".into()), None),
    ];
    let mut meta = RunMetadata::now(results.len());
    meta.model = Some("test-model".into());
    let agg = aggregate(&results, meta);
    EvaluationReport::new(agg, &selectors, results)
}

#[test]
fn saved_results_render_identically() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_report();

    let path = save_results(&dir.path().join("run-1"), &report).unwrap();
    assert!(path.ends_with(RESULTS_FILE));

    let loaded = load_results(&dir.path().join("run-1")).unwrap();
    assert_eq!(loaded.selectors, report.selectors);
    assert_eq!(loaded.results.len(), 2);

    for format in [ExportFormat::Text, ExportFormat::Csv] {
        assert_eq!(
            render_report(&loaded, format).unwrap(),
            render_report(&report, format).unwrap()
        );
    }
}

#[test]
fn field_order_survives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_report();
    save_results(dir.path(), &report).unwrap();
    let loaded = load_results(dir.path()).unwrap();

    let names = |r: &EvaluationReport| -> Vec<String> {
        r.results[0]
            .comparison
            .as_ref()
            .unwrap()
            .fields
            .iter()
            .map(|f| f.selector.clone())
            .collect()
    };
    assert_eq!(names(&loaded), names(&report));
}

#[test]
fn isbn_hyphens_do_not_matter() {
    let report = make_report();
    let comparison = report.results[0].comparison.as_ref().unwrap();
    assert_eq!(comparison.score_of("020"), Some(1.0));
    assert_eq!(report.aggregate.failure_count, 1);
}

#[test]
fn record_texts_survive_and_rescore() {
    let dir = tempfile::tempdir().unwrap();
    let report = make_report();
    save_results(dir.path(), &report).unwrap();
    let loaded = load_results(dir.path()).unwrap();

    let gatsby = &loaded.results[0];
    assert_eq!(gatsby.reference_record.as_deref(), Some(GATSBY_REFERENCE));
    assert_eq!(gatsby.candidate_record.as_deref(), Some(GATSBY_CANDIDATE));
    assert_eq!(loaded.results[1].candidate_record, None);
    assert_eq!(loaded.results[1].reference_record.as_deref(), Some("=245  10$aBroken"));

    // The saved texts are enough to score the record again.
    let comparator = FieldComparator::new(SelectorSet::marc_default());
    let rescored = comparator
        .compare_raw(
            gatsby.reference_record.as_deref().unwrap().as_bytes(),
            None,
            gatsby.candidate_record.as_deref().unwrap().as_bytes(),
            None,
        )
        .unwrap();
    assert_eq!(Some(rescored.overall_score), gatsby.overall_score());
}
