use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use marceval_core::{
    EvalPair, FieldComparator, MatchKind, PoolConfig, ProgressEvent, RunMetadata, SelectorSet,
    aggregate, evaluate_pairs,
};
use tokio_util::sync::CancellationToken;

fn make_pair(i: usize) -> EvalPair {
    let reference = format!(
        "=LDR  00000nam  2200000   4500\n=100  1\\$aAuthor {i}\n=245  10$aTitle number {i} /"
    );
    // Every third candidate is garbage, every other one drops the author.
    let candidate = match i % 3 {
        0 => "I'm sorry, I cannot produce a record for this image.".to_string(),
        1 => format!("=245  10$aTitle number {i}"),
        _ => format!("=100  1\\$aAuthor {i}\n=245  10$aTitle number {i}"),
    };
    EvalPair {
        id: format!("rec-{i:03}"),
        reference: reference.into_bytes(),
        candidate: Some(candidate.into_bytes()),
        ..Default::default()
    }
}

fn comparator() -> Arc<FieldComparator> {
    Arc::new(FieldComparator::new(SelectorSet::five_field()))
}

async fn run(pairs: Vec<EvalPair>, workers: usize) -> Vec<marceval_core::EvaluationOutcome> {
    evaluate_pairs(
        pairs,
        comparator(),
        PoolConfig {
            num_workers: workers,
            skip_withdrawn: true,
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn outcomes_follow_submission_order() {
    let pairs: Vec<_> = (0..40).map(make_pair).collect();
    let outcomes = run(pairs, 8).await;
    assert_eq!(outcomes.len(), 40);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.id, format!("rec-{i:03}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_count_does_not_change_results() {
    let single = run((0..30).map(make_pair).collect(), 1).await;
    let many = run((0..30).map(make_pair).collect(), 6).await;
    assert_eq!(single, many);

    let meta = RunMetadata::now(30);
    let a = aggregate(&single, meta.clone());
    let b = aggregate(&many, meta);
    assert_eq!(a, b);
}

#[tokio::test]
async fn parse_failures_do_not_stop_the_batch() {
    let outcomes = run((0..9).map(make_pair).collect(), 3).await;
    let failures: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(failures.len(), 3);
    assert!(
        failures[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("failed to parse candidate record")
    );

    let agg = aggregate(&outcomes, RunMetadata::now(9));
    assert_eq!(agg.total_records, 9);
    assert_eq!(agg.success_count, 6);
    assert_eq!(agg.failure_count, 3);

    let author = agg.selector("author").unwrap();
    assert_eq!(author.count, 6);
    assert_eq!(author.histogram[&MatchKind::Missing], 3);
    assert_eq!(author.histogram[&MatchKind::Exact], 3);
}

#[tokio::test]
async fn progress_reports_every_pair() {
    let evaluating = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (e, f) = (evaluating.clone(), finished.clone());

    let outcomes = evaluate_pairs(
        (0..12).map(make_pair).collect(),
        comparator(),
        PoolConfig::default(),
        move |event| match event {
            ProgressEvent::Evaluating { .. } => {
                e.fetch_add(1, Ordering::SeqCst);
            }
            ProgressEvent::Evaluated { .. }
            | ProgressEvent::Failed { .. }
            | ProgressEvent::Skipped { .. } => {
                f.fetch_add(1, Ordering::SeqCst);
            }
        },
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcomes.len(), 12);
    assert_eq!(evaluating.load(Ordering::SeqCst), 12);
    assert_eq!(finished.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn cancelled_before_start_returns_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcomes = evaluate_pairs(
        (0..5).map(make_pair).collect(),
        comparator(),
        PoolConfig::default(),
        |_| {},
        cancel,
    )
    .await;
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn empty_batch() {
    assert!(run(vec![], 4).await.is_empty());
}
