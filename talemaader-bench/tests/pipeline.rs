//! End-to-end: dataset files, scripted model, store, reconciliation, summary

use std::sync::Arc;

use talemaader_bench::prelude::*;
use talemaader_bench::providers::{Reply, ScriptedAdapter};
use talemaader_bench::reporting::{discrepancy_rows, write_gold_joined, write_summary};

const OPTIONS: &str = "talemaade_udtryk\tA\tB\tC\tD\n\
hænge med hovedet\tvære trist\tsove dårligt\thave ondt i nakken\tkigge ned\n\
gå over gevind\tbryde en regel\tskrue for hårdt\tgøre noget for voldsomt\tvære doven\n";

const LABELS: &str = "udtryk_id\ttalemaade_udtryk\tkorrekt_def\tfalsk1\tfalsk2\tfalsk3\n\
101\thænge med hovedet\t0\t3\t1\t2\n\
102\tgå over gevind\t2\t1\t0\t3\n";

fn write_dataset(dir: &std::path::Path) -> Dataset {
    let options = dir.join("options.csv");
    let labels = dir.join("labels.csv");
    std::fs::write(&options, OPTIONS).unwrap();
    std::fs::write(&labels, LABELS).unwrap();
    load_dataset(&options, Some(labels.as_path())).unwrap()
}

fn runner(batch_size: usize) -> BatchRunner {
    BatchRunner::new(RunnerConfig {
        batch_size,
        retry_delay_ms: 1,
        max_retry_delay_ms: 5,
        ..RunnerConfig::default()
    })
}

#[tokio::test]
async fn test_two_items_half_correct() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    assert_eq!(dataset.len(), 2);

    let adapter = Arc::new(
        ScriptedAdapter::new()
            .on("hænge med hovedet", Reply::text("A"))
            .on("gå over gevind", Reply::text("D")),
    );

    let store_path = dir.path().join("multiple_choice").join("predicted_labels_scripted.csv");
    let outcome = runner(5)
        .run(
            &dataset,
            adapter,
            Mode::MultipleChoice,
            PredictionLog::load(&store_path).unwrap(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.remaining, 0);

    // score from disk, as a separate evaluation would
    let predictions = PredictionLog::load(&store_path).unwrap();
    let reconciled = reconcile(&predictions, &dataset, SingleYesPolicy::Determined);
    assert!(reconciled.unmatched.is_empty());

    let by_id = |id| reconciled.records.iter().find(|r| r.item_id == id).unwrap();
    assert_eq!(by_id(101).gold_label, Letter::A);
    assert!(by_id(101).is_correct);
    assert_eq!(by_id(102).gold_label, Letter::C);
    assert!(!by_id(102).is_correct);
    assert!(by_id(102).is_discrepancy);

    let rows = discrepancy_rows(&reconciled.records, &dataset);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].predicted_definition, "være doven");
    assert_eq!(rows[0].misinterpretation, "random definition");

    let mut results = ModelResultSet::new();
    results.insert("scripted".to_string(), reconciled.records.clone());
    let summaries = aggregate(&results);
    assert_eq!(summaries[0].accuracy, 0.5);
    assert_eq!(summaries[0].attempted_count, 2);
    assert_eq!(summaries[0].undetermined_count, 0);

    write_gold_joined(dir.path().join("joined.csv"), &reconciled.records).unwrap();
    write_summary(dir.path().join("summary.csv"), &summaries).unwrap();
    let summary = std::fs::read_to_string(dir.path().join("summary.csv")).unwrap();
    assert!(summary.contains("scripted,0.5,2,0,1,1"));
}

#[tokio::test]
async fn test_resumed_run_never_requeries_determined_items() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    let store_path = dir.path().join("predicted_labels_scripted.csv");

    // first session: one item, the other left for later
    let first = Arc::new(ScriptedAdapter::with_response("Svaret er B."));
    runner(1)
        .run(
            &dataset,
            first.clone(),
            Mode::MultipleChoice,
            PredictionLog::load(&store_path).unwrap(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(first.call_count(), 1);

    // second session from the reloaded store, batch larger than what remains
    let second = Arc::new(ScriptedAdapter::with_response("C"));
    let outcome = runner(10)
        .run(
            &dataset,
            second.clone(),
            Mode::MultipleChoice,
            PredictionLog::load(&store_path).unwrap(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();

    assert_eq!(second.call_count(), 1);
    assert!(second.prompts()[0].contains("gå over gevind"));
    assert_eq!(outcome.remaining, 0);

    // third session has nothing left to do
    let third = Arc::new(ScriptedAdapter::with_response("A"));
    let outcome = runner(10)
        .run(
            &dataset,
            third.clone(),
            Mode::MultipleChoice,
            PredictionLog::load(&store_path).unwrap(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(third.call_count(), 0);
    assert!(outcome.attempted.is_empty());

    let reloaded = PredictionLog::load(&store_path).unwrap();
    assert_eq!(reloaded.len(), 2);
}

#[tokio::test]
async fn test_undetermined_items_are_retried_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = write_dataset(dir.path());
    let store_path = dir.path().join("predicted_labels_scripted.csv");

    let flaky = Arc::new(ScriptedAdapter::with_response("Jeg tror det er A eller B"));
    let outcome = runner(5)
        .run(
            &dataset,
            flaky,
            Mode::MultipleChoice,
            PredictionLog::default(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(outcome.undetermined, 2);
    assert_eq!(outcome.remaining, 2);

    let settled = Arc::new(ScriptedAdapter::with_response("A"));
    runner(5)
        .run(
            &dataset,
            settled.clone(),
            Mode::MultipleChoice,
            PredictionLog::load(&store_path).unwrap(),
            Some(PredictionStore::open(&store_path).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(settled.call_count(), 2);

    // four rows on disk, the newer ones win
    let predictions = PredictionLog::load(&store_path).unwrap();
    assert_eq!(predictions.len(), 4);
    let reconciled = reconcile(&predictions, &dataset, SingleYesPolicy::Determined);
    let summary = ModelSummary::from_records("scripted", &reconciled.records);
    assert_eq!(summary.undetermined_count, 0);
    assert_eq!(summary.correct_count, 1);
}
