//! Integration tests for the full scoring pipeline
//!
//! These tests verify end-to-end behavior from files on disk:
//! - Reference CSV and prediction JSON loading, joined by id
//! - Fence stripping and name aliasing on the way into the sandbox
//! - Outcome classification across a mixed batch
//! - The machine-readable scores record

use std::path::PathBuf;

use passbench_eval::datasets::{load_predictions, load_reference, merge};
use passbench_eval::{EvalConfig, Evaluator};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_full_pipeline_list_form() {
    let dir = tempfile::tempdir().unwrap();
    let reference_path = write_file(
        &dir,
        "reference.csv",
        concat!(
            "id,test_list\n",
            "1,\"['assert add(1, 2) == 3', 'assert add(-1, 1) == 0']\"\n",
            "2,\"['assert mul(2, 3) == 6']\"\n",
            "3,\"['assert sub(5, 2) == 3']\"\n",
            "4,not a literal\n",
        ),
    );
    let predictions_path = write_file(
        &dir,
        "predictions.json",
        r#"[
            {"id": 1, "response": "```python\ndef Add(a, b):\n    return a + b\n```"},
            {"id": 2, "output": "def mul(a, b):\n    return a * b + 1"},
            {"id": 4, "code": "def anything():\n    pass"}
        ]"#,
    );

    let reference = load_reference(&reference_path).unwrap();
    let predictions = load_predictions(&predictions_path).unwrap();
    let entries = merge(&reference, &predictions);

    assert_eq!(
        entries.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    let report = Evaluator::new(EvalConfig::default()).evaluate(&entries).await;

    // 1: misnamed but aliased and correct; 2: wrong arithmetic;
    // 3: never predicted; 4: undecodable test_list.
    assert_eq!(report.total, 4);
    assert_eq!(report.counts.pass, 1);
    assert_eq!(report.counts.fail_assert, 1);
    assert_eq!(report.counts.missing_code, 1);
    assert_eq!(report.counts.parse_fail, 1);
    assert_eq!(report.accuracy, 0.25);

    let scores_path = dir.path().join("scores.json");
    report.save_scores(&scores_path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&scores_path).unwrap()).unwrap();
    assert_eq!(value, serde_json::json!({ "accuracy": 0.25 }));
}

#[tokio::test]
async fn test_full_pipeline_mapping_form() {
    let dir = tempfile::tempdir().unwrap();
    let reference_path = write_file(
        &dir,
        "reference.csv",
        "id,test_list\n10,\"['assert f() == 1']\"\n11,\"['assert g() == 2']\"\n",
    );
    let predictions_path = write_file(
        &dir,
        "predictions.json",
        r#"{"10": "def f():\n    return 1"}"#,
    );

    let reference = load_reference(&reference_path).unwrap();
    let predictions = load_predictions(&predictions_path).unwrap();
    let entries = merge(&reference, &predictions);

    let report = Evaluator::new(EvalConfig::default()).evaluate(&entries).await;
    assert_eq!(report.counts.pass, 1);
    assert_eq!(report.counts.missing_code, 1);
    assert_eq!(report.accuracy, 0.5);
}

#[tokio::test]
async fn test_empty_reference_set_scores_zero() {
    let dir = tempfile::tempdir().unwrap();
    let reference_path = write_file(&dir, "reference.csv", "id,test_list\n");
    let predictions_path = write_file(&dir, "predictions.json", "{}");

    let reference = load_reference(&reference_path).unwrap();
    let predictions = load_predictions(&predictions_path).unwrap();
    assert!(reference.is_empty());
    assert!(predictions.is_empty());

    let entries = merge(&reference, &predictions);
    let report = Evaluator::new(EvalConfig::default()).evaluate(&entries).await;
    assert_eq!(report.total, 0);
    assert_eq!(report.accuracy, 0.0);
}
