use fileup::config::INCREMENT;
use fileup::services::dispatcher::{PostUploadDispatcher, TransformOutcome};
use fileup::services::transform::{JsonTransformer, TransformError, Transformer};
use fileup::utils::ids::IdGenerator;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct SequentialIds(AtomicUsize);

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        format!("out-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

struct Dirs {
    _dir: TempDir,
    uploads: PathBuf,
    processed: PathBuf,
}

fn dirs() -> Dirs {
    let dir = TempDir::new().unwrap();
    let uploads = dir.path().join("server");
    let processed = dir.path().join("json");
    std::fs::create_dir_all(&uploads).unwrap();
    std::fs::create_dir_all(&processed).unwrap();
    Dirs {
        _dir: dir,
        uploads,
        processed,
    }
}

fn transformer(d: &Dirs) -> JsonTransformer {
    JsonTransformer::new(
        &d.uploads,
        &d.processed,
        Arc::new(SequentialIds(AtomicUsize::new(0))),
    )
}

fn run(d: &Dirs, source: &str) -> Result<Value, TransformError> {
    std::fs::write(d.uploads.join("src.json"), source).unwrap();
    let id = transformer(d).transform("src.json")?;
    let content = std::fs::read(d.processed.join(id)).unwrap();
    Ok(serde_json::from_slice(&content).unwrap())
}

#[test]
fn test_vowel_led_name_dropped_and_even_score_bumped() {
    let d = dirs();
    let out = run(&d, r#"[{"playerName":"Eve","playerScore":4,"lifeCount":3}]"#).unwrap();
    assert_eq!(out, json!([{"playerScore": 4 + INCREMENT, "lifeCount": 3}]));
}

#[test]
fn test_output_gets_fresh_identifier() {
    let d = dirs();
    std::fs::write(d.uploads.join("upload-1.json"), "[]").unwrap();

    let id = transformer(&d).transform("upload-1.json").unwrap();

    assert_eq!(id, "out-0.json");
    assert_eq!(std::fs::read_to_string(d.processed.join(&id)).unwrap(), "[]");
    // the source is left untouched
    assert_eq!(
        std::fs::read_to_string(d.uploads.join("upload-1.json")).unwrap(),
        "[]"
    );
}

#[test]
fn test_order_and_length_preserved() {
    let d = dirs();
    let source = json!([
        {"playerName": "Zed", "playerScore": 1},
        {"playerName": "Amy", "playerScore": 2},
        {"playerName": "Kim", "lifeCount": 0},
        {"avatarName": "orc", "game": "Tetris"},
        {},
    ]);

    let out = run(&d, &source.to_string()).unwrap();

    assert_eq!(
        out,
        json!([
            {"playerName": "Zed", "playerScore": 1},
            {"playerScore": 1002},
            {"playerName": "Kim", "lifeCount": 1000},
            {"game": "Tetris"},
            {},
        ])
    );
}

#[test]
fn test_empty_strings_survive() {
    let d = dirs();
    let out = run(&d, r#"[{"playerName":"","avatarName":"","game":""}]"#).unwrap();
    assert_eq!(out, json!([{"playerName": "", "avatarName": "", "game": ""}]));
}

#[test]
fn test_case_insensitive_vowels() {
    let d = dirs();
    let out = run(
        &d,
        r#"[{"playerName":"ANNA","avatarName":"Ursa","game":"iRacing"},{"playerName":"bob"}]"#,
    )
    .unwrap();
    assert_eq!(out, json!([{}, {"playerName": "bob"}]));
}

#[test]
fn test_negative_and_odd_numbers() {
    let d = dirs();
    let out = run(&d, r#"[{"playerScore":-2,"lifeCount":-7},{"playerScore":9,"lifeCount":0}]"#)
        .unwrap();
    assert_eq!(
        out,
        json!([
            {"playerScore": -2 + INCREMENT, "lifeCount": -7},
            {"playerScore": 9, "lifeCount": INCREMENT}
        ])
    );
}

#[test]
fn test_unknown_fields_are_dropped() {
    let d = dirs();
    let out = run(&d, r#"[{"playerName":"Bob","rank":"gold","lifeCount":5}]"#).unwrap();
    assert_eq!(out, json!([{"playerName": "Bob", "lifeCount": 5}]));
}

#[test]
fn test_missing_source_fails() {
    let d = dirs();
    let err = transformer(&d).transform("nope.json").unwrap_err();
    assert!(matches!(err, TransformError::OpenSource { .. }));
    assert_eq!(std::fs::read_dir(&d.processed).unwrap().count(), 0);
}

#[test]
fn test_missing_output_dir_fails() {
    let d = dirs();
    std::fs::write(d.uploads.join("src.json"), "[]").unwrap();
    let t = JsonTransformer::new(
        &d.uploads,
        d.processed.join("missing"),
        Arc::new(SequentialIds(AtomicUsize::new(0))),
    );

    let err = t.transform("src.json").unwrap_err();
    assert!(matches!(err, TransformError::CreateOutput { .. }));
}

#[test]
fn test_bad_element_aborts_and_leaves_partial_output() {
    let d = dirs();
    let err = run(&d, r#"[{"playerName":"Bob"},{"playerScore":"high"}]"#).unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));

    // the output file was created before decoding and is not rolled back
    let output = d.processed.join("out-0.json");
    assert!(output.exists());
    assert_eq!(std::fs::metadata(output).unwrap().len(), 0);
}

#[test]
fn test_non_array_document_fails() {
    let d = dirs();
    let err = run(&d, r#"{"playerName":"Bob"}"#).unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));

    let err = run(&d, "[1, 2]").unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));

    let err = run(&d, r#"[{"playerName":"Bob"}"#).unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));
}

#[test]
fn test_large_array_streams() {
    let d = dirs();
    let entries: Vec<Value> = (0..10_000)
        .map(|i| json!({"playerName": "Sam", "playerScore": i}))
        .collect();

    let out = run(&d, &Value::Array(entries).to_string()).unwrap();
    let out = out.as_array().unwrap();

    assert_eq!(out.len(), 10_000);
    assert_eq!(out[0]["playerScore"], json!(INCREMENT));
    assert_eq!(out[1]["playerScore"], json!(1));
    assert_eq!(out[9_998]["playerScore"], json!(9_998 + INCREMENT));
}

struct SlowTransformer {
    delay: Duration,
    finished: Arc<AtomicBool>,
}

impl Transformer for SlowTransformer {
    fn transform(&self, source_identifier: &str) -> Result<String, TransformError> {
        std::thread::sleep(self.delay);
        self.finished.store(true, Ordering::SeqCst);
        Ok(format!("done-{}", source_identifier))
    }
}

#[tokio::test]
async fn test_dispatch_ignores_non_json() {
    let finished = Arc::new(AtomicBool::new(false));
    let dispatcher = PostUploadDispatcher::new(Arc::new(SlowTransformer {
        delay: Duration::ZERO,
        finished: finished.clone(),
    }));

    assert!(dispatcher.dispatch("upload.txt").is_none());
    assert!(dispatcher.dispatch("upload").is_none());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispatch_reports_completion() {
    let finished = Arc::new(AtomicBool::new(false));
    let dispatcher = PostUploadDispatcher::new(Arc::new(SlowTransformer {
        delay: Duration::from_millis(10),
        finished: finished.clone(),
    }));

    let handle = dispatcher.dispatch("a.json").unwrap();
    assert_eq!(
        handle.await.unwrap(),
        TransformOutcome::Completed("done-a.json".to_string())
    );
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dispatch_reports_failure() {
    let d = dirs();
    let dispatcher = PostUploadDispatcher::new(Arc::new(transformer(&d)));

    let handle = dispatcher.dispatch("missing.json").unwrap();
    assert!(matches!(handle.await.unwrap(), TransformOutcome::Failed(_)));
}

#[tokio::test]
async fn test_dispatch_returns_immediately() {
    let finished = Arc::new(AtomicBool::new(false));
    let dispatcher = PostUploadDispatcher::new(Arc::new(SlowTransformer {
        delay: Duration::from_millis(200),
        finished: finished.clone(),
    }));

    let start = std::time::Instant::now();
    let handle = dispatcher.dispatch("a.json").unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(!finished.load(Ordering::SeqCst));

    handle.await.unwrap();
}

// A timed-out transform is only reported, never cancelled.
#[tokio::test]
async fn test_timeout_does_not_cancel_transform() {
    let finished = Arc::new(AtomicBool::new(false));
    let dispatcher = PostUploadDispatcher::with_timeout(
        Arc::new(SlowTransformer {
            delay: Duration::from_millis(300),
            finished: finished.clone(),
        }),
        Duration::from_millis(50),
    );

    let handle = dispatcher.dispatch("slow.json").unwrap();
    assert_eq!(handle.await.unwrap(), TransformOutcome::TimedOut);
    assert!(!finished.load(Ordering::SeqCst));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !finished.load(Ordering::SeqCst) {
        assert!(std::time::Instant::now() < deadline, "transform was cancelled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
