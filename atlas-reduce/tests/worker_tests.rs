//! Compute worker tests: request in, output messages out.

use atlas_core::{Algorithm, Record, ReductionFrame, ReductionParams, SparseVector, VectorPayload};
use atlas_reduce::{ComputeWorker, InputMessage, OutputMessage, WorkerConfig};
use std::time::Duration;
use tokio_stream::StreamExt;

fn dense(rows: &[Vec<f64>]) -> Vec<Record> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| Record::new(i as u64, VectorPayload::Dense(row.clone())))
        .collect()
}

fn grid(n: usize) -> Vec<Record> {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| vec![(i % 7) as f64, (i / 7) as f64, ((i * 13) % 5) as f64])
        .collect();
    dense(&rows)
}

fn request(algorithm: Algorithm, points: Vec<Record>) -> InputMessage {
    InputMessage::new(ReductionParams::with_algorithm(algorithm), points)
}

fn eager_worker() -> ComputeWorker {
    ComputeWorker::new(WorkerConfig {
        message_interval: Duration::ZERO,
        ..WorkerConfig::default()
    })
}

fn error_text(message: &OutputMessage) -> Option<&str> {
    match message {
        OutputMessage::Error { error, .. } => Some(error.as_str()),
        OutputMessage::Frame { .. } => None,
    }
}

#[tokio::test]
async fn test_pca_emits_one_final_frame() {
    let worker = ComputeWorker::default();
    let points = dense(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]);
    let messages: Vec<_> = worker.submit(request(Algorithm::Pca, points)).collect().await;

    assert_eq!(messages.len(), 1);
    match &messages[0] {
        OutputMessage::Frame {
            result, is_final, ..
        } => {
            assert!(*is_final);
            assert_eq!(result.len(), 3);
        }
        other => panic!("expected frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_request_is_no_data() {
    let worker = ComputeWorker::default();
    let messages: Vec<_> = worker.submit(InputMessage::default()).collect().await;

    assert_eq!(messages, vec![OutputMessage::error("no data found")]);
}

#[tokio::test]
async fn test_single_point_is_insufficient() {
    let worker = ComputeWorker::default();
    let messages: Vec<_> = worker
        .submit(request(Algorithm::Tsne, grid(1)))
        .collect()
        .await;

    assert_eq!(messages.len(), 1);
    assert!(error_text(&messages[0]).is_some());
    assert!(messages[0].is_terminal());
}

#[tokio::test]
async fn test_sparse_vectors_rejected() {
    let worker = ComputeWorker::default();
    let points = (0..3u64)
        .map(|i| {
            Record::new(
                i,
                VectorPayload::Sparse(SparseVector {
                    indices: vec![1],
                    values: vec![0.5],
                }),
            )
        })
        .collect();
    let messages: Vec<_> = worker
        .submit(request(Algorithm::Umap, points))
        .collect()
        .await;

    assert_eq!(
        messages,
        vec![OutputMessage::error(
            "visualization of \"sparse\" vectors is not supported"
        )]
    );
}

#[tokio::test]
async fn test_iterative_stream_ends_with_final_frame() {
    let worker = eager_worker();
    for algorithm in [Algorithm::Umap, Algorithm::Tsne] {
        let mut message = request(algorithm, grid(21));
        message.params.iterations = Some(30);
        message.params.seed = Some(3);

        let messages: Vec<_> = worker.submit(message).collect().await;

        assert!(messages.len() > 1, "{} emitted no progress", algorithm);
        assert!(messages.len() <= 30);
        assert_eq!(messages.iter().filter(|m| m.is_terminal()).count(), 1);
        assert!(messages.last().map_or(false, OutputMessage::is_terminal));
    }
}

#[tokio::test]
async fn test_new_submission_cancels_previous() {
    let worker = ComputeWorker::default();
    let mut first = worker.submit(request(Algorithm::Umap, grid(300)));
    let second = worker.submit(request(Algorithm::Pca, grid(10)));

    assert!(first.is_cancelled());
    assert!(first.next().await.is_none());

    let messages: Vec<_> = second.collect().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_terminal());
}

#[tokio::test]
async fn test_dropping_submission_frees_worker() {
    let worker = ComputeWorker::default();
    let submission = worker.submit(request(Algorithm::Tsne, grid(200)));
    assert!(worker.is_busy());
    drop(submission);
    assert!(!worker.is_busy());
}

#[tokio::test]
async fn test_drive_dispatches_callbacks() {
    let worker = eager_worker();
    let mut message = request(Algorithm::Tsne, grid(14));
    message.params.iterations = Some(12);

    let mut frames: Vec<ReductionFrame> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    worker
        .submit(message)
        .drive(|frame| frames.push(frame), |error| errors.push(error))
        .await
        .unwrap();

    assert!(errors.is_empty());
    assert!(!frames.is_empty() && frames.len() <= 12);
    assert!(frames.iter().all(|f| f.len() == 14));
    let (last, partial) = frames.split_last().unwrap();
    assert!(last.is_final);
    assert!(partial.iter().all(|f| !f.is_final));
}

#[tokio::test]
async fn test_drive_reports_rejection() {
    let worker = ComputeWorker::default();
    let mut message = request(Algorithm::Pca, grid(5));
    message.params.algorithm = Some("LDA".to_string());

    let mut frames = 0;
    let mut errors: Vec<String> = Vec::new();
    worker
        .submit(message)
        .drive(|_| frames += 1, |error| errors.push(error))
        .await
        .unwrap();

    assert_eq!(frames, 0);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("LDA"));
}

#[tokio::test]
async fn test_decoded_line_runs_end_to_end() {
    let line = r#"{"params": {"algorithm": "pca"}, "result": {"points": [
        {"id": 1, "vector": {"text": [0, 1]}},
        {"id": 2, "vector": {"text": [1, 0]}},
        {"id": 3, "vector": {"text": [1, 1]}}
    ]}}"#;
    let mut message = InputMessage::decode(line).unwrap();
    let worker = ComputeWorker::default();

    let rejected: Vec<_> = worker.submit(message.clone()).collect().await;
    assert_eq!(rejected.len(), 1);
    assert!(error_text(&rejected[0]).map_or(false, |e| e.contains("using")));

    message.params.using = Some("text".to_string());
    let accepted: Vec<_> = worker.submit(message).collect().await;
    assert_eq!(accepted.len(), 1);
    assert!(error_text(&accepted[0]).is_none());
}

async fn wait_until_finished(submission: &atlas_reduce::Submission) -> bool {
    for _ in 0..100 {
        if submission.is_finished() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    submission.is_finished()
}

fn backpressure_worker() -> ComputeWorker {
    ComputeWorker::new(WorkerConfig {
        message_interval: Duration::ZERO,
        channel_capacity: 1,
    })
}

fn long_tsne() -> InputMessage {
    let mut message = request(Algorithm::Tsne, grid(40));
    message.params.iterations = Some(200);
    message.params.seed = Some(9);
    message
}

#[tokio::test]
async fn test_cancelled_unpolled_submission_releases_thread() {
    let worker = backpressure_worker();
    let first = worker.submit(long_tsne());

    // Nobody polls, so the worker thread fills the channel and blocks
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!first.is_finished());

    first.cancel();
    assert!(wait_until_finished(&first).await);
}

#[tokio::test]
async fn test_replaced_submission_releases_thread() {
    let worker = backpressure_worker();
    let first = worker.submit(long_tsne());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second = worker.submit(request(Algorithm::Pca, grid(10)));
    assert!(first.is_cancelled());
    assert!(wait_until_finished(&first).await);

    let messages: Vec<_> = second.collect().await;
    assert_eq!(messages.len(), 1);
}
