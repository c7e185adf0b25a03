// Worker pool driving real conversions through the fake engine

use crate::common::FakeEngine;
use muxolotl::engine::{ConversionJob, ConversionRequest, GpuProfile, WorkerMessage, WorkerPool};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_worker_pool_initialization() {
    let engine = FakeEngine::software();
    let pool = WorkerPool::new(Arc::new(engine.converter(GpuProfile::default())), 3);
    assert_eq!(pool.active_count(), 0, "Pool should start with 0 active workers");
    assert_eq!(pool.max_workers(), 3);
    assert!(pool.can_spawn());
}

#[test]
fn test_worker_pool_respects_max_workers() {
    let engine = FakeEngine::software();
    engine.hang();
    engine.set_streams(&[("audio", "pcm_s16le")]);
    let pool = WorkerPool::new(Arc::new(engine.converter(GpuProfile::default())), 1);

    let request = ConversionRequest::new(engine.input("a.wav"), engine.path(), "flac");
    let cancel = request.cancel.clone();
    pool.spawn_job(0, ConversionJob::new(request));
    assert_eq!(pool.active_count(), 1);
    assert!(!pool.can_spawn(), "Pool should be full with 1 active and max 1");

    pool.set_max_workers(2);
    assert!(pool.can_spawn());

    cancel.cancel();
    loop {
        match pool.receiver().recv_timeout(Duration::from_secs(20)).unwrap() {
            WorkerMessage::WorkerIdle { worker_id } => {
                assert_eq!(worker_id, 0);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_batch_reports_every_job() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("audio", "pcm_s16le")]);
    let pool = WorkerPool::new(Arc::new(engine.converter(GpuProfile::default())), 2);

    let good: Vec<ConversionJob> = ["one.wav", "two.wav", "three.wav"]
        .iter()
        .map(|name| {
            ConversionJob::new(ConversionRequest::new(engine.input(name), engine.path(), "flac"))
        })
        .collect();
    let missing = ConversionJob::new(ConversionRequest::new(
        engine.path().join("ghost.wav"),
        engine.path(),
        "flac",
    ));
    let good_ids: HashSet<_> = good.iter().map(|j| j.id).collect();
    let missing_id = missing.id;

    let mut queue: Vec<ConversionJob> = good;
    queue.push(missing);
    let total = queue.len();

    let mut completed = HashSet::new();
    let mut failed = HashSet::new();
    let mut worker_id = 0;
    while completed.len() + failed.len() < total {
        while pool.can_spawn() {
            let Some(job) = queue.pop() else { break };
            pool.spawn_job(worker_id, job);
            worker_id += 1;
        }
        match pool.receiver().recv_timeout(Duration::from_secs(20)).unwrap() {
            WorkerMessage::JobCompleted { job_id, output } => {
                assert!(output.exists());
                completed.insert(job_id);
            }
            WorkerMessage::JobFailed { job_id, error } => {
                assert!(error.contains("input file not found"), "{}", error);
                failed.insert(job_id);
            }
            _ => {}
        }
        assert!(pool.active_count() <= 2);
    }

    assert_eq!(completed, good_ids);
    assert_eq!(failed, HashSet::from([missing_id]));
}

#[test]
fn test_jobs_sharing_an_output_path_are_not_both_run() {
    let engine = FakeEngine::software();
    engine.set_streams(&[("audio", "pcm_s16le")]);
    let pool = WorkerPool::new(Arc::new(engine.converter(GpuProfile::default())), 2);

    // take.wav and take.aiff both land on take.flac
    let first = ConversionJob::new(ConversionRequest::new(
        engine.input("take.wav"),
        engine.path(),
        "flac",
    ));
    let second = ConversionJob::new(ConversionRequest::new(
        engine.input("take.aiff"),
        engine.path(),
        "flac",
    ));
    let (first_id, second_id) = (first.id, second.id);
    pool.spawn_job(0, first);
    pool.spawn_job(1, second);

    let mut completed = Vec::new();
    let mut failed = Vec::new();
    while completed.len() + failed.len() < 2 {
        match pool.receiver().recv_timeout(Duration::from_secs(20)).unwrap() {
            WorkerMessage::JobCompleted { job_id, .. } => completed.push(job_id),
            WorkerMessage::JobFailed { job_id, error } => {
                assert!(error.contains("already written by another job"), "{}", error);
                failed.push(job_id);
            }
            _ => {}
        }
    }
    assert_eq!(completed, vec![first_id]);
    assert_eq!(failed, vec![second_id]);
    assert_eq!(engine.count_calls("take.flac"), 1);
}
