//! Timed-segment tests: `@` deadlines close a segment's sources, stages
//! run back to back, and wall-clock stays within deadline plus grace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vidflow_core::registry::{FunctionRegistry, FunctionSpec};
use vidflow_core::testing::{counter_source, recording_sink};
use vidflow_core::{compile_source, RunStatus, Runtime, RuntimeConfig};

fn paced(millis: u64) -> RuntimeConfig {
    RuntimeConfig::default().with_source_interval(Duration::from_millis(millis))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_source_stops_at_its_deadline() {
    let mut registry = FunctionRegistry::new();
    registry.register("frames", FunctionSpec::source(counter_source()));
    let (sink, recorded) = recording_sink();
    registry.register("record", FunctionSpec::sink(sink));

    let graph = compile_source("frames @ 1s -> record", &registry).expect("compiles");
    let started = Instant::now();
    let report = Runtime::new(graph, Arc::new(registry), paced(20))
        .run()
        .await
        .expect("runs");
    let elapsed = started.elapsed();

    assert_eq!(report.status, RunStatus::Completed);
    // Ran for about a second: neither a handful of frames nor an unbounded
    // stream.
    let frames = recorded.len();
    assert!(frames >= 10, "only {} frames in one second", frames);
    assert!(frames <= 120, "{} frames did not respect the deadline", frames);
    assert!(
        elapsed >= Duration::from_millis(900),
        "finished early: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(3000),
        "deadline plus grace exceeded: {:?}",
        elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_sequence_runs_stages_back_to_back() {
    let mut registry = FunctionRegistry::new();
    registry.register("one", FunctionSpec::source(counter_source()));
    registry.register("two", FunctionSpec::source(counter_source()));
    let (sink_a, recorded_a) = recording_sink();
    registry.register("reca", FunctionSpec::sink(sink_a));
    let (sink_b, recorded_b) = recording_sink();
    registry.register("recb", FunctionSpec::sink(sink_b));

    let graph = compile_source(
        "pipeline a = one -> reca\npipeline b = two -> recb\na @ 1s -> b @ 1s",
        &registry,
    )
    .expect("compiles");
    assert_eq!(graph.stages.len(), 2);

    let started = Instant::now();
    let report = Runtime::new(graph, Arc::new(registry), paced(20))
        .run()
        .await
        .expect("runs");
    let elapsed = started.elapsed();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(!recorded_a.is_empty(), "first segment produced nothing");
    assert!(!recorded_b.is_empty(), "second segment produced nothing");
    // Two one-second segments in sequence, not in parallel.
    assert!(
        elapsed >= Duration::from_millis(1800),
        "segments overlapped: {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_millis(5000),
        "sequence overran: {:?}",
        elapsed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limited_source_ends_a_timed_segment_early() {
    // The deadline is an upper bound; a source that exhausts first ends
    // the segment by itself.
    let mut registry = FunctionRegistry::new();
    registry.register("frames", FunctionSpec::source(counter_source()));
    let (sink, recorded) = recording_sink();
    registry.register("record", FunctionSpec::sink(sink));

    let graph = compile_source(
        "frames with (limit: 5) @ 30s -> record",
        &registry,
    )
    .expect("compiles");
    let started = Instant::now();
    let report = Runtime::new(graph, Arc::new(registry), paced(1))
        .run()
        .await
        .expect("runs");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(recorded.values(), vec![0, 1, 2, 3, 4]);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "run waited out a deadline it did not need"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_cuts_a_timed_sequence_short() {
    let mut registry = FunctionRegistry::new();
    registry.register("one", FunctionSpec::source(counter_source()));
    registry.register("two", FunctionSpec::source(counter_source()));
    let (sink_a, _recorded_a) = recording_sink();
    registry.register("reca", FunctionSpec::sink(sink_a));
    let (sink_b, recorded_b) = recording_sink();
    registry.register("recb", FunctionSpec::sink(sink_b));

    let graph = compile_source(
        "pipeline a = one -> reca\npipeline b = two -> recb\na @ 10s -> b @ 10s",
        &registry,
    )
    .expect("compiles");
    let runtime = Runtime::new(graph, Arc::new(registry), paced(20));
    let cancel = runtime.cancellation();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
    });
    let started = Instant::now();
    let report = runtime.run().await.expect("runs");
    stopper.await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    // The first 10 s segment was cut short and the second never started.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(recorded_b.is_empty(), "second stage must not have started");
}
