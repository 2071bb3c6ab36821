//! Integration tests for pipeline configuration
//!
//! These tests validate:
//! - Saving and loading a pipeline config through the filesystem
//! - Building a running pipeline from a loaded config

mod common;

use common::tasks::{Recorder, SequenceSource};
use common::{init_tracing, shutdown_within, test_timeout, wait_until};
use stagepipe::{ErrorKind, Pipeline, PipelineConfig, StageConfig, WaitStrategy};
use tempfile::TempDir;

fn sample_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config
        .stages
        .insert("source".to_string(), StageConfig::new(8, 2));
    config.stages.insert(
        "sink".to_string(),
        StageConfig::new(8, 4).with_wait(WaitStrategy::Sleep { micros: 10 }),
    );
    config
}

#[test]
fn test_save_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pipeline.toml");

    let config = sample_config();
    config.save(&path).unwrap();
    let loaded = PipelineConfig::load(&path).unwrap();

    assert_eq!(loaded, config);
    let names: Vec<_> = loaded.stages.keys().map(String::as_str).collect();
    assert_eq!(names, ["source", "sink"]);
}

#[test]
fn test_load_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = PipelineConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("Failed to read pipeline config"));
}

#[test]
fn test_load_rejects_invalid_stage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, "[stages.sink]\nn_threads = 0\n").unwrap();

    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("Stage 'sink'"));
}

#[test]
fn test_pipeline_from_loaded_config() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    sample_config().save(&path).unwrap();
    let config = PipelineConfig::load(&path).unwrap();

    const COUNT: i64 = 100;
    let recorder = Recorder::<i64>::new("sink");
    let mut pipeline = Pipeline::new();
    let source = pipeline
        .add_configured(&SequenceSource::new(COUNT), &config)
        .unwrap();
    let sink = pipeline.add_configured(&recorder, &config).unwrap();
    assert_eq!(pipeline.stage(sink).unwrap().n_threads(), 4);
    pipeline.bind(sink, "in", source, "out").unwrap();

    pipeline.run().unwrap();
    let expected = SequenceSource::expected(COUNT, 2);
    assert!(wait_until(test_timeout(), || recorder.len() >= expected.len()));
    shutdown_within(pipeline, test_timeout());

    let mut values = recorder.values();
    values.sort_unstable();
    assert_eq!(values, expected);
}
