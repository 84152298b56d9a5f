//! Input capture: ring buffers, input meters, and record files

use crate::helpers::tolerances::*;
use crate::helpers::*;
use divisi::prelude::*;

/// Input `cycle` of a staircase running across cycles.
fn staircase_input(cycle: usize) -> Vec<Vec<f32>> {
    let start = cycle * TEST_BUFFER_SIZE;
    vec![(start..start + TEST_BUFFER_SIZE).map(|i| i as f32).collect()]
}

fn recording_engine() -> Engine {
    let engine = test_builder()
        .inputs(1)
        .input_buffer_len(512)
        .build()
        .unwrap();
    engine.start().unwrap();
    engine
}

#[test]
fn test_input_buffer_is_time_ordered() {
    let engine = recording_engine();
    render_with_inputs(&engine, 3, staircase_input);

    let expected: Vec<f32> = (256..768).map(|i| i as f32).collect();
    assert_eq!(engine.input_buffer(0).unwrap(), expected);
}

#[test]
fn test_input_meters() {
    let engine = recording_engine();
    render_with_inputs(&engine, 1, |_| vec![vec![0.5; TEST_BUFFER_SIZE]]);
    assert_eq!(engine.input_level(0).unwrap(), 0.5);
    assert_eq!(engine.input_clip_count(0).unwrap(), 0);

    render_with_inputs(&engine, 1, |_| vec![vec![-1.0; TEST_BUFFER_SIZE]]);
    assert_eq!(engine.input_level(0).unwrap(), 1.0);
    assert!(engine.input_level_db(0).unwrap().abs() < PERCEPTUAL_EPSILON);
    assert_eq!(engine.input_clip_count(0).unwrap(), TEST_BUFFER_SIZE as u64);

    engine.reset_input_clip_count(0).unwrap();
    assert_eq!(engine.input_clip_count(0).unwrap(), 0);
}

#[test]
fn test_recording_requires_running_engine() {
    let engine = test_builder().inputs(1).build().unwrap();
    assert!(matches!(engine.start_recording(), Err(Error::NotRunning)));
    assert!(!engine.is_recording());
}

#[test]
fn test_record_take_to_wave_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let engine = recording_engine();
    assert_eq!(engine.record_path(0).unwrap().to_str(), Some("input_1.wav"));

    engine.set_record_file(0, &path).unwrap();
    engine.set_record_enabled(0, true).unwrap();
    assert!(engine.is_record_enabled(0).unwrap());

    // input before the take starts stays out of the file
    render_with_inputs(&engine, 1, |_| vec![vec![0.9; TEST_BUFFER_SIZE]]);

    engine.start_recording().unwrap();
    assert!(engine.is_recording());
    assert!(engine.set_record_file(0, dir.path().join("other.wav")).is_err());

    render_with_inputs(&engine, 4, staircase_input);
    assert_eq!(engine.record_written(0).unwrap(), 1024);
    assert_eq!(engine.record_dropped(0).unwrap(), 0);
    assert_eq!(engine.stop_recording().unwrap(), vec![1024]);
    assert!(!engine.is_recording());

    let (spec, samples) = read_wav(&path);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, TEST_SAMPLE_RATE as u32);
    let expected: Vec<f32> = (0..1024).map(|i| i as f32).collect();
    assert_eq!(samples, expected);
}

#[test]
fn test_record_downsample_and_length_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.wav");
    let engine = recording_engine();
    engine.set_record_file(0, &path).unwrap();
    engine.set_record_downsample(0, 2).unwrap();
    engine.set_record_max_length(0, Some(300)).unwrap();
    engine.set_record_enabled(0, true).unwrap();
    engine.start_recording().unwrap();

    render_with_inputs(&engine, 4, staircase_input);
    assert_eq!(engine.record_written(0).unwrap(), 300);
    // the limit finalizes the take and re-arms the channel for the next one
    assert!(engine.is_record_enabled(0).unwrap());

    engine.stop_recording().unwrap();
    let (spec, samples) = read_wav(&path);
    assert_eq!(spec.sample_rate, TEST_SAMPLE_RATE as u32 / 2);
    let expected: Vec<f32> = (0..300).map(|i| (2 * i) as f32).collect();
    assert_eq!(samples, expected);
}

#[test]
fn test_record_pause_skips_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paused.wav");
    let engine = recording_engine();
    engine.set_record_file(0, &path).unwrap();
    engine.set_record_enabled(0, true).unwrap();
    engine.start_recording().unwrap();

    render_with_inputs(&engine, 1, staircase_input);
    engine.set_record_paused(0, true).unwrap();
    render_with_inputs(&engine, 1, |_| staircase_input(1));
    engine.set_record_paused(0, false).unwrap();
    render_with_inputs(&engine, 1, |_| staircase_input(2));

    assert_eq!(engine.stop_recording().unwrap(), vec![512]);
    let (_, samples) = read_wav(&path);
    let expected: Vec<f32> = (0..256).chain(512..768).map(|i| i as f32).collect();
    assert_eq!(samples, expected);
}

#[test]
fn test_engine_stop_finalizes_take() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stopped.wav");
    let engine = recording_engine();
    engine.set_record_file(0, &path).unwrap();
    engine.set_record_enabled(0, true).unwrap();
    engine.start_recording().unwrap();
    render_with_inputs(&engine, 2, |_| vec![vec![0.25; TEST_BUFFER_SIZE]]);

    engine.stop().unwrap();
    assert!(!engine.is_recording());

    let (_, samples) = read_wav(&path);
    assert_eq!(samples.len(), 512);
    assert_signals_eq(&samples, &[0.25; 512], FLOAT_EPSILON);
}

#[test]
fn test_disabled_channel_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.wav");
    let engine = recording_engine();
    engine.set_record_file(0, &path).unwrap();
    engine.start_recording().unwrap();

    render_with_inputs(&engine, 2, staircase_input);
    assert_eq!(engine.stop_recording().unwrap(), vec![0]);
    assert!(!path.exists());
    assert!(engine.set_record_downsample(0, 0).is_err());
}
