//! Engine lifecycle integration tests
//!
//! Creation, validation, start/stop, seeking, and the fatal state.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use divisi::prelude::*;
use divisi::AudioCallback;

#[test]
fn test_engine_reports_configuration() {
    let engine = test_builder().outputs(4).inputs(2).build().unwrap();

    assert_eq!(engine.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(engine.buffer_size(), TEST_BUFFER_SIZE);
    assert_eq!(engine.output_channels(), 4);
    assert_eq!(engine.input_channels(), 2);
    assert_eq!(engine.track_count(), 4);
    assert!(!engine.is_running());
    assert_eq!(engine.position(), 0);
}

#[test]
fn test_invalid_configuration_rejected() {
    assert!(test_builder().outputs(0).build().is_err());
    assert!(test_builder().sample_rate(1000.0).build().is_err());
    assert!(test_builder().fault_threshold(0).build().is_err());
    assert!(test_builder()
        .inputs(1)
        .input_buffer_len(TEST_BUFFER_SIZE / 2)
        .build()
        .is_err());
}

#[test]
fn test_stopped_engine_renders_silence() {
    let engine = test_builder().build().unwrap();
    engine
        .load_audio(0, vec![0.5; 1024], SegmentParams::default())
        .unwrap();

    let out = render(&engine, 2);
    assert_silence(&out[0], FLOAT_EPSILON);
    assert_eq!(engine.position(), 0);

    engine.start().unwrap();
    assert!(engine.is_running());
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 0.5));
    assert_eq!(engine.position(), TEST_BUFFER_SIZE as u64);

    engine.stop().unwrap();
    let out = render(&engine, 1);
    assert_silence(&out[0], FLOAT_EPSILON);
}

#[test]
fn test_callback_renders_like_engine() {
    let engine = test_engine();
    engine
        .load_audio(1, generate_staircase(512), SegmentParams::default())
        .unwrap();

    let mut callback = engine.callback();
    let mut outputs = output_buffers(2, TEST_BUFFER_SIZE);
    callback.process(&[], &mut outputs);
    assert_eq!(outputs[1], generate_staircase(TEST_BUFFER_SIZE));
    assert_eq!(engine.position(), TEST_BUFFER_SIZE as u64);
}

#[test]
fn test_oversized_driver_block_rendered_in_pieces() {
    let engine = test_engine();
    engine
        .load_audio(0, generate_staircase(1024), SegmentParams::default())
        .unwrap();
    engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[0]), 0)
        .unwrap();

    let frames = 2 * TEST_BUFFER_SIZE + 88;
    let mut outputs = output_buffers(2, frames);
    engine.process(&[], &mut outputs);

    let expected: Vec<f32> = (0..frames).map(|i| 2.0 * i as f32).collect();
    assert_eq!(outputs[0], expected);
    assert_eq!(engine.position(), frames as u64);
    assert_eq!(engine.faults().plugin_errors, 0);
}

#[test]
fn test_empty_tracks_underrun() {
    let engine = test_engine();

    let out = render(&engine, 1);
    assert_silence(&out[0], FLOAT_EPSILON);
    assert_eq!(engine.track_underruns(0).unwrap(), TEST_BUFFER_SIZE as u64);
    assert!(!engine.is_track_playing(0).unwrap());

    engine.reset_track_underruns(0).unwrap();
    assert_eq!(engine.track_underruns(0).unwrap(), 0);
}

#[test]
fn test_multiply_track_scales_channel() {
    let engine = test_builder()
        .track(TrackConfig::new(0).named("Music"))
        .track(TrackConfig::new(0).multiply().named("Envelope"))
        .build()
        .unwrap();
    engine.start().unwrap();
    engine
        .load_audio(0, vec![0.5; 1024], SegmentParams::default())
        .unwrap();

    // no envelope yet: the multiply track holds 1.0
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 0.5));
    assert_silence(&out[1], FLOAT_EPSILON);

    engine
        .load_audio(1, vec![0.25; TEST_BUFFER_SIZE], SegmentParams::default())
        .unwrap();
    let out = render(&engine, 2);
    assert!(out[0][..TEST_BUFFER_SIZE].iter().all(|&s| s == 0.125));
    assert!(out[0][TEST_BUFFER_SIZE..].iter().all(|&s| s == 0.5));
    assert_eq!(engine.track_names(), vec!["Music", "Envelope"]);
}

#[test]
fn test_invalid_indices() {
    let engine = test_engine();

    assert!(matches!(
        engine.load_audio(2, vec![1.0; 16], SegmentParams::default()),
        Err(Error::InvalidTrack { index: 2, count: 2 })
    ));
    assert!(matches!(
        engine.set_gain(5, 0.5),
        Err(Error::InvalidChannel { index: 5, count: 2 })
    ));
    assert!(matches!(
        engine.input_buffer(0),
        Err(Error::InvalidChannel { index: 0, count: 0 })
    ));
    assert!(engine.track_name(9).is_err());
    assert!(engine.level(2).is_err());
}

#[test]
fn test_set_position_seeks_every_track() {
    let engine = test_engine();
    engine
        .load_audio(0, generate_staircase(4096), SegmentParams::default())
        .unwrap();
    engine
        .load_audio(1, generate_staircase(4096), SegmentParams::default())
        .unwrap();
    render(&engine, 2);
    assert_eq!(engine.position(), 512);

    engine.set_position(1000).unwrap();
    assert_eq!(engine.position(), 1000);

    let out = render(&engine, 1);
    assert_eq!(out[0][0], 1000.0);
    assert_eq!(out[1][TEST_BUFFER_SIZE - 1], (1000 + TEST_BUFFER_SIZE - 1) as f32);
    assert_eq!(engine.position(), 1000 + TEST_BUFFER_SIZE as u64);

    // past the end every segment is done
    engine.set_position(10_000).unwrap();
    let out = render(&engine, 1);
    assert_silence(&out[0], FLOAT_EPSILON);
}

#[test]
fn test_plugin_errors_escalate_to_fatal() {
    let engine = test_builder().fault_threshold(2).build().unwrap();
    engine.start().unwrap();
    engine
        .load_audio(1, vec![0.5; 1024], SegmentParams::default().loops(0))
        .unwrap();
    let failing = engine
        .insert_plugin(FailingPlugin::boxed(), PluginRouting::channels(&[0]), 0)
        .unwrap();

    let out = render(&engine, 2);
    assert!(!engine.is_fatal());
    assert_eq!(engine.faults().plugin_errors, 2);
    assert!(out[1].iter().all(|&s| s == 0.5));

    render(&engine, 1);
    assert!(engine.is_fatal());
    let message = engine.fatal_error().unwrap();
    assert!(message.contains("threshold of 2"), "{message}");

    let out = render(&engine, 1);
    assert_silence(&out[1], FLOAT_EPSILON);

    engine.stop().unwrap();
    assert!(matches!(engine.start(), Err(Error::Fatal(_))));

    engine.unload_plugin(failing).unwrap();
    engine.reset_fault();
    assert!(!engine.is_fatal());
    assert_eq!(engine.faults().total(), 0);

    engine.start().unwrap();
    let out = render(&engine, 1);
    assert!(out[1].iter().all(|&s| s == 0.5));
}

#[test]
fn test_drop_while_running() {
    let engine = test_engine();
    engine
        .load_audio(0, vec![0.1; 4096], SegmentParams::default())
        .unwrap();
    render(&engine, 1);
    drop(engine);
}
