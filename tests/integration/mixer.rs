//! Output and track controls, pause, and metering
//!
//! Every control ramps over the 32 sample fade of the test engine.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use divisi::amplitude_to_db;
use divisi::prelude::*;

const FADE: usize = 32;

/// Test engine with an endless loop of `value` on both channels.
fn constant_engine(value: f32) -> Engine {
    let engine = test_engine();
    for track in 0..2 {
        engine
            .load_audio(track, vec![value; 64], SegmentParams::default().loops(0))
            .unwrap();
    }
    engine
}

#[test]
fn test_output_gain_ramps_to_target() {
    let engine = constant_engine(1.0);
    engine.set_gain(0, 0.5).unwrap();
    assert_eq!(engine.gains(), vec![0.5, 1.0]);

    let out = render(&engine, 2);
    assert_eq!(out[0][0], 1.0);
    for pair in out[0][..FADE].windows(2) {
        assert!(pair[1] <= pair[0], "gain ramp not monotonic");
    }
    assert!(out[0][FADE..].iter().all(|&s| s == 0.5));
    assert!(out[1].iter().all(|&s| s == 1.0));
}

#[test]
fn test_channel_mute_ramps_out_and_back() {
    let engine = constant_engine(1.0);
    engine.set_channel_mute(0, true).unwrap();
    assert_eq!(engine.mutes(), vec![true, false]);

    let out = render(&engine, 2);
    assert_eq!(out[0][0], 1.0);
    assert!(out[0][FADE / 2] > 0.0 && out[0][FADE / 2] < 1.0);
    assert_silence(&out[0][FADE..], FLOAT_EPSILON);
    assert!(out[1].iter().all(|&s| s == 1.0));

    engine.set_channel_mute(0, false).unwrap();
    let out = render(&engine, 2);
    assert_eq!(out[0][0], 0.0);
    assert!(out[0][FADE..].iter().all(|&s| s == 1.0));
}

#[test]
fn test_mute_toggled_between_blocks_stays_smooth() {
    let engine = constant_engine(1.0);
    render(&engine, 1);

    engine.set_channel_mute(0, true).unwrap();
    engine.set_channel_mute(0, false).unwrap();
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 1.0));

    // turning around halfway down climbs back from the level reached
    engine.set_channel_mute(0, true).unwrap();
    let mut head = output_buffers(2, FADE / 2);
    engine.process(&[], &mut head);
    engine.set_channel_mute(0, false).unwrap();
    let out = render(&engine, 1);
    let low = head[0][FADE / 2 - 1];
    assert!(low > 0.0 && low < 1.0);
    assert!((out[0][0] - low).abs() < 0.2, "jumped from {low} to {}", out[0][0]);
    for pair in out[0][..FADE].windows(2) {
        assert!(pair[1] >= pair[0], "reversed ramp not monotonic");
    }
    assert!(out[0][FADE..].iter().all(|&s| s == 1.0));
}

#[test]
fn test_solo_silences_other_channels() {
    let engine = constant_engine(1.0);
    engine.set_solo(1, true).unwrap();
    assert_eq!(engine.solos(), vec![false, true]);

    let out = render(&engine, 2);
    assert_silence(&out[0][FADE..], FLOAT_EPSILON);
    assert!(out[1].iter().all(|&s| s == 1.0));

    // soloing both makes both audible again
    engine.set_solo(0, true).unwrap();
    let out = render(&engine, 1);
    assert!(out[0][FADE..].iter().all(|&s| s == 1.0));

    engine.set_solo(0, false).unwrap();
    engine.set_solo(1, false).unwrap();
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 1.0));
    assert!(out[1].iter().all(|&s| s == 1.0));
}

#[test]
fn test_track_gain_and_mute() {
    let engine = constant_engine(1.0);
    engine.set_track_gain(0, 0.25).unwrap();
    assert_eq!(engine.track_gain(0).unwrap(), 0.25);

    let out = render(&engine, 1);
    assert!(out[0][FADE..].iter().all(|&s| s == 0.25));

    engine.set_track_mute(0, true).unwrap();
    assert_eq!(engine.track_mutes(), vec![true, false]);
    let out = render(&engine, 1);
    assert_silence(&out[0][FADE..], FLOAT_EPSILON);
    assert!(out[1].iter().all(|&s| s == 1.0));
}

#[test]
fn test_multiply_track_ignores_track_gain() {
    let engine = test_builder()
        .track(TrackConfig::new(0))
        .track(TrackConfig::new(0).multiply())
        .build()
        .unwrap();
    engine.start().unwrap();
    engine
        .load_audio(0, vec![0.5; 64], SegmentParams::default().loops(0))
        .unwrap();
    engine
        .load_audio(1, vec![0.5; 64], SegmentParams::default().loops(0))
        .unwrap();
    engine.set_track_gain(1, 0.0).unwrap();

    let out = render(&engine, 2);
    assert!(out[0].iter().all(|&s| s == 0.25));
}

#[test]
fn test_pause_holds_timeline() {
    let engine = test_engine();
    engine
        .load_audio(0, generate_staircase(4096), SegmentParams::default())
        .unwrap();
    render(&engine, 1);

    engine.set_paused(true);
    assert!(engine.is_paused());
    let out = render(&engine, 1);
    assert_eq!(out[0][0], TEST_BUFFER_SIZE as f32);
    assert_silence(&out[0][FADE..], FLOAT_EPSILON);
    assert_eq!(engine.position(), 512);

    let out = render(&engine, 2);
    assert_silence(&out[0], FLOAT_EPSILON);
    assert_eq!(engine.position(), 512);

    engine.set_paused(false);
    let out = render(&engine, 1);
    assert_eq!(out[0][0], 0.0);
    assert_eq!(out[0][100], 612.0);
    assert_eq!(engine.position(), 768);
}

#[test]
fn test_levels_and_clip_counts() {
    let engine = test_engine();
    engine
        .load_audio(0, vec![1.5; TEST_BUFFER_SIZE], SegmentParams::default())
        .unwrap();
    engine
        .load_audio(1, vec![0.25; TEST_BUFFER_SIZE], SegmentParams::default())
        .unwrap();
    render(&engine, 1);

    assert_eq!(engine.level(0).unwrap(), 1.5);
    assert_eq!(engine.clip_count(0).unwrap(), TEST_BUFFER_SIZE as u64);
    assert_eq!(engine.clip_count(1).unwrap(), 0);
    assert_abs_diff_eq!(
        engine.level_db(1).unwrap(),
        amplitude_to_db(0.25),
        epsilon = PERCEPTUAL_EPSILON
    );
    assert_eq!(engine.levels(), vec![1.5, 0.25]);

    assert_eq!(engine.take_level(0).unwrap(), 1.5);
    assert_eq!(engine.level(0).unwrap(), 0.0);

    engine.reset_clip_count(0).unwrap();
    assert_eq!(engine.clip_count(0).unwrap(), 0);

    // the peak holds until taken
    render(&engine, 1);
    assert_eq!(engine.level(1).unwrap(), 0.25);
}

#[test]
fn test_names() {
    let engine = test_builder().inputs(1).build().unwrap();
    assert_eq!(engine.channel_names(), vec!["Output 1", "Output 2"]);
    assert_eq!(engine.track_names(), vec!["Track 1", "Track 2"]);
    assert_eq!(engine.input_name(0).unwrap(), "Input 1");

    engine.set_channel_name(1, "Right").unwrap();
    engine.set_track_name(0, "Drums").unwrap();
    engine.set_input_name(0, "Mic").unwrap();

    assert_eq!(engine.channel_name(1).unwrap(), "Right");
    assert_eq!(engine.track_name(0).unwrap(), "Drums");
    assert_eq!(engine.input_name(0).unwrap(), "Mic");
    assert!(engine.set_channel_name(2, "Nope").is_err());
}
