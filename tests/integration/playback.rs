//! Segment playback through the engine
//!
//! Memory and file segments, loops with crossfaded seams, scheduling, and completion events.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use divisi::prelude::*;
use divisi::{hanning_down, hanning_up, PlaybackSegment};

/// Two passes of a two second loop, overlapped by a 100 sample crossfade.
#[test]
fn test_loop_crossfade_end_to_end() {
    init_tracing();
    let engine = test_engine();
    let len = 2 * TEST_SAMPLE_RATE as usize;
    let ramp = 100;
    let data = generate_sine(440.0, TEST_SAMPLE_RATE, len);

    let params = SegmentParams::default()
        .loops(2)
        .loop_ramp(ramp, true)
        .name("loop");
    let segment = PlaybackSegment::from_memory(0, data.clone(), params).unwrap();
    let total = segment.total_length();
    assert_eq!(total, 2 * len - ramp);
    engine.load_segment(0, segment).unwrap();

    let cycles = total.div_ceil(TEST_BUFFER_SIZE);
    let out = &render(&engine, cycles)[0];

    // first pass untouched up to the seam
    assert_signals_eq(&out[..len - ramp], &data[..len - ramp], FLOAT_EPSILON);

    // midpoint of the seam mixes the fading tail with the rising head
    let j = ramp / 2;
    let expected = data[len - ramp + j] * hanning_down(j, ramp) + data[j] * hanning_up(j, ramp);
    assert!(
        (out[len - ramp + j] - expected).abs() < FLOAT_EPSILON,
        "seam midpoint: got {}, expected {expected}",
        out[len - ramp + j]
    );

    // the second pass resumes right after the crossfaded head
    assert_signals_eq(&out[len..total], &data[ramp..], FLOAT_EPSILON);

    // no click across the seam
    let max_step = out[len - 2 * ramp..len + ramp]
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0f32, f32::max);
    assert!(max_step < 0.15, "discontinuity of {max_step} at the seam");

    assert_silence(&out[total..], FLOAT_EPSILON);

    let events: Vec<TrackEvent> = engine.events().try_iter().collect();
    assert_eq!(events.len(), 1);
    let TrackEvent::SegmentDone { track, name } = &events[0];
    assert_eq!(*track, 0);
    assert_eq!(name.as_ref(), "loop");
}

#[test]
fn test_file_playback_matches_source() {
    let dir = tempfile::tempdir().unwrap();
    let frames = 20_000;
    let left = generate_sine(1000.0, TEST_SAMPLE_RATE, frames);
    let right: Vec<f32> = (0..frames).map(|i| (i % 1000) as f32 / 1000.0).collect();
    let interleaved: Vec<f32> = left
        .iter()
        .zip(&right)
        .flat_map(|(&l, &r)| [l, r])
        .collect();
    let path = write_wav(dir.path(), "stereo.wav", 2, &interleaved);

    let engine = test_engine();
    engine
        .load_file(0, &path, 1, SegmentParams::default())
        .unwrap();
    engine
        .load_file(1, &path, 0, SegmentParams::default().snippet(1000, 500))
        .unwrap();

    let cycles = frames.div_ceil(TEST_BUFFER_SIZE);
    let out = render(&engine, cycles);

    assert_signals_eq(&out[0][..frames], &right, FLOAT_EPSILON);
    assert_silence(&out[0][frames..], FLOAT_EPSILON);

    assert_signals_eq(&out[1][..500], &left[1000..1500], FLOAT_EPSILON);
    assert_silence(&out[1][500..], FLOAT_EPSILON);
    assert_eq!(engine.faults().stream_underruns, 0);
}

#[test]
fn test_file_with_other_sample_rate_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "mono.wav", 1, &[0.0; 1000]);

    let engine = test_builder().sample_rate(44100.0).build().unwrap();
    assert!(engine
        .load_file(0, &path, 0, SegmentParams::default())
        .is_err());
    assert!(engine
        .load_file(0, dir.path().join("missing.wav"), 0, SegmentParams::default())
        .is_err());
    assert_eq!(engine.track_segment_count(0).unwrap(), 0);
}

#[test]
fn test_offset_leaves_a_gap() {
    let engine = test_engine();
    engine
        .load_audio(0, vec![1.0; 100], SegmentParams::default())
        .unwrap();
    engine
        .load_audio(0, vec![0.5; 100], SegmentParams::default().offset(50))
        .unwrap();

    let out = &render(&engine, 1)[0];
    assert!(out[..100].iter().all(|&s| s == 1.0));
    assert!(out[100..150].iter().all(|&s| s == 0.0));
    assert!(out[150..250].iter().all(|&s| s == 0.5));
    assert!(out[250..].iter().all(|&s| s == 0.0));
    // the 50 sample gap and the 6 empty slots at the end
    assert_eq!(engine.track_underruns(0).unwrap(), 56);
}

#[test]
fn test_crossfade_between_segments_keeps_level() {
    let engine = test_engine();
    engine
        .load_audio(0, vec![1.0; 1000], SegmentParams::default().name("first"))
        .unwrap();
    engine
        .load_audio(
            0,
            vec![1.0; 1000],
            SegmentParams::default().crossfade(200).name("second"),
        )
        .unwrap();

    let out = &render(&engine, 8)[0];
    for (n, &s) in out[..1800].iter().enumerate() {
        assert!((s - 1.0).abs() < DSP_EPSILON, "sample {n} dipped to {s}");
    }
    assert_silence(&out[1800..], FLOAT_EPSILON);

    let names: Vec<String> = engine
        .events()
        .try_iter()
        .map(|TrackEvent::SegmentDone { name, .. }| name.to_string())
        .collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[test]
fn test_segment_ramp_and_gain() {
    let engine = test_engine();
    engine
        .load_audio(
            0,
            vec![1.0; 1024],
            SegmentParams::default().ramp(64).gain(0.5),
        )
        .unwrap();

    let out = &render(&engine, 4)[0];
    assert_eq!(out[0], 0.0);
    assert!((out[32] - 0.25).abs() < DSP_EPSILON);
    assert!(out[64..960].iter().all(|&s| (s - 0.5).abs() < FLOAT_EPSILON));
    assert!(out[1023] < 0.01);
}

#[test]
fn test_endless_loop_blocks_further_loading() {
    let engine = test_engine();
    engine
        .load_audio(0, generate_staircase(100), SegmentParams::default().loops(0))
        .unwrap();
    assert!(engine
        .load_audio(0, vec![1.0; 10], SegmentParams::default())
        .is_err());

    let out = &render(&engine, 1)[0];
    for (n, &s) in out.iter().enumerate() {
        assert_eq!(s, (n % 100) as f32);
    }
    assert!(engine.is_track_playing(0).unwrap());

    engine.clear_track(0).unwrap();
    assert_eq!(engine.track_segment_count(0).unwrap(), 0);
    let out = &render(&engine, 1)[0];
    assert_silence(out, FLOAT_EPSILON);
}

#[test]
fn test_invalid_segment_parameters_rejected() {
    let engine = test_engine();
    assert!(engine
        .load_audio(0, Vec::new(), SegmentParams::default())
        .is_err());
    assert!(engine
        .load_audio(0, vec![1.0; 100], SegmentParams::default().loop_ramp(80, true))
        .is_err());
    assert!(engine
        .load_audio(
            0,
            vec![1.0; 100],
            SegmentParams::default().offset(10).crossfade(10)
        )
        .is_err());
}

#[test]
fn test_cleanup_reclaims_finished_segments() {
    let engine = test_builder().auto_cleanup(false).build().unwrap();
    engine.start().unwrap();
    engine
        .load_audio(0, vec![1.0; 100], SegmentParams::default())
        .unwrap();
    engine
        .load_audio(0, vec![1.0; 1000], SegmentParams::default())
        .unwrap();

    render(&engine, 1);
    assert_eq!(engine.track_segment_count(0).unwrap(), 2);

    engine.cleanup_track(0, false).unwrap();
    assert_eq!(engine.track_segment_count(0).unwrap(), 1);

    engine.cleanup_track(0, true).unwrap();
    assert_eq!(engine.track_segment_count(0).unwrap(), 0);
}
