//! Plugin layers inside the render cycle
//!
//! Pass-through, layering, recursion, threading and hangs, plus the built-in DSP plugins.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use divisi::plugin::{PluginError, Result as PluginResult};
use divisi::prelude::*;
use divisi::{AudioPlugin, PluginLoader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Test engine playing `left` and `right` forever on the two channels.
fn looping_engine(builder: EngineBuilder, left: f32, right: f32) -> Engine {
    let engine = builder.build().unwrap();
    engine.start().unwrap();
    engine
        .load_audio(0, vec![left; 64], SegmentParams::default().loops(0))
        .unwrap();
    engine
        .load_audio(1, vec![right; 64], SegmentParams::default().loops(0))
        .unwrap();
    engine
}

#[test]
fn test_untouched_channel_passes_through() {
    let engine = looping_engine(test_builder(), 1.0, 0.5);
    let id = engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[0]), 0)
        .unwrap();
    assert_eq!(engine.plugin_ids(), vec![id]);
    assert_eq!(engine.plugin_info(id).unwrap().name, "Gain");

    let out = render(&engine, 2);
    assert!(out[0].iter().all(|&s| s == 2.0));
    assert!(out[1].iter().all(|&s| s == 0.5));

    engine.unload_plugin(id).unwrap();
    assert!(engine.plugin_ids().is_empty());
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 1.0));
}

#[test]
fn test_layers_run_in_order() {
    let engine = looping_engine(test_builder().plugin_layers(2), 1.0, 0.0);
    engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[0]), 0)
        .unwrap();
    engine
        .insert_plugin(GainPlugin::boxed(3.0), PluginRouting::channels(&[0]), 1)
        .unwrap();
    assert!(engine
        .insert_plugin(GainPlugin::boxed(1.0), PluginRouting::channels(&[0]), 2)
        .is_err());

    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 6.0));
}

#[test]
fn test_channel_claimed_once_per_layer() {
    let engine = looping_engine(test_builder(), 1.0, 1.0);
    engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[0, 1]), 0)
        .unwrap();
    assert!(engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[1]), 0)
        .is_err());
}

#[test]
fn test_output_routed_onto_unclaimed_channel_adds() {
    let engine = looping_engine(test_builder(), 1.0, 0.5);
    // reads channel 0, writes channel 1: channel 0 is claimed and silent, channel 1 sums
    engine
        .insert_plugin(
            GainPlugin::boxed(2.0),
            PluginRouting::new(vec![PluginInput::Channel(0)], vec![1]),
            0,
        )
        .unwrap();

    let out = render(&engine, 1);
    assert_silence(&out[0], FLOAT_EPSILON);
    assert!(out[1].iter().all(|&s| s == 2.5));
}

#[test]
fn test_self_recursion_accumulates_across_cycles() {
    let engine = looping_engine(test_builder(), 1.0, 0.0);
    let routing = PluginRouting::from_raw(&[0, -1], &[0], &[(-1, 0)]).unwrap();
    let id = engine.insert_plugin(SumPlugin::boxed(), routing, 0).unwrap();
    assert_eq!(engine.recursion_usage(0, 0), 1);

    let out = render(&engine, 3);
    for (cycle, block) in out[0].chunks(TEST_BUFFER_SIZE).enumerate() {
        let expected = (cycle + 1) as f32;
        assert!(block.iter().all(|&s| s == expected), "cycle {cycle}");
    }

    engine.unload_plugin(id).unwrap();
    assert_eq!(engine.recursion_usage(0, 0), 0);
}

#[test]
fn test_threaded_layers_match_single_thread() {
    let render_with = |threading: PluginThreading| {
        let engine = test_builder().plugin_threading(threading).build().unwrap();
        engine.start().unwrap();
        engine
            .load_audio(0, generate_noise(2048, 7), SegmentParams::default())
            .unwrap();
        engine
            .load_audio(1, generate_sine(440.0, TEST_SAMPLE_RATE, 2048), SegmentParams::default())
            .unwrap();
        engine
            .insert_plugin(GainPlugin::boxed(0.5), PluginRouting::channels(&[0]), 0)
            .unwrap();
        engine
            .insert_plugin(GainPlugin::boxed(1.5), PluginRouting::channels(&[1]), 0)
            .unwrap();
        render(&engine, 8)
    };

    let single = render_with(PluginThreading::Single);
    let threaded = render_with(PluginThreading::PerPlugin);
    assert_eq!(single, threaded);
}

#[test]
fn test_plugin_hang_halts_engine() {
    init_tracing();
    let engine = looping_engine(
        test_builder()
            .plugin_threading(PluginThreading::PerPlugin)
            .plugin_join_timeout(Duration::from_millis(50)),
        1.0,
        0.5,
    );
    engine
        .insert_plugin(
            SleepPlugin::boxed(Duration::from_millis(500)),
            PluginRouting::channels(&[0]),
            0,
        )
        .unwrap();

    render(&engine, 1);
    assert!(engine.is_fatal());
    assert_eq!(engine.faults().plugin_hangs, 1);
    let message = engine.fatal_error().unwrap();
    assert!(message.contains("Timeout"), "{message}");

    let out = render(&engine, 1);
    assert_silence(&out[1], FLOAT_EPSILON);

    engine.stop().unwrap();
    assert!(engine.start().is_err());

    // the hung host is discarded with its plugins
    engine.reset_fault();
    assert!(engine.plugin_ids().is_empty());
    engine.start().unwrap();
    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 1.0));
    assert!(out[1].iter().all(|&s| s == 0.5));
}

#[test]
fn test_failing_plugin_is_silenced_and_counted() {
    let engine = looping_engine(test_builder(), 1.0, 0.5);
    engine
        .insert_plugin(FailingPlugin::boxed(), PluginRouting::channels(&[0]), 0)
        .unwrap();

    let out = render(&engine, 1);
    assert_silence(&out[0], FLOAT_EPSILON);
    assert!(out[1].iter().all(|&s| s == 0.5));
    assert_eq!(engine.faults().plugin_errors, 1);
    assert!(!engine.is_fatal());
}

#[test]
fn test_plugin_parameters_through_engine() {
    let engine = looping_engine(test_builder(), 1.0, 0.0);
    let id = engine
        .insert_plugin(GainPlugin::boxed(2.0), PluginRouting::channels(&[0]), 0)
        .unwrap();

    assert_eq!(engine.plugin_parameter(id, 0).unwrap(), 0.5);
    engine.set_plugin_parameter(id, 0, 0.25).unwrap();
    let parameters = engine.plugin_parameters(id).unwrap();
    assert_eq!(parameters.len(), 1);
    assert_eq!(parameters[0].name, "Gain");
    assert_eq!(parameters[0].value, 0.25);

    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 1.0));
}

struct TestLoader;

impl PluginLoader for TestLoader {
    fn open(&self, path: &Path) -> PluginResult<Box<dyn AudioPlugin>> {
        if path.ends_with("double.so") {
            Ok(GainPlugin::boxed(2.0))
        } else {
            Err(PluginError::InvalidRouting(format!(
                "no plugin at {}",
                path.display()
            )))
        }
    }
}

#[test]
fn test_load_plugin_through_loader() {
    let engine = looping_engine(test_builder(), 1.0, 0.0);
    assert!(engine
        .load_plugin("double.so", PluginRouting::channels(&[0]), 0)
        .is_err());

    engine.set_plugin_loader(Arc::new(TestLoader));
    assert!(engine
        .load_plugin("missing.so", PluginRouting::channels(&[0]), 0)
        .is_err());
    let id = engine
        .load_plugin("double.so", PluginRouting::channels(&[0]), 0)
        .unwrap();

    let out = render(&engine, 1);
    assert!(out[0].iter().all(|&s| s == 2.0));
    engine.unload_plugin(id).unwrap();
}

#[test]
fn test_convolver_in_engine() {
    let engine = test_engine();
    let mut impulse = vec![0.0; 1024];
    impulse[0] = 1.0;
    engine
        .load_audio(0, impulse, SegmentParams::default())
        .unwrap();

    let convolver = ConvolverPlugin::new(vec![0.0, 0.0, 0.5], 1).unwrap();
    let id = engine
        .insert_plugin(Box::new(convolver), PluginRouting::channels(&[0]), 0)
        .unwrap();
    let names: Vec<String> = engine
        .plugin_parameters(id)
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Wet", "Dry"]);

    // partitions follow the block size, so the echo lands one block late
    let out = &render(&engine, 4)[0];
    let echo = TEST_BUFFER_SIZE + 2;
    assert!((out[echo] - 0.5).abs() < DSP_EPSILON, "echo was {}", out[echo]);
    for (n, &s) in out.iter().enumerate() {
        if n != echo {
            assert!(s.abs() < DSP_EPSILON, "sample {n} leaked {s}");
        }
    }
}

#[test]
fn test_convolver_dry_mix() {
    let engine = test_engine();
    engine
        .load_audio(0, generate_staircase(TEST_BUFFER_SIZE), SegmentParams::default())
        .unwrap();
    let convolver = ConvolverPlugin::new(vec![1.0], 1).unwrap();
    let id = engine
        .insert_plugin(Box::new(convolver), PluginRouting::channels(&[0]), 0)
        .unwrap();
    engine.set_plugin_parameter(id, 0, 0.0).unwrap();
    engine.set_plugin_parameter(id, 1, 1.0).unwrap();

    let out = &render(&engine, 1)[0];
    assert_signals_eq(out, &generate_staircase(TEST_BUFFER_SIZE), DSP_EPSILON);
}

#[test]
fn test_spectral_filter_programs_in_engine() {
    let fft_size = 64;
    let low_bin = 4;
    let high_bin = 24;
    let bin_hz = TEST_SAMPLE_RATE / fft_size as f64;
    let len = 8 * TEST_BUFFER_SIZE;
    let low = generate_sine(low_bin as f64 * bin_hz, TEST_SAMPLE_RATE, len);
    let high = generate_sine(high_bin as f64 * bin_hz, TEST_SAMPLE_RATE, len);

    let engine = test_engine();
    engine.load_audio(0, low.clone(), SegmentParams::default()).unwrap();
    engine.load_audio(1, high, SegmentParams::default()).unwrap();

    let filter = SpectralFilterPlugin::new(fft_size, 2).unwrap();
    let id = engine
        .insert_plugin(Box::new(filter), PluginRouting::channels(&[0, 1]), 0)
        .unwrap();
    assert_eq!(
        engine.plugin_program_names(id).unwrap(),
        vec!["Flat", "Low pass", "High pass"]
    );
    engine.set_plugin_program(id, 1).unwrap();
    assert_eq!(engine.plugin_program(id).unwrap(), 1);
    assert!(engine.set_plugin_program(id, 7).is_err());

    let out = render(&engine, 8);
    let settled = 4 * fft_size;

    // the low tone passes, delayed by one frame
    for n in settled..len {
        assert!(
            (out[0][n] - low[n - fft_size]).abs() < 1e-3,
            "sample {n}: {} vs {}",
            out[0][n],
            low[n - fft_size]
        );
    }
    // the high tone is removed
    assert!(peak(&out[1][settled..len]) < 1e-3);
}
