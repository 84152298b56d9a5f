//! VST2 adapter
//!
//! Loads native VST2 libraries through the `vst` crate and exposes them as [`AudioPlugin`].

use crate::error::LoadStage;
use crate::metadata::PluginInfo;
use crate::plugin::{AudioPlugin, PluginLoader};
use crate::{PluginError, Result};
use std::path::Path;

#[cfg(feature = "vst2")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "vst2")]
use vst::host::{Host, PluginInstance, PluginLoader as VstLoader};

#[cfg(feature = "vst2")]
use vst::plugin::Plugin as VstPlugin;

/// Channels the adapter passes to a plugin without allocating.
pub const MAX_VST_CHANNELS: usize = 32;

/// Parameter change reported by the plugin (index, value)
pub type ParameterChange = (i32, f32);

/// Opens VST2 libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vst2Loader;

impl PluginLoader for Vst2Loader {
    fn open(&self, path: &Path) -> Result<Box<dyn AudioPlugin>> {
        Ok(Box::new(Vst2Plugin::load(path)?))
    }
}

/// A loaded VST2 effect.
pub struct Vst2Plugin {
    #[cfg(feature = "vst2")]
    instance: PluginInstance,

    /// Kept alive for the host callbacks.
    #[cfg(feature = "vst2")]
    host: Arc<Mutex<DivisiHost>>,

    #[cfg(feature = "vst2")]
    param_rx: crossbeam_channel::Receiver<ParameterChange>,

    info: PluginInfo,
    scratch_in: Vec<Vec<f32>>,
    scratch_out: Vec<Vec<f32>>,
}

impl Vst2Plugin {
    pub fn load(path: &Path) -> Result<Self> {
        #[cfg(feature = "vst2")]
        {
            let (param_tx, param_rx) = crossbeam_channel::bounded(256);
            let host = Arc::new(Mutex::new(DivisiHost {
                param_tx,
                sample_rate: 44100.0,
                block_size: 512,
            }));

            let mut loader =
                VstLoader::load(path, Arc::clone(&host)).map_err(|e| PluginError::LoadFailed {
                    path: path.to_path_buf(),
                    stage: LoadStage::Opening,
                    reason: format!("{e:?}"),
                })?;
            let mut instance = loader.instance().map_err(|e| PluginError::LoadFailed {
                path: path.to_path_buf(),
                stage: LoadStage::Instantiation,
                reason: format!("{e:?}"),
            })?;
            instance.init();

            let vst_info = instance.get_info();
            if vst_info.inputs as usize > MAX_VST_CHANNELS
                || vst_info.outputs as usize > MAX_VST_CHANNELS
            {
                return Err(PluginError::LoadFailed {
                    path: path.to_path_buf(),
                    stage: LoadStage::Instantiation,
                    reason: format!(
                        "{} inputs / {} outputs exceed {MAX_VST_CHANNELS} channels",
                        vst_info.inputs, vst_info.outputs
                    ),
                });
            }
            let info = PluginInfo::new(format!("vst2.{}", vst_info.unique_id), vst_info.name.clone())
                .vendor(vst_info.vendor.clone())
                .version(vst_info.version.to_string())
                .audio_io(vst_info.inputs.max(0) as usize, vst_info.outputs.max(0) as usize)
                .parameters(vst_info.parameters.max(0) as usize)
                .programs(vst_info.presets.max(0) as usize);

            tracing::info!("opened VST2 '{}' from {}", info.name, path.display());
            Ok(Self {
                instance,
                host,
                param_rx,
                info,
                scratch_in: Vec::new(),
                scratch_out: Vec::new(),
            })
        }

        #[cfg(not(feature = "vst2"))]
        {
            Err(PluginError::LoadFailed {
                path: path.to_path_buf(),
                stage: LoadStage::Opening,
                reason: "VST2 support not compiled (enable 'vst2' feature)".to_string(),
            })
        }
    }

    /// Parameter changes the plugin reported since the last call.
    pub fn poll_parameter_changes(&self) -> Vec<ParameterChange> {
        #[cfg(feature = "vst2")]
        {
            self.param_rx.try_iter().collect()
        }

        #[cfg(not(feature = "vst2"))]
        {
            Vec::new()
        }
    }
}

impl AudioPlugin for Vst2Plugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn configure(&mut self, sample_rate: f64, block_size: usize) -> Result<()> {
        self.scratch_in = vec![vec![0.0; block_size]; self.info.inputs];
        self.scratch_out = vec![vec![0.0; block_size]; self.info.outputs];

        #[cfg(feature = "vst2")]
        {
            if let Ok(mut host) = self.host.lock() {
                host.sample_rate = sample_rate;
                host.block_size = block_size;
            }
            self.instance.set_sample_rate(sample_rate as f32);
            self.instance.set_block_size(block_size as i64);
        }

        #[cfg(not(feature = "vst2"))]
        {
            let _ = sample_rate;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        #[cfg(feature = "vst2")]
        self.instance.resume();
        Ok(())
    }

    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) -> Result<()> {
        let frames = outputs.first().or(inputs.first()).map_or(0, Vec::len);
        if frames == 0 {
            return Ok(());
        }
        for (k, scratch) in self.scratch_in.iter_mut().enumerate() {
            scratch.resize(frames, 0.0);
            match inputs.get(k) {
                Some(input) => scratch.copy_from_slice(&input[..frames]),
                None => scratch.fill(0.0),
            }
        }
        for scratch in self.scratch_out.iter_mut() {
            scratch.resize(frames, 0.0);
            scratch.fill(0.0);
        }

        #[cfg(feature = "vst2")]
        {
            use vst::buffer::AudioBuffer as VstBuffer;

            let mut input_ptrs = [std::ptr::null::<f32>(); MAX_VST_CHANNELS];
            let mut output_ptrs = [std::ptr::null_mut::<f32>(); MAX_VST_CHANNELS];
            for (ptr, scratch) in input_ptrs.iter_mut().zip(&self.scratch_in) {
                *ptr = scratch.as_ptr();
            }
            for (ptr, scratch) in output_ptrs.iter_mut().zip(self.scratch_out.iter_mut()) {
                *ptr = scratch.as_mut_ptr();
            }

            // SAFETY: every pointer references a live scratch vector of `frames` samples and
            // the counts never exceed the populated entries.
            let mut buffer = unsafe {
                VstBuffer::from_raw(
                    self.scratch_in.len(),
                    self.scratch_out.len(),
                    input_ptrs.as_ptr(),
                    output_ptrs.as_mut_ptr(),
                    frames,
                )
            };
            self.instance.process(&mut buffer);
        }

        for (output, scratch) in outputs.iter_mut().zip(&self.scratch_out) {
            output[..frames].copy_from_slice(scratch);
        }
        Ok(())
    }

    fn stop(&mut self) {
        #[cfg(feature = "vst2")]
        self.instance.suspend();
    }

    fn parameter_count(&self) -> usize {
        self.info.parameters
    }

    fn parameter(&mut self, index: usize) -> f32 {
        #[cfg(feature = "vst2")]
        {
            self.instance.get_parameter_object().get_parameter(index as i32)
        }

        #[cfg(not(feature = "vst2"))]
        {
            let _ = index;
            0.0
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        #[cfg(feature = "vst2")]
        self.instance.get_parameter_object().set_parameter(index as i32, value);

        #[cfg(not(feature = "vst2"))]
        let _ = (index, value);
    }

    fn parameter_name(&mut self, index: usize) -> String {
        #[cfg(feature = "vst2")]
        {
            self.instance.get_parameter_object().get_parameter_name(index as i32)
        }

        #[cfg(not(feature = "vst2"))]
        {
            let _ = index;
            String::new()
        }
    }

    fn parameter_display(&mut self, index: usize) -> String {
        #[cfg(feature = "vst2")]
        {
            let params = self.instance.get_parameter_object();
            let text = params.get_parameter_text(index as i32);
            let label = params.get_parameter_label(index as i32);
            if label.is_empty() {
                text
            } else {
                format!("{text} {label}")
            }
        }

        #[cfg(not(feature = "vst2"))]
        {
            let _ = index;
            String::new()
        }
    }

    fn program_names(&mut self) -> Vec<String> {
        #[cfg(feature = "vst2")]
        {
            let params = self.instance.get_parameter_object();
            (0..self.info.programs)
                .map(|i| params.get_preset_name(i as i32))
                .collect()
        }

        #[cfg(not(feature = "vst2"))]
        {
            Vec::new()
        }
    }

    fn program(&mut self) -> usize {
        #[cfg(feature = "vst2")]
        {
            self.instance.get_parameter_object().get_preset_num().max(0) as usize
        }

        #[cfg(not(feature = "vst2"))]
        {
            0
        }
    }

    fn set_program(&mut self, index: usize) -> Result<()> {
        #[cfg(feature = "vst2")]
        self.instance.get_parameter_object().change_preset(index as i32);

        #[cfg(not(feature = "vst2"))]
        let _ = index;
        Ok(())
    }
}

#[cfg(feature = "vst2")]
struct DivisiHost {
    param_tx: crossbeam_channel::Sender<ParameterChange>,
    sample_rate: f64,
    block_size: usize,
}

#[cfg(feature = "vst2")]
impl Host for DivisiHost {
    fn automate(&self, index: i32, value: f32) {
        let _ = self.param_tx.try_send((index, value));
    }

    fn get_plugin_id(&self) -> i32 {
        0x44495649 // "DIVI"
    }

    fn idle(&self) {}

    fn get_time_info(&self, _mask: i32) -> Option<vst::api::TimeInfo> {
        Some(vst::api::TimeInfo {
            sample_rate: self.sample_rate,
            ..Default::default()
        })
    }

    fn get_block_size(&self) -> isize {
        self.block_size as isize
    }
}
