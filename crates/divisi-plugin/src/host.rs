//! Layered plugin host.
//!
//! The host is a `layers × channels` matrix. A plugin claims the channels it reads directly
//! in its layer: the first becomes the owning cell, the rest alias it. Layers run in order.
//! Inside a layer every plugin reads the same snapshot, so plugins never see each other's
//! output until the next layer, and outputs are summed into an accumulation buffer:
//!
//! - channels claimed by a plugin become the pure sum of the outputs routed to them
//! - unclaimed channels keep their input plus any outputs routed to them
//! - channels touched by neither pass through unchanged
//!
//! After a layer, channels read through a recursion input are snapshotted and fed back on
//! the next cycle.

use crate::config::HostConfig;
use crate::metadata::{ParameterInfo, PluginInfo};
use crate::plugin::{AudioPlugin, PluginLoader};
use crate::routing::{PluginInput, PluginRouting};
use crate::worker::{PluginSlot, PluginWorker, SharedSlot, WorkerDone};
use crate::{LoadStage, PluginError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use divisi_core::PluginThreading;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Handle of a hosted plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u64);

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `layer × channel` position of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    /// The first input channel of the plugin.
    Owned(PluginId),
    /// A further input channel of a plugin owned elsewhere in the layer.
    AliasOf(PluginId),
}

impl Cell {
    pub fn plugin(&self) -> Option<PluginId> {
        match *self {
            Cell::Empty => None,
            Cell::Owned(id) | Cell::AliasOf(id) => Some(id),
        }
    }
}

struct HostedPlugin {
    layer: usize,
    routing: PluginRouting,
    source: Option<PathBuf>,
    info: PluginInfo,
    slot: SharedSlot,
    worker: Option<PluginWorker>,
}

/// Plugin matrix with recursion buffers.
///
/// Not internally synchronized: the owner serializes `process` against loads and unloads,
/// typically under its processing lock.
pub struct PluginHost {
    config: HostConfig,
    loader: Option<Arc<dyn PluginLoader>>,
    cells: Vec<Vec<Cell>>,
    plugins: BTreeMap<PluginId, HostedPlugin>,
    layers: Vec<Vec<PluginId>>,
    /// `[layer][channel]` accumulated output of the last cycle.
    recursion: Vec<Vec<Vec<f32>>>,
    recursion_usage: Vec<Vec<usize>>,
    accum: Vec<Vec<f32>>,
    done_tx: Sender<WorkerDone>,
    done_rx: Receiver<WorkerDone>,
    next_id: u64,
    cycle: u64,
    hung: bool,
}

impl PluginHost {
    pub fn new(config: HostConfig) -> Self {
        let (layers, channels, block) = (config.layers, config.channels, config.block_size);
        let (done_tx, done_rx) = unbounded();
        Self {
            cells: vec![vec![Cell::Empty; channels]; layers],
            plugins: BTreeMap::new(),
            layers: vec![Vec::new(); layers],
            recursion: vec![vec![vec![0.0; block]; channels]; layers],
            recursion_usage: vec![vec![0; channels]; layers],
            accum: vec![vec![0.0; block]; channels],
            done_tx,
            done_rx,
            next_id: 0,
            cycle: 0,
            hung: false,
            loader: None,
            config,
        }
    }

    /// Install the loader used by [`load_plugin`](Self::load_plugin).
    pub fn set_loader(&mut self, loader: Arc<dyn PluginLoader>) {
        self.loader = Some(loader);
    }

    /// Open the plugin at `path` through the installed loader and place it in `layer`.
    pub fn load_plugin(
        &mut self,
        path: impl AsRef<Path>,
        routing: PluginRouting,
        layer: usize,
    ) -> Result<PluginId> {
        let path = path.as_ref();
        let routing = self.check_routing(&routing, layer)?;
        let loader = self.loader.clone().ok_or_else(|| PluginError::LoadFailed {
            path: path.to_path_buf(),
            stage: LoadStage::Opening,
            reason: "no plugin loader installed".to_string(),
        })?;
        let plugin = loader.open(path)?;
        self.install(plugin, routing, layer, Some(path.to_path_buf()))
    }

    /// Place an already constructed plugin in `layer`.
    pub fn insert_plugin(
        &mut self,
        plugin: Box<dyn AudioPlugin>,
        routing: PluginRouting,
        layer: usize,
    ) -> Result<PluginId> {
        let routing = self.check_routing(&routing, layer)?;
        self.install(plugin, routing, layer, None)
    }

    fn check_routing(&self, routing: &PluginRouting, layer: usize) -> Result<PluginRouting> {
        if layer >= self.config.layers {
            return Err(PluginError::InvalidRouting(format!(
                "layer {layer} out of range ({} layers)",
                self.config.layers
            )));
        }
        let resolved = routing.resolve(layer, self.config.layers, self.config.channels)?;
        for channel in resolved.input_channels() {
            if self.cells[layer][channel] != Cell::Empty {
                return Err(PluginError::ChannelInUse { layer, channel });
            }
        }
        if self.config.threading == PluginThreading::PerPlugin
            && self.layers[layer].len() >= self.config.max_plugins_per_layer
        {
            return Err(PluginError::TooManyPlugins {
                layer,
                max: self.config.max_plugins_per_layer,
            });
        }
        Ok(resolved)
    }

    fn install(
        &mut self,
        mut plugin: Box<dyn AudioPlugin>,
        routing: PluginRouting,
        layer: usize,
        source: Option<PathBuf>,
    ) -> Result<PluginId> {
        let info = plugin.info().clone();
        let origin = source.clone().unwrap_or_else(|| PathBuf::from(&info.name));
        let failed = |stage: LoadStage, e: PluginError| match e {
            e @ PluginError::LoadFailed { .. } => e,
            e => PluginError::LoadFailed {
                path: origin.clone(),
                stage,
                reason: e.to_string(),
            },
        };

        plugin
            .configure(self.config.sample_rate, self.config.block_size)
            .map_err(|e| failed(LoadStage::Configuration, e))?;
        plugin
            .start()
            .map_err(|e| failed(LoadStage::Activation, e))?;

        let id = PluginId(self.next_id);
        self.next_id += 1;
        let slot = Arc::new(Mutex::new(PluginSlot::new(
            plugin,
            routing.inputs.len(),
            routing.outputs.len(),
            self.config.block_size,
        )));

        let worker = match self.config.threading {
            PluginThreading::Single => None,
            PluginThreading::PerPlugin => {
                match PluginWorker::spawn(id, Arc::clone(&slot), self.done_tx.clone()) {
                    Ok(worker) => Some(worker),
                    Err(e) => {
                        let mut slot = slot.lock();
                        slot.plugin.stop();
                        slot.plugin.close();
                        return Err(PluginError::LoadFailed {
                            path: origin,
                            stage: LoadStage::Threading,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        };

        for (k, channel) in routing.input_channels().enumerate() {
            self.cells[layer][channel] = if k == 0 {
                Cell::Owned(id)
            } else {
                Cell::AliasOf(id)
            };
        }
        for input in &routing.inputs {
            if let PluginInput::Recursion {
                layer: Some(l),
                channel,
            } = *input
            {
                self.recursion_usage[l][channel] += 1;
            }
        }
        self.layers[layer].push(id);

        tracing::info!(
            "loaded plugin '{}' as {id} in layer {layer} ({} in, {} out)",
            info.name,
            routing.inputs.len(),
            routing.outputs.len()
        );
        self.plugins.insert(
            id,
            HostedPlugin {
                layer,
                routing,
                source,
                info,
                slot,
                worker,
            },
        );
        Ok(id)
    }

    /// Remove a plugin, release its channels and recursion references, and close it.
    pub fn unload_plugin(&mut self, id: PluginId) -> Result<()> {
        let mut hosted = self
            .plugins
            .remove(&id)
            .ok_or(PluginError::UnknownPlugin(id))?;
        let layer = hosted.layer;
        self.layers[layer].retain(|&p| p != id);
        for cell in self.cells[layer].iter_mut() {
            if cell.plugin() == Some(id) {
                *cell = Cell::Empty;
            }
        }
        for input in &hosted.routing.inputs {
            if let PluginInput::Recursion {
                layer: Some(l),
                channel,
            } = *input
            {
                let usage = &mut self.recursion_usage[l][channel];
                *usage = usage.saturating_sub(1);
                if *usage == 0 {
                    self.recursion[l][channel].fill(0.0);
                }
            }
        }

        if let Some(worker) = hosted.worker.as_mut() {
            worker.shutdown(!self.hung);
        }
        // a hung worker keeps its slot locked; waiting for it again would stall teardown
        let slot = if self.hung {
            hosted.slot.try_lock()
        } else {
            hosted.slot.try_lock_for(self.config.join_timeout)
        };
        match slot {
            Some(mut slot) => {
                slot.plugin.stop();
                slot.plugin.close();
            }
            None => tracing::warn!("plugin '{}' is stuck; leaking it", hosted.info.name),
        }
        tracing::info!("unloaded plugin '{}' ({id})", hosted.info.name);
        Ok(())
    }

    /// Unload every plugin.
    pub fn clear(&mut self) {
        let ids: Vec<PluginId> = self.plugins.keys().copied().collect();
        for id in ids {
            let _ = self.unload_plugin(id);
        }
    }

    /// Run every layer over `buffers` in place.
    ///
    /// A plugin that fails leaves silence on its outputs; the remaining plugins still run and
    /// the first failure is returned once the cycle completes. A join timeout or lost worker
    /// halts the host: this and every later call fail without touching the buffers. Blocks
    /// longer than the configured block size are rejected untouched.
    pub fn process(&mut self, buffers: &mut [Vec<f32>]) -> Result<()> {
        if self.hung {
            return Err(PluginError::Timeout {
                operation: "host halted after a plugin hang".to_string(),
                duration_ms: self.config.join_timeout.as_millis() as u64,
            });
        }
        if self.plugins.is_empty() {
            return Ok(());
        }

        let channels = buffers.len().min(self.config.channels);
        let frames = buffers.first().map_or(0, Vec::len);
        if frames > self.config.block_size {
            return Err(PluginError::BlockTooLong {
                frames,
                max: self.config.block_size,
            });
        }
        for (acc, buffer) in self.accum.iter_mut().zip(buffers.iter()) {
            acc.resize(frames, 0.0);
            acc.copy_from_slice(buffer);
        }

        let mut first_error = None;
        for layer in 0..self.layers.len() {
            if !self.layers[layer].is_empty() {
                for (channel, cell) in self.cells[layer].iter().enumerate().take(channels) {
                    if *cell != Cell::Empty {
                        self.accum[channel].fill(0.0);
                    }
                }

                self.gather_inputs(layer, buffers, frames);
                let result = match self.config.threading {
                    PluginThreading::Single => self.run_sequential(layer),
                    PluginThreading::PerPlugin => self.run_threaded(layer)?,
                };
                if let Some(e) = result {
                    first_error.get_or_insert(e);
                }
                self.accumulate(layer, channels);

                for (buffer, acc) in buffers.iter_mut().zip(self.accum.iter()).take(channels) {
                    buffer.copy_from_slice(acc);
                }
            }

            for channel in 0..channels {
                if self.recursion_usage[layer][channel] > 0 {
                    let snapshot = &mut self.recursion[layer][channel];
                    snapshot.resize(frames, 0.0);
                    snapshot.copy_from_slice(&self.accum[channel]);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Copy each plugin's inputs from the layer snapshot and the recursion buffers.
    fn gather_inputs(&self, layer: usize, buffers: &[Vec<f32>], frames: usize) {
        for id in &self.layers[layer] {
            let Some(hosted) = self.plugins.get(id) else {
                continue;
            };
            let mut slot = hosted.slot.lock();
            slot.prepare(frames);
            for (k, input) in hosted.routing.inputs.iter().enumerate() {
                let source = match *input {
                    PluginInput::Channel(c) => buffers.get(c).map(Vec::as_slice),
                    PluginInput::Recursion {
                        layer: Some(l),
                        channel,
                    } => Some(self.recursion[l][channel].as_slice()),
                    PluginInput::Recursion { layer: None, .. } => None,
                };
                copy_padded(&mut slot.inputs[k], source.unwrap_or(&[]));
            }
        }
    }

    fn run_sequential(&self, layer: usize) -> Option<PluginError> {
        let mut first_error = None;
        for id in &self.layers[layer] {
            if let Some(hosted) = self.plugins.get(id) {
                if let Err(e) = hosted.slot.lock().run() {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }

    /// Dispatch the layer to its workers and wait for all of them.
    fn run_threaded(&mut self, layer: usize) -> Result<Option<PluginError>> {
        self.cycle += 1;
        let mut pending = 0usize;
        for id in &self.layers[layer] {
            let Some(hosted) = self.plugins.get(id) else {
                continue;
            };
            let Some(worker) = &hosted.worker else {
                continue;
            };
            if !worker.dispatch(self.cycle) {
                self.hung = true;
                return Err(PluginError::WorkerDisconnected(hosted.info.name.clone()));
            }
            pending += 1;
        }

        let deadline = Instant::now() + self.config.join_timeout;
        let mut first_error = None;
        while pending > 0 {
            match self.done_rx.recv_deadline(deadline) {
                Ok(done) if done.cycle == self.cycle => {
                    pending -= 1;
                    if let Err(e) = done.result {
                        first_error.get_or_insert(e);
                    }
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {
                    self.hung = true;
                    let duration_ms = self.config.join_timeout.as_millis() as u64;
                    tracing::error!(
                        "{pending} plugin(s) in layer {layer} missed the {duration_ms}ms deadline"
                    );
                    return Err(PluginError::Timeout {
                        operation: format!("joining layer {layer}"),
                        duration_ms,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.hung = true;
                    return Err(PluginError::WorkerDisconnected(format!("layer {layer}")));
                }
            }
        }
        Ok(first_error)
    }

    fn accumulate(&mut self, layer: usize, channels: usize) {
        for id in &self.layers[layer] {
            let Some(hosted) = self.plugins.get(id) else {
                continue;
            };
            let slot = hosted.slot.lock();
            for (k, &channel) in hosted.routing.outputs.iter().enumerate() {
                if channel >= channels {
                    continue;
                }
                for (acc, &s) in self.accum[channel].iter_mut().zip(slot.outputs[k].iter()) {
                    *acc += s;
                }
            }
        }
    }

    fn hosted(&self, id: PluginId) -> Result<&HostedPlugin> {
        self.plugins.get(&id).ok_or(PluginError::UnknownPlugin(id))
    }

    fn lock_slot(&self, id: PluginId) -> Result<MutexGuard<'_, PluginSlot>> {
        let hosted = self.hosted(id)?;
        hosted
            .slot
            .try_lock_for(self.config.join_timeout)
            .ok_or_else(|| PluginError::Timeout {
                operation: format!("locking plugin '{}'", hosted.info.name),
                duration_ms: self.config.join_timeout.as_millis() as u64,
            })
    }

    pub fn cell(&self, layer: usize, channel: usize) -> Option<Cell> {
        self.cells.get(layer)?.get(channel).copied()
    }

    /// Plugin reading `channel` directly in `layer`, whether owning or aliased.
    pub fn plugin_on(&self, layer: usize, channel: usize) -> Option<PluginId> {
        self.cell(layer, channel)?.plugin()
    }

    /// Plugins of `layer` in load order.
    pub fn layer_plugins(&self, layer: usize) -> &[PluginId] {
        self.layers.get(layer).map_or(&[], Vec::as_slice)
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.plugins.keys().copied().collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn plugin_info(&self, id: PluginId) -> Result<&PluginInfo> {
        Ok(&self.hosted(id)?.info)
    }

    pub fn plugin_layer(&self, id: PluginId) -> Result<usize> {
        Ok(self.hosted(id)?.layer)
    }

    pub fn routing(&self, id: PluginId) -> Result<&PluginRouting> {
        Ok(&self.hosted(id)?.routing)
    }

    /// Library the plugin was opened from; `None` for inserted plugins.
    pub fn source(&self, id: PluginId) -> Result<Option<&Path>> {
        Ok(self.hosted(id)?.source.as_deref())
    }

    pub fn parameter(&self, id: PluginId, index: usize) -> Result<f32> {
        let mut slot = self.lock_slot(id)?;
        check_index(index, slot.plugin.parameter_count(), "parameter")?;
        Ok(slot.plugin.parameter(index))
    }

    pub fn set_parameter(&self, id: PluginId, index: usize, value: f32) -> Result<()> {
        let mut slot = self.lock_slot(id)?;
        check_index(index, slot.plugin.parameter_count(), "parameter")?;
        slot.plugin.set_parameter(index, value.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn parameters(&self, id: PluginId) -> Result<Vec<ParameterInfo>> {
        Ok(self.lock_slot(id)?.plugin.parameter_list())
    }

    pub fn program_names(&self, id: PluginId) -> Result<Vec<String>> {
        Ok(self.lock_slot(id)?.plugin.program_names())
    }

    pub fn program(&self, id: PluginId) -> Result<usize> {
        Ok(self.lock_slot(id)?.plugin.program())
    }

    pub fn set_program(&self, id: PluginId, index: usize) -> Result<()> {
        let mut slot = self.lock_slot(id)?;
        check_index(index, slot.plugin.program_names().len(), "program")?;
        slot.plugin.set_program(index)
    }

    /// Plugins reading the recursion buffer of `channel` after `layer`.
    pub fn recursion_usage(&self, layer: usize, channel: usize) -> usize {
        self.recursion_usage
            .get(layer)
            .and_then(|l| l.get(channel))
            .copied()
            .unwrap_or(0)
    }

    /// A worker missed its deadline or vanished; the host no longer processes.
    pub fn is_hung(&self) -> bool {
        self.hung
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("layers", &self.config.layers)
            .field("channels", &self.config.channels)
            .field("threading", &self.config.threading)
            .field("plugins", &self.plugins.len())
            .field("hung", &self.hung)
            .finish()
    }
}

fn copy_padded(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0.0);
}

fn check_index(index: usize, count: usize, what: &str) -> Result<()> {
    if index >= count {
        return Err(PluginError::InvalidRouting(format!(
            "{what} {index} out of range ({count})"
        )));
    }
    Ok(())
}
