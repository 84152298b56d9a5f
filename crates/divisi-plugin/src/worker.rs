//! Per-plugin processing threads.

use crate::plugin::AudioPlugin;
use crate::{PluginError, PluginId, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thread_priority::ThreadPriority;

/// A plugin together with the buffers it reads and writes.
pub(crate) struct PluginSlot {
    pub(crate) plugin: Box<dyn AudioPlugin>,
    pub(crate) name: String,
    pub(crate) inputs: Vec<Vec<f32>>,
    pub(crate) outputs: Vec<Vec<f32>>,
}

impl PluginSlot {
    pub(crate) fn new(plugin: Box<dyn AudioPlugin>, inputs: usize, outputs: usize, block_size: usize) -> Self {
        let name = plugin.info().name.clone();
        Self {
            plugin,
            name,
            inputs: vec![vec![0.0; block_size]; inputs],
            outputs: vec![vec![0.0; block_size]; outputs],
        }
    }

    /// Size every buffer to `frames`. Allocates only past the configured block size.
    pub(crate) fn prepare(&mut self, frames: usize) {
        for buffer in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            buffer.resize(frames, 0.0);
        }
    }

    pub(crate) fn run(&mut self) -> Result<()> {
        for output in self.outputs.iter_mut() {
            output.fill(0.0);
        }
        let result = self.plugin.process(&self.inputs, &mut self.outputs);
        if result.is_err() {
            for output in self.outputs.iter_mut() {
                output.fill(0.0);
            }
        }
        result.map_err(|e| PluginError::Process {
            plugin: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

pub(crate) type SharedSlot = Arc<Mutex<PluginSlot>>;

pub(crate) enum WorkerJob {
    Process { cycle: u64 },
    Stop,
}

pub(crate) struct WorkerDone {
    pub(crate) cycle: u64,
    pub(crate) result: Result<()>,
}

/// Thread that runs one plugin whenever its layer is dispatched.
pub(crate) struct PluginWorker {
    jobs: Sender<WorkerJob>,
    handle: Option<JoinHandle<()>>,
}

impl PluginWorker {
    pub(crate) fn spawn(id: PluginId, slot: SharedSlot, done: Sender<WorkerDone>) -> std::io::Result<Self> {
        let (jobs, rx) = bounded(4);
        let handle = thread::Builder::new()
            .name(format!("divisi-plugin-{id}"))
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                worker_loop(slot, rx, done);
            })?;
        Ok(Self {
            jobs,
            handle: Some(handle),
        })
    }

    pub(crate) fn dispatch(&self, cycle: u64) -> bool {
        self.jobs.try_send(WorkerJob::Process { cycle }).is_ok()
    }

    /// Stop the thread. A hung worker is detached instead of joined.
    pub(crate) fn shutdown(&mut self, join: bool) {
        let _ = self.jobs.try_send(WorkerJob::Stop);
        if let Some(handle) = self.handle.take() {
            if join {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(slot: SharedSlot, jobs: Receiver<WorkerJob>, done: Sender<WorkerDone>) {
    while let Ok(job) = jobs.recv() {
        match job {
            WorkerJob::Process { cycle } => {
                let result = slot.lock().run();
                if done.send(WorkerDone { cycle, result }).is_err() {
                    break;
                }
            }
            WorkerJob::Stop => break,
        }
    }
}
