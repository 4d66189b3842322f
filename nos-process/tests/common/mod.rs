//! Common test utilities
//!
//! Builds a process manager over an in-memory frame pool, a flat image
//! loader and a FIFO scheduler, with pids starting at 100.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nos_api::OpenFile;
use nos_memory_management::FrameTable;
use nos_process::{FifoScheduler, FlatImage, FlatImageLoader, ProcessConfig, ProcessManager};

/// Path of the image every harness registers
pub const PROG: &str = "/bin/prog";

/// Entry offset of [`PROG`]
pub const PROG_ENTRY: usize = 0x10;

/// A manager together with its collaborators
pub struct Harness {
    pub manager: ProcessManager,
    pub loader: Arc<FlatImageLoader>,
    pub scheduler: Arc<FifoScheduler>,
    pub frames: Arc<FrameTable>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(base_config(), 256)
    }

    pub fn with_config(config: ProcessConfig, frames: usize) -> Self {
        let frames = Arc::new(FrameTable::new(frames));
        let loader = Arc::new(FlatImageLoader::new());
        loader.register(PROG, FlatImage::new(vec![0x90; 64]).with_entry(PROG_ENTRY));
        let scheduler = Arc::new(FifoScheduler::new());
        let manager = ProcessManager::new(config, frames.clone(), loader.clone(), scheduler.clone())
            .expect("valid configuration");
        Self {
            manager,
            loader,
            scheduler,
            frames,
        }
    }

    /// Creates the root process and returns its pid
    pub fn root(&self) -> u32 {
        self.manager.bootstrap_root("init").expect("root process")
    }
}

/// Default configuration with pids starting at 100
pub fn base_config() -> ProcessConfig {
    ProcessConfig::default().with_pid_range(100, 32768)
}

/// Open file that counts descriptor closes
pub struct CountingFile {
    pub closes: AtomicUsize,
}

impl CountingFile {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closes: AtomicUsize::new(0),
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl OpenFile for CountingFile {
    fn name(&self) -> &str {
        "/dev/counting"
    }

    fn on_descriptor_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
