//! Scripted counter source for collector tests.

use crate::error::{Result, SourceError};
use crate::source::{CpuTimes, DiskCounters, MemoryStats, NetCounters, SnapshotSource};
use crate::tick::TickOptions;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fast ticks so the loop finishes quickly under real time.
pub fn fast_ticks() -> TickOptions {
    TickOptions {
        tick_interval: Duration::from_millis(5),
        read_timeout: Duration::from_secs(5),
    }
}

/// Returns queued results in order and cancels `stop` after the last one,
/// which pins the number of ticks a collector processes.
pub struct ScriptedSource {
    cpu: Mutex<VecDeque<Result<CpuTimes>>>,
    memory: Mutex<VecDeque<Result<MemoryStats>>>,
    disk: Mutex<VecDeque<Result<DiskCounters>>>,
    net: Mutex<VecDeque<Result<NetCounters>>>,
    requested_devices: Mutex<Vec<Vec<String>>>,
    reads: AtomicUsize,
    stop_after: usize,
    stop: CancellationToken,
}

impl ScriptedSource {
    pub fn new(stop_after: usize, stop: CancellationToken) -> Self {
        Self {
            cpu: Mutex::new(VecDeque::new()),
            memory: Mutex::new(VecDeque::new()),
            disk: Mutex::new(VecDeque::new()),
            net: Mutex::new(VecDeque::new()),
            requested_devices: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            stop_after,
            stop,
        }
    }

    pub fn with_cpu(self, script: Vec<Result<CpuTimes>>) -> Self {
        *self.cpu.lock().unwrap() = script.into();
        self
    }

    pub fn with_memory(self, script: Vec<Result<MemoryStats>>) -> Self {
        *self.memory.lock().unwrap() = script.into();
        self
    }

    pub fn with_disk(self, script: Vec<Result<DiskCounters>>) -> Self {
        *self.disk.lock().unwrap() = script.into();
        self
    }

    pub fn with_net(self, script: Vec<Result<NetCounters>>) -> Self {
        *self.net.lock().unwrap() = script.into();
        self
    }

    pub fn requested_devices(&self) -> Vec<Vec<String>> {
        self.requested_devices.lock().unwrap().clone()
    }

    fn next<T>(&self, queue: &Mutex<VecDeque<Result<T>>>) -> Result<T> {
        let result = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SourceError::Unsupported("exhausted script")));
        if self.reads.fetch_add(1, Ordering::SeqCst) + 1 >= self.stop_after {
            self.stop.cancel();
        }
        result
    }
}

impl SnapshotSource for ScriptedSource {
    fn cpu_times(&self) -> Result<CpuTimes> {
        self.next(&self.cpu)
    }

    fn memory(&self) -> Result<MemoryStats> {
        self.next(&self.memory)
    }

    fn disk_io(&self, devices: &[String]) -> Result<DiskCounters> {
        self.requested_devices
            .lock()
            .unwrap()
            .push(devices.to_vec());
        self.next(&self.disk)
    }

    fn net_io(&self) -> Result<NetCounters> {
        self.next(&self.net)
    }
}
