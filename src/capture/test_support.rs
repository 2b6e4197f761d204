//! An in-memory `CaptureDriver` used by tests elsewhere in the crate so they don't depend on a
//! real platform backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::capture::{CaptureDriver, Layer, OpenFlags, PacketMeta, QueueParam};
use crate::error::DivertError;

pub struct FakeDriver {
    fail_open: bool,
    fail_check_filter: bool,
    next_handle: AtomicU32,
    queue: Mutex<Vec<(Vec<u8>, PacketMeta)>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            fail_open: false,
            fail_check_filter: false,
            next_handle: AtomicU32::new(1),
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            fail_check_filter: false,
            next_handle: AtomicU32::new(1),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Rejects every `check_filter` call, simulating a malformed filter expression.
    pub fn failing_check_filter() -> Self {
        Self {
            fail_open: false,
            fail_check_filter: true,
            next_handle: AtomicU32::new(1),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Queues a packet so the next `recv` returns it.
    pub fn push_recv(&self, data: Vec<u8>, meta: PacketMeta) {
        self.queue.lock().unwrap().push((data, meta));
    }

    pub fn sent_packets(&self) -> Vec<(Vec<u8>, PacketMeta)> {
        self.queue.lock().unwrap().clone()
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDriver for FakeDriver {
    type Handle = u32;

    fn open(&self, _filter: &str, _layer: Layer, _priority: i16, _flags: OpenFlags) -> anyhow::Result<u32> {
        if self.fail_open {
            anyhow::bail!("fake driver configured to fail open");
        }
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn recv(&self, _handle: &u32, buf: &mut [u8]) -> anyhow::Result<(usize, PacketMeta)> {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            anyhow::bail!("no queued packets");
        }
        let (data, meta) = queue.remove(0);
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, meta))
    }

    fn send(&self, _handle: &u32, buf: &[u8], meta: &PacketMeta) -> anyhow::Result<()> {
        self.queue.lock().unwrap().push((buf.to_vec(), *meta));
        Ok(())
    }

    fn close(&self, _handle: u32) {}

    fn set_param(&self, _handle: &u32, _param: QueueParam, _value: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn check_filter(&self, filter: &str) -> Result<(), DivertError> {
        if filter.is_empty() {
            return Err(DivertError::FilterRejected { message: "empty filter".into(), position: 0 });
        }
        Ok(())
    }
}
