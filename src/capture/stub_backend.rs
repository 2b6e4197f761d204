//! Non-Windows `CaptureDriver` stand-in. The kernel-assisted redirect this engine performs has
//! no macOS/Linux equivalent in scope here (the teacher's `pf_backend` solved a narrower
//! bandwidth-shaping problem, not packet diversion); every operation reports
//! `DivertError::UnsupportedPlatform` so `EngineController::start()` fails cleanly instead of
//! silently no-opping.

use crate::capture::{CaptureDriver, Layer, OpenFlags, PacketMeta, QueueParam};
use crate::error::DivertError;

pub struct StubDriver;

impl StubDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDriver for StubDriver {
    type Handle = ();

    fn open(&self, _filter: &str, _layer: Layer, _priority: i16, _flags: OpenFlags) -> anyhow::Result<()> {
        Err(DivertError::UnsupportedPlatform.into())
    }

    fn recv(&self, _handle: &(), _buf: &mut [u8]) -> anyhow::Result<(usize, PacketMeta)> {
        Err(DivertError::UnsupportedPlatform.into())
    }

    fn send(&self, _handle: &(), _buf: &[u8], _meta: &PacketMeta) -> anyhow::Result<()> {
        Err(DivertError::UnsupportedPlatform.into())
    }

    fn close(&self, _handle: ()) {}

    fn set_param(&self, _handle: &(), _param: QueueParam, _value: u64) -> anyhow::Result<()> {
        Err(DivertError::UnsupportedPlatform.into())
    }

    fn check_filter(&self, _filter: &str) -> Result<(), DivertError> {
        Err(DivertError::UnsupportedPlatform)
    }
}
