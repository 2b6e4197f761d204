//! Windows `CaptureDriver` implementation over WinDivert 2.x (spec §4.1).
//!
//! Unlike the teacher's SNIFF-only loop, handles opened here are meant for rewrite-and-reinject:
//! `recv` hands back owned bytes the worker may mutate in place, `send` reinjects them with a
//! (possibly flipped) direction, and checksum recomputation is left to WinDivert's own helper
//! per spec §4.4 step 6 — this module never touches a checksum field.

use std::sync::Arc;

use anyhow::{Context, Result};
use windivert::prelude::*;

use crate::capture::{CaptureDriver, Direction, Layer, OpenFlags, PacketMeta, QueueParam};
use crate::error::DivertError;

pub struct WinDivertDriver;

impl WinDivertDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WinDivertDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn to_windivert_flags(flags: OpenFlags) -> WinDivertFlags {
    let mut wd_flags = WinDivertFlags::new();
    if flags.drop_only {
        wd_flags = wd_flags.set_drop();
    }
    wd_flags
}

impl CaptureDriver for WinDivertDriver {
    type Handle = Arc<WinDivert<NetworkLayer>>;

    fn open(&self, filter: &str, layer: Layer, priority: i16, flags: OpenFlags) -> Result<Self::Handle> {
        let Layer::Network = layer;
        let wd = WinDivert::network(filter, priority, to_windivert_flags(flags))
            .with_context(|| format!("WinDivert::network open failed for filter: {filter}"))?;
        Ok(Arc::new(wd))
    }

    fn recv(&self, handle: &Self::Handle, buf: &mut [u8]) -> Result<(usize, PacketMeta)> {
        let packet = handle.recv(Some(buf)).context("WinDivert recv failed")?;
        let direction = if packet.address.outbound() { Direction::Outbound } else { Direction::Inbound };
        let meta = PacketMeta {
            direction,
            interface_index: packet.address.interface_index(),
            loopback: packet.address.loopback(),
        };
        Ok((packet.data.len(), meta))
    }

    fn send(&self, handle: &Self::Handle, buf: &[u8], meta: &PacketMeta) -> Result<()> {
        let mut address = WinDivertAddress::<NetworkLayer>::new();
        address.set_outbound(meta.direction == Direction::Outbound);
        address.set_interface_index(meta.interface_index);
        let packet = WinDivertPacket::<NetworkLayer> { address, data: buf.into() };
        handle.send(&packet).context("WinDivert send failed")?;
        Ok(())
    }

    fn close(&self, handle: Self::Handle) {
        if let Ok(wd) = Arc::try_unwrap(handle) {
            if let Err(e) = wd.close(CloseAction::Nothing) {
                tracing::warn!("WinDivert close failed: {e}");
            }
        }
    }

    fn set_param(&self, handle: &Self::Handle, param: QueueParam, value: u64) -> Result<()> {
        let wd_param = match param {
            QueueParam::Length => WinDivertParam::QueueLength,
            QueueParam::Time => WinDivertParam::QueueTime,
        };
        handle.set_param(wd_param, value).context("WinDivert set_param failed")?;
        Ok(())
    }

    fn check_filter(&self, filter: &str) -> std::result::Result<(), DivertError> {
        WinDivert::<NetworkLayer>::check_filter(filter, WinDivertLayer::Network).map_err(|e| {
            DivertError::FilterRejected { message: e.to_string(), position: 0 }
        })
    }
}
