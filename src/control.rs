//! Control plane (C5): one command API keyed by the opening owner (§4.5).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RW_MAX_SNAPLEN;
use crate::consumer::{is_valid_sampling_ratio, OwnerId};
use crate::error::{Error, Result};
use crate::event::EventType;
use crate::recorder::inject_marker;
use crate::registry::ConsumerRegistry;

/// Commands accepted by the control-plane API (§4.5). `cpu` selects which
/// of the owner's rings a ring-scoped command applies to.
#[derive(Debug, Clone, Copy)]
pub enum ControlCommand {
    EnableCapture,
    DisableCapture,
    EnableDroppingMode { ratio: u32 },
    DisableDroppingMode,
    SetSnaplen { n: usize },
    MaskZeroEvents,
    MaskSetEvent { idx: usize },
    MaskUnsetEvent { idx: usize },
    EnableDynamicSnaplen,
    DisableDynamicSnaplen,
    EnableSignalDeliver,
    DisableSignalDeliver,
    GetVtid { system_pid: u64 },
    GetVpid { system_pid: u64 },
    GetCurrentTid,
    GetCurrentPid,
}

/// Result of a control command that returns a value (`GET_*`); other
/// commands return `None` on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlReply(pub Option<u64>);

/// Looks up a system-wide pid's representation inside its own pid
/// namespace (`GET_VTID`/`GET_VPID`, §4.5). Real namespace introspection
/// is a kernel/OS facility this crate has no access to (§1 implicitly, via
/// the out-of-scope syscall/task tables); callers inject an implementation.
pub trait TaskDirectory {
    /// Thread id inside the task's own namespace, or `None` if the pid
    /// cannot be resolved (→ `EINVAL`).
    fn vtid_of(&self, system_pid: u64) -> Option<u64>;
    /// Thread group id (process id) inside the task's own namespace.
    fn vpid_of(&self, system_pid: u64) -> Option<u64>;
    /// The calling thread's own tid/pid (`GET_CURRENT_TID/PID`).
    fn current_tid(&self) -> u64;
    fn current_pid(&self) -> u64;
}

/// Applies one control command against `registry` for `owner`/`cpu`
/// (§4.5). Setup/control errors are returned, never silently dropped
/// (§7 "Setup failures").
pub fn apply(
    registry: &ConsumerRegistry,
    tasks: &dyn TaskDirectory,
    owner: OwnerId,
    cpu: usize,
    command: ControlCommand,
) -> Result<ControlReply> {
    let consumer = registry.lookup(owner).ok_or(Error::NotFound("no such consumer"))?;

    match command {
        ControlCommand::EnableCapture => {
            consumer.enable_capture(cpu)?;
            Ok(ControlReply(None))
        }
        ControlCommand::DisableCapture => {
            consumer.disable_capture(cpu)?;
            Ok(ControlReply(None))
        }
        ControlCommand::EnableDroppingMode { ratio } => {
            if !is_valid_sampling_ratio(ratio) {
                return Err(Error::InvalidArgument("sampling ratio must be 1,2,4,...,128"));
            }
            consumer.enable_dropping_mode(ratio)?;
            Ok(ControlReply(None))
        }
        ControlCommand::DisableDroppingMode => {
            consumer.disable_dropping_mode();
            // Push a synthetic SYSDIGEVENT_E so the reader observes the
            // state change (§4.5), matching the original's inline
            // getnstimeofday()-at-the-ioctl-site timestamping.
            if let Some(ring) = consumer.ring(cpu) {
                let ts_ns = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                inject_marker(ring, EventType::SysdigEventE, ts_ns, tasks.current_tid());
            }
            Ok(ControlReply(None))
        }
        ControlCommand::SetSnaplen { n } => {
            if n > RW_MAX_SNAPLEN {
                return Err(Error::InvalidArgument("snaplen exceeds RW_MAX_SNAPLEN"));
            }
            consumer.set_snaplen(n)?;
            Ok(ControlReply(None))
        }
        ControlCommand::MaskZeroEvents => {
            registry.mask_zero_events();
            Ok(ControlReply(None))
        }
        ControlCommand::MaskSetEvent { idx } => {
            registry.mask_set_event(idx)?;
            Ok(ControlReply(None))
        }
        ControlCommand::MaskUnsetEvent { idx } => {
            registry.mask_unset_event(idx)?;
            Ok(ControlReply(None))
        }
        ControlCommand::EnableDynamicSnaplen => {
            consumer.set_dynamic_snaplen(true);
            Ok(ControlReply(None))
        }
        ControlCommand::DisableDynamicSnaplen => {
            consumer.set_dynamic_snaplen(false);
            Ok(ControlReply(None))
        }
        ControlCommand::EnableSignalDeliver => {
            registry.enable_signal_deliver(owner)?;
            Ok(ControlReply(None))
        }
        ControlCommand::DisableSignalDeliver => {
            registry.disable_signal_deliver(owner)?;
            Ok(ControlReply(None))
        }
        ControlCommand::GetVtid { system_pid } => tasks
            .vtid_of(system_pid)
            .map(|v| ControlReply(Some(v)))
            .ok_or(Error::InvalidArgument("no such task")),
        ControlCommand::GetVpid { system_pid } => tasks
            .vpid_of(system_pid)
            .map(|v| ControlReply(Some(v)))
            .ok_or(Error::InvalidArgument("no such task")),
        ControlCommand::GetCurrentTid => Ok(ControlReply(Some(tasks.current_tid()))),
        ControlCommand::GetCurrentPid => Ok(ControlReply(Some(tasks.current_pid()))),
    }
}

/// Write-only events-injection device (minor `NCPU`, §6): writes are
/// consumed but unused, matching the original `ppe_write`'s `return
/// count;` body.
#[derive(Debug, Default)]
pub struct EventInjectionSink;

impl EventInjectionSink {
    #[must_use]
    pub fn write(&self, bytes: &[u8]) -> usize {
        bytes.len()
    }
}
