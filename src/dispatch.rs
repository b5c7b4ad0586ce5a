//! Probe dispatch (C4): the four/five kernel probe sites, the
//! `ProbeSet` registration contract, and fan-out to all consumers.

use crate::error::Result;
use crate::event::{DropFlags, EventDescriptor, EventType, SignalInfo, SyscallRegs};
use crate::filler::SyscallTable;
use crate::recorder::Recorder;
use crate::registry::ConsumerRegistry;

/// A task's classification bits, enough to check `PF_KTHREAD` (§4.4
/// `sched_process_exit`). A real kernel probe reads this off `task_struct`;
/// here it is passed in by the caller (a test harness or a real probe
/// shim living outside this crate).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFlags {
    pub is_kernel_thread: bool,
}

/// Registration contract for the kernel probe points (§4.2 open path step
/// 4, §4.4). Kept as a trait so the dispatch/registration *ordering* and
/// *unwind* discipline are under test without a real kernel to hook into —
/// implementations live outside this crate (§1).
pub trait ProbeSet {
    fn register_sys_exit(&self) -> Result<()>;
    fn register_sys_enter(&self) -> Result<()>;
    fn register_sched_process_exit(&self) -> Result<()>;
    fn register_sched_switch(&self) -> Result<()>;
    fn register_signal_deliver(&self) -> Result<()>;

    fn unregister_sys_exit(&self);
    fn unregister_sys_enter(&self);
    fn unregister_sched_process_exit(&self);
    fn unregister_sched_switch(&self);
    fn unregister_signal_deliver(&self);

    /// Registers `sys_exit, sys_enter, sched_process_exit` then optionally
    /// `sched_switch`, `signal_deliver`, unwinding in reverse order on any
    /// failure (§4.2 step 4 supplement).
    fn register_all(&self, with_sched_switch: bool, with_signal_deliver: bool) -> Result<()> {
        self.register_sys_exit()?;
        if let Err(e) = self.register_sys_enter() {
            self.unregister_sys_exit();
            return Err(e);
        }
        if let Err(e) = self.register_sched_process_exit() {
            self.unregister_sys_enter();
            self.unregister_sys_exit();
            return Err(e);
        }
        if with_sched_switch {
            if let Err(e) = self.register_sched_switch() {
                self.unregister_sched_process_exit();
                self.unregister_sys_enter();
                self.unregister_sys_exit();
                return Err(e);
            }
        }
        if with_signal_deliver {
            if let Err(e) = self.register_signal_deliver() {
                if with_sched_switch {
                    self.unregister_sched_switch();
                }
                self.unregister_sched_process_exit();
                self.unregister_sys_enter();
                self.unregister_sys_exit();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Exact reverse of [`ProbeSet::register_all`]'s order.
    fn unregister_all(&self, with_sched_switch: bool, with_signal_deliver: bool) {
        if with_signal_deliver {
            self.unregister_signal_deliver();
        }
        if with_sched_switch {
            self.unregister_sched_switch();
        }
        self.unregister_sched_process_exit();
        self.unregister_sys_enter();
        self.unregister_sys_exit();
    }
}

/// A `ProbeSet` that does nothing — the registry's default when no real
/// kernel hook is available (tests, the demo binary).
pub struct NullProbeSet;

impl ProbeSet for NullProbeSet {
    fn register_sys_exit(&self) -> Result<()> {
        Ok(())
    }
    fn register_sys_enter(&self) -> Result<()> {
        Ok(())
    }
    fn register_sched_process_exit(&self) -> Result<()> {
        Ok(())
    }
    fn register_sched_switch(&self) -> Result<()> {
        Ok(())
    }
    fn register_signal_deliver(&self) -> Result<()> {
        Ok(())
    }
    fn unregister_sys_exit(&self) {}
    fn unregister_sys_enter(&self) {}
    fn unregister_sched_process_exit(&self) {}
    fn unregister_sched_switch(&self) {}
    fn unregister_signal_deliver(&self) {}
}

/// `syscall_enter` probe (§4.4). Skips 32-bit compat tasks on a 64-bit
/// kernel (modeled as a caller-supplied bool, since compat-mode detection
/// is architecture/kernel-specific and out of this crate's reach).
pub fn syscall_enter(
    registry: &ConsumerRegistry,
    recorder: &Recorder,
    table: &dyn SyscallTable,
    regs: SyscallRegs,
    syscall_id: u32,
    is_32bit_compat: bool,
    ts_ns: u64,
    tid: u64,
    cpu: usize,
) {
    if is_32bit_compat {
        return;
    }
    let Some(mut event_type) = table.enter_event_type(syscall_id) else {
        return; // out of range: ignored
    };
    let mut flags = DropFlags::USED;
    if table.is_unused(syscall_id) {
        event_type = EventType::GenericE;
        flags = DropFlags::ALWAYS_DROP;
    }
    if table.socketcall_id() == Some(syscall_id) {
        // Forced used/never-drop; demultiplexed inside the recorder (§4.3
        // step 6) once the consumer's filler context is available.
        flags = DropFlags::USED | DropFlags::NEVER_DROP;
    }
    let desc = EventDescriptor::Syscall { regs, id: syscall_id };
    registry.record_all_consumers(recorder, table, event_type, flags, ts_ns, tid, cpu, &desc);
}

/// `syscall_exit` probe (§4.4), symmetric to `syscall_enter` using
/// `exit_event_type`.
pub fn syscall_exit(
    registry: &ConsumerRegistry,
    recorder: &Recorder,
    table: &dyn SyscallTable,
    regs: SyscallRegs,
    syscall_id: u32,
    is_32bit_compat: bool,
    ts_ns: u64,
    tid: u64,
    cpu: usize,
) {
    if is_32bit_compat {
        return;
    }
    let Some(mut event_type) = table.exit_event_type(syscall_id) else {
        return;
    };
    let mut flags = DropFlags::USED;
    if table.is_unused(syscall_id) {
        event_type = EventType::GenericX;
        flags = DropFlags::ALWAYS_DROP;
    }
    if table.socketcall_id() == Some(syscall_id) {
        flags = DropFlags::USED | DropFlags::NEVER_DROP;
    }
    let desc = EventDescriptor::Syscall { regs, id: syscall_id };
    registry.record_all_consumers(recorder, table, event_type, flags, ts_ns, tid, cpu, &desc);
}

/// `sched_process_exit` probe (§4.4): skips kernel threads.
pub fn sched_process_exit(
    registry: &ConsumerRegistry,
    recorder: &Recorder,
    table: &dyn SyscallTable,
    task: TaskFlags,
    ts_ns: u64,
    tid: u64,
    cpu: usize,
) {
    if task.is_kernel_thread {
        return;
    }
    let desc = EventDescriptor::ProcessExit;
    registry.record_all_consumers(
        recorder,
        table,
        EventType::Procexit1E,
        DropFlags::USED | DropFlags::NEVER_DROP,
        ts_ns,
        tid,
        cpu,
        &desc,
    );
}

/// `sched_switch` probe (§4.4).
pub fn sched_switch(
    registry: &ConsumerRegistry,
    recorder: &Recorder,
    table: &dyn SyscallTable,
    prev_pid: u64,
    next_pid: u64,
    ts_ns: u64,
    tid: u64,
    cpu: usize,
) {
    let desc = EventDescriptor::ContextSwitch { prev_pid, next_pid };
    registry.record_all_consumers(recorder, table, EventType::SchedSwitch6E, DropFlags::USED, ts_ns, tid, cpu, &desc);
}

/// `signal_deliver` probe (§4.4).
pub fn signal_deliver(
    registry: &ConsumerRegistry,
    recorder: &Recorder,
    table: &dyn SyscallTable,
    signo: u32,
    info: SignalInfo,
    ts_ns: u64,
    tid: u64,
    cpu: usize,
) {
    let desc = EventDescriptor::Signal { signo, info };
    registry.record_all_consumers(
        recorder,
        table,
        EventType::SignalDeliverE,
        DropFlags::USED | DropFlags::ALWAYS_DROP,
        ts_ns,
        tid,
        cpu,
        &desc,
    );
}
