//! Filler interface contract (C7) — external callbacks, consulted only at
//! their boundary. Filler *implementations* are explicitly out of scope
//! (§1); this module defines the contract they must satisfy and the
//! socketcall demultiplex logic, which belongs to the core (§4.7).

use crate::config::Config;
use crate::event::{EventType, SignalInfo, SyscallRegs};

/// Outcome a filler reports back to the recorder (§4.3 step 9, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerResult {
    /// `params_written` must equal `FillerArgs::nargs` (§7 "corrupt filler
    /// output"); the recorder debug-asserts this before committing.
    Success { arg_data_len: u32, params_written: u32 },
    BufferFull,
    InvalidUserMemory,
}

/// The arguments block handed to a filler callback (§4.7). Borrows the
/// write window the recorder already validated has enough space for the
/// header and length prefixes; the filler writes `nargs` 16-bit length
/// prefixes at the front of `buffer`, followed by that many payloads.
pub struct FillerArgs<'a> {
    pub buffer: &'a mut [u8],
    pub nargs: u32,
    pub regs: Option<SyscallRegs>,
    pub sched_prev: Option<u64>,
    pub sched_next: Option<u64>,
    pub signo: Option<u32>,
    pub spid: u64,
    pub dpid: u64,
    pub snaplen: usize,
    pub dynamic_snaplen: bool,
    pub str_storage: &'a mut [u8],
    pub socketcall_args: Option<[u64; MAX_SOCKETCALL_ARGS]>,
}

/// A filler callback: parses register/descriptor state and populates
/// parameters into `args.buffer`. Implementations live outside this crate
/// (§1); this trait is the contract boundary.
pub trait Filler {
    fn fill(&self, args: &mut FillerArgs<'_>) -> FillerResult;
}

/// Stand-in for a filler that just writes zero-length parameters —
/// exercises the `AUTOFILL` path (§4.3 step 8) in tests without requiring
/// a real parameter encoder.
pub struct AutoFiller;

impl Filler for AutoFiller {
    fn fill(&self, args: &mut FillerArgs<'_>) -> FillerResult {
        let needed = args.nargs as usize * 2;
        if args.buffer.len() < needed {
            return FillerResult::BufferFull;
        }
        for i in 0..args.nargs as usize {
            args.buffer[i * 2..i * 2 + 2].copy_from_slice(&0u16.to_le_bytes());
        }
        FillerResult::Success { arg_data_len: needed as u32, params_written: args.nargs }
    }
}

/// Read-only interface to the out-of-scope syscall table (`g_syscall_table`)
/// and event metadata table (`g_event_info`) (§1, §4.3 step 7).
pub trait SyscallTable {
    /// `None` means the syscall id is out of range and should be ignored
    /// (§4.4 `syscall_enter`).
    fn enter_event_type(&self, syscall_id: u32) -> Option<EventType>;
    fn exit_event_type(&self, syscall_id: u32) -> Option<EventType>;
    /// Whether the kernel marks this syscall "unused" — forces `GENERIC_E`
    /// with `ALWAYS_DROP` (§4.4).
    fn is_unused(&self, syscall_id: u32) -> bool;
    /// `g_event_info[type].nparams`.
    fn nparams(&self, event_type: EventType) -> u32;
    /// The architecture's `__NR_socketcall`, if this syscall table
    /// aggregates socket operations that way.
    fn socketcall_id(&self) -> Option<u32>;
    /// `g_event_info[type].filler_callback` — the filler to invoke for
    /// this event type.
    fn filler_for(&self, event_type: EventType) -> &dyn Filler;
    /// Whether `event_type` is marked `AUTOFILL` (§4.3 step 8): the core
    /// should invoke a generic auto-filler rather than the specific
    /// callback `filler_for` would otherwise return.
    fn is_autofill(&self, event_type: EventType) -> bool;
}

/// Derives `spid` from signal delivery state (§4.7):
/// - `SIGKILL` → `_kill._pid`, modeled here as `info.si_pid` directly.
/// - `SIGTERM/SIGHUP/SIGINT/SIGTSTP/SIGQUIT` → `si_pid` when
///   `si_code ∈ {SI_USER, SI_QUEUE}` or `si_code <= 0`.
/// - `SIGCHLD` → `_sigchld._pid`.
/// - `SIGRTMIN..=SIGRTMAX` → `_rt._pid`.
/// - else → 0.
#[must_use]
pub fn sender_pid(signo: u32, info: SignalInfo) -> u64 {
    const SIGHUP: u32 = 1;
    const SIGINT: u32 = 2;
    const SIGQUIT: u32 = 3;
    const SIGKILL: u32 = 9;
    const SIGTERM: u32 = 15;
    const SIGCHLD: u32 = 17;
    const SIGTSTP: u32 = 20;
    const SI_USER: i32 = 0;
    const SI_QUEUE: i32 = -1;
    const SIGRTMIN: u32 = 34;
    const SIGRTMAX: u32 = 64;

    match signo {
        SIGKILL => info.si_pid,
        SIGTERM | SIGHUP | SIGINT | SIGTSTP | SIGQUIT => {
            if info.si_code == SI_USER || info.si_code == SI_QUEUE || info.si_code <= 0 {
                info.si_pid
            } else {
                0
            }
        }
        SIGCHLD => info.si_pid,
        s if (SIGRTMIN..=SIGRTMAX).contains(&s) => info.si_pid,
        _ => 0,
    }
}

/// Fixed 21-entry `nas[]` table: argument count for each socketcall
/// sub-operation id (§4.7). Indices follow the Linux `net/socket.c`
/// ordering; unused slots are 0.
pub const MAX_SOCKETCALL_ARGS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SocketcallOp {
    Socket = 1,
    Bind = 2,
    Connect = 3,
    Listen = 4,
    Accept = 5,
    Getsockname = 6,
    Getpeername = 7,
    Socketpair = 8,
    Send = 9,
    Recv = 10,
    Sendto = 11,
    Recvfrom = 12,
    Shutdown = 13,
    Setsockopt = 14,
    Getsockopt = 15,
    Sendmsg = 16,
    Recvmsg = 17,
    Accept4 = 18,
    Recvmmsg = 19,
    Sendmmsg = 20,
}

/// `nas[]`: number of `unsigned long` arguments per sub-call id (index 0
/// unused, matching the original's 1-based `SYS_*` constants).
pub const SOCKETCALL_NARGS: [u8; 21] =
    [0, 3, 3, 3, 2, 3, 3, 3, 4, 4, 4, 6, 6, 2, 5, 5, 3, 3, 4, 5, 4];

impl SocketcallOp {
    #[must_use]
    pub const fn from_id(id: u64) -> Option<Self> {
        Some(match id {
            1 => Self::Socket,
            2 => Self::Bind,
            3 => Self::Connect,
            4 => Self::Listen,
            5 => Self::Accept,
            6 => Self::Getsockname,
            7 => Self::Getpeername,
            8 => Self::Socketpair,
            9 => Self::Send,
            10 => Self::Recv,
            11 => Self::Sendto,
            12 => Self::Recvfrom,
            13 => Self::Shutdown,
            14 => Self::Setsockopt,
            15 => Self::Getsockopt,
            16 => Self::Sendmsg,
            17 => Self::Recvmsg,
            18 => Self::Accept4,
            19 => Self::Recvmmsg,
            20 => Self::Sendmmsg,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn nargs(self) -> u8 {
        SOCKETCALL_NARGS[self as usize]
    }

    /// Maps a sub-call id to its specific enter event type, replacing the
    /// generic `GENERIC_E`/`GENERIC_X` pair assigned at the probe site
    /// (§4.3 step 6, §4.7). Only the subset named in `SPEC_FULL.md` §3 is
    /// demultiplexed to a concrete type; everything else demultiplexes to
    /// `GenericE` (i.e. is left unresolved, matching the original's
    /// fallback for sub-calls with no direct sysdig event).
    #[must_use]
    pub const fn enter_event_type(self) -> EventType {
        match self {
            Self::Socket => EventType::SocketSocketE,
            Self::Bind => EventType::SocketBindE,
            Self::Connect => EventType::SocketConnectE,
            Self::Listen => EventType::SocketListenE,
            Self::Accept => EventType::SocketAcceptE,
            Self::Accept4 => EventType::SocketAccept4E,
            _ => EventType::GenericE,
        }
    }
}

/// Demultiplexes an aggregated `socketcall` syscall (§4.7): `args[0]` is
/// the sub-call id, `args[1]` a user pointer to up to
/// [`MAX_SOCKETCALL_ARGS`] longs whose count is given by `nas[]`. Returns
/// the resolved enter event type and the number of argument words the
/// filler should copy from `user_args`.
#[must_use]
pub fn demultiplex_socketcall(regs: SyscallRegs) -> (EventType, u8) {
    let Some(op) = SocketcallOp::from_id(regs.args[0]) else {
        return (EventType::GenericE, 0);
    };
    (op.enter_event_type(), op.nargs())
}

/// Caps a filler's payload per parameter at the consumer's configured
/// snaplen (§3, §4.7), independent of `dynamic_snaplen` heuristics (out of
/// scope, §1): this crate only forwards the flag, it does not implement
/// the heuristic.
#[must_use]
pub fn effective_snaplen(consumer_snaplen: usize, config: &Config) -> usize {
    consumer_snaplen.min(crate::config::RW_MAX_SNAPLEN).min(config.alloc_size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigkill_uses_raw_pid() {
        let info = SignalInfo { si_pid: 42, si_code: 99 };
        assert_eq!(sender_pid(9, info), 42);
    }

    #[test]
    fn sigterm_requires_user_or_queue_or_nonpositive() {
        let user = SignalInfo { si_pid: 7, si_code: 0 };
        assert_eq!(sender_pid(15, user), 7);
        let kernel = SignalInfo { si_pid: 7, si_code: 5 };
        assert_eq!(sender_pid(15, kernel), 0);
    }

    #[test]
    fn unrelated_signal_yields_zero() {
        let info = SignalInfo { si_pid: 7, si_code: 0 };
        assert_eq!(sender_pid(11, info), 0); // SIGSEGV
    }

    #[test]
    fn socketcall_connect_demultiplexes() {
        let mut regs = SyscallRegs::default();
        regs.args[0] = 3; // SYS_CONNECT
        let (etype, nargs) = demultiplex_socketcall(regs);
        assert_eq!(etype, EventType::SocketConnectE);
        assert_eq!(nargs, 3);
    }

    #[test]
    fn socketcall_unknown_id_falls_back_to_generic() {
        let mut regs = SyscallRegs::default();
        regs.args[0] = 9999;
        let (etype, _) = demultiplex_socketcall(regs);
        assert_eq!(etype, EventType::GenericE);
    }

    #[test]
    fn autofiller_writes_zero_length_params() {
        let mut buf = [0xFFu8; 8];
        let mut scratch = [0u8; 8];
        let mut args = FillerArgs {
            buffer: &mut buf,
            nargs: 4,
            regs: None,
            sched_prev: None,
            sched_next: None,
            signo: None,
            spid: 0,
            dpid: 0,
            snaplen: 80,
            dynamic_snaplen: false,
            str_storage: &mut scratch,
            socketcall_args: None,
        };
        let result = AutoFiller.fill(&mut args);
        assert_eq!(result, FillerResult::Success { arg_data_len: 8, params_written: 4 });
        assert_eq!(&buf, &[0u8; 8]);
    }
}
