//! Event type enumeration, wire-format header, and the event mask (§3, §6).

use bitflags::bitflags;

/// Closed enumeration of event kinds. Covers every category §3/§4.4 name:
/// syscall enter/exit pairs (a representative subset — the full
/// syscall→event-type table is out of scope, §1), context switch, process
/// exit, signal delivery, buffer-drop markers, and a generic fallback.
///
/// Socketcall sub-operations (§4.7) get their own enter/exit pair so the
/// demultiplex contract has somewhere concrete to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventType {
    GenericE = 0,
    GenericX = 1,
    ReadE = 2,
    ReadX = 3,
    WriteE = 4,
    WriteX = 5,
    OpenE = 6,
    OpenX = 7,
    CloseE = 8,
    CloseX = 9,
    SocketSocketE = 10,
    SocketSocketX = 11,
    SocketBindE = 12,
    SocketBindX = 13,
    SocketConnectE = 14,
    SocketConnectX = 15,
    SocketListenE = 16,
    SocketListenX = 17,
    SocketAcceptE = 18,
    SocketAcceptX = 19,
    SocketAccept4E = 20,
    SocketAccept4X = 21,
    Procexit1E = 22,
    SchedSwitch6E = 23,
    SignalDeliverE = 24,
    DropE = 25,
    DropX = 26,
    /// `SYSDIGEVENT_E` — injected state-change marker (e.g. `DISABLE_DROPPING`).
    SysdigEventE = 27,
}

impl EventType {
    /// One past the highest discriminant; the length of an [`EventMask`].
    pub const COUNT: usize = 28;

    #[must_use]
    pub const fn from_index(idx: usize) -> Option<Self> {
        Some(match idx {
            0 => Self::GenericE,
            1 => Self::GenericX,
            2 => Self::ReadE,
            3 => Self::ReadX,
            4 => Self::WriteE,
            5 => Self::WriteX,
            6 => Self::OpenE,
            7 => Self::OpenX,
            8 => Self::CloseE,
            9 => Self::CloseX,
            10 => Self::SocketSocketE,
            11 => Self::SocketSocketX,
            12 => Self::SocketBindE,
            13 => Self::SocketBindX,
            14 => Self::SocketConnectE,
            15 => Self::SocketConnectX,
            16 => Self::SocketListenE,
            17 => Self::SocketListenX,
            18 => Self::SocketAcceptE,
            19 => Self::SocketAcceptX,
            20 => Self::SocketAccept4E,
            21 => Self::SocketAccept4X,
            22 => Self::Procexit1E,
            23 => Self::SchedSwitch6E,
            24 => Self::SignalDeliverE,
            25 => Self::DropE,
            26 => Self::DropX,
            27 => Self::SysdigEventE,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as u16 as usize
    }

    /// `GENERIC_E`/`GENERIC_X` pair used for unrecognized or policy-forced
    /// syscalls (§4.4).
    #[must_use]
    pub const fn is_generic(self) -> bool {
        matches!(self, Self::GenericE | Self::GenericX)
    }

    #[must_use]
    pub const fn is_drop_marker(self) -> bool {
        matches!(self, Self::DropE | Self::DropX)
    }

    /// The paired exit type for an enter type one past it in the
    /// enumeration, mirroring the original's `mapped_event + 1` convention
    /// (§4.7). Returns `None` for types without an enter/exit pairing.
    #[must_use]
    pub const fn exit_pair(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

bitflags! {
    /// Per-event delivery flags attached at the probe site (§4.4, §4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DropFlags: u8 {
        /// Subject to the sampling duty cycle.
        const USED        = 0b0000_0001;
        /// Never subject to drop, regardless of mode (mutually exclusive
        /// with `ALWAYS_DROP`).
        const NEVER_DROP  = 0b0000_0010;
        /// Always dropped when dropping mode is enabled, irrespective of
        /// the sampling phase.
        const ALWAYS_DROP = 0b0000_0100;
        /// Core should invoke the generic auto-filler rather than a
        /// per-event callback.
        const AUTOFILL    = 0b0000_1000;
    }
}

impl DropFlags {
    /// `spec.md` §4.5: `NEVER_DROP` and `ALWAYS_DROP` are asserted mutually
    /// exclusive.
    #[must_use]
    pub const fn is_consistent(self) -> bool {
        !(self.contains(Self::NEVER_DROP) && self.contains(Self::ALWAYS_DROP))
    }
}

/// Wire-format event header (§6): `ts:u64 LE, tid:u64 LE, len:u32 LE,
/// type:u16 LE, nparams:u32 LE`.
///
/// `tid` is widened to 64 bits relative to the originating kernel's 32-bit
/// `pid_t` so the struct stays a stable, alignment-friendly packed layout
/// across the user/kernel boundary (see DESIGN.md).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub ts: u64,
    pub tid: u64,
    pub len: u32,
    pub event_type: u16,
    pub nparams: u32,
}

/// Bytes occupied by `EventHeader` on the wire. Computed field-by-field
/// (rather than `size_of`) so padding added by the host ABI never silently
/// changes the framing contract (P1).
pub const HEADER_SIZE: usize = 8 + 8 + 4 + 2 + 4;

impl EventHeader {
    #[must_use]
    pub const fn new(ts: u64, tid: u64, event_type: EventType, nparams: u32) -> Self {
        Self { ts, tid, len: 0, event_type: event_type as u16, nparams }
    }

    /// Serializes the header in the declared little-endian wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.ts.to_le_bytes());
        out[8..16].copy_from_slice(&self.tid.to_le_bytes());
        out[16..20].copy_from_slice(&self.len.to_le_bytes());
        out[20..22].copy_from_slice(&self.event_type.to_le_bytes());
        out[22..26].copy_from_slice(&self.nparams.to_le_bytes());
        out
    }
}

/// Global bitmap over the event-type enumeration (§3). `DROP_E`/`DROP_X`
/// are forced on at construction and `mask_zero_events` (§4.5) preserves
/// that invariant.
#[derive(Debug, Clone, Copy)]
pub struct EventMask {
    bits: [bool; EventType::COUNT],
}

impl EventMask {
    pub const LEN: usize = EventType::COUNT;

    /// All event types enabled, including the forced-on drop markers.
    #[must_use]
    pub fn all() -> Self {
        Self { bits: [true; Self::LEN] }
    }

    /// Every type disabled except `DROP_E`/`DROP_X`, matching
    /// `MASK_ZERO_EVENTS` (§4.5).
    #[must_use]
    pub fn zeroed() -> Self {
        let mut mask = Self { bits: [false; Self::LEN] };
        mask.bits[EventType::DropE.index()] = true;
        mask.bits[EventType::DropX.index()] = true;
        mask
    }

    #[must_use]
    pub fn is_set(&self, t: EventType) -> bool {
        self.bits[t.index()]
    }

    /// `MASK_SET_EVENT`. Bounds-checked against [`EventMask::LEN`] (both
    /// set and unset share one bound here — see DESIGN.md Open Question).
    pub fn set(&mut self, idx: usize) -> bool {
        if idx >= Self::LEN {
            return false;
        }
        self.bits[idx] = true;
        true
    }

    /// `MASK_UNSET_EVENT`. Refuses to clear the forced-on drop markers.
    pub fn unset(&mut self, idx: usize) -> bool {
        if idx >= Self::LEN {
            return false;
        }
        if idx == EventType::DropE.index() || idx == EventType::DropX.index() {
            return true;
        }
        self.bits[idx] = false;
        true
    }

    /// `MASK_ZERO_EVENTS`.
    pub fn zero(&mut self) {
        *self = Self::zeroed();
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Transient, stack-resident descriptor built at a probe site (§3, §4.4).
#[derive(Debug, Clone, Copy)]
pub enum EventDescriptor {
    Syscall { regs: SyscallRegs, id: u32 },
    ContextSwitch { prev_pid: u64, next_pid: u64 },
    Signal { signo: u32, info: SignalInfo },
    /// `sched_process_exit` carries no extra register state beyond the
    /// exiting task's tid, already passed alongside the descriptor; kept
    /// as its own variant (rather than overloading `ContextSwitch`) so
    /// `n_context_switches` accounting (§4.3 step 4) stays correct.
    ProcessExit,
}

/// Minimal register-state stand-in. A real syscall filler would read full
/// architecture registers; the core only needs enough to demultiplex
/// socketcall (§4.7) and to hand the rest opaquely to the filler contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallRegs {
    pub args: [u64; 6],
}

/// `siginfo_t`-derived fields the core needs to resolve `spid` (§4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalInfo {
    pub si_pid: u64,
    pub si_code: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_default_allows_everything() {
        let mask = EventMask::default();
        assert!(mask.is_set(EventType::ReadE));
        assert!(mask.is_set(EventType::DropE));
    }

    #[test]
    fn zeroed_mask_keeps_drop_markers() {
        let mask = EventMask::zeroed();
        assert!(!mask.is_set(EventType::ReadE));
        assert!(mask.is_set(EventType::DropE));
        assert!(mask.is_set(EventType::DropX));
    }

    #[test]
    fn unset_refuses_drop_markers() {
        let mut mask = EventMask::all();
        mask.unset(EventType::DropE.index());
        assert!(mask.is_set(EventType::DropE));
    }

    #[test]
    fn set_unset_out_of_bounds_rejected() {
        let mut mask = EventMask::all();
        assert!(!mask.set(EventMask::LEN));
        assert!(!mask.unset(EventMask::LEN));
    }

    #[test]
    fn drop_flags_mutual_exclusion() {
        let bad = DropFlags::NEVER_DROP | DropFlags::ALWAYS_DROP;
        assert!(!bad.is_consistent());
        assert!(DropFlags::NEVER_DROP.is_consistent());
    }

    #[test]
    fn header_round_trips_field_order() {
        let hdr = EventHeader::new(12, 34, EventType::ReadE, 2);
        let bytes = hdr.to_bytes();
        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), 12);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 34);
    }

    #[test]
    fn exit_pair_is_next_index() {
        assert_eq!(EventType::ReadE.exit_pair(), Some(EventType::ReadX));
    }
}
