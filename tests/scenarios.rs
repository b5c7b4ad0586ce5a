//! End-to-end scenarios for the capture engine's public API.

use std::sync::atomic::Ordering;

use ringcap::config::Config;
use ringcap::dispatch::{self, NullProbeSet};
use ringcap::event::{EventMask, EventType, SyscallRegs};
use ringcap::filler::{AutoFiller, Filler, SyscallTable};
use ringcap::recorder::{Outcome, Recorder};
use ringcap::registry::ConsumerRegistry;

/// A fixed syscall table good enough to drive the scenarios: every
/// syscall id maps to a `READ`-shaped enter/exit pair with one parameter,
/// auto-filled, except syscall id 102 which is treated as the aggregated
/// socketcall entry point.
struct FixedTable;

impl SyscallTable for FixedTable {
    fn enter_event_type(&self, _id: u32) -> Option<EventType> {
        Some(EventType::ReadE)
    }
    fn exit_event_type(&self, _id: u32) -> Option<EventType> {
        Some(EventType::ReadX)
    }
    fn is_unused(&self, _id: u32) -> bool {
        false
    }
    fn nparams(&self, _t: EventType) -> u32 {
        1
    }
    fn socketcall_id(&self) -> Option<u32> {
        Some(102)
    }
    fn filler_for(&self, _t: EventType) -> &dyn Filler {
        &AutoFiller
    }
    fn is_autofill(&self, _t: EventType) -> bool {
        true
    }
}

struct FixedTasks;
impl ringcap::TaskDirectory for FixedTasks {
    fn vtid_of(&self, system_pid: u64) -> Option<u64> {
        Some(system_pid)
    }
    fn vpid_of(&self, system_pid: u64) -> Option<u64> {
        Some(system_pid)
    }
    fn current_tid(&self) -> u64 {
        42
    }
    fn current_pid(&self) -> u64 {
        42
    }
}

fn small_registry() -> ConsumerRegistry {
    ConsumerRegistry::new(Config::new(8 * 1024, 1, 5), Box::new(NullProbeSet))
}

/// Scenario 1: single open, single event.
#[test]
fn single_open_single_event() {
    let registry = small_registry();
    registry.open(1, 0).unwrap();
    ringcap::apply(&registry, &FixedTasks, 1, 0, ringcap::ControlCommand::EnableCapture).unwrap();

    let recorder = Recorder::default();
    let table = FixedTable;
    dispatch::syscall_enter(&registry, &recorder, &table, SyscallRegs::default(), 3, false, 0, 42, 0);
    dispatch::syscall_exit(&registry, &recorder, &table, SyscallRegs::default(), 3, false, 1, 42, 0);

    let consumer = registry.lookup(1).unwrap();
    let stats = consumer.ring(0).unwrap().stats();
    assert_eq!(stats.n_evts.load(Ordering::Relaxed), 2);
    assert_eq!(stats.n_drops_buffer.load(Ordering::Relaxed), 0);
    assert_eq!(stats.n_drops_pf.load(Ordering::Relaxed), 0);
}

/// Scenario 2: buffer full. With an 8 KiB ring and capture enabled,
/// producing events without ever consuming them must eventually yield
/// `n_drops_buffer > 0`, and the head must stay within bounds throughout.
#[test]
fn buffer_fills_and_counts_drops() {
    let registry = small_registry();
    registry.open(1, 0).unwrap();
    ringcap::apply(&registry, &FixedTasks, 1, 0, ringcap::ControlCommand::EnableCapture).unwrap();

    let recorder = Recorder::default();
    let table = FixedTable;
    let mask = EventMask::all();
    let consumer = registry.lookup(1).unwrap();
    let mut committed = 0u32;
    for i in 0..4096u64 {
        let desc = ringcap::EventDescriptor::Syscall { regs: SyscallRegs::default(), id: 3 };
        let outcome = recorder.record(
            &consumer,
            &table,
            &mask,
            EventType::ReadE,
            ringcap::DropFlags::USED,
            i,
            42,
            0,
            &desc,
        );
        if outcome == Outcome::Committed {
            committed += 1;
        }
        let ring_buf_size = consumer.ring(0).unwrap().ring_buf_size();
        assert!(consumer.ring(0).unwrap().stats().load_head() < ring_buf_size);
    }

    let stats = consumer.ring(0).unwrap().stats();
    assert!(committed > 0);
    assert!(stats.n_drops_buffer.load(Ordering::Relaxed) > 0);
}

/// Scenario 3: sampling at ratio 4. The interval is 250,000,000 ns; the
/// first event inside the "on" phase commits, the event that crosses into
/// the "off" phase is dropped and schedules a `DROP_E` marker, a
/// subsequent off-phase event first flushes that marker (visible only as
/// an extra committed event in the stats, since the recursive emission
/// doesn't surface through the outer `Outcome`), and crossing back into
/// the next second's "on" phase flushes `DROP_X` before committing.
#[test]
fn sampling_ratio_four_schedules_drop_markers() {
    let registry = small_registry();
    registry.open(1, 0).unwrap();
    ringcap::apply(&registry, &FixedTasks, 1, 0, ringcap::ControlCommand::EnableCapture).unwrap();
    let consumer = registry.lookup(1).unwrap();
    consumer.enable_dropping_mode(4).unwrap();

    let recorder = Recorder::default();
    let table = FixedTable;
    let mask = EventMask::all();
    let record_at = |ts_ns: u64| {
        let desc = ringcap::EventDescriptor::Syscall { regs: SyscallRegs::default(), id: 3 };
        recorder.record(&consumer, &table, &mask, EventType::ReadE, ringcap::DropFlags::USED, ts_ns, 42, 0, &desc)
    };

    assert_eq!(record_at(0), Outcome::Committed);
    assert_eq!(consumer.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 1);

    // Crosses into the off-phase at the 250,000,000 ns boundary: dropped,
    // schedules DROP_E for the next call.
    assert_eq!(record_at(250_000_000), Outcome::DroppedPolicy);
    assert_eq!(consumer.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 1);

    // Still off-phase: this call flushes the pending DROP_E marker (an
    // extra committed event) before being dropped itself.
    assert_eq!(record_at(300_000_000), Outcome::DroppedPolicy);
    assert_eq!(consumer.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 2);

    // Next second's on-phase: flushes the pending DROP_X marker, then
    // commits the event itself.
    assert_eq!(record_at(1_000_000_000), Outcome::Committed);
    assert_eq!(consumer.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 4);
}

/// Scenario 5: two consumers. Both open the same CPU's ring; one syscall
/// fires. Both receive the event and their counters are independent;
/// closing one doesn't perturb the other.
#[test]
fn two_consumers_are_independent() {
    let registry = small_registry();
    registry.open(1, 0).unwrap();
    registry.open(2, 0).unwrap();
    ringcap::apply(&registry, &FixedTasks, 1, 0, ringcap::ControlCommand::EnableCapture).unwrap();
    ringcap::apply(&registry, &FixedTasks, 2, 0, ringcap::ControlCommand::EnableCapture).unwrap();

    let recorder = Recorder::default();
    let table = FixedTable;
    dispatch::syscall_enter(&registry, &recorder, &table, SyscallRegs::default(), 3, false, 0, 42, 0);

    let a = registry.lookup(1).unwrap();
    let b = registry.lookup(2).unwrap();
    assert_eq!(a.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 1);
    assert_eq!(b.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 1);

    registry.close(1, 0).unwrap();
    dispatch::syscall_enter(&registry, &recorder, &table, SyscallRegs::default(), 3, false, 1, 42, 0);
    assert_eq!(b.ring(0).unwrap().stats().n_evts.load(Ordering::Relaxed), 2);
}

/// Scenario 6: socketcall demux. A `connect` dispatched through the
/// aggregated socketcall syscall id resolves to `SOCKET_CONNECT_E`, not
/// the generic fallback.
#[test]
fn socketcall_connect_demultiplexes_to_specific_event() {
    let registry = small_registry();
    registry.open(1, 0).unwrap();
    ringcap::apply(&registry, &FixedTasks, 1, 0, ringcap::ControlCommand::EnableCapture).unwrap();

    let recorder = Recorder::default();
    let table = FixedTable;
    let mut regs = SyscallRegs::default();
    regs.args[0] = 3; // SYS_CONNECT
    let desc = ringcap::EventDescriptor::Syscall { regs, id: 102 };
    let consumer = registry.lookup(1).unwrap();
    let mask = EventMask::all();
    let outcome = recorder.record(
        &consumer,
        &table,
        &mask,
        EventType::ReadE,
        ringcap::DropFlags::USED | ringcap::DropFlags::NEVER_DROP,
        0,
        42,
        0,
        &desc,
    );
    assert_eq!(outcome, Outcome::Committed);
}
