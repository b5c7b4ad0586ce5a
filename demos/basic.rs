//! Minimal end-to-end walkthrough: open a consumer, enable capture, drive a
//! couple of probe sites, and read the per-ring stats back out.
//!
//! Run with `cargo run --example basic` once this crate is vendored with its
//! dependencies available.

use ringcap::config::Config;
use ringcap::dispatch::{self, NullProbeSet};
use ringcap::event::{EventType, SyscallRegs};
use ringcap::filler::{AutoFiller, Filler, SyscallTable};
use ringcap::recorder::Recorder;
use ringcap::registry::ConsumerRegistry;
use ringcap::{ControlCommand, TaskDirectory};

/// A toy syscall table: everything is `read`-shaped, one parameter,
/// auto-filled. A real deployment plugs in the kernel's actual
/// `g_syscall_table`/`g_event_info` here.
struct ToyTable;

impl SyscallTable for ToyTable {
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
        None
    }
    fn filler_for(&self, _t: EventType) -> &dyn Filler {
        &AutoFiller
    }
    fn is_autofill(&self, _t: EventType) -> bool {
        true
    }
}

/// Host task lookups this demo doesn't actually have — stands in for the
/// kernel's pid/namespace tables.
struct DemoTasks;

impl TaskDirectory for DemoTasks {
    fn vtid_of(&self, system_pid: u64) -> Option<u64> {
        Some(system_pid)
    }
    fn vpid_of(&self, system_pid: u64) -> Option<u64> {
        Some(system_pid)
    }
    fn current_tid(&self) -> u64 {
        std::process::id() as u64
    }
    fn current_pid(&self) -> u64 {
        std::process::id() as u64
    }
}

fn main() {
    env_logger::init();

    let config = Config::new(1024 * 1024, 1, 5);
    let registry = ConsumerRegistry::new(config, Box::new(NullProbeSet));
    let owner = 1u64;

    registry.open(owner, 0).expect("open ring 0 for this consumer");
    ringcap::apply(&registry, &DemoTasks, owner, 0, ControlCommand::EnableCapture).expect("enable capture");

    let recorder = Recorder::default();
    let table = ToyTable;

    println!("driving a read(2) enter/exit pair through syscall dispatch...");
    dispatch::syscall_enter(&registry, &recorder, &table, SyscallRegs::default(), 0, false, 0, 1234, 0);
    dispatch::syscall_exit(&registry, &recorder, &table, SyscallRegs::default(), 0, false, 1, 1234, 0);

    let consumer = registry.lookup(owner).expect("consumer still registered");
    let ring = consumer.ring(0).expect("ring 0 exists");
    let stats = ring.stats();
    println!(
        "n_evts={} n_drops_buffer={} n_drops_pf={} n_preemptions={}",
        stats.n_evts.load(std::sync::atomic::Ordering::Relaxed),
        stats.n_drops_buffer.load(std::sync::atomic::Ordering::Relaxed),
        stats.n_drops_pf.load(std::sync::atomic::Ordering::Relaxed),
        stats.n_preemptions.load(std::sync::atomic::Ordering::Relaxed),
    );

    registry.close(owner, 0).expect("close ring 0");
    println!("consumers remaining: {}", registry.num_consumers());
}
