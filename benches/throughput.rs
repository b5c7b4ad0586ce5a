use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringcap::config::Config;
use ringcap::event::{EventDescriptor, EventMask, EventType, SyscallRegs};
use ringcap::filler::{AutoFiller, Filler, SyscallTable};
use ringcap::recorder::{Outcome, Recorder};
use ringcap::{Consumer, DropFlags};

const EVENTS: u64 = 1_000_000;

struct AutoTable;

impl SyscallTable for AutoTable {
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
        2
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

/// Single producer, no consumer draining: measures the record path's own
/// cost (mask check, space check, header write, auto-fill, commit) in the
/// steady state before the ring ever reports buffer-full.
fn bench_record_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    group.throughput(Throughput::Elements(EVENTS));

    group.bench_function("autofill_2_params", |b| {
        b.iter(|| {
            let consumer = Consumer::new(1, Config::default()).unwrap();
            consumer.open_ring(0).unwrap();
            consumer.enable_capture(0).unwrap();
            let recorder = Recorder::default();
            let table = AutoTable;
            let mask = EventMask::all();

            let mut committed = 0u64;
            for i in 0..EVENTS {
                let desc = EventDescriptor::Syscall { regs: SyscallRegs::default(), id: 3 };
                let outcome = recorder.record(
                    &consumer,
                    &table,
                    &mask,
                    EventType::ReadE,
                    DropFlags::USED,
                    i,
                    42,
                    0,
                    &desc,
                );
                if outcome == Outcome::Committed {
                    committed += 1;
                }
                // Simulate a consumer draining every page to keep the
                // ring from saturating within one iteration.
                if i % 256 == 0 {
                    let ring = consumer.ring(0).unwrap();
                    ring.stats().store_tail(ring.stats().load_head());
                }
            }
            black_box(committed);
        });
    });

    group.finish();
}

/// Same path but under ratio-4 sampling, to show the added cost of the
/// drop policy's phase bookkeeping.
fn bench_record_path_sampled(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_sampled");
    group.throughput(Throughput::Elements(EVENTS));

    for ratio in [2u32, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(ratio), &ratio, |b, &ratio| {
            b.iter(|| {
                let consumer = Consumer::new(1, Config::default()).unwrap();
                consumer.open_ring(0).unwrap();
                consumer.enable_capture(0).unwrap();
                consumer.enable_dropping_mode(ratio).unwrap();
                let recorder = Recorder::default();
                let table = AutoTable;
                let mask = EventMask::all();

                let mut committed = 0u64;
                for i in 0..EVENTS {
                    let desc = EventDescriptor::Syscall { regs: SyscallRegs::default(), id: 3 };
                    let outcome = recorder.record(
                        &consumer,
                        &table,
                        &mask,
                        EventType::ReadE,
                        DropFlags::USED,
                        i * 1000,
                        42,
                        0,
                        &desc,
                    );
                    if outcome == Outcome::Committed {
                        committed += 1;
                    }
                    if i % 256 == 0 {
                        let ring = consumer.ring(0).unwrap();
                        ring.stats().store_tail(ring.stats().load_head());
                    }
                }
                black_box(committed);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_path, bench_record_path_sampled);
criterion_main!(benches);
