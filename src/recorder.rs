//! Event recorder (C3): space check, header, filler invocation, commit,
//! preempt gate. `record` is the hot path (§4.3) — never blocks, never
//! allocates, never takes a sleeping lock (§5).

use std::sync::atomic::Ordering;

use crate::consumer::{Consumer, DropMarkerState, Mode};
use crate::event::{DropFlags, EventDescriptor, EventHeader, EventType, HEADER_SIZE};
use crate::filler::{demultiplex_socketcall, effective_snaplen, sender_pid, FillerArgs, FillerResult, SyscallTable};
use crate::invariants::debug_assert_filler_consumed_all_params;

/// Outcome of one `record` call (§4.3), used by tests and the end-to-end
/// scenarios in §8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    DroppedPolicy,
    DroppedBuffer,
    DroppedPageFault,
    NotCapturing,
    PreemptCollision,
}

/// Stateless recorder: all mutable state lives on the `Consumer`/`Ring` it
/// is given, so one `Recorder` can serve every consumer and CPU.
#[derive(Debug, Default)]
pub struct Recorder;

impl Recorder {
    /// `record(consumer, event_type, drop_flags, ts, descriptor) →
    /// {committed, dropped_buffer, dropped_policy}` (§4.3).
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        consumer: &Consumer,
        table: &dyn SyscallTable,
        mask: &crate::event::EventMask,
        mut event_type: EventType,
        flags: DropFlags,
        ts_ns: u64,
        tid: u64,
        cpu: usize,
        desc: &EventDescriptor,
    ) -> Outcome {
        debug_assert!(flags.is_consistent(), "NEVER_DROP and ALWAYS_DROP are mutually exclusive");

        // Step 1: global event mask (§4.3 step 1, P8).
        if !mask.is_set(event_type) {
            return Outcome::DroppedPolicy;
        }

        let mode = consumer.mode();

        // Step 2: deferred drop markers, then the sampling policy (§4.3
        // step 2). Drop markers never recurse into this block themselves.
        if !event_type.is_drop_marker() {
            if consumer.drop_state.need_drop_e.swap(false, Ordering::AcqRel) {
                self.record(
                    consumer,
                    table,
                    mask,
                    EventType::DropE,
                    DropFlags::USED | DropFlags::NEVER_DROP,
                    ts_ns,
                    tid,
                    cpu,
                    &EventDescriptor::ProcessExit,
                );
            }
            if consumer.drop_state.need_drop_x.swap(false, Ordering::AcqRel) {
                self.record(
                    consumer,
                    table,
                    mask,
                    EventType::DropX,
                    DropFlags::USED | DropFlags::NEVER_DROP,
                    ts_ns,
                    tid,
                    cpu,
                    &EventDescriptor::ProcessExit,
                );
            }
            if should_drop(&mode, &consumer.drop_state, flags, ts_ns) {
                return Outcome::DroppedPolicy;
            }
        }

        // Step 3: load the per-CPU ring, check capture_enabled.
        let Some(ring) = consumer.ring(cpu) else {
            return Outcome::NotCapturing;
        };
        if !ring.capture_enabled() {
            return Outcome::NotCapturing;
        }

        // Step 4: n_evts is counted for every attempted record, even one
        // that collides on the preempt gate below (matches the original
        // driver's unconditional `ring_info->n_evts++` ahead of its own
        // gate check).
        ring.stats().n_evts.fetch_add(1, Ordering::Relaxed);
        if matches!(desc, EventDescriptor::ContextSwitch { .. }) {
            ring.stats().n_context_switches.fetch_add(1, Ordering::Relaxed);
        }

        // Step 5: preempt gate (P4).
        if !ring.preempt_enter() {
            ring.stats().n_preemptions.fetch_add(1, Ordering::Relaxed);
            return Outcome::PreemptCollision;
        }

        let outcome = self.record_locked(ring, consumer, table, &mode, event_type, ts_ns, tid, desc);

        ring.preempt_exit();
        ring.maybe_log_summary();
        outcome
    }

    /// Steps 6-10: everything that happens while the preempt gate is
    /// held for this ring.
    #[allow(clippy::too_many_arguments)]
    fn record_locked(
        &self,
        ring: &crate::ring::Ring,
        consumer: &Consumer,
        table: &dyn SyscallTable,
        mode: &Mode,
        mut event_type: EventType,
        ts_ns: u64,
        tid: u64,
        desc: &EventDescriptor,
    ) -> Outcome {
        let stats = ring.stats();

        // Step 6: socketcall demultiplex.
        let mut socketcall_args = None;
        if let EventDescriptor::Syscall { regs, id } = desc {
            if table.socketcall_id() == Some(*id) {
                let (resolved, nargs) = demultiplex_socketcall(*regs);
                event_type = if event_type.index() % 2 == 1 {
                    // exit side requested: map to the paired exit type
                    resolved.exit_pair().unwrap_or(resolved)
                } else {
                    resolved
                };
                socketcall_args = Some((regs.args, nargs));
            }
        }

        let head = stats.load_head();
        let (free, window) = ring.compute_space(head);
        let nargs = table.nparams(event_type);

        if free < HEADER_SIZE as u32 + 2 * nargs {
            stats.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
            return Outcome::DroppedBuffer;
        }

        // SAFETY: the preempt gate is held, making this ring's raw buffer
        // exclusively ours to write for the duration of this call; `head`
        // and `window` were just computed to stay within `alloc_size`.
        let raw = unsafe { std::slice::from_raw_parts_mut(ring.data_ptr_at(head), window as usize) };
        let (header_slot, rest) = raw.split_at_mut(HEADER_SIZE);

        let spid = match desc {
            EventDescriptor::Signal { signo, info } => sender_pid(*signo, *info),
            _ => 0,
        };

        let snaplen = effective_snaplen(mode.snaplen, ring.config());
        let mut str_storage = ring.str_storage();
        let filler = if table.is_autofill(event_type) {
            &crate::filler::AutoFiller as &dyn crate::filler::Filler
        } else {
            table.filler_for(event_type)
        };

        let mut filler_args = FillerArgs {
            buffer: rest,
            nargs,
            regs: match desc {
                EventDescriptor::Syscall { regs, .. } => Some(*regs),
                _ => None,
            },
            sched_prev: match desc {
                EventDescriptor::ContextSwitch { prev_pid, .. } => Some(*prev_pid),
                _ => None,
            },
            sched_next: match desc {
                EventDescriptor::ContextSwitch { next_pid, .. } => Some(*next_pid),
                _ => None,
            },
            signo: match desc {
                EventDescriptor::Signal { signo, .. } => Some(*signo),
                _ => None,
            },
            spid,
            dpid: tid,
            snaplen,
            dynamic_snaplen: mode.do_dynamic_snaplen,
            str_storage: &mut str_storage[..],
            socketcall_args: socketcall_args.map(|(args, n)| {
                let mut out = [0u64; crate::filler::MAX_SOCKETCALL_ARGS];
                let n = (n as usize).min(out.len());
                out[..n].copy_from_slice(&args[..n]);
                out
            }),
        };

        let (committed_len, outcome) = match filler.fill(&mut filler_args) {
            FillerResult::Success { arg_data_len, params_written } => {
                debug_assert_filler_consumed_all_params!(params_written, nargs);
                (Some(HEADER_SIZE as u32 + arg_data_len), None)
            }
            FillerResult::BufferFull => {
                stats.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
                (None, Some(Outcome::DroppedBuffer))
            }
            FillerResult::InvalidUserMemory => {
                stats.n_drops_pf.fetch_add(1, Ordering::Relaxed);
                (None, Some(Outcome::DroppedPageFault))
            }
        };

        let Some(len) = committed_len else {
            return outcome.unwrap_or(Outcome::DroppedBuffer);
        };

        let header = EventHeader::new(ts_ns, tid, event_type, nargs);
        header_slot.copy_from_slice(&header.to_bytes());
        // Patch in `len`, which depends on the filler's actual output.
        header_slot[16..20].copy_from_slice(&len.to_le_bytes());

        ring.commit(head, len);
        Outcome::Committed
    }
}

/// Injects a zero-argument marker event directly into `ring` (§4.5's
/// `SYSDIGEVENT_E` on `DISABLE_DROPPING_MODE`, and the `DROP_E`/`DROP_X`
/// markers `should_drop` schedules): bypasses the mask and sampling policy
/// since these are control-plane state announcements, not syscall-derived
/// events, but still goes through the same preempt gate, space check, and
/// commit as the hot path.
pub(crate) fn inject_marker(ring: &crate::ring::Ring, event_type: EventType, ts_ns: u64, tid: u64) -> Outcome {
    if !ring.capture_enabled() {
        return Outcome::NotCapturing;
    }
    let stats = ring.stats();
    stats.n_evts.fetch_add(1, Ordering::Relaxed);

    if !ring.preempt_enter() {
        stats.n_preemptions.fetch_add(1, Ordering::Relaxed);
        return Outcome::PreemptCollision;
    }

    let head = stats.load_head();
    let (free, window) = ring.compute_space(head);
    if free < HEADER_SIZE as u32 {
        stats.n_drops_buffer.fetch_add(1, Ordering::Relaxed);
        ring.preempt_exit();
        return Outcome::DroppedBuffer;
    }

    // SAFETY: the preempt gate is held, making this ring's raw buffer
    // exclusively ours to write; `window` was just computed to stay within
    // `alloc_size` and is at least `HEADER_SIZE` by the check above.
    let raw = unsafe { std::slice::from_raw_parts_mut(ring.data_ptr_at(head), window as usize) };
    let header = EventHeader::new(ts_ns, tid, event_type, 0);
    raw[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    ring.commit(head, HEADER_SIZE as u32);
    ring.preempt_exit();
    Outcome::Committed
}

/// Sampling drop policy (§4.5): `NEVER_DROP` always wins; otherwise, when
/// `dropping_mode` is on, `ALWAYS_DROP` always drops, and `USED` events
/// follow a deterministic 1/ratio duty cycle synchronized to wall-clock
/// seconds. Schedules (does not emit) `DROP_E`/`DROP_X` markers for the
/// *next* call to pick up (§4.3 step 2, P5).
fn should_drop(mode: &Mode, drop_state: &DropMarkerState, flags: DropFlags, ts_ns: u64) -> bool {
    if flags.contains(DropFlags::NEVER_DROP) {
        return false;
    }
    if !mode.dropping_mode {
        return false;
    }
    if flags.contains(DropFlags::ALWAYS_DROP) {
        return true;
    }

    let phase_ns = ts_ns % 1_000_000_000;
    let off_phase = phase_ns >= mode.sampling_interval_ns;
    let was_dropping = drop_state.is_dropping.load(Ordering::Acquire);

    if off_phase {
        if !was_dropping {
            drop_state.is_dropping.store(true, Ordering::Release);
            drop_state.need_drop_e.store(true, Ordering::Release);
        }
        true
    } else {
        if was_dropping {
            drop_state.is_dropping.store(false, Ordering::Release);
            drop_state.need_drop_x.store(true, Ordering::Release);
        }
        false
    }
}
