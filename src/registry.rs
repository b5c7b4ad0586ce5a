//! Consumer registry (C2): concurrent-read-safe set of consumers keyed by
//! owner identity, probe (un)registration lifecycle, open/close paths.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::consumer::{Consumer, OwnerId};
use crate::dispatch::ProbeSet;
use crate::error::{Error, Result};
use crate::event::{DropFlags, EventDescriptor, EventMask, EventType};
use crate::filler::SyscallTable;
use crate::invariants::debug_assert_rings_closed_before_free;
use crate::recorder::{Outcome, Recorder};

/// Holds the consumer set and the process-wide event mask (§5: "the event
/// mask is process-wide; all other per-consumer state is per-consumer").
///
/// Readers (probe dispatch, at every event) take only the `RwLock`'s read
/// side — never blocking another reader — while mutation (open/close)
/// takes the write side. This is the safe-Rust stand-in for the original's
/// RCU list named as acceptable in `spec.md` §9: `Arc` reference counting
/// plays the role of the grace period, since a consumer reachable through
/// an `Arc` clone a reader is mid-iteration over stays alive until that
/// clone is dropped, even after a concurrent `close_owner` removes it from
/// the map.
pub struct ConsumerRegistry {
    consumers: RwLock<HashMap<OwnerId, Arc<Consumer>>>,
    mask: RwLock<EventMask>,
    config: Config,
    probes: Box<dyn ProbeSet + Send + Sync>,
    probes_registered: std::sync::atomic::AtomicBool,
    signal_deliver_refcount: std::sync::atomic::AtomicU32,
}

impl ConsumerRegistry {
    #[must_use]
    pub fn new(config: Config, probes: Box<dyn ProbeSet + Send + Sync>) -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            mask: RwLock::new(EventMask::default()),
            config,
            probes,
            probes_registered: std::sync::atomic::AtomicBool::new(false),
            signal_deliver_refcount: std::sync::atomic::AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn num_consumers(&self) -> usize {
        self.consumers.read().expect("registry lock poisoned").len()
    }

    /// Lock-free-to-callers lookup: only the read side of the lock is
    /// taken, so concurrent lookups never block each other.
    #[must_use]
    pub fn lookup(&self, owner: OwnerId) -> Option<Arc<Consumer>> {
        self.consumers.read().expect("registry lock poisoned").get(&owner).cloned()
    }

    /// Open path (§4.2): minor number `cpu`, owner `owner`.
    pub fn open(&self, owner: OwnerId, cpu: usize) -> Result<()> {
        let existing = self.lookup(owner);
        let consumer = match existing {
            Some(c) => c,
            None => {
                let mut consumers = self.consumers.write().expect("registry lock poisoned");
                if consumers.len() >= self.config.max_consumers() {
                    return Err(Error::Busy("max_consumers exceeded"));
                }
                let consumer = Arc::new(Consumer::new(owner, self.config)?);
                consumers.insert(owner, Arc::clone(&consumer));
                log::info!("consumer {owner} created ({} rings)", self.config.num_cpus());
                consumer
            }
        };

        consumer.open_ring(cpu)?;
        log::debug!("ring {cpu} opened for consumer {owner}");

        if !self.probes_registered.swap(true, std::sync::atomic::Ordering::AcqRel) {
            if let Err(e) = self.probes.register_all(true, false) {
                self.probes_registered.store(false, std::sync::atomic::Ordering::Release);
                // Unwind the ring/consumer state we just set up.
                let _ = consumer.close_ring(cpu);
                return Err(e);
            }
            log::info!("probes registered");
        }
        Ok(())
    }

    /// Close path (§4.2): garbage-collects the consumer once all its rings
    /// are closed (P7), and unregisters probes once no consumers remain.
    pub fn close(&self, owner: OwnerId, cpu: usize) -> Result<()> {
        let consumer = self.lookup(owner).ok_or(Error::NotFound("no such consumer"))?;
        let remaining = consumer.close_ring(cpu)?;
        log::debug!("ring {cpu} closed for consumer {owner}");

        if remaining == 0 {
            debug_assert_rings_closed_before_free!(consumer.open_ring_count());
            let mut consumers = self.consumers.write().expect("registry lock poisoned");
            consumers.remove(&owner);
            log::info!("consumer {owner} destroyed");
            if consumers.is_empty() && self.probes_registered.swap(false, std::sync::atomic::Ordering::AcqRel) {
                self.probes.unregister_all(true, self.signal_deliver_refcount.load(std::sync::atomic::Ordering::Acquire) > 0);
                log::info!("probes unregistered");
            }
        }
        Ok(())
    }

    pub fn enable_signal_deliver(&self, owner: OwnerId) -> Result<()> {
        let consumer = self.lookup(owner).ok_or(Error::NotFound("no such consumer"))?;
        consumer.set_signal_deliver(true);
        if self.signal_deliver_refcount.fetch_add(1, std::sync::atomic::Ordering::AcqRel) == 0 {
            self.probes.register_signal_deliver()?;
        }
        Ok(())
    }

    pub fn disable_signal_deliver(&self, owner: OwnerId) -> Result<()> {
        let consumer = self.lookup(owner).ok_or(Error::NotFound("no such consumer"))?;
        consumer.set_signal_deliver(false);
        if self.signal_deliver_refcount.fetch_sub(1, std::sync::atomic::Ordering::AcqRel) == 1 {
            self.probes.unregister_signal_deliver();
        }
        Ok(())
    }

    #[must_use]
    pub fn mask(&self) -> EventMask {
        *self.mask.read().expect("mask lock poisoned")
    }

    pub fn mask_zero_events(&self) {
        self.mask.write().expect("mask lock poisoned").zero();
    }

    pub fn mask_set_event(&self, idx: usize) -> Result<()> {
        if self.mask.write().expect("mask lock poisoned").set(idx) {
            Ok(())
        } else {
            Err(Error::InvalidArgument("event index out of range"))
        }
    }

    pub fn mask_unset_event(&self, idx: usize) -> Result<()> {
        if self.mask.write().expect("mask lock poisoned").unset(idx) {
            Ok(())
        } else {
            Err(Error::InvalidArgument("event index out of range"))
        }
    }

    /// `record_all_consumers` (§4.4): reads the consumer set under the
    /// lock-free read path and invokes the recorder for each (§3 data flow).
    #[allow(clippy::too_many_arguments)]
    pub fn record_all_consumers(
        &self,
        recorder: &Recorder,
        table: &dyn SyscallTable,
        event_type: EventType,
        flags: DropFlags,
        ts_ns: u64,
        tid: u64,
        cpu: usize,
        desc: &EventDescriptor,
    ) -> Vec<Outcome> {
        let mask = self.mask();
        let consumers: Vec<Arc<Consumer>> =
            self.consumers.read().expect("registry lock poisoned").values().cloned().collect();
        consumers
            .iter()
            .map(|c| recorder.record(c, table, &mask, event_type, flags, ts_ns, tid, cpu, desc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SMALL_RING_CONFIG;
    use crate::dispatch::NullProbeSet;

    fn registry() -> ConsumerRegistry {
        ConsumerRegistry::new(SMALL_RING_CONFIG, Box::new(NullProbeSet))
    }

    #[test]
    fn open_then_close_removes_consumer() {
        let reg = registry();
        reg.open(1, 0).unwrap();
        assert_eq!(reg.num_consumers(), 1);
        reg.close(1, 0).unwrap();
        assert_eq!(reg.num_consumers(), 0);
    }

    #[test]
    fn max_consumers_enforced() {
        let reg = ConsumerRegistry::new(
            SMALL_RING_CONFIG.with_max_consumers(1),
            Box::new(NullProbeSet),
        );
        reg.open(1, 0).unwrap();
        assert!(matches!(reg.open(2, 0), Err(Error::Busy(_))));
    }

    #[test]
    fn two_consumers_independent_counters() {
        let reg = registry();
        reg.open(1, 0).unwrap();
        reg.open(2, 0).unwrap();
        reg.lookup(1).unwrap().enable_capture(0).unwrap();
        reg.lookup(2).unwrap().enable_capture(0).unwrap();
        assert_eq!(reg.num_consumers(), 2);
        reg.close(1, 0).unwrap();
        assert_eq!(reg.num_consumers(), 1);
        assert!(reg.lookup(2).is_some());
    }

    #[test]
    fn mask_zero_then_set_roundtrip() {
        let reg = registry();
        reg.mask_zero_events();
        assert!(!reg.mask().is_set(EventType::ReadE));
        reg.mask_set_event(EventType::ReadE.index()).unwrap();
        assert!(reg.mask().is_set(EventType::ReadE));
        assert!(reg.mask_set_event(EventMask::LEN).is_err());
    }
}
