//! ringcap: the multi-consumer per-CPU ring-buffer publication engine
//! behind a kernel-resident syscall capture probe.
//!
//! This crate implements the core of such a probe: the per-CPU lock-free
//! SPSC ring buffer with its overflow cushion and mirrored mmap exposure
//! (C1, C6), the consumer registry and its lifecycle (C2), the event
//! recorder (C3), probe dispatch and the sampling drop policy (C4), the
//! control plane (C5), and the external filler contract (C7). Filler
//! *implementations*, the syscall→event-type table, the CLI/daemon, and
//! dynamic-snaplen heuristics are deliberately out of scope — they are
//! modeled here only as trait boundaries a real deployment plugs into.

mod align;
pub mod config;
pub mod consumer;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod filler;
mod invariants;
pub mod recorder;
pub mod registry;
pub mod ring;
pub mod shm;
pub mod stats;

pub use config::Config;
pub use consumer::{Consumer, OwnerId};
pub use control::{apply, ControlCommand, ControlReply, EventInjectionSink, TaskDirectory};
pub use error::{Error, ExitCode, Result};
pub use event::{DropFlags, EventDescriptor, EventHeader, EventMask, EventType};
pub use recorder::{Outcome, Recorder};
pub use registry::ConsumerRegistry;
pub use ring::Ring;
pub use stats::StatsPage;
