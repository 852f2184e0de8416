//! Hardware command bridge.
//!
//! The motion controller is a stateful synchronous device that must never
//! be called from two threads. The bridge owns it on one dedicated thread
//! and exchanges commands with any number of callers through a fixed ring
//! of slots:
//!
//! ```text
//!  callers ──submit──► [ slot 0 | slot 1 | ... | slot N-1 ] ──► consumer thread
//!     ▲                  write cursor        read cursor          │
//!     └──────────────── await_result ◄──── Ready(result) ◄────────┘
//! ```
//!
//! | Slot state  | Set by   | Meaning                                  |
//! |-------------|----------|------------------------------------------|
//! | `Empty`     | caller   | free for the write cursor                |
//! | `Submitted` | caller   | waiting for the consumer                 |
//! | `Executing` | consumer | running on the device                    |
//! | `Ready`     | consumer | result waiting for its caller            |
//!
//! A slot returns to `Empty` only when its caller has read the result, or
//! when the consumer finishes a command whose caller gave up waiting.
//! Submissions into a slot that is not `Empty` fail: the ring is never
//! overwritten.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use splebo_common::error::{RobotError, RobotResult};
use splebo_common::hal::driver::{HalError, MotionDevice};
use tracing::{debug, error, info, warn};

use crate::command::{CommandReply, MotionCommand};

/// Ticket returned by [`CommandBridge::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHandle {
    slot: usize,
    seq: u64,
}

impl CommandHandle {
    /// Ring slot holding the command.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Submission sequence number, unique per bridge.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
enum SlotState {
    Empty,
    Submitted(MotionCommand),
    Executing(MotionCommand),
    Ready(MotionCommand, Result<CommandReply, HalError>),
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    state: SlotState,
    /// Caller stopped waiting; consumer frees the slot on completion.
    abandoned: bool,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Slot>,
    write: usize,
    read: usize,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    ring: Mutex<Ring>,
    /// Signalled on submission and shutdown.
    submitted: Condvar,
    /// Signalled whenever a slot turns `Ready`.
    completed: Condvar,
    processed: AtomicU64,
}

/// Single-owner gateway to the motion controller.
pub struct CommandBridge {
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl CommandBridge {
    /// Move `device` into a new consumer thread.
    ///
    /// `idle` bounds how long the consumer sleeps between rescans when no
    /// submission wakes it.
    pub fn start(
        device: Box<dyn MotionDevice>,
        capacity: usize,
        idle: Duration,
    ) -> RobotResult<Self> {
        if capacity == 0 {
            return Err(RobotError::Configuration(
                "bridge capacity must be > 0".to_string(),
            ));
        }
        let slots = (0..capacity)
            .map(|_| Slot {
                seq: 0,
                state: SlotState::Empty,
                abandoned: false,
            })
            .collect();
        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring {
                slots,
                write: 0,
                read: 0,
                next_seq: 1,
                shutdown: false,
            }),
            submitted: Condvar::new(),
            completed: Condvar::new(),
            processed: AtomicU64::new(0),
        });

        let consumer_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("motion-bridge".to_string())
            .spawn(move || consumer_loop(consumer_shared, device, idle))
            .map_err(|e| RobotError::Configuration(format!("bridge thread: {e}")))?;

        info!(capacity, "Command bridge started");
        Ok(Self {
            shared,
            consumer: Mutex::new(Some(handle)),
            capacity,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands completed by the consumer since start.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.shared.ring.lock().shutdown
    }

    /// Queue `command` in the next ring slot.
    ///
    /// # Errors
    /// `Configuration` if the slot under the write cursor is still in use,
    /// which means more commands are in flight than the ring can hold.
    pub fn submit(&self, command: MotionCommand) -> RobotResult<CommandHandle> {
        let mut ring = self.shared.ring.lock();
        if ring.shutdown {
            return Err(RobotError::command_failed(
                command.opcode(),
                "command bridge is stopped",
            ));
        }
        let idx = ring.write;
        if !matches!(ring.slots[idx].state, SlotState::Empty) {
            error!(
                slot = idx,
                capacity = self.capacity,
                opcode = command.opcode(),
                "bridge capacity exceeded"
            );
            return Err(RobotError::Configuration(format!(
                "bridge capacity exceeded ({} slots)",
                self.capacity
            )));
        }
        let seq = ring.next_seq;
        ring.next_seq += 1;
        let slot = &mut ring.slots[idx];
        slot.seq = seq;
        slot.abandoned = false;
        slot.state = SlotState::Submitted(command);
        ring.write = (idx + 1) % self.capacity;
        drop(ring);

        self.shared.submitted.notify_one();
        Ok(CommandHandle { slot: idx, seq })
    }

    /// Block until the command behind `handle` completes.
    ///
    /// On timeout the slot is abandoned: the command still runs on the
    /// device, but its result is discarded.
    pub fn await_result(
        &self,
        handle: CommandHandle,
        timeout: Duration,
    ) -> RobotResult<CommandReply> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.shared.ring.lock();
        loop {
            let slot = ring
                .slots
                .get_mut(handle.slot)
                .filter(|s| s.seq == handle.seq)
                .ok_or_else(|| {
                    RobotError::validation(format!("stale command handle {handle:?}"))
                })?;

            if matches!(slot.state, SlotState::Empty) {
                return Err(RobotError::validation(format!(
                    "stale command handle {handle:?}"
                )));
            }
            if matches!(slot.state, SlotState::Ready(..)) {
                let state = std::mem::replace(&mut slot.state, SlotState::Empty);
                if let SlotState::Ready(command, result) = state {
                    return result.map_err(|e| hal_failure(&command, e));
                }
            }

            if Instant::now() >= deadline {
                slot.abandoned = true;
                let opcode = match &slot.state {
                    SlotState::Submitted(c) | SlotState::Executing(c) => c.opcode(),
                    _ => "unknown",
                };
                warn!(slot = handle.slot, opcode, "command abandoned after {timeout:?}");
                return Err(RobotError::CommunicationTimeout(format!(
                    "{opcode} did not complete within {timeout:?}"
                )));
            }
            self.shared.completed.wait_until(&mut ring, deadline);
        }
    }

    /// Submit and wait.
    pub fn execute(&self, command: MotionCommand, timeout: Duration) -> RobotResult<CommandReply> {
        let handle = self.submit(command)?;
        self.await_result(handle, timeout)
    }

    /// Stop the consumer after it drains submitted commands.
    ///
    /// The device is closed on the consumer thread before it exits.
    pub fn shutdown(&self) {
        {
            let mut ring = self.shared.ring.lock();
            if ring.shutdown {
                return;
            }
            ring.shutdown = true;
        }
        self.shared.submitted.notify_all();
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                error!("motion bridge thread panicked");
            }
        }
        self.shared.completed.notify_all();
        info!(processed = self.processed(), "Command bridge stopped");
    }
}

impl Drop for CommandBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn hal_failure(command: &MotionCommand, err: HalError) -> RobotError {
    match err {
        HalError::Timeout(msg) => RobotError::CommunicationTimeout(format!(
            "{}: {msg}",
            command.opcode()
        )),
        HalError::InvalidAxis(_) | HalError::InvalidBit(_) | HalError::InvalidBoard(_) => {
            RobotError::from(err)
        }
        other => RobotError::command_failed(command.opcode(), other.to_string()),
    }
}

/// Body of the consumer thread.
fn consumer_loop(shared: Arc<Shared>, mut device: Box<dyn MotionDevice>, idle: Duration) {
    if detect_rt_mode() {
        info!("Motion bridge running in real-time mode");
    } else {
        debug!("Motion bridge running in standard (non-RT) mode");
    }

    loop {
        let (idx, command) = {
            let mut ring = shared.ring.lock();
            loop {
                let idx = ring.read;
                if let SlotState::Submitted(command) = ring.slots[idx].state {
                    ring.slots[idx].state = SlotState::Executing(command);
                    break (idx, command);
                }
                if ring.shutdown {
                    drop(ring);
                    if let Err(e) = device.close() {
                        warn!("closing {} failed: {e}", device.name());
                    }
                    return;
                }
                shared.submitted.wait_for(&mut ring, idle);
            }
        };

        let result = command.execute(device.as_mut());
        if let Err(e) = &result {
            debug!(opcode = command.opcode(), axis = ?command.axis(), "command failed: {e}");
        }

        {
            let mut ring = shared.ring.lock();
            let capacity = ring.slots.len();
            let slot = &mut ring.slots[idx];
            if slot.abandoned {
                slot.abandoned = false;
                slot.state = SlotState::Empty;
            } else {
                slot.state = SlotState::Ready(command, result);
            }
            ring.read = (idx + 1) % capacity;
            shared.processed.fetch_add(1, Ordering::Relaxed);
        }
        shared.completed.notify_all();
    }
}

/// Whether the calling thread runs under a real-time scheduling policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
