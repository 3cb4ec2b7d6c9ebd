//! Ring of reusable command buffers.
//!
//! The ring owns one command pool and a fixed number of slots, each with its
//! own fence and completion semaphore. Exactly one slot is recording at a
//! time. Every submission waits on the previous submission's semaphore, so
//! work reaches the queue in strict order even though the buffers are reused
//! out of order.
//!
//! Slot lifecycle:
//!
//! ```text
//! Initial --get()--> Recording --flush()--> Pending --fence--> Invalid --gc()--> Initial
//! ```
//!
//! `Executable` is passed through inside `flush()` between ending and
//! submitting the buffer.

use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuDevice, SubmitDesc};
use crate::config::CacheConfig;
use crate::error::{GpuError, OrFatal};
use crate::profile_scope;

/// Lifecycle state of a ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
    Invalid,
}

#[derive(Debug)]
struct CommandBufferSlot {
    handle: vk::CommandBuffer,
    fence: vk::Fence,
    signal: vk::Semaphore,
    state: CommandBufferState,
}

/// Callback fired with the submitted buffer after every successful flush.
pub type FlushCallback = Box<dyn FnMut(vk::CommandBuffer)>;

/// Fixed ring of command buffers gated by fences and chained by semaphores.
pub struct CommandBufferRing {
    device: Arc<dyn GpuDevice>,
    pool: vk::CommandPool,
    slots: Vec<CommandBufferSlot>,
    active: Option<usize>,
    last_signal: Option<vk::Semaphore>,
    injected: Option<vk::Semaphore>,
    on_flush: Option<FlushCallback>,
}

impl CommandBufferRing {
    /// Create the pool, buffers, fences and semaphores for `config.command_buffer_count` slots.
    pub fn new(device: Arc<dyn GpuDevice>, config: &CacheConfig) -> Result<Self, GpuError> {
        if config.command_buffer_count == 0 {
            return Err(GpuError::InvalidParameter(
                "command buffer ring needs at least one slot".to_string(),
            ));
        }

        let pool = device.create_command_pool()?;
        let handles = device.allocate_command_buffers(pool, config.command_buffer_count as u32)?;

        let mut slots = Vec::with_capacity(handles.len());
        for handle in handles {
            slots.push(CommandBufferSlot {
                handle,
                fence: device.create_fence(false)?,
                signal: device.create_semaphore()?,
                state: CommandBufferState::Initial,
            });
        }

        log::debug!("Created command buffer ring with {} slots", slots.len());

        Ok(Self {
            device,
            pool,
            slots,
            active: None,
            last_signal: None,
            injected: None,
            on_flush: None,
        })
    }

    /// The recording command buffer, starting a new one if none is active.
    ///
    /// Blocks on in-flight work only when no slot is available.
    pub fn get(&mut self) -> vk::CommandBuffer {
        if let Some(index) = self.active {
            return self.slots[index].handle;
        }

        profile_scope!("command_ring_get");

        while self.available_count() == 0 {
            self.wait();
            self.gc();
        }

        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == CommandBufferState::Initial)
            .or_fatal("no initial command buffer after recycling");

        let slot = &mut self.slots[index];
        self.device
            .begin_command_buffer(slot.handle, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .or_fatal("Failed to begin command buffer");
        slot.state = CommandBufferState::Recording;
        self.active = Some(index);

        log::debug!("Command buffer slot {} recording", index);
        slot.handle
    }

    /// End and submit the active buffer. Returns `false` if nothing was recording.
    pub fn flush(&mut self) -> bool {
        let Some(index) = self.active.take() else {
            return false;
        };

        profile_scope!("command_ring_flush");

        let (handle, fence, signal) = {
            let slot = &mut self.slots[index];
            self.device
                .end_command_buffer(slot.handle)
                .or_fatal("Failed to end command buffer");
            slot.state = CommandBufferState::Executable;
            (slot.handle, slot.fence, slot.signal)
        };

        let wait_semaphores: Vec<vk::Semaphore> =
            self.last_signal.into_iter().chain(self.injected).collect();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];
        let signal_semaphores = [signal];

        self.device
            .queue_submit(&SubmitDesc {
                command_buffer: handle,
                wait_semaphores: &wait_semaphores,
                wait_stages: &wait_stages,
                signal_semaphores: &signal_semaphores,
                fence,
            })
            .or_fatal("Failed to submit command buffer");

        self.slots[index].state = CommandBufferState::Pending;
        self.last_signal = Some(signal);
        self.injected = None;

        log::debug!(
            "Command buffer slot {} submitted, waiting on {} semaphores",
            index,
            wait_semaphores.len()
        );

        if let Some(callback) = self.on_flush.as_mut() {
            callback(handle);
        }
        true
    }

    /// Block until every submitted buffer has completed.
    pub fn wait(&mut self) {
        profile_scope!("command_ring_wait");

        let fences: Vec<vk::Fence> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| {
                Some(*index) != self.active && slot.state == CommandBufferState::Pending
            })
            .map(|(_, slot)| slot.fence)
            .collect();

        if fences.is_empty() {
            return;
        }
        self.device
            .wait_for_fences(&fences)
            .or_fatal("Failed to wait for command buffer fences");
    }

    /// Retire completed buffers and make them available again.
    pub fn gc(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != CommandBufferState::Pending {
                continue;
            }
            let signaled = self
                .device
                .fence_status(slot.fence)
                .or_fatal("Failed to query command buffer fence");
            if signaled {
                self.device
                    .reset_fences(&[slot.fence])
                    .or_fatal("Failed to reset command buffer fence");
                slot.state = CommandBufferState::Invalid;
                log::debug!("Command buffer slot {} completed", index);
            }
        }

        let all_idle = self.slots.iter().all(|slot| {
            matches!(
                slot.state,
                CommandBufferState::Initial | CommandBufferState::Invalid
            )
        });

        if all_idle {
            self.device
                .reset_command_pool(self.pool)
                .or_fatal("Failed to reset command pool");
            for slot in &mut self.slots {
                slot.state = CommandBufferState::Initial;
            }
        } else {
            for slot in &mut self.slots {
                if slot.state == CommandBufferState::Invalid {
                    self.device
                        .reset_command_buffer(slot.handle)
                        .or_fatal("Failed to reset command buffer");
                    slot.state = CommandBufferState::Initial;
                }
            }
        }
    }

    /// Make the next submission also wait on `semaphore` (e.g. a swapchain acquire).
    pub fn inject_dependency(&mut self, semaphore: vk::Semaphore) {
        self.injected = Some(semaphore);
    }

    /// Take the completion semaphore of the latest submission.
    ///
    /// The next flush will no longer wait on it; the caller becomes
    /// responsible for ordering against it (e.g. presentation).
    pub fn get_last_submission_signal(&mut self) -> Option<vk::Semaphore> {
        self.last_signal.take()
    }

    /// Register a callback fired with the submitted buffer after every flush.
    pub fn set_flush_callback(&mut self, callback: FlushCallback) {
        self.on_flush = Some(callback);
    }

    /// The currently recording buffer, if any.
    pub fn active(&self) -> Option<vk::CommandBuffer> {
        self.active.map(|index| self.slots[index].handle)
    }

    /// Number of slots ready to start recording.
    pub fn available_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == CommandBufferState::Initial)
            .count()
    }

    /// Number of slots in the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no slots. Never true for a constructed ring.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// State of every slot, in ring order.
    pub fn states(&self) -> Vec<CommandBufferState> {
        self.slots.iter().map(|slot| slot.state).collect()
    }
}

impl Drop for CommandBufferRing {
    fn drop(&mut self) {
        self.wait();
        self.gc();
        for slot in &self.slots {
            self.device.destroy_fence(slot.fence);
            self.device.destroy_semaphore(slot.signal);
        }
        self.device.destroy_command_pool(self.pool);
    }
}

impl std::fmt::Debug for CommandBufferRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBufferRing")
            .field("slots", &self.slots)
            .field("active", &self.active)
            .field("last_signal", &self.last_signal)
            .field("injected", &self.injected)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;

    fn ring(device: &Arc<DummyDevice>, count: usize) -> CommandBufferRing {
        let config = CacheConfig::new().with_command_buffer_count(count);
        CommandBufferRing::new(device.clone(), &config).unwrap()
    }

    #[test]
    fn test_get_returns_active_buffer() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 3);
        let a = ring.get();
        let b = ring.get();
        assert_eq!(a, b);
        assert_eq!(ring.active(), Some(a));
        assert_eq!(device.stats().command_buffers_begun, 1);
    }

    #[test]
    fn test_flush_without_active_is_noop() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 3);
        assert!(!ring.flush());
        assert_eq!(device.stats().submissions, 0);
    }

    #[test]
    fn test_flush_chains_semaphores() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 3);

        ring.get();
        assert!(ring.flush());
        ring.get();
        assert!(ring.flush());

        let submissions = device.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions[0].wait_semaphores.is_empty());
        assert_eq!(
            submissions[1].wait_semaphores,
            submissions[0].signal_semaphores
        );
    }

    #[test]
    fn test_injected_dependency_used_once() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 3);
        let acquire = device.create_semaphore().unwrap();

        ring.inject_dependency(acquire);
        ring.get();
        ring.flush();
        ring.get();
        ring.flush();

        let submissions = device.submissions();
        assert_eq!(submissions[0].wait_semaphores, vec![acquire]);
        assert!(!submissions[1].wait_semaphores.contains(&acquire));
    }

    #[test]
    fn test_last_submission_signal_is_taken() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 2);
        ring.get();
        ring.flush();

        let signal = ring.get_last_submission_signal();
        assert!(signal.is_some());
        assert_eq!(ring.get_last_submission_signal(), None);

        ring.get();
        ring.flush();
        assert!(device.submissions()[1].wait_semaphores.is_empty());
    }

    #[test]
    fn test_flush_callback_fires() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 2);
        let flushed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = flushed.clone();
        ring.set_flush_callback(Box::new(move |cmd| sink.borrow_mut().push(cmd)));

        let cmd = ring.get();
        ring.flush();
        assert_eq!(*flushed.borrow(), vec![cmd]);
    }

    #[test]
    fn test_deferred_completion_recycles_by_waiting() {
        let device = Arc::new(DummyDevice::new().with_deferred_completion());
        let mut ring = ring(&device, 2);

        for _ in 0..5 {
            ring.get();
            ring.flush();
        }
        assert_eq!(device.stats().submissions, 5);
        assert!(device.stats().fence_waits > 0);
    }

    #[test]
    fn test_gc_resets_pool_when_idle() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 2);
        ring.get();
        ring.flush();
        assert_eq!(ring.states()[0], CommandBufferState::Pending);

        ring.gc();
        assert_eq!(ring.states(), vec![CommandBufferState::Initial; 2]);
        assert_eq!(device.stats().command_pool_resets, 1);
    }

    #[test]
    fn test_gc_resets_individually_while_recording() {
        let device = Arc::new(DummyDevice::new());
        let mut ring = ring(&device, 2);
        ring.get();
        ring.flush();
        ring.get();

        ring.gc();
        assert_eq!(device.stats().command_pool_resets, 0);
        assert_eq!(device.stats().command_buffer_resets, 1);
        assert_eq!(ring.available_count(), 1);
    }
}
