//! Per-slot command recording.
//!
//! Each frame slot cycles through
//! `Idle -> Recording -> Closed -> Submitted -> Idle`. A slot only returns to
//! `Idle` once the fence shows its submission completed, and its command
//! allocator is only reset on the way into `Recording`.

use std::fmt;

use tracing::debug;

use vista_rhi::{Backend, Command, CommandList};

use crate::error::{RendererError, RendererResult};

/// Where a frame slot is in its record/submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Closed,
    Submitted,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotState::Idle => "idle",
            SlotState::Recording => "recording",
            SlotState::Closed => "closed",
            SlotState::Submitted => "submitted",
        })
    }
}

#[derive(Debug)]
struct FrameSlot {
    state: SlotState,
    commands: CommandList,
}

/// Command lists for every frame slot and the state of each.
#[derive(Debug)]
pub struct FrameRecorder {
    slots: Vec<FrameSlot>,
}

impl FrameRecorder {
    pub fn new(frame_count: usize) -> Self {
        let slots = (0..frame_count)
            .map(|_| FrameSlot {
                state: SlotState::Idle,
                commands: CommandList::new(),
            })
            .collect();
        Self { slots }
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.slots[slot].state
    }

    /// Commands recorded into a slot since its last [`begin`](Self::begin).
    pub fn commands(&self, slot: usize) -> &CommandList {
        &self.slots[slot].commands
    }

    fn require_state(
        &self,
        slot: usize,
        state: SlotState,
        operation: &'static str,
    ) -> RendererResult<()> {
        let current = self.slots[slot].state;
        if current != state {
            return Err(RendererError::InvalidSlotState {
                slot,
                state: current,
                operation,
            });
        }
        Ok(())
    }

    /// Mark a submitted slot idle after its fence watermark was reached.
    ///
    /// Slots that never submitted are already idle and stay that way.
    pub fn retire(&mut self, slot: usize) -> RendererResult<()> {
        match self.slots[slot].state {
            SlotState::Submitted => {
                self.slots[slot].state = SlotState::Idle;
                Ok(())
            }
            SlotState::Idle => Ok(()),
            state => Err(RendererError::InvalidSlotState {
                slot,
                state,
                operation: "retire",
            }),
        }
    }

    /// Reset the slot's allocator and open an empty command list.
    pub fn begin<B: Backend>(&mut self, slot: usize, backend: &mut B) -> RendererResult<()> {
        self.require_state(slot, SlotState::Idle, "begin recording")?;
        backend.reset_command_allocator(slot)?;

        let frame = &mut self.slots[slot];
        frame.commands.reset();
        frame.state = SlotState::Recording;
        Ok(())
    }

    pub fn push(&mut self, slot: usize, command: Command) -> RendererResult<()> {
        self.require_state(slot, SlotState::Recording, "record into")?;
        self.slots[slot].commands.push(command)?;
        Ok(())
    }

    /// Mutable access to an open command list, for barrier recording.
    pub fn recording(&mut self, slot: usize) -> RendererResult<&mut CommandList> {
        self.require_state(slot, SlotState::Recording, "record into")?;
        Ok(&mut self.slots[slot].commands)
    }

    pub fn close(&mut self, slot: usize) -> RendererResult<()> {
        self.require_state(slot, SlotState::Recording, "close")?;
        let frame = &mut self.slots[slot];
        frame.commands.close();
        frame.state = SlotState::Closed;
        Ok(())
    }

    /// Throw away a slot's unsubmitted commands and make it idle again.
    ///
    /// For frames that never reach the queue. A submitted slot must be
    /// retired through its fence instead.
    pub fn abandon(&mut self, slot: usize) -> RendererResult<()> {
        let frame = &mut self.slots[slot];
        match frame.state {
            SlotState::Submitted => Err(RendererError::InvalidSlotState {
                slot,
                state: SlotState::Submitted,
                operation: "abandon",
            }),
            state => {
                if state != SlotState::Idle {
                    debug!("Abandoning {} frame slot {}", state, slot);
                }
                frame.commands.reset();
                frame.state = SlotState::Idle;
                Ok(())
            }
        }
    }

    /// Hand a closed list to the queue.
    pub fn submit<B: Backend>(&mut self, slot: usize, backend: &mut B) -> RendererResult<()> {
        self.require_state(slot, SlotState::Closed, "submit")?;
        let frame = &mut self.slots[slot];
        backend.submit(slot, &frame.commands)?;
        frame.state = SlotState::Submitted;
        debug!(
            "Submitted frame slot {} ({} commands, {} draws)",
            slot,
            frame.commands.len(),
            frame.commands.draw_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig};

    fn backend() -> HeadlessBackend {
        HeadlessBackend::new(HeadlessConfig {
            gpu_latency: Duration::ZERO,
            ..Default::default()
        })
    }

    #[test]
    fn test_full_cycle() {
        let mut backend = backend();
        let mut recorder = FrameRecorder::new(2);

        recorder.begin(0, &mut backend).unwrap();
        assert_eq!(recorder.state(0), SlotState::Recording);
        recorder.push(0, Command::BindDescriptorTable { slot: 0 }).unwrap();
        recorder.close(0).unwrap();
        recorder.submit(0, &mut backend).unwrap();
        assert_eq!(recorder.state(0), SlotState::Submitted);
        assert_eq!(recorder.commands(0).len(), 1);

        recorder.retire(0).unwrap();
        assert_eq!(recorder.state(0), SlotState::Idle);
        assert_eq!(recorder.state(1), SlotState::Idle);
    }

    #[test]
    fn test_recording_into_submitted_slot_fails() {
        let mut backend = backend();
        let mut recorder = FrameRecorder::new(2);
        recorder.begin(1, &mut backend).unwrap();
        recorder.close(1).unwrap();
        recorder.submit(1, &mut backend).unwrap();

        let err = recorder.begin(1, &mut backend).unwrap_err();
        assert!(matches!(
            err,
            RendererError::InvalidSlotState {
                slot: 1,
                state: SlotState::Submitted,
                ..
            }
        ));
        assert!(recorder.push(1, Command::BindDescriptorTable { slot: 1 }).is_err());
    }

    #[test]
    fn test_abandon_returns_slot_to_idle() {
        let mut backend = backend();
        let mut recorder = FrameRecorder::new(2);
        recorder.begin(0, &mut backend).unwrap();
        recorder.push(0, Command::BindDescriptorTable { slot: 0 }).unwrap();
        recorder.close(0).unwrap();

        recorder.abandon(0).unwrap();
        assert_eq!(recorder.state(0), SlotState::Idle);
        assert!(recorder.commands(0).is_empty());

        recorder.begin(0, &mut backend).unwrap();
        assert_eq!(recorder.state(0), SlotState::Recording);
        recorder.abandon(1).unwrap();
        assert_eq!(recorder.state(1), SlotState::Idle);
    }

    #[test]
    fn test_abandon_rejects_submitted_slot() {
        let mut backend = backend();
        let mut recorder = FrameRecorder::new(2);
        recorder.begin(0, &mut backend).unwrap();
        recorder.close(0).unwrap();
        recorder.submit(0, &mut backend).unwrap();

        assert!(recorder.abandon(0).is_err());
        assert_eq!(recorder.state(0), SlotState::Submitted);
    }

    #[test]
    fn test_submit_requires_close() {
        let mut backend = backend();
        let mut recorder = FrameRecorder::new(2);
        recorder.begin(0, &mut backend).unwrap();
        assert!(recorder.submit(0, &mut backend).is_err());
        assert!(recorder.retire(0).is_err());
        assert_eq!(recorder.state(0), SlotState::Recording);
    }
}
