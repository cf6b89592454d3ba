//! Resource state tracking for per-frame targets.
//!
//! The tracker remembers the last recorded state of every fixed per-frame
//! target (presentable images, the depth buffer, MSAA color and depth). Asking
//! for a new state records exactly one barrier from the remembered state and
//! updates it immediately; asking for the state already held records nothing.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use vista_rhi::{Command, CommandList, ImageHandle, ResourceState};

use crate::error::RendererResult;

/// Role of a tracked image within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTarget {
    Backbuffer,
    Depth,
    MsaaColor,
    MsaaDepth,
}

impl fmt::Display for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameTarget::Backbuffer => "backbuffer",
            FrameTarget::Depth => "depth",
            FrameTarget::MsaaColor => "msaa color",
            FrameTarget::MsaaDepth => "msaa depth",
        })
    }
}

/// How a frame reaches the presentable image, chosen once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePath {
    /// Draw straight into the presentable image.
    Direct,
    /// Draw into a multisampled target and resolve it into the presentable image.
    Resolve,
}

impl FramePath {
    /// States a target passes through during one frame on this path, starting
    /// with the state it holds when the frame begins.
    ///
    /// Targets the path does not touch keep their resting state.
    pub fn expected_states(self, target: FrameTarget) -> &'static [ResourceState] {
        use ResourceState::*;
        match (self, target) {
            (FramePath::Direct, FrameTarget::Backbuffer) => &[Present, RenderTarget, Present],
            (FramePath::Resolve, FrameTarget::Backbuffer) => {
                &[Present, ResolveDest, RenderTarget, Present]
            }
            (FramePath::Resolve, FrameTarget::MsaaColor) => {
                &[RenderTarget, ResolveSource, RenderTarget]
            }
            (_, FrameTarget::MsaaColor) => &[RenderTarget],
            (_, FrameTarget::Depth | FrameTarget::MsaaDepth) => &[DepthWrite],
        }
    }
}

/// One recorded barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub target: FrameTarget,
    pub image: ImageHandle,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Last recorded state of each per-frame target, plus this frame's barriers.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: HashMap<ImageHandle, (FrameTarget, ResourceState)>,
    log: Vec<Transition>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an image in the state it was created in.
    pub fn track(&mut self, image: ImageHandle, target: FrameTarget, state: ResourceState) {
        if self.states.insert(image, (target, state)).is_some() {
            warn!("{} {} was already tracked", target, image);
        }
    }

    /// Stop tracking an image that is about to be released.
    pub fn forget(&mut self, image: ImageHandle) {
        self.states.remove(&image);
    }

    pub fn state(&self, image: ImageHandle) -> Option<ResourceState> {
        self.states.get(&image).map(|(_, state)| *state)
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    /// Record a barrier moving `image` into `after`, if it is not already there.
    ///
    /// Returns whether a barrier was recorded. Untracked images are an error
    /// in the caller; they are reported and left alone.
    pub fn require(
        &mut self,
        commands: &mut CommandList,
        image: ImageHandle,
        after: ResourceState,
    ) -> RendererResult<bool> {
        let Some((target, state)) = self.states.get_mut(&image) else {
            warn!("Transition requested for untracked {}", image);
            return Ok(false);
        };
        if *state == after {
            return Ok(false);
        }

        let before = *state;
        commands.push(Command::Barrier {
            image,
            before,
            after,
        })?;
        *state = after;
        self.log.push(Transition {
            target: *target,
            image,
            before,
            after,
        });
        Ok(true)
    }

    /// Forget the previous frame's barriers.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Barriers recorded since the last [`clear_log`](Self::clear_log).
    pub fn transitions(&self) -> &[Transition] {
        &self.log
    }

    /// Undo the logged barriers, newest first, and clear the log.
    ///
    /// For a frame whose commands never reached the queue: every image goes
    /// back to the state the GPU still has it in.
    pub fn rollback(&mut self) {
        for transition in self.log.drain(..).rev() {
            if let Some((_, state)) = self.states.get_mut(&transition.image) {
                *state = transition.before;
            }
        }
    }

    /// Every state `image` held during the logged frame, starting with the
    /// one it held before the first barrier.
    pub fn visited_states(&self, image: ImageHandle) -> Vec<ResourceState> {
        let mut visited = Vec::new();
        for transition in self.log.iter().filter(|t| t.image == image) {
            if visited.is_empty() {
                visited.push(transition.before);
            }
            visited.push(transition.after);
        }
        if visited.is_empty()
            && let Some(state) = self.state(image)
        {
            visited.push(state);
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_rhi::headless::{HeadlessBackend, HeadlessConfig};
    use vista_rhi::Backend;

    fn backbuffer() -> ImageHandle {
        HeadlessBackend::new(HeadlessConfig::default()).backbuffers()[0]
    }

    #[test]
    fn test_same_state_records_nothing() {
        let image = backbuffer();
        let mut tracker = ResourceStateTracker::new();
        tracker.track(image, FrameTarget::Backbuffer, ResourceState::Present);

        let mut list = CommandList::new();
        assert!(!tracker.require(&mut list, image, ResourceState::Present).unwrap());
        assert!(list.is_empty());
        assert!(tracker.transitions().is_empty());
    }

    #[test]
    fn test_direct_path_sequence() {
        let image = backbuffer();
        let mut tracker = ResourceStateTracker::new();
        tracker.track(image, FrameTarget::Backbuffer, ResourceState::Present);

        let mut list = CommandList::new();
        tracker.require(&mut list, image, ResourceState::RenderTarget).unwrap();
        tracker.require(&mut list, image, ResourceState::RenderTarget).unwrap();
        tracker.require(&mut list, image, ResourceState::Present).unwrap();

        assert_eq!(list.barriers().count(), 2);
        assert_eq!(
            tracker.visited_states(image),
            FramePath::Direct.expected_states(FrameTarget::Backbuffer)
        );
    }

    #[test]
    fn test_closed_list_leaves_state_alone() {
        let image = backbuffer();
        let mut tracker = ResourceStateTracker::new();
        tracker.track(image, FrameTarget::Backbuffer, ResourceState::Present);

        let mut list = CommandList::new();
        list.close();
        assert!(tracker.require(&mut list, image, ResourceState::RenderTarget).is_err());
        assert_eq!(tracker.state(image), Some(ResourceState::Present));
    }

    #[test]
    fn test_rollback_restores_states_before_the_frame() {
        let image = backbuffer();
        let mut tracker = ResourceStateTracker::new();
        tracker.track(image, FrameTarget::Backbuffer, ResourceState::Present);

        let mut list = CommandList::new();
        tracker.require(&mut list, image, ResourceState::ResolveDest).unwrap();
        tracker.require(&mut list, image, ResourceState::RenderTarget).unwrap();
        tracker.rollback();

        assert_eq!(tracker.state(image), Some(ResourceState::Present));
        assert!(tracker.transitions().is_empty());
    }

    #[test]
    fn test_untouched_target_reports_resting_state() {
        let image = backbuffer();
        let mut tracker = ResourceStateTracker::new();
        tracker.track(image, FrameTarget::Depth, ResourceState::DepthWrite);
        assert_eq!(
            tracker.visited_states(image),
            FramePath::Direct.expected_states(FrameTarget::Depth)
        );
    }
}
