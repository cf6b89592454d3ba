//! Graphics pipelines for every technique at every supported sample count.

use tracing::{debug, warn};

use vista_rhi::{Backend, PipelineDesc, PipelineHandle, SampleCount, SampleCountSet};
use vista_scene::RenderPipeline;

use crate::error::{RendererError, RendererResult};

/// Shader variant a technique is compiled from.
pub fn shader_name(technique: RenderPipeline) -> &'static str {
    match technique {
        RenderPipeline::Default => "default",
        RenderPipeline::Triplanar => "triplanar",
        RenderPipeline::Heightfield => "heightfield",
    }
}

/// `[technique][sample tier]` table of created pipelines.
#[derive(Debug, Default)]
pub struct PipelineTable {
    entries: [[Option<PipelineHandle>; 4]; 3],
}

impl PipelineTable {
    /// Create every technique at every supported tier.
    ///
    /// # Errors
    /// Only the default technique at 1x is required; its failure is returned.
    /// Any other failure is logged and leaves the entry empty.
    pub fn build<B: Backend>(backend: &mut B, supported: SampleCountSet) -> RendererResult<Self> {
        let mut table = Self::default();
        for technique in RenderPipeline::ALL {
            for samples in supported.iter() {
                let desc = PipelineDesc {
                    label: format!("{technique} {samples}"),
                    shader: shader_name(technique).to_string(),
                    samples,
                };
                match backend.create_pipeline(&desc) {
                    Ok(handle) => {
                        debug!("Created pipeline '{}'", desc.label);
                        table.entries[technique.index()][samples.tier()] = Some(handle);
                    }
                    Err(e) if technique == RenderPipeline::Default && samples == SampleCount::X1 => {
                        return Err(e.into());
                    }
                    Err(e) => warn!("Pipeline '{}' unavailable: {}", desc.label, e),
                }
            }
        }
        Ok(table)
    }

    pub fn get(&self, technique: RenderPipeline, samples: SampleCount) -> Option<PipelineHandle> {
        self.entries[technique.index()][samples.tier()]
    }

    /// Like [`get`](Self::get), reporting a missing entry as an error.
    pub fn require(
        &self,
        technique: RenderPipeline,
        samples: SampleCount,
    ) -> RendererResult<PipelineHandle> {
        self.get(technique, samples)
            .ok_or(RendererError::MissingPipeline { technique, samples })
    }

    /// Number of pipelines created.
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
