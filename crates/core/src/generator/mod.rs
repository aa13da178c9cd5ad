use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    timeline, ClickAnalysis, FfmpegInvoker, GeneratorConfig, IndexPicker, MergedTimeline,
    MixInvoker, MixPlanner, RandomPicker, RenderPipeline, RenderReport, RenderStrategy, Result,
    SoundLibrary,
};

/// Steps of a generation run, in order. The only backwards-looking edge is
/// `Rendering(Direct)` to `Rendering(Chunked)` when the direct mix fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationPhase {
    Idle,
    Decoding,
    Analyzing,
    Planning,
    Rendering(RenderStrategy),
    Done,
}

impl fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Decoding => f.write_str("decoding"),
            Self::Analyzing => f.write_str("analyzing"),
            Self::Planning => f.write_str("planning"),
            Self::Rendering(strategy) => write!(f, "rendering ({strategy})"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub tps: f64,
    pub actions: usize,
    pub duration_seconds: f64,
    pub sound_variations: usize,
    pub analysis: ClickAnalysis,
    pub placements: usize,
    pub render: RenderReport,
    pub phases: Vec<GenerationPhase>,
}

/// Drives decode, analysis, planning and rendering for one replay at a time.
pub struct ClickTrackGenerator<I> {
    config: GeneratorConfig,
    pipeline: RenderPipeline<I>,
    picker: Box<dyn IndexPicker>,
    phases: Vec<GenerationPhase>,
}

impl ClickTrackGenerator<FfmpegInvoker> {
    /// Generator that mixes with the ffmpeg binary named in `config`.
    pub fn new(config: GeneratorConfig) -> Self {
        let invoker = FfmpegInvoker::new(config.render.ffmpeg_binary.clone());
        Self::with_invoker(config, invoker)
    }
}

impl<I: MixInvoker> ClickTrackGenerator<I> {
    pub fn with_invoker(config: GeneratorConfig, invoker: I) -> Self {
        Self {
            pipeline: RenderPipeline::new(invoker, &config),
            config,
            picker: Box::new(RandomPicker::new()),
            phases: vec![GenerationPhase::Idle],
        }
    }

    /// Replaces the random sound picker.
    pub fn with_picker(mut self, picker: impl IndexPicker + 'static) -> Self {
        self.picker = Box::new(picker);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &RenderPipeline<I> {
        &self.pipeline
    }

    /// Current phase of the latest run.
    pub fn phase(&self) -> GenerationPhase {
        self.phases.last().copied().unwrap_or(GenerationPhase::Idle)
    }

    /// Every phase the latest run passed through.
    pub fn phases(&self) -> &[GenerationPhase] {
        &self.phases
    }

    /// Renders the click track for `replay` using the sounds in `sounds_dir`.
    pub async fn generate(
        &mut self,
        replay: &Path,
        sounds_dir: &Path,
        output: &Path,
    ) -> Result<GenerationReport> {
        self.phases.clear();
        self.phases.push(GenerationPhase::Idle);

        enter(&mut self.phases, GenerationPhase::Decoding);
        let (library, timeline) = self
            .load_inputs(replay, sounds_dir)
            .map_err(|err| err.in_phase(GenerationPhase::Decoding))?;

        enter(&mut self.phases, GenerationPhase::Analyzing);
        let analysis = ClickAnalysis::with_ceiling(&timeline, self.config.rapid_ceiling_seconds);

        enter(&mut self.phases, GenerationPhase::Planning);
        let plan = MixPlanner::new(&library, &analysis)
            .with_tail(self.config.tail_seconds)
            .plan(&timeline, self.picker.as_mut());

        let phases = &mut self.phases;
        let rendered = self
            .pipeline
            .render(&plan, output, |strategy| {
                enter(phases, GenerationPhase::Rendering(strategy))
            })
            .await;
        let render = rendered.map_err(|err| err.in_phase(self.phase()))?;

        enter(&mut self.phases, GenerationPhase::Done);
        Ok(GenerationReport {
            tps: timeline.tps(),
            actions: timeline.len(),
            duration_seconds: timeline.duration_seconds(),
            sound_variations: library.total(),
            analysis,
            placements: plan.len(),
            render,
            phases: self.phases.clone(),
        })
    }

    fn load_inputs(&self, replay: &Path, sounds_dir: &Path) -> Result<(SoundLibrary, MergedTimeline)> {
        let library = SoundLibrary::scan(sounds_dir, &self.config.sound_extensions)?;
        let timeline = timeline::load(replay, self.config.default_tps)?;
        Ok((library, timeline))
    }
}

fn enter(phases: &mut Vec<GenerationPhase>, phase: GenerationPhase) {
    tracing::info!(%phase, "entering phase");
    phases.push(phase);
}
