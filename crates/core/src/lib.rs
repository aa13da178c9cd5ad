//! Core library for the click track generator.
//!
//! A replay (binary `.re3` or a JSON macro) is decoded into a tick-ordered
//! timeline of presses and releases, the press rhythm is analysed to tell
//! rapid clicks from deliberate ones, every event is assigned a sound from
//! the library, and the resulting mix plan is rendered by an external
//! ffmpeg-compatible mixer.

pub mod analysis;
pub mod config;
pub mod error;
pub mod generator;
pub mod library;
pub mod plan;
pub mod render;
pub mod replay;
pub mod timeline;

pub use analysis::ClickAnalysis;
pub use config::{GeneratorConfig, LimiterConfig, RenderConfig};
pub use error::{ClickTrackError, FormatError, InvocationError, Result};
pub use generator::{ClickTrackGenerator, GenerationPhase, GenerationReport};
pub use library::{SoundLibrary, SoundRole};
pub use plan::{
    ClassifierState, IndexPicker, MixPlacement, MixPlan, MixPlanner, RandomPicker, ScriptedPicker,
};
pub use render::{
    FfmpegInvoker, InvocationLimits, InvocationOutput, MixInvoker, MixRequest, RenderPipeline,
    RenderReport, RenderStrategy,
};
pub use replay::{
    Header, InputEvent, ParsedReplay, PhysicsFrame, PlayerStatistics, ReplayDecoder,
    ReplayStatistics,
};
pub use timeline::{MergedTimeline, TimelineEvent};
