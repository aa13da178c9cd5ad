//! Turns a merged timeline into an ordered list of sound placements.

use std::{collections::VecDeque, path::PathBuf};

use rand::{rngs::StdRng, rngs::ThreadRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{ClickAnalysis, MergedTimeline, SoundLibrary, SoundRole, TimelineEvent};

/// Silence appended after the last event.
pub const DEFAULT_TAIL_SECONDS: f64 = 2.0;
/// Press time assumed before the first press, so it is never rapid.
pub const NO_PREVIOUS_PRESS: f64 = -999.0;

/// Source of uniformly distributed indices used to pick sound variations.
pub trait IndexPicker {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// [`IndexPicker`] backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RandomPicker<R = ThreadRng> {
    rng: R,
}

impl RandomPicker<ThreadRng> {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for RandomPicker<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPicker<StdRng> {
    /// Reproducible picker for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> IndexPicker for RandomPicker<R> {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed list of indices, wrapping each into range. Picks `0` once
/// the script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPicker {
    script: VecDeque<usize>,
}

impl ScriptedPicker {
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl IndexPicker for ScriptedPicker {
    fn pick(&mut self, len: usize) -> usize {
        self.script.pop_front().unwrap_or(0) % len
    }
}

/// Rolling state of the rapid-click classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    pub last_press_time: f64,
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self {
            last_press_time: NO_PREVIOUS_PRESS,
        }
    }
}

/// A sound started at an absolute offset into the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixPlacement {
    pub sound: PathBuf,
    pub offset_ms: u64,
}

/// Ordered placements plus the length of the rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    placements: Vec<MixPlacement>,
    duration_seconds: f64,
}

impl MixPlan {
    pub fn new(placements: Vec<MixPlacement>, duration_seconds: f64) -> Self {
        Self {
            placements,
            duration_seconds,
        }
    }

    pub fn placements(&self) -> &[MixPlacement] {
        &self.placements
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}

/// Chooses a sound for each timeline event.
#[derive(Debug, Clone)]
pub struct MixPlanner<'a> {
    library: &'a SoundLibrary,
    threshold: f64,
    tail_seconds: f64,
}

impl<'a> MixPlanner<'a> {
    pub fn new(library: &'a SoundLibrary, analysis: &ClickAnalysis) -> Self {
        Self {
            library,
            threshold: analysis.threshold,
            tail_seconds: DEFAULT_TAIL_SECONDS,
        }
    }

    pub fn with_tail(mut self, tail_seconds: f64) -> Self {
        self.tail_seconds = tail_seconds;
        self
    }

    /// Plans the whole timeline.
    pub fn plan(&self, timeline: &MergedTimeline, picker: &mut dyn IndexPicker) -> MixPlan {
        let (placements, _) = self.plan_events(
            timeline.events(),
            timeline.tps(),
            ClassifierState::default(),
            picker,
        );

        let skipped = timeline.len() - placements.len();
        if skipped > 0 {
            tracing::warn!(skipped, "no release sounds available, release events left silent");
        }

        let plan = MixPlan::new(placements, timeline.duration_seconds() + self.tail_seconds);
        tracing::info!(
            placements = plan.len(),
            duration_seconds = plan.duration_seconds(),
            "built mix plan"
        );
        plan
    }

    /// Plans a contiguous run of events, starting from `state` and returning
    /// the state after the last event so the next run can continue from it.
    pub fn plan_events(
        &self,
        events: &[TimelineEvent],
        tps: f64,
        mut state: ClassifierState,
        picker: &mut dyn IndexPicker,
    ) -> (Vec<MixPlacement>, ClassifierState) {
        let mut placements = Vec::with_capacity(events.len());

        for event in events {
            let time = f64::from(event.tick) / tps;

            let sound = if event.down {
                let rapid = time - state.last_press_time < self.threshold;
                state.last_press_time = time;
                self.press_sound(rapid, picker)
            } else {
                pick(self.library.sounds(SoundRole::Release), picker)
            };

            if let Some(sound) = sound {
                placements.push(MixPlacement {
                    sound: sound.clone(),
                    offset_ms: (time * 1000.0).floor() as u64,
                });
            }
        }

        (placements, state)
    }

    fn press_sound(&self, rapid: bool, picker: &mut dyn IndexPicker) -> Option<&'a PathBuf> {
        let hard = self.library.sounds(SoundRole::HardPress);
        let soft = self.library.sounds(SoundRole::SoftPress);

        let pool = if rapid && !hard.is_empty() {
            hard
        } else if !soft.is_empty() {
            soft
        } else {
            hard
        };
        pick(pool, picker)
    }
}

fn pick<'s>(pool: &'s [PathBuf], picker: &mut dyn IndexPicker) -> Option<&'s PathBuf> {
    if pool.is_empty() {
        return None;
    }
    let index = picker.pick(pool.len()).min(pool.len() - 1);
    pool.get(index)
}
