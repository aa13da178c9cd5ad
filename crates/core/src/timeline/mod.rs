use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{replay::InputEvent, ClickTrackError, FormatError, ParsedReplay, ReplayDecoder, Result};

/// One press or release on the merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub tick: u32,
    pub down: bool,
    pub button: u32,
    pub player_one: bool,
}

impl From<&InputEvent> for TimelineEvent {
    fn from(event: &InputEvent) -> Self {
        Self {
            tick: event.tick,
            down: event.down,
            button: event.button,
            player_one: event.player_one,
        }
    }
}

/// Input events from both players ordered by tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTimeline {
    tps: f64,
    events: Vec<TimelineEvent>,
}

impl MergedTimeline {
    /// Builds a timeline from events that are already in tick order.
    pub fn new(tps: f64, events: Vec<TimelineEvent>) -> std::result::Result<Self, FormatError> {
        if !(tps.is_finite() && tps > 0.0) {
            return Err(FormatError::InvalidTickRate(tps as f32));
        }
        if events.is_empty() {
            return Err(FormatError::NoInputEvents);
        }
        Ok(Self { tps, events })
    }

    pub fn from_replay(replay: &ParsedReplay) -> std::result::Result<Self, FormatError> {
        let p1 = replay.inputs_p1.iter().map(TimelineEvent::from);
        let p2 = replay.inputs_p2.iter().map(TimelineEvent::from);
        Self::new(f64::from(replay.header.tps), merge_events(p1, p2))
    }

    /// Parses a JSON macro in either the paired-player or the flat `clicks` layout.
    pub fn from_json_str(text: &str, default_tps: f64) -> std::result::Result<Self, FormatError> {
        let document: MacroDocument = serde_json::from_str(text)?;
        document.into_timeline(default_tps)
    }

    pub fn tps(&self) -> f64 {
        self.tps
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Converts a tick index into seconds.
    pub fn seconds(&self, tick: u32) -> f64 {
        f64::from(tick) / self.tps
    }

    /// Time of the last event in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.events
            .last()
            .map(|event| self.seconds(event.tick))
            .unwrap_or(0.0)
    }

    pub fn press_count(&self) -> usize {
        self.events.iter().filter(|event| event.down).count()
    }
}

/// Concatenates both players' events and stably sorts them by tick.
pub fn merge_events(
    first: impl IntoIterator<Item = TimelineEvent>,
    second: impl IntoIterator<Item = TimelineEvent>,
) -> Vec<TimelineEvent> {
    let mut events: Vec<TimelineEvent> = first.into_iter().chain(second).collect();
    events.sort_by_key(|event| event.tick);
    events
}

/// Loads a timeline from a `.re3` replay or a JSON macro file.
pub fn load(path: impl AsRef<Path>, default_tps: f64) -> Result<MergedTimeline> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ClickTrackError::SourceNotFound {
            what: "replay file",
            path: path.to_path_buf(),
        });
    }

    let is_binary = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("re3"))
        .unwrap_or(false);

    let timeline = if is_binary {
        let decoder = ReplayDecoder::open(path)?;
        MergedTimeline::from_replay(decoder.parse()?)?
    } else {
        let text = std::fs::read_to_string(path)?;
        MergedTimeline::from_json_str(&text, default_tps)?
    };

    tracing::info!(
        path = %path.display(),
        tps = timeline.tps(),
        actions = timeline.len(),
        duration_seconds = timeline.duration_seconds(),
        "loaded macro"
    );
    Ok(timeline)
}

/// JSON macro input. Accepts the paired-player layout (also produced by
/// [`ReplayDecoder::export_json`]) or a flat `clicks` list.
#[derive(Debug, Deserialize)]
struct MacroDocument {
    fps: Option<f64>,
    tps: Option<f64>,
    header: Option<MacroHeader>,
    #[serde(rename = "inputFrames_p1")]
    inputs_p1: Option<Vec<MacroInput>>,
    #[serde(rename = "inputFrames_p2")]
    inputs_p2: Option<Vec<MacroInput>>,
    clicks: Option<Vec<MacroClick>>,
}

#[derive(Debug, Deserialize)]
struct MacroHeader {
    tps: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MacroInput {
    #[serde(deserialize_with = "frame_number")]
    frame: u32,
    down: bool,
    #[serde(default)]
    button: u32,
    #[serde(rename = "isPlayer1")]
    player_one: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MacroClick {
    #[serde(deserialize_with = "frame_number")]
    frame: u32,
    press: bool,
    #[serde(default)]
    button: u32,
}

/// Accepts `12` as well as `12.0`; fractional, negative or oversized frames are rejected.
fn frame_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "frame must be a non-negative whole number, got {value}"
        )));
    }
    Ok(value as u32)
}

impl MacroDocument {
    fn tick_rate(&self, default_tps: f64) -> f64 {
        let usable = |value: Option<f64>| value.filter(|tps| tps.is_finite() && *tps > 0.0);
        usable(self.fps)
            .or_else(|| usable(self.tps))
            .or_else(|| usable(self.header.as_ref().and_then(|header| header.tps)))
            .unwrap_or(default_tps)
    }

    fn into_timeline(self, default_tps: f64) -> std::result::Result<MergedTimeline, FormatError> {
        let tps = self.tick_rate(default_tps);

        let events = if self.inputs_p1.is_some() || self.inputs_p2.is_some() {
            let player = |inputs: Option<Vec<MacroInput>>, player_one: bool| {
                inputs.unwrap_or_default().into_iter().map(move |input| TimelineEvent {
                    tick: input.frame,
                    down: input.down,
                    button: input.button,
                    player_one: input.player_one.unwrap_or(player_one),
                })
            };
            merge_events(player(self.inputs_p1, true), player(self.inputs_p2, false))
        } else if let Some(clicks) = self.clicks {
            let events = clicks.into_iter().map(|click| TimelineEvent {
                tick: click.frame,
                down: click.press,
                button: click.button,
                player_one: true,
            });
            merge_events(events, std::iter::empty())
        } else {
            return Err(FormatError::Json(
                "expected `inputFrames_p1`/`inputFrames_p2` or `clicks`".to_string(),
            ));
        };

        MergedTimeline::new(tps, events)
    }
}
