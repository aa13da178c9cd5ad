//! Decoder for the binary `.re3` replay format.
//!
//! The layout is a fixed little-endian header followed by four record runs:
//! player one physics, player two physics, player one inputs, player two
//! inputs. There is no version tag.

use std::{cell::OnceCell, path::Path};

use serde::{Deserialize, Serialize};

use crate::{ClickTrackError, FormatError, Result};

pub const HEADER_LEN: usize = 20;
/// Four `u32`/`f32` fields, an `f64`, a flag byte and seven bytes of padding.
pub const PHYSICS_FRAME_LEN: usize = 32;
pub const INPUT_EVENT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub tps: f32,
    pub p1_physic_count: u32,
    pub p2_physic_count: u32,
    pub p1_input_count: u32,
    pub p2_input_count: u32,
}

impl Header {
    /// Number of bytes the header's counts require, header included.
    pub fn required_len(&self) -> u64 {
        let physics = u64::from(self.p1_physic_count) + u64::from(self.p2_physic_count);
        let inputs = u64::from(self.p1_input_count) + u64::from(self.p2_input_count);
        HEADER_LEN as u64 + physics * PHYSICS_FRAME_LEN as u64 + inputs * INPUT_EVENT_LEN as u64
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.tps.to_le_bytes());
        out[4..8].copy_from_slice(&self.p1_physic_count.to_le_bytes());
        out[8..12].copy_from_slice(&self.p2_physic_count.to_le_bytes());
        out[12..16].copy_from_slice(&self.p1_input_count.to_le_bytes());
        out[16..20].copy_from_slice(&self.p2_input_count.to_le_bytes());
        out
    }
}

/// One physics sample. Only decoded to keep the cursor aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsFrame {
    #[serde(rename = "frame")]
    pub tick: u32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub y_accel: f64,
    pub player: bool,
}

/// A single press or release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "frame")]
    pub tick: u32,
    pub down: bool,
    pub button: u32,
    #[serde(rename = "isPlayer1")]
    pub player_one: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReplay {
    pub header: Header,
    #[serde(rename = "physicFrames_p1")]
    pub physics_p1: Vec<PhysicsFrame>,
    #[serde(rename = "physicFrames_p2")]
    pub physics_p2: Vec<PhysicsFrame>,
    #[serde(rename = "inputFrames_p1")]
    pub inputs_p1: Vec<InputEvent>,
    #[serde(rename = "inputFrames_p2")]
    pub inputs_p2: Vec<InputEvent>,
}

impl ParsedReplay {
    /// Serialises the replay back into the binary layout. Padding is zeroed.
    pub fn encode(&self) -> Vec<u8> {
        let physics = self.physics_p1.len() + self.physics_p2.len();
        let inputs = self.inputs_p1.len() + self.inputs_p2.len();
        let mut out =
            Vec::with_capacity(HEADER_LEN + physics * PHYSICS_FRAME_LEN + inputs * INPUT_EVENT_LEN);
        out.extend_from_slice(&self.header.encode());

        for frame in self.physics_p1.iter().chain(&self.physics_p2) {
            out.extend_from_slice(&frame.tick.to_le_bytes());
            out.extend_from_slice(&frame.x.to_le_bytes());
            out.extend_from_slice(&frame.y.to_le_bytes());
            out.extend_from_slice(&frame.rotation.to_le_bytes());
            out.extend_from_slice(&frame.y_accel.to_le_bytes());
            out.push(u8::from(frame.player));
            out.extend_from_slice(&[0u8; 7]);
        }

        for event in self.inputs_p1.iter().chain(&self.inputs_p2) {
            out.extend_from_slice(&event.tick.to_le_bytes());
            out.push(u8::from(event.down));
            out.extend_from_slice(&[0u8; 3]);
            out.extend_from_slice(&event.button.to_le_bytes());
            out.push(u8::from(event.player_one));
            out.extend_from_slice(&[0u8; 3]);
        }

        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatistics {
    pub presses: usize,
    pub releases: usize,
    pub total_inputs: usize,
    pub physics_frames: u32,
}

impl PlayerStatistics {
    fn collect(inputs: &[InputEvent], physics_frames: u32) -> Self {
        let presses = inputs.iter().filter(|event| event.down).count();
        Self {
            presses,
            releases: inputs.len() - presses,
            total_inputs: inputs.len(),
            physics_frames,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStatistics {
    pub tps: f32,
    pub duration_seconds: f64,
    pub total_ticks: u32,
    pub player1: PlayerStatistics,
    pub player2: PlayerStatistics,
}

/// Owns a replay buffer and decodes it at most once.
#[derive(Debug)]
pub struct ReplayDecoder {
    buffer: Vec<u8>,
    parsed: OnceCell<ParsedReplay>,
}

impl ReplayDecoder {
    pub fn from_bytes(buffer: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: buffer.into(),
            parsed: OnceCell::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ClickTrackError::SourceNotFound {
                what: "replay file",
                path: path.to_path_buf(),
            });
        }
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// Decodes the buffer, or returns the cached result of an earlier call.
    pub fn parse(&self) -> std::result::Result<&ParsedReplay, FormatError> {
        if let Some(parsed) = self.parsed.get() {
            return Ok(parsed);
        }

        let parsed = decode(&self.buffer)?;
        tracing::debug!(
            p1_inputs = parsed.inputs_p1.len(),
            p2_inputs = parsed.inputs_p2.len(),
            tps = parsed.header.tps,
            "decoded replay"
        );
        Ok(self.parsed.get_or_init(|| parsed))
    }

    pub fn statistics(&self) -> std::result::Result<ReplayStatistics, FormatError> {
        let data = self.parse()?;

        let last_tick = |inputs: &[InputEvent]| inputs.last().map(|event| event.tick).unwrap_or(0);
        let total_ticks = last_tick(&data.inputs_p1).max(last_tick(&data.inputs_p2));

        Ok(ReplayStatistics {
            tps: data.header.tps,
            duration_seconds: f64::from(total_ticks) / f64::from(data.header.tps),
            total_ticks,
            player1: PlayerStatistics::collect(&data.inputs_p1, data.header.p1_physic_count),
            player2: PlayerStatistics::collect(&data.inputs_p2, data.header.p2_physic_count),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let data = self.parse()?;
        serde_json::to_string_pretty(data)
            .map_err(|err| ClickTrackError::Format(FormatError::from(err)))
    }

    /// Writes the decoded replay as pretty-printed JSON for inspection.
    pub fn export_json(&self, output: impl AsRef<Path>) -> Result<&ParsedReplay> {
        let json = self.to_json()?;
        std::fs::write(output.as_ref(), json)?;
        Ok(self.parse()?)
    }
}

fn decode(buffer: &[u8]) -> std::result::Result<ParsedReplay, FormatError> {
    let mut reader = ByteReader::new(buffer);

    let header = Header {
        tps: reader.read_f32()?,
        p1_physic_count: reader.read_u32()?,
        p2_physic_count: reader.read_u32()?,
        p1_input_count: reader.read_u32()?,
        p2_input_count: reader.read_u32()?,
    };

    if !(header.tps.is_finite() && header.tps > 0.0) {
        return Err(FormatError::InvalidTickRate(header.tps));
    }

    let required = header.required_len();
    if required > buffer.len() as u64 {
        return Err(FormatError::CountsExceedBuffer {
            required,
            len: buffer.len(),
        });
    }
    if required < buffer.len() as u64 {
        tracing::debug!(
            trailing = buffer.len() as u64 - required,
            "ignoring trailing bytes after last input event"
        );
    }

    let physics_p1 = reader.read_records(header.p1_physic_count, read_physics_frame)?;
    let physics_p2 = reader.read_records(header.p2_physic_count, read_physics_frame)?;
    let inputs_p1 = reader.read_records(header.p1_input_count, read_input_event)?;
    let inputs_p2 = reader.read_records(header.p2_input_count, read_input_event)?;

    Ok(ParsedReplay {
        header,
        physics_p1,
        physics_p2,
        inputs_p1,
        inputs_p2,
    })
}

fn read_physics_frame(reader: &mut ByteReader<'_>) -> std::result::Result<PhysicsFrame, FormatError> {
    let frame = PhysicsFrame {
        tick: reader.read_u32()?,
        x: reader.read_f32()?,
        y: reader.read_f32()?,
        rotation: reader.read_f32()?,
        y_accel: reader.read_f64()?,
        player: reader.read_bool()?,
    };
    reader.skip(7)?;
    Ok(frame)
}

fn read_input_event(reader: &mut ByteReader<'_>) -> std::result::Result<InputEvent, FormatError> {
    let tick = reader.read_u32()?;
    let down = reader.read_bool()?;
    reader.skip(3)?;
    let button = reader.read_u32()?;
    let player_one = reader.read_bool()?;
    reader.skip(3)?;

    Ok(InputEvent {
        tick,
        down,
        button,
        player_one,
    })
}

/// Forward-only cursor over a byte slice.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> std::result::Result<[u8; N], FormatError> {
        let end = self.pos.checked_add(N).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: N,
                len: self.data.len(),
            });
        };

        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> std::result::Result<(), FormatError> {
        if self.pos + n > self.data.len() {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: n,
                len: self.data.len(),
            });
        }
        self.pos += n;
        Ok(())
    }

    fn read_u32(&mut self) -> std::result::Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn read_f32(&mut self) -> std::result::Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn read_f64(&mut self) -> std::result::Result<f64, FormatError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn read_bool(&mut self) -> std::result::Result<bool, FormatError> {
        let [byte] = self.take::<1>()?;
        Ok(byte != 0)
    }

    fn read_records<T>(
        &mut self,
        count: u32,
        read: fn(&mut Self) -> std::result::Result<T, FormatError>,
    ) -> std::result::Result<Vec<T>, FormatError> {
        (0..count).map(|_| read(self)).collect()
    }
}
