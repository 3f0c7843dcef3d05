// Replay recording: captures one frame per tick and finalizes a compressed,
// self-contained record of the match.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::engine::sim::{SimEvent, SimSnapshot};
use crate::protocol::FinalScore;

pub const REPLAY_SCHEMA_VERSION: u32 = 1;

/// One recorded frame: an immutable deep copy of the public state plus the
/// events the simulation emitted that tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    pub frame: u64,
    pub timestamp: DateTime<Utc>,
    pub state: SimSnapshot,
    pub events: Vec<SimEvent>,
}

/// A finalized match replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    pub match_id: String,
    pub p1_id: String,
    pub p2_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub winner_id: Option<String>,
    pub final_score: FinalScore,
    pub frame_count: usize,
    pub frames: Vec<ReplayFrame>,
    /// Indexes into `frames` where round_start, ko, or match_end fired.
    pub key_frames: Vec<usize>,
    pub tick_rate: u32,
    pub schema_version: u32,
}

/// Collects frames during a match; `finalize` is called exactly once at the
/// end of the match.
pub struct ReplayRecorder {
    match_id: String,
    p1_id: String,
    p2_id: String,
    tick_rate: u32,
    started_at: DateTime<Utc>,
    frames: Vec<ReplayFrame>,
    key_frames: Vec<usize>,
}

impl ReplayRecorder {
    pub fn new(match_id: &str, p1_id: &str, p2_id: &str, tick_rate: u32) -> Self {
        Self {
            match_id: match_id.to_string(),
            p1_id: p1_id.to_string(),
            p2_id: p2_id.to_string(),
            tick_rate,
            started_at: Utc::now(),
            frames: Vec::new(),
            key_frames: Vec::new(),
        }
    }

    /// Record one frame. The snapshot is an owned deep copy, so later
    /// simulation mutation cannot touch recorded frames.
    pub fn record(&mut self, state: SimSnapshot, events: &[SimEvent]) {
        let is_key = events.iter().any(|e| {
            matches!(
                e,
                SimEvent::RoundStart { .. } | SimEvent::Ko { .. } | SimEvent::MatchEnd { .. }
            )
        });
        if is_key {
            self.key_frames.push(self.frames.len());
        }
        self.frames.push(ReplayFrame {
            frame: state.frame,
            timestamp: Utc::now(),
            state,
            events: events.to_vec(),
        });
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Consume the recorder and produce the final replay record.
    pub fn finalize(self, winner_id: Option<String>, final_score: FinalScore) -> Replay {
        let ended_at = Utc::now();
        Replay {
            match_id: self.match_id,
            p1_id: self.p1_id,
            p2_id: self.p2_id,
            started_at: self.started_at,
            ended_at,
            duration_ms: (ended_at - self.started_at).num_milliseconds(),
            winner_id,
            final_score,
            frame_count: self.frames.len(),
            frames: self.frames,
            key_frames: self.key_frames,
            tick_rate: self.tick_rate,
            schema_version: REPLAY_SCHEMA_VERSION,
        }
    }
}

/// Serialize and gzip a replay for storage.
pub fn compress_replay(replay: &Replay) -> Result<Vec<u8>, std::io::Error> {
    let json = serde_json::to_vec(replay)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&json)?;
    encoder.finish()
}

/// Decompress gzipped replay data back into a replay record.
pub fn decompress_replay(data: &[u8]) -> Result<Replay, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
