//! Chat transcripts stored as append-only JSONL rollouts.
//!
//! A rollout starts with a schema header and a creation event; every finished
//! message is appended as one more line.

use super::StateError;
use crate::types::ChatMessage;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use studyos_rs_protocol::SessionId;
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;
const ROLLOUT_EXT: &str = "jsonl";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptRecord {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

pub trait TranscriptStore: Send + Sync {
    /// Start an empty transcript. Fails if the id is already taken.
    fn create_transcript(
        &self,
        transcript_id: SessionId,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError>;
    /// Append one finished message.
    fn append_message(
        &self,
        transcript_id: SessionId,
        message: &ChatMessage,
    ) -> Result<(), StateError>;
    fn load_transcript(
        &self,
        transcript_id: SessionId,
    ) -> Result<Option<TranscriptRecord>, StateError>;
    /// Transcript written to most recently, if any.
    fn latest_transcript(&self) -> Result<Option<SessionId>, StateError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RolloutLine {
    SchemaVersion {
        version: u32,
    },
    TranscriptCreated {
        transcript_id: SessionId,
        created_at: DateTime<Utc>,
    },
    Message {
        transcript_id: SessionId,
        message: ChatMessage,
    },
}

/// Replays rollout lines into a record.
#[derive(Default)]
struct Replay {
    version: Option<u32>,
    created_at: Option<DateTime<Utc>>,
    messages: Vec<ChatMessage>,
}

impl Replay {
    fn apply(&mut self, line: RolloutLine) -> Result<(), StateError> {
        match line {
            RolloutLine::SchemaVersion { version } if version > SCHEMA_VERSION => {
                return Err(StateError::UnsupportedSchema(version));
            }
            RolloutLine::SchemaVersion { version } => self.version = Some(version),
            RolloutLine::TranscriptCreated { created_at, .. } => self.created_at = Some(created_at),
            RolloutLine::Message { message, .. } => self.messages.push(message),
        }
        Ok(())
    }

    fn into_record(self, id: SessionId) -> Result<TranscriptRecord, StateError> {
        match (self.version, self.created_at) {
            (Some(_), Some(created_at)) => Ok(TranscriptRecord {
                id,
                created_at,
                messages: self.messages,
            }),
            _ => Err(StateError::MissingMetadata),
        }
    }
}

fn write_lines(file: &mut File, lines: &[RolloutLine]) -> Result<(), StateError> {
    let mut buffer = String::new();
    for line in lines {
        buffer.push_str(&serde_json::to_string(line)?);
        buffer.push('\n');
    }
    file.write_all(buffer.as_bytes())?;
    Ok(())
}

/// One `<id>.jsonl` file per transcript under a root directory.
pub struct JsonlTranscriptStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTranscriptStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StateError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized transcript store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, transcript_id: SessionId) -> PathBuf {
        self.root.join(format!("{transcript_id}.{ROLLOUT_EXT}"))
    }
}

impl TranscriptStore for JsonlTranscriptStore {
    fn create_transcript(
        &self,
        transcript_id: SessionId,
        created_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        let _guard = self.write_lock.lock();
        let mut file = match OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(self.path(transcript_id))
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StateError::TranscriptExists(transcript_id));
            }
            Err(err) => return Err(err.into()),
        };
        write_lines(
            &mut file,
            &[
                RolloutLine::SchemaVersion {
                    version: SCHEMA_VERSION,
                },
                RolloutLine::TranscriptCreated {
                    transcript_id,
                    created_at,
                },
            ],
        )?;
        info!("created transcript (transcript_id={})", transcript_id);
        Ok(())
    }

    fn append_message(
        &self,
        transcript_id: SessionId,
        message: &ChatMessage,
    ) -> Result<(), StateError> {
        debug!(
            "appending transcript message (transcript_id={}, role={}, text_len={})",
            transcript_id,
            message.role.as_str(),
            message.text.len()
        );
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.path(transcript_id))?;
        write_lines(
            &mut file,
            &[RolloutLine::Message {
                transcript_id,
                message: message.clone(),
            }],
        )
    }

    fn load_transcript(
        &self,
        transcript_id: SessionId,
    ) -> Result<Option<TranscriptRecord>, StateError> {
        let file = match File::open(self.path(transcript_id)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut replay = Replay::default();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if !line.trim().is_empty() {
                replay.apply(serde_json::from_str(&line)?)?;
            }
        }
        replay.into_record(transcript_id).map(Some)
    }

    fn latest_transcript(&self) -> Result<Option<SessionId>, StateError> {
        let mut latest: Option<(SystemTime, SessionId)> = None;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ROLLOUT_EXT) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            let modified = fs::metadata(&path)?.modified()?;
            if latest.is_none_or(|(newest, _)| modified > newest) {
                latest = Some((modified, id));
            }
        }
        Ok(latest.map(|(_, id)| id))
    }
}
