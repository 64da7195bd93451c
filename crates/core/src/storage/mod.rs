//! Persistence for plays and the channel set.
//!
//! Sessions only ever see plays through [`PlayStore`]; [`FileStore`] keeps
//! them as JSON documents on disk.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    model::{Channel, Play, PlaySummary},
    PiLitesError, Result,
};

pub trait PlayStore: Send + Sync {
    /// Fails with [`PiLitesError::NotFound`] for an unknown id.
    fn load_play(&self, id: &str) -> Result<Play>;
    fn save_play(&self, play: &Play) -> Result<()>;
    /// Returns whether a play was removed.
    fn delete_play(&self, id: &str) -> Result<bool>;
    fn list_plays(&self) -> Result<Vec<PlaySummary>>;
    /// An empty list when no channels were ever saved.
    fn load_channels(&self) -> Result<Vec<Channel>>;
    fn save_channels(&self, channels: &[Channel]) -> Result<()>;
}

/// Layout: `<root>/channels.json` and `<root>/plays/play-<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the store, creating its directories when missing.
    pub fn create_dirs(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir_all(store.plays_dir())?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plays_dir(&self) -> PathBuf {
        self.root.join("plays")
    }

    fn channels_path(&self) -> PathBuf {
        self.root.join("channels.json")
    }

    fn play_path(&self, id: &str) -> Result<PathBuf> {
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(PiLitesError::InvalidInput(
                "play ids may only contain letters, digits, `-` and `_`",
            ));
        }
        Ok(self.plays_dir().join(format!("play-{id}.json")))
    }
}

/// Writes next to the target and renames over it, so readers never observe
/// a half-written document.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl PlayStore for FileStore {
    fn load_play(&self, id: &str) -> Result<Play> {
        read_json(&self.play_path(id)?)?.ok_or_else(|| PiLitesError::NotFound(format!("play `{id}`")))
    }

    fn save_play(&self, play: &Play) -> Result<()> {
        let path = self.play_path(&play.id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(play)?)?;
        debug!(play = %play.id, path = %path.display(), "saved play");
        Ok(())
    }

    fn delete_play(&self, id: &str) -> Result<bool> {
        match fs::remove_file(self.play_path(id)?) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn list_plays(&self) -> Result<Vec<PlaySummary>> {
        let entries = match fs::read_dir(self.plays_dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut plays = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_play = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("play-") && name.ends_with(".json"));
            if !is_play {
                continue;
            }
            match read_json::<Play>(&path) {
                Ok(Some(play)) => plays.push(play.summary()),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable play"),
            }
        }
        plays.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(plays)
    }

    fn load_channels(&self) -> Result<Vec<Channel>> {
        Ok(read_json(&self.channels_path())?.unwrap_or_default())
    }

    fn save_channels(&self, channels: &[Channel]) -> Result<()> {
        write_atomic(&self.channels_path(), &serde_json::to_vec_pretty(channels)?)
    }
}
