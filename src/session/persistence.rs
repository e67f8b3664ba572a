// ABOUTME: Conversation file persistence: save and load the turns after the system turn as JSON.
// ABOUTME: Writes are atomic (tmp + rename); loads validate fully before anything is applied.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::PersistError;
use crate::session::store::{Session, validate_history};
use crate::session::turn::Turn;

/// Default file name for a conversation saved without an explicit path.
pub fn default_conversation_path(dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%dT%H-%M-%S");
    dir.join(format!("conversation-{}.json", timestamp))
}

/// Save the session's history (system turn excluded) to `path`.
pub fn save_conversation(path: &Path, session: &Session) -> Result<(), PersistError> {
    let content = session.serialize()?;
    write_atomic(path, &content)?;
    info!(path = %path.display(), turns = session.history().len(), "saved conversation");
    Ok(())
}

/// Load a conversation file. The whole file must decode and contain no
/// system turn, otherwise nothing is returned.
pub fn load_conversation(path: &Path) -> Result<Vec<Turn>, PersistError> {
    let content = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let turns = Session::deserialize(&content).map_err(|source| PersistError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    validate_history(&turns).map_err(|source| PersistError::InvalidHistory {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), turns = turns.len(), "loaded conversation");
    Ok(turns)
}

/// Write `content` to `path` via a sibling tmp file and rename.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, content).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}
