//! Error types for score loading and playback control.
//!
//! Pitch normalization, transposition and overlay placement never fail;
//! they degrade locally and log. Only loading a score and acquiring
//! per-session resources can surface an error to the caller.

use thiserror::Error;

/// Failure to turn score markup into a playable cursor.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unsupported root element: '{0}'. Only 'score-partwise' is supported.")]
    UnsupportedRoot(String),

    #[error("Invalid UTF-8 in MusicXML data: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to open MXL archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No MusicXML file found in archive. Files: {0:?}")]
    MissingRootFile(Vec<String>),

    #[error("Failed to read score: {0}")]
    Io(#[from] std::io::Error),

    #[error("Score contains no parts")]
    Empty,

    #[error("Note durations in measure {0} run past the representable range")]
    DurationOverflow(i32),
}

/// Failure of a player operation.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Playback timers need a Tokio runtime on the calling thread.
    #[error("playback requires a running Tokio runtime")]
    NoRuntime,

    #[error("failed to create synthesizer: {0}")]
    Synthesizer(String),

    #[error("no score is loaded")]
    NoScore,

    #[error("invalid player configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_cause() {
        let err = LoadError::UnsupportedRoot("score-timewise".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported root element: 'score-timewise'. Only 'score-partwise' is supported."
        );
        let err = PlayerError::Synthesizer("device busy".to_string());
        assert_eq!(err.to_string(), "failed to create synthesizer: device busy");
        let err: PlayerError = LoadError::Empty.into();
        assert_eq!(err.to_string(), "Score contains no parts");
    }
}
