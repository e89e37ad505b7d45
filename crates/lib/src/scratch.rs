//! Scratch storage for generated audio.
//!
//! Every pipeline invocation gets its own [`InvocationKey`]; files are named from the key plus a
//! random suffix, so concurrent invocations never share a path. An [`AudioArtifact`] owns its
//! file and removes it when released or dropped.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

/// Identity of one pipeline invocation: the conversation plus a fresh random id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationKey {
    pub conversation_id: String,
    pub invocation_id: Uuid,
}

impl InvocationKey {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            invocation_id: Uuid::new_v4(),
        }
    }

    /// File-name-safe prefix: sanitized conversation id and invocation id.
    pub fn file_prefix(&self) -> String {
        let conv: String = self
            .conversation_id
            .chars()
            .take(32)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}-{}-", conv, self.invocation_id.simple())
    }
}

/// Directory that holds in-flight audio files.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Use `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty file for `key`. Returns an async handle for writing and the artifact that owns the path.
    pub fn create(
        &self,
        key: &InvocationKey,
        extension: &str,
        title: &str,
    ) -> io::Result<(tokio::fs::File, AudioArtifact)> {
        let named = tempfile::Builder::new()
            .prefix(&key.file_prefix())
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.root)?;
        let (file, path) = named.into_parts();
        let artifact = AudioArtifact {
            path,
            title: display_title(title),
        };
        Ok((tokio::fs::File::from_std(file), artifact))
    }
}

/// A generated audio file owned by one pipeline invocation. Deleted on [`release`](Self::release) or drop.
#[derive(Debug)]
pub struct AudioArtifact {
    path: TempPath,
    title: String,
}

impl AudioArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Title shown by the messaging client next to the audio.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Delete the file now, reporting any error (drop deletes silently).
    pub fn release(self) -> io::Result<()> {
        self.path.close()
    }
}

const MAX_TITLE_CHARS: usize = 64;

fn display_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_TITLE_CHARS {
        return text.to_string();
    }
    let mut t: String = text.chars().take(MAX_TITLE_CHARS - 1).collect();
    t.push('…');
    t
}
