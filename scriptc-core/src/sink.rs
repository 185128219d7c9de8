//! Destinations for compiled artifacts.
//!
//! A sink reports its state up front so the driver can refuse an unusable
//! destination before doing any backend work. The artifact is written in a
//! single call once the code-generation stage has fully succeeded.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Not opened yet; `prepare` must run first.
    Unprepared,
    Ready,
    /// An artifact has been written; the sink accepts nothing more.
    Finalized,
    /// A previous prepare or write failed.
    Failed,
}

pub trait OutputSink {
    fn state(&self) -> SinkState;

    fn prepare(&mut self) -> io::Result<()>;

    fn write_artifact(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Wraps any writer; ready from the start, finalized after one artifact.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    writer: W,
    state: SinkState,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: SinkState::Ready,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn state(&self) -> SinkState {
        self.state
    }

    fn prepare(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_artifact(&mut self, bytes: &[u8]) -> io::Result<()> {
        let result = self.writer.write_all(bytes).and_then(|()| self.writer.flush());
        self.state = if result.is_ok() {
            SinkState::Finalized
        } else {
            SinkState::Failed
        };
        result
    }
}

/// A named output file.
///
/// Preparing stages a temporary file next to the destination; the artifact
/// replaces the destination only once it is fully written. A compile that
/// fails leaves any existing file at the path untouched.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    staged: Option<NamedTempFile>,
    state: SinkState,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: None,
            state: SinkState::Unprepared,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl OutputSink for OutputFile {
    fn state(&self) -> SinkState {
        self.state
    }

    fn prepare(&mut self) -> io::Result<()> {
        if self.state == SinkState::Ready {
            return Ok(());
        }
        match NamedTempFile::new_in(self.staging_dir()) {
            Ok(staged) => {
                debug!(
                    path = %self.path.display(),
                    staged = %staged.path().display(),
                    "staged output file"
                );
                self.staged = Some(staged);
                self.state = SinkState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = SinkState::Failed;
                Err(err)
            }
        }
    }

    fn write_artifact(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(mut staged) = self.staged.take() else {
            return Err(io::Error::other("output file was not prepared"));
        };
        let result = staged
            .write_all(bytes)
            .and_then(|()| staged.flush())
            .and_then(|()| staged.persist(&self.path).map(drop).map_err(io::Error::from));
        self.state = if result.is_ok() {
            SinkState::Finalized
        } else {
            SinkState::Failed
        };
        result
    }
}
