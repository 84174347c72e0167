// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory segments and their compressed files.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use uuid::Uuid;

use crate::error::LogFileError;

/// Append-only buffer of NDJSON lines.
#[derive(Debug, Default)]
pub struct Segment {
    buffer: Vec<u8>,
    entries: usize,
}

impl Segment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether adding `line_len` bytes would exceed either cap.
    ///
    /// An empty segment always accepts a line, even an oversized one.
    pub fn is_full_for(&self, line_len: usize, max_entries: usize, max_bytes: usize) -> bool {
        self.entries > 0
            && (self.entries + 1 > max_entries || self.buffer.len() + line_len + 1 > max_bytes)
    }

    /// Append one serialized entry followed by a newline.
    pub fn push(&mut self, line: &str) {
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.push(b'\n');
        self.entries += 1;
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Buffered size in bytes.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// A sealed, compressed segment waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub uuid: Uuid,
    pub path: PathBuf,
    pub entries: usize,
    /// Failed delivery attempts so far.
    pub attempts: u32,
}

impl LogFile {
    /// Compress `segment` into `<dir>/<uuid>.ndjson.gz`.
    pub fn write(dir: &Path, segment: &Segment) -> Result<Self, LogFileError> {
        fs::create_dir_all(dir)?;

        let uuid = Uuid::new_v4();
        let path = dir.join(format!("{}.ndjson.gz", uuid));
        let file = File::create(&path)?;

        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(segment.as_bytes())?;
        encoder.finish()?.flush()?;

        Ok(Self {
            uuid,
            path,
            entries: segment.len(),
            attempts: 0,
        })
    }

    /// Compressed file content, as uploaded to the hub.
    pub fn read_bytes(&self) -> Result<Vec<u8>, LogFileError> {
        fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LogFileError::NotFound(self.path.display().to_string()),
            _ => e.into(),
        })
    }

    /// Decompressed NDJSON lines.
    pub fn read_lines(&self) -> Result<Vec<String>, LogFileError> {
        let compressed = self.read_bytes()?;
        let mut content = String::new();
        GzDecoder::new(compressed.as_slice()).read_to_string(&mut content)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Remove the file. A file that is already gone is not an error.
    pub fn delete(&self) -> Result<(), LogFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete, logging failures at debug level.
    pub fn delete_quietly(&self) {
        if let Err(e) = self.delete() {
            debug!(file = %self.path.display(), error = %e, "Failed to delete request log file");
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
