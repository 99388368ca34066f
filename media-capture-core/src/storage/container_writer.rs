use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::config::TrackSettings;
use crate::models::device::MediaKind;
use crate::models::error::CaptureError;
use crate::models::sample::{MediaTime, SampleBuffer};
use crate::storage::container_format::{self, ContainerSummary, CHUNK_HEADER_SIZE, HEADER_SIZE};
use crate::traits::media_writer::{FinishedMedia, MediaWriter, WriterFactory};

/// Streaming writer for `.mckf` container files.
///
/// ## File Format
///
/// ```text
/// [64-byte header, count/duration/start patched on finish]
/// [chunk: track | pts | duration | len | payload]
/// [chunk: ...]
/// ```
///
/// Until `finish` succeeds the header carries zero placeholders, which
/// readers treat as an unfinalized file.
pub struct ContainerFileWriter {
    file_path: PathBuf,
    tracks: TrackSettings,
    file: Option<BufWriter<File>>,
    session_start: Option<MediaTime>,
    finished_tracks: BTreeSet<MediaKind>,
    sample_count: u64,
    media_end: MediaTime,
    total_bytes_written: u64,
}

impl ContainerFileWriter {
    /// Create the file (and its directory) and write the initial header.
    pub fn create(file_path: impl Into<PathBuf>, tracks: &TrackSettings) -> Result<Self, CaptureError> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::WriterSetupFailed(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path)
            .map_err(|e| CaptureError::WriterSetupFailed(format!("failed to create {}: {}", file_path.display(), e)))?;

        let mut writer = Self {
            file_path,
            tracks: tracks.clone(),
            file: Some(BufWriter::new(file)),
            session_start: None,
            finished_tracks: BTreeSet::new(),
            sample_count: 0,
            media_end: MediaTime::ZERO,
            total_bytes_written: 0,
        };
        writer
            .write_raw(&container_format::generate_header(tracks))
            .map_err(|e| CaptureError::WriterSetupFailed(e.to_string()))?;
        log::debug!("created container {}", writer.file_path.display());
        Ok(writer)
    }

    /// Total bytes written so far, including the header.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn has_track(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => true,
            MediaKind::Audio => self.tracks.audio.is_some(),
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }

    fn patch_header(&mut self) -> Result<(), CaptureError> {
        let buffered = self
            .file
            .take()
            .ok_or_else(|| CaptureError::FinalizationFailed("file is not open".into()))?;
        let mut file = buffered
            .into_inner()
            .map_err(|e| CaptureError::FinalizationFailed(format!("flush failed: {}", e.error())))?;

        let start = self.session_start.unwrap_or(MediaTime::ZERO);
        let patches = [
            (container_format::SAMPLE_COUNT_OFFSET, self.sample_count),
            (container_format::DURATION_OFFSET, self.media_end.as_nanos()),
            (container_format::START_OFFSET, start.as_nanos()),
        ];
        for (offset, value) in patches {
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.write_all(&value.to_le_bytes()))
                .map_err(|e| CaptureError::FinalizationFailed(format!("header patch failed: {}", e)))?;
        }
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| CaptureError::FinalizationFailed(format!("sync failed: {}", e)))?;
        Ok(())
    }
}

impl MediaWriter for ContainerFileWriter {
    fn start_session(&mut self, at: MediaTime) -> Result<(), CaptureError> {
        if self.file.is_none() {
            return Err(CaptureError::StorageError("file is not open".into()));
        }
        if self.session_start.is_some() {
            return Err(CaptureError::StorageError("session already started".into()));
        }
        self.session_start = Some(at);
        Ok(())
    }

    fn is_ready_for_more(&self, kind: MediaKind) -> bool {
        self.file.is_some()
            && self.session_start.is_some()
            && self.has_track(kind)
            && !self.finished_tracks.contains(&kind)
    }

    fn append(&mut self, sample: &SampleBuffer) -> Result<(), CaptureError> {
        let kind = sample.media_type();
        if !self.has_track(kind) {
            return Err(CaptureError::StorageError(format!("no {} track in this file", kind)));
        }
        if self.finished_tracks.contains(&kind) {
            return Err(CaptureError::StorageError(format!("{} track already finished", kind)));
        }
        let start = self
            .session_start
            .ok_or_else(|| CaptureError::StorageError("append before session start".into()))?;
        if sample.presentation_timestamp() < start {
            return Err(CaptureError::StorageError("sample precedes session start".into()));
        }

        let pts = sample.presentation_timestamp() - start;
        let payload = sample.payload();
        let len = u32::try_from(payload.len())
            .map_err(|_| CaptureError::StorageError(format!("sample too large: {} bytes", payload.len())))?;
        let chunk = container_format::chunk_header(kind, pts, sample.duration(), len);
        self.write_raw(&chunk)?;
        self.write_raw(payload)?;

        self.sample_count += 1;
        self.media_end = self.media_end.max(pts + sample.duration());
        Ok(())
    }

    fn mark_finished(&mut self, kind: MediaKind) {
        self.finished_tracks.insert(kind);
    }

    fn finish(&mut self) -> Result<FinishedMedia, CaptureError> {
        self.finished_tracks.insert(MediaKind::Video);
        self.finished_tracks.insert(MediaKind::Audio);
        self.patch_header()?;

        let checksum = sha256_file(&self.file_path)?;
        log::info!(
            "finalized {} ({} samples, {:.2}s)",
            self.file_path.display(),
            self.sample_count,
            self.media_end.as_secs_f64()
        );
        Ok(FinishedMedia {
            checksum,
            media_duration: self.media_end,
            bytes_written: self.total_bytes_written,
        })
    }

    fn output_path(&self) -> &Path {
        &self.file_path
    }
}

/// Creates a [`ContainerFileWriter`] per recording.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerWriterFactory;

impl WriterFactory for ContainerWriterFactory {
    fn create_writer(&self, path: &Path, tracks: &TrackSettings) -> Result<Box<dyn MediaWriter>, CaptureError> {
        Ok(Box::new(ContainerFileWriter::create(path, tracks)?))
    }
}

/// One chunk's framing, as read back from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub kind: MediaKind,
    /// Timestamp relative to the session start.
    pub pts: MediaTime,
    pub duration: MediaTime,
    pub len: u32,
}

/// Read and parse a container file's header.
pub fn read_container_summary(path: &Path) -> Result<ContainerSummary, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to open {}: {}", path.display(), e)))?;
    let mut header = [0u8; HEADER_SIZE];
    file.read_exact(&mut header)
        .map_err(|e| CaptureError::StorageError(format!("failed to read header: {}", e)))?;
    container_format::parse_header(&header).map_err(CaptureError::StorageError)
}

/// Walk every chunk in a container file, skipping payloads.
pub fn read_container_chunks(path: &Path) -> Result<Vec<ChunkInfo>, CaptureError> {
    let storage = |e: std::io::Error| CaptureError::StorageError(format!("failed to read chunks: {}", e));
    let file = File::open(path).map_err(storage)?;
    let total = file.metadata().map_err(storage)?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(HEADER_SIZE as u64)).map_err(storage)?;

    let mut chunks = Vec::new();
    let mut position = HEADER_SIZE as u64;
    let mut framing = [0u8; CHUNK_HEADER_SIZE];
    while position + CHUNK_HEADER_SIZE as u64 <= total {
        reader.read_exact(&mut framing).map_err(storage)?;
        let kind = container_format::kind_from_track_id(framing[0])
            .ok_or_else(|| CaptureError::StorageError(format!("unknown track id {}", framing[0])))?;
        let mut pts = [0u8; 8];
        let mut duration = [0u8; 8];
        let mut len = [0u8; 4];
        pts.copy_from_slice(&framing[1..9]);
        duration.copy_from_slice(&framing[9..17]);
        len.copy_from_slice(&framing[17..21]);
        let len = u32::from_le_bytes(len);

        reader.seek_relative(len as i64).map_err(storage)?;
        position += CHUNK_HEADER_SIZE as u64 + len as u64;
        chunks.push(ChunkInfo {
            kind,
            pts: MediaTime::from_nanos(u64::from_le_bytes(pts)),
            duration: MediaTime::from_nanos(u64::from_le_bytes(duration)),
            len,
        });
    }
    Ok(chunks)
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let file = File::open(path)
        .map_err(|e| CaptureError::FinalizationFailed(format!("failed to open file for checksum: {}", e)))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut block = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut block)
            .map_err(|e| CaptureError::FinalizationFailed(format!("failed to read file for checksum: {}", e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::video_frame;

    fn audio_tracks() -> TrackSettings {
        TrackSettings::default()
    }

    #[test]
    fn writes_header_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.mckf");

        let mut writer = ContainerFileWriter::create(&path, &audio_tracks()).unwrap();
        let first = video_frame(10);
        writer.start_session(first.presentation_timestamp()).unwrap();
        writer.append(&first).unwrap();
        writer.append(&video_frame(11)).unwrap();
        let finished = writer.finish().unwrap();

        assert_eq!(finished.checksum.len(), 64);
        let data = fs::read(&path).unwrap();
        assert_eq!(data.len() as u64, finished.bytes_written);
        assert_eq!(&data[0..4], b"MCKF");

        let summary = read_container_summary(&path).unwrap();
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.session_start, first.presentation_timestamp());
        assert_eq!(summary.media_duration, MediaTime::from_frame_index(2, 30));

        let chunks = read_container_chunks(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].pts, MediaTime::ZERO);
        assert_eq!(chunks[1].pts, MediaTime::from_frame_index(1, 30));
        assert_eq!(chunks[0].len as usize, first.payload().len());
    }

    #[test]
    fn checksum_matches_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sum.mckf");
        let mut writer = ContainerFileWriter::create(&path, &audio_tracks()).unwrap();
        writer.start_session(MediaTime::ZERO).unwrap();
        writer.append(&video_frame(0)).unwrap();
        let finished = writer.finish().unwrap();

        let expected = hex_encode(&Sha256::digest(fs::read(&path).unwrap()));
        assert_eq!(finished.checksum, expected);
    }

    #[test]
    fn rejects_append_before_session_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerFileWriter::create(dir.path().join("a.mckf"), &audio_tracks()).unwrap();
        assert!(!writer.is_ready_for_more(MediaKind::Video));
        assert!(writer.append(&video_frame(0)).is_err());
    }

    #[test]
    fn rejects_missing_and_finished_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let tracks = TrackSettings {
            audio: None,
            ..Default::default()
        };
        let mut writer = ContainerFileWriter::create(dir.path().join("v.mckf"), &tracks).unwrap();
        writer.start_session(MediaTime::ZERO).unwrap();

        let audio = SampleBuffer::audio_f32(MediaTime::ZERO, &[0.0; 4], 48_000.0, 2);
        assert!(!writer.is_ready_for_more(MediaKind::Audio));
        assert!(writer.append(&audio).is_err());

        writer.mark_finished(MediaKind::Video);
        assert!(!writer.is_ready_for_more(MediaKind::Video));
        assert!(writer.append(&video_frame(1)).is_err());
    }

    #[test]
    fn second_finish_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ContainerFileWriter::create(dir.path().join("f.mckf"), &audio_tracks()).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.finish(), Err(CaptureError::FinalizationFailed(_))));
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/take.mckf");
        let writer = ContainerWriterFactory.create_writer(&path, &audio_tracks()).unwrap();
        assert_eq!(writer.output_path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn unfinalized_file_has_placeholder_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mckf");
        let mut writer = ContainerFileWriter::create(&path, &audio_tracks()).unwrap();
        writer.start_session(MediaTime::ZERO).unwrap();
        writer.append(&video_frame(0)).unwrap();
        drop(writer);

        let summary = read_container_summary(&path).unwrap();
        assert_eq!(summary.sample_count, 0);
        assert_eq!(read_container_chunks(&path).unwrap().len(), 1);
    }
}
