use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Bytes preceding each frame payload: u32 length + u32 CRC32.
pub(crate) const FRAME_HEADER_SIZE: u64 = 8;

/// A single numbered, append-only segment file.
///
/// Segments are named `{id:010}.{extension}` so lexicographic and numeric
/// order agree when enumerating the WAL directory.
pub(crate) struct Segment {
    id: u64,
    file: File,
    size: u64,
}

impl Segment {
    /// Creates a new empty segment file. Fails if it already exists.
    pub(crate) fn create(dir: &Path, id: u64, extension: &str) -> io::Result<Self> {
        let path = dir.join(file_name(id, extension));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;

        Ok(Self { id, file, size: 0 })
    }

    /// Opens an existing segment for append, resuming at its current size.
    pub(crate) fn open(dir: &Path, id: u64, extension: &str) -> io::Result<Self> {
        let path = dir.join(file_name(id, extension));
        let file = OpenOptions::new().append(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self { id, file, size })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Appends one framed payload and returns the frame's starting offset.
    ///
    /// Frame format: `[len: u32 LE][crc32(payload): u32 LE][payload]`.
    pub(crate) fn append_frame(&mut self, payload: &[u8]) -> io::Result<u64> {
        let crc = crc32fast::hash(payload);

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE as usize + payload.len());
        #[allow(clippy::cast_possible_truncation)]
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(payload);

        let offset = self.size;
        self.file.write_all(&frame)?;
        self.size += frame.len() as u64;

        Ok(offset)
    }

    /// Forces all appended frames to stable storage.
    pub(crate) fn sync(&self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// Returns the file name for segment `id`.
pub(crate) fn file_name(id: u64, extension: &str) -> String {
    format!("{id:010}.{extension}")
}

/// Parses a segment id out of a directory entry, ignoring foreign files.
pub(crate) fn parse_id(path: &Path, extension: &str) -> Option<u64> {
    if path.extension()?.to_str()? != extension {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Outcome of reading one frame from a segment.
pub(crate) enum FrameRead {
    /// A complete, checksum-valid frame and its starting offset.
    Frame(Vec<u8>, u64),
    /// Clean end of the segment.
    Eof,
    /// A torn or corrupt frame; everything from here on is unreadable.
    Torn,
}

/// Sequential frame reader over a closed segment file.
pub(crate) struct SegmentReader {
    reader: BufReader<File>,
    len: u64,
    pos: u64,
}

impl SegmentReader {
    pub(crate) fn open(path: &PathBuf) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            len,
            pos: 0,
        })
    }

    /// Byte offset just past the last frame returned so far.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    /// Reads the next frame.
    ///
    /// Length and CRC violations are reported as [`FrameRead::Torn`], never
    /// as errors: a crash mid-append leaves exactly this shape behind.
    pub(crate) fn next_frame(&mut self) -> io::Result<FrameRead> {
        if self.pos == self.len {
            return Ok(FrameRead::Eof);
        }
        if self.pos + FRAME_HEADER_SIZE > self.len {
            return Ok(FrameRead::Torn);
        }

        let mut header = [0u8; FRAME_HEADER_SIZE as usize];
        self.reader.read_exact(&mut header)?;

        let payload_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
        let stored_crc = u32::from_le_bytes(header[4..8].try_into().unwrap());

        if self.pos + FRAME_HEADER_SIZE + payload_len > self.len {
            return Ok(FrameRead::Torn);
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        if crc32fast::hash(&payload) != stored_crc {
            return Ok(FrameRead::Torn);
        }

        let offset = self.pos;
        self.pos += FRAME_HEADER_SIZE + payload_len;

        Ok(FrameRead::Frame(payload, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_zero_padded() {
        assert_eq!(file_name(0, "wal"), "0000000000.wal");
        assert_eq!(file_name(42, "wal"), "0000000042.wal");
    }

    #[test]
    fn test_parse_id_ignores_foreign_files() {
        assert_eq!(parse_id(Path::new("0000000007.wal"), "wal"), Some(7));
        assert_eq!(parse_id(Path::new("0000000007.tmp"), "wal"), None);
        assert_eq!(parse_id(Path::new("garbage.wal"), "wal"), None);
        assert_eq!(parse_id(Path::new("no_extension"), "wal"), None);
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1, "wal").unwrap();

        let first = segment.append_frame(b"alpha").unwrap();
        let second = segment.append_frame(b"beta").unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, FRAME_HEADER_SIZE + 5);
        segment.sync().unwrap();

        let path = dir.path().join(file_name(1, "wal"));
        let mut reader = SegmentReader::open(&path).unwrap();

        match reader.next_frame().unwrap() {
            FrameRead::Frame(payload, offset) => {
                assert_eq!(payload, b"alpha");
                assert_eq!(offset, 0);
            }
            _ => panic!("expected frame"),
        }
        match reader.next_frame().unwrap() {
            FrameRead::Frame(payload, _) => assert_eq!(payload, b"beta"),
            _ => panic!("expected frame"),
        }
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::Eof));
    }

    #[test]
    fn test_truncated_tail_reads_as_torn() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1, "wal").unwrap();
        segment.append_frame(b"complete").unwrap();
        segment.append_frame(b"will be torn").unwrap();
        segment.sync().unwrap();
        drop(segment);

        // Chop the last 4 bytes off the second frame.
        let path = dir.path().join(file_name(1, "wal"));
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 4).unwrap();

        let mut reader = SegmentReader::open(&path).unwrap();
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::Frame(_, _)));
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::Torn));
    }

    #[test]
    fn test_corrupt_crc_reads_as_torn() {
        let dir = TempDir::new().unwrap();
        let mut segment = Segment::create(dir.path(), 1, "wal").unwrap();
        segment.append_frame(b"payload").unwrap();
        segment.sync().unwrap();
        drop(segment);

        // Flip a payload byte so the stored CRC no longer matches.
        let path = dir.path().join(file_name(1, "wal"));
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = SegmentReader::open(&path).unwrap();
        assert!(matches!(reader.next_frame().unwrap(), FrameRead::Torn));
    }
}
