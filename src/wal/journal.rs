use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use super::segment::{FRAME_HEADER_SIZE, FrameRead, Segment, SegmentReader, parse_id};
use crate::config::WalConfig;

/// Numbering starts at 1 so a zeroed position is visibly uninitialized.
const FIRST_SEGMENT_ID: u64 = 1;

/// Location of a frame within the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalPosition {
    /// Numeric id of the segment holding the frame.
    pub segment: u64,
    /// Byte offset of the frame within that segment.
    pub offset: u64,
}

/// The write-ahead journal manages a directory of bounded segment files.
///
/// Appends from a single writer are totally ordered; iteration replays
/// frames in exactly that order. Torn or corrupt trailing frames (the shape
/// a crash mid-append leaves behind) terminate iteration cleanly and are
/// never surfaced as errors.
pub struct WalJournal {
    config: WalConfig,
    inner: Mutex<JournalInner>,
}

struct JournalInner {
    active: Segment,
    /// Bytes appended since the last fsync, for the `bytes_per_sync` policy.
    unsynced_bytes: u64,
}

impl WalJournal {
    /// Opens the journal, creating the directory and the first segment if
    /// needed. An existing directory resumes appending to its
    /// highest-numbered segment.
    pub fn open(config: WalConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.dir_path)?;

        let extension = config.segment_file_extension.as_str();
        let highest = Self::segment_ids(&config)?.into_iter().next_back();

        let active = match highest {
            Some(id) => {
                // A crash can leave a torn frame at the end of the active
                // segment. Cut it off before resuming appends; otherwise new
                // frames would sit behind unreadable bytes, invisible to
                // every future replay.
                Self::truncate_torn_tail(&config, id)?;
                Segment::open(&config.dir_path, id, extension)?
            }
            None => Segment::create(&config.dir_path, FIRST_SEGMENT_ID, extension)?,
        };

        Ok(Self {
            config,
            inner: Mutex::new(JournalInner {
                active,
                unsynced_bytes: 0,
            }),
        })
    }

    /// Appends one framed payload, rolling over to a new segment when the
    /// current one would exceed `segment_size`.
    ///
    /// Durability follows the configured policy: `sync_per_write` fsyncs
    /// every frame, otherwise `bytes_per_sync` batches fsyncs by volume
    /// (0 leaves syncing to explicit [`WalJournal::sync`] calls).
    pub fn append(&self, payload: &[u8]) -> io::Result<WalPosition> {
        let mut inner = self.inner.lock().unwrap();

        let frame_len = FRAME_HEADER_SIZE + payload.len() as u64;
        if inner.active.size() > 0 && inner.active.size() + frame_len > self.config.segment_size {
            // Retire the full segment durably before starting its successor,
            // so replay order can never run ahead of disk order.
            inner.active.sync()?;
            let next_id = inner.active.id() + 1;
            inner.active = Segment::create(
                &self.config.dir_path,
                next_id,
                &self.config.segment_file_extension,
            )?;
            inner.unsynced_bytes = 0;
        }

        let offset = inner.active.append_frame(payload)?;
        let position = WalPosition {
            segment: inner.active.id(),
            offset,
        };

        if self.config.sync_per_write {
            inner.active.sync()?;
        } else if self.config.bytes_per_sync > 0 {
            inner.unsynced_bytes += frame_len;
            if inner.unsynced_bytes >= self.config.bytes_per_sync {
                inner.active.sync()?;
                inner.unsynced_bytes = 0;
            }
        }

        Ok(position)
    }

    /// Forces durability of all prior appends.
    pub fn sync(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.active.sync()?;
        inner.unsynced_bytes = 0;
        Ok(())
    }

    /// Returns a lazy iterator over every readable frame, in append order.
    ///
    /// The first torn or corrupt frame ends the sequence; frames written
    /// after it (if any survived in later segments) are ignored so the
    /// replayed state is always a prefix of the pre-crash state.
    pub fn iter_from_start(&self) -> io::Result<WalIter> {
        let extension = self.config.segment_file_extension.as_str();
        let segments = Self::segment_ids(&self.config)?
            .into_iter()
            .map(|id| {
                (
                    id,
                    self.config.dir_path.join(super::segment::file_name(id, extension)),
                )
            })
            .collect::<Vec<_>>();

        Ok(WalIter {
            segments: segments.into_iter(),
            current: None,
            done: false,
        })
    }

    /// Truncates segment `id` to the end of its last valid frame.
    fn truncate_torn_tail(config: &WalConfig, id: u64) -> io::Result<()> {
        let path = config
            .dir_path
            .join(super::segment::file_name(id, &config.segment_file_extension));

        let mut reader = SegmentReader::open(&path)?;
        let valid_len = loop {
            match reader.next_frame()? {
                FrameRead::Frame(_, _) => {}
                FrameRead::Eof | FrameRead::Torn => break reader.position(),
            }
        };

        let file_len = std::fs::metadata(&path)?.len();
        if valid_len < file_len {
            log::warn!(
                "truncating torn tail of WAL segment {id}: {file_len} -> {valid_len} bytes"
            );
            let file = std::fs::OpenOptions::new().write(true).open(&path)?;
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        Ok(())
    }

    /// Enumerates segment ids in the WAL directory, ascending.
    fn segment_ids(config: &WalConfig) -> io::Result<Vec<u64>> {
        let mut ids = Vec::new();
        for dir_entry in std::fs::read_dir(&config.dir_path)? {
            let path = dir_entry?.path();
            if let Some(id) = parse_id(&path, &config.segment_file_extension) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl Drop for WalJournal {
    fn drop(&mut self) {
        // Best effort durability on shutdown.
        let _ = self.sync();
    }
}

/// Lazy frame iterator across segments in ascending numeric order.
pub struct WalIter {
    segments: std::vec::IntoIter<(u64, PathBuf)>,
    current: Option<(u64, SegmentReader)>,
    done: bool,
}

impl Iterator for WalIter {
    type Item = io::Result<(Vec<u8>, WalPosition)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            let (segment_id, reader) = match self.current.as_mut() {
                Some(current) => (current.0, &mut current.1),
                None => {
                    let (id, path) = self.segments.next()?;
                    match SegmentReader::open(&path) {
                        Ok(reader) => {
                            self.current = Some((id, reader));
                            continue;
                        }
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
            };

            match reader.next_frame() {
                Ok(FrameRead::Frame(payload, offset)) => {
                    return Some(Ok((
                        payload,
                        WalPosition {
                            segment: segment_id,
                            offset,
                        },
                    )));
                }
                Ok(FrameRead::Eof) => {
                    self.current = None;
                }
                Ok(FrameRead::Torn) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal_config(dir: &TempDir) -> WalConfig {
        WalConfig {
            dir_path: dir.path().to_path_buf(),
            ..WalConfig::default()
        }
    }

    fn collect_payloads(journal: &WalJournal) -> Vec<Vec<u8>> {
        journal
            .iter_from_start()
            .unwrap()
            .map(|frame| frame.unwrap().0)
            .collect()
    }

    #[test]
    fn test_open_creates_directory_and_first_segment() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            dir_path: dir.path().join("nested").join("wal"),
            ..WalConfig::default()
        };

        let journal = WalJournal::open(config.clone()).unwrap();
        drop(journal);

        assert!(config.dir_path.join("0000000001.wal").exists());
    }

    #[test]
    fn test_append_order_is_preserved_by_iteration() {
        let dir = TempDir::new().unwrap();
        let journal = WalJournal::open(journal_config(&dir)).unwrap();

        for i in 0..25u32 {
            journal.append(&i.to_le_bytes()).unwrap();
        }
        journal.sync().unwrap();

        let payloads = collect_payloads(&journal);
        assert_eq!(payloads.len(), 25);
        for (i, payload) in payloads.iter().enumerate() {
            assert_eq!(payload.as_slice(), (i as u32).to_le_bytes());
        }
    }

    #[test]
    fn test_rollover_at_segment_size() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            segment_size: 64,
            ..journal_config(&dir)
        };
        let journal = WalJournal::open(config).unwrap();

        // 8-byte header + 24-byte payload = 32 bytes per frame; two fit.
        let mut positions = Vec::new();
        for _ in 0..5 {
            positions.push(journal.append(&[0xaa; 24]).unwrap());
        }

        let segments: Vec<u64> = positions.iter().map(|p| p.segment).collect();
        assert_eq!(segments, vec![1, 1, 2, 2, 3]);
        assert!(dir.path().join("0000000001.wal").exists());
        assert!(dir.path().join("0000000002.wal").exists());
        assert!(dir.path().join("0000000003.wal").exists());

        assert_eq!(collect_payloads(&journal).len(), 5);
    }

    #[test]
    fn test_oversized_payload_gets_its_own_segment() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            segment_size: 32,
            ..journal_config(&dir)
        };
        let journal = WalJournal::open(config).unwrap();

        journal.append(&[1u8; 8]).unwrap();
        // Larger than segment_size on its own; must still be written.
        let position = journal.append(&[2u8; 100]).unwrap();
        assert_eq!(position.segment, 2);
        assert_eq!(position.offset, 0);

        assert_eq!(collect_payloads(&journal).len(), 2);
    }

    #[test]
    fn test_reopen_resumes_highest_segment() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            segment_size: 64,
            ..journal_config(&dir)
        };

        {
            let journal = WalJournal::open(config.clone()).unwrap();
            for _ in 0..3 {
                journal.append(&[0xbb; 24]).unwrap();
            }
            journal.sync().unwrap();
        }

        let journal = WalJournal::open(config).unwrap();
        let position = journal.append(&[0xcc; 4]).unwrap();
        assert_eq!(position.segment, 2);
        assert!(position.offset > 0);

        assert_eq!(collect_payloads(&journal).len(), 4);
    }

    #[test]
    fn test_reopen_repairs_torn_tail_before_appending() {
        let dir = TempDir::new().unwrap();
        let config = journal_config(&dir);

        {
            let journal = WalJournal::open(config.clone()).unwrap();
            journal.append(b"kept").unwrap();
            journal.append(b"torn away").unwrap();
            journal.sync().unwrap();
        }

        let path = dir.path().join("0000000001.wal");
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 2).unwrap();

        // Reopen truncates the torn frame, so this append is replayable.
        {
            let journal = WalJournal::open(config.clone()).unwrap();
            journal.append(b"after crash").unwrap();
            journal.sync().unwrap();
        }

        let journal = WalJournal::open(config).unwrap();
        let payloads = collect_payloads(&journal);
        assert_eq!(payloads, vec![b"kept".to_vec(), b"after crash".to_vec()]);
    }

    #[test]
    fn test_corrupt_frame_terminates_iteration_cleanly() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            segment_size: 64,
            ..journal_config(&dir)
        };

        {
            let journal = WalJournal::open(config.clone()).unwrap();
            journal.append(&[1u8; 24]).unwrap();
            journal.append(&[2u8; 24]).unwrap();
            journal.append(&[3u8; 24]).unwrap();
            journal.sync().unwrap();
        }

        // Corrupt the second frame's payload, in the retired first segment.
        // Everything from the corruption on is ignored, including the intact
        // third frame in the next segment: replay yields a strict prefix.
        let path = dir.path().join("0000000001.wal");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[45] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let journal = WalJournal::open(config).unwrap();
        let payloads = collect_payloads(&journal);
        assert_eq!(payloads, vec![vec![1u8; 24]]);
    }

    #[test]
    fn test_bytes_per_sync_threshold_is_honored() {
        let dir = TempDir::new().unwrap();
        let config = WalConfig {
            bytes_per_sync: 40,
            ..journal_config(&dir)
        };
        let journal = WalJournal::open(config).unwrap();

        // Exercises the accumulate-then-reset path; observable effect is
        // simply that appends keep succeeding and remain iterable.
        for _ in 0..10 {
            journal.append(&[0u8; 16]).unwrap();
        }
        assert_eq!(collect_payloads(&journal).len(), 10);
    }
}
