//! File-based transaction log backend.
//!
//! Events are stored as an append-only sequence of records, each framed as a
//! u32 little-endian length prefix followed by the bincode-encoded
//! [`Event`]. Records are never rewritten in place.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::backend::LogBackend;
use super::event::{Event, EventKind, Sequence};
use super::{LogError, Result};

/// Append-only file of encoded event records.
///
/// On open, the file is created if absent and scanned once to recover the
/// highest previously persisted sequence; new appends continue from there.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    writer: BufWriter<File>,
    last_sequence: Sequence,
}

impl FileLog {
    /// Open the log at `path`, creating it empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let last_sequence = Self::recover_last_sequence(path)?;

        Ok(FileLog {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            last_sequence,
        })
    }

    /// Scan the file once to find the highest persisted sequence, verifying
    /// that stored sequences are strictly increasing along the way.
    fn recover_last_sequence(path: &Path) -> Result<Sequence> {
        let mut last = Sequence::new();
        let mut out_of_order = None;

        Self::read_records(path, &mut |event| {
            if event.sequence <= last {
                out_of_order = Some((last, event.sequence));
                return false;
            }
            last = event.sequence;
            true
        })?;

        if let Some((previous, found)) = out_of_order {
            return Err(LogError::Corrupt(format!(
                "sequence {} follows {}",
                found, previous
            )));
        }

        Ok(last)
    }

    /// Read records from `path` in file order, feeding each to `visit`.
    fn read_records(path: &Path, visit: &mut dyn FnMut(Event) -> bool) -> Result<()> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        loop {
            let size = match reader.read_u32::<LittleEndian>() {
                Ok(size) => size as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(LogError::Io(e)),
            };

            let mut body = vec![0u8; size];
            reader.read_exact(&mut body).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    LogError::Corrupt("truncated record".to_string())
                } else {
                    LogError::Io(e)
                }
            })?;

            let event =
                Event::deserialize(&body).map_err(|e| LogError::Corrupt(e.to_string()))?;

            if !visit(event) {
                break;
            }
        }

        Ok(())
    }
}

impl LogBackend for FileLog {
    fn append(&mut self, kind: EventKind, key: &str, value: &str) -> Result<Sequence> {
        let sequence = self.last_sequence.next();
        let event = Event {
            sequence,
            kind,
            key: key.to_string(),
            value: value.to_string(),
        };

        let body = event
            .serialize()
            .map_err(|e| LogError::Serialization(e.to_string()))?;

        self.writer.write_u32::<LittleEndian>(body.len() as u32)?;
        self.writer.write_all(&body)?;
        self.writer.flush()?;

        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn scan(&mut self, visit: &mut dyn FnMut(Event) -> bool) -> Result<()> {
        self.writer.flush()?;
        Self::read_records(&self.path, visit)
    }

    fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_mut().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collect(log: &mut FileLog) -> Vec<Event> {
        let mut events = Vec::new();
        log.scan(&mut |event| {
            events.push(event);
            true
        })
        .unwrap();
        events
    }

    #[test]
    fn test_fresh_log_starts_at_one() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = FileLog::open(&temp_dir.path().join("tx.log")).unwrap();

        assert_eq!(log.last_sequence(), Sequence(0));
        assert_eq!(log.append(EventKind::Put, "a", "1").unwrap(), Sequence(1));
        assert_eq!(log.append(EventKind::Put, "b", "2").unwrap(), Sequence(2));
        assert_eq!(log.append(EventKind::Delete, "a", "").unwrap(), Sequence(3));
        assert_eq!(log.last_sequence(), Sequence(3));
    }

    #[test]
    fn test_scan_returns_events_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = FileLog::open(&temp_dir.path().join("tx.log")).unwrap();

        log.append(EventKind::Put, "a", "1").unwrap();
        log.append(EventKind::Delete, "a", "").unwrap();

        let events = collect(&mut log);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::put(Sequence(1), "a", "1"));
        assert_eq!(events[1], Event::delete(Sequence(2), "a"));
    }

    #[test]
    fn test_reopen_continues_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tx.log");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(EventKind::Put, "a", "1").unwrap();
            log.append(EventKind::Put, "b", "2").unwrap();
            log.close().unwrap();
        }

        let mut log = FileLog::open(&path).unwrap();
        assert_eq!(log.last_sequence(), Sequence(2));
        assert_eq!(log.append(EventKind::Put, "c", "3").unwrap(), Sequence(3));

        let events = collect(&mut log);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence.0).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_scan_stops_early() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = FileLog::open(&temp_dir.path().join("tx.log")).unwrap();

        for i in 0..5 {
            log.append(EventKind::Put, &format!("k{}", i), "v").unwrap();
        }

        let mut seen = 0;
        log.scan(&mut |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tx.log");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(EventKind::Put, "a", "1").unwrap();
            log.close().unwrap();
        }

        // Claim a record longer than the remaining bytes.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&1024u32.to_le_bytes()).unwrap();
        file.write_all(b"short").unwrap();
        drop(file);

        let err = FileLog::open(&path).unwrap_err();
        assert!(matches!(err, LogError::Corrupt(_)), "got {:?}", err);
    }

    #[test]
    fn test_garbage_record_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tx.log");

        let mut file = File::create(&path).unwrap();
        file.write_all(&4u32.to_le_bytes()).unwrap();
        file.write_all(&[0xff, 0xff, 0xff, 0xff]).unwrap();
        drop(file);

        let err = FileLog::open(&path).unwrap_err();
        assert!(matches!(err, LogError::Corrupt(_)), "got {:?}", err);
    }
}
