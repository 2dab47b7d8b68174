//! On-disk store of collected traces, one entry per file, compiler and debugger.
//!
//! An entry is a short uncompressed header followed by the zstd-compressed
//! bincode encoding of a [`FileTraces`].

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use dbgdiff_model::{DebuggerKind, FileTraces};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{Error, Result};

const MAGIC: &[u8; 4] = b"DBGD";
const VERSION: u32 = 1;

pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry name: the source path with separators flattened, then the
    /// compiler and debugger.
    pub fn key(source: &Path, compiler: &str, debugger: DebuggerKind) -> String {
        let flatten = |text: &str| text.replace("..", "").replace(std::path::MAIN_SEPARATOR, "__");
        format!(
            "{}__{}__{debugger}",
            flatten(&source.to_string_lossy()),
            flatten(compiler)
        )
    }

    pub fn path(&self, source: &Path, compiler: &str, debugger: DebuggerKind) -> PathBuf {
        self.dir.join(format!("{}.bin.zst", Self::key(source, compiler, debugger)))
    }

    /// The stored traces, or `None` when there is no entry.
    ///
    /// An entry that exists but cannot be decoded is an error, not a miss.
    pub fn load(&self, source: &Path, compiler: &str, debugger: DebuggerKind) -> Result<Option<FileTraces>> {
        let path = self.path(source, compiler, debugger);
        if !path.exists() {
            return Ok(None);
        }
        let corrupted = |reason: String| Error::CacheCorrupted {
            path: path.clone(),
            reason,
        };

        let mut reader = BufReader::new(File::open(&path)?);
        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(|e| corrupted(e.to_string()))?;
        if &header[..4] != MAGIC {
            return Err(corrupted("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != VERSION {
            return Err(corrupted(format!("unsupported version {version}")));
        }

        let bytes = zstd::stream::decode_all(reader).map_err(|e| corrupted(e.to_string()))?;
        let (traces, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| corrupted(e.to_string()))?;
        debug!(path = %path.display(), "cache hit");
        Ok(Some(traces))
    }

    /// Write an entry, replacing any previous one atomically.
    pub fn store(&self, source: &Path, compiler: &str, debugger: DebuggerKind, traces: &FileTraces) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(source, compiler, debugger);
        let payload = bincode::serde::encode_to_vec(traces, bincode::config::standard())
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            zstd::stream::copy_encode(payload.as_slice(), &mut writer, 3)?;
            writer.flush()?;
        }
        temp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), bytes = payload.len(), "cache stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dbgdiff_model::{Address, Configuration, Location, Stepping, TraceBuilder, VarSnapshot};

    use super::*;

    fn sample() -> FileTraces {
        let mut builder = TraceBuilder::new();
        let mut vars = VarSnapshot::new();
        vars.insert("x", "1");
        builder.record(Location::new(Some("t.c".into()), Some(3), None, Address(0x1138)), vars);
        let mut traces = FileTraces::new();
        let config = Configuration::new("gcc", "-O0".parse().unwrap(), DebuggerKind::Gdb)
            .with_stepping(Stepping::Instruction);
        traces.traces.insert(config, builder.finish());
        traces
    }

    #[test]
    fn test_key() {
        let key = Cache::key(Path::new("/src/tests/t.c"), "gcc", DebuggerKind::Gdb);
        assert_eq!(key, "__src__tests__t.c__gcc__gdb");
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache"));
        let source = Path::new("/src/t.c");
        assert!(cache.load(source, "gcc", DebuggerKind::Gdb).unwrap().is_none());

        let traces = sample();
        cache.store(source, "gcc", DebuggerKind::Gdb, &traces).unwrap();
        let loaded = cache.load(source, "gcc", DebuggerKind::Gdb).unwrap().unwrap();
        assert_eq!(loaded, traces);
        assert!(cache.load(source, "clang", DebuggerKind::Gdb).unwrap().is_none());
    }

    #[test]
    fn test_corrupted_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());
        let source = Path::new("/src/t.c");
        cache.store(source, "gcc", DebuggerKind::Gdb, &sample()).unwrap();

        let path = cache.path(source, "gcc", DebuggerKind::Gdb);
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() / 2);
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            cache.load(source, "gcc", DebuggerKind::Gdb),
            Err(Error::CacheCorrupted { .. })
        ));

        fs::write(&path, b"not a cache entry").unwrap();
        assert!(matches!(
            cache.load(source, "gcc", DebuggerKind::Gdb),
            Err(Error::CacheCorrupted { .. })
        ));
    }
}
