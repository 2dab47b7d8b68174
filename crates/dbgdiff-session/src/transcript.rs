use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Append-only log of every exchange with one debugger session.
pub struct Transcript {
    file: File,
}

impl Transcript {
    pub fn create(dir: &Path, session_id: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{session_id}.log")))?;
        Ok(Self { file })
    }

    pub fn record(&mut self, command: &str, response: &str) -> io::Result<()> {
        let entry = format!("> {command}\n{response}\n");
        self.file.write_all(entry.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcript = Transcript::create(dir.path(), "gdb-t-1").unwrap();
        transcript.record("info proc", "No current process").unwrap();
        transcript.record("step", "").unwrap();
        drop(transcript);

        let text = fs::read_to_string(dir.path().join("gdb-t-1.log")).unwrap();
        assert_eq!(text, "> info proc\nNo current process\n> step\n\n");
    }
}
