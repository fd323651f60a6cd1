//! File-backed job source

use lasergate_core::{JobSource, Result};
use std::path::{Path, PathBuf};

/// G-code program read from a file
#[derive(Debug, Clone)]
pub struct GcodeFile {
    path: PathBuf,
}

impl GcodeFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobSource for GcodeFile {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// Raw lines as stored; normalization happens on submit
    fn lines(&mut self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_every_line_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "G21\r\n; comment\nG0 X1\n").unwrap();

        let mut job = GcodeFile::new(file.path());
        assert_eq!(job.lines().unwrap(), vec!["G21", "; comment", "G0 X1"]);
        assert_eq!(job.name(), file.path().display().to_string());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut job = GcodeFile::new("/nonexistent/lasergate/job.gcode");
        assert!(matches!(job.lines(), Err(lasergate_core::Error::Io(_))));
    }
}
