use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Accumulates per-frame samples and writes them out in fixed-size batches.
///
/// Batch `k` of log `name` lands in `profile_<name>_<k>.txt`, one value per line.
pub struct BatchLog {
    name: String,
    dir: PathBuf,
    batch_size: usize,
    samples: Vec<f64>,
    batches_written: u32,
}

impl BatchLog {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, batch_size: u32) -> Self {
        let batch_size = batch_size.max(1) as usize;
        Self {
            name: name.into(),
            dir: dir.into(),
            batch_size,
            samples: Vec::with_capacity(batch_size),
            batches_written: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.samples.len()
    }

    pub fn batches_written(&self) -> u32 {
        self.batches_written
    }

    /// Records `value`; returns the file written when this sample completed a batch.
    pub fn push(&mut self, value: f64) -> Result<Option<PathBuf>> {
        self.samples.push(value);
        if self.samples.len() < self.batch_size {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    fn flush(&mut self) -> Result<PathBuf> {
        let path = batch_path(&self.dir, &self.name, self.batches_written);
        let mut out = String::with_capacity(self.samples.len() * 12);
        for v in &self.samples {
            out.push_str(&v.to_string());
            out.push('\n');
        }
        let mut file = fs::File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(out.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;

        log::info!("{} samples written to {}", self.samples.len(), path.display());
        self.samples.clear();
        self.batches_written += 1;
        Ok(path)
    }
}

pub fn batch_path(dir: &Path, name: &str, index: u32) -> PathBuf {
    dir.join(format!("profile_{name}_{index}.txt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("parallax-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn writes_one_file_per_full_batch() {
        let dir = scratch_dir("batch");
        let mut log = BatchLog::new("holes", &dir, 3);

        assert!(log.push(1.0).unwrap().is_none());
        assert!(log.push(2.5).unwrap().is_none());
        let first = log.push(3.0).unwrap().unwrap();
        assert_eq!(first, dir.join("profile_holes_0.txt"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "1\n2.5\n3\n");

        for v in [4.0, 5.0] {
            log.push(v).unwrap();
        }
        assert_eq!(log.pending(), 2);
        let second = log.push(6.0).unwrap().unwrap();
        assert_eq!(second, dir.join("profile_holes_1.txt"));
        assert_eq!(log.batches_written(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = scratch_dir("missing").join("does-not-exist");
        let mut log = BatchLog::new("tris", &dir, 1);
        assert!(log.push(1.0).is_err());
    }
}
