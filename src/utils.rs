use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Read and parse a JSON file, streaming from the file instead of loading it
/// into memory first.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    check_file_exists(path)?;
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Create a progress bar with the given length and label, or a hidden one
/// when progress output is disabled.
pub fn create_progress_bar(len: u64, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
            label
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

pub fn check_file_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

pub fn check_dir_exists(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::DirNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Number of entries directly inside `dir`.
pub fn dir_contents_len(dir: &Path) -> Result<usize> {
    Ok(fs::read_dir(dir)?.count())
}

/// Remove every entry inside `dir`, keeping `dir` itself.
pub fn delete_all_in_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Make sure `dir` exists and is empty before anything is written into it.
///
/// A non-empty directory is cleared when `overwrite` is set and rejected
/// otherwise.
pub fn prepare_output_dir(dir: &Path, overwrite: bool) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    if dir_contents_len(dir)? > 0 {
        if !overwrite {
            return Err(Error::DirNotEmpty {
                path: dir.to_path_buf(),
            });
        }
        warn!(
            "Directory {:?} is not empty. Deleting its contents.",
            dir
        );
        delete_all_in_dir(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Fail when `path` exists and may not be replaced.
pub fn check_can_write(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(Error::FileExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// First unused `{dir}/{index:06}.{extension}` path.
pub fn next_dump_path(dir: &Path, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    let mut index = 0usize;
    loop {
        let candidate = dir.join(format!("{:06}.{}", index, extension));
        if !candidate.exists() {
            return candidate;
        }
        index += 1;
    }
}

/// File name component of `path` as an owned string.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extension of `path` without the dot, `"png"` when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string())
}

/// Parent directory of `path`, `.` for bare file names.
pub fn parent_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Capture time of a file formatted like C's `ctime`, e.g.
/// `Sun Oct 18 09:12:44 2026`. Falls back to the modification time on
/// filesystems without creation timestamps.
pub fn capture_time(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)?;
    let time = metadata.created().or_else(|_| metadata.modified())?;
    let local: chrono::DateTime<chrono::Local> = time.into();
    Ok(local.format("%a %b %e %H:%M:%S %Y").to_string())
}
