//! Text record formats exchanged with the execution engine.
//!
//! ## Layouts
//!
//! ```text
//! input record      1.5,0.25,-3        one vector per line
//! map emission      7<TAB>0.84         activation for neuron 7
//!                   7<TAB>@1.26,0.21   weighted vector for neuron 7
//! reduce output     7<TAB>1.1,0.3      updated weights for neuron 7
//!                   7<TAB>inactive     neuron 7 marked inactive
//! ```

use crate::error::{Result, SomError};
use crate::mapreduce::{Contribution, NeuronUpdate, UpdateOutcome};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Separator between key and value.
pub const KEY_SEPARATOR: char = '\t';

/// Value written for a neuron marked inactive.
pub const INACTIVE_MARKER: &str = "inactive";

/// Name of the single output part file.
pub const PART_FILE: &str = "part-00000";

/// Encodes a map emission as `key<TAB>value`.
pub fn encode_emission(neuron: usize, contribution: &Contribution) -> String {
    format!("{}{}{}", neuron, KEY_SEPARATOR, contribution.to_wire())
}

/// Decodes a `key<TAB>value` map emission.
pub fn decode_emission(line: &str) -> Result<(usize, Contribution)> {
    let (key, value) = split_key(line)?;
    Ok((key, Contribution::from_wire(value)?))
}

/// Encodes a reduce output record.
pub fn encode_update(update: &NeuronUpdate) -> String {
    let value = match update.weights() {
        Some(weights) => weights
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(","),
        None => INACTIVE_MARKER.to_string(),
    };
    format!("{}{}{}", update.neuron, KEY_SEPARATOR, value)
}

/// Decodes a reduce output record.
///
/// Retained and updated weights share one text shape and both decode as
/// [`UpdateOutcome::Updated`].
pub fn decode_update(line: &str) -> Result<NeuronUpdate> {
    let (neuron, value) = split_key(line)?;
    let value = value.trim();

    if value == INACTIVE_MARKER {
        return Ok(NeuronUpdate::new(neuron, UpdateOutcome::Inactive));
    }

    let weights = value
        .split(',')
        .map(|token| {
            let token = token.trim();
            match token.parse::<f64>() {
                Ok(w) if w.is_finite() => Ok(w),
                _ => Err(SomError::Parse(format!(
                    "neuron {}: invalid weight '{}'",
                    neuron, token
                ))),
            }
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(NeuronUpdate::new(neuron, UpdateOutcome::Updated(weights)))
}

fn split_key(line: &str) -> Result<(usize, &str)> {
    let (key, value) = line
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| SomError::Parse(format!("missing key separator in '{}'", line)))?;
    let key: usize = key
        .trim()
        .parse()
        .map_err(|_| SomError::Parse(format!("invalid neuron key '{}'", key)))?;
    Ok((key, value))
}

/// Reads input records into partitions.
///
/// A directory yields one partition per visible file, in name order (files
/// starting with `_` or `.` are skipped). A single file is split into
/// `partitions` contiguous runs of lines.
pub fn read_partitions(path: &Path, partitions: usize) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Err(SomError::FileNotFound(path.to_path_buf()));
    }

    if path.is_dir() {
        return part_files(path)?
            .iter()
            .map(|file| read_lines(file))
            .collect();
    }

    let lines = read_lines(path)?;
    let partitions = partitions.max(1);
    let chunk = lines.len().div_ceil(partitions).max(1);
    Ok(lines.chunks(chunk).map(|c| c.to_vec()).collect())
}

/// Writes reduce output into a new directory as a single part file.
///
/// Fails if the directory already exists.
pub fn write_updates(dir: &Path, updates: &[NeuronUpdate]) -> Result<PathBuf> {
    if dir.exists() {
        return Err(SomError::Config(format!(
            "output directory {} already exists",
            dir.display()
        )));
    }
    fs::create_dir_all(dir)?;

    let path = dir.join(PART_FILE);
    let mut writer = BufWriter::new(File::create(&path)?);
    for update in updates {
        writeln!(writer, "{}", encode_update(update))?;
    }
    writer.flush()?;
    Ok(path)
}

/// Reads reduce output from a part file or a directory of part files.
pub fn read_updates(path: &Path) -> Result<Vec<NeuronUpdate>> {
    if !path.exists() {
        return Err(SomError::FileNotFound(path.to_path_buf()));
    }

    let files = if path.is_dir() {
        part_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut updates = Vec::new();
    for file in files {
        for line in read_lines(&file)? {
            if line.trim().is_empty() {
                continue;
            }
            updates.push(decode_update(&line)?);
        }
    }
    updates.sort_by_key(|u| u.neuron);
    Ok(updates)
}

fn part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') || name.starts_with('.') || !entry.file_type()?.is_file() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line?);
    }
    Ok(lines)
}
