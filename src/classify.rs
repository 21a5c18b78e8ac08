//! Out-of-memory failure classification.
//!
//! A missing result file by itself proves nothing: the task may still be
//! queued. The classifier requires two pieces of evidence per index, a
//! log file (the process started) and no result file (it did not finish
//! cleanly), and then checks the log's final line for the scheduler's
//! kill marker. Candidates whose final line does not carry the marker are
//! left unclassified; they are pending or failed for an unrelated reason.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info};

use crate::descriptor::JobDescriptor;
use crate::error::Result;
use crate::layout;

/// Substring the scheduler writes when it kills a task for exceeding its
/// memory limit. Versioned here; nothing else matches on it.
const OOM_MARKER: &str = "oom-kill";

/// Bytes read from the end of a log when extracting its final line.
const TAIL_WINDOW: u64 = 8192;

/// Return the array indices whose tasks were killed for exceeding memory,
/// sorted ascending. These are exactly the indices worth re-submitting.
pub fn classify_oom(job: &JobDescriptor) -> Result<Vec<usize>> {
    let mut done = BTreeSet::new();
    let mut logged = BTreeSet::new();

    for entry in std::fs::read_dir(&job.workdir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(index) = layout::parse_results_index(&file_name) {
            done.insert(index);
        } else if let Some(index) = layout::parse_log_index(&file_name) {
            logged.insert(index);
        }
    }

    let external_id = job.external_id.as_deref().unwrap_or(layout::LOCAL_JOB_ID);
    let mut killed = Vec::new();
    for index in logged.difference(&done) {
        let path = job
            .workdir
            .join(layout::log_file_name(external_id, *index));
        let last_line = tail_line(&path)?;
        if last_line.contains(OOM_MARKER) {
            debug!("Task {} log ends with kill marker: {}", index, last_line);
            killed.push(*index);
        }
    }

    if !killed.is_empty() {
        info!(
            "Job {} has {} OOM-killed tasks: {}",
            job.name,
            killed.len(),
            collapse_ranges(&killed).join(",")
        );
    }
    Ok(killed)
}

/// Read only the final line of a file, looking at no more than the last
/// [`TAIL_WINDOW`] bytes. Task logs can be large; loading them whole to
/// inspect one line is not acceptable.
///
/// The window may open in the middle of a multi-byte character, so the
/// bytes are decoded lossily; only the final line has to survive intact.
pub fn tail_line(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_WINDOW);
    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    Ok(String::from_utf8_lossy(&tail)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .to_string())
}

/// Collapse a sorted index set into minimal array-range notation: isolated
/// values as-is, consecutive runs as `first-last`. The output is valid as
/// a replacement `--array` directive for targeted re-submission.
pub fn collapse_ranges(sorted: &[usize]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i];
        let mut end = start;
        while i + 1 < sorted.len() && sorted[i + 1] == end + 1 {
            end = sorted[i + 1];
            i += 1;
        }
        if end > start {
            out.push(format!("{start}-{end}"));
        } else {
            out.push(start.to_string());
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_ranges() {
        assert_eq!(
            collapse_ranges(&[1, 2, 3, 7, 9, 10]),
            vec!["1-3", "7", "9-10"]
        );
        assert_eq!(collapse_ranges(&[]), Vec::<String>::new());
        assert_eq!(collapse_ranges(&[4]), vec!["4"]);
    }
}
