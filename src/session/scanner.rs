//! Asynchronous directory scan: find the files related to the focus file,
//! sort them, and rotate the result so navigation continues forward from
//! the focus. The scan checks its launch generation after every yield
//! point and aborts without output once superseded.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::time::SystemTime;

use clap::ValueEnum;
use log::{debug, warn};

use crate::file_handle::{DirectoryHandle, FileHandle};
use crate::media_type::{self, MediaClass};
use crate::session::sequencer::{LaunchGeneration, LaunchSequencer};

/// Session-wide ordering applied to the navigation ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortOrder {
    /// Ascending natural filename order.
    #[default]
    AFirst,
    /// Descending natural filename order.
    ZFirst,
    /// Last-modified descending; unavailable timestamps last. Strictly
    /// more expensive: every candidate is stat'ed.
    NewestFirst,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::AFirst => "a-first",
            SortOrder::ZFirst => "z-first",
            SortOrder::NewestFirst => "newest-first",
        })
    }
}

/// Sibling candidate surfaced during enumeration.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub handle: FileHandle,
    pub modified: Option<SystemTime>,
}

impl Candidate {
    fn name(&self) -> String {
        self.handle.name()
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    /// Superseded by a newer launch; partial results discarded.
    Abort,
    /// The focus file vanished from the directory; the whole sorted list,
    /// unrotated. The caller reloads rather than appends.
    FocusFileMissing(Vec<FileHandle>),
    /// The focus file is present; its successors followed by its
    /// predecessors, focus excluded.
    FocusFileRelevant(Vec<FileHandle>),
}

pub struct DirectoryScanner {
    sequencer: LaunchSequencer,
    sort_order: SortOrder,
}

impl DirectoryScanner {
    pub fn new(sequencer: LaunchSequencer, sort_order: SortOrder) -> Self {
        Self {
            sequencer,
            sort_order,
        }
    }

    /// Enumerate `directory`, keep files related to `focus_name`, drop
    /// names in `exclude` (already listed ahead of the scan), then sort
    /// and rotate around the focus file.
    pub async fn scan(
        &self,
        directory: &DirectoryHandle,
        focus_name: &str,
        exclude: &HashSet<String>,
        generation: LaunchGeneration,
    ) -> ScanOutcome {
        let mut read_dir = match directory.read_dir().await {
            Ok(read_dir) => read_dir,
            Err(err) => {
                warn!("cannot enumerate {:?}: {err}", directory.path());
                return ScanOutcome::FocusFileRelevant(Vec::new());
            }
        };
        if !self.sequencer.is_current(generation) {
            return ScanOutcome::Abort;
        }

        let focus_class = media_type::classify(focus_name);
        let focus_mime = media_type::mime_for(focus_name);
        let want_mtime = self.sort_order == SortOrder::NewestFirst;

        let mut candidates: Vec<Candidate> = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!("enumeration of {:?} stopped early: {err}", directory.path());
                    break;
                }
            };
            if !self.sequencer.is_current(generation) {
                debug!("scan of {:?} superseded, aborting", directory.path());
                return ScanOutcome::Abort;
            }

            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !self.sequencer.is_current(generation) {
                return ScanOutcome::Abort;
            }
            if !is_file {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let is_focus = name == focus_name;
            if !is_focus && (exclude.contains(&name) || !is_related(&name, focus_name, focus_class, focus_mime))
            {
                continue;
            }

            let handle = directory.file_handle(&name);
            let modified = if want_mtime {
                let modified = handle.last_modified().await;
                if !self.sequencer.is_current(generation) {
                    return ScanOutcome::Abort;
                }
                modified
            } else {
                None
            };
            candidates.push(Candidate { handle, modified });
        }

        if !self.sequencer.is_current(generation) {
            return ScanOutcome::Abort;
        }

        sort_candidates(self.sort_order, &mut candidates);

        let focus_position = candidates.iter().position(|c| c.name() == focus_name);
        match focus_position {
            None => ScanOutcome::FocusFileMissing(
                candidates.into_iter().map(|c| c.handle).collect(),
            ),
            Some(at) => {
                // Successors first, then predecessors; the focus entry is
                // already the store's head and is excluded.
                let mut rotated: Vec<FileHandle> = Vec::with_capacity(candidates.len() - 1);
                rotated.extend(candidates[at + 1..].iter().map(|c| c.handle.clone()));
                rotated.extend(candidates[..at].iter().map(|c| c.handle.clone()));
                ScanOutcome::FocusFileRelevant(rotated)
            }
        }
    }
}

/// Two files ride the same navigation ring when they share a name, a
/// non-empty extension-derived MIME type, or both fall into the broad
/// {image, video, subtitle} class. Unknown extensions are unrelated unless
/// name-identical.
fn is_related(
    candidate: &str,
    focus_name: &str,
    focus_class: MediaClass,
    focus_mime: Option<&str>,
) -> bool {
    if candidate == focus_name {
        return true;
    }
    if let (Some(mime), Some(focus_mime)) = (media_type::mime_for(candidate), focus_mime) {
        if mime == focus_mime {
            return true;
        }
    }
    media_type::classify(candidate).is_navigable() && focus_class.is_navigable()
}

pub fn sort_candidates(order: SortOrder, candidates: &mut [Candidate]) {
    match order {
        SortOrder::AFirst => candidates.sort_by(|a, b| natural_compare(&a.name(), &b.name())),
        SortOrder::ZFirst => candidates.sort_by(|a, b| natural_compare(&b.name(), &a.name())),
        SortOrder::NewestFirst => candidates.sort_by(|a, b| match (&a.modified, &b.modified) {
            (Some(ma), Some(mb)) => mb
                .cmp(ma)
                .then_with(|| natural_compare(&a.name(), &b.name())),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => natural_compare(&a.name(), &b.name()),
        }),
    }
}

/// Case-insensitive comparison treating digit runs as numbers, so
/// "img9.png" sorts before "img10.png".
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().peekable();
    let mut cb = b.chars().peekable();
    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_a = take_digit_run(&mut ca);
                let run_b = take_digit_run(&mut cb);
                let ord = compare_digit_runs(&run_a, &run_b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let xl = x.to_ascii_lowercase();
                let yl = y.to_ascii_lowercase();
                if xl != yl {
                    return xl.cmp(&yl);
                }
                ca.next();
                cb.next();
            }
        }
    }
}

fn take_digit_run(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
