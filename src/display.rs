//! Human-readable rendering of sizes, progress and folder listings

use crate::tree::{FolderId, Tree};

const SIZE_UNITS: [&str; 4] = ["kb", "mb", "gb", "tb"];

/// Eighth-block glyphs, empty to full
const PROGRESS_GLYPHS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

/// Width of the share bar in listing rows
pub const ROW_BAR_WIDTH: usize = 10;

/// Format a byte count with binary prefixes
///
/// `0` renders as an empty string, anything below 1024 as whole bytes.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return String::new();
    }
    if bytes < 1024 {
        return format!("{}b", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    // Compare the rounded value so 1023.96kb shows as 1.0mb, not 1024.0kb.
    while (value * 10.0).round() / 10.0 >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, SIZE_UNITS[unit])
}

/// Render `progress` (0.0 to 1.0) as a bar `width` characters wide
pub fn progress_bar(progress: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let progress = if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 0.0 };
    let cell = 1.0 / width as f64;
    let full = ((progress / cell).floor() as usize).min(width);

    let mut bar = String::with_capacity(width * 3);
    bar.extend(std::iter::repeat(PROGRESS_GLYPHS[PROGRESS_GLYPHS.len() - 1]).take(full));
    if full < width {
        let rem = progress - full as f64 * cell;
        let idx = ((rem / cell) * (PROGRESS_GLYPHS.len() - 1) as f64).round() as usize;
        bar.push(PROGRESS_GLYPHS[idx.min(PROGRESS_GLYPHS.len() - 1)]);
        bar.extend(std::iter::repeat(' ').take(width - full - 1));
    }
    bar
}

/// What a listing row points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    /// The `..` row
    Parent(FolderId),
    Folder(FolderId),
    File,
}

/// One row of a folder listing
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub target: RowTarget,
    pub size: u64,
    /// Share of the listed folder's size, 0.0 to 1.0
    pub share: f64,
    pub name: String,
}

impl Row {
    pub fn render(&self) -> String {
        match self.target {
            RowTarget::Parent(_) => format!("{:>8} {:>width$} ..", "", "", width = ROW_BAR_WIDTH),
            _ => format!(
                "{:>8} {} {}",
                format_size(self.size),
                progress_bar(self.share, ROW_BAR_WIDTH),
                self.name
            ),
        }
    }
}

/// Rows for a folder plus the cursor clamped to them
#[derive(Debug, Clone)]
pub struct Listing {
    pub rows: Vec<Row>,
    pub cursor: usize,
}

/// Build the listing of `id`
///
/// A `..` row comes first unless `id` is the root, then child folders, then
/// files; both groups are sorted by size (largest first) and then by name.
pub fn listing(tree: &Tree, id: FolderId) -> Listing {
    let folder = tree.folder(id);
    let total = folder.size();
    let share = |size: u64| if total >= 1 { size as f64 / total as f64 } else { 0.0 };

    let mut rows = Vec::with_capacity(folder.folders().len() + folder.files().len() + 1);
    if let Some(parent) = folder.parent() {
        rows.push(Row {
            target: RowTarget::Parent(parent),
            size: 0,
            share: 0.0,
            name: "..".to_string(),
        });
    }

    let mut folders: Vec<FolderId> = folder.folders().to_vec();
    folders.sort_by(|&a, &b| {
        let (a, b) = (tree.folder(a), tree.folder(b));
        b.size().cmp(&a.size()).then_with(|| a.name.cmp(&b.name))
    });
    rows.extend(folders.into_iter().map(|child| {
        let child_folder = tree.folder(child);
        Row {
            target: RowTarget::Folder(child),
            size: child_folder.size(),
            share: share(child_folder.size()),
            name: format!("{}/", child_folder.name),
        }
    }));

    let mut files: Vec<_> = folder.files().iter().collect();
    files.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    rows.extend(files.into_iter().map(|file| Row {
        target: RowTarget::File,
        size: file.size,
        share: share(file.size),
        name: file.name.clone(),
    }));

    let cursor = folder.cursor().min(rows.len().saturating_sub(1));
    Listing { rows, cursor }
}

/// Header line shown above a listing
pub fn header(tree: &Tree, id: FolderId) -> String {
    let folder = tree.folder(id);
    format!("--- {} ({}) ---", folder.path(), format_size(folder.size()))
}
