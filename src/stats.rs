//! Added/removed line counts from a merge engine's changed regions.
//!
//! The merge engine reports each changed region as a [`Chunk`]: a half-open
//! range into the original document and the matching range into the
//! modified one, both in UTF-16 code units. Counting walks every chunk and
//! asks how many lines its range covers on each side.
//!
//! ## Counting rule
//!
//! For a range `from..to` on one side:
//!
//! - An empty range covers no lines. A pure insertion has an empty range in
//!   the original document and contributes no removals.
//! - A range that starts and ends on the same line counts as one line.
//! - Otherwise the count is `end_line - start_line`, the number of line
//!   endings the range crosses. A range running from line 3 into line 5
//!   counts two, not three.
//!
//! `to` is clamped to the document length so a chunk computed against a
//! longer, since-truncated document degrades instead of failing.

use crate::error::{DocSide, Error, Result};
use crate::lines::{LineEnding, LineIndex};
use mlua::prelude::*;
use serde::Deserialize;

/// One changed region, as a pair of half-open ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Lines added in the modified document.
    pub additions: usize,

    /// Lines removed from the original document.
    pub removals: usize,
}

/// [`DiffStats`] together with the size of both documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub stats: DiffStats,

    /// Line count of the original document.
    pub original_lines: usize,

    /// Line count of the modified document.
    pub modified_lines: usize,
}

/// Options for statistics computation.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    pub line_ending: LineEnding,
}

/// Lines covered by `from..to`, or `None` when the range is reversed.
fn affected_lines(index: &LineIndex<'_>, from: usize, to: usize) -> Option<usize> {
    if from > to {
        return None;
    }
    if from == to {
        return Some(0);
    }

    let len = index.utf16_len();
    if to > len {
        log::warn!("Range {from}..{to} extends past document length {len}, clamping");
    }

    let start = index.line_at(from).number;
    let end = index.line_at(to.min(len)).number;
    Some(if start == end { 1 } else { end - start })
}

/// Counts the lines covered by `from..to` in `text`.
///
/// Returns [`Error::InvalidRange`] when `from > to`.
pub fn count_affected_lines(
    text: &str,
    from: usize,
    to: usize,
    ending: &LineEnding,
) -> Result<usize> {
    affected_lines(&LineIndex::new(text, ending), from, to).ok_or(Error::InvalidRange { from, to })
}

/// Sums removed lines over the `a` ranges and added lines over the `b`
/// ranges of every chunk.
///
/// Each document is indexed once, so the cost is linear in the document
/// sizes plus a logarithmic lookup per chunk boundary. Fails with
/// [`Error::InvalidChunk`] on the first chunk with a reversed range.
pub fn compute_stats(
    chunks: &[Chunk],
    text_a: &str,
    text_b: &str,
    ending: &LineEnding,
) -> Result<DiffStats> {
    let index_a = LineIndex::new(text_a, ending);
    let index_b = LineIndex::new(text_b, ending);
    let stats = tally(chunks, &index_a, &index_b)?;

    log::debug!(
        "Computed stats over {} chunks: +{} -{}",
        chunks.len(),
        stats.additions,
        stats.removals
    );
    Ok(stats)
}

/// Like [`compute_stats`], also reporting the line count of each document.
pub fn summarize(
    chunks: &[Chunk],
    text_a: &str,
    text_b: &str,
    ending: &LineEnding,
) -> Result<DiffSummary> {
    let index_a = LineIndex::new(text_a, ending);
    let index_b = LineIndex::new(text_b, ending);

    Ok(DiffSummary {
        stats: tally(chunks, &index_a, &index_b)?,
        original_lines: index_a.line_count(),
        modified_lines: index_b.line_count(),
    })
}

fn tally(chunks: &[Chunk], index_a: &LineIndex<'_>, index_b: &LineIndex<'_>) -> Result<DiffStats> {
    chunks
        .iter()
        .enumerate()
        .try_fold(DiffStats::default(), |acc, (index, chunk)| {
            let removed = affected_lines(index_a, chunk.from_a, chunk.to_a).ok_or(
                Error::InvalidChunk {
                    index,
                    side: DocSide::Original,
                    from: chunk.from_a,
                    to: chunk.to_a,
                },
            )?;
            let added = affected_lines(index_b, chunk.from_b, chunk.to_b).ok_or(
                Error::InvalidChunk {
                    index,
                    side: DocSide::Modified,
                    from: chunk.from_b,
                    to: chunk.to_b,
                },
            )?;

            Ok(DiffStats {
                additions: acc.additions + added,
                removals: acc.removals + removed,
            })
        })
}

/// Parses chunk JSON from the merge engine.
///
/// Handles two formats:
/// - a JSON array `[{...}, {...}]`
/// - newline-separated JSON objects
pub fn parse_chunks(json: &str) -> Result<Vec<Chunk>> {
    if let Ok(chunks) = serde_json::from_str::<Vec<Chunk>>(json) {
        return Ok(chunks);
    }

    json.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

impl FromLua for Chunk {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        let table = LuaTable::from_lua(value, lua)?;
        Ok(Self {
            from_a: table.get("fromA")?,
            to_a: table.get("toA")?,
            from_b: table.get("fromB")?,
            to_b: table.get("toB")?,
        })
    }
}

/// Reads `{ line_ending = "..." }`; a missing table or field means `"\n"`.
impl FromLua for StatsOptions {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        if value.is_nil() {
            return Ok(Self::default());
        }
        let table = LuaTable::from_lua(value, lua)?;
        Ok(Self {
            line_ending: table
                .get::<Option<LineEnding>>("line_ending")?
                .unwrap_or_default(),
        })
    }
}

impl IntoLua for DiffStats {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("additions", self.additions)?;
        table.set("removals", self.removals)?;
        Ok(LuaValue::Table(table))
    }
}

impl IntoLua for DiffSummary {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("additions", self.stats.additions)?;
        table.set("removals", self.stats.removals)?;
        table.set("original_lines", self.original_lines)?;
        table.set("modified_lines", self.modified_lines)?;
        Ok(LuaValue::Table(table))
    }
}
