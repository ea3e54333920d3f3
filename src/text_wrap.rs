//! Line breaking over a sequence of styled text runs.
//!
//! Break opportunities come from UAX #14 over the concatenated text, so a
//! word split across runs is still a single unbreakable unit. Scripts that
//! do not separate words with spaces (Thai, Lao, Myanmar, Khmer) get their
//! opportunities from offsets supplied with the run.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use unicode_linebreak::{BreakOpportunity, linebreaks};
use unicode_segmentation::UnicodeSegmentation;

use crate::measure::TextMeasurer;
use crate::perf::{log_perf_counts, perf_end, perf_start};
use crate::types::Pt;

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font_size: Pt,
    /// Byte offsets into `text` where a special-script word may break.
    pub special_script_breaks: Option<Vec<usize>>,
}

impl TextRun {
    pub fn new(text: impl Into<String>, font_size: f32) -> Self {
        Self {
            text: text.into(),
            font_size: Pt::from_f32(font_size),
            special_script_breaks: None,
        }
    }

    pub fn with_special_script_breaks(mut self, breaks: Vec<usize>) -> Self {
        self.special_script_breaks = Some(breaks);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowWrap {
    Normal,
    BreakWord,
}

/// Thai, Lao, Myanmar and Khmer: scripts written without spaces between words.
pub fn is_special_script(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0E00..=0x0E7F | 0x0E80..=0x0EFF | 0x1000..=0x109F | 0x1780..=0x17FF | 0x19E0..=0x19FF
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineFragment {
    pub run: usize,
    /// Byte range within the run's text.
    pub range: Range<usize>,
    pub width: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub fragments: Vec<LineFragment>,
    pub width: Pt,
    /// The line ended at a forced break.
    pub mandatory: bool,
}

impl Line {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn text(&self, runs: &[TextRun]) -> String {
        self.fragments
            .iter()
            .filter_map(|f| runs.get(f.run).and_then(|r| r.text.get(f.range.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    end: usize,
    width: Pt,
    trimmed_width: Pt,
    mandatory: bool,
}

fn is_hanging_space(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\t' | '\u{3000}' | '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}'
            | '\u{2029}'
    )
}

fn is_hard_break(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

struct Sequence<'a> {
    runs: &'a [TextRun],
    starts: Vec<usize>,
    full: String,
    measurer: &'a dyn TextMeasurer,
}

impl<'a> Sequence<'a> {
    fn new(runs: &'a [TextRun], measurer: &'a dyn TextMeasurer) -> Self {
        let mut starts = Vec::with_capacity(runs.len());
        let mut full = String::new();
        for run in runs {
            starts.push(full.len());
            full.push_str(&run.text);
        }
        Self {
            runs,
            starts,
            full,
            measurer,
        }
    }

    /// Per-run pieces of `[start, end)` as (run, range within run).
    fn pieces(&self, start: usize, end: usize) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        self.runs.iter().enumerate().filter_map(move |(idx, run)| {
            let run_start = self.starts[idx];
            let run_end = run_start + run.text.len();
            let a = start.max(run_start);
            let b = end.min(run_end);
            (a < b).then(|| (idx, (a - run_start)..(b - run_start)))
        })
    }

    fn measure_span(&self, start: usize, end: usize) -> Pt {
        self.pieces(start, end)
            .map(|(idx, range)| {
                let run = &self.runs[idx];
                self.measurer.measure(&run.text[range], run.font_size)
            })
            .sum()
    }

    fn break_opportunities(&self) -> BTreeMap<usize, BreakOpportunity> {
        let mut out: BTreeMap<usize, BreakOpportunity> = linebreaks(&self.full).collect();
        for (idx, run) in self.runs.iter().enumerate() {
            let Some(breaks) = run.special_script_breaks.as_ref() else {
                continue;
            };
            for &offset in breaks {
                if offset == 0 || offset >= run.text.len() || !run.text.is_char_boundary(offset) {
                    continue;
                }
                let before = run.text[..offset].chars().next_back();
                let after = run.text[offset..].chars().next();
                let inside = before.is_some_and(is_special_script)
                    && after.is_some_and(is_special_script);
                if inside {
                    out.entry(self.starts[idx] + offset)
                        .or_insert(BreakOpportunity::Allowed);
                }
            }
        }
        out
    }

    fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut start = 0usize;
        for (pos, _) in self.break_opportunities() {
            if pos <= start {
                continue;
            }
            let text = &self.full[start..pos];
            let trimmed_end = start + text.trim_end_matches(is_hanging_space).len();
            segments.push(Segment {
                start,
                end: pos,
                width: self.measure_span(start, pos),
                trimmed_width: self.measure_span(start, trimmed_end),
                mandatory: text.chars().next_back().is_some_and(is_hard_break),
            });
            start = pos;
        }
        segments
    }

    fn split_by_graphemes(&self, seg: &Segment, max_width: Pt) -> Vec<(usize, usize, Pt)> {
        let mut pieces = Vec::new();
        let mut piece_start = seg.start;
        let mut width = Pt::ZERO;
        for (offset, grapheme) in self.full[seg.start..seg.end].grapheme_indices(true) {
            let g_start = seg.start + offset;
            let w = self.measure_span(g_start, g_start + grapheme.len());
            let hangs = grapheme.chars().all(is_hanging_space);
            if g_start > piece_start && !hangs && width + w > max_width {
                pieces.push((piece_start, g_start, width));
                piece_start = g_start;
                width = Pt::ZERO;
            }
            width += w;
        }
        pieces.push((piece_start, seg.end, width));
        pieces
    }

    fn make_line(&self, start: usize, end: usize, mandatory: bool) -> Line {
        let end = start + self.full[start..end].trim_end_matches(is_hanging_space).len();
        let fragments: Vec<LineFragment> = self
            .pieces(start, end)
            .map(|(run, range)| {
                let r = &self.runs[run];
                let width = self.measurer.measure(&r.text[range.clone()], r.font_size);
                LineFragment { run, range, width }
            })
            .collect();
        let width = fragments.iter().map(|f| f.width).sum();
        Line {
            fragments,
            width,
            mandatory,
        }
    }
}

/// Breaks `runs` into lines no wider than `max_width` where the text allows.
pub fn wrap_runs(
    runs: &[TextRun],
    max_width: Pt,
    measurer: &dyn TextMeasurer,
    overflow_wrap: OverflowWrap,
) -> Vec<Line> {
    let perf = perf_start();
    let max_width = max_width.max(Pt::ZERO);
    let seq = Sequence::new(runs, measurer);
    let mut lines = Vec::new();
    let (mut line_start, mut line_end, mut line_width) = (0usize, 0usize, Pt::ZERO);

    let segments = seq.segments();
    for seg in &segments {
        if line_end > line_start && line_width + seg.trimmed_width > max_width {
            lines.push(seq.make_line(line_start, line_end, false));
            line_start = line_end;
            line_width = Pt::ZERO;
        }
        if line_end == line_start
            && seg.trimmed_width > max_width
            && overflow_wrap == OverflowWrap::BreakWord
        {
            let pieces = seq.split_by_graphemes(seg, max_width);
            let last = pieces.len() - 1;
            for (idx, (start, end, width)) in pieces.into_iter().enumerate() {
                if idx < last {
                    lines.push(seq.make_line(start, end, false));
                } else {
                    line_start = start;
                    line_end = end;
                    line_width = width;
                }
            }
        } else {
            if line_end == line_start {
                line_start = seg.start;
            }
            line_end = seg.end;
            line_width += seg.width;
        }
        if seg.mandatory {
            lines.push(seq.make_line(line_start, line_end, true));
            line_start = line_end;
            line_width = Pt::ZERO;
        }
    }
    if line_end > line_start || lines.is_empty() {
        lines.push(seq.make_line(line_start, line_end, false));
    }

    log_perf_counts(
        "layout.text.counts",
        &[
            ("runs", runs.len() as u64),
            ("bytes", seq.full.len() as u64),
            ("segments", segments.len() as u64),
            ("lines", lines.len() as u64),
        ],
    );
    perf_end("layout.text.wrap", perf);
    lines
}

/// Min-content and max-content widths of `runs`.
///
/// Min-content is the widest unbreakable segment without its hanging
/// whitespace; max-content is the widest line when only forced breaks apply.
pub fn intrinsic_widths(runs: &[TextRun], measurer: &dyn TextMeasurer) -> (Pt, Pt) {
    let seq = Sequence::new(runs, measurer);
    let (mut min, mut max, mut line) = (Pt::ZERO, Pt::ZERO, Pt::ZERO);
    for seg in seq.segments() {
        min = min.max(seg.trimmed_width);
        max = max.max(line + seg.trimmed_width);
        line = if seg.mandatory {
            Pt::ZERO
        } else {
            line + seg.width
        };
    }
    (min, max)
}

/// Greedy longest-match word segmentation against `dictionary`.
///
/// Returns byte offsets strictly inside `text` where one word ends and the
/// next begins. Text not covered by the dictionary stays in one segment
/// until the next known word.
pub fn segment_special_script(text: &str, dictionary: &[&str]) -> Vec<usize> {
    let words: HashSet<&str> = dictionary.iter().copied().filter(|w| !w.is_empty()).collect();
    let longest = words.iter().map(|w| w.chars().count()).max().unwrap_or(0);
    let mut breaks = Vec::new();
    let mut pos = 0usize;
    let mut in_unknown = false;
    while pos < text.len() {
        let rest = &text[pos..];
        let mut matched = None;
        let ends: Vec<usize> = rest
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take(longest)
            .collect();
        for end in ends.into_iter().rev() {
            if words.contains(&rest[..end]) {
                matched = Some(end);
                break;
            }
        }
        match matched {
            Some(len) => {
                if pos > 0 {
                    breaks.push(pos);
                }
                pos += len;
                in_unknown = false;
            }
            None => {
                if pos > 0 && !in_unknown {
                    breaks.push(pos);
                }
                let step = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                pos += step;
                in_unknown = true;
            }
        }
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::FixedAdvanceMeasurer;

    const HELLO_TH: &str = "สวัสดี";
    const POLITE_TH: &str = "ครับ";

    fn wrap(runs: &[TextRun], width: f32, mode: OverflowWrap) -> Vec<Line> {
        wrap_runs(runs, Pt::from_f32(width), &FixedAdvanceMeasurer, mode)
    }

    fn texts(lines: &[Line], runs: &[TextRun]) -> Vec<String> {
        lines.iter().map(|l| l.text(runs)).collect()
    }

    #[test]
    fn breaks_at_spaces_and_hangs_trailing_whitespace() {
        let runs = vec![TextRun::new("aaa bbb ccc   ", 10.0)];
        let lines = wrap(&runs, 40.0, OverflowWrap::Normal);
        assert_eq!(texts(&lines, &runs), vec!["aaa", "bbb", "ccc"]);
        assert_eq!(lines[2].width, Pt::from_i32(18));
    }

    #[test]
    fn word_split_across_runs_backtracks_to_earlier_run() {
        let runs = vec![TextRun::new("Hello wor", 10.0), TextRun::new("ld again", 10.0)];
        let lines = wrap(&runs, 65.0, OverflowWrap::Normal);
        assert_eq!(texts(&lines, &runs), vec!["Hello", "world", "again"]);
        let second = &lines[1].fragments;
        assert_eq!(second.len(), 2);
        assert_eq!((second[0].run, second[0].range.clone()), (0, 6..9));
        assert_eq!((second[1].run, second[1].range.clone()), (1, 0..2));
        assert_eq!(lines[1].width, Pt::from_i32(30));
    }

    #[test]
    fn mandatory_breaks_end_lines() {
        let runs = vec![TextRun::new("ab\n\ncd", 10.0)];
        let lines = wrap(&runs, 500.0, OverflowWrap::Normal);
        assert_eq!(texts(&lines, &runs), vec!["ab", "", "cd"]);
        assert!(lines[0].mandatory && lines[1].mandatory);
        assert!(!lines[2].mandatory);
        assert_eq!(lines[0].width, Pt::from_i32(12));
    }

    #[test]
    fn long_word_splits_only_with_break_word() {
        let runs = vec![TextRun::new("abcdefghij", 10.0)];
        let normal = wrap(&runs, 30.0, OverflowWrap::Normal);
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].width, Pt::from_i32(60));
        let broken = wrap(&runs, 30.0, OverflowWrap::BreakWord);
        assert_eq!(texts(&broken, &runs), vec!["abcde", "fghij"]);
    }

    #[test]
    fn intrinsic_widths_follow_break_opportunities() {
        let runs = vec![TextRun::new("well-known fact\nok", 10.0)];
        let (min, max) = intrinsic_widths(&runs, &FixedAdvanceMeasurer);
        // UAX #14 allows a break after the hyphen.
        assert_eq!(min, Pt::from_i32(30));
        assert_eq!(max, Pt::from_i32(90));

        let (min, max) = intrinsic_widths(&[], &FixedAdvanceMeasurer);
        assert_eq!((min, max), (Pt::ZERO, Pt::ZERO));
    }

    #[test]
    fn empty_input_yields_single_empty_line() {
        let lines = wrap(&[], 100.0, OverflowWrap::Normal);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_empty());
        assert_eq!(lines[0].width, Pt::ZERO);
    }

    #[test]
    fn thai_breaks_only_at_supplied_offsets() {
        let text = format!("{HELLO_TH}{POLITE_TH}");
        let plain = vec![TextRun::new(text.clone(), 10.0)];
        let lines = wrap(&plain, 40.0, OverflowWrap::Normal);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].width, Pt::from_i32(60));

        let segmented =
            vec![TextRun::new(text, 10.0).with_special_script_breaks(vec![HELLO_TH.len()])];
        let lines = wrap(&segmented, 40.0, OverflowWrap::Normal);
        assert_eq!(texts(&lines, &segmented), vec![HELLO_TH, POLITE_TH]);
        assert_eq!(lines[0].width, Pt::from_i32(36));
    }

    #[test]
    fn special_breaks_outside_special_script_are_ignored() {
        let runs = vec![TextRun::new("abcdef", 10.0).with_special_script_breaks(vec![3])];
        let lines = wrap(&runs, 20.0, OverflowWrap::Normal);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn thai_mixed_with_latin_across_runs() {
        let runs = vec![
            TextRun::new("Hi ", 10.0),
            TextRun::new(format!("{HELLO_TH}{POLITE_TH}"), 10.0)
                .with_special_script_breaks(vec![HELLO_TH.len()]),
        ];
        let lines = wrap(&runs, 60.0, OverflowWrap::Normal);
        assert_eq!(
            texts(&lines, &runs),
            vec![format!("Hi {HELLO_TH}"), POLITE_TH.to_string()]
        );
        assert_eq!(lines[0].fragments.len(), 2);
    }

    #[test]
    fn dictionary_segmentation_prefers_longest_words() {
        let text = format!("{HELLO_TH}{POLITE_TH}");
        let breaks = segment_special_script(&text, &[POLITE_TH, HELLO_TH, "สวัส"]);
        assert_eq!(breaks, vec![HELLO_TH.len()]);
        assert!(segment_special_script("", &[HELLO_TH]).is_empty());
    }

    #[test]
    fn special_script_detection() {
        assert!(is_special_script('ก'));
        assert!(is_special_script('ក'));
        assert!(!is_special_script('a'));
    }
}
