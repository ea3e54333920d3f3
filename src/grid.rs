//! Grid item placement (CSS Grid §8.5) and track sizing.

use std::collections::HashMap;

use crate::debug::{DebugLogger, log_event};
use crate::error::DocflowError;
use crate::length::{FontContext, LengthSpec};
use crate::measure::Measure;
use crate::perf::{log_perf_counts, perf_end, perf_start};
use crate::types::{Pt, Rect, Size};

const MAX_GRID_TRACKS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFlow {
    Row,
    Column,
    RowDense,
    ColumnDense,
}

impl GridFlow {
    fn is_dense(self) -> bool {
        matches!(self, GridFlow::RowDense | GridFlow::ColumnDense)
    }

    fn is_row(self) -> bool {
        matches!(self, GridFlow::Row | GridFlow::RowDense)
    }
}

/// A grid line reference. Line numbers are 1-based; negative numbers count
/// back from the last line of the explicit grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridLine {
    Auto,
    Line(i32),
    Span(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPlacement {
    pub row_start: GridLine,
    pub row_end: GridLine,
    pub column_start: GridLine,
    pub column_end: GridLine,
}

impl Default for GridPlacement {
    fn default() -> Self {
        Self {
            row_start: GridLine::Auto,
            row_end: GridLine::Auto,
            column_start: GridLine::Auto,
            column_end: GridLine::Auto,
        }
    }
}

impl GridPlacement {
    pub fn at(row: i32, column: i32) -> Self {
        Self {
            row_start: GridLine::Line(row),
            row_end: GridLine::Auto,
            column_start: GridLine::Line(column),
            column_end: GridLine::Auto,
        }
    }

    pub fn span(rows: u32, columns: u32) -> Self {
        Self {
            row_start: GridLine::Span(rows),
            row_end: GridLine::Auto,
            column_start: GridLine::Span(columns),
            column_end: GridLine::Auto,
        }
    }

    pub fn with_rows(mut self, start: GridLine, end: GridLine) -> Self {
        self.row_start = start;
        self.row_end = end;
        self
    }

    pub fn with_columns(mut self, start: GridLine, end: GridLine) -> Self {
        self.column_start = start;
        self.column_end = end;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackSize {
    Fixed(Pt),
    /// Fraction of the container size (0.25 == 25%).
    Percent(f32),
    Fr(f32),
    Auto,
    MinContent,
    MaxContent,
    MinMax(Box<TrackSize>, Box<TrackSize>),
}

impl TrackSize {
    pub fn pt(value: f32) -> Self {
        TrackSize::Fixed(Pt::from_f32(value))
    }

    pub fn minmax(min: TrackSize, max: TrackSize) -> Self {
        TrackSize::MinMax(Box::new(min), Box::new(max))
    }
}

pub struct GridItem {
    content: Box<dyn Measure>,
    pub placement: GridPlacement,
    pub order: i32,
}

impl GridItem {
    pub fn new(content: impl Measure + 'static) -> Self {
        Self {
            content: Box::new(content),
            placement: GridPlacement::default(),
            order: 0,
        }
    }

    pub fn with_placement(mut self, placement: GridPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

pub struct GridContainer {
    pub template_columns: Vec<TrackSize>,
    pub template_rows: Vec<TrackSize>,
    pub auto_columns: TrackSize,
    pub auto_rows: TrackSize,
    pub flow: GridFlow,
    pub row_gap: LengthSpec,
    pub column_gap: LengthSpec,
    items: Vec<GridItem>,
}

impl Default for GridContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl GridContainer {
    pub fn new() -> Self {
        Self {
            template_columns: Vec::new(),
            template_rows: Vec::new(),
            auto_columns: TrackSize::Auto,
            auto_rows: TrackSize::Auto,
            flow: GridFlow::Row,
            row_gap: LengthSpec::Absolute(Pt::ZERO),
            column_gap: LengthSpec::Absolute(Pt::ZERO),
            items: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<TrackSize>) -> Self {
        self.template_columns = columns;
        self
    }

    pub fn with_rows(mut self, rows: Vec<TrackSize>) -> Self {
        self.template_rows = rows;
        self
    }

    pub fn with_auto_tracks(mut self, auto_rows: TrackSize, auto_columns: TrackSize) -> Self {
        self.auto_rows = auto_rows;
        self.auto_columns = auto_columns;
        self
    }

    pub fn with_flow(mut self, flow: GridFlow) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_gaps(mut self, row_gap: LengthSpec, column_gap: LengthSpec) -> Self {
        self.row_gap = row_gap;
        self.column_gap = column_gap;
        self
    }

    pub fn push(&mut self, item: GridItem) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: GridItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn items(&self) -> &[GridItem] {
        &self.items
    }

    pub fn place_items(&self) -> Result<Grid, DocflowError> {
        self.place_items_logged(None)
    }

    pub fn place_items_logged(&self, debug: Option<&DebugLogger>) -> Result<Grid, DocflowError> {
        place(self, debug)
    }

    pub fn layout(
        &self,
        width: Pt,
        height: Option<Pt>,
        fonts: FontContext,
    ) -> Result<GridLayout, DocflowError> {
        self.layout_logged(width, height, fonts, None)
    }

    pub fn layout_logged(
        &self,
        width: Pt,
        height: Option<Pt>,
        fonts: FontContext,
        debug: Option<&DebugLogger>,
    ) -> Result<GridLayout, DocflowError> {
        let perf = perf_start();
        let grid = self.place_items_logged(debug)?;
        let column_gap = self.column_gap.resolve(width, fonts).max(Pt::ZERO);
        let row_gap = self
            .row_gap
            .resolve_definite(height, fonts)
            .unwrap_or(Pt::ZERO)
            .max(Pt::ZERO);

        let column_defs: Vec<TrackSize> = (0..grid.columns)
            .map(|i| track_def(&self.template_columns, &self.auto_columns, i))
            .collect();
        let column_contributions: Vec<Contribution> = grid
            .cells
            .iter()
            .map(|cell| {
                let content = &self.items[cell.item_index].content;
                Contribution {
                    start: cell.column,
                    span: cell.column_span,
                    min: content.min_content_width(),
                    max: content.max_content_width(),
                }
            })
            .collect();
        let columns = size_tracks(&column_defs, Some(width), column_gap, &column_contributions);

        let column_offsets = offsets(&columns, column_gap);
        let row_defs: Vec<TrackSize> = (0..grid.rows)
            .map(|i| track_def(&self.template_rows, &self.auto_rows, i))
            .collect();
        let row_contributions: Vec<Contribution> = grid
            .cells
            .iter()
            .map(|cell| {
                let area_width = span_size(&columns, column_gap, cell.column, cell.column_span);
                let h = self.items[cell.item_index]
                    .content
                    .height_for_width(area_width);
                Contribution {
                    start: cell.row,
                    span: cell.row_span,
                    min: h,
                    max: h,
                }
            })
            .collect();
        let rows = size_tracks(&row_defs, height, row_gap, &row_contributions);
        let row_offsets = offsets(&rows, row_gap);

        let cells = grid
            .cells
            .iter()
            .map(|cell| PlacedCell {
                cell: *cell,
                rect: Rect {
                    x: column_offsets[cell.column],
                    y: row_offsets[cell.row],
                    width: span_size(&columns, column_gap, cell.column, cell.column_span),
                    height: span_size(&rows, row_gap, cell.row, cell.row_span),
                },
            })
            .collect();
        let size = Size {
            width: total_size(&columns, column_gap),
            height: total_size(&rows, row_gap),
        };
        log_perf_counts(
            "layout.grid.counts",
            &[
                ("items", self.items.len() as u64),
                ("rows", rows.len() as u64),
                ("columns", columns.len() as u64),
            ],
        );
        perf_end("layout.grid", perf);
        Ok(GridLayout {
            cells,
            columns,
            rows,
            size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub item_index: usize,
    pub row: usize,
    pub column: usize,
    pub row_span: usize,
    pub column_span: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOrder {
    RowMajor,
    ColumnMajor,
}

/// Result of placement: every item's area on a grid of `rows` x `columns` tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub rows: usize,
    pub columns: usize,
    /// Indexed by item: `cells[i].item_index == i`.
    pub cells: Vec<GridCell>,
    occupancy: Vec<Vec<Option<usize>>>,
}

impl Grid {
    /// The cell covering a track slot, if any. Overlapping items resolve to the first placed.
    pub fn cell_at(&self, row: usize, column: usize) -> Option<&GridCell> {
        let idx = (*self.occupancy.get(row)?.get(column)?)?;
        self.cells.get(idx)
    }

    pub fn unique_cells(&self, order: CellOrder) -> Vec<&GridCell> {
        let mut out: Vec<&GridCell> = self.cells.iter().collect();
        match order {
            CellOrder::RowMajor => out.sort_by_key(|c| (c.row, c.column, c.item_index)),
            CellOrder::ColumnMajor => out.sort_by_key(|c| (c.column, c.row, c.item_index)),
        }
        out
    }

    pub fn is_empty_slot(&self, row: usize, column: usize) -> bool {
        self.cell_at(row, column).is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedCell {
    pub cell: GridCell,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub cells: Vec<PlacedCell>,
    pub columns: Vec<Pt>,
    pub rows: Vec<Pt>,
    pub size: Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisSpan {
    start: Option<usize>,
    span: usize,
}

fn resolve_axis(
    start: GridLine,
    end: GridLine,
    explicit_tracks: usize,
    axis: &str,
    debug: Option<&DebugLogger>,
) -> Result<AxisSpan, DocflowError> {
    for line in [start, end] {
        match line {
            GridLine::Line(0) => {
                return Err(DocflowError::InvalidGridPlacement(format!(
                    "{axis} line 0 does not exist"
                )));
            }
            GridLine::Span(0) => {
                return Err(DocflowError::InvalidGridPlacement(format!(
                    "{axis} span must be positive"
                )));
            }
            _ => {}
        }
    }
    let lines = explicit_tracks as i64 + 1;
    let index = |n: i32| -> i64 {
        if n > 0 { n as i64 - 1 } else { lines + n as i64 }
    };
    let ending_at = |end: i64, span: i64| -> (i64, i64) {
        let start = end - span;
        (start, (end.max(0) - start.max(0)).max(1))
    };
    let (raw_start, span) = match (start, end) {
        (GridLine::Line(a), GridLine::Line(b)) => {
            let (mut s, mut e) = (index(a), index(b));
            if e < s {
                std::mem::swap(&mut s, &mut e);
            }
            let e = e.max(0);
            let s_clamped = s.max(0);
            (s, (e - s_clamped).max(1))
        }
        (GridLine::Line(a), GridLine::Span(n)) => (index(a), n as i64),
        (GridLine::Line(a), GridLine::Auto) => (index(a), 1),
        // The end line is fixed; a start clamped to line 1 shortens the span.
        (GridLine::Span(n), GridLine::Line(b)) => ending_at(index(b), n as i64),
        (GridLine::Auto, GridLine::Line(b)) => ending_at(index(b), 1),
        (GridLine::Span(n), _) | (GridLine::Auto, GridLine::Span(n)) => {
            return checked_span(None, n as i64, axis);
        }
        (GridLine::Auto, GridLine::Auto) => return checked_span(None, 1, axis),
    };
    let start = if raw_start < 0 {
        log_event(
            debug,
            "debug.grid.line_clamped",
            &[("axis", axis.to_string()), ("line", (raw_start + 1).to_string())],
        );
        0
    } else {
        raw_start
    };
    checked_span(Some(start), span, axis)
}

fn checked_span(start: Option<i64>, span: i64, axis: &str) -> Result<AxisSpan, DocflowError> {
    let end = start.unwrap_or(0) + span;
    if end > MAX_GRID_TRACKS as i64 {
        return Err(DocflowError::InvalidGridPlacement(format!(
            "{axis} placement ends at track {end}, beyond {MAX_GRID_TRACKS}"
        )));
    }
    Ok(AxisSpan {
        start: start.map(|s| s as usize),
        span: span.max(1) as usize,
    })
}

/// Slot occupancy in flow coordinates: `major` lines (rows for row flow)
/// each holding `minor` slots.
struct Occupancy {
    minor: usize,
    lines: Vec<Vec<Option<usize>>>,
}

impl Occupancy {
    fn fits(&self, major: usize, minor: usize, major_span: usize, minor_span: usize) -> bool {
        (major..major + major_span).all(|m| match self.lines.get(m) {
            Some(line) => (minor..minor + minor_span)
                .all(|n| line.get(n).is_none_or(|slot| slot.is_none())),
            None => true,
        })
    }

    fn occupy(&mut self, item: usize, major: usize, minor: usize, major_span: usize, minor_span: usize) {
        self.minor = self.minor.max(minor + minor_span);
        if self.lines.len() < major + major_span {
            self.lines.resize_with(major + major_span, Vec::new);
        }
        for line in &mut self.lines[major..major + major_span] {
            if line.len() < minor + minor_span {
                line.resize(minor + minor_span, None);
            }
            for slot in &mut line[minor..minor + minor_span] {
                if slot.is_none() {
                    *slot = Some(item);
                }
            }
        }
    }
}

struct Pending {
    item: usize,
    major: AxisSpan,
    minor: AxisSpan,
}

fn place(container: &GridContainer, debug: Option<&DebugLogger>) -> Result<Grid, DocflowError> {
    let row_flow = container.flow.is_row();
    let dense = container.flow.is_dense();
    let explicit_rows = container.template_rows.len();
    let explicit_columns = container.template_columns.len();

    let mut order: Vec<usize> = (0..container.items.len()).collect();
    order.sort_by_key(|idx| (container.items[*idx].order, *idx));

    let mut pending = Vec::with_capacity(order.len());
    for idx in order {
        let p = container.items[idx].placement;
        let rows = resolve_axis(p.row_start, p.row_end, explicit_rows, "row", debug)?;
        let columns = resolve_axis(p.column_start, p.column_end, explicit_columns, "column", debug)?;
        let (major, minor) = if row_flow { (rows, columns) } else { (columns, rows) };
        pending.push(Pending {
            item: idx,
            major,
            minor,
        });
    }

    let explicit_minor = if row_flow { explicit_columns } else { explicit_rows };
    let minor_count = pending
        .iter()
        .map(|p| p.minor.start.unwrap_or(0) + p.minor.span)
        .fold(explicit_minor, usize::max)
        .max(1);
    let mut occ = Occupancy {
        minor: minor_count,
        lines: Vec::new(),
    };
    // (item, major, minor, major_span, minor_span)
    let mut placed: Vec<(usize, usize, usize, usize, usize)> = Vec::with_capacity(pending.len());

    // 1. Fully definite items.
    for p in &pending {
        if let (Some(major), Some(minor)) = (p.major.start, p.minor.start) {
            occ.occupy(p.item, major, minor, p.major.span, p.minor.span);
            placed.push((p.item, major, minor, p.major.span, p.minor.span));
        }
    }

    // 2. Items locked to a major line.
    let mut line_cursors: HashMap<usize, usize> = HashMap::new();
    for p in &pending {
        let (Some(major), None) = (p.major.start, p.minor.start) else {
            continue;
        };
        let mut minor = if dense {
            0
        } else {
            line_cursors.get(&major).copied().unwrap_or(0)
        };
        while !occ.fits(major, minor, p.major.span, p.minor.span) {
            minor += 1;
        }
        occ.occupy(p.item, major, minor, p.major.span, p.minor.span);
        placed.push((p.item, major, minor, p.major.span, p.minor.span));
        line_cursors.insert(major, minor + p.minor.span);
    }

    // 3. Everything else, walking the auto-placement cursor.
    let (mut cursor_major, mut cursor_minor) = (0usize, 0usize);
    for p in &pending {
        if p.major.start.is_some() {
            continue;
        }
        if dense {
            cursor_major = 0;
            cursor_minor = 0;
        }
        let (major, minor) = match p.minor.start {
            Some(minor) => {
                if !dense && minor < cursor_minor {
                    cursor_major += 1;
                }
                cursor_minor = minor;
                while !occ.fits(cursor_major, minor, p.major.span, p.minor.span) {
                    cursor_major += 1;
                }
                (cursor_major, minor)
            }
            None => loop {
                if cursor_minor + p.minor.span <= occ.minor
                    && occ.fits(cursor_major, cursor_minor, p.major.span, p.minor.span)
                {
                    break (cursor_major, cursor_minor);
                }
                cursor_minor += 1;
                if cursor_minor + p.minor.span > occ.minor {
                    cursor_major += 1;
                    cursor_minor = 0;
                }
            },
        };
        occ.occupy(p.item, major, minor, p.major.span, p.minor.span);
        placed.push((p.item, major, minor, p.major.span, p.minor.span));
    }

    let mut cells: Vec<GridCell> = placed
        .into_iter()
        .map(|(item, major, minor, major_span, minor_span)| {
            if row_flow {
                GridCell {
                    item_index: item,
                    row: major,
                    column: minor,
                    row_span: major_span,
                    column_span: minor_span,
                }
            } else {
                GridCell {
                    item_index: item,
                    row: minor,
                    column: major,
                    row_span: minor_span,
                    column_span: major_span,
                }
            }
        })
        .collect();
    cells.sort_by_key(|c| c.item_index);

    let rows = cells
        .iter()
        .map(|c| c.row + c.row_span)
        .fold(explicit_rows, usize::max);
    let columns = cells
        .iter()
        .map(|c| c.column + c.column_span)
        .fold(explicit_columns, usize::max);
    let mut occupancy = vec![vec![None; columns]; rows];
    for (idx, cell) in cells.iter().enumerate() {
        for row in &mut occupancy[cell.row..cell.row + cell.row_span] {
            for slot in &mut row[cell.column..cell.column + cell.column_span] {
                if slot.is_none() {
                    *slot = Some(idx);
                }
            }
        }
    }
    Ok(Grid {
        rows,
        columns,
        cells,
        occupancy,
    })
}

fn track_def(template: &[TrackSize], auto: &TrackSize, index: usize) -> TrackSize {
    template.get(index).cloned().unwrap_or_else(|| auto.clone())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Sizing {
    Fixed(Pt),
    MinContent,
    MaxContent,
    Auto,
    Fr(f32),
}

impl Sizing {
    fn is_intrinsic(self) -> bool {
        matches!(self, Sizing::MinContent | Sizing::MaxContent | Sizing::Auto)
    }
}

fn sizing_functions(def: &TrackSize, avail: Option<Pt>) -> (Sizing, Sizing) {
    let single = |def: &TrackSize| match def {
        TrackSize::Fixed(v) => Sizing::Fixed((*v).max(Pt::ZERO)),
        TrackSize::Percent(p) => match avail {
            Some(a) => Sizing::Fixed((a * *p).max(Pt::ZERO)),
            None => Sizing::Auto,
        },
        TrackSize::Fr(f) => Sizing::Fr(f.max(0.0)),
        TrackSize::Auto => Sizing::Auto,
        TrackSize::MinContent => Sizing::MinContent,
        TrackSize::MaxContent => Sizing::MaxContent,
        TrackSize::MinMax(_, max) => match max.as_ref() {
            TrackSize::Fr(f) => Sizing::Fr(f.max(0.0)),
            _ => Sizing::Auto,
        },
    };
    match def {
        TrackSize::Fr(f) => (Sizing::Auto, Sizing::Fr(f.max(0.0))),
        TrackSize::MinMax(min, max) => {
            let min_fn = match single(min) {
                Sizing::Fr(_) => Sizing::Auto,
                other => other,
            };
            (min_fn, single(max))
        }
        other => {
            let s = single(other);
            (s, s)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Contribution {
    start: usize,
    span: usize,
    min: Pt,
    max: Pt,
}

#[derive(Debug, Clone, Copy)]
struct Track {
    min_fn: Sizing,
    max_fn: Sizing,
    base: Pt,
    limit: Pt,
}

impl Track {
    fn fr(&self) -> Option<f32> {
        match self.max_fn {
            Sizing::Fr(f) => Some(f),
            _ => None,
        }
    }
}

fn size_tracks(
    defs: &[TrackSize],
    avail: Option<Pt>,
    gap: Pt,
    contributions: &[Contribution],
) -> Vec<Pt> {
    if defs.is_empty() {
        return Vec::new();
    }
    let mut tracks: Vec<Track> = defs
        .iter()
        .map(|def| {
            let (min_fn, max_fn) = sizing_functions(def, avail);
            let base = match min_fn {
                Sizing::Fixed(v) => v,
                _ => Pt::ZERO,
            };
            let limit = match max_fn {
                Sizing::Fixed(v) => v.max(base),
                _ => base,
            };
            Track {
                min_fn,
                max_fn,
                base,
                limit,
            }
        })
        .collect();

    let min_for = |sizing: Sizing, c: &Contribution| match sizing {
        Sizing::MaxContent => c.max,
        _ => c.min,
    };
    let max_for = |sizing: Sizing, c: &Contribution| match sizing {
        Sizing::MinContent => c.min,
        _ => c.max,
    };

    for c in contributions.iter().filter(|c| c.span == 1) {
        let Some(track) = tracks.get_mut(c.start) else {
            continue;
        };
        if track.min_fn.is_intrinsic() {
            track.base = track.base.max(min_for(track.min_fn, c));
        }
        if track.max_fn.is_intrinsic() {
            track.limit = track.limit.max(max_for(track.max_fn, c));
        }
        track.limit = track.limit.max(track.base);
    }

    let mut spanning: Vec<&Contribution> = contributions.iter().filter(|c| c.span > 1).collect();
    spanning.sort_by_key(|c| c.span);
    for c in spanning {
        let end = (c.start + c.span).min(tracks.len());
        if c.start >= end {
            continue;
        }
        let range = c.start..end;
        let inner_gaps = gap * ((end - c.start) as i32 - 1);
        let crosses_flex = tracks[range.clone()].iter().any(|t| t.fr().is_some());

        let base_sum: Pt = tracks[range.clone()].iter().map(|t| t.base).sum();
        let deficit = c.min - base_sum - inner_gaps;
        if deficit.is_positive() {
            let targets: Vec<usize> = range
                .clone()
                .filter(|i| {
                    if crosses_flex {
                        tracks[*i].fr().is_some()
                    } else {
                        tracks[*i].min_fn.is_intrinsic()
                    }
                })
                .collect();
            for (i, share) in even_shares(deficit, &targets) {
                tracks[i].base += share;
                tracks[i].limit = tracks[i].limit.max(tracks[i].base);
            }
        }
        if !crosses_flex {
            let limit_sum: Pt = tracks[range.clone()].iter().map(|t| t.limit).sum();
            let deficit = c.max - limit_sum - inner_gaps;
            if deficit.is_positive() {
                let targets: Vec<usize> = range
                    .clone()
                    .filter(|i| tracks[*i].max_fn.is_intrinsic())
                    .collect();
                for (i, share) in even_shares(deficit, &targets) {
                    tracks[i].limit += share;
                }
            }
        }
    }

    let gaps = gap * (tracks.len() as i32 - 1);

    // Maximize non-flexible tracks toward their limits.
    match avail {
        Some(avail) => {
            let mut free = avail - gaps - tracks.iter().map(|t| t.base).sum::<Pt>();
            while free.is_positive() {
                let growable: Vec<usize> = (0..tracks.len())
                    .filter(|i| tracks[*i].fr().is_none() && tracks[*i].limit > tracks[*i].base)
                    .collect();
                if growable.is_empty() {
                    break;
                }
                let mut used = Pt::ZERO;
                for (i, share) in even_shares(free, &growable) {
                    let t = &mut tracks[i];
                    let grow = share.min(t.limit - t.base);
                    t.base += grow;
                    used += grow;
                }
                if !used.is_positive() {
                    break;
                }
                free -= used;
            }
        }
        None => {
            for t in tracks.iter_mut().filter(|t| t.fr().is_none()) {
                t.base = t.limit;
            }
        }
    }

    let has_flex = tracks.iter().any(|t| t.fr().is_some());
    if has_flex {
        expand_flexible_tracks(&mut tracks, avail, gaps, contributions);
    } else if let Some(avail) = avail {
        let free = avail - gaps - tracks.iter().map(|t| t.base).sum::<Pt>();
        if free.is_positive() {
            let autos: Vec<usize> = (0..tracks.len())
                .filter(|i| tracks[*i].max_fn == Sizing::Auto)
                .collect();
            for (i, share) in even_shares(free, &autos) {
                tracks[i].base += share;
            }
        }
    }

    tracks.into_iter().map(|t| t.base.max(Pt::ZERO)).collect()
}

fn expand_flexible_tracks(
    tracks: &mut [Track],
    avail: Option<Pt>,
    gaps: Pt,
    contributions: &[Contribution],
) {
    let fraction = match avail {
        Some(avail) => {
            let mut inflexible: Vec<bool> = tracks.iter().map(|t| t.fr().is_none()).collect();
            loop {
                let leftover = avail
                    - gaps
                    - tracks
                        .iter()
                        .zip(&inflexible)
                        .filter(|(_, fixed)| **fixed)
                        .map(|(t, _)| t.base)
                        .sum::<Pt>();
                let fr_sum: f32 = tracks
                    .iter()
                    .zip(&inflexible)
                    .filter(|(_, fixed)| !**fixed)
                    .filter_map(|(t, _)| t.fr())
                    .sum();
                if fr_sum <= 0.0 {
                    break None;
                }
                let fraction = leftover.max(Pt::ZERO) / fr_sum.max(1.0);
                let mut changed = false;
                for (t, fixed) in tracks.iter().zip(inflexible.iter_mut()) {
                    if let (false, Some(fr)) = (*fixed, t.fr()) {
                        if fraction * fr < t.base {
                            *fixed = true;
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break Some(fraction);
                }
            }
        }
        None => {
            // Indefinite: the fraction that lets each flexible track fit its content.
            let mut fraction = Pt::ZERO;
            for t in tracks.iter() {
                if let Some(fr) = t.fr().filter(|fr| *fr > 0.0) {
                    fraction = fraction.max(t.base / fr.max(1.0));
                }
            }
            for c in contributions.iter().filter(|c| c.span == 1) {
                if let Some(fr) = tracks
                    .get(c.start)
                    .and_then(Track::fr)
                    .filter(|fr| *fr > 0.0)
                {
                    fraction = fraction.max(c.max / fr.max(1.0));
                }
            }
            Some(fraction)
        }
    };
    let Some(fraction) = fraction else {
        return;
    };
    for t in tracks.iter_mut() {
        if let Some(fr) = t.fr() {
            t.base = t.base.max(fraction * fr);
        }
    }
}

/// Splits `amount` evenly over `targets`; leftover milli-points go to the first targets.
fn even_shares(amount: Pt, targets: &[usize]) -> Vec<(usize, Pt)> {
    if targets.is_empty() {
        return Vec::new();
    }
    let total = amount.to_milli_i64();
    let n = targets.len() as i64;
    let each = total.div_euclid(n);
    let rem = total.rem_euclid(n);
    targets
        .iter()
        .enumerate()
        .map(|(k, idx)| {
            let extra = if (k as i64) < rem { 1 } else { 0 };
            (*idx, Pt::from_milli_i64(each + extra))
        })
        .collect()
}

fn offsets(tracks: &[Pt], gap: Pt) -> Vec<Pt> {
    let mut out = Vec::with_capacity(tracks.len());
    let mut cursor = Pt::ZERO;
    for size in tracks {
        out.push(cursor);
        cursor = cursor + *size + gap;
    }
    out
}

fn span_size(tracks: &[Pt], gap: Pt, start: usize, span: usize) -> Pt {
    let end = (start + span).min(tracks.len());
    if start >= end {
        return Pt::ZERO;
    }
    tracks[start..end].iter().sum::<Pt>() + gap * ((end - start) as i32 - 1)
}

fn total_size(tracks: &[Pt], gap: Pt) -> Pt {
    if tracks.is_empty() {
        return Pt::ZERO;
    }
    tracks.iter().sum::<Pt>() + gap * (tracks.len() as i32 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::FixedBox;

    fn item() -> GridItem {
        GridItem::new(FixedBox::new(10.0, 10.0))
    }

    fn three_columns() -> GridContainer {
        GridContainer::new().with_columns(vec![TrackSize::Auto, TrackSize::Auto, TrackSize::Auto])
    }

    fn positions(grid: &Grid) -> Vec<(usize, usize)> {
        grid.cells.iter().map(|c| (c.row, c.column)).collect()
    }

    #[test]
    fn sparse_row_flow_fills_rows_in_order() {
        let mut container = three_columns();
        for _ in 0..5 {
            container.push(item());
        }
        let grid = container.place_items().expect("placement");
        assert_eq!(
            positions(&grid),
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1)]
        );
        assert_eq!(grid.rows, 2);
        assert_eq!(grid.columns, 3);
        assert!(grid.is_empty_slot(1, 2));
    }

    #[test]
    fn definite_items_are_placed_before_auto_items() {
        let container = three_columns()
            .with_item(item())
            .with_item(item().with_placement(GridPlacement::at(1, 1)))
            .with_item(item());
        let grid = container.place_items().expect("placement");
        assert_eq!(positions(&grid), vec![(0, 1), (0, 0), (0, 2)]);
        assert_eq!(grid.cell_at(0, 0).map(|c| c.item_index), Some(1));
    }

    #[test]
    fn dense_flow_backfills_holes() {
        let build = |flow| {
            three_columns()
                .with_flow(flow)
                .with_item(item().with_placement(GridPlacement::span(1, 2)))
                .with_item(item().with_placement(GridPlacement::span(1, 2)))
                .with_item(item())
        };
        let sparse = build(GridFlow::Row).place_items().expect("sparse");
        assert_eq!(positions(&sparse), vec![(0, 0), (1, 0), (1, 2)]);
        let dense = build(GridFlow::RowDense).place_items().expect("dense");
        assert_eq!(positions(&dense), vec![(0, 0), (1, 0), (0, 2)]);
    }

    #[test]
    fn column_flow_fills_columns() {
        let container = GridContainer::new()
            .with_rows(vec![TrackSize::Auto, TrackSize::Auto])
            .with_flow(GridFlow::Column)
            .with_item(item())
            .with_item(item())
            .with_item(item());
        let grid = container.place_items().expect("placement");
        assert_eq!(positions(&grid), vec![(0, 0), (1, 0), (0, 1)]);
        let order: Vec<usize> = grid
            .unique_cells(CellOrder::RowMajor)
            .iter()
            .map(|c| c.item_index)
            .collect();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn negative_and_swapped_lines() {
        let container = three_columns()
            .with_item(item().with_placement(
                GridPlacement::default().with_columns(GridLine::Line(1), GridLine::Line(-1)),
            ))
            .with_item(item().with_placement(
                GridPlacement::default()
                    .with_rows(GridLine::Line(2), GridLine::Auto)
                    .with_columns(GridLine::Line(3), GridLine::Line(1)),
            ));
        let grid = container.place_items().expect("placement");
        assert_eq!(grid.cells[0].column_span, 3);
        assert_eq!(grid.cells[0].row, 0);
        assert_eq!((grid.cells[1].row, grid.cells[1].column), (1, 0));
        assert_eq!(grid.cells[1].column_span, 2);
    }

    #[test]
    fn lines_before_the_grid_clamp_to_first_line() {
        let container = three_columns().with_item(item().with_placement(
            GridPlacement::default().with_columns(GridLine::Line(-10), GridLine::Auto),
        ));
        let grid = container.place_items().expect("placement");
        assert_eq!(grid.cells[0].column, 0);
    }

    #[test]
    fn span_ending_at_a_line_keeps_its_end_when_clamped() {
        let four_auto = || GridContainer::new().with_columns(vec![TrackSize::Auto; 4]);
        let clamped = four_auto()
            .with_item(item().with_placement(
                GridPlacement::default().with_columns(GridLine::Span(3), GridLine::Line(2)),
            ))
            .place_items()
            .expect("placement");
        assert_eq!((clamped.cells[0].column, clamped.cells[0].column_span), (0, 1));

        let by_lines = four_auto()
            .with_item(item().with_placement(
                GridPlacement::default().with_columns(GridLine::Line(-9), GridLine::Line(2)),
            ))
            .place_items()
            .expect("placement");
        assert_eq!(clamped.cells[0], by_lines.cells[0]);

        let inside = four_auto()
            .with_item(item().with_placement(
                GridPlacement::default().with_columns(GridLine::Span(2), GridLine::Line(4)),
            ))
            .with_item(item().with_placement(
                GridPlacement::default().with_columns(GridLine::Auto, GridLine::Line(-1)),
            ))
            .place_items()
            .expect("placement");
        assert_eq!((inside.cells[0].column, inside.cells[0].column_span), (1, 2));
        assert_eq!((inside.cells[1].column, inside.cells[1].column_span), (3, 1));
    }

    #[test]
    fn column_dense_flow_backfills_holes() {
        let build = |flow| {
            GridContainer::new()
                .with_rows(vec![TrackSize::Auto; 3])
                .with_flow(flow)
                .with_item(item().with_placement(GridPlacement::span(2, 1)))
                .with_item(item().with_placement(GridPlacement::span(2, 1)))
                .with_item(item())
        };
        let sparse = build(GridFlow::Column).place_items().expect("sparse");
        assert_eq!(positions(&sparse), vec![(0, 0), (0, 1), (2, 1)]);
        let dense = build(GridFlow::ColumnDense).place_items().expect("dense");
        assert_eq!(positions(&dense), vec![(0, 0), (0, 1), (2, 0)]);
        assert_eq!((dense.rows, dense.columns), (3, 2));
    }

    #[test]
    fn zero_line_and_zero_span_are_rejected() {
        let zero_line = three_columns()
            .with_item(item().with_placement(GridPlacement::at(0, 1)))
            .place_items();
        assert!(matches!(zero_line, Err(DocflowError::InvalidGridPlacement(_))));
        let zero_span = three_columns()
            .with_item(item().with_placement(GridPlacement::span(0, 1)))
            .place_items();
        assert!(matches!(zero_span, Err(DocflowError::InvalidGridPlacement(_))));
    }

    #[test]
    fn order_property_reorders_auto_placement() {
        let container = three_columns()
            .with_item(item().with_order(1))
            .with_item(item());
        let grid = container.place_items().expect("placement");
        assert_eq!(positions(&grid), vec![(0, 1), (0, 0)]);
    }

    #[test]
    fn fixed_and_fr_tracks_share_width() {
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::pt(100.0), TrackSize::Fr(1.0), TrackSize::Fr(2.0)]);
        let layout = container
            .layout(Pt::from_i32(400), None, FontContext::default())
            .expect("layout");
        assert_eq!(
            layout.columns,
            vec![Pt::from_i32(100), Pt::from_i32(100), Pt::from_i32(200)]
        );
    }

    #[test]
    fn percent_and_fractional_fr_sum() {
        let layout = GridContainer::new()
            .with_columns(vec![TrackSize::Percent(0.25), TrackSize::Fr(1.0)])
            .layout(Pt::from_i32(200), None, FontContext::default())
            .expect("layout");
        assert_eq!(layout.columns, vec![Pt::from_i32(50), Pt::from_i32(150)]);

        let half = GridContainer::new()
            .with_columns(vec![TrackSize::Fr(0.5)])
            .layout(Pt::from_i32(200), None, FontContext::default())
            .expect("layout");
        assert_eq!(half.columns, vec![Pt::from_i32(100)]);
    }

    #[test]
    fn minmax_tracks_grow_to_their_limit_and_floor_flex() {
        let columns = vec![
            TrackSize::minmax(TrackSize::pt(30.0), TrackSize::pt(60.0)),
            TrackSize::minmax(TrackSize::pt(50.0), TrackSize::Fr(1.0)),
            TrackSize::Fr(1.0),
        ];
        let wide = GridContainer::new()
            .with_columns(columns.clone())
            .layout(Pt::from_i32(200), None, FontContext::default())
            .expect("layout");
        assert_eq!(
            wide.columns,
            vec![Pt::from_i32(60), Pt::from_i32(70), Pt::from_i32(70)]
        );

        // A 45pt fraction would undercut the 50pt minimum of the second track.
        let narrow = GridContainer::new()
            .with_columns(columns)
            .layout(Pt::from_i32(150), None, FontContext::default())
            .expect("layout");
        assert_eq!(
            narrow.columns,
            vec![Pt::from_i32(60), Pt::from_i32(50), Pt::from_i32(40)]
        );
    }

    #[test]
    fn auto_tracks_fit_content_then_stretch() {
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::Auto, TrackSize::Auto])
            .with_item(GridItem::new(FixedBox::new(50.0, 10.0)))
            .with_item(GridItem::new(FixedBox::new(80.0, 20.0)));
        let layout = container
            .layout(Pt::from_i32(300), None, FontContext::default())
            .expect("layout");
        assert_eq!(layout.columns, vec![Pt::from_i32(135), Pt::from_i32(165)]);
        assert_eq!(layout.rows, vec![Pt::from_i32(20)]);
        assert_eq!(layout.size, Size::new(300.0, 20.0));
        assert_eq!(layout.cells[1].rect.x, Pt::from_i32(135));
    }

    #[test]
    fn fr_track_never_shrinks_below_content() {
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::Fr(1.0), TrackSize::Fr(1.0)])
            .with_item(GridItem::new(FixedBox::new(80.0, 10.0)));
        let layout = container
            .layout(Pt::from_i32(100), None, FontContext::default())
            .expect("layout");
        assert_eq!(layout.columns, vec![Pt::from_i32(80), Pt::from_i32(20)]);
    }

    #[test]
    fn spanning_item_distributes_deficit_evenly() {
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::MinContent, TrackSize::MinContent])
            .with_item(GridItem::new(FixedBox::new(20.0, 10.0)))
            .with_item(
                GridItem::new(FixedBox::new(100.0, 10.0)).with_placement(
                    GridPlacement::default()
                        .with_rows(GridLine::Line(2), GridLine::Auto)
                        .with_columns(GridLine::Span(2), GridLine::Auto),
                ),
            );
        let layout = container
            .layout(Pt::from_i32(500), None, FontContext::default())
            .expect("layout");
        assert_eq!(layout.columns, vec![Pt::from_i32(60), Pt::from_i32(40)]);
    }

    #[test]
    fn gaps_offset_tracks() {
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::pt(40.0), TrackSize::pt(40.0)])
            .with_rows(vec![TrackSize::pt(10.0), TrackSize::pt(10.0)])
            .with_gaps(LengthSpec::pt(5.0), LengthSpec::pt(8.0))
            .with_item(item())
            .with_item(item())
            .with_item(item());
        let layout = container
            .layout(Pt::from_i32(200), None, FontContext::default())
            .expect("layout");
        let third = layout.cells[2].rect;
        assert_eq!((third.x, third.y), (Pt::ZERO, Pt::from_i32(15)));
        assert_eq!(layout.cells[1].rect.x, Pt::from_i32(48));
        assert_eq!(layout.size, Size::new(88.0, 25.0));
    }
}
