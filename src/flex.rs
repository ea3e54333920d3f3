//! Flex container layout (CSS Flexbox §9).
//!
//! Rectangles are relative to the container's content box with y growing
//! downwards, the same convention block layout uses.

use crate::length::{FontContext, LengthSpec};
use crate::measure::Measure;
use crate::perf::{log_perf_counts, perf_end, perf_start};
use crate::types::{Pt, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    RowReverse,
    Column,
    ColumnReverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
    WrapReverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    FlexStart,
    FlexEnd,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    FlexStart,
    FlexEnd,
    Center,
    Stretch,
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignSelf {
    Auto,
    Align(AlignItems),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignContent {
    FlexStart,
    FlexEnd,
    Center,
    SpaceBetween,
    SpaceAround,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlexBasis {
    Auto,
    Content,
    Length(LengthSpec),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    pub fn zero() -> Self {
        Self::all(0.0)
    }

    pub fn all(value: f32) -> Self {
        let v = Pt::from_f32(value);
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }
}

pub struct FlexItem {
    content: Box<dyn Measure>,
    pub grow: f32,
    pub shrink: f32,
    pub basis: FlexBasis,
    pub width: LengthSpec,
    pub height: LengthSpec,
    pub min_width: LengthSpec,
    pub max_width: LengthSpec,
    pub min_height: LengthSpec,
    pub max_height: LengthSpec,
    pub align_self: AlignSelf,
    pub margins: Margins,
}

impl FlexItem {
    pub fn new(content: impl Measure + 'static) -> Self {
        Self {
            content: Box::new(content),
            grow: 0.0,
            shrink: 1.0,
            basis: FlexBasis::Auto,
            width: LengthSpec::Auto,
            height: LengthSpec::Auto,
            min_width: LengthSpec::Auto,
            max_width: LengthSpec::Auto,
            min_height: LengthSpec::Auto,
            max_height: LengthSpec::Auto,
            align_self: AlignSelf::Auto,
            margins: Margins::zero(),
        }
    }

    pub fn with_grow(mut self, grow: f32) -> Self {
        self.grow = if grow.is_finite() { grow.max(0.0) } else { 0.0 };
        self
    }

    pub fn with_shrink(mut self, shrink: f32) -> Self {
        self.shrink = if shrink.is_finite() { shrink.max(0.0) } else { 0.0 };
        self
    }

    pub fn with_basis(mut self, basis: FlexBasis) -> Self {
        self.basis = basis;
        self
    }

    pub fn with_size(mut self, width: LengthSpec, height: LengthSpec) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_min_size(mut self, min_width: LengthSpec, min_height: LengthSpec) -> Self {
        self.min_width = min_width;
        self.min_height = min_height;
        self
    }

    pub fn with_max_size(mut self, max_width: LengthSpec, max_height: LengthSpec) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_align_self(mut self, align_self: AlignSelf) -> Self {
        self.align_self = align_self;
        self
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexItemInfo {
    pub index: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlexLayout {
    pub lines: Vec<Vec<FlexItemInfo>>,
    pub size: Size,
}

impl FlexLayout {
    pub fn item(&self, index: usize) -> Option<&FlexItemInfo> {
        self.lines.iter().flatten().find(|info| info.index == index)
    }
}

pub struct FlexContainer {
    pub direction: FlexDirection,
    pub wrap: FlexWrap,
    pub justify: JustifyContent,
    pub align_items: AlignItems,
    pub align_content: AlignContent,
    pub row_gap: LengthSpec,
    pub column_gap: LengthSpec,
    items: Vec<FlexItem>,
}

/// Per-item state carried through the algorithm, in main/cross terms.
#[derive(Debug, Clone, Copy)]
struct ItemState {
    base: Pt,
    hypothetical: Pt,
    min_main: Pt,
    max_main: Option<Pt>,
    margin_main: Pt,
    margin_main_start: Pt,
    margin_cross: Pt,
    margin_cross_start: Pt,
    target: Pt,
    frozen: bool,
    cross: Pt,
    cross_is_auto: bool,
    min_cross: Pt,
    max_cross: Option<Pt>,
    align: AlignItems,
    grow: f32,
    shrink: f32,
}

struct FlexLine {
    items: Vec<usize>,
    cross: Pt,
    cross_offset: Pt,
}

impl FlexContainer {
    pub fn new(direction: FlexDirection) -> Self {
        Self {
            direction,
            wrap: FlexWrap::NoWrap,
            justify: JustifyContent::FlexStart,
            align_items: AlignItems::Stretch,
            align_content: AlignContent::Stretch,
            row_gap: LengthSpec::Absolute(Pt::ZERO),
            column_gap: LengthSpec::Absolute(Pt::ZERO),
            items: Vec::new(),
        }
    }

    pub fn with_wrap(mut self, wrap: FlexWrap) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_justify(mut self, justify: JustifyContent) -> Self {
        self.justify = justify;
        self
    }

    pub fn with_align_items(mut self, align: AlignItems) -> Self {
        self.align_items = align;
        self
    }

    pub fn with_align_content(mut self, align: AlignContent) -> Self {
        self.align_content = align;
        self
    }

    pub fn with_gaps(mut self, row_gap: LengthSpec, column_gap: LengthSpec) -> Self {
        self.row_gap = row_gap;
        self.column_gap = column_gap;
        self
    }

    pub fn push(&mut self, item: FlexItem) {
        self.items.push(item);
    }

    pub fn with_item(mut self, item: FlexItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn items(&self) -> &[FlexItem] {
        &self.items
    }

    fn is_row(&self) -> bool {
        matches!(self.direction, FlexDirection::Row | FlexDirection::RowReverse)
    }

    fn main_reverse(&self) -> bool {
        matches!(
            self.direction,
            FlexDirection::RowReverse | FlexDirection::ColumnReverse
        )
    }

    fn cross_reverse(&self) -> bool {
        self.wrap == FlexWrap::WrapReverse
    }

    /// Lays out the items inside a content box of `width` and optional definite `height`.
    pub fn layout(&self, width: Pt, height: Option<Pt>, fonts: FontContext) -> FlexLayout {
        let perf = perf_start();
        let is_row = self.is_row();
        let main_avail = if is_row { Some(width) } else { height };
        let cross_avail = if is_row { height } else { Some(width) };
        let (main_gap_spec, cross_gap_spec) = if is_row {
            (self.column_gap, self.row_gap)
        } else {
            (self.row_gap, self.column_gap)
        };
        let main_gap = main_gap_spec
            .resolve(main_avail.unwrap_or(Pt::ZERO), fonts)
            .max(Pt::ZERO);
        let cross_gap = cross_gap_spec
            .resolve(cross_avail.unwrap_or(Pt::ZERO), fonts)
            .max(Pt::ZERO);

        let mut states: Vec<ItemState> = self
            .items
            .iter()
            .map(|item| self.initial_state(item, main_avail, cross_avail, fonts))
            .collect();

        let mut lines = self.collect_lines(&states, main_avail, main_gap);

        for line in &lines {
            let line_avail = match main_avail {
                Some(avail) => avail,
                None => line
                    .items
                    .iter()
                    .map(|idx| states[*idx].hypothetical + states[*idx].margin_main)
                    .sum::<Pt>()
                    + main_gap * (line.items.len().saturating_sub(1) as i32),
            };
            resolve_flexible_lengths(&mut states, &line.items, line_avail, main_gap);
        }

        // Hypothetical cross sizes now that main sizes are known.
        for (idx, item) in self.items.iter().enumerate() {
            let state = &mut states[idx];
            if state.cross_is_auto {
                let content_cross = if is_row {
                    item.content.height_for_width(state.target)
                } else {
                    let avail = cross_avail.unwrap_or(Pt::ZERO) - state.margin_cross;
                    fit_content(item.content.as_ref(), avail)
                };
                state.cross = clamp_opt(content_cross, state.min_cross, state.max_cross);
            }
        }

        let single_line = self.wrap == FlexWrap::NoWrap;
        for line in lines.iter_mut() {
            line.cross = line
                .items
                .iter()
                .map(|idx| states[*idx].cross + states[*idx].margin_cross)
                .fold(Pt::ZERO, Pt::max);
        }
        if single_line {
            if let (Some(cross), Some(line)) = (cross_avail, lines.first_mut()) {
                line.cross = cross;
            }
        } else if let Some(cross) = cross_avail {
            if self.align_content == AlignContent::Stretch && !lines.is_empty() {
                let used = lines.iter().map(|l| l.cross).sum::<Pt>()
                    + cross_gap * (lines.len() as i32 - 1);
                let extra = cross - used;
                if extra.is_positive() {
                    // Leftover milli-points go to the first lines.
                    let count = lines.len() as i64;
                    let total = extra.to_milli_i64();
                    let (each, rem) = (total / count, total % count);
                    for (k, line) in lines.iter_mut().enumerate() {
                        let bump = if (k as i64) < rem { 1 } else { 0 };
                        line.cross += Pt::from_milli_i64(each + bump);
                    }
                }
            }
        }

        // Stretched items take the line's cross size.
        for line in &lines {
            for idx in &line.items {
                let state = &mut states[*idx];
                if state.align == AlignItems::Stretch && state.cross_is_auto {
                    state.cross = clamp_opt(
                        (line.cross - state.margin_cross).max(Pt::ZERO),
                        state.min_cross,
                        state.max_cross,
                    );
                }
            }
        }

        let lines_cross: Pt = lines.iter().map(|l| l.cross).sum::<Pt>()
            + cross_gap * (lines.len().saturating_sub(1) as i32);
        let container_cross = cross_avail.unwrap_or(lines_cross);
        let container_main = main_avail.unwrap_or_else(|| {
            lines
                .iter()
                .map(|line| {
                    line.items
                        .iter()
                        .map(|idx| states[*idx].target + states[*idx].margin_main)
                        .sum::<Pt>()
                        + main_gap * (line.items.len().saturating_sub(1) as i32)
                })
                .fold(Pt::ZERO, Pt::max)
        });

        let (mut cursor, between_lines) = if single_line {
            (Pt::ZERO, Pt::ZERO)
        } else {
            distribute(
                container_cross - lines_cross,
                lines.len(),
                match self.align_content {
                    AlignContent::FlexStart | AlignContent::Stretch => JustifyContent::FlexStart,
                    AlignContent::FlexEnd => JustifyContent::FlexEnd,
                    AlignContent::Center => JustifyContent::Center,
                    AlignContent::SpaceBetween => JustifyContent::SpaceBetween,
                    AlignContent::SpaceAround => JustifyContent::SpaceAround,
                },
            )
        };
        for line in lines.iter_mut() {
            line.cross_offset = cursor;
            cursor = cursor + line.cross + cross_gap + between_lines;
        }

        let main_reverse = self.main_reverse();
        let cross_reverse = self.cross_reverse();
        let mut out_lines: Vec<Vec<FlexItemInfo>> = Vec::with_capacity(lines.len());
        for line in &lines {
            let used: Pt = line
                .items
                .iter()
                .map(|idx| states[*idx].target + states[*idx].margin_main)
                .sum::<Pt>()
                + main_gap * (line.items.len().saturating_sub(1) as i32);
            let (start, between) =
                distribute(container_main - used, line.items.len(), self.justify);
            let mut main_cursor = start;
            let mut infos = Vec::with_capacity(line.items.len());
            for idx in &line.items {
                let state = &states[*idx];
                let outer_cross = state.cross + state.margin_cross;
                let cross_in_line = match state.align {
                    AlignItems::FlexStart | AlignItems::Stretch | AlignItems::Baseline => Pt::ZERO,
                    AlignItems::FlexEnd => line.cross - outer_cross,
                    AlignItems::Center => (line.cross - outer_cross) / 2,
                };
                let mut main_pos = main_cursor + state.margin_main_start;
                let mut cross_pos = line.cross_offset + cross_in_line + state.margin_cross_start;
                if main_reverse {
                    main_pos = container_main - main_pos - state.target;
                }
                if cross_reverse {
                    cross_pos = container_cross - cross_pos - state.cross;
                }
                let rect = if is_row {
                    Rect {
                        x: main_pos,
                        y: cross_pos,
                        width: state.target,
                        height: state.cross,
                    }
                } else {
                    Rect {
                        x: cross_pos,
                        y: main_pos,
                        width: state.cross,
                        height: state.target,
                    }
                };
                infos.push(FlexItemInfo { index: *idx, rect });
                main_cursor = main_cursor + state.target + state.margin_main + main_gap + between;
            }
            out_lines.push(infos);
        }

        let size = if is_row {
            Size {
                width: container_main,
                height: container_cross,
            }
        } else {
            Size {
                width: container_cross,
                height: container_main,
            }
        };
        log_perf_counts(
            "layout.flex.counts",
            &[
                ("items", self.items.len() as u64),
                ("lines", out_lines.len() as u64),
            ],
        );
        perf_end("layout.flex", perf);
        FlexLayout {
            lines: out_lines,
            size,
        }
    }

    fn initial_state(
        &self,
        item: &FlexItem,
        main_avail: Option<Pt>,
        cross_avail: Option<Pt>,
        fonts: FontContext,
    ) -> ItemState {
        let is_row = self.is_row();
        let m = item.margins;
        // Start margins sit on the flow-start edge, which reverse axes move.
        let (main_start, main_end, cross_start, cross_end) = if is_row {
            (m.left, m.right, m.top, m.bottom)
        } else {
            (m.top, m.bottom, m.left, m.right)
        };
        let margin_main_start = if self.main_reverse() { main_end } else { main_start };
        let margin_cross_start = if self.cross_reverse() { cross_end } else { cross_start };
        let margin_main = main_start + main_end;
        let margin_cross = cross_start + cross_end;
        let (main_spec, min_main_spec, max_main_spec, cross_spec, min_cross_spec, max_cross_spec) =
            if is_row {
                (
                    item.width,
                    item.min_width,
                    item.max_width,
                    item.height,
                    item.min_height,
                    item.max_height,
                )
            } else {
                (
                    item.height,
                    item.min_height,
                    item.max_height,
                    item.width,
                    item.min_width,
                    item.max_width,
                )
            };

        let definite_main = main_spec.resolve_definite(main_avail, fonts);
        let definite_cross = cross_spec.resolve_definite(cross_avail, fonts);
        let min_cross = min_cross_spec
            .resolve_definite(cross_avail, fonts)
            .unwrap_or(Pt::ZERO)
            .max(Pt::ZERO);
        let max_cross = max_cross_spec.resolve_definite(cross_avail, fonts);
        let max_main = max_main_spec.resolve_definite(main_avail, fonts);

        // Cross size used to measure column content before flexing.
        let measure_cross = definite_cross.unwrap_or_else(|| {
            let avail = cross_avail.unwrap_or(Pt::ZERO) - margin_cross;
            fit_content(item.content.as_ref(), avail)
        });
        let content_main = if is_row {
            item.content.max_content_width()
        } else {
            item.content.height_for_width(measure_cross)
        };
        let content_min_main = if is_row {
            item.content.min_content_width()
        } else {
            content_main
        };

        let base = match item.basis {
            FlexBasis::Length(spec) => spec
                .resolve_definite(main_avail, fonts)
                .or(definite_main)
                .unwrap_or(content_main),
            FlexBasis::Auto => definite_main.unwrap_or(content_main),
            FlexBasis::Content => content_main,
        }
        .max(Pt::ZERO);

        let min_main = match min_main_spec.resolve_definite(main_avail, fonts) {
            Some(value) => value,
            None if min_main_spec.is_auto() => {
                let suggestion = match definite_main {
                    Some(specified) => content_min_main.min(specified),
                    None => content_min_main,
                };
                match max_main {
                    Some(max) => suggestion.min(max),
                    None => suggestion,
                }
            }
            None => Pt::ZERO,
        }
        .max(Pt::ZERO);

        let hypothetical = clamp_opt(base, min_main, max_main);
        let align = match item.align_self {
            AlignSelf::Auto => self.align_items,
            AlignSelf::Align(align) => align,
        };
        ItemState {
            base,
            hypothetical,
            min_main,
            max_main,
            margin_main,
            margin_main_start,
            margin_cross,
            margin_cross_start,
            target: hypothetical,
            frozen: false,
            cross: definite_cross
                .map(|c| clamp_opt(c, min_cross, max_cross))
                .unwrap_or(Pt::ZERO),
            cross_is_auto: definite_cross.is_none(),
            min_cross,
            max_cross,
            align,
            grow: item.grow,
            shrink: item.shrink,
        }
    }

    fn collect_lines(
        &self,
        states: &[ItemState],
        main_avail: Option<Pt>,
        main_gap: Pt,
    ) -> Vec<FlexLine> {
        let new_line = |items: Vec<usize>| FlexLine {
            items,
            cross: Pt::ZERO,
            cross_offset: Pt::ZERO,
        };
        let limit = match (self.wrap, main_avail) {
            (FlexWrap::NoWrap, _) | (_, None) => {
                return vec![new_line((0..states.len()).collect())];
            }
            (_, Some(avail)) => avail,
        };
        let mut lines = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut used = Pt::ZERO;
        for (idx, state) in states.iter().enumerate() {
            let outer = state.hypothetical + state.margin_main;
            let next = if current.is_empty() {
                outer
            } else {
                used + main_gap + outer
            };
            if !current.is_empty() && next > limit {
                lines.push(new_line(std::mem::take(&mut current)));
                used = outer;
            } else {
                used = next;
            }
            current.push(idx);
        }
        if !current.is_empty() || lines.is_empty() {
            lines.push(new_line(current));
        }
        lines
    }
}

fn clamp_opt(value: Pt, min: Pt, max: Option<Pt>) -> Pt {
    match max {
        Some(max) => value.clamp_to(min, max),
        None => value.max(min),
    }
}

fn fit_content(content: &dyn Measure, avail: Pt) -> Pt {
    let avail = avail.max(Pt::ZERO);
    content
        .max_content_width()
        .min(avail.max(content.min_content_width()))
}

/// CSS §9.7: resolves `target` for the items of one line.
fn resolve_flexible_lengths(states: &mut [ItemState], line: &[usize], avail: Pt, gap: Pt) {
    if line.is_empty() {
        return;
    }
    let inner_avail = avail
        - line.iter().map(|idx| states[*idx].margin_main).sum::<Pt>()
        - gap * (line.len() as i32 - 1);
    let sum_hypothetical: Pt = line.iter().map(|idx| states[*idx].hypothetical).sum();
    let growing = sum_hypothetical < inner_avail;

    for idx in line {
        let state = &mut states[*idx];
        let factor = if growing { state.grow } else { state.shrink };
        state.target = state.hypothetical;
        state.frozen = factor <= 0.0
            || (growing && state.base > state.hypothetical)
            || (!growing && state.base < state.hypothetical);
    }

    let free_space = |states: &[ItemState]| {
        let used: Pt = line
            .iter()
            .map(|idx| {
                let s = &states[*idx];
                if s.frozen { s.target } else { s.base }
            })
            .sum();
        inner_avail - used
    };
    let initial_free = free_space(states);

    // Each pass freezes at least one item, so this terminates.
    for _ in 0..=line.len() {
        if line.iter().all(|idx| states[*idx].frozen) {
            break;
        }
        let mut remaining = free_space(states);
        let factor_sum: f32 = line
            .iter()
            .filter(|idx| !states[**idx].frozen)
            .map(|idx| {
                if growing {
                    states[*idx].grow
                } else {
                    states[*idx].shrink
                }
            })
            .sum();
        if growing && factor_sum < 1.0 {
            let scaled = initial_free * factor_sum;
            if scaled.abs() < remaining.abs() {
                remaining = scaled;
            }
        }

        if growing {
            for idx in line {
                let s = &mut states[*idx];
                if s.frozen {
                    continue;
                }
                let share = if factor_sum > 0.0 {
                    remaining * (s.grow / factor_sum)
                } else {
                    Pt::ZERO
                };
                s.target = s.base + share;
            }
        } else {
            let scaled_sum: f32 = line
                .iter()
                .filter(|idx| !states[**idx].frozen)
                .map(|idx| states[*idx].shrink * states[*idx].base.to_f32())
                .sum();
            for idx in line {
                let s = &mut states[*idx];
                if s.frozen {
                    continue;
                }
                let scaled = s.shrink * s.base.to_f32();
                let share = if scaled_sum > 0.0 {
                    remaining.abs() * (scaled / scaled_sum)
                } else {
                    Pt::ZERO
                };
                s.target = s.base - share;
            }
        }

        let mut total_violation = Pt::ZERO;
        let mut violations: Vec<(usize, Pt)> = Vec::new();
        for idx in line {
            let s = &states[*idx];
            if s.frozen {
                continue;
            }
            let clamped = clamp_opt(s.target, s.min_main, s.max_main).max(Pt::ZERO);
            let delta = clamped - s.target;
            total_violation += delta;
            violations.push((*idx, delta));
        }
        let total = total_violation.to_milli_i64();
        for (idx, delta) in violations {
            let s = &mut states[idx];
            let d = delta.to_milli_i64();
            if total == 0 || (total > 0 && d > 0) || (total < 0 && d < 0) {
                s.target += delta;
                s.frozen = true;
            }
        }
    }
}

/// Leading offset and extra spacing between `count` items sharing `free` space.
fn distribute(free: Pt, count: usize, justify: JustifyContent) -> (Pt, Pt) {
    if count == 0 {
        return (Pt::ZERO, Pt::ZERO);
    }
    let positive = free.is_positive();
    match justify {
        JustifyContent::FlexStart => (Pt::ZERO, Pt::ZERO),
        JustifyContent::FlexEnd => (free, Pt::ZERO),
        JustifyContent::Center => (free / 2, Pt::ZERO),
        JustifyContent::SpaceBetween => {
            if positive && count > 1 {
                (Pt::ZERO, free / (count as i32 - 1))
            } else {
                (Pt::ZERO, Pt::ZERO)
            }
        }
        JustifyContent::SpaceAround => {
            if positive {
                let per = free / (count as i32);
                (per / 2, per)
            } else {
                (free / 2, Pt::ZERO)
            }
        }
        JustifyContent::SpaceEvenly => {
            if positive {
                let per = free / (count as i32 + 1);
                (per, per)
            } else {
                (free / 2, Pt::ZERO)
            }
        }
    }
}
