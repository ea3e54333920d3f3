use rayon::prelude::*;

use crate::LayoutEngine;
use crate::debug::{DebugLogger, log_event};
use crate::error::DocflowError;
use crate::measure::Measure;
use crate::perf::{log_perf_counts, perf_end, perf_start};
use crate::types::Pt;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

fn table_debug_enabled() -> bool {
    static ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
    *ENABLED.get_or_init(|| env_flag("DOCFLOW_TABLE_DEBUG"))
}

fn table_debug_verbose_enabled() -> bool {
    static ENABLED: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
    *ENABLED.get_or_init(|| env_flag("DOCFLOW_TABLE_DEBUG_VERBOSE"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnWidth {
    Auto,
    Points(Pt),
    /// 0..=100
    Percent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayoutMode {
    Auto,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableWidth {
    Auto,
    Points(Pt),
    /// Percent of the available width, 0..=100.
    Percent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableCellSpec {
    pub row_span: usize,
    pub col_span: usize,
    pub width: ColumnWidth,
    /// Min-content width of the cell, padding included.
    pub min_width: Pt,
    /// Max-content width of the cell, padding included.
    pub max_width: Pt,
}

impl TableCellSpec {
    pub fn new(min_width: f32, max_width: f32) -> Self {
        Self {
            row_span: 1,
            col_span: 1,
            width: ColumnWidth::Auto,
            min_width: Pt::from_f32(min_width),
            max_width: Pt::from_f32(max_width),
        }
    }

    pub fn from_content(content: &dyn Measure) -> Self {
        Self {
            row_span: 1,
            col_span: 1,
            width: ColumnWidth::Auto,
            min_width: content.min_content_width(),
            max_width: content.max_content_width(),
        }
    }

    pub fn with_spans(mut self, row_span: usize, col_span: usize) -> Self {
        self.row_span = row_span;
        self.col_span = col_span;
        self
    }

    pub fn with_width(mut self, width: ColumnWidth) -> Self {
        self.width = width;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub columns: usize,
    /// Per-column widths (`<col>` style); shorter than `columns` means auto.
    pub column_widths: Vec<ColumnWidth>,
    pub rows: Vec<Vec<TableCellSpec>>,
    pub width: TableWidth,
    pub layout: TableLayoutMode,
}

impl TableSpec {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            column_widths: Vec::new(),
            rows: Vec::new(),
            width: TableWidth::Auto,
            layout: TableLayoutMode::Auto,
        }
    }

    pub fn with_row(mut self, row: Vec<TableCellSpec>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn with_column_widths(mut self, widths: Vec<ColumnWidth>) -> Self {
        self.column_widths = widths;
        self
    }

    pub fn with_width(mut self, width: TableWidth) -> Self {
        self.width = width;
        self
    }

    pub fn with_layout(mut self, layout: TableLayoutMode) -> Self {
        self.layout = layout;
        self
    }

    fn column_width(&self, col: usize) -> ColumnWidth {
        self.column_widths.get(col).copied().unwrap_or(ColumnWidth::Auto)
    }
}

/// Where a cell landed: `rows[row][index]` occupies `col..col + col_span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    pub row: usize,
    pub index: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableWidthsResult {
    pub columns: Vec<Pt>,
    pub table_width: Pt,
    /// Column minimums did not fit the target width.
    pub overflow: bool,
}

fn validate(spec: &TableSpec) -> Result<(), DocflowError> {
    if spec.columns == 0 {
        return Err(DocflowError::InvalidTable("table has no columns".to_string()));
    }
    for (r, row) in spec.rows.iter().enumerate() {
        for (i, cell) in row.iter().enumerate() {
            if cell.col_span == 0 || cell.row_span == 0 {
                return Err(DocflowError::InvalidTable(format!(
                    "cell {i} in row {r} has a zero span"
                )));
            }
        }
    }
    Ok(())
}

/// Assigns each cell its starting column, skipping slots held by rowspans
/// from earlier rows.
pub fn place_cells(spec: &TableSpec) -> Result<Vec<CellInfo>, DocflowError> {
    place_cells_logged(spec, None)
}

fn place_cells_logged(
    spec: &TableSpec,
    debug: Option<&DebugLogger>,
) -> Result<Vec<CellInfo>, DocflowError> {
    validate(spec)?;
    let columns = spec.columns;
    let row_count = spec.rows.len();
    // Rows still covered per column, current row included.
    let mut covered = vec![0usize; columns];
    let mut out = Vec::new();
    for (r, row) in spec.rows.iter().enumerate() {
        let mut cursor = 0usize;
        for (index, cell) in row.iter().enumerate() {
            while cursor < columns && covered[cursor] > 0 {
                cursor += 1;
            }
            if cursor >= columns {
                log_event(
                    debug,
                    "debug.table.cell_dropped",
                    &[("row", r.to_string()), ("cell", index.to_string())],
                );
                continue;
            }
            let col_span = cell.col_span.min(columns - cursor);
            let row_span = cell.row_span.min(row_count - r);
            for slot in &mut covered[cursor..cursor + col_span] {
                *slot = (*slot).max(row_span);
            }
            out.push(CellInfo {
                row: r,
                index,
                col: cursor,
                row_span,
                col_span,
            });
            cursor += col_span;
        }
        for slot in covered.iter_mut() {
            *slot = slot.saturating_sub(1);
        }
    }
    Ok(out)
}

/// Computes column widths for `spec` laid out in `avail_width`.
pub fn compute(
    spec: &TableSpec,
    avail_width: Pt,
    engine: &LayoutEngine,
) -> Result<TableWidthsResult, DocflowError> {
    compute_with(
        spec,
        avail_width,
        engine.parallel_row_threshold(),
        engine.debug(),
    )
}

pub(crate) fn compute_with(
    spec: &TableSpec,
    avail_width: Pt,
    parallel_row_threshold: usize,
    debug: Option<&DebugLogger>,
) -> Result<TableWidthsResult, DocflowError> {
    let perf = perf_start();
    let cells = place_cells_logged(spec, debug)?;
    let avail = avail_width.to_milli_i64().max(0);
    let result = match spec.layout {
        TableLayoutMode::Fixed => fixed_layout(spec, &cells, avail),
        TableLayoutMode::Auto => auto_layout(spec, &cells, avail, parallel_row_threshold, debug),
    };
    log_perf_counts(
        "layout.table.counts",
        &[
            ("rows", spec.rows.len() as u64),
            ("columns", spec.columns as u64),
            ("cells", cells.len() as u64),
        ],
    );
    perf_end("layout.table.widths", perf);
    Ok(result)
}

fn percent_of(total: i64, percent: f32) -> i64 {
    ((total as f64) * (percent as f64) / 100.0).round() as i64
}

fn resolve_table_width(width: TableWidth, avail: i64) -> Option<i64> {
    match width {
        TableWidth::Auto => None,
        TableWidth::Points(v) => Some(v.to_milli_i64().max(0)),
        TableWidth::Percent(p) => Some(percent_of(avail, p.max(0.0))),
    }
}

fn fixed_layout(spec: &TableSpec, cells: &[CellInfo], avail: i64) -> TableWidthsResult {
    let columns = spec.columns;
    let target = resolve_table_width(spec.width, avail).unwrap_or(avail);
    let mut widths: Vec<Option<i64>> = (0..columns)
        .map(|c| match spec.column_width(c) {
            ColumnWidth::Auto => None,
            ColumnWidth::Points(v) => Some(v.to_milli_i64().max(0)),
            ColumnWidth::Percent(p) => Some(percent_of(target, p.max(0.0))),
        })
        .collect();
    for info in cells.iter().filter(|i| i.row == 0 && i.col_span == 1) {
        if widths[info.col].is_some() {
            continue;
        }
        widths[info.col] = match spec.rows[0][info.index].width {
            ColumnWidth::Auto => None,
            ColumnWidth::Points(v) => Some(v.to_milli_i64().max(0)),
            ColumnWidth::Percent(p) => Some(percent_of(target, p.max(0.0))),
        };
    }
    let specified: i64 = widths.iter().flatten().sum();
    let open: Vec<usize> = (0..columns).filter(|c| widths[*c].is_none()).collect();
    let remaining = (target - specified).max(0);
    let mut out: Vec<i64> = widths.iter().map(|w| w.unwrap_or(0)).collect();
    if open.is_empty() {
        if remaining > 0 {
            let all: Vec<usize> = (0..columns).collect();
            add_shares(&mut out, &all, &vec![1; columns], remaining);
        }
    } else {
        add_shares(&mut out, &open, &vec![1; open.len()], remaining);
    }
    let total: i64 = out.iter().sum();
    TableWidthsResult {
        columns: out.into_iter().map(Pt::from_milli_i64).collect(),
        table_width: Pt::from_milli_i64(total),
        overflow: total > avail,
    }
}

#[derive(Debug, Clone)]
struct ColumnAccum {
    min: Vec<i64>,
    max: Vec<i64>,
    fixed: Vec<Option<i64>>,
    percent: Vec<Option<f32>>,
}

impl ColumnAccum {
    fn new(columns: usize) -> Self {
        Self {
            min: vec![0; columns],
            max: vec![0; columns],
            fixed: vec![None; columns],
            percent: vec![None; columns],
        }
    }

    fn add_cell(&mut self, col: usize, cell: &TableCellSpec) {
        let min = cell.min_width.to_milli_i64().max(0);
        let max = cell.max_width.to_milli_i64().max(min);
        self.min[col] = self.min[col].max(min);
        self.max[col] = self.max[col].max(max);
        match cell.width {
            ColumnWidth::Auto => {}
            ColumnWidth::Points(v) => {
                let v = v.to_milli_i64().max(0);
                self.fixed[col] = Some(self.fixed[col].map_or(v, |f| f.max(v)));
            }
            ColumnWidth::Percent(p) => {
                let p = p.clamp(0.0, 100.0);
                self.percent[col] = Some(self.percent[col].map_or(p, |f| f.max(p)));
            }
        }
    }

    fn merge(mut self, other: ColumnAccum) -> ColumnAccum {
        for i in 0..self.min.len() {
            self.min[i] = self.min[i].max(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
            self.fixed[i] = match (self.fixed[i], other.fixed[i]) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            self.percent[i] = match (self.percent[i], other.percent[i]) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        self
    }
}

fn ensure_span_requirement(out: &mut [i64], start: usize, span: usize, required: i64) {
    if required <= 0 || start >= out.len() {
        return;
    }
    let end = start.saturating_add(span).min(out.len());
    if start >= end {
        return;
    }
    if end - start == 1 {
        if required > out[start] {
            out[start] = required;
        }
        return;
    }

    let current: i64 = out[start..end].iter().sum();
    if current >= required {
        return;
    }
    let mut deficit = required - current;
    let slots = (end - start) as i64;
    let base = deficit / slots;
    if base > 0 {
        for value in out[start..end].iter_mut() {
            *value += base;
        }
        deficit -= base * slots;
    }
    let mut idx = start;
    while deficit > 0 {
        out[idx] += 1;
        deficit -= 1;
        idx += 1;
        if idx >= end {
            idx = start;
        }
    }
}

/// Adds `amount` to `targets` in proportion to `weights` (even split when all
/// weights are zero); rounding leftovers go to the leftmost targets.
fn add_shares(out: &mut [i64], targets: &[usize], weights: &[i64], amount: i64) {
    if targets.is_empty() || amount <= 0 {
        return;
    }
    let total: i64 = weights.iter().sum();
    let even = total <= 0;
    let total = if even { targets.len() as i64 } else { total };
    let mut used = 0i64;
    for (k, col) in targets.iter().enumerate() {
        let w = if even { 1 } else { weights[k] };
        let add = (amount as i128 * w as i128 / total as i128) as i64;
        out[*col] += add;
        used += add;
    }
    let mut rem = amount - used;
    let mut k = 0usize;
    while rem > 0 {
        if even || weights[k % targets.len()] > 0 {
            out[targets[k % targets.len()]] += 1;
            rem -= 1;
        }
        k += 1;
    }
}

/// Takes up to `amount` from `targets`, each giving at most its `room`,
/// in proportion to room. Returns what was taken.
fn take_shares(out: &mut [i64], targets: &[usize], room: &[i64], amount: i64) -> i64 {
    let total: i64 = room.iter().sum();
    if targets.is_empty() || amount <= 0 || total <= 0 {
        return 0;
    }
    let amount = amount.min(total);
    let mut taken = vec![0i64; targets.len()];
    for (k, r) in room.iter().enumerate() {
        taken[k] = (amount as i128 * *r as i128 / total as i128) as i64;
    }
    let mut rem = amount - taken.iter().sum::<i64>();
    let mut k = 0usize;
    while rem > 0 {
        let i = k % targets.len();
        if taken[i] < room[i] {
            taken[i] += 1;
            rem -= 1;
        }
        k += 1;
    }
    for (k, col) in targets.iter().enumerate() {
        out[*col] -= taken[k];
    }
    amount
}

fn auto_layout(
    spec: &TableSpec,
    cells: &[CellInfo],
    avail: i64,
    parallel_row_threshold: usize,
    debug: Option<&DebugLogger>,
) -> TableWidthsResult {
    let columns = spec.columns;
    let debug_verbose = table_debug_enabled() && table_debug_verbose_enabled();
    if debug_verbose {
        eprintln!(
            "[table.debug.widths.begin] columns={} rows={} avail_milli={}",
            columns,
            spec.rows.len(),
            avail
        );
    }

    let mut by_row: Vec<Vec<&CellInfo>> = vec![Vec::new(); spec.rows.len()];
    for info in cells {
        by_row[info.row].push(info);
    }
    let update_row = |mut acc: ColumnAccum, row: &Vec<&CellInfo>| {
        for info in row.iter().filter(|i| i.col_span == 1) {
            acc.add_cell(info.col, &spec.rows[info.row][info.index]);
        }
        acc
    };
    let mut acc = if spec.rows.len() >= parallel_row_threshold && !debug_verbose {
        by_row
            .par_iter()
            .fold(|| ColumnAccum::new(columns), update_row)
            .reduce(|| ColumnAccum::new(columns), ColumnAccum::merge)
    } else {
        by_row.iter().fold(ColumnAccum::new(columns), update_row)
    };

    for c in 0..columns {
        match spec.column_width(c) {
            ColumnWidth::Auto => {}
            ColumnWidth::Points(v) => {
                let v = v.to_milli_i64().max(0);
                acc.fixed[c] = Some(acc.fixed[c].map_or(v, |f| f.max(v)));
            }
            ColumnWidth::Percent(p) => {
                let p = p.clamp(0.0, 100.0);
                acc.percent[c] = Some(acc.percent[c].map_or(p, |f| f.max(p)));
            }
        }
    }

    let mut spanning: Vec<&CellInfo> = cells.iter().filter(|i| i.col_span > 1).collect();
    spanning.sort_by_key(|i| i.col_span);
    for info in &spanning {
        let cell = &spec.rows[info.row][info.index];
        let min = cell.min_width.to_milli_i64().max(0);
        let max = cell.max_width.to_milli_i64().max(min);
        ensure_span_requirement(&mut acc.min, info.col, info.col_span, min);
        ensure_span_requirement(&mut acc.max, info.col, info.col_span, max);
        if let ColumnWidth::Points(v) = cell.width {
            ensure_span_requirement(&mut acc.max, info.col, info.col_span, v.to_milli_i64());
        }
        if debug_verbose {
            eprintln!(
                "[table.debug.widths.cell] row={} cell={} col_start={} span={} min_milli={} max_milli={}",
                info.row, info.index, info.col, info.col_span, min, max
            );
        }
    }
    for info in &spanning {
        let ColumnWidth::Percent(p) = spec.rows[info.row][info.index].width else {
            continue;
        };
        let range = info.col..info.col + info.col_span;
        let assigned: f32 = range.clone().filter_map(|c| acc.percent[c]).sum();
        let residual = p.clamp(0.0, 100.0) - assigned;
        if residual <= 0.0 {
            continue;
        }
        let open: Vec<usize> = range.filter(|c| acc.percent[*c].is_none()).collect();
        let weight: i64 = open.iter().map(|c| acc.max[*c]).sum();
        for c in &open {
            let share = if weight > 0 {
                residual * (acc.max[*c] as f32 / weight as f32)
            } else {
                residual / open.len() as f32
            };
            acc.percent[*c] = Some(share);
        }
    }

    let mut percent_sum = 0.0f32;
    for c in 0..columns {
        let Some(p) = acc.percent[c] else {
            continue;
        };
        if percent_sum + p > 100.0 {
            let kept = (100.0 - percent_sum).max(0.0);
            log_event(
                debug,
                "debug.table.percent_truncated",
                &[
                    ("column", c.to_string()),
                    ("percent", format!("{p:.3}")),
                    ("kept", format!("{kept:.3}")),
                ],
            );
            acc.percent[c] = Some(kept);
            percent_sum = 100.0;
        } else {
            percent_sum += p;
        }
    }

    for c in 0..columns {
        if let Some(f) = acc.fixed[c] {
            acc.max[c] = acc.max[c].max(f);
        }
        acc.max[c] = acc.max[c].max(acc.min[c]);
    }

    let total_min: i64 = acc.min.iter().sum();
    let target = match resolve_table_width(spec.width, avail) {
        Some(explicit) => explicit,
        None => preferred_width(&acc, avail).min(avail),
    };

    let mut widths = vec![0i64; columns];
    let mut overflow = false;
    if total_min >= target {
        widths.copy_from_slice(&acc.min);
        if total_min > target {
            overflow = true;
            log_event(
                debug,
                "debug.table.overflow",
                &[
                    ("min_total_milli", total_min.to_string()),
                    ("target_milli", target.to_string()),
                ],
            );
        }
    } else {
        let is_auto = |c: usize| acc.percent[c].is_none() && acc.fixed[c].is_none();
        for c in 0..columns {
            widths[c] = match (acc.percent[c], acc.fixed[c]) {
                (Some(p), _) => acc.min[c].max(percent_of(target, p)),
                (None, Some(f)) => acc.min[c].max(f),
                (None, None) => acc.max[c],
            };
        }
        let sum: i64 = widths.iter().sum();
        if sum < target {
            let autos: Vec<usize> = (0..columns).filter(|c| is_auto(*c)).collect();
            if autos.is_empty() {
                let all: Vec<usize> = (0..columns).collect();
                let weights = widths.clone();
                add_shares(&mut widths, &all, &weights, target - sum);
            } else {
                let weights: Vec<i64> = autos.iter().map(|c| acc.max[*c]).collect();
                add_shares(&mut widths, &autos, &weights, target - sum);
            }
        } else if sum > target {
            let mut deficit = sum - target;
            // Auto columns give way first, then fixed, then percent.
            let rank = |c: usize| {
                if is_auto(c) {
                    0
                } else if acc.percent[c].is_none() {
                    1
                } else {
                    2
                }
            };
            for group in 0..3 {
                if deficit <= 0 {
                    break;
                }
                let targets: Vec<usize> = (0..columns).filter(|c| rank(*c) == group).collect();
                let room: Vec<i64> = targets
                    .iter()
                    .map(|c| (widths[*c] - acc.min[*c]).max(0))
                    .collect();
                deficit -= take_shares(&mut widths, &targets, &room, deficit);
            }
        }
    }

    if debug_verbose {
        eprintln!(
            "[table.debug.widths.end] avail_milli={} target_milli={} total_min={} min={:?} max={:?} fixed={:?} percent={:?} out={:?}",
            avail, target, total_min, acc.min, acc.max, acc.fixed, acc.percent, widths
        );
    } else if table_debug_enabled() {
        eprintln!(
            "[table.debug.widths] columns={} target_milli={} overflow={} out={:?}",
            columns, target, overflow, widths
        );
    }

    let total: i64 = widths.iter().sum();
    TableWidthsResult {
        columns: widths.into_iter().map(Pt::from_milli_i64).collect(),
        table_width: Pt::from_milli_i64(total),
        overflow,
    }
}

/// Width the table would take with unlimited space.
fn preferred_width(acc: &ColumnAccum, avail: i64) -> i64 {
    let columns = acc.min.len();
    let mut non_percent = 0i64;
    let mut percent_cols = 0i64;
    let mut total_percent = 0.0f64;
    let mut preferred = 0i64;
    for c in 0..columns {
        match acc.percent[c] {
            Some(p) => {
                percent_cols += acc.max[c];
                total_percent += p as f64;
                if p > 0.0 {
                    preferred = preferred.max((acc.max[c] as f64 * 100.0 / p as f64).ceil() as i64);
                }
            }
            None => {
                non_percent += match acc.fixed[c] {
                    Some(f) => acc.min[c].max(f),
                    None => acc.max[c],
                };
            }
        }
    }
    preferred = preferred.max(non_percent + percent_cols);
    if total_percent > 0.0 {
        if total_percent < 100.0 {
            let scaled = (non_percent as f64 * 100.0 / (100.0 - total_percent)).ceil() as i64;
            preferred = preferred.max(scaled);
        } else if non_percent > 0 {
            preferred = preferred.max(avail);
        }
    }
    preferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn cell(min: f32, max: f32) -> TableCellSpec {
        TableCellSpec::new(min, max)
    }

    fn widths(spec: &TableSpec, avail: f32) -> TableWidthsResult {
        compute_with(spec, Pt::from_f32(avail), 64, None).expect("widths")
    }

    fn pts(values: &[f32]) -> Vec<Pt> {
        values.iter().map(|v| Pt::from_f32(*v)).collect()
    }

    #[test]
    fn rowspan_slots_are_skipped() {
        let spec = TableSpec::new(3)
            .with_row(vec![cell(0.0, 0.0).with_spans(2, 1), cell(0.0, 0.0), cell(0.0, 0.0)])
            .with_row(vec![cell(0.0, 0.0), cell(0.0, 0.0)]);
        let placed = place_cells(&spec).expect("placement");
        let second: Vec<usize> = placed.iter().filter(|c| c.row == 1).map(|c| c.col).collect();
        assert_eq!(second, vec![1, 2]);
        assert_eq!(placed[0].row_span, 2);
    }

    #[test]
    fn spans_are_truncated_at_table_edges() {
        let spec = TableSpec::new(2).with_row(vec![cell(0.0, 0.0).with_spans(5, 3)]);
        let placed = place_cells(&spec).expect("placement");
        assert_eq!(placed[0].col_span, 2);
        assert_eq!(placed[0].row_span, 1);
    }

    #[test]
    fn invalid_tables_are_rejected() {
        assert!(matches!(
            place_cells(&TableSpec::new(0)),
            Err(DocflowError::InvalidTable(_))
        ));
        let zero_span = TableSpec::new(2).with_row(vec![cell(0.0, 0.0).with_spans(1, 0)]);
        assert!(matches!(
            place_cells(&zero_span),
            Err(DocflowError::InvalidTable(_))
        ));
    }

    #[test]
    fn auto_table_takes_preferred_width_when_it_fits() {
        let spec = TableSpec::new(2).with_row(vec![cell(10.0, 50.0), cell(10.0, 100.0)]);
        let result = widths(&spec, 300.0);
        assert_eq!(result.columns, pts(&[50.0, 100.0]));
        assert_eq!(result.table_width, Pt::from_i32(150));
        assert!(!result.overflow);
    }

    #[test]
    fn narrow_table_shrinks_in_proportion_to_flexibility() {
        let spec = TableSpec::new(2).with_row(vec![cell(10.0, 50.0), cell(10.0, 100.0)]);
        let result = widths(&spec, 100.0);
        assert_eq!(result.columns, pts(&[34.615, 65.385]));
        assert_eq!(result.table_width, Pt::from_i32(100));
    }

    #[test]
    fn minimums_that_do_not_fit_overflow() {
        let spec = TableSpec::new(2).with_row(vec![cell(80.0, 90.0), cell(80.0, 90.0)]);
        let result = widths(&spec, 100.0);
        assert_eq!(result.columns, pts(&[80.0, 80.0]));
        assert_eq!(result.table_width, Pt::from_i32(160));
        assert!(result.overflow);
    }

    #[test]
    fn percent_column_and_surplus_to_auto() {
        let spec = TableSpec::new(2)
            .with_column_widths(vec![ColumnWidth::Percent(25.0)])
            .with_row(vec![cell(0.0, 10.0), cell(0.0, 10.0)])
            .with_width(TableWidth::Points(Pt::from_i32(400)));
        let result = widths(&spec, 500.0);
        assert_eq!(result.columns, pts(&[100.0, 300.0]));
    }

    #[test]
    fn percents_over_one_hundred_are_truncated_and_logged() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "docflow_table_{}_{}.jsonl",
            std::process::id(),
            nanos
        ));
        let logger = DebugLogger::new(&path).expect("debug log");
        let spec = TableSpec::new(2)
            .with_column_widths(vec![ColumnWidth::Percent(60.0), ColumnWidth::Percent(60.0)])
            .with_width(TableWidth::Points(Pt::from_i32(200)));
        let result =
            compute_with(&spec, Pt::from_i32(300), 64, Some(&logger)).expect("widths");
        assert_eq!(result.columns, pts(&[120.0, 80.0]));
        logger.flush();
        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(text.contains("debug.table.percent_truncated"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn fixed_column_keeps_width_while_auto_shrinks() {
        let spec = TableSpec::new(2)
            .with_column_widths(vec![ColumnWidth::Points(Pt::from_i32(50))])
            .with_row(vec![cell(0.0, 0.0), cell(20.0, 200.0)]);
        let result = widths(&spec, 150.0);
        assert_eq!(result.columns, pts(&[50.0, 100.0]));
    }

    #[test]
    fn spanning_cell_raises_spanned_columns() {
        let spec = TableSpec::new(2)
            .with_row(vec![cell(100.0, 100.0).with_spans(1, 2)])
            .with_row(vec![cell(10.0, 10.0), cell(10.0, 30.0)]);
        let result = widths(&spec, 500.0);
        assert_eq!(result.columns, pts(&[50.0, 60.0]));
    }

    #[test]
    fn spanning_percent_residual_goes_to_open_columns_by_max_width() {
        let table = |rest: Vec<TableCellSpec>| {
            TableSpec::new(3)
                .with_column_widths(vec![ColumnWidth::Percent(20.0)])
                .with_row(vec![
                    cell(0.0, 0.0)
                        .with_spans(1, 3)
                        .with_width(ColumnWidth::Percent(100.0)),
                ])
                .with_row(rest)
                .with_width(TableWidth::Points(Pt::from_i32(400)))
        };
        // 80% left over, split 1:3 by the open columns' max widths.
        let weighted = table(vec![cell(0.0, 10.0), cell(0.0, 10.0), cell(0.0, 30.0)]);
        assert_eq!(widths(&weighted, 500.0).columns, pts(&[80.0, 80.0, 240.0]));

        // Without max widths the residual is split evenly.
        let even = table(vec![cell(0.0, 0.0), cell(0.0, 0.0), cell(0.0, 0.0)]);
        assert_eq!(widths(&even, 500.0).columns, pts(&[80.0, 160.0, 160.0]));
    }

    #[test]
    fn fixed_layout_uses_first_row_and_splits_rest() {
        let spec = TableSpec::new(3)
            .with_layout(TableLayoutMode::Fixed)
            .with_column_widths(vec![ColumnWidth::Points(Pt::from_i32(100))])
            .with_row(vec![
                cell(0.0, 0.0),
                cell(0.0, 0.0).with_width(ColumnWidth::Percent(25.0)),
                cell(500.0, 500.0),
            ])
            .with_width(TableWidth::Points(Pt::from_i32(400)));
        let result = widths(&spec, 400.0);
        assert_eq!(result.columns, pts(&[100.0, 100.0, 200.0]));
    }

    #[test]
    fn remainders_go_to_leftmost_columns() {
        let spec = TableSpec::new(3).with_width(TableWidth::Points(Pt::from_i32(100)));
        let result = widths(&spec, 100.0);
        assert_eq!(result.columns, pts(&[33.334, 33.333, 33.333]));
    }

    #[test]
    fn parallel_accumulation_matches_serial() {
        let mut spec = TableSpec::new(3);
        for i in 0..120 {
            let w = (i % 17) as f32;
            spec.rows.push(vec![
                cell(w, w * 3.0),
                cell(5.0, 40.0 + w).with_spans(1, if i % 5 == 0 { 2 } else { 1 }),
                cell(1.0, 2.0 * w),
            ]);
        }
        let serial = compute_with(&spec, Pt::from_i32(200), usize::MAX, None).expect("serial");
        let parallel = compute_with(&spec, Pt::from_i32(200), 1, None).expect("parallel");
        assert_eq!(serial, parallel);
    }
}
