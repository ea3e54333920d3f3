//! Linear gradients: color stop normalization, spread methods and PDF shading export.
//!
//! Coordinates are PDF user space (y grows upwards). Offsets are expressed as the
//! parameter `t` along the gradient vector, `t = 0` at its start and `t = 1` at its end.

use crate::debug::{DebugLogger, log_event};
use crate::error::DocflowError;
use crate::types::{Color, Rect, Shading, ShadingStop};
use lopdf::{Dictionary, Object, dictionary};

const EPSILON: f32 = 1e-6;
const MAX_SPREAD_STOPS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetType {
    Auto,
    Relative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintOffsetType {
    None,
    RelativeOnGradient,
    RelativeBetweenColors,
    AbsoluteOnGradient,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientColorStop {
    rgb: [f32; 3],
    opacity: f32,
    offset: f32,
    offset_type: OffsetType,
    hint_offset: f32,
    hint_offset_type: HintOffsetType,
}

impl GradientColorStop {
    pub fn new(rgb: [f32; 3]) -> Self {
        Self::with_offset(rgb, 0.0, OffsetType::Auto)
    }

    pub fn with_offset(rgb: [f32; 3], offset: f32, offset_type: OffsetType) -> Self {
        Self {
            rgb: rgb.map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 }),
            opacity: 1.0,
            offset: if offset_type == OffsetType::Auto { 0.0 } else { offset },
            offset_type,
            hint_offset: 0.0,
            hint_offset_type: HintOffsetType::None,
        }
    }

    /// Same color, opacity and hint at a different position.
    pub fn copy_with_offset(&self, offset: f32, offset_type: OffsetType) -> Self {
        Self {
            offset: if offset_type == OffsetType::Auto { 0.0 } else { offset },
            offset_type,
            ..*self
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = if opacity.is_finite() { opacity.clamp(0.0, 1.0) } else { 1.0 };
        self
    }

    pub fn with_hint(mut self, hint_offset: f32, hint_offset_type: HintOffsetType) -> Self {
        self.hint_offset = if hint_offset_type == HintOffsetType::None {
            0.0
        } else {
            hint_offset
        };
        self.hint_offset_type = hint_offset_type;
        self
    }

    pub fn rgb(&self) -> [f32; 3] {
        self.rgb
    }

    pub fn color(&self) -> Color {
        Color::rgb(self.rgb[0], self.rgb[1], self.rgb[2])
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn offset_type(&self) -> OffsetType {
        self.offset_type
    }

    pub fn hint_offset(&self) -> f32 {
        self.hint_offset
    }

    pub fn hint_offset_type(&self) -> HintOffsetType {
        self.hint_offset_type
    }
}

/// A stop whose offset and hint are both relative to the gradient vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedStop {
    pub color: Color,
    pub opacity: f32,
    pub offset: f32,
    // Midpoint of the transition towards the next stop, on the same scale as `offset`.
    pub hint: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadMethod {
    None,
    Pad,
    Reflect,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientStrategy {
    ToBottom,
    ToBottomLeft,
    ToBottomRight,
    ToLeft,
    ToRight,
    ToTop,
    ToTopLeft,
    ToTopRight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GradientPaint {
    Axial(Shading),
    Solid(Color),
}

pub fn normalize_stops(
    stops: &[GradientColorStop],
    vector_length: f32,
    debug: Option<&DebugLogger>,
) -> Result<Vec<NormalizedStop>, DocflowError> {
    if stops.is_empty() {
        return Err(DocflowError::InvalidGradient(
            "at least one color stop is required".to_string(),
        ));
    }
    for (idx, stop) in stops.iter().enumerate() {
        if !stop.offset.is_finite() || !stop.hint_offset.is_finite() {
            return Err(DocflowError::InvalidGradient(format!(
                "stop {idx} has a non-finite offset"
            )));
        }
    }

    let to_relative = |value: f32| {
        if vector_length > EPSILON {
            value / vector_length
        } else {
            0.0
        }
    };

    let n = stops.len();
    let mut offsets: Vec<Option<f32>> = stops
        .iter()
        .map(|stop| match stop.offset_type {
            OffsetType::Auto => None,
            OffsetType::Relative => Some(stop.offset),
            OffsetType::Absolute => Some(to_relative(stop.offset)),
        })
        .collect();
    if offsets[0].is_none() {
        offsets[0] = Some(0.0);
    }
    if offsets[n - 1].is_none() {
        offsets[n - 1] = Some(1.0);
    }

    // A stop never sits before an earlier one.
    let mut running = f32::NEG_INFINITY;
    for slot in offsets.iter_mut() {
        if let Some(value) = slot {
            if *value < running {
                *value = running;
            }
            running = *value;
        }
    }

    let mut resolved = vec![0.0f32; n];
    let mut last_known = 0usize;
    resolved[0] = offsets[0].unwrap_or(0.0);
    for idx in 1..n {
        let Some(value) = offsets[idx] else {
            continue;
        };
        resolved[idx] = value;
        let gap = idx - last_known;
        if gap > 1 {
            let start = resolved[last_known];
            for k in 1..gap {
                resolved[last_known + k] = start + (value - start) * (k as f32) / (gap as f32);
            }
        }
        last_known = idx;
    }

    let mut out = Vec::with_capacity(n);
    for idx in 0..n {
        let stop = &stops[idx];
        let offset = resolved[idx];
        let hint = if idx + 1 < n {
            let next = resolved[idx + 1];
            let raw = match stop.hint_offset_type {
                HintOffsetType::None => None,
                HintOffsetType::RelativeOnGradient => Some(stop.hint_offset),
                HintOffsetType::AbsoluteOnGradient => Some(to_relative(stop.hint_offset)),
                HintOffsetType::RelativeBetweenColors => {
                    Some(offset + stop.hint_offset * (next - offset))
                }
            };
            match raw {
                Some(h) if h > offset + EPSILON && h < next - EPSILON => Some(h),
                Some(h) => {
                    log_event(
                        debug,
                        "debug.gradient.hint_dropped",
                        &[
                            ("stop", idx.to_string()),
                            ("hint", format!("{h:.4}")),
                            ("from", format!("{offset:.4}")),
                            ("to", format!("{next:.4}")),
                        ],
                    );
                    None
                }
                None => None,
            }
        } else {
            None
        };
        out.push(NormalizedStop {
            color: stop.color(),
            opacity: stop.opacity,
            offset,
            hint,
        });
    }
    Ok(out)
}

/// Replicates the stop pattern over `[t_min, t_max]` for repeating spreads.
///
/// Returns the stops and the shading domain they cover. `Pad` and `None`, and
/// patterns of zero length, keep the stops as they are with domain `[0, 1]`.
pub fn adjust_to_spread(
    stops: &[NormalizedStop],
    t_min: f32,
    t_max: f32,
    spread: SpreadMethod,
) -> (Vec<NormalizedStop>, (f32, f32)) {
    let unchanged = (stops.to_vec(), (0.0, 1.0));
    if !matches!(spread, SpreadMethod::Repeat | SpreadMethod::Reflect) || stops.len() < 2 {
        return unchanged;
    }
    let first = stops[0].offset;
    let last = stops[stops.len() - 1].offset;
    let period = last - first;
    if period <= EPSILON || !t_min.is_finite() || !t_max.is_finite() {
        return unchanged;
    }

    let start_k = libm::floorf((t_min - first) / period) as i64;
    let end_k = (libm::ceilf((t_max - first) / period) as i64).max(start_k + 1);
    let periods = (end_k - start_k) as usize;
    if periods.saturating_mul(stops.len()) > MAX_SPREAD_STOPS {
        return unchanged;
    }

    let mut out: Vec<NormalizedStop> = Vec::with_capacity(periods * stops.len());
    for k in start_k..end_k {
        let base = first + (k as f32) * period;
        let mirrored = spread == SpreadMethod::Reflect && k.rem_euclid(2) == 1;
        if !mirrored {
            for stop in stops {
                out.push(NormalizedStop {
                    offset: base + (stop.offset - first),
                    hint: stop.hint.map(|h| base + (h - first)),
                    ..*stop
                });
            }
        } else {
            // Walking backwards, the hint of segment (i, i+1) belongs to stop i+1.
            for idx in (0..stops.len()).rev() {
                let stop = stops[idx];
                let hint = if idx > 0 {
                    stops[idx - 1].hint.map(|h| base + (last - h))
                } else {
                    None
                };
                out.push(NormalizedStop {
                    offset: base + (last - stop.offset),
                    hint,
                    ..stop
                });
            }
        }
    }

    // Reflected joins repeat the same stop twice; the survivor keeps the outgoing hint.
    out.dedup_by(|later, earlier| {
        let same =
            (later.offset - earlier.offset).abs() <= EPSILON && later.color == earlier.color;
        if same && earlier.hint.is_none() {
            earlier.hint = later.hint;
        }
        same
    });
    let domain = (
        first + (start_k as f32) * period,
        first + (end_k as f32) * period,
    );
    (out, domain)
}

/// Exponent of the interpolation curve that puts the 50% color at `hint`.
fn hint_exponent(from: f32, to: f32, hint: Option<f32>) -> f32 {
    let Some(hint) = hint else {
        return 1.0;
    };
    let span = to - from;
    if span <= EPSILON {
        return 1.0;
    }
    let r = (hint - from) / span;
    if r <= EPSILON || r >= 1.0 - EPSILON {
        return 1.0;
    }
    libm::logf(0.5) / libm::logf(r)
}

fn shading_stops(stops: &[NormalizedStop], domain: (f32, f32)) -> Vec<ShadingStop> {
    let mut out: Vec<ShadingStop> = Vec::with_capacity(stops.len() + 2);
    if let Some(first) = stops.first() {
        if first.offset > domain.0 + EPSILON {
            out.push(ShadingStop {
                offset: domain.0,
                color: first.color,
                exponent: 1.0,
            });
        }
    }
    for (idx, stop) in stops.iter().enumerate() {
        let exponent = if idx > 0 {
            let prev = &stops[idx - 1];
            hint_exponent(prev.offset, stop.offset, prev.hint)
        } else {
            1.0
        };
        out.push(ShadingStop {
            offset: stop.offset.clamp(domain.0, domain.1),
            color: stop.color,
            exponent,
        });
    }
    if let Some(last) = stops.last() {
        if last.offset < domain.1 - EPSILON {
            out.push(ShadingStop {
                offset: domain.1,
                color: last.color,
                exponent: 1.0,
            });
        }
    }
    if out.len() == 1 {
        let only = out[0];
        out[0].offset = domain.0;
        out.push(ShadingStop {
            offset: domain.1,
            ..only
        });
    }
    out
}

fn invert_affine(m: [f32; 6]) -> Option<[f32; 6]> {
    let [a, b, c, d, e, f] = m;
    let det = a * d - b * c;
    if det.abs() <= EPSILON || !det.is_finite() {
        return None;
    }
    let ia = d / det;
    let ib = -b / det;
    let ic = -c / det;
    let id = a / det;
    let ie = -(ia * e + ic * f);
    let iff = -(ib * e + id * f);
    Some([ia, ib, ic, id, ie, iff])
}

fn apply_affine(m: [f32; 6], (x, y): (f32, f32)) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

pub const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// The common part of every linear gradient builder: a vector and a stop list.
pub trait LinearGradient {
    /// Start and end of the gradient vector in gradient space, or `None` when it
    /// cannot be derived for `target`.
    fn gradient_vector(&self, target: Rect) -> Option<[(f32, f32); 2]>;

    /// Maps gradient space to the target's user space.
    fn transform(&self) -> [f32; 6] {
        IDENTITY
    }

    fn color_stops(&self) -> &[GradientColorStop];

    fn spread_method(&self) -> SpreadMethod;

    fn build(&self, target: Rect) -> Result<Option<GradientPaint>, DocflowError> {
        self.build_logged(target, None)
    }

    fn build_logged(
        &self,
        target: Rect,
        debug: Option<&DebugLogger>,
    ) -> Result<Option<GradientPaint>, DocflowError> {
        let stops = self.color_stops();
        if stops.is_empty() {
            return Ok(None);
        }
        let spread = self.spread_method();
        let Some([p0, p1]) = self.gradient_vector(target) else {
            return Ok(None);
        };
        let dx = p1.0 - p0.0;
        let dy = p1.1 - p0.1;
        let len_sq = dx * dx + dy * dy;
        if !len_sq.is_finite() || len_sq <= EPSILON * EPSILON {
            log_event(debug, "debug.gradient.degenerate_vector", &[]);
            return Ok(match spread {
                SpreadMethod::None => None,
                _ => Some(GradientPaint::Solid(stops[stops.len() - 1].color())),
            });
        }
        let length = libm::sqrtf(len_sq);
        let normalized = normalize_stops(stops, length, debug)?;
        if normalized.len() == 1 {
            return Ok(Some(GradientPaint::Solid(normalized[0].color)));
        }

        let transform = self.transform();
        let inverse = invert_affine(transform).ok_or_else(|| {
            DocflowError::InvalidGradient("gradient transform is not invertible".to_string())
        })?;
        let mut t_min = f32::INFINITY;
        let mut t_max = f32::NEG_INFINITY;
        for corner in target.corners() {
            let (x, y) = apply_affine(inverse, corner);
            let t = ((x - p0.0) * dx + (y - p0.1) * dy) / len_sq;
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }

        let (spread_stops, domain) = adjust_to_spread(&normalized, t_min, t_max, spread);
        let extend = match spread {
            SpreadMethod::None => (false, false),
            _ => (true, true),
        };
        let start = apply_affine(transform, (p0.0 + dx * domain.0, p0.1 + dy * domain.0));
        let end = apply_affine(transform, (p0.0 + dx * domain.1, p0.1 + dy * domain.1));
        Ok(Some(GradientPaint::Axial(Shading::Axial {
            x0: start.0,
            y0: start.1,
            x1: end.0,
            y1: end.1,
            domain,
            extend,
            stops: shading_stops(&spread_stops, domain),
        })))
    }
}

/// Linear gradient along an explicitly given vector.
#[derive(Debug, Clone)]
pub struct LinearGradientBuilder {
    vector: Option<[(f32, f32); 2]>,
    transform: [f32; 6],
    stops: Vec<GradientColorStop>,
    spread: SpreadMethod,
}

impl Default for LinearGradientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearGradientBuilder {
    pub fn new() -> Self {
        Self {
            vector: None,
            transform: IDENTITY,
            stops: Vec::new(),
            spread: SpreadMethod::None,
        }
    }

    pub fn set_gradient_vector(mut self, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        self.vector = Some([(x0, y0), (x1, y1)]);
        self
    }

    pub fn set_transform(mut self, transform: [f32; 6]) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_color_stop(mut self, stop: GradientColorStop) -> Self {
        self.stops.push(stop);
        self
    }

    pub fn set_spread_method(mut self, spread: SpreadMethod) -> Self {
        self.spread = spread;
        self
    }
}

impl LinearGradient for LinearGradientBuilder {
    fn gradient_vector(&self, _target: Rect) -> Option<[(f32, f32); 2]> {
        self.vector
    }

    fn transform(&self) -> [f32; 6] {
        self.transform
    }

    fn color_stops(&self) -> &[GradientColorStop] {
        &self.stops
    }

    fn spread_method(&self) -> SpreadMethod {
        self.spread
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Direction {
    Strategy(GradientStrategy),
    Angle(f32),
}

/// Linear gradient whose vector is derived from the target box, CSS style.
#[derive(Debug, Clone)]
pub struct StrategyBasedLinearGradientBuilder {
    direction: Direction,
    stops: Vec<GradientColorStop>,
    spread: SpreadMethod,
}

impl Default for StrategyBasedLinearGradientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyBasedLinearGradientBuilder {
    pub fn new() -> Self {
        Self {
            direction: Direction::Strategy(GradientStrategy::ToBottom),
            stops: Vec::new(),
            spread: SpreadMethod::Pad,
        }
    }

    pub fn set_gradient_direction_as_strategy(mut self, strategy: GradientStrategy) -> Self {
        self.direction = Direction::Strategy(strategy);
        self
    }

    /// `radians` is measured clockwise from "to top".
    pub fn set_gradient_direction_as_central_rotation_angle(mut self, radians: f32) -> Self {
        self.direction = Direction::Angle(radians);
        self
    }

    pub fn add_color_stop(mut self, stop: GradientColorStop) -> Self {
        self.stops.push(stop);
        self
    }

    pub fn set_spread_method(mut self, spread: SpreadMethod) -> Self {
        self.spread = spread;
        self
    }

    pub fn strategy(&self) -> Option<GradientStrategy> {
        match self.direction {
            Direction::Strategy(strategy) => Some(strategy),
            Direction::Angle(_) => None,
        }
    }

    pub fn rotation_angle(&self) -> Option<f32> {
        match self.direction {
            Direction::Angle(radians) => Some(radians),
            Direction::Strategy(_) => None,
        }
    }
}

pub fn strategy_angle(strategy: GradientStrategy, width: f32, height: f32) -> f32 {
    use std::f32::consts::PI;
    // Corner directions keep the 50% line through the two other corners.
    let corner = libm::atan2f(height, width);
    match strategy {
        GradientStrategy::ToTop => 0.0,
        GradientStrategy::ToRight => PI / 2.0,
        GradientStrategy::ToBottom => PI,
        GradientStrategy::ToLeft => PI * 1.5,
        GradientStrategy::ToTopRight => corner,
        GradientStrategy::ToBottomRight => PI - corner,
        GradientStrategy::ToBottomLeft => PI + corner,
        GradientStrategy::ToTopLeft => 2.0 * PI - corner,
    }
}

impl LinearGradient for StrategyBasedLinearGradientBuilder {
    fn gradient_vector(&self, target: Rect) -> Option<[(f32, f32); 2]> {
        let w = target.width.to_f32();
        let h = target.height.to_f32();
        let angle = match self.direction {
            Direction::Strategy(strategy) => strategy_angle(strategy, w, h),
            Direction::Angle(radians) => radians,
        };
        if !angle.is_finite() {
            return None;
        }
        let dx = libm::sinf(angle);
        let dy = libm::cosf(angle);
        let half = (w.abs() * dx.abs() + h.abs() * dy.abs()) * 0.5;
        let cx = target.x.to_f32() + w * 0.5;
        let cy = target.y.to_f32() + h * 0.5;
        Some([
            (cx - dx * half, cy - dy * half),
            (cx + dx * half, cy + dy * half),
        ])
    }

    fn color_stops(&self) -> &[GradientColorStop] {
        &self.stops
    }

    fn spread_method(&self) -> SpreadMethod {
        self.spread
    }
}

/// Type 2 (axial) shading dictionary; more than two stops use a Type 3 stitching function.
pub fn shading_to_pdf(shading: &Shading) -> Dictionary {
    let Shading::Axial {
        x0,
        y0,
        x1,
        y1,
        domain,
        extend,
        stops,
    } = shading;
    dictionary! {
        "ShadingType" => 2,
        "ColorSpace" => "DeviceRGB",
        "Coords" => vec![(*x0).into(), (*y0).into(), (*x1).into(), (*y1).into()],
        "Domain" => vec![domain.0.into(), domain.1.into()],
        "Extend" => vec![Object::Boolean(extend.0), Object::Boolean(extend.1)],
        "Function" => stitching_function(stops, *domain),
    }
}

/// Shading pattern dictionary placing `shading` with `matrix`.
pub fn pattern_to_pdf(shading: &Shading, matrix: [f32; 6]) -> Dictionary {
    dictionary! {
        "PatternType" => 2,
        "Shading" => shading_to_pdf(shading),
        "Matrix" => matrix.iter().map(|v| Object::Real(*v)).collect::<Vec<Object>>(),
    }
}

fn color_array(color: Color) -> Vec<Object> {
    color
        .components()
        .iter()
        .map(|v| Object::Real(*v))
        .collect()
}

fn stitching_function(stops: &[ShadingStop], domain: (f32, f32)) -> Dictionary {
    // Two stops span the whole domain, so one exponential function suffices.
    if let [from, to] = stops {
        return dictionary! {
            "FunctionType" => 2,
            "Domain" => vec![domain.0.into(), domain.1.into()],
            "C0" => color_array(from.color),
            "C1" => color_array(to.color),
            "N" => to.exponent,
        };
    }
    let mut functions: Vec<Object> = Vec::new();
    let mut bounds: Vec<Object> = Vec::new();
    let mut encode: Vec<Object> = Vec::new();
    for pair in stops.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        functions.push(Object::Dictionary(dictionary! {
            "FunctionType" => 2,
            "Domain" => vec![0.into(), 1.into()],
            "C0" => color_array(from.color),
            "C1" => color_array(to.color),
            "N" => to.exponent,
        }));
        encode.push(0.into());
        encode.push(1.into());
    }
    for stop in stops.iter().skip(1).take(stops.len().saturating_sub(2)) {
        bounds.push(stop.offset.into());
    }
    dictionary! {
        "FunctionType" => 3,
        "Domain" => vec![domain.0.into(), domain.1.into()],
        "Functions" => functions,
        "Bounds" => bounds,
        "Encode" => encode,
    }
}
