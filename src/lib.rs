mod debug;
mod error;
mod flex;
mod font;
mod gradient;
mod grid;
mod length;
mod measure;
mod perf;
mod props;
mod table_widths;
mod text_wrap;
mod types;

pub use debug::DebugLogger;
pub use error::DocflowError;
pub use flex::{
    AlignContent, AlignItems, AlignSelf, FlexBasis, FlexContainer, FlexDirection, FlexItem,
    FlexItemInfo, FlexLayout, FlexWrap, JustifyContent, Margins,
};
pub use font::FontMeasurer;
pub use gradient::{
    GradientColorStop, GradientPaint, GradientStrategy, HintOffsetType, LinearGradient,
    LinearGradientBuilder, NormalizedStop, OffsetType, SpreadMethod,
    StrategyBasedLinearGradientBuilder, adjust_to_spread, normalize_stops, pattern_to_pdf,
    shading_to_pdf,
};
pub use grid::{
    CellOrder, Grid, GridCell, GridContainer, GridFlow, GridItem, GridLayout, GridLine,
    GridPlacement, PlacedCell, TrackSize,
};
pub use length::{CalcLength, FontContext, LengthSpec};
pub use measure::{FixedAdvanceMeasurer, FixedBox, Measure, TextBox, TextMeasurer};
pub use perf::PerfLogger;
pub use props::{
    BaseDirection, ElementKind, NodeId, Property, PropertyTree, PropertyValue, TextAlignment,
};
pub use table_widths::{
    CellInfo, ColumnWidth, TableCellSpec, TableLayoutMode, TableSpec, TableWidth,
    TableWidthsResult, compute as compute_table_widths, place_cells,
};
pub use text_wrap::{
    Line, LineFragment, OverflowWrap, TextRun, intrinsic_widths, is_special_script,
    segment_special_script, wrap_runs,
};
pub use types::{Color, Pt, Rect, Shading, ShadingStop, Size};

use std::path::PathBuf;
use std::sync::Arc;

use perf::set_perf_context;

enum FontSource {
    File(PathBuf),
    Bytes(Vec<u8>, Option<String>),
}

/// Configures a [`LayoutEngine`].
pub struct LayoutEngineBuilder {
    default_font_size: f32,
    root_font_size: Option<f32>,
    overflow_wrap: OverflowWrap,
    debug_path: Option<PathBuf>,
    perf_enabled: bool,
    perf_path: Option<PathBuf>,
    parallel_row_threshold: usize,
    fonts: Vec<FontSource>,
}

impl Default for LayoutEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngineBuilder {
    pub fn new() -> Self {
        Self {
            default_font_size: 12.0,
            root_font_size: None,
            overflow_wrap: OverflowWrap::BreakWord,
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
            parallel_row_threshold: 64,
            fonts: Vec::new(),
        }
    }

    pub fn default_font_size(mut self, size: f32) -> Self {
        self.default_font_size = size;
        self
    }

    // Defaults to the default font size.
    pub fn root_font_size(mut self, size: f32) -> Self {
        self.root_font_size = Some(size);
        self
    }

    pub fn overflow_wrap(mut self, mode: OverflowWrap) -> Self {
        self.overflow_wrap = mode;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    // Writes to docflow_perf.log unless perf_log names another file.
    pub fn perf(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    // Tables with at least this many rows gather cell requirements in parallel.
    pub fn parallel_row_threshold(mut self, rows: usize) -> Self {
        self.parallel_row_threshold = rows.max(1);
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.fonts.push(FontSource::File(path.into()));
        self
    }

    pub fn register_font_bytes(mut self, data: Vec<u8>, name: Option<&str>) -> Self {
        self.fonts
            .push(FontSource::Bytes(data, name.map(str::to_string)));
        self
    }

    pub fn build(self) -> Result<LayoutEngine, DocflowError> {
        if !self.default_font_size.is_finite() || self.default_font_size <= 0.0 {
            return Err(DocflowError::InvalidConfiguration(
                "default_font_size must be > 0".to_string(),
            ));
        }
        let root_font_size = self.root_font_size.unwrap_or(self.default_font_size);
        if !root_font_size.is_finite() || root_font_size <= 0.0 {
            return Err(DocflowError::InvalidConfiguration(
                "root_font_size must be > 0".to_string(),
            ));
        }
        let mut fonts = Vec::with_capacity(self.fonts.len());
        for source in self.fonts {
            let measurer = match source {
                FontSource::File(path) => FontMeasurer::from_file(path)?,
                FontSource::Bytes(data, name) => FontMeasurer::from_bytes(data, name.as_deref())?,
            };
            fonts.push(Arc::new(measurer));
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| PathBuf::from("docflow_perf.log"));
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        Ok(LayoutEngine {
            font_context: FontContext {
                font_size: Pt::from_f32(self.default_font_size),
                root_font_size: Pt::from_f32(root_font_size),
            },
            overflow_wrap: self.overflow_wrap,
            parallel_row_threshold: self.parallel_row_threshold,
            fonts,
            debug,
            perf,
        })
    }
}

/// Entry point tying the layout algorithms to shared configuration, fonts and logs.
pub struct LayoutEngine {
    font_context: FontContext,
    overflow_wrap: OverflowWrap,
    parallel_row_threshold: usize,
    fonts: Vec<Arc<FontMeasurer>>,
    debug: Option<DebugLogger>,
    perf: Option<Arc<PerfLogger>>,
}

impl LayoutEngine {
    pub fn builder() -> LayoutEngineBuilder {
        LayoutEngineBuilder::new()
    }

    pub fn font_context(&self) -> FontContext {
        self.font_context
    }

    pub fn overflow_wrap(&self) -> OverflowWrap {
        self.overflow_wrap
    }

    pub fn parallel_row_threshold(&self) -> usize {
        self.parallel_row_threshold
    }

    pub fn debug(&self) -> Option<&DebugLogger> {
        self.debug.as_ref()
    }

    pub fn fonts(&self) -> &[Arc<FontMeasurer>] {
        &self.fonts
    }

    /// The first registered font, or the fixed-advance fallback.
    pub fn text_measurer(&self) -> Arc<dyn TextMeasurer> {
        match self.fonts.first() {
            Some(font) => font.clone() as Arc<dyn TextMeasurer>,
            None => Arc::new(FixedAdvanceMeasurer),
        }
    }

    /// A wrapped text box measured with [`Self::text_measurer`].
    pub fn text_box(&self, text: impl Into<String>) -> TextBox {
        TextBox::new(text, self.font_context.font_size, self.text_measurer())
            .with_overflow_wrap(self.overflow_wrap)
    }

    pub fn layout_flex(
        &self,
        container: &FlexContainer,
        width: Pt,
        height: Option<Pt>,
    ) -> FlexLayout {
        let _perf_guard = set_perf_context(self.perf.clone());
        container.layout(width, height, self.font_context)
    }

    pub fn layout_grid(
        &self,
        container: &GridContainer,
        width: Pt,
        height: Option<Pt>,
    ) -> Result<GridLayout, DocflowError> {
        let _perf_guard = set_perf_context(self.perf.clone());
        container.layout_logged(width, height, self.font_context, self.debug())
    }

    pub fn place_grid_items(&self, container: &GridContainer) -> Result<Grid, DocflowError> {
        container.place_items_logged(self.debug())
    }

    pub fn wrap_text(&self, runs: &[TextRun], max_width: Pt) -> Vec<Line> {
        let _perf_guard = set_perf_context(self.perf.clone());
        let measurer = self.text_measurer();
        wrap_runs(runs, max_width, measurer.as_ref(), self.overflow_wrap)
    }

    pub fn table_widths(
        &self,
        spec: &TableSpec,
        avail_width: Pt,
    ) -> Result<TableWidthsResult, DocflowError> {
        let _perf_guard = set_perf_context(self.perf.clone());
        table_widths::compute(spec, avail_width, self)
    }

    pub fn build_gradient(
        &self,
        gradient: &dyn LinearGradient,
        target: Rect,
    ) -> Result<Option<GradientPaint>, DocflowError> {
        gradient.build_logged(target, self.debug())
    }

    /// Writes the debug counters and flushes both logs.
    pub fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docflow_{}_{}", std::process::id(), name))
    }

    #[test]
    fn builder_defaults() {
        let engine = LayoutEngine::builder().build().unwrap();
        assert_eq!(engine.font_context().font_size, Pt::from_i32(12));
        assert_eq!(engine.font_context().root_font_size, Pt::from_i32(12));
        assert_eq!(engine.overflow_wrap(), OverflowWrap::BreakWord);
        assert_eq!(engine.parallel_row_threshold(), 64);
        assert!(engine.debug().is_none());
        assert!(engine.fonts().is_empty());
    }

    #[test]
    fn rejects_non_positive_font_size() {
        let err = LayoutEngine::builder().default_font_size(0.0).build();
        assert!(matches!(err, Err(DocflowError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_invalid_font_bytes() {
        let err = LayoutEngine::builder()
            .register_font_bytes(vec![0, 1, 2, 3], Some("Broken"))
            .build();
        assert!(matches!(err, Err(DocflowError::Font(_))));
    }

    #[test]
    fn fallback_measurer_without_fonts() {
        let engine = LayoutEngine::builder().build().unwrap();
        let width = engine.text_measurer().measure("abc", Pt::from_i32(10));
        assert_eq!(width, Pt::from_i32(18));
    }

    #[test]
    fn wraps_with_configured_overflow_wrap() {
        let engine = LayoutEngine::builder()
            .overflow_wrap(OverflowWrap::Normal)
            .build()
            .unwrap();
        let runs = [TextRun::new("abcdefgh", 10.0)];
        let lines = engine.wrap_text(&runs, Pt::from_i32(30));
        assert_eq!(lines.len(), 1);

        let engine = LayoutEngine::builder().build().unwrap();
        let lines = engine.wrap_text(&runs, Pt::from_i32(30));
        assert!(lines.len() > 1);
    }

    #[test]
    fn text_box_height_matches_wrapped_lines() {
        let engine = LayoutEngine::builder().build().unwrap();
        let width = Pt::from_i32(30);
        let lines = engine.wrap_text(&[TextRun::new("aaa-bbb", 12.0)], width);
        assert_eq!(lines.len(), 2);
        let line_height = engine.text_measurer().line_height(Pt::from_i32(12));
        let text_box = engine.text_box("aaa-bbb");
        assert_eq!(text_box.height_for_width(width), line_height * 2);
    }

    #[test]
    fn flex_through_engine() {
        let engine = LayoutEngine::builder().build().unwrap();
        let container = FlexContainer::new(FlexDirection::Row)
            .with_item(FlexItem::new(FixedBox::new(20.0, 10.0)).with_grow(1.0))
            .with_item(FlexItem::new(FixedBox::new(20.0, 10.0)).with_grow(1.0));
        let layout = engine.layout_flex(&container, Pt::from_i32(100), None);
        let first = layout.item(0).unwrap();
        assert_eq!(first.rect.width, Pt::from_i32(50));
    }

    #[test]
    fn debug_log_records_grid_clamp() {
        let path = temp_path("grid_debug.log");
        let engine = LayoutEngine::builder().debug_log(path.clone()).build().unwrap();
        let container = GridContainer::new()
            .with_columns(vec![TrackSize::pt(50.0), TrackSize::pt(50.0)])
            .with_item(
                GridItem::new(FixedBox::new(10.0, 10.0))
                    .with_placement(GridPlacement::at(1, -5)),
            );
        engine
            .layout_grid(&container, Pt::from_i32(100), None)
            .unwrap();
        engine.emit_debug_summary("test");
        let log = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(log.contains("debug.grid.line_clamped"));
    }

    #[test]
    fn table_widths_through_engine() {
        let engine = LayoutEngine::builder().build().unwrap();
        let spec = TableSpec::new(2)
            .with_row(vec![
                TableCellSpec::new(10.0, 40.0),
                TableCellSpec::new(10.0, 40.0),
            ])
            .with_width(TableWidth::Percent(100.0));
        let result = engine.table_widths(&spec, Pt::from_i32(200)).unwrap();
        assert_eq!(result.columns.len(), 2);
        assert_eq!(result.table_width, Pt::from_i32(200));
        assert!(!result.overflow);
    }

    #[test]
    fn gradient_paint_exports_as_shading_pattern() {
        let engine = LayoutEngine::builder().build().unwrap();
        let gradient = LinearGradientBuilder::new()
            .set_gradient_vector(0.0, 0.0, 100.0, 0.0)
            .add_color_stop(GradientColorStop::new([0.0, 0.0, 0.0]))
            .add_color_stop(GradientColorStop::new([1.0, 1.0, 1.0]))
            .set_spread_method(SpreadMethod::Pad);
        let paint = engine
            .build_gradient(&gradient, Rect::new(0.0, 0.0, 100.0, 10.0))
            .unwrap();
        let Some(GradientPaint::Axial(shading)) = paint else {
            panic!("expected axial shading");
        };
        let pattern = pattern_to_pdf(&shading, [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(pattern.get(b"PatternType").unwrap().as_i64().unwrap(), 2);
        let shading = pattern.get(b"Shading").unwrap().as_dict().unwrap();
        let function = shading.get(b"Function").unwrap().as_dict().unwrap();
        assert_eq!(function.get(b"FunctionType").unwrap().as_i64().unwrap(), 2);
    }
}
