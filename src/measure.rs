use crate::text_wrap::{OverflowWrap, TextRun, intrinsic_widths, wrap_runs};
use crate::types::Pt;
use std::sync::Arc;

/// Intrinsic sizing of a layout box.
pub trait Measure: Send + Sync {
    fn min_content_width(&self) -> Pt;
    fn max_content_width(&self) -> Pt;
    fn height_for_width(&self, width: Pt) -> Pt;
}

pub trait TextMeasurer: Send + Sync {
    fn measure(&self, text: &str, font_size: Pt) -> Pt;
    fn line_height(&self, font_size: Pt) -> Pt;
}

/// Monospace approximation used when no font program is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAdvanceMeasurer;

impl TextMeasurer for FixedAdvanceMeasurer {
    fn measure(&self, text: &str, font_size: Pt) -> Pt {
        let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
        char_width * (text.chars().count() as i32)
    }

    fn line_height(&self, font_size: Pt) -> Pt {
        font_size.mul_ratio(6, 5)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedBox {
    pub width: Pt,
    pub height: Pt,
}

impl FixedBox {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }
}

impl Measure for FixedBox {
    fn min_content_width(&self) -> Pt {
        self.width
    }

    fn max_content_width(&self) -> Pt {
        self.width
    }

    fn height_for_width(&self, _width: Pt) -> Pt {
        self.height
    }
}

/// A single-style block of text wrapped at UAX #14 break opportunities,
/// measured the same way [`wrap_runs`] lays it out.
#[derive(Clone)]
pub struct TextBox {
    run: TextRun,
    overflow_wrap: OverflowWrap,
    measurer: Arc<dyn TextMeasurer>,
}

impl TextBox {
    pub fn new(text: impl Into<String>, font_size: Pt, measurer: Arc<dyn TextMeasurer>) -> Self {
        Self {
            run: TextRun {
                text: text.into(),
                font_size,
                special_script_breaks: None,
            },
            overflow_wrap: OverflowWrap::Normal,
            measurer,
        }
    }

    pub fn with_overflow_wrap(mut self, overflow_wrap: OverflowWrap) -> Self {
        self.overflow_wrap = overflow_wrap;
        self
    }

    pub fn text(&self) -> &str {
        &self.run.text
    }

    fn runs(&self) -> &[TextRun] {
        std::slice::from_ref(&self.run)
    }
}

impl Measure for TextBox {
    fn min_content_width(&self) -> Pt {
        intrinsic_widths(self.runs(), self.measurer.as_ref()).0
    }

    fn max_content_width(&self) -> Pt {
        intrinsic_widths(self.runs(), self.measurer.as_ref()).1
    }

    fn height_for_width(&self, width: Pt) -> Pt {
        let lines = wrap_runs(self.runs(), width, self.measurer.as_ref(), self.overflow_wrap);
        self.measurer.line_height(self.run.font_size) * (lines.len() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(text: &str) -> TextBox {
        TextBox::new(text, Pt::from_i32(10), Arc::new(FixedAdvanceMeasurer))
    }

    #[test]
    fn fixed_advance_uses_six_tenths_em() {
        let m = FixedAdvanceMeasurer;
        assert_eq!(m.measure("abcd", Pt::from_i32(10)), Pt::from_i32(24));
        assert_eq!(m.line_height(Pt::from_i32(10)), Pt::from_i32(12));
    }

    #[test]
    fn text_box_intrinsic_widths() {
        let b = text_box("aa bbbb c");
        assert_eq!(b.min_content_width(), Pt::from_i32(24));
        assert_eq!(b.max_content_width(), Pt::from_i32(54));
    }

    #[test]
    fn text_box_wraps_to_more_lines_when_narrow() {
        let b = text_box("aa bbbb c");
        assert_eq!(b.height_for_width(Pt::from_i32(100)), Pt::from_i32(12));
        assert_eq!(b.height_for_width(Pt::from_i32(24)), Pt::from_i32(36));
    }

    #[test]
    fn text_box_breaks_after_hyphens_like_the_line_wrapper() {
        let b = text_box("aaa-bbb");
        assert_eq!(b.min_content_width(), Pt::from_i32(24));
        assert_eq!(b.max_content_width(), Pt::from_i32(42));
        assert_eq!(b.height_for_width(Pt::from_i32(30)), Pt::from_i32(24));
        let lines = wrap_runs(
            b.runs(),
            Pt::from_i32(30),
            &FixedAdvanceMeasurer,
            OverflowWrap::Normal,
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn text_box_counts_forced_breaks_and_break_word_pieces() {
        let b = text_box("ab\ncd");
        assert_eq!(b.max_content_width(), Pt::from_i32(12));
        assert_eq!(b.height_for_width(Pt::from_i32(100)), Pt::from_i32(24));

        let long = text_box("abcdefghij");
        assert_eq!(long.height_for_width(Pt::from_i32(30)), Pt::from_i32(12));
        let broken = long.with_overflow_wrap(OverflowWrap::BreakWord);
        assert_eq!(broken.height_for_width(Pt::from_i32(30)), Pt::from_i32(24));
        assert_eq!(broken.min_content_width(), Pt::from_i32(60));
    }
}
