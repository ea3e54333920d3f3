use crate::types::Pt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthSpec {
    Auto,
    Absolute(Pt),
    Percent(f32), // fraction: 0.5 == 50%
    Em(f32),
    Rem(f32),
    Calc(CalcLength),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcLength {
    pub abs: Pt,
    pub percent: f32,
    pub em: f32,
    pub rem: f32,
}

impl CalcLength {
    pub fn zero() -> Self {
        Self {
            abs: Pt::ZERO,
            percent: 0.0,
            em: 0.0,
            rem: 0.0,
        }
    }

    pub fn resolve(self, avail: Pt, font_size: Pt, root_font_size: Pt) -> Pt {
        self.abs + (avail * self.percent) + (font_size * self.em) + (root_font_size * self.rem)
    }
}

/// Font sizes a length is resolved against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontContext {
    pub font_size: Pt,
    pub root_font_size: Pt,
}

impl Default for FontContext {
    fn default() -> Self {
        Self {
            font_size: Pt::from_i32(12),
            root_font_size: Pt::from_i32(12),
        }
    }
}

impl LengthSpec {
    pub fn pt(value: f32) -> Self {
        LengthSpec::Absolute(Pt::from_f32(value))
    }

    pub fn is_auto(self) -> bool {
        matches!(self, LengthSpec::Auto)
    }

    pub fn resolve(self, avail: Pt, fonts: FontContext) -> Pt {
        match self {
            LengthSpec::Auto => Pt::ZERO,
            LengthSpec::Absolute(value) => value,
            LengthSpec::Percent(value) => avail * value,
            LengthSpec::Em(value) => fonts.font_size * value,
            LengthSpec::Rem(value) => fonts.root_font_size * value,
            LengthSpec::Calc(calc) => calc.resolve(avail, fonts.font_size, fonts.root_font_size),
        }
    }

    /// Resolves against a possibly indefinite size. `Auto`, and percentages of an
    /// indefinite size, have no definite value.
    pub fn resolve_definite(self, avail: Option<Pt>, fonts: FontContext) -> Option<Pt> {
        match self {
            LengthSpec::Auto => None,
            LengthSpec::Percent(_) => avail.map(|a| self.resolve(a, fonts)),
            LengthSpec::Calc(calc) if calc.percent != 0.0 => {
                avail.map(|a| self.resolve(a, fonts))
            }
            _ => Some(self.resolve(Pt::ZERO, fonts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_indefinite_is_none() {
        let fonts = FontContext::default();
        assert_eq!(LengthSpec::Percent(0.5).resolve_definite(None, fonts), None);
        assert_eq!(
            LengthSpec::Percent(0.5).resolve_definite(Some(Pt::from_i32(200)), fonts),
            Some(Pt::from_i32(100))
        );
        assert_eq!(
            LengthSpec::Em(2.0).resolve_definite(None, fonts),
            Some(Pt::from_i32(24))
        );
    }

    #[test]
    fn calc_mixes_units() {
        let fonts = FontContext {
            font_size: Pt::from_i32(10),
            root_font_size: Pt::from_i32(16),
        };
        let calc = CalcLength {
            abs: Pt::from_i32(5),
            percent: 0.1,
            em: 1.0,
            rem: 0.5,
        };
        let v = LengthSpec::Calc(calc).resolve(Pt::from_i32(100), fonts);
        assert_eq!(v, Pt::from_i32(5 + 10 + 10 + 8));
    }
}
