use crate::error::DocflowError;
use crate::measure::{FixedAdvanceMeasurer, TextMeasurer};
use crate::types::Pt;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Pt>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Pt> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Pt) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            let Some(old) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&old);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct VerticalMetrics {
    units_per_em: u16,
    ascent: i16,
    descent: i16,
    line_gap: i16,
}

/// Measures text by shaping it with the registered font program.
pub struct FontMeasurer {
    name: String,
    data: Vec<u8>,
    metrics: VerticalMetrics,
    cache: Mutex<TextWidthCache>,
}

impl std::fmt::Debug for FontMeasurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMeasurer")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl FontMeasurer {
    pub fn from_bytes(data: Vec<u8>, source_name: Option<&str>) -> Result<Self, DocflowError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| DocflowError::Font(format!("invalid font data for {source}: {err}")))?;
        let metrics = VerticalMetrics {
            units_per_em: face.units_per_em().max(1),
            ascent: face.ascender(),
            descent: face.descender(),
            line_gap: face.line_gap(),
        };
        let name = face_name(&face).unwrap_or_else(|| source.to_string());
        Ok(Self {
            name,
            data,
            metrics,
            cache: Mutex::new(TextWidthCache::new(20_000)),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let stem = path.file_stem().and_then(|v| v.to_str());
        Self::from_bytes(data, stem)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports_char(&self, ch: char) -> bool {
        ttf_parser::Face::parse(&self.data, 0)
            .ok()
            .and_then(|face| face.glyph_index(ch))
            .is_some()
    }

    fn shape_width(&self, text: &str, font_size: Pt) -> Option<Pt> {
        let face = HbFace::from_slice(&self.data, 0)?;
        let units_per_em = self.metrics.units_per_em as i64;
        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let positions = output.glyph_positions();
        if positions.is_empty() {
            return None;
        }
        let mut total_units: i64 = 0;
        for pos in positions {
            let adv = ((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em;
            total_units = total_units.saturating_add(adv);
        }
        if total_units <= 0 {
            return Some(Pt::ZERO);
        }
        Some(font_size.mul_ratio(total_units, 1000))
    }
}

impl TextMeasurer for FontMeasurer {
    fn measure(&self, text: &str, font_size: Pt) -> Pt {
        if text.is_empty() {
            return Pt::ZERO;
        }
        let key = TextWidthKey {
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.cache.lock() {
            if let Some(value) = cache.get(&key) {
                return value;
            }
        }
        let value = self
            .shape_width(text, font_size)
            .unwrap_or_else(|| FixedAdvanceMeasurer.measure(text, font_size));
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, value);
        }
        value
    }

    fn line_height(&self, font_size: Pt) -> Pt {
        let m = self.metrics;
        let units = m.ascent as i64 - m.descent as i64 + m.line_gap as i64;
        if units <= 0 {
            return FixedAdvanceMeasurer.line_height(font_size);
        }
        font_size.mul_ratio(units, m.units_per_em as i64)
    }
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let rtl = matches!(
            ch as u32,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn face_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY if family.is_none() => {
                family = Some(name)
            }
            _ => {}
        }
    }
    post.or(family)
}
