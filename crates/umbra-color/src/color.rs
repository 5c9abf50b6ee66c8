//! CSS color parsing and serialization.
//!
//! # Motivation
//!
//! The engine meets color text in every declaration it touches, so the
//! parser has to accept the whole zoo: legacy comma syntax, modern
//! space/slash syntax, hue units, short and long hex, named colors,
//! system colors, and `light-dark()`. Anything it cannot understand is
//! reported as `None` and the caller leaves the original text alone; a
//! color the engine cannot read must never break the rule it sits in.
//!
//! # Design
//!
//! `calc()` sub-expressions are lowered to plain numbers first (via the
//! shunting-yard evaluator), then the value is dispatched on its syntax
//! family. Parsing is pure; [`ColorParseCache`] adds the session-scoped
//! memoization keyed by trimmed input text.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::math::evaluate_math;

// ─── Color values ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgba {
        Rgba { r, g, b, a: 1.0 }
    }

    pub const TRANSPARENT: Rgba = Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0.0,
    };

    /// Cache id over all four channels.
    pub fn key(&self) -> String {
        format!("{};{};{};{}", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsla {
    /// Degrees, `[0, 360)`.
    pub h: f64,
    pub s: f64,
    pub l: f64,
    pub a: f64,
}

// https://en.wikipedia.org/wiki/HSL_and_HSV
pub fn hsl_to_rgb(hsl: Hsla) -> Rgba {
    let Hsla { h, s, l, a } = hsl;
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return Rgba { r: v, g: v, b: v, a };
    }

    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };
    Rgba {
        r: ((r + m) * 255.0).round() as u8,
        g: ((g + m) * 255.0).round() as u8,
        b: ((b + m) * 255.0).round() as u8,
        a,
    }
}

/// Relative luminance of an sRGB color, in `[0, 1]`.
pub fn srgb_lightness(r: u8, g: u8, b: u8) -> f64 {
    (0.2126 * r as f64 + 0.7152 * g as f64 + 0.0722 * b as f64) / 255.0
}

// https://en.wikipedia.org/wiki/HSL_and_HSV
pub fn rgb_to_hsl(rgb: Rgba) -> Hsla {
    let r = rgb.r as f64 / 255.0;
    let g = rgb.g as f64 / 255.0;
    let b = rgb.b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let c = max - min;
    let l = (max + min) / 2.0;

    if c == 0.0 {
        return Hsla {
            h: 0.0,
            s: 0.0,
            l,
            a: rgb.a,
        };
    }

    let mut h = if max == r {
        ((g - b) / c) % 6.0
    } else if max == g {
        (b - r) / c + 2.0
    } else {
        (r - g) / c + 4.0
    } * 60.0;
    if h < 0.0 {
        h += 360.0;
    }

    let s = c / (1.0 - (2.0 * l - 1.0).abs());

    Hsla { h, s, l, a: rgb.a }
}

// ─── Serialization ───────────────────────────────────────────────────────────

/// Fixed-point formatting with trailing zeros (and a bare trailing dot)
/// trimmed, matching CSS output conventions.
pub fn format_number(n: f64, digits: u32) -> String {
    let factor = 10f64.powi(digits as i32);
    let rounded = (n * factor).round() / factor;
    let mut s = format!("{:.*}", digits as usize, rounded);
    if digits > 0 && s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

pub fn rgb_to_string(rgb: Rgba) -> String {
    let Rgba { r, g, b, a } = rgb;
    if a < 1.0 {
        format!("rgba({r}, {g}, {b}, {})", format_number(a, 2))
    } else {
        format!("rgb({r}, {g}, {b})")
    }
}

pub fn rgb_to_hex_string(rgb: Rgba) -> String {
    let Rgba { r, g, b, a } = rgb;
    if a < 1.0 {
        format!("#{r:02x}{g:02x}{b:02x}{:02x}", (a * 255.0).round() as u8)
    } else {
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

pub fn hsl_to_string(hsl: Hsla) -> String {
    let Hsla { h, s, l, a } = hsl;
    if a < 1.0 {
        format!(
            "hsla({}, {}%, {}%, {})",
            format_number(h, 0),
            format_number(s * 100.0, 0),
            format_number(l * 100.0, 0),
            format_number(a, 2)
        )
    } else {
        format!(
            "hsl({}, {}%, {}%)",
            format_number(h, 0),
            format_number(s * 100.0, 0),
            format_number(l * 100.0, 0)
        )
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parses a CSS color value. Returns `None` for anything unrecognized,
/// including `currentcolor`-class keywords whose value depends on the
/// cascade.
pub fn parse_color(text: &str) -> Option<Rgba> {
    let c = text.trim().to_lowercase();
    if c.is_empty() {
        return None;
    }
    if c == "transparent" {
        return Some(Rgba::TRANSPARENT);
    }

    let c = lower_calc(&c);

    if let Some(hex) = c.strip_prefix('#') {
        return parse_hex(hex);
    }
    if is_flat_function(&c, "rgb") || is_flat_function(&c, "rgba") {
        return parse_rgb(&c);
    }
    if is_flat_function(&c, "hsl") || is_flat_function(&c, "hsla") {
        return parse_hsl(&c);
    }
    if let Some(args) = c.strip_prefix("light-dark(").and_then(|r| r.strip_suffix(')')) {
        return parse_light_dark(args);
    }
    if let Some(&n) = KNOWN_COLORS.get(c.as_str()) {
        return Some(color_from_u32(n));
    }
    if let Some(&n) = SYSTEM_COLORS.get(c.as_str()) {
        return Some(color_from_u32(n));
    }
    None
}

/// True when the value is `name(...)` with no nested parentheses, the
/// only shape the channel splitter understands.
fn is_flat_function(value: &str, name: &str) -> bool {
    let Some(rest) = value.strip_prefix(name) else {
        return false;
    };
    let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
        return false;
    };
    !inner.contains('(') && !inner.contains(')')
}

/// Replaces every `calc(...)` occurrence with its evaluated value.
/// Expressions that do not evaluate keep the original text, which then
/// fails the color parse naturally.
fn lower_calc(value: &str) -> String {
    let mut result = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("calc(") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        let Some(end) = matching_paren(after) else {
            result.push_str(&rest[start..]);
            return result;
        };
        let inner = &after[..end];
        match evaluate_calc_operand(inner) {
            Some(lowered) => result.push_str(&lowered),
            None => {
                result.push_str("calc(");
                result.push_str(inner);
                result.push(')');
            }
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    result
}

/// Byte offset of the parenthesis closing an expression that starts just
/// after an opening one.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 1;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Evaluates a calc body consisting of numbers (optionally all carrying
/// a `%` suffix) and `+ - * /`.
fn evaluate_calc_operand(body: &str) -> Option<String> {
    let has_percent = body.contains('%');
    let stripped = body.replace('%', "");
    if stripped
        .chars()
        .any(|ch| !ch.is_ascii_digit() && !matches!(ch, '.' | '+' | '-' | '*' | '/' | ' '))
    {
        return None;
    }
    let n = evaluate_math(&stripped)?;
    if !n.is_finite() {
        return None;
    }
    let mut out = format_number(n, 3);
    if has_percent {
        out.push('%');
    }
    Some(out)
}

struct ChannelUnit {
    suffix: &'static str,
    divisor: f64,
}

/// Splits `name(a, b, c / d)`-shaped text into channel numbers, scaling
/// unit-suffixed entries into each channel's range and rounding channels
/// whose range exceeds one.
fn channel_numbers(value: &str, ranges: &[f64], units: &[ChannelUnit]) -> Option<Vec<f64>> {
    let inner = value
        .find('(')
        .map(|i| &value[i + 1..value.len() - 1])?;
    let mut numbers = Vec::new();
    for (i, raw) in inner
        .split(|ch: char| ch == ',' || ch == '/' || ch.is_whitespace())
        .filter(|x| !x.is_empty())
        .enumerate()
    {
        let range = *ranges.get(i)?;
        let n = match units.iter().find(|u| raw.ends_with(u.suffix)) {
            Some(unit) => {
                let number: f64 = raw[..raw.len() - unit.suffix.len()].parse().ok()?;
                number / unit.divisor * range
            }
            None => raw.parse().ok()?,
        };
        numbers.push(if range > 1.0 { n.round() } else { n });
    }
    Some(numbers)
}

const RGB_RANGES: [f64; 4] = [255.0, 255.0, 255.0, 1.0];
const RGB_UNITS: [ChannelUnit; 1] = [ChannelUnit {
    suffix: "%",
    divisor: 100.0,
}];

fn parse_rgb(value: &str) -> Option<Rgba> {
    let numbers = channel_numbers(value, &RGB_RANGES, &RGB_UNITS)?;
    if numbers.len() < 3 {
        return None;
    }
    let channel = |n: f64| -> Option<u8> {
        if (0.0..=255.0).contains(&n) {
            Some(n as u8)
        } else {
            None
        }
    };
    Some(Rgba {
        r: channel(numbers[0])?,
        g: channel(numbers[1])?,
        b: channel(numbers[2])?,
        a: numbers.get(3).copied().unwrap_or(1.0),
    })
}

const HSL_RANGES: [f64; 4] = [360.0, 1.0, 1.0, 1.0];
const HSL_UNITS: [ChannelUnit; 4] = [
    ChannelUnit {
        suffix: "%",
        divisor: 100.0,
    },
    ChannelUnit {
        suffix: "deg",
        divisor: 360.0,
    },
    ChannelUnit {
        suffix: "rad",
        divisor: std::f64::consts::TAU,
    },
    ChannelUnit {
        suffix: "turn",
        divisor: 1.0,
    },
];

fn parse_hsl(value: &str) -> Option<Rgba> {
    let numbers = channel_numbers(value, &HSL_RANGES, &HSL_UNITS)?;
    if numbers.len() < 3 {
        return None;
    }
    let mut h = numbers[0] % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    let s = numbers[1];
    let l = numbers[2];
    if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&l) {
        return None;
    }
    Some(hsl_to_rgb(Hsla {
        h,
        s,
        l,
        a: numbers.get(3).copied().unwrap_or(1.0),
    }))
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1].repeat(2), 16).ok();
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 | 4 => Some(Rgba {
            r: nibble(0)?,
            g: nibble(1)?,
            b: nibble(2)?,
            a: if hex.len() == 3 {
                1.0
            } else {
                nibble(3)? as f64 / 255.0
            },
        }),
        6 | 8 => Some(Rgba {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 6 {
                1.0
            } else {
                byte(6)? as f64 / 255.0
            },
        }),
        _ => None,
    }
}

/// `light-dark(a, b)` resolves by the host system's current scheme.
fn parse_light_dark(args: &str) -> Option<Rgba> {
    let mut depth = 0usize;
    let mut split = None;
    for (i, ch) in args.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                split = Some(i);
                break;
            }
            _ => {}
        }
    }
    let split = split?;
    let (light, dark) = (&args[..split], &args[split + 1..]);
    if system_prefers_dark() {
        parse_color(dark)
    } else {
        parse_color(light)
    }
}

fn system_prefers_dark() -> bool {
    matches!(dark_light::detect(), Ok(dark_light::Mode::Dark))
}

fn color_from_u32(n: u32) -> Rgba {
    Rgba {
        r: ((n >> 16) & 255) as u8,
        g: ((n >> 8) & 255) as u8,
        b: (n & 255) as u8,
        a: 1.0,
    }
}

// ─── Parse cache ─────────────────────────────────────────────────────────────

/// Session-scoped memo for [`parse_color`], keyed by trimmed input text.
/// Negative results are cached too: a page repeating an unparsable value
/// pays for it once.
#[derive(Default)]
pub struct ColorParseCache {
    entries: HashMap<String, Option<Rgba>>,
}

impl ColorParseCache {
    pub fn new() -> ColorParseCache {
        ColorParseCache::default()
    }

    pub fn parse(&mut self, text: &str) -> Option<Rgba> {
        let key = text.trim();
        if let Some(cached) = self.entries.get(key) {
            return *cached;
        }
        let parsed = parse_color(key);
        self.entries.insert(key.to_string(), parsed);
        parsed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ─── Color name tables ───────────────────────────────────────────────────────

static KNOWN_COLORS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("aliceblue", 0xf0f8ff),
        ("antiquewhite", 0xfaebd7),
        ("aqua", 0x00ffff),
        ("aquamarine", 0x7fffd4),
        ("azure", 0xf0ffff),
        ("beige", 0xf5f5dc),
        ("bisque", 0xffe4c4),
        ("black", 0x000000),
        ("blanchedalmond", 0xffebcd),
        ("blue", 0x0000ff),
        ("blueviolet", 0x8a2be2),
        ("brown", 0xa52a2a),
        ("burlywood", 0xdeb887),
        ("cadetblue", 0x5f9ea0),
        ("chartreuse", 0x7fff00),
        ("chocolate", 0xd2691e),
        ("coral", 0xff7f50),
        ("cornflowerblue", 0x6495ed),
        ("cornsilk", 0xfff8dc),
        ("crimson", 0xdc143c),
        ("cyan", 0x00ffff),
        ("darkblue", 0x00008b),
        ("darkcyan", 0x008b8b),
        ("darkgoldenrod", 0xb8860b),
        ("darkgray", 0xa9a9a9),
        ("darkgrey", 0xa9a9a9),
        ("darkgreen", 0x006400),
        ("darkkhaki", 0xbdb76b),
        ("darkmagenta", 0x8b008b),
        ("darkolivegreen", 0x556b2f),
        ("darkorange", 0xff8c00),
        ("darkorchid", 0x9932cc),
        ("darkred", 0x8b0000),
        ("darksalmon", 0xe9967a),
        ("darkseagreen", 0x8fbc8f),
        ("darkslateblue", 0x483d8b),
        ("darkslategray", 0x2f4f4f),
        ("darkslategrey", 0x2f4f4f),
        ("darkturquoise", 0x00ced1),
        ("darkviolet", 0x9400d3),
        ("deeppink", 0xff1493),
        ("deepskyblue", 0x00bfff),
        ("dimgray", 0x696969),
        ("dimgrey", 0x696969),
        ("dodgerblue", 0x1e90ff),
        ("firebrick", 0xb22222),
        ("floralwhite", 0xfffaf0),
        ("forestgreen", 0x228b22),
        ("fuchsia", 0xff00ff),
        ("gainsboro", 0xdcdcdc),
        ("ghostwhite", 0xf8f8ff),
        ("gold", 0xffd700),
        ("goldenrod", 0xdaa520),
        ("gray", 0x808080),
        ("grey", 0x808080),
        ("green", 0x008000),
        ("greenyellow", 0xadff2f),
        ("honeydew", 0xf0fff0),
        ("hotpink", 0xff69b4),
        ("indianred", 0xcd5c5c),
        ("indigo", 0x4b0082),
        ("ivory", 0xfffff0),
        ("khaki", 0xf0e68c),
        ("lavender", 0xe6e6fa),
        ("lavenderblush", 0xfff0f5),
        ("lawngreen", 0x7cfc00),
        ("lemonchiffon", 0xfffacd),
        ("lightblue", 0xadd8e6),
        ("lightcoral", 0xf08080),
        ("lightcyan", 0xe0ffff),
        ("lightgoldenrodyellow", 0xfafad2),
        ("lightgray", 0xd3d3d3),
        ("lightgrey", 0xd3d3d3),
        ("lightgreen", 0x90ee90),
        ("lightpink", 0xffb6c1),
        ("lightsalmon", 0xffa07a),
        ("lightseagreen", 0x20b2aa),
        ("lightskyblue", 0x87cefa),
        ("lightslategray", 0x778899),
        ("lightslategrey", 0x778899),
        ("lightsteelblue", 0xb0c4de),
        ("lightyellow", 0xffffe0),
        ("lime", 0x00ff00),
        ("limegreen", 0x32cd32),
        ("linen", 0xfaf0e6),
        ("magenta", 0xff00ff),
        ("maroon", 0x800000),
        ("mediumaquamarine", 0x66cdaa),
        ("mediumblue", 0x0000cd),
        ("mediumorchid", 0xba55d3),
        ("mediumpurple", 0x9370db),
        ("mediumseagreen", 0x3cb371),
        ("mediumslateblue", 0x7b68ee),
        ("mediumspringgreen", 0x00fa9a),
        ("mediumturquoise", 0x48d1cc),
        ("mediumvioletred", 0xc71585),
        ("midnightblue", 0x191970),
        ("mintcream", 0xf5fffa),
        ("mistyrose", 0xffe4e1),
        ("moccasin", 0xffe4b5),
        ("navajowhite", 0xffdead),
        ("navy", 0x000080),
        ("oldlace", 0xfdf5e6),
        ("olive", 0x808000),
        ("olivedrab", 0x6b8e23),
        ("orange", 0xffa500),
        ("orangered", 0xff4500),
        ("orchid", 0xda70d6),
        ("palegoldenrod", 0xeee8aa),
        ("palegreen", 0x98fb98),
        ("paleturquoise", 0xafeeee),
        ("palevioletred", 0xdb7093),
        ("papayawhip", 0xffefd5),
        ("peachpuff", 0xffdab9),
        ("peru", 0xcd853f),
        ("pink", 0xffc0cb),
        ("plum", 0xdda0dd),
        ("powderblue", 0xb0e0e6),
        ("purple", 0x800080),
        ("rebeccapurple", 0x663399),
        ("red", 0xff0000),
        ("rosybrown", 0xbc8f8f),
        ("royalblue", 0x4169e1),
        ("saddlebrown", 0x8b4513),
        ("salmon", 0xfa8072),
        ("sandybrown", 0xf4a460),
        ("seagreen", 0x2e8b57),
        ("seashell", 0xfff5ee),
        ("sienna", 0xa0522d),
        ("silver", 0xc0c0c0),
        ("skyblue", 0x87ceeb),
        ("slateblue", 0x6a5acd),
        ("slategray", 0x708090),
        ("slategrey", 0x708090),
        ("snow", 0xfffafa),
        ("springgreen", 0x00ff7f),
        ("steelblue", 0x4682b4),
        ("tan", 0xd2b48c),
        ("teal", 0x008080),
        ("thistle", 0xd8bfd8),
        ("tomato", 0xff6347),
        ("turquoise", 0x40e0d0),
        ("violet", 0xee82ee),
        ("wheat", 0xf5deb3),
        ("white", 0xffffff),
        ("whitesmoke", 0xf5f5f5),
        ("yellow", 0xffff00),
        ("yellowgreen", 0x9acd32),
    ])
});

static SYSTEM_COLORS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("activeborder", 0x3b99fc),
        ("activecaption", 0x000000),
        ("appworkspace", 0xaaaaaa),
        ("background", 0x6363ce),
        ("buttonface", 0xffffff),
        ("buttonhighlight", 0xe9e9e9),
        ("buttonshadow", 0x9fa09f),
        ("buttontext", 0x000000),
        ("captiontext", 0x000000),
        ("graytext", 0x7f7f7f),
        ("highlight", 0xb2d7ff),
        ("highlighttext", 0x000000),
        ("inactiveborder", 0xffffff),
        ("inactivecaption", 0xffffff),
        ("inactivecaptiontext", 0x000000),
        ("infobackground", 0xfbfcc5),
        ("infotext", 0x000000),
        ("menu", 0xf6f6f6),
        ("menutext", 0xffffff),
        ("scrollbar", 0xaaaaaa),
        ("threeddarkshadow", 0x000000),
        ("threedface", 0xc0c0c0),
        ("threedhighlight", 0xffffff),
        ("threedlightshadow", 0xffffff),
        ("threedshadow", 0x000000),
        ("window", 0xececec),
        ("windowframe", 0xaaaaaa),
        ("windowtext", 0x000000),
        ("-webkit-focus-ring-color", 0xe59700),
    ])
});
