//! Image classification for background-image theming.
//!
//! # Motivation
//!
//! Whether a background image should be hidden, inverted, dimmed or
//! left alone depends on what the bitmap looks like. The analyzer
//! downsamples each image and derives a handful of booleans that the
//! declaration modifier turns into a strategy.
//!
//! # Design
//!
//! Image bytes come through an injectable [`ImageSource`], so the
//! engine never talks to the network itself. Details are computed once
//! per URL and cached for the session. Oversized images skip pixel
//! analysis entirely and are flagged `is_too_large`.

use std::collections::HashMap;
use std::rc::Rc;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use umbra_color::{create_filter_matrix, srgb_lightness, Theme};

use crate::error::FetchError;

/// Decoded image handed to the analyzer.
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// RGBA bytes, row-major, `width * height * 4` long.
    pub rgba: Vec<u8>,
    /// Data URL form of the original bytes, re-embedded in output CSS.
    pub data_url: String,
}

/// Provider of decoded images. The host wires this to whatever fetch
/// and decode channel it has.
pub trait ImageSource {
    fn load(&self, url: &str) -> Result<SourceImage, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDetails {
    pub src: String,
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub is_dark: bool,
    pub is_light: bool,
    pub is_transparent: bool,
    pub is_large: bool,
    pub is_too_large: bool,
}

const MAX_ANALYSIS_PIXELS_COUNT: u32 = 32 * 32;
const LARGE_IMAGE_PIXELS_COUNT: u32 = 800 * 600;
const MAX_IMAGE_BYTES_ESTIMATE: u64 = 5 * 1024 * 1024;

const TRANSPARENT_ALPHA_THRESHOLD: f64 = 0.05;
const DARK_LIGHTNESS_THRESHOLD: f64 = 0.4;
const LIGHT_LIGHTNESS_THRESHOLD: f64 = 0.7;

const DARK_IMAGE_THRESHOLD: f64 = 0.7;
const LIGHT_IMAGE_THRESHOLD: f64 = 0.7;
const TRANSPARENT_IMAGE_THRESHOLD: f64 = 0.1;

/// Session-scoped analyzer: a source plus a details cache.
pub struct ImageAnalyzer {
    source: Rc<dyn ImageSource>,
    cache: HashMap<String, ImageDetails>,
}

impl ImageAnalyzer {
    pub fn new(source: Rc<dyn ImageSource>) -> ImageAnalyzer {
        ImageAnalyzer {
            source,
            cache: HashMap::new(),
        }
    }

    /// Details for `url`, computed on first request and cached.
    pub fn image_details(&mut self, url: &str) -> Result<ImageDetails, FetchError> {
        if let Some(details) = self.cache.get(url) {
            return Ok(details.clone());
        }
        let image = self.source.load(url)?;
        let details = analyze_image(url, &image);
        self.cache.insert(url.to_string(), details.clone());
        Ok(details)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

fn analyze_image(url: &str, image: &SourceImage) -> ImageDetails {
    let (width, height) = (image.width, image.height);
    let mut details = ImageDetails {
        src: url.to_string(),
        data_url: String::new(),
        width,
        height,
        is_dark: false,
        is_light: false,
        is_transparent: false,
        is_large: false,
        is_too_large: false,
    };
    if width == 0 || height == 0 {
        log::warn!("image is empty: {url}");
        return details;
    }

    // Estimated decoded size; anything this big is not worth scanning.
    let estimated_bytes = width as u64 * height as u64 * 4;
    if estimated_bytes > MAX_IMAGE_BYTES_ESTIMATE {
        details.is_too_large = true;
        return details;
    }

    details.is_large = width * height >= LARGE_IMAGE_PIXELS_COUNT;

    let source_pixels = (width * height) as f64;
    let k = (MAX_ANALYSIS_PIXELS_COUNT as f64 / source_pixels).sqrt().min(1.0);
    let sample_width = (width as f64 * k).ceil() as u32;
    let sample_height = (height as f64 * k).ceil() as u32;

    let mut transparent_pixels = 0u32;
    let mut dark_pixels = 0u32;
    let mut light_pixels = 0u32;

    for y in 0..sample_height {
        for x in 0..sample_width {
            // Nearest-neighbor sample of the source pixel.
            let sx = (x as f64 / k) as u32;
            let sy = (y as f64 / k) as u32;
            let i = 4 * (sy.min(height - 1) * width + sx.min(width - 1)) as usize;
            let (r, g, b, a) = (
                image.rgba[i],
                image.rgba[i + 1],
                image.rgba[i + 2],
                image.rgba[i + 3],
            );
            if (a as f64 / 255.0) < TRANSPARENT_ALPHA_THRESHOLD {
                transparent_pixels += 1;
            } else {
                let l = srgb_lightness(r, g, b);
                if l < DARK_LIGHTNESS_THRESHOLD {
                    dark_pixels += 1;
                }
                if l > LIGHT_LIGHTNESS_THRESHOLD {
                    light_pixels += 1;
                }
            }
        }
    }

    let total_pixels = sample_width * sample_height;
    let opaque_pixels = total_pixels - transparent_pixels;

    details.is_dark =
        opaque_pixels > 0 && dark_pixels as f64 / opaque_pixels as f64 >= DARK_IMAGE_THRESHOLD;
    details.is_light =
        opaque_pixels > 0 && light_pixels as f64 / opaque_pixels as f64 >= LIGHT_IMAGE_THRESHOLD;
    details.is_transparent =
        transparent_pixels as f64 / total_pixels as f64 >= TRANSPARENT_IMAGE_THRESHOLD;
    details.data_url = if details.is_large {
        String::new()
    } else {
        image.data_url.clone()
    };
    details
}

/// Wraps the original image in an SVG that applies the theme's color
/// matrix, returned as a UTF-8 data URL.
pub fn get_filtered_image_data_url(details: &ImageDetails, theme: &Theme) -> String {
    let matrix = create_filter_matrix(theme);
    // feColorMatrix takes the first four rows of the 5x5 matrix.
    let values = matrix[..4]
        .iter()
        .flat_map(|row| row.iter())
        .map(|v| format!("{v:.3}"))
        .collect::<Vec<_>>()
        .join(" ");
    let data_url = escape_xml(&details.data_url);
    let svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
         width=\"{w}\" height=\"{h}\">\
         <defs><filter id=\"darkreader-image-filter\">\
         <feColorMatrix type=\"matrix\" values=\"{values}\" />\
         </filter></defs>\
         <image width=\"{w}\" height=\"{h}\" filter=\"url(#darkreader-image-filter)\" \
         xlink:href=\"{data_url}\" /></svg>",
        w = details.width,
        h = details.height,
    );
    format!(
        "data:image/svg+xml;utf8,{}",
        utf8_percent_encode(&svg, NON_ALPHANUMERIC)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
