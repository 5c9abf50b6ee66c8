//! # Umbra - Dynamic Page Theming Engine
//!
//! Umbra rewrites a page's stylesheets in real time into a dark (or
//! otherwise adjusted) theme. It provides:
//!
//! - **Per-sheet rewriting** that mirrors every managed stylesheet into
//!   an override sheet with themed colors, gradients and shadows
//! - **Static overrides** for user-agent defaults, fallback flash
//!   protection, text options and per-site inversion filters
//! - **CSS variable tracking** across custom property declarations and
//!   their dependents
//! - **Image classification** so background images are hidden, dimmed
//!   or inverted based on what the bitmap looks like
//! - **Site fixes** merged from a configuration list keyed by URL
//!
//! The engine is **host-agnostic**: documents come in through the
//! arena DOM in `umbra-dom`, stylesheet text and image bytes arrive
//! through the [`TextSource`] and [`ImageSource`] seams, and time moves
//! only when the host calls [`ThemingSession::tick`].
//!
//! ## Core Concepts
//!
//! - [`ThemingSession`]: One themed document; owns the override nodes,
//!   per-sheet managers, caches and the mutation watcher
//! - [`Theme`]: Snapshot of every knob that affects color output
//! - [`DynamicThemeFix`]: Per-site adjustments selected by URL pattern
//! - [`export_css`]: Every active override folded into one readable
//!   CSS document for diagnostics
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use umbra::{export_css, DynamicThemeFix, FetchError, ThemingSession};
//! use umbra::{Document, Theme};
//!
//! // A host that never fetches; real hosts wire these to their
//! // privileged transport.
//! struct NoFetch;
//!
//! impl umbra::TextSource for NoFetch {
//!     fn load(&self, url: &str) -> Result<String, FetchError> {
//!         Err(FetchError::NotFound(url.to_string()))
//!     }
//! }
//!
//! impl umbra::ImageSource for NoFetch {
//!     fn load(&self, url: &str) -> Result<umbra::SourceImage, FetchError> {
//!         Err(FetchError::NotFound(url.to_string()))
//!     }
//! }
//!
//! let mut document = Document::new();
//! document.url = Some("https://example.com/".to_string());
//! let style = document.create_element("style");
//! document.set_text(style, "body { color: black; }");
//! let head = document.head();
//! document.append_child(head, style);
//!
//! let mut session = ThemingSession::new(Rc::new(NoFetch), Rc::new(NoFetch));
//! let fix = DynamicThemeFix {
//!     url: vec!["*".to_string()],
//!     ..DynamicThemeFix::default()
//! };
//! session.create_or_update_dynamic_theme(&mut document, &Theme::default(), &[fix], false);
//!
//! let css = export_css(&session, &document);
//! assert!(css.contains("--darkreader-text-000000"));
//! ```

pub mod error;
pub mod export;
pub mod fixes;
pub mod image;
pub mod manager;
pub mod modify;
pub mod session;
pub mod sheet;
pub mod static_styles;
pub mod variables;
pub mod watch;

pub use error::FetchError;
pub use export::export_css;
pub use fixes::{combine_fixes, find_relevant_fix, DynamicThemeFix};
pub use image::{ImageDetails, ImageSource, SourceImage};
pub use manager::TextSource;
pub use session::ThemingSession;

pub use umbra_color::{ColorCorrection, Theme, ThemeMode};
pub use umbra_dom::Document;
