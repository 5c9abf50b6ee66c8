//! Document substrate for the umbra theming engine.
//!
//! An arena-backed document model with shadow roots, a `cssparser`
//! based CSS object model, a publish/subscribe event bus for document
//! mutations and a manually driven frame scheduler. The engine crate
//! builds style management on top of these.

pub mod cssom;
pub mod document;
pub mod events;
pub mod scheduler;

pub use cssom::{
    iterate_css_rules, media_query_is_relevant, parse_stylesheet_text, CssDeclaration, CssRule,
    CssStyleRule,
};
pub use document::{Document, NodeId};
pub use events::{DomEvent, EventBus, SubscriptionId};
pub use scheduler::{CancellationToken, FrameScheduler, Throttled, FRAME_DURATION};
