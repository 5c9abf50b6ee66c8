//! Registered color palette.
//!
//! Rules across a page frequently share a handful of source colors. The
//! palette assigns each (role, source color) pair one generated custom
//! property, so every rule resolves to `var(--darkreader-<role>-<hex>,
//! <computed>)` and a palette-only theme change can be applied by
//! re-emitting the variable block instead of re-rendering every manager.

use std::collections::BTreeMap;

use crate::color::{rgb_to_hex_string, Rgba};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PaletteRole {
    Background,
    Text,
    Border,
}

impl PaletteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaletteRole::Background => "background",
            PaletteRole::Text => "text",
            PaletteRole::Border => "border",
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredColor {
    parsed: Rgba,
    background: Option<(String, String)>,
    text: Option<(String, String)>,
    border: Option<(String, String)>,
}

impl RegisteredColor {
    fn slot(&self, role: PaletteRole) -> &Option<(String, String)> {
        match role {
            PaletteRole::Background => &self.background,
            PaletteRole::Text => &self.text,
            PaletteRole::Border => &self.border,
        }
    }

    fn slot_mut(&mut self, role: PaletteRole) -> &mut Option<(String, String)> {
        match role {
            PaletteRole::Background => &mut self.background,
            PaletteRole::Text => &mut self.text,
            PaletteRole::Border => &mut self.border,
        }
    }
}

/// Session-scoped registry from canonical source hex to per-role custom
/// properties. Iteration order is the hex order, keeping the emitted
/// variable block stable across renders.
#[derive(Default)]
pub struct ColorPalette {
    registered: BTreeMap<String, RegisteredColor>,
}

fn var_reference(variable: &str, value: &str) -> String {
    format!("var({variable}, {value})")
}

impl ColorPalette {
    pub fn new() -> ColorPalette {
        ColorPalette::default()
    }

    /// Previously registered reference for this (role, color), if any.
    pub fn get_registered(&self, role: PaletteRole, parsed: Rgba) -> Option<String> {
        let hex = rgb_to_hex_string(parsed);
        let slot = self.registered.get(&hex)?.slot(role);
        slot.as_ref()
            .map(|(variable, value)| var_reference(variable, value))
    }

    /// Registers a computed value and returns the `var()` reference that
    /// should replace it in output CSS.
    pub fn register(&mut self, role: PaletteRole, parsed: Rgba, value: String) -> String {
        let hex = rgb_to_hex_string(parsed);
        let variable = format!("--darkreader-{}-{}", role.as_str(), hex.trim_start_matches('#'));
        let entry = self
            .registered
            .entry(hex)
            .or_insert_with(|| RegisteredColor {
                parsed,
                background: None,
                text: None,
                border: None,
            });
        let reference = var_reference(&variable, &value);
        *entry.slot_mut(role) = Some((variable, value));
        reference
    }

    /// All `(variable, value)` pairs for the `:root` variables block.
    pub fn declarations(&self) -> Vec<(String, String)> {
        let mut declarations = Vec::new();
        for registered in self.registered.values() {
            for role in [PaletteRole::Background, PaletteRole::Text, PaletteRole::Border] {
                if let Some((variable, value)) = registered.slot(role) {
                    declarations.push((variable.clone(), value.clone()));
                }
            }
        }
        declarations
    }

    /// Source colors registered for a role.
    pub fn colors(&self, role: PaletteRole) -> Vec<Rgba> {
        self.registered
            .values()
            .filter(|r| r.slot(role).is_some())
            .map(|r| r.parsed)
            .collect()
    }

    pub fn clear(&mut self) {
        self.registered.clear();
    }
}
