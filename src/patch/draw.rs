//! Drawing seam between patch objects and whatever renders the canvas.
//!
//! The widget toolkit lives outside this crate; objects only see a
//! `DrawSurface`. The headless host draws into a `NullSurface`.

use crate::types::{Rect, Vec2};

/// RGBA8 color.
pub type Color = [u8; 4];

/// Minimal immediate-mode drawing interface handed to `draw_content`.
pub trait DrawSurface {
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn line(&mut self, from: Vec2, to: Vec2, color: Color);
    fn text(&mut self, pos: Vec2, text: &str);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSurface;

impl DrawSurface for NullSurface {
    fn fill_rect(&mut self, _rect: Rect, _color: Color) {}
    fn line(&mut self, _from: Vec2, _to: Vec2, _color: Color) {}
    fn text(&mut self, _pos: Vec2, _text: &str) {}
}

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect(Rect, Color),
    Line(Vec2, Vec2, Color),
    Text(Vec2, String),
}

/// Keeps every draw call, for tests and offline inspection.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text(_, t) => Some(t.as_str()),
            _ => None,
        })
    }
}

impl DrawSurface for RecordingSurface {
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect(rect, color));
    }

    fn line(&mut self, from: Vec2, to: Vec2, color: Color) {
        self.commands.push(DrawCommand::Line(from, to, color));
    }

    fn text(&mut self, pos: Vec2, text: &str) {
        self.commands.push(DrawCommand::Text(pos, text.to_string()));
    }
}
