use crate::patch::object::{DrawContext, PatchObject, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::{NamedVars, Vec2};

use super::numeric_input;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("in", PayloadKind::Numeric),
    PortDescriptor::outlet("out", PayloadKind::Numeric),
];

const VALUE: &str = "NUMBER";

/// Constant number box. A linked inlet overrides the stored value.
#[derive(Debug, Default)]
pub struct NumberObject {
    shown: f32,
}

impl NumberObject {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatchObject for NumberObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn default_size(&self) -> Vec2 {
        Vec2::new(80.0, 30.0)
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(VALUE, 0.0);
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let value = numeric_input(&ctx.inlets[0], ctx.vars, VALUE, 0.0);
        ctx.outlets[0].set_float(value);
        self.shown = value;
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        ctx.surface
            .text(ctx.rect.origin.offset(6.0, 8.0), &format!("{:.3}", self.shown));
    }
}
