use crate::patch::draw::Color;
use crate::patch::object::{Capabilities, DrawContext, InputContext, PatchObject, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::{NamedVars, Rect, Vec2};

static PORTS: &[PortDescriptor] = &[PortDescriptor::outlet("value", PayloadKind::Numeric)];

const VALUE: &str = "VALUE";
const MIN: &str = "MIN";
const MAX: &str = "MAX";

const TRACK: Color = [40, 40, 48, 255];
const HANDLE: Color = [230, 160, 40, 255];
const HANDLE_HOVER: Color = [255, 200, 90, 255];

/// Interactive horizontal slider.
///
/// Dragging inside the box sets the value; dragging from outside moves the
/// box on the canvas.
#[derive(Debug, Default)]
pub struct SliderObject {
    hovered: bool,
}

impl SliderObject {
    pub fn new() -> Self {
        Self::default()
    }

    fn range(vars: &NamedVars) -> (f32, f32) {
        (vars.get_or(MIN, 0.0), vars.get_or(MAX, 1.0))
    }
}

impl PatchObject for SliderObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn default_size(&self) -> Vec2 {
        Vec2::new(160.0, 24.0)
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(VALUE, 0.0);
        vars.set(MIN, 0.0);
        vars.set(MAX, 1.0);
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::interactive()
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let (min, max) = Self::range(ctx.vars);
        let value = ctx.vars.get_or(VALUE, min).clamp(min.min(max), max.max(min));
        ctx.outlets[0].set_float(value);
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        let (min, max) = Self::range(ctx.vars);
        let value = ctx.vars.get_or(VALUE, min);
        let t = if max > min { (value - min) / (max - min) } else { 0.0 };

        ctx.surface.fill_rect(ctx.rect, TRACK);
        let handle = Rect::new(
            ctx.rect.origin,
            Vec2::new(ctx.rect.size.x * t.clamp(0.0, 1.0), ctx.rect.size.y),
        );
        ctx.surface
            .fill_rect(handle, if self.hovered { HANDLE_HOVER } else { HANDLE });
    }

    fn on_pointer_moved(&mut self, pos: Vec2, ctx: &mut InputContext) {
        self.hovered = ctx.rect.contains(pos);
    }

    fn on_dragged(&mut self, pos: Vec2, ctx: &mut InputContext) -> bool {
        if !ctx.rect.contains(pos) || ctx.rect.size.x <= 0.0 {
            return false;
        }
        let (min, max) = Self::range(ctx.vars);
        let t = ((pos.x - ctx.rect.origin.x) / ctx.rect.size.x).clamp(0.0, 1.0);
        let value = min + t * (max - min);
        ctx.vars.set(VALUE, value);
        ctx.outlets[0].set_float(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::id::ObjectId;
    use crate::patch::payload::Outlet;

    #[test]
    fn test_drag_inside_sets_value() {
        let mut slider = SliderObject::new();
        let outlets = vec![Outlet::new(&PORTS[0])];
        let mut vars = NamedVars::new();
        slider.init_vars(&mut vars);
        vars.set(MAX, 10.0);

        let mut ctx = InputContext {
            id: ObjectId(1),
            rect: Rect::new(Vec2::ZERO, Vec2::new(100.0, 20.0)),
            outlets: &outlets,
            vars: &mut vars,
        };
        assert!(slider.on_dragged(Vec2::new(25.0, 10.0), &mut ctx));
        assert_eq!(vars.get(VALUE), Some(2.5));
        assert_eq!(outlets[0].read().as_float(), Some(2.5));
    }

    #[test]
    fn test_drag_outside_is_not_consumed() {
        let mut slider = SliderObject::new();
        let outlets = vec![Outlet::new(&PORTS[0])];
        let mut vars = NamedVars::new();
        let mut ctx = InputContext {
            id: ObjectId(1),
            rect: Rect::new(Vec2::ZERO, Vec2::new(100.0, 20.0)),
            outlets: &outlets,
            vars: &mut vars,
        };
        assert!(!slider.on_dragged(Vec2::new(150.0, 10.0), &mut ctx));
    }
}
