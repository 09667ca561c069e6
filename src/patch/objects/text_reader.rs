use crate::patch::file_ops::{AsyncFileResult, FileOp};
use crate::patch::object::{DrawContext, InputContext, PatchObject, UpdateContext};
use crate::patch::payload::Payload;
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::NamedVars;
use std::path::PathBuf;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("path", PayloadKind::Text),
    PortDescriptor::outlet("text", PayloadKind::Text),
    PortDescriptor::outlet("lines", PayloadKind::Numeric),
];

const LINES: &str = "LINES";

/// Loads a text file whenever the path on its inlet changes.
///
/// The read happens off-thread; the contents arrive at the top of a later
/// tick.
#[derive(Debug, Default)]
pub struct TextReaderObject {
    requested: Option<PathBuf>,
    status: String,
}

impl TextReaderObject {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatchObject for TextReaderObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(LINES, 0.0);
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let path = ctx.inlets[0].with(|p| p.as_text().unwrap_or_default().trim().to_string());
        if path.is_empty() {
            return;
        }
        let path = PathBuf::from(path);
        if self.requested.as_ref() == Some(&path) {
            return;
        }
        tracing::debug!("Text reader {} loading {:?}", ctx.id, path);
        ctx.open_file(path.clone());
        self.requested = Some(path);
        self.status = "loading".into();
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        ctx.surface.text(ctx.rect.origin.offset(6.0, 8.0), &self.status);
    }

    fn on_async_file_result(&mut self, result: AsyncFileResult, ctx: &mut InputContext) {
        if result.op != FileOp::Open || self.requested.as_ref() != Some(&result.path) {
            return;
        }
        match result.outcome {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let lines = text.lines().count() as f32;
                ctx.vars.set(LINES, lines);
                ctx.outlets[0].set(Payload::Text(text));
                ctx.outlets[1].set_float(lines);
                self.status = format!("{} lines", lines);
            }
            Err(e) => {
                tracing::warn!("Text reader {} failed to read {:?}: {}", ctx.id, result.path, e);
                self.status = "read failed".into();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::id::ObjectId;
    use crate::patch::payload::Outlet;
    use crate::types::{Rect, Vec2};

    #[test]
    fn test_result_for_stale_path_is_ignored() {
        let mut reader = TextReaderObject::new();
        reader.requested = Some(PathBuf::from("/a.txt"));
        let outlets: Vec<Outlet> = PORTS[1..].iter().map(Outlet::new).collect();
        let mut vars = NamedVars::new();
        let mut ctx = InputContext {
            id: ObjectId(3),
            rect: Rect::new(Vec2::ZERO, Vec2::new(10.0, 10.0)),
            outlets: &outlets,
            vars: &mut vars,
        };

        let stale = AsyncFileResult {
            op: FileOp::Open,
            path: PathBuf::from("/b.txt"),
            outcome: Ok(b"old".to_vec()),
        };
        reader.on_async_file_result(stale, &mut ctx);
        assert_eq!(outlets[0].read().as_text(), Some(""));

        let fresh = AsyncFileResult {
            op: FileOp::Open,
            path: PathBuf::from("/a.txt"),
            outcome: Ok(b"one\ntwo\n".to_vec()),
        };
        reader.on_async_file_result(fresh, &mut ctx);
        assert_eq!(outlets[0].read().as_text(), Some("one\ntwo\n"));
        assert_eq!(outlets[1].read().as_float(), Some(2.0));
    }
}
