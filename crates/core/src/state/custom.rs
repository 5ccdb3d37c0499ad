use super::{AnnotationState, PointerInput};
use crate::annotation::ImagePoint;
use crate::canvas::CanvasHandle;
use crate::engine::EngineContext;
use crate::factory::AnnotationObjectFactory;
use crate::input::KeyEvent;
use std::rc::Rc;

/// Shape being dragged out by one button
struct DraftShape {
    handle: CanvasHandle,
    origin: ImagePoint,
    factory: Rc<dyn AnnotationObjectFactory>,
    is_left: bool,
}

/// Drag-to-create mode using the factory of the pressed button's preset
#[derive(Default)]
pub struct CustomCreateState {
    drafts: Vec<DraftShape>,
}

impl std::fmt::Debug for CustomCreateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCreateState").field("drafts", &self.drafts.len()).finish()
    }
}

impl CustomCreateState {
    pub const ID: &'static str = "custom";

    fn take_draft(&mut self, is_left: bool) -> Option<DraftShape> {
        let index = self.drafts.iter().position(|draft| draft.is_left == is_left)?;
        Some(self.drafts.remove(index))
    }

    fn discard_all(&mut self, ctx: &mut EngineContext) {
        for draft in self.drafts.drain(..) {
            ctx.delete_helper(draft.handle);
        }
    }
}

impl AnnotationState for CustomCreateState {
    fn id(&self) -> &str {
        Self::ID
    }

    fn icon(&self) -> &str {
        "format_shapes"
    }

    fn description(&self) -> &str {
        "create annotations manually"
    }

    fn handle_click_down(&mut self, ctx: &mut EngineContext, input: &PointerInput) {
        let (Some(factory), Some(options)) = (input.factory.clone(), ctx.annotation_options(input.is_left)) else {
            ctx.abort_click(input.is_left, true);
            return;
        };
        if let Some(stale) = self.take_draft(input.is_left) {
            ctx.delete_helper(stale.handle);
        }
        let helper = factory.init_create(input.point, &options);
        let handle = ctx.add_helper(helper);
        self.drafts.push(DraftShape { handle, origin: input.point, factory, is_left: input.is_left });
    }

    fn handle_mouse_move(&mut self, ctx: &mut EngineContext, point: ImagePoint) {
        for draft in &self.drafts {
            if let Some(helper) = ctx.helper_mut(draft.handle) {
                draft.factory.update_create(helper, draft.origin, point);
            }
        }
    }

    /// Presses shorter than the factory's drag requirement discard the shape
    fn handle_click_up(&mut self, ctx: &mut EngineContext, input: &PointerInput) -> bool {
        if input.factory.is_none() {
            return false;
        }
        let Some(draft) = self.take_draft(input.is_left) else {
            return true;
        };
        let pressed = ctx.cursor().press_duration(input.timestamp_ms).unwrap_or_default();
        if pressed < draft.factory.creation_required_drag_ms() {
            tracing::debug!(pressed, factory = draft.factory.factory_id(), "press too short, discarding shape");
            ctx.delete_helper(draft.handle);
            return true;
        }
        let Some(helper) = ctx.delete_helper(draft.handle) else {
            return true;
        };
        match draft.factory.finish_direct(helper) {
            Some(object) => {
                let handle = ctx.add_annotation(object);
                ctx.select(Some(handle));
            }
            None => tracing::debug!(factory = draft.factory.factory_id(), "factory rejected the drawn shape"),
        }
        true
    }

    fn set_from_auto(&mut self, ctx: &mut EngineContext) -> bool {
        ctx.set_navigation(false);
        ctx.select(None);
        true
    }

    fn set_to_auto(&mut self, ctx: &mut EngineContext, temporary: bool) -> bool {
        self.discard_all(ctx);
        if temporary {
            return false;
        }
        ctx.set_navigation(true);
        true
    }

    fn accepts(&self, key: &KeyEvent) -> bool {
        key.is_plain_letter('W')
    }

    fn rejects(&self, key: &KeyEvent) -> bool {
        key.is_letter('W')
    }
}
