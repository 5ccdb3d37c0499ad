use super::{AnnotationState, PointerInput};
use crate::engine::EngineContext;
use crate::input::KeyEvent;

/// Default mode: the viewer navigates and clicks select objects
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoState;

impl AutoState {
    pub const ID: &'static str = "auto";
}

impl AnnotationState for AutoState {
    fn id(&self) -> &str {
        Self::ID
    }

    fn icon(&self) -> &str {
        "open_with"
    }

    fn description(&self) -> &str {
        "navigate / select annotations"
    }

    fn handle_click_down(&mut self, ctx: &mut EngineContext, input: &PointerInput) {
        let hit = ctx.object_at(&input.point, None);
        ctx.select(hit);
    }

    /// A short left click cycles the selection through stacked objects
    fn handle_click_up(&mut self, ctx: &mut EngineContext, input: &PointerInput) -> bool {
        let pressed = ctx.cursor().press_duration(input.timestamp_ms);
        if pressed.map_or(true, |duration| duration > ctx.config().click_threshold_ms) {
            return false;
        }
        if !input.is_left {
            return false;
        }
        let active = ctx.canvas().active();
        if let Some(active) = active {
            ctx.send_to_back(active);
        }
        if let Some(next) = ctx.object_at(&input.point, active) {
            ctx.select(Some(next));
        }
        true
    }

    fn accepts(&self, key: &KeyEvent) -> bool {
        key.is_plain_letter('Q')
    }
}
