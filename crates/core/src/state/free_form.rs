//! Brush modes built on the shared free-form tool
//!
//! All three modes locate the object under the brush the same way: the active
//! object first, then every editable committed object whose bounding box
//! meets the brush square, confirmed with a SAT test against the octagon.
//! When nothing intersects on press, the remove and correction modes keep the
//! candidates and start as soon as a later move touches one of them.

use super::{AnnotationState, PointerInput};
use crate::annotation::{AnnotationObject, ImagePoint};
use crate::canvas::CanvasHandle;
use crate::engine::EngineContext;
use crate::geometry::{self, Aabb};
use crate::input::KeyEvent;

/// Committed object the brush may edit, with its polygon form
#[derive(Debug, Clone, PartialEq)]
pub struct BrushCandidate {
    pub handle: CanvasHandle,
    pub polygon: Vec<ImagePoint>,
}

impl BrushCandidate {
    fn from_object(ctx: &EngineContext, handle: CanvasHandle, object: &AnnotationObject) -> Option<Self> {
        if !object.is_committed() || object.session_id.is_none() {
            return None;
        }
        let factory = ctx.factories().resolve(object)?;
        if !factory.is_editable() {
            return None;
        }
        let polygon = if factory.is_implicit() {
            factory.to_point_array(object, 1.0)?
        } else {
            object.geometry.points()?.to_vec()
        };
        (polygon.len() >= 3).then_some(Self { handle, polygon })
    }

    fn touches(&self, brush: &[ImagePoint]) -> bool {
        geometry::polygons_intersect(brush, &self.polygon).is_some()
    }
}

/// What a brush session starts from
#[derive(Debug, Clone, PartialEq)]
pub enum BrushTarget {
    /// Edit an existing annotation
    Existing(CanvasHandle),
    /// Paint a new polygon, not yet on the canvas
    New(AnnotationObject),
}

enum Search {
    Hit(BrushCandidate),
    Missed(Vec<BrushCandidate>),
}

fn find_target(ctx: &EngineContext, point: ImagePoint, brush: &[ImagePoint], offset: f64) -> Search {
    if let Some(active) = ctx.canvas().active() {
        let current = ctx
            .canvas()
            .get(active)
            .and_then(|object| BrushCandidate::from_object(ctx, active, object));
        if let Some(current) = current.filter(|current| current.touches(brush)) {
            return Search::Hit(current);
        }
    }

    let radius = ctx.free_form().radius();
    let area = Aabb::new(
        point.x - radius - offset,
        point.y - radius - offset,
        radius * 2.0 + offset,
        radius * 2.0 + offset,
    );
    let candidates = ctx.find_intersecting_objects_by_bbox(&area, |handle, object| {
        BrushCandidate::from_object(ctx, handle, object)
    });
    match candidates.iter().position(|candidate| candidate.touches(brush)) {
        Some(index) => Search::Hit(candidates[index].clone()),
        None => Search::Missed(candidates),
    }
}

/// Press handling of the erasing modes
fn press_erasing(ctx: &mut EngineContext, candidates: &mut Option<Vec<BrushCandidate>>, point: ImagePoint) {
    let brush = ctx.free_form().circle_shape(point);
    let offset = ctx.config().remove_search_offset;
    match find_target(ctx, point, &brush, offset) {
        Search::Hit(candidate) => {
            ctx.free_form_start(BrushTarget::Existing(candidate.handle), point);
        }
        Search::Missed(found) => *candidates = Some(found),
    }
}

/// Move handling of the erasing modes
fn follow_candidates(ctx: &mut EngineContext, candidates: &mut Option<Vec<BrushCandidate>>, point: ImagePoint) {
    if let Some(pending) = candidates {
        let brush = ctx.free_form().circle_shape(point);
        if let Some(handle) = pending.iter().find(|candidate| candidate.touches(&brush)).map(|c| c.handle) {
            *candidates = None;
            ctx.free_form_start(BrushTarget::Existing(handle), point);
        }
        return;
    }
    ctx.recompute_brush_radius();
    ctx.free_form_update(point);
}

fn release(ctx: &mut EngineContext) -> bool {
    if let Some(result) = ctx.free_form_finish(false) {
        ctx.select(Some(result));
    }
    true
}

fn enter(ctx: &mut EngineContext) -> bool {
    ctx.set_navigation(false);
    ctx.recompute_brush_radius();
    true
}

fn leave(ctx: &mut EngineContext, temporary: bool) -> bool {
    if temporary {
        return false;
    }
    ctx.set_navigation(true);
    true
}

/// Brush painting new regions or growing the one it starts on
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeFormAddState;

impl FreeFormAddState {
    pub const ID: &'static str = "fft-add";
}

impl AnnotationState for FreeFormAddState {
    fn id(&self) -> &str {
        Self::ID
    }

    fn icon(&self) -> &str {
        "brush"
    }

    fn description(&self) -> &str {
        "brush to create/edit"
    }

    fn handle_click_down(&mut self, ctx: &mut EngineContext, input: &PointerInput) {
        if input.factory.is_none() {
            ctx.abort_click(input.is_left, true);
            return;
        }
        let brush = ctx.free_form().circle_shape(input.point);
        let target = match find_target(ctx, input.point, &brush, 0.0) {
            Search::Hit(candidate) => BrushTarget::Existing(candidate.handle),
            Search::Missed(_) => match ctx.create_brush_polygon(brush, input.is_left) {
                Some(object) => BrushTarget::New(object),
                None => {
                    ctx.abort_click(input.is_left, true);
                    return;
                }
            },
        };
        ctx.free_form_start(target, input.point);
    }

    fn handle_mouse_move(&mut self, ctx: &mut EngineContext, point: ImagePoint) {
        ctx.recompute_brush_radius();
        ctx.free_form_update(point);
    }

    fn handle_click_up(&mut self, ctx: &mut EngineContext, _input: &PointerInput) -> bool {
        release(ctx)
    }

    fn scroll(&mut self, ctx: &mut EngineContext, delta: f64) {
        ctx.scroll_brush(delta);
    }

    fn set_from_auto(&mut self, ctx: &mut EngineContext) -> bool {
        ctx.set_brush_mode_add(true);
        enter(ctx)
    }

    fn set_to_auto(&mut self, ctx: &mut EngineContext, temporary: bool) -> bool {
        leave(ctx, temporary)
    }

    fn accepts(&self, key: &KeyEvent) -> bool {
        key.is_plain_letter('E')
    }

    fn rejects(&self, key: &KeyEvent) -> bool {
        key.is_letter('E')
    }
}

/// Brush erasing from existing regions
#[derive(Debug, Clone, Default)]
pub struct FreeFormRemoveState {
    candidates: Option<Vec<BrushCandidate>>,
}

impl FreeFormRemoveState {
    pub const ID: &'static str = "fft-remove";
}

impl AnnotationState for FreeFormRemoveState {
    fn id(&self) -> &str {
        Self::ID
    }

    fn icon(&self) -> &str {
        "brush"
    }

    fn description(&self) -> &str {
        "brush to remove"
    }

    fn handle_click_down(&mut self, ctx: &mut EngineContext, input: &PointerInput) {
        if input.factory.is_none() {
            ctx.abort_click(input.is_left, true);
            return;
        }
        press_erasing(ctx, &mut self.candidates, input.point);
    }

    fn handle_mouse_move(&mut self, ctx: &mut EngineContext, point: ImagePoint) {
        follow_candidates(ctx, &mut self.candidates, point);
    }

    fn handle_click_up(&mut self, ctx: &mut EngineContext, _input: &PointerInput) -> bool {
        self.candidates = None;
        release(ctx)
    }

    fn scroll(&mut self, ctx: &mut EngineContext, delta: f64) {
        ctx.scroll_brush(delta);
    }

    fn set_from_auto(&mut self, ctx: &mut EngineContext) -> bool {
        ctx.set_brush_mode_add(false);
        enter(ctx)
    }

    fn set_to_auto(&mut self, ctx: &mut EngineContext, temporary: bool) -> bool {
        self.candidates = None;
        leave(ctx, temporary)
    }

    fn accepts(&self, key: &KeyEvent) -> bool {
        key.is_plain_letter('R')
    }

    fn rejects(&self, key: &KeyEvent) -> bool {
        key.is_letter('R')
    }
}

/// Brush that adds with the left button and erases with the right one
///
/// Always draws with the left preset, so a right press works as long as a
/// left preset is selected.
#[derive(Debug, Clone, Default)]
pub struct CorrectionState {
    candidates: Option<Vec<BrushCandidate>>,
}

impl CorrectionState {
    pub const ID: &'static str = "fft-correct";
}

impl AnnotationState for CorrectionState {
    fn id(&self) -> &str {
        Self::ID
    }

    fn icon(&self) -> &str {
        "brush"
    }

    fn description(&self) -> &str {
        "correction tool"
    }

    fn handle_click_down(&mut self, ctx: &mut EngineContext, input: &PointerInput) {
        if ctx.button_factory(true).is_none() {
            ctx.abort_click(input.is_left, true);
            return;
        }
        ctx.set_brush_mode_add(input.is_left);
        press_erasing(ctx, &mut self.candidates, input.point);
    }

    fn handle_mouse_move(&mut self, ctx: &mut EngineContext, point: ImagePoint) {
        follow_candidates(ctx, &mut self.candidates, point);
    }

    fn handle_click_up(&mut self, ctx: &mut EngineContext, _input: &PointerInput) -> bool {
        self.candidates = None;
        release(ctx)
    }

    fn scroll(&mut self, ctx: &mut EngineContext, delta: f64) {
        ctx.scroll_brush(delta);
    }

    fn set_from_auto(&mut self, ctx: &mut EngineContext) -> bool {
        enter(ctx)
    }

    fn set_to_auto(&mut self, ctx: &mut EngineContext, temporary: bool) -> bool {
        self.candidates = None;
        leave(ctx, temporary)
    }

    fn accepts(&self, key: &KeyEvent) -> bool {
        key.is_plain_letter('Z')
    }

    fn rejects(&self, key: &KeyEvent) -> bool {
        key.is_letter('Z')
    }
}
