//! Interaction modes
//!
//! Exactly one [`AnnotationState`] is active at a time. The engine routes
//! pointer, wheel and key input to it together with the shared
//! [`EngineContext`], so a state never owns engine data and can be swapped
//! without any teardown beyond [`AnnotationState::set_to_auto`].
//!
//! Transitions always pass through AUTO. A state leaving for another non-AUTO
//! state is asked with `temporary = true` and may decline, in which case the
//! engine switches directly without running AUTO's entry.

mod auto;
mod custom;
mod free_form;

pub use auto::AutoState;
pub use custom::CustomCreateState;
pub use free_form::{BrushCandidate, BrushTarget, CorrectionState, FreeFormAddState, FreeFormRemoveState};

use crate::annotation::{ImagePoint, ScreenPoint};
use crate::canvas::CanvasHandle;
use crate::engine::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::factory::AnnotationObjectFactory;
use crate::input::KeyEvent;
use std::fmt;
use std::rc::Rc;

/// Built-in modes by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Navigate and select
    Auto,
    /// Drag-to-create with the preset's factory
    Custom,
    FreeFormAdd,
    FreeFormRemove,
    /// Brush adding with the left button and erasing with the right one
    Correction,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Auto, Mode::Custom, Mode::FreeFormAdd, Mode::FreeFormRemove, Mode::Correction];

    pub fn id(&self) -> &'static str {
        match self {
            Mode::Auto => AutoState::ID,
            Mode::Custom => CustomCreateState::ID,
            Mode::FreeFormAdd => FreeFormAddState::ID,
            Mode::FreeFormRemove => FreeFormRemoveState::ID,
            Mode::Correction => CorrectionState::ID,
        }
    }

    pub fn from_id(id: &str) -> Option<Mode> {
        Mode::ALL.into_iter().find(|mode| mode.id() == id)
    }

    fn state(&self) -> Box<dyn AnnotationState> {
        match self {
            Mode::Auto => Box::new(AutoState),
            Mode::Custom => Box::new(CustomCreateState::default()),
            Mode::FreeFormAdd => Box::new(FreeFormAddState),
            Mode::FreeFormRemove => Box::new(FreeFormRemoveState::default()),
            Mode::Correction => Box::new(CorrectionState::default()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Pointer press or release as seen by a state
#[derive(Clone)]
pub struct PointerInput {
    /// Position in image space
    pub point: ImagePoint,
    pub screen: ScreenPoint,
    pub is_left: bool,
    /// Factory bound to the pressed button through its active preset
    pub factory: Option<Rc<dyn AnnotationObjectFactory>>,
    pub timestamp_ms: u64,
}

impl fmt::Debug for PointerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointerInput")
            .field("point", &self.point)
            .field("is_left", &self.is_left)
            .field("factory", &self.factory.as_ref().map(|factory| factory.factory_id()))
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// Behaviour of one interaction mode
///
/// Every handler has a do-nothing default so that a custom state only
/// implements what it reacts to.
pub trait AnnotationState {
    /// Unique mode id
    fn id(&self) -> &str;

    /// Icon name shown by the mode switcher
    fn icon(&self) -> &str {
        ""
    }

    fn description(&self) -> &str {
        ""
    }

    /// Extra controls the mode wants rendered next to the switcher
    fn custom_html(&self) -> String {
        String::new()
    }

    fn handle_click_down(&mut self, _ctx: &mut EngineContext, _input: &PointerInput) {}

    /// Returns true when the release was handled and must not bubble up
    fn handle_click_up(&mut self, _ctx: &mut EngineContext, _input: &PointerInput) -> bool {
        false
    }

    /// Pointer moved while a button is held
    fn handle_mouse_move(&mut self, _ctx: &mut EngineContext, _point: ImagePoint) {}

    /// Pointer moved with no button held
    fn handle_mouse_hover(&mut self, _ctx: &mut EngineContext, _point: ImagePoint) {}

    /// Wheel while viewer navigation is off or the mode was entered by key
    fn scroll(&mut self, _ctx: &mut EngineContext, _delta: f64) {}

    /// Wheel while the viewer zooms
    fn scroll_zooming(&mut self, _ctx: &mut EngineContext, _delta: f64) {}

    /// Returns false to refuse the selection
    fn object_selected(&mut self, _ctx: &mut EngineContext, _handle: CanvasHandle) -> bool {
        true
    }

    /// Returns false to keep the object selected
    fn object_deselected(&mut self, _ctx: &mut EngineContext, _handle: CanvasHandle) -> bool {
        true
    }

    /// Entering the mode from AUTO; false rejects the transition
    fn set_from_auto(&mut self, _ctx: &mut EngineContext) -> bool {
        true
    }

    /// Leaving the mode for AUTO
    ///
    /// `temporary` is set when AUTO is only passed through on the way to
    /// another mode. Returning false then skips AUTO entirely.
    fn set_to_auto(&mut self, _ctx: &mut EngineContext, _temporary: bool) -> bool {
        true
    }

    /// Key down activating this mode; should test the physical key and modifiers
    fn accepts(&self, _key: &KeyEvent) -> bool {
        false
    }

    /// Key up returning from this mode to AUTO
    fn rejects(&self, _key: &KeyEvent) -> bool {
        false
    }
}

/// Registered modes and the active one
pub struct ModeTable {
    states: Vec<Box<dyn AnnotationState>>,
    active: usize,
}

impl fmt::Debug for ModeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeTable").field("modes", &self.ids()).field("active", &self.active_id()).finish()
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeTable {
    /// Table holding only AUTO, which is active
    pub fn new() -> Self {
        Self { states: vec![Mode::Auto.state()], active: 0 }
    }

    /// Table with every built-in mode
    pub fn with_builtin() -> Self {
        let mut table = Self::new();
        for mode in Mode::ALL {
            table.use_mode(mode);
        }
        table
    }

    /// Load a built-in mode; false when it was already loaded
    pub fn use_mode(&mut self, mode: Mode) -> bool {
        if self.contains(mode.id()) {
            return false;
        }
        self.states.push(mode.state());
        true
    }

    /// Load a custom mode; ids must be unique
    pub fn use_custom(&mut self, state: Box<dyn AnnotationState>) -> EngineResult<()> {
        if self.contains(state.id()) {
            return Err(EngineError::DuplicateMode(state.id().to_string()));
        }
        tracing::debug!(mode = state.id(), "custom annotation mode registered");
        self.states.push(state);
        Ok(())
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.states.iter().position(|state| state.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.states.iter().map(|state| state.id()).collect()
    }

    pub fn active_id(&self) -> &str {
        self.states[self.active].id()
    }

    pub fn is_auto(&self) -> bool {
        self.active_id() == AutoState::ID
    }

    pub(crate) fn active_index(&self) -> usize {
        self.active
    }

    pub(crate) fn set_active_index(&mut self, index: usize) {
        if index < self.states.len() {
            self.active = index;
        }
    }

    pub(crate) fn auto_index(&self) -> usize {
        self.index_of(AutoState::ID).unwrap_or(0)
    }

    pub fn active(&self) -> &dyn AnnotationState {
        self.states[self.active].as_ref()
    }

    pub(crate) fn active_mut(&mut self) -> &mut dyn AnnotationState {
        self.states[self.active].as_mut()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Box<dyn AnnotationState>> {
        self.states.get_mut(index)
    }

    pub fn get(&self, id: &str) -> Option<&dyn AnnotationState> {
        self.states.iter().find(|state| state.id() == id).map(|state| state.as_ref())
    }

    /// First mode, in registration order, activated by `key`
    pub(crate) fn accepting(&self, key: &KeyEvent) -> Option<usize> {
        self.states.iter().position(|state| state.accepts(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lasso;

    impl AnnotationState for Lasso {
        fn id(&self) -> &str {
            "lasso"
        }

        fn accepts(&self, key: &KeyEvent) -> bool {
            key.is_plain_letter('L')
        }
    }

    #[test]
    fn test_mode_ids_round_trip() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_id(mode.id()), Some(mode));
        }
        assert_eq!(Mode::from_id("lasso"), None);
    }

    #[test]
    fn test_use_mode_is_idempotent() {
        let mut table = ModeTable::new();
        assert!(table.is_auto());
        assert!(!table.use_mode(Mode::Auto));
        assert!(table.use_mode(Mode::FreeFormAdd));
        assert!(!table.use_mode(Mode::FreeFormAdd));
        assert_eq!(table.ids(), vec!["auto", "fft-add"]);
    }

    #[test]
    fn test_custom_mode_ids_are_unique() {
        let mut table = ModeTable::with_builtin();
        table.use_custom(Box::new(Lasso)).expect("new id");
        let err = table.use_custom(Box::new(Lasso)).expect_err("duplicate");
        assert!(matches!(err, EngineError::DuplicateMode(id) if id == "lasso"));
    }

    #[test]
    fn test_hotkeys_select_modes() {
        let mut table = ModeTable::with_builtin();
        table.use_custom(Box::new(Lasso)).expect("new id");

        let expected = [('Q', "auto"), ('W', "custom"), ('E', "fft-add"), ('R', "fft-remove"), ('Z', "fft-correct"), ('L', "lasso")];
        for (letter, id) in expected {
            let index = table.accepting(&KeyEvent::letter(letter)).expect("hotkey");
            assert_eq!(table.states[index].id(), id);
        }
        assert!(table.accepting(&KeyEvent::letter('E').with_ctrl()).is_none());
        assert!(table.accepting(&KeyEvent::letter('X')).is_none());
    }
}
