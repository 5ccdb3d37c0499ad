use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use wsi_annotations_core::{
    AnnotationEngine, AnnotationGeometry, CreateParams, EngineEvent, ExportOptions, ImagePoint, ImportOptions, Mode,
    ObjectId, PointerEvent, PresetSelection, PresetUpdate, NATIVE_FORMAT,
};

fn ready_engine() -> AnnotationEngine {
    let mut engine = AnnotationEngine::builder().build().expect("default engine");
    engine.init_io(|_| false);
    engine
}

fn recorded(engine: &mut AnnotationEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    engine.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

fn rect(engine: &mut AnnotationEngine, x: f64, y: f64, size: f64) -> ObjectId {
    let handle = engine
        .create_annotation("rect", CreateParams::Coords(vec![x, y, x + size, y + size]))
        .expect("rect factory");
    engine.canvas().get(handle).and_then(|object| object.id()).expect("committed")
}

#[test]
fn test_rect_takes_preset_color() {
    let mut engine = ready_engine();
    let preset = engine.add_preset(Some("tumor"), "Tumor");
    engine.update_preset(
        &preset.id,
        PresetUpdate { color: Some("#ff0000".to_string()), ..PresetUpdate::default() },
    );
    engine.set_preset(PresetSelection::Id(preset.id.clone()), true).expect("selectable");

    let handle = engine
        .create_annotation("rect", CreateParams::Coords(vec![10.0, 10.0, 50.0, 50.0]))
        .expect("rect factory");
    let object = engine.canvas().get(handle).expect("on canvas");

    match object.geometry {
        AnnotationGeometry::Rect { left, top, width, height } => {
            assert_eq!((left, top, width, height), (10.0, 10.0, 40.0, 40.0));
        }
        ref other => panic!("unexpected geometry {other:?}"),
    }
    assert_eq!(object.style.color, "#ff0000");
    assert_eq!(object.preset_id.as_deref(), Some("tumor"));
}

#[test]
fn test_identities_stay_unique_across_deletes() {
    let mut engine = ready_engine();
    let mut seen = HashSet::new();

    for round in 0..5 {
        let first = rect(&mut engine, round as f64 * 20.0, 0.0, 10.0);
        let second = rect(&mut engine, round as f64 * 20.0, 30.0, 10.0);
        assert!(seen.insert(first));
        assert!(seen.insert(second));
        engine.delete_annotation(first).expect("live object");
    }

    let live: Vec<ObjectId> = engine.objects().filter_map(|object| object.id()).collect();
    let unique: HashSet<ObjectId> = live.iter().copied().collect();
    assert_eq!(live.len(), unique.len());
    assert_eq!(live.len(), 5);
}

#[test]
fn test_create_undo_redo_restores_object() {
    let mut engine = ready_engine();
    let id = rect(&mut engine, 5.0, 5.0, 20.0);
    let original = engine.canvas().get(engine.find(id).expect("created")).cloned().expect("object");

    assert!(engine.undo());
    assert_eq!(engine.objects().count(), 0);
    assert!(engine.can_redo());

    assert!(engine.redo());
    let restored: Vec<_> = engine.objects().collect();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].geometry, original.geometry);
    assert_eq!(restored[0].preset_id, original.preset_id);
}

#[test]
fn test_used_preset_cannot_be_removed() {
    let mut engine = ready_engine();
    let preset = engine.preset(true).cloned().expect("guaranteed preset");
    rect(&mut engine, 0.0, 0.0, 10.0);

    assert!(engine.remove_preset(&preset.id).is_err());
    assert!(engine.presets().exists(&preset.id));

    engine.delete_all_annotations();
    assert!(engine.remove_preset(&preset.id).is_ok());
    assert!(!engine.presets().exists(&preset.id));
}

#[test]
fn test_brush_stroke_creates_polygon() {
    let mut engine = ready_engine();
    engine.set_mode(Mode::FreeFormAdd);

    engine.pointer_down(PointerEvent::primary(100.0, 100.0, 0));
    let vertices = engine.context().free_form().contour().map(<[ImagePoint]>::len);
    assert!(vertices.is_some());

    engine.pointer_move(PointerEvent::primary(100.0, 100.0, 10));
    assert_eq!(engine.context().free_form().contour().map(<[ImagePoint]>::len), vertices);

    let radius = engine.context().free_form().radius();
    let mut time = 10;
    for x in [115.0, 130.0, 145.0, 160.0] {
        time += 10;
        engine.pointer_move(PointerEvent::primary(x, 100.0, time));
    }
    engine.pointer_up(PointerEvent::primary(160.0, 100.0, time + 10));

    let objects: Vec<_> = engine.objects().collect();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].factory_id, "polygon");
    assert!(objects[0].is_committed());
    let bounds = objects[0].geometry.bounding_box();
    assert!(bounds.width > 2.0 * radius + 50.0, "stamps merged into {bounds:?}");
    assert!(engine.can_undo());
}

#[test]
fn test_mode_round_trip_restores_navigation() {
    let mut engine = ready_engine();
    let navigation = engine.viewport().navigation_enabled();
    let radius = engine.context().free_form().radius();

    for mode in [Mode::Custom, Mode::FreeFormAdd, Mode::FreeFormRemove, Mode::Correction] {
        engine.set_mode(mode);
        engine.set_mode(Mode::Auto);
        assert_eq!(engine.mode(), "auto");
        assert_eq!(engine.viewport().navigation_enabled(), navigation);
        assert_eq!(engine.context().free_form().radius(), radius);
    }

    engine.set_mode(Mode::FreeFormAdd);
    let brushing = engine.viewport().navigation_enabled();
    engine.set_mode(Mode::FreeFormRemove);
    engine.set_mode(Mode::FreeFormAdd);
    assert_eq!(engine.viewport().navigation_enabled(), brushing);
    assert!(engine.context().free_form().mode_add());
}

#[test]
fn test_native_export_imports_into_fresh_engine() {
    let mut source = ready_engine();
    source.add_preset(Some("stroma"), "Stroma");
    rect(&mut source, 10.0, 10.0, 40.0);
    source
        .create_annotation(
            "polygon",
            CreateParams::Points(vec![
                ImagePoint::new(0.0, 0.0),
                ImagePoint::new(30.5, 0.0),
                ImagePoint::new(30.5, 12.25),
            ]),
        )
        .expect("polygon factory");

    let data = source.export(&ExportOptions::with_format(NATIVE_FORMAT), true, true).expect("native export");

    let mut target = ready_engine();
    assert!(target.import(&data, &ImportOptions::with_format(NATIVE_FORMAT), true));
    assert_eq!(target.objects().count(), source.objects().count());

    for (left, right) in source.objects().zip(target.objects()) {
        assert_eq!(left.factory_id, right.factory_id);
        assert_eq!(left.preset_id, right.preset_id);
        let (a, b) = (left.geometry.bounding_box(), right.geometry.bounding_box());
        assert!((a.x - b.x).abs() < 0.1 && (a.y - b.y).abs() < 0.1);
        assert!((a.width - b.width).abs() < 0.1 && (a.height - b.height).abs() < 0.1);
    }
    assert!(target.presets().exists("stroma"));
}

#[test]
fn test_import_falls_back_to_other_format() {
    let mut source = ready_engine();
    rect(&mut source, 0.0, 0.0, 10.0);
    let data = source.export(&ExportOptions::default(), true, true).expect("native export");

    let mut target = ready_engine();
    let events = recorded(&mut target);
    assert!(target.import(&data, &ImportOptions::with_format("asap-xml"), false));
    assert_eq!(target.objects().count(), 1);
    assert!(events.borrow().iter().any(|event| matches!(
        event,
        EngineEvent::Import { imported: true, format: Some(format) } if format == NATIVE_FORMAT
    )));

    let before = target.objects().count();
    assert!(!target.import("<NotAnnotations/>", &ImportOptions::with_format("asap-xml"), true));
    assert_eq!(target.objects().count(), before);
}

#[test]
fn test_delete_layer_emits_single_event() {
    let mut engine = ready_engine();
    let layer = engine.create_layer(Some("review"));
    engine.set_active_layer(&layer.id);
    for x in [0.0, 20.0, 40.0] {
        rect(&mut engine, x, 0.0, 10.0);
    }
    let events = recorded(&mut engine);

    assert!(engine.delete_layer(&layer.id));
    assert_eq!(engine.objects().count(), 0);
    let events = events.borrow();
    assert_eq!(events.iter().filter(|event| matches!(event, EngineEvent::LayerRemoved { .. })).count(), 1);
    assert!(!events.iter().any(|event| matches!(event, EngineEvent::AnnotationDelete { .. })));
    assert!(!engine.delete_layer(&layer.id));
}

#[test]
fn test_history_change_tracks_undo_state() {
    let mut engine = ready_engine();
    let events = recorded(&mut engine);
    rect(&mut engine, 0.0, 0.0, 10.0);
    assert!(events
        .borrow()
        .iter()
        .any(|event| matches!(event, EngineEvent::HistoryChange { can_undo: true, can_redo: false })));

    engine.undo();
    assert!(events
        .borrow()
        .iter()
        .any(|event| matches!(event, EngineEvent::HistoryChange { can_undo: false, can_redo: true })));
    assert!(!engine.undo());
}
