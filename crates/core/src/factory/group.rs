use super::{copy_with, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryError, FactoryResult, ObjectOptions};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint, Lifecycle};

/// Composite object; created from existing objects, never drawn directly
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupFactory;

impl AnnotationObjectFactory for GroupFactory {
    fn factory_id(&self) -> &'static str {
        "group"
    }

    fn geometry_type(&self) -> &'static str {
        "group"
    }

    fn title(&self) -> &'static str {
        "Group"
    }

    fn icon(&self) -> &'static str {
        "shape_line"
    }

    fn description(&self, object: &AnnotationObject) -> String {
        match &object.geometry {
            AnnotationGeometry::Group { objects } => format!("Group of {} objects", objects.len()),
            _ => self.title().to_string(),
        }
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let CreateParams::Children(mut objects) = params else {
            return Err(FactoryError::InvalidParameters {
                factory: self.factory_id().to_string(),
                reason: "expected child objects".into(),
            });
        };
        if objects.is_empty() {
            return Err(FactoryError::InvalidParameters {
                factory: self.factory_id().to_string(),
                reason: "a group needs at least one child".into(),
            });
        }
        for child in &mut objects {
            child.set_lifecycle(Lifecycle::Draft);
        }
        Ok(styled(self.factory_id(), AnnotationGeometry::Group { objects }, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match (params, &object.geometry) {
            (Some(CreateParams::Children(objects)), _) if !objects.is_empty() => AnnotationGeometry::Group { objects },
            (None, AnnotationGeometry::Group { .. }) => object.geometry.clone(),
            (Some(other), _) => {
                return Err(FactoryError::InvalidParameters {
                    factory: self.factory_id().to_string(),
                    reason: format!("expected child objects, got {other:?}"),
                })
            }
            (None, _) => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    /// Children take the group's style as well
    fn configure(&self, object: &mut AnnotationObject, options: &ObjectOptions) {
        options.apply_to(object);
        object.factory_id = self.factory_id().to_string();
        if let AnnotationGeometry::Group { objects } = &mut object.geometry {
            for child in objects {
                options.apply_to(child);
            }
        }
    }

    fn init_create(&self, _origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), AnnotationGeometry::Group { objects: Vec::new() }, options)
    }

    fn update_create(&self, _helper: &mut AnnotationObject, _origin: ImagePoint, _point: ImagePoint) {}

    fn finish_direct(&self, _helper: AnnotationObject) -> Option<AnnotationObject> {
        None
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn is_editable(&self) -> bool {
        false
    }

    fn on_zoom(&self, object: &mut AnnotationObject, zoom: f64) {
        if zoom <= 0.0 {
            return;
        }
        object.style.stroke_width = object.style.original_stroke_width / zoom;
        if let AnnotationGeometry::Group { objects } = &mut object.geometry {
            for child in objects {
                child.style.stroke_width = child.style.original_stroke_width / zoom;
            }
        }
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["objects"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::RectFactory;

    fn square(offset: f64) -> AnnotationObject {
        RectFactory
            .create(
                CreateParams::Coords(vec![offset, offset, offset + 5.0, offset + 5.0]),
                &ObjectOptions::default(),
            )
            .expect("rectangle")
    }

    #[test]
    fn test_group_requires_children() {
        let result = GroupFactory.create(CreateParams::Children(Vec::new()), &ObjectOptions::default());
        assert!(matches!(result, Err(FactoryError::InvalidParameters { .. })));
    }

    #[test]
    fn test_group_bounds_and_description() {
        let group = GroupFactory
            .create(CreateParams::Children(vec![square(0.0), square(10.0)]), &ObjectOptions::default())
            .expect("group");
        assert_eq!(GroupFactory.description(&group), "Group of 2 objects");
        let bounds = group.bounding_box();
        assert_eq!((bounds.width, bounds.height), (15.0, 15.0));
    }

    #[test]
    fn test_configure_styles_children() {
        let mut group = GroupFactory
            .create(CreateParams::Children(vec![square(0.0)]), &ObjectOptions::default())
            .expect("group");
        let options = ObjectOptions { color: "#00ff00".into(), ..ObjectOptions::default() };
        GroupFactory.configure(&mut group, &options);
        match &group.geometry {
            AnnotationGeometry::Group { objects } => assert_eq!(objects[0].style.color, "#00ff00"),
            other => panic!("unexpected geometry {other:?}"),
        }
    }
}
