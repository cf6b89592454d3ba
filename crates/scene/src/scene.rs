//! The editable object list.

use tracing::debug;

use crate::error::{SceneError, SceneResult};
use crate::light::SceneLighting;
use crate::object::SceneObject;

/// Most objects a scene can hold.
pub const MAX_SCENE_OBJECTS: usize = 32;

/// A bounded list of objects plus the scene lighting.
///
/// Object indices are positions in the list; removing an object shifts the
/// ones after it down by one.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
    pub lighting: SceneLighting,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and return its index.
    ///
    /// # Errors
    /// Returns [`SceneError::Full`] once [`MAX_SCENE_OBJECTS`] are present.
    pub fn add(&mut self, object: SceneObject) -> SceneResult<usize> {
        if self.objects.len() >= MAX_SCENE_OBJECTS {
            return Err(SceneError::Full(MAX_SCENE_OBJECTS));
        }
        debug!("Added {} '{}' to the scene", object.kind.name(), object.name);
        self.objects.push(object);
        Ok(self.objects.len() - 1)
    }

    /// Remove and return the object at `index`.
    pub fn remove(&mut self, index: usize) -> SceneResult<SceneObject> {
        if index >= self.objects.len() {
            return Err(SceneError::NoSuchObject(index));
        }
        let object = self.objects.remove(index);
        debug!("Removed '{}' from the scene", object.name);
        Ok(object)
    }

    pub fn get(&self, index: usize) -> Option<&SceneObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SceneObject> {
        self.objects.get_mut(index)
    }

    /// Index of the first object with this name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.name == name)
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.objects.len() >= MAX_SCENE_OBJECTS
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
