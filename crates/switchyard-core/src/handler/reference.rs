//! Named collaborator lookup.

use std::sync::Arc;

use dashmap::DashMap;
use switchyard_types::{MessagingError, Object};

/// Resolves collaborators (services, interceptors, repositories) by name.
pub trait ReferenceSearchService: Send + Sync {
    /// Fails with [`MessagingError::ReferenceNotFound`] for unknown names.
    fn get(&self, reference: &str) -> Result<Object, MessagingError>;

    fn has(&self, reference: &str) -> bool;
}

/// Reference registry held in memory, optionally falling back to a parent.
#[derive(Default)]
pub struct InMemoryReferenceSearchService {
    objects: DashMap<String, Object>,
    parent: Option<Arc<dyn ReferenceSearchService>>,
}

impl InMemoryReferenceSearchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `objects`.
    pub fn with_objects<I, S>(objects: I) -> Self
    where
        I: IntoIterator<Item = (S, Object)>,
        S: Into<String>,
    {
        let service = Self::new();
        for (name, object) in objects {
            service.register(name, object);
        }
        service
    }

    /// Names missing here are looked up in `parent`.
    pub fn with_parent(mut self, parent: Arc<dyn ReferenceSearchService>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Register (or replace) an object under `name`.
    pub fn register(&self, name: impl Into<String>, object: Object) {
        self.objects.insert(name.into(), object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ReferenceSearchService for InMemoryReferenceSearchService {
    fn get(&self, reference: &str) -> Result<Object, MessagingError> {
        if let Some(object) = self.objects.get(reference) {
            return Ok(object.value().clone());
        }
        match &self.parent {
            Some(parent) => parent.get(reference),
            None => Err(MessagingError::ReferenceNotFound(reference.to_string())),
        }
    }

    fn has(&self, reference: &str) -> bool {
        self.objects.contains_key(reference)
            || self.parent.as_ref().is_some_and(|parent| parent.has(reference))
    }
}

impl std::fmt::Debug for InMemoryReferenceSearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReferenceSearchService")
            .field("objects", &self.objects.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_registered_object() {
        let service = InMemoryReferenceSearchService::with_objects([(
            "calculator",
            Object::named("Calculator", 4i64),
        )]);

        let object = service.get("calculator").unwrap();
        assert_eq!(object.downcast_ref::<i64>(), Some(&4));
        assert!(service.has("calculator"));
        assert_eq!(service.len(), 1);
    }

    #[test]
    fn unknown_reference_fails() {
        let service = InMemoryReferenceSearchService::new();
        let err = service.get("missing").unwrap_err();
        assert!(matches!(err, MessagingError::ReferenceNotFound(ref name) if name == "missing"));
        assert!(!service.has("missing"));
    }

    #[test]
    fn falls_back_to_parent() {
        let parent = Arc::new(InMemoryReferenceSearchService::with_objects([(
            "shared",
            Object::named("Shared", ()),
        )]));
        let child = InMemoryReferenceSearchService::new().with_parent(parent);
        child.register("local", Object::named("Local", ()));

        assert_eq!(child.get("shared").unwrap().type_name(), "Shared");
        assert_eq!(child.get("local").unwrap().type_name(), "Local");
        assert!(child.has("shared"));
    }
}
