//! Owner resolution.
//!
//! Every isolate belongs to an owner: the execution scope whose values it
//! is carrying. Owners resolve live runtime services by type, which is how
//! field readers re-link decoded values to the currently running world
//! without the codec machinery knowing any concrete service type.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceLookupError {
    #[error("no `{service}` service is available to {owner}")]
    NotRegistered { service: &'static str, owner: String },
    #[error("service `{service}` held by {owner} has a different runtime type")]
    TypeMismatch { service: &'static str, owner: String },
}

/// Source of live collaborator services, looked up by runtime type.
pub trait ServiceRegistry {
    fn service_by_id(&self, type_id: TypeId) -> Option<Rc<dyn Any>>;
}

/// A plain type-indexed service registry.
#[derive(Default)]
pub struct ServiceMap {
    services: HashMap<TypeId, Rc<dyn Any>>,
}

impl ServiceMap {
    pub fn new() -> Self {
        ServiceMap::default()
    }

    /// Adds a service, replacing any previous one of the same type.
    pub fn with<T: Any>(mut self, service: T) -> Self {
        self.services.insert(TypeId::of::<T>(), Rc::new(service));
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceRegistry for ServiceMap {
    fn service_by_id(&self, type_id: TypeId) -> Option<Rc<dyn Any>> {
        self.services.get(&type_id).cloned()
    }
}

/// The execution scope that owns an isolate and its values.
#[derive(Clone)]
pub enum Owner {
    /// One unit of work within the run.
    Work {
        name: String,
        services: Rc<dyn ServiceRegistry>,
    },
    /// The run as a whole.
    Session { services: Rc<dyn ServiceRegistry> },
    /// The process hosting the run.
    Host { services: Rc<dyn ServiceRegistry> },
}

impl Owner {
    pub fn work(name: impl Into<String>, services: Rc<dyn ServiceRegistry>) -> Self {
        Owner::Work {
            name: name.into(),
            services,
        }
    }

    pub fn session(services: Rc<dyn ServiceRegistry>) -> Self {
        Owner::Session { services }
    }

    pub fn host(services: Rc<dyn ServiceRegistry>) -> Self {
        Owner::Host { services }
    }

    /// The work unit name, when this owner is a unit of work.
    pub fn work_name(&self) -> Option<&str> {
        match self {
            Owner::Work { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Owner::Work { name, .. } => format!("work unit `{name}`"),
            Owner::Session { .. } => "the session".to_string(),
            Owner::Host { .. } => "the host environment".to_string(),
        }
    }

    fn services(&self) -> &Rc<dyn ServiceRegistry> {
        match self {
            Owner::Work { services, .. }
            | Owner::Session { services }
            | Owner::Host { services } => services,
        }
    }

    /// Resolves the service registered under type `T` in this owner's scope.
    pub fn service<T: Any>(&self) -> Result<Rc<T>, ServiceLookupError> {
        let service = self.services().service_by_id(TypeId::of::<T>()).ok_or_else(|| {
            ServiceLookupError::NotRegistered {
                service: type_name::<T>(),
                owner: self.describe(),
            }
        })?;
        service
            .downcast::<T>()
            .map_err(|_| ServiceLookupError::TypeMismatch {
                service: type_name::<T>(),
                owner: self.describe(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CacheDir(String);
    #[derive(Debug)]
    struct Unregistered;

    fn session_with_cache_dir() -> Owner {
        Owner::session(Rc::new(ServiceMap::new().with(CacheDir("/tmp/cache".into()))))
    }

    #[test]
    fn resolves_registered_service() {
        let owner = session_with_cache_dir();
        let dir = owner.service::<CacheDir>().unwrap();
        assert_eq!(dir.0, "/tmp/cache");
    }

    #[test]
    fn missing_service_names_owner_and_type() {
        let owner = Owner::work("compile", Rc::new(ServiceMap::new()));
        let err = owner.service::<Unregistered>().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("work unit `compile`"), "{rendered}");
        assert!(rendered.contains("Unregistered"), "{rendered}");
    }

    #[test]
    fn lying_registry_is_a_type_mismatch() {
        struct Lying;
        impl ServiceRegistry for Lying {
            fn service_by_id(&self, _type_id: TypeId) -> Option<Rc<dyn Any>> {
                Some(Rc::new(0_u64))
            }
        }

        let owner = Owner::host(Rc::new(Lying));
        let err = owner.service::<CacheDir>().unwrap_err();
        assert!(matches!(err, ServiceLookupError::TypeMismatch { .. }));
    }

    #[test]
    fn owner_descriptions() {
        assert_eq!(
            Owner::work("link", Rc::new(ServiceMap::new())).describe(),
            "work unit `link`"
        );
        assert_eq!(
            Owner::session(Rc::new(ServiceMap::new())).describe(),
            "the session"
        );
        assert_eq!(
            Owner::host(Rc::new(ServiceMap::new())).describe(),
            "the host environment"
        );
        assert_eq!(
            Owner::work("link", Rc::new(ServiceMap::new())).work_name(),
            Some("link")
        );
    }
}
