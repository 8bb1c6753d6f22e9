use std::{
    any::{Any, TypeId},
    sync::Arc,
};

/// Boxed error returned by factories and lifecycle hooks.
///
/// Where one failure is fanned out to several waiters it travels as
/// `Arc<DynError>` instead.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Anything the graph can own or hand out.
///
/// Instances cross task boundaries on a multithreaded runtime, so every
/// component is `Send + Sync + 'static`. Blanket-implemented; never
/// implement it by hand.
pub trait Component: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Component for T {}

/// Type-erased instance of a component, shared by reference with every
/// dependent that resolved it.
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync>,
}

impl Instance {
    pub(crate) fn new<T: Component>(instance: T) -> Self {
        Instance {
            info: TypeInfo::of::<T>(),
            instance: Arc::new(instance),
        }
    }

    pub fn downcast<T: Component>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.info.type_name),
        }
    }
}

/// Name and id of a concrete Rust type, captured once at registration.
///
/// The name is only for diagnostics; all matching goes through the id.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// What a definition provides: its declared type plus an optional tag.
///
/// Tags are marker types, so two components of the same type can be told
/// apart at resolution time without string qualifiers.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeKey {
    pub type_info: TypeInfo,
    pub tag: Option<TypeInfo>,
}
impl TypeKey {
    pub fn of<T: 'static + ?Sized>() -> TypeKey {
        TypeKey {
            type_info: TypeInfo::of::<T>(),
            tag: None,
        }
    }

    pub fn tagged<T: 'static + ?Sized, Tag: 'static>() -> TypeKey {
        TypeKey {
            type_info: TypeInfo::of::<T>(),
            tag: Some(TypeInfo::of::<Tag>()),
        }
    }
}
impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{} @{}", self.type_info, tag),
            None => self.type_info.fmt(f),
        }
    }
}
