use std::marker::PhantomData;

use crate::types::{Component, TypeInfo};

/// How many instances a claim wants, and when they are materialized.
///
/// `Single`, `Optional` and `All` are resolved eagerly while the dependent
/// constructs; `Lazy` and `Deferred` hand out a handle and are excluded from
/// the hard ordering of the graph, which is what makes them legal cycle
/// closers. `TypeToken` never touches an instance at all.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Optional,
    All,
    Lazy,
    Deferred,
    TypeToken,
}

/// Tag constraint of a claim.
///
/// `Untagged` only matches definitions registered without a tag. `Any`
/// matches every definition of the type, which is the usual choice for
/// `All` collections.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum TagFilter {
    Untagged,
    Any,
    Tag(TypeInfo),
}

/// A typed request for one constructor dependency.
///
/// Declared once per parameter at registration time, immutable afterwards.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct DependencyClaim {
    pub type_info: TypeInfo,
    pub tag: TagFilter,
    pub cardinality: Cardinality,
}

impl DependencyClaim {
    fn new<T: 'static + ?Sized>(cardinality: Cardinality) -> Self {
        DependencyClaim {
            type_info: TypeInfo::of::<T>(),
            tag: TagFilter::Untagged,
            cardinality,
        }
    }

    pub fn single<T: Component>() -> Self {
        Self::new::<T>(Cardinality::Single)
    }

    pub fn optional<T: Component>() -> Self {
        Self::new::<T>(Cardinality::Optional)
    }

    /// Collections match every tag by default.
    pub fn all<T: Component>() -> Self {
        DependencyClaim {
            tag: TagFilter::Any,
            ..Self::new::<T>(Cardinality::All)
        }
    }

    pub fn lazy<T: Component>() -> Self {
        Self::new::<T>(Cardinality::Lazy)
    }

    pub fn deferred<T: Component>() -> Self {
        Self::new::<T>(Cardinality::Deferred)
    }

    pub fn type_token<T: 'static>() -> Self {
        Self::new::<T>(Cardinality::TypeToken)
    }

    pub fn with_tag<Tag: 'static>(mut self) -> Self {
        self.tag = TagFilter::Tag(TypeInfo::of::<Tag>());
        self
    }

    pub fn any_tag(mut self) -> Self {
        self.tag = TagFilter::Any;
        self
    }

    pub(crate) fn accepts(&self, tag: Option<TypeInfo>) -> bool {
        match self.tag {
            TagFilter::Untagged => tag.is_none(),
            TagFilter::Any => true,
            TagFilter::Tag(wanted) => tag == Some(wanted),
        }
    }
}

impl std::fmt::Display for DependencyClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}<{}", self.cardinality, self.type_info)?;
        match self.tag {
            TagFilter::Untagged => {}
            TagFilter::Any => write!(f, " @*")?,
            TagFilter::Tag(tag) => write!(f, " @{tag}")?,
        }
        f.write_str(">")
    }
}

/// Reflection-free descriptor of a requested type.
///
/// Satisfies claims that only need type metadata for dispatch; resolving one
/// never constructs anything. The rendered name carries the full generic
/// arguments.
#[derive(Debug, Clone, Copy)]
pub struct TypeToken<T: 'static> {
    info: TypeInfo,
    _type: PhantomData<fn() -> T>,
}

impl<T: 'static> TypeToken<T> {
    pub(crate) fn new() -> Self {
        TypeToken {
            info: TypeInfo::of::<T>(),
            _type: PhantomData,
        }
    }

    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn type_name(&self) -> &'static str {
        self.info.type_name
    }
}
