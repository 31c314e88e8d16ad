use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Identifier a binding is registered and resolved under.
///
/// Type keys work for any `'static` type, including `dyn Trait`; token keys
/// let several bindings share one service type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    Type { id: TypeId, name: &'static str },
    Token(Cow<'static, str>),
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn token(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Token(name.into())
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.write_str(name),
            Self::Token(token) => write!(f, "token({token})"),
        }
    }
}

/// How long a resolved instance lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum Lifetime {
    /// One instance per registry, cached until `unload_all`.
    #[default]
    Singleton,
    /// A fresh instance for every resolution.
    Transient,
}
