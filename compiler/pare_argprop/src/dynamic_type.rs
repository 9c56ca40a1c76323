//! What is known about the runtime class of a reference value.

use pare_app::AppView;
use pare_ir::TypeRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Nullability {
    Bottom,
    DefinitelyNull,
    DefinitelyNotNull,
    MaybeNull,
}

impl Nullability {
    #[must_use]
    pub fn join(self, other: Nullability) -> Nullability {
        match (self, other) {
            (Nullability::Bottom, n) | (n, Nullability::Bottom) => n,
            (a, b) if a == b => a,
            _ => Nullability::MaybeNull,
        }
    }

    pub fn is_maybe_null(self) -> bool {
        self == Nullability::MaybeNull
    }

    pub fn is_definitely_null(self) -> bool {
        self == Nullability::DefinitelyNull
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DynamicType {
    Bottom,
    /// The runtime class is `upper_bound` or, unless `exact`, a subtype.
    Bounded {
        upper_bound: TypeRef,
        exact: bool,
        nullability: Nullability,
    },
    /// Nothing beyond the static type.
    Unknown,
}

impl DynamicType {
    /// A freshly allocated `ty`.
    pub fn exact(ty: TypeRef) -> DynamicType {
        DynamicType::Bounded {
            upper_bound: ty,
            exact: true,
            nullability: Nullability::DefinitelyNotNull,
        }
    }

    pub fn bounded(ty: TypeRef, nullability: Nullability) -> DynamicType {
        DynamicType::Bounded {
            upper_bound: ty,
            exact: false,
            nullability,
        }
    }

    pub fn is_bottom(self) -> bool {
        self == DynamicType::Bottom
    }

    pub fn is_unknown(self) -> bool {
        self == DynamicType::Unknown
    }

    pub fn upper_bound(self) -> Option<TypeRef> {
        match self {
            DynamicType::Bounded { upper_bound, .. } => Some(upper_bound),
            DynamicType::Bottom | DynamicType::Unknown => None,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, DynamicType::Bounded { exact: true, .. })
    }

    pub fn nullability(self) -> Nullability {
        match self {
            DynamicType::Bottom => Nullability::Bottom,
            DynamicType::Bounded { nullability, .. } => nullability,
            DynamicType::Unknown => Nullability::MaybeNull,
        }
    }

    #[must_use]
    pub fn with_nullability(self, nullability: Nullability) -> DynamicType {
        match self {
            DynamicType::Bounded {
                upper_bound, exact, ..
            } => DynamicType::Bounded {
                upper_bound,
                exact,
                nullability,
            },
            other => other,
        }
    }

    /// Least upper bound. Distinct bounds meet at their closest common
    /// superclass and lose exactness.
    #[must_use]
    pub fn join(self, other: DynamicType, app: &AppView) -> DynamicType {
        match (self, other) {
            (DynamicType::Bottom, t) | (t, DynamicType::Bottom) => t,
            (DynamicType::Unknown, _) | (_, DynamicType::Unknown) => DynamicType::Unknown,
            (
                DynamicType::Bounded {
                    upper_bound: a,
                    exact: exact_a,
                    nullability: null_a,
                },
                DynamicType::Bounded {
                    upper_bound: b,
                    exact: exact_b,
                    nullability: null_b,
                },
            ) => {
                let nullability = null_a.join(null_b);
                if a == b {
                    DynamicType::Bounded {
                        upper_bound: a,
                        exact: exact_a && exact_b,
                        nullability,
                    }
                } else {
                    DynamicType::bounded(app.least_upper_bound(a, b), nullability)
                }
            }
        }
    }

    /// Drops what `static_type` already says: a bound that is no tighter
    /// than the static type and admits `null` carries no information.
    #[must_use]
    pub fn widen(self, app: &AppView, static_type: TypeRef) -> DynamicType {
        let DynamicType::Bounded {
            upper_bound,
            exact,
            nullability,
        } = self
        else {
            return self;
        };
        let (upper_bound, exact) = if app.is_subtype(upper_bound, static_type) {
            (upper_bound, exact)
        } else {
            (static_type, false)
        };
        if !exact && upper_bound == static_type && nullability.is_maybe_null() {
            DynamicType::Unknown
        } else {
            DynamicType::Bounded {
                upper_bound,
                exact,
                nullability,
            }
        }
    }

    /// Receivers are never null; only a bound tighter than `holder` is
    /// worth keeping.
    #[must_use]
    pub fn widen_receiver(self, holder: TypeRef) -> DynamicType {
        match self {
            DynamicType::Bounded {
                upper_bound,
                exact: false,
                ..
            } if upper_bound == holder => DynamicType::Unknown,
            other => other,
        }
    }

    /// The type after a successful `checkcast` to `ty`.
    #[must_use]
    pub fn cast(self, app: &AppView, ty: TypeRef) -> DynamicType {
        match self {
            DynamicType::Bounded { upper_bound, .. } if app.is_subtype(upper_bound, ty) => self,
            DynamicType::Bounded { nullability, .. } => DynamicType::bounded(ty, nullability),
            DynamicType::Unknown => DynamicType::bounded(ty, Nullability::MaybeNull),
            DynamicType::Bottom => DynamicType::Bottom,
        }
    }
}

#[cfg(test)]
mod tests;
