//! Prototype changes: how a method's arguments and return type changed
//! between one lens layer and the next.
//!
//! Argument indices count the receiver of instance methods as argument 0,
//! so a method that turns from virtual into static keeps its argument
//! numbering.

use std::collections::BTreeMap;

use pare_ir::{known, TypeRef};

/// What happened to one argument of the previous signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentChange {
    /// The argument is gone. Callers drop the value; the body sees
    /// `constant` if one was proven, otherwise the argument is unused.
    Removed { ty: TypeRef, constant: Option<i64> },
    /// The argument's type changed (for example an unboxed enum became `int`).
    Rewritten { from: TypeRef, to: TypeRef },
}

/// A parameter appended to the new signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtraParameter {
    /// Disambiguates a signature collision; callers pass `null`.
    UnusedNull(TypeRef),
    /// Callers pass this constant (the class id of a merged constructor).
    ConstantInt(i32),
}

impl ExtraParameter {
    pub fn ty(self) -> TypeRef {
        match self {
            ExtraParameter::UnusedNull(ty) => ty,
            ExtraParameter::ConstantInt(_) => known::int(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RewrittenReturn {
    pub from: TypeRef,
    pub to: TypeRef,
}

/// Argument and return changes of a method between two lens layers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PrototypeChanges {
    arguments: BTreeMap<u32, ArgumentChange>,
    extra_parameters: Vec<ExtraParameter>,
    rewritten_return: Option<RewrittenReturn>,
}

impl PrototypeChanges {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
            && self.extra_parameters.is_empty()
            && self.rewritten_return.is_none()
    }

    #[must_use]
    pub fn with_removed_argument(mut self, index: u32, ty: TypeRef, constant: Option<i64>) -> Self {
        self.arguments
            .insert(index, ArgumentChange::Removed { ty, constant });
        self
    }

    #[must_use]
    pub fn with_rewritten_argument(mut self, index: u32, from: TypeRef, to: TypeRef) -> Self {
        if from != to {
            self.arguments
                .insert(index, ArgumentChange::Rewritten { from, to });
        }
        self
    }

    #[must_use]
    pub fn with_extra_parameter(mut self, extra: ExtraParameter) -> Self {
        self.extra_parameters.push(extra);
        self
    }

    #[must_use]
    pub fn with_rewritten_return(mut self, from: TypeRef, to: TypeRef) -> Self {
        if from != to {
            self.rewritten_return = Some(RewrittenReturn { from, to });
        }
        self
    }

    pub fn argument(&self, index: u32) -> Option<ArgumentChange> {
        self.arguments.get(&index).copied()
    }

    pub fn arguments(&self) -> impl Iterator<Item = (u32, ArgumentChange)> + '_ {
        self.arguments.iter().map(|(&i, &c)| (i, c))
    }

    pub fn has_removed_arguments(&self) -> bool {
        self.arguments
            .values()
            .any(|c| matches!(c, ArgumentChange::Removed { .. }))
    }

    pub fn extra_parameters(&self) -> &[ExtraParameter] {
        &self.extra_parameters
    }

    pub fn rewritten_return(&self) -> Option<RewrittenReturn> {
        self.rewritten_return
    }

    /// Argument types of the new signature, given those of the previous one.
    pub fn apply(&self, previous: &[TypeRef]) -> Vec<TypeRef> {
        let mut out = Vec::with_capacity(previous.len() + self.extra_parameters.len());
        for (i, &ty) in (0u32..).zip(previous) {
            match self.arguments.get(&i) {
                Some(ArgumentChange::Removed { .. }) => {}
                Some(ArgumentChange::Rewritten { to, .. }) => out.push(*to),
                None => out.push(ty),
            }
        }
        out.extend(self.extra_parameters.iter().map(|e| e.ty()));
        out
    }

    /// Argument types of the previous signature, given those of the new one.
    pub fn original_parameters(&self, current: &[TypeRef]) -> Vec<TypeRef> {
        let kept_len = current.len().saturating_sub(self.extra_parameters.len());
        let mut kept = current[..kept_len].iter().copied();
        let mut out = Vec::with_capacity(kept_len + self.arguments.len());
        for i in 0u32.. {
            if let Some(ArgumentChange::Removed { ty, .. }) = self.arguments.get(&i) {
                out.push(*ty);
                continue;
            }
            let Some(ty) = kept.next() else {
                break;
            };
            match self.arguments.get(&i) {
                Some(ArgumentChange::Rewritten { from, .. }) => out.push(*from),
                _ => out.push(ty),
            }
        }
        out
    }

    /// Return type of the previous signature.
    pub fn original_return(&self, current: TypeRef) -> TypeRef {
        self.rewritten_return.map_or(current, |r| r.from)
    }

    /// Changes equivalent to applying `self` and then `newer`.
    ///
    /// `newer` is expressed over the arguments `self` produces. Extra
    /// parameters added by `self` are never changed again by `newer`.
    #[must_use]
    pub fn combine(&self, newer: &PrototypeChanges) -> PrototypeChanges {
        if newer.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return newer.clone();
        }

        let removed: Vec<u32> = self
            .arguments
            .iter()
            .filter(|(_, c)| matches!(c, ArgumentChange::Removed { .. }))
            .map(|(&i, _)| i)
            .collect();
        let to_original = |j: u32| {
            let mut i = j;
            for &r in &removed {
                if r <= i {
                    i += 1;
                } else {
                    break;
                }
            }
            i
        };

        let mut arguments = self.arguments.clone();
        for (&j, &change) in &newer.arguments {
            let i = to_original(j);
            let older = self.arguments.get(&i).copied();
            let combined = match (older, change) {
                (None, change) => Some(change),
                (Some(ArgumentChange::Removed { .. }), _) => {
                    unreachable!("argument {i} was already removed")
                }
                (Some(ArgumentChange::Rewritten { from, .. }), newer) => match newer {
                    ArgumentChange::Removed { constant, .. } => {
                        Some(ArgumentChange::Removed { ty: from, constant })
                    }
                    ArgumentChange::Rewritten { to, .. } => {
                        (from != to).then_some(ArgumentChange::Rewritten { from, to })
                    }
                },
            };
            match combined {
                Some(c) => {
                    arguments.insert(i, c);
                }
                None => {
                    arguments.remove(&i);
                }
            }
        }

        let mut extra_parameters = self.extra_parameters.clone();
        extra_parameters.extend_from_slice(&newer.extra_parameters);

        let rewritten_return = match (self.rewritten_return, newer.rewritten_return) {
            (Some(a), Some(b)) => (a.from != b.to).then_some(RewrittenReturn {
                from: a.from,
                to: b.to,
            }),
            (a, b) => b.or(a),
        };

        PrototypeChanges {
            arguments,
            extra_parameters,
            rewritten_return,
        }
    }
}
