//! Merge policies: the rules that shrink and split candidate groups.
//!
//! # Architecture
//!
//! A [`SingleClassPolicy`] judges one class at a time and evicts it from its
//! group. A [`MultiClassPolicy`] sees a whole group and returns the groups it
//! splits it into; it may first look at every group at once in
//! [`MultiClassPolicy::preprocess`]. The [`PolicyExecutor`] runs the
//! policies in order and, after each one, drops groups that no longer have
//! two classes, recording every class that fell out against the policy's
//! name.

mod multi;
mod single;

use pare_app::AppView;
use pare_ir::{ProgramClass, TypeRef};
use rayon::prelude::*;

pub use multi::{
    FinalizeMergeGroup, LimitGroupSize, NoDirectRuntimeTypeChecks, NoVirtualMethodCollisions,
    RespectPackageBoundaries, SameInstanceFields, SameParentClass,
};
pub use single::{NoAnnotations, NoClassInitializers, NoEnums, NoKeepRules};

use crate::error::MergeError;
use crate::group::MergeGroup;
use crate::report::MergeReport;
use crate::MergerOptions;

pub trait SingleClassPolicy: Sync {
    fn name(&self) -> &'static str;

    fn can_merge(&self, class: &ProgramClass) -> bool;
}

pub trait MultiClassPolicy {
    fn name(&self) -> &'static str;

    /// Look at every remaining group before any is split.
    fn preprocess(&mut self, _groups: &[MergeGroup]) -> Result<(), MergeError> {
        Ok(())
    }

    fn apply(&self, group: MergeGroup) -> Vec<MergeGroup>;
}

pub enum Policy<'a> {
    Single(Box<dyn SingleClassPolicy + 'a>),
    Multi(Box<dyn MultiClassPolicy + 'a>),
}

impl Policy<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Policy::Single(p) => p.name(),
            Policy::Multi(p) => p.name(),
        }
    }
}

/// The merger's policies, in the order they run.
pub fn default_policies<'a>(app: &'a AppView, options: &MergerOptions) -> Vec<Policy<'a>> {
    vec![
        Policy::Single(Box::new(NoKeepRules::new(app.keep_info()))),
        Policy::Single(Box::new(NoEnums)),
        Policy::Single(Box::new(NoAnnotations)),
        Policy::Single(Box::new(NoClassInitializers)),
        Policy::Multi(Box::new(NoDirectRuntimeTypeChecks::new(app))),
        Policy::Multi(Box::new(SameParentClass::new(app))),
        Policy::Multi(Box::new(RespectPackageBoundaries)),
        Policy::Multi(Box::new(SameInstanceFields::new(app))),
        Policy::Multi(Box::new(NoVirtualMethodCollisions::new(app))),
        Policy::Multi(Box::new(LimitGroupSize::new(options.max_group_size))),
        Policy::Multi(Box::new(FinalizeMergeGroup::new(app))),
    ]
}

pub struct PolicyExecutor<'a> {
    app: &'a AppView,
    policies: Vec<Policy<'a>>,
}

impl<'a> PolicyExecutor<'a> {
    pub fn new(app: &'a AppView, policies: Vec<Policy<'a>>) -> Self {
        PolicyExecutor { app, policies }
    }

    /// Run every policy over `groups`. The result holds only groups of two
    /// or more classes.
    pub fn run(
        self,
        groups: Vec<MergeGroup>,
        report: &mut MergeReport,
    ) -> Result<Vec<MergeGroup>, MergeError> {
        let PolicyExecutor { app, policies } = self;
        let mut groups: Vec<MergeGroup> =
            groups.into_iter().filter(|g| !g.is_trivial()).collect();
        for mut policy in policies {
            if groups.is_empty() {
                break;
            }
            let name = policy.name();
            match &mut policy {
                Policy::Single(p) => {
                    let p: &dyn SingleClassPolicy = &**p;
                    let removed: Vec<Vec<TypeRef>> = groups
                        .par_iter_mut()
                        .map(|group| {
                            group.retain(|ty| {
                                app.program_definition_for(ty)
                                    .is_some_and(|class| p.can_merge(class))
                            })
                        })
                        .collect();
                    for classes in removed {
                        report.record_removed(name, &classes);
                    }
                }
                Policy::Multi(p) => {
                    p.preprocess(&groups)?;
                    groups = groups.into_iter().flat_map(|g| p.apply(g)).collect();
                }
            }
            let (kept, trivial): (Vec<_>, Vec<_>) =
                groups.into_iter().partition(|g| !g.is_trivial());
            for group in trivial {
                report.record_removed(name, group.classes());
            }
            groups = kept;
            tracing::trace!(policy = name, groups = groups.len(), "applied merge policy");
        }
        Ok(groups)
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
