//! The horizontal class merger pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use pare_app::{AppView, FieldAccessInfoModifier};
use pare_ir::{AccessFlags, MethodRef, Program, ProgramClass, TypeRef};
use pare_lens::{GraphLens, LensBuilder, LensKind};

use crate::constructors::ConstructorMerger;
use crate::error::MergeError;
use crate::fields::merge_instance_fields;
use crate::group::{MergeGroup, TypeMap};
use crate::policies::{default_policies, Policy, PolicyExecutor};
use crate::report::MergeReport;
use crate::synthetic_argument::SyntheticArgumentClass;
use crate::tree_fixer::{FixupClass, TreeFixer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergerOptions {
    /// Larger groups are split into chunks of this size.
    pub max_group_size: usize,
}

impl Default for MergerOptions {
    fn default() -> Self {
        MergerOptions { max_group_size: 30 }
    }
}

/// What a merger run produced. Bodies in `program` are still written
/// against the lens the run started from.
pub struct MergeResult {
    pub program: Program,
    pub lens: GraphLens,
    /// Dispatching constructors; their bodies already use the new names.
    pub synthesized: Vec<MethodRef>,
    /// Accesses of the class id fields by the dispatching constructors.
    pub field_access: FieldAccessInfoModifier,
    pub report: MergeReport,
}

pub struct HorizontalClassMerger<'a> {
    app: &'a AppView,
    options: &'a MergerOptions,
}

impl<'a> HorizontalClassMerger<'a> {
    pub fn new(app: &'a AppView, options: &'a MergerOptions) -> Self {
        HorizontalClassMerger { app, options }
    }

    pub fn run(self) -> Result<MergeResult, MergeError> {
        let policies = default_policies(self.app, self.options);
        self.run_with_policies(policies)
    }

    /// Run with a custom policy sequence. The last policy must pick the
    /// targets, as [`FinalizeMergeGroup`](crate::policies::FinalizeMergeGroup)
    /// does.
    pub fn run_with_policies(self, policies: Vec<Policy<'a>>) -> Result<MergeResult, MergeError> {
        let app = self.app;
        let mut report = MergeReport::new();
        let candidates = discover_groups(app.program());
        let candidate_count: usize = candidates.iter().map(MergeGroup::len).sum();
        let groups: Vec<MergeGroup> = PolicyExecutor::new(app, policies)
            .run(candidates, &mut report)?
            .into_iter()
            .filter(|g| g.target().is_some())
            .collect();
        if groups.is_empty() {
            tracing::debug!(candidates = candidate_count, "no classes merged");
            return Ok(MergeResult {
                program: app.program().clone(),
                lens: app.lens().clone(),
                synthesized: Vec::new(),
                field_access: FieldAccessInfoModifier::new(),
                report,
            });
        }

        let type_map = TypeMap::from_groups(&groups);
        let smallest_target = groups.iter().filter_map(MergeGroup::target).min();
        let mut synthetic_argument = SyntheticArgumentClass::new(
            app.program(),
            smallest_target.unwrap_or_else(pare_ir::known::object),
        );
        let mut builder = LensBuilder::new(LensKind::HorizontalClassMerger);
        let mut field_access = FieldAccessInfoModifier::new();
        let mut synthesized = Vec::new();
        let mut merged_classes: BTreeMap<TypeRef, FixupClass> = BTreeMap::new();

        for group in &groups {
            let Some(fixup) = merge_group(
                app,
                group,
                &type_map,
                &mut synthetic_argument,
                &mut builder,
                &mut field_access,
                &mut synthesized,
            )?
            else {
                continue;
            };
            let merged_into = fixup.class.ty;
            merged_classes.insert(merged_into, fixup);
            let sources: Vec<TypeRef> = group.sources().collect();
            tracing::trace!(
                %merged_into,
                sources = sources.len(),
                class_id = group.class_id_field().is_some(),
                "merged group"
            );
            report.record_merged(merged_into, sources);
        }

        let mut fixups: Vec<FixupClass> = Vec::new();
        for class in app.program().program_classes() {
            if let Some(merged) = merged_classes.remove(&class.ty) {
                fixups.push(merged);
            } else if !type_map.is_source(class.ty) {
                fixups.push(FixupClass::unmerged(class, &type_map));
            }
        }
        let fixed = TreeFixer::new(app, &type_map, &mut builder, &mut synthetic_argument).fix(fixups);

        for group in &groups {
            let target = fixup_target(group);
            builder.move_type(target, target);
            for source in group.sources() {
                builder.move_type(source, target);
            }
        }

        let mut program: Program = app
            .program()
            .classes()
            .filter(|c| c.is_library())
            .cloned()
            .chain(fixed.into_iter().map(|class| reuse_unchanged(app, class)))
            .collect();
        if let Some(class) = synthetic_argument.into_class() {
            program.insert(class);
        }
        let lens = builder.build(app.lens())?;
        tracing::debug!(
            groups = groups.len(),
            merged = report.merged_class_count(),
            synthesized = synthesized.len(),
            "horizontal class merging done"
        );
        Ok(MergeResult {
            program,
            lens,
            synthesized,
            field_access,
            report,
        })
    }
}

/// Program classes grouped by superclass, interface-ness and
/// abstractness, in type order.
fn discover_groups(program: &Program) -> Vec<MergeGroup> {
    let mut buckets: BTreeMap<(Option<TypeRef>, bool, bool), Vec<TypeRef>> = BTreeMap::new();
    for class in program.program_classes() {
        buckets
            .entry((class.superclass, class.is_interface(), class.is_abstract()))
            .or_default()
            .push(class.ty);
    }
    buckets
        .into_iter()
        .map(|((_, is_interface, _), classes)| MergeGroup::new(classes, is_interface))
        .collect()
}

fn fixup_target(group: &MergeGroup) -> TypeRef {
    group.target().unwrap_or_else(|| unreachable!("finalized groups have a target"))
}

/// Fuse the members of `group` into its target. Constructors and instance
/// fields are placed here; the remaining members are left to the tree fixer.
fn merge_group(
    app: &AppView,
    group: &MergeGroup,
    type_map: &TypeMap,
    synthetic_argument: &mut SyntheticArgumentClass,
    builder: &mut LensBuilder,
    field_access: &mut FieldAccessInfoModifier,
    synthesized: &mut Vec<MethodRef>,
) -> Result<Option<FixupClass>, MergeError> {
    let Some(target) = group.target().and_then(|t| app.definition_for(t)) else {
        return Ok(None);
    };
    let members: Vec<&Arc<ProgramClass>> = group
        .classes()
        .iter()
        .filter_map(|&ty| app.definition_for(ty))
        .collect();

    let fields = merge_instance_fields(app, group, type_map);
    for &(merged, original) in &fields.representatives {
        builder.set_representative_field(merged, original);
    }
    let constructors = ConstructorMerger {
        app,
        group,
        type_map,
    }
    .merge(synthetic_argument, builder, field_access)?;
    synthesized.extend(constructors.synthesized);

    let mut access = target.access;
    if members.iter().any(|c| c.access.contains(AccessFlags::PUBLIC)) {
        access = access.promote_to_public();
    }
    if members.iter().any(|c| !c.access.contains(AccessFlags::FINAL)) {
        access.remove(AccessFlags::FINAL);
    }
    let mut fixup = FixupClass::unmerged(target, type_map);
    fixup.class.access = access;
    fixup.class.fields = fields.fields;
    fixup.class.methods = constructors.placed;
    fixup.field_moves = fields.moves;
    fixup.pending_fields = members
        .iter()
        .flat_map(|c| c.static_fields())
        .cloned()
        .collect();
    fixup.pending_methods = members
        .iter()
        .flat_map(|c| c.methods.iter())
        .filter(|m| !m.is_instance_initializer())
        .cloned()
        .chain(constructors.pending)
        .collect();
    Ok(Some(fixup))
}

/// The input class when fixing changed nothing, so untouched classes keep
/// sharing their definitions.
fn reuse_unchanged(app: &AppView, class: ProgramClass) -> Arc<ProgramClass> {
    match app.definition_for(class.ty) {
        Some(original) if **original == class => Arc::clone(original),
        _ => Arc::new(class),
    }
}
