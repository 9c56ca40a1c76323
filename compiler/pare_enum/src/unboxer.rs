//! The enum unboxing pass.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pare_app::{
    AppView, FieldAccessInfoModifier, LensCodeRewriter, LirLensCodeRewriter, LirRewrite,
    MethodProcessor, RewriteError, RewriteStats,
};
use pare_ir::lir::{ir_to_lir, lir_to_ir};
use pare_ir::{Code, MethodRef, Program, ProgramClass, ProgramMethod, TypeRef};
use pare_lens::{GraphLens, LensBuilder, LensKind};
use rustc_hash::FxHashSet;

use crate::candidates::analyze_candidates;
use crate::class_initializers::{fix_class_initializers, FixedEnum};
use crate::enum_data::EnumDataMap;
use crate::error::EnumError;
use crate::report::{Reasons, UnboxingReport};
use crate::rewriter::{EnumCodeRewriter, UnboxedEnums};
use crate::tree_fixer::{DissolvedEnum, TreeFixer};
use crate::use_sites::analyze_use_sites;
use crate::utility::{LocalUtility, SharedUtility};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnboxerOptions {
    /// Enums with more instance fields keep their instances.
    pub max_instance_fields: usize,
    /// Stop collecting reasons for an enum after the first one.
    pub early_exit: bool,
}

impl Default for UnboxerOptions {
    fn default() -> Self {
        UnboxerOptions {
            max_instance_fields: 7,
            early_exit: false,
        }
    }
}

/// What an unboxer run produced. Bodies in `program` are still written
/// against the lens the run started from; [`UnboxingResult::rewrite_code`]
/// brings them up to date.
pub struct UnboxingResult {
    pub program: Program,
    pub lens: GraphLens,
    pub enums: EnumDataMap,
    /// Utility methods; their bodies already use the new names.
    pub synthesized: Vec<MethodRef>,
    /// Accesses of the shared `$VALUES` array.
    pub field_access: FieldAccessInfoModifier,
    pub report: UnboxingReport,
    unboxed: Option<UnboxedEnums>,
}

pub struct EnumUnboxer<'a> {
    app: &'a AppView,
    options: &'a UnboxerOptions,
}

impl<'a> EnumUnboxer<'a> {
    pub fn new(app: &'a AppView, options: &'a UnboxerOptions) -> Self {
        EnumUnboxer { app, options }
    }

    pub fn run(self) -> Result<UnboxingResult, EnumError> {
        let app = self.app;
        let mut reasons = Reasons::new(self.options.early_exit);
        let tracked = analyze_candidates(app, self.options, &mut reasons);
        let use_sites = analyze_use_sites(app, &tracked, self.options.early_exit, &mut reasons)?;

        let remaining: Vec<&ProgramClass> = tracked
            .iter()
            .filter(|&&ty| !reasons.is_rejected(ty))
            .filter_map(|&ty| app.definition_for(ty))
            .map(|c| &**c)
            .collect();
        let mut fixed: BTreeMap<TypeRef, FixedEnum> = BTreeMap::new();
        for (ty, fixing) in fix_class_initializers(&remaining, &use_sites.read_instance_fields)? {
            match fixing {
                Ok(fixed_enum) => {
                    fixed.insert(ty, fixed_enum);
                }
                Err(rejections) => {
                    for reason in rejections {
                        reasons.add(ty, reason);
                    }
                }
            }
        }

        let mut report = UnboxingReport::new();
        report.record_rejections(reasons);
        for &ty in fixed.keys() {
            report.record_unboxed(ty);
        }
        let Some(&smallest) = fixed.keys().next() else {
            tracing::debug!(candidates = tracked.len(), "no enums unboxed");
            return Ok(UnboxingResult {
                program: app.program().clone(),
                lens: app.lens().clone(),
                enums: EnumDataMap::default(),
                synthesized: Vec::new(),
                field_access: FieldAccessInfoModifier::new(),
                report,
                unboxed: None,
            });
        };

        let program = app.program();
        let unboxed_types: BTreeSet<TypeRef> = fixed.keys().copied().collect();
        let max_values_size = fixed
            .values()
            .map(|f| f.data.values_size())
            .max()
            .unwrap_or(0);
        let shared = SharedUtility::new(program, smallest, max_values_size);
        let locals: BTreeMap<TypeRef, LocalUtility> = unboxed_types
            .iter()
            .map(|&ty| (ty, LocalUtility::new(program, ty)))
            .collect();

        let mut builder = LensBuilder::new(LensKind::EnumUnboxing);
        let mut field_access = FieldAccessInfoModifier::new();
        let mut synthesized = Vec::new();
        let mut enums = EnumDataMap::default();
        let mut classes: Vec<Arc<ProgramClass>> = program
            .classes()
            .filter(|c| c.is_library())
            .cloned()
            .collect();
        {
            let mut fixer = TreeFixer::new(
                program.program_classes().map(|c| &**c),
                &unboxed_types,
                shared.ty(),
                &mut builder,
            );
            for (ty, FixedEnum { data, class_initializer }) in fixed {
                let (Some(class), Some(local)) = (app.definition_for(ty), locals.get(&ty)) else {
                    continue;
                };
                let (local_class, methods) = fixer.dissolve(DissolvedEnum {
                    class: class.as_ref(),
                    data: &data,
                    class_initializer,
                    local,
                })?;
                tracing::trace!(
                    enum_type = %ty,
                    utility = %local.ty(),
                    constants = data.values_size(),
                    "unboxed enum"
                );
                synthesized.extend(methods);
                classes.push(Arc::new(local_class));
                enums.insert(ty, data);
            }
            for class in program.program_classes() {
                if !unboxed_types.contains(&class.ty) {
                    classes.push(reuse_unchanged(class, fixer.fix_class(class)));
                }
            }
        }
        let (shared_class, methods) = shared.build(&mut field_access)?;
        synthesized.extend(methods);
        classes.push(Arc::new(shared_class));

        let lens = builder.build(app.lens())?;
        tracing::debug!(
            unboxed = enums.len(),
            rejected = report.rejected().count(),
            synthesized = synthesized.len(),
            "enum unboxing done"
        );
        let unboxed = UnboxedEnums {
            classes: unboxed_types
                .iter()
                .filter_map(|&ty| Some((ty, Arc::clone(app.definition_for(ty)?))))
                .collect(),
            shared,
            locals,
        };
        Ok(UnboxingResult {
            program: classes.into_iter().collect(),
            lens,
            enums,
            synthesized,
            field_access,
            report,
            unboxed: Some(unboxed),
        })
    }
}

impl UnboxingResult {
    /// Rewrite every body of `app` to the current lens. `app` must be the
    /// view the run started from, rewritten with this result's program and
    /// lens.
    pub fn rewrite_code(&self, app: &AppView) -> Result<(Program, RewriteStats), EnumError> {
        let Some(unboxed) = &self.unboxed else {
            return MethodProcessor::new(app)
                .rewrite_code()
                .map_err(EnumError::from);
        };
        let enum_rewriter = EnumCodeRewriter::new(unboxed, &self.enums);
        let lens_rewriter = LensCodeRewriter::for_app(app);
        let lir_rewriter = LirLensCodeRewriter::for_app(app);
        let synthesized: FxHashSet<&MethodRef> = self.synthesized.iter().collect();
        let unchanged = AtomicUsize::new(0);
        let patched = AtomicUsize::new(0);
        let rebuilt = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let bump = |counter: &AtomicUsize| {
            counter.fetch_add(1, Ordering::Relaxed);
        };

        let program = MethodProcessor::new(app).process_methods(|_, method| -> Result<Option<ProgramMethod>, EnumError> {
            let Some(code) = &method.code else {
                return Ok(None);
            };
            let reference = &method.reference;
            let is_static = method.is_static();
            let mut ir = match code {
                Code::Ir(ir) if synthesized.contains(reference) => {
                    bump(&skipped);
                    let lir = ir_to_lir(ir).map_err(|e| RewriteError::lir(reference, e))?;
                    return Ok(Some(with_code(method, lir.into())));
                }
                Code::Lir(_) if synthesized.contains(reference) => {
                    bump(&skipped);
                    return Ok(None);
                }
                Code::Ir(ir) => (**ir).clone(),
                Code::Lir(lir) => {
                    let previous = app
                        .lens()
                        .get_previous_method_signature(reference, app.code_lens());
                    if !unboxed.mentioned_by(lir) && !unboxed.method_mentions(&previous) {
                        let rewrite = lir_rewriter
                            .rewrite(lir, reference, is_static)
                            .map_err(|e| RewriteError::lir(reference, e))?;
                        let counter = match &rewrite {
                            LirRewrite::Unchanged => &unchanged,
                            LirRewrite::Patched(_) => &patched,
                            LirRewrite::Rebuilt(_) => &rebuilt,
                        };
                        bump(counter);
                        return Ok(rewrite
                            .into_code()
                            .map(|lir| with_code(method, lir.into())));
                    }
                    let argument_types = previous.argument_types(is_static);
                    lir_to_ir(lir, previous, is_static, &argument_types).map_err(|source| {
                        EnumError::Decode {
                            method: reference.clone(),
                            source,
                        }
                    })?
                }
            };
            enum_rewriter.rewrite(&mut ir);
            let ir = lens_rewriter.rewrite(ir, reference, is_static);
            let lir = ir_to_lir(&ir).map_err(|source| EnumError::Encode {
                method: reference.clone(),
                source,
            })?;
            bump(&rebuilt);
            Ok(Some(with_code(method, lir.into())))
        })?;

        let stats = RewriteStats {
            unchanged: unchanged.into_inner(),
            patched: patched.into_inner(),
            rebuilt: rebuilt.into_inner(),
            skipped: skipped.into_inner(),
        };
        tracing::debug!(
            unchanged = stats.unchanged,
            patched = stats.patched,
            rebuilt = stats.rebuilt,
            skipped = stats.skipped,
            "rewrote code after enum unboxing"
        );
        Ok((program, stats))
    }
}

fn with_code(method: &ProgramMethod, code: Code) -> ProgramMethod {
    ProgramMethod {
        code: Some(code),
        ..method.clone()
    }
}

/// The input class when fixing changed nothing, so untouched classes keep
/// sharing their definitions.
fn reuse_unchanged(original: &Arc<ProgramClass>, class: ProgramClass) -> Arc<ProgramClass> {
    if **original == class {
        Arc::clone(original)
    } else {
        Arc::new(class)
    }
}
