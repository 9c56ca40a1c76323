//! Pass ordering.
//!
//! Every pass reads one [`AppView`] and the pipeline installs the next:
//! the pass's program and lens layer, then the bodies rewritten through
//! that layer, then a clear-code-rewriting layer so the next pass reads
//! code written against the current lens.

use pare_app::{
    AppView, FieldAccessInfoCollection, KeepInfo, MethodProcessor, RewriteError, RewriteStats,
};
use pare_argprop::{ArgumentPropagationResult, ArgumentPropagator};
use pare_enum::{analyze_instance_initializers, EnumUnboxer, UnboxingReport};
use pare_ir::lir::ir_to_lir;
use pare_ir::{Code, Program, ProgramMethod};
use pare_lens::GraphLens;
use pare_merge::{HorizontalClassMerger, MergeReport, MergeResult};

use crate::error::{Pass, PipelineError};
use crate::options::Options;
use crate::verify::verify_lenses;

/// The rewritten program and everything the passes found out about it.
pub struct CompilationResult {
    /// Every body is LIR written against `lens`.
    pub program: Program,
    /// The full chain, from the input names to the names in `program`.
    pub lens: GraphLens,
    pub merge_report: MergeReport,
    pub unboxing_report: UnboxingReport,
    pub argument_states: ArgumentPropagationResult,
}

pub struct Pipeline {
    options: Options,
}

impl Pipeline {
    pub fn new(options: Options) -> Self {
        Pipeline { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Run every enabled pass over `program` on a worker pool of
    /// [`Options::jobs`] threads.
    pub fn run(
        &self,
        program: Program,
        keep_info: KeepInfo,
    ) -> Result<CompilationResult, PipelineError> {
        let mut pool = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = self.options.jobs {
            pool = pool.num_threads(jobs);
        }
        let pool = pool.build()?;
        tracing::debug!(
            threads = pool.current_num_threads(),
            classes = program.len(),
            "starting pipeline"
        );
        pool.install(|| self.run_passes(program, keep_info))
    }

    fn run_passes(
        &self,
        program: Program,
        keep_info: KeepInfo,
    ) -> Result<CompilationResult, PipelineError> {
        let input = self.options.verify_lenses.then(|| program.clone());
        let app = AppView::new(program, keep_info);
        let app = app.with_program(normalize(&app)?);
        let field_access =
            FieldAccessInfoCollection::compute(app.program()).map_err(RewriteError::Scan)?;
        let mut app = app.with_field_access_info(field_access);

        let mut merge_report = MergeReport::default();
        if self.options.horizontal_class_merging {
            let (next, report) = self.merge_classes(&app)?;
            app = next;
            merge_report = report;
            if let Some(input) = &input {
                verify_lenses(input, &app, Pass::HorizontalClassMerging)?;
            }
        }

        let mut unboxing_report = UnboxingReport::default();
        if self.options.enum_unboxing {
            let (next, report) = self.unbox_enums(&app)?;
            app = next;
            unboxing_report = report;
            if let Some(input) = &input {
                verify_lenses(input, &app, Pass::EnumUnboxing)?;
            }
        }

        let argument_states = if self.options.argument_propagation {
            self.propagate_arguments(&app)?
        } else {
            ArgumentPropagationResult::default()
        };

        tracing::debug!(
            classes = app.program().len(),
            lens_depth = app.lens().depth(),
            "pipeline finished"
        );
        Ok(CompilationResult {
            program: app.program().clone(),
            lens: app.lens().clone(),
            merge_report,
            unboxing_report,
            argument_states,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn merge_classes(&self, app: &AppView) -> Result<(AppView, MergeReport), PipelineError> {
        let options = self.options.merger_options();
        let MergeResult {
            program,
            lens,
            synthesized,
            field_access,
            report,
        } = HorizontalClassMerger::new(app, &options).run()?;
        if lens.ptr_eq(app.lens()) {
            return Ok((app.clone(), report));
        }

        let rewritten = app.rewritten_with_lens(program, lens);
        let rewritten =
            rewritten.with_field_access_info(field_access.apply(rewritten.field_access_info()));
        let (program, stats) = MethodProcessor::new(&rewritten)
            .with_synthesized(synthesized)
            .rewrite_code()?;
        log_rewrite(Pass::HorizontalClassMerging, &stats);
        tracing::debug!(
            merged = report.merged_class_count(),
            groups = report.merged_groups().count(),
            "horizontal class merging done"
        );
        Ok((rewritten.with_cleared_code_rewriting(program), report))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn unbox_enums(&self, app: &AppView) -> Result<(AppView, UnboxingReport), PipelineError> {
        let app = app.with_program(analyze_instance_initializers(app.program())?);
        let options = self.options.unboxer_options();
        let mut result = EnumUnboxer::new(&app, &options).run()?;
        if result.lens.ptr_eq(app.lens()) {
            return Ok((app, result.report));
        }

        let rewritten = app.rewritten_with_lens(result.program.clone(), result.lens.clone());
        let field_access =
            std::mem::take(&mut result.field_access).apply(rewritten.field_access_info());
        let rewritten = rewritten.with_field_access_info(field_access);
        let (program, stats) = result.rewrite_code(&rewritten)?;
        log_rewrite(Pass::EnumUnboxing, &stats);
        tracing::debug!(
            unboxed = result.enums.len(),
            rejected = result.report.rejected().count(),
            "enum unboxing done"
        );
        Ok((rewritten.with_cleared_code_rewriting(program), result.report))
    }

    #[tracing::instrument(level = "debug", skip_all)]
    fn propagate_arguments(
        &self,
        app: &AppView,
    ) -> Result<ArgumentPropagationResult, PipelineError> {
        let options = self.options.propagator_options();
        let result = ArgumentPropagator::new(app, &options).run()?;
        let informative = result
            .method_states()
            .filter(|(_, state)| !state.is_bottom() && !state.is_unknown())
            .count();
        tracing::debug!(methods = informative, "argument propagation done");
        Ok(result)
    }
}

/// `app`'s program with every IR body encoded as LIR.
fn normalize(app: &AppView) -> Result<Program, RewriteError> {
    let program = MethodProcessor::new(app).process_methods(|_, method| encode(method))?;
    tracing::debug!(classes = program.len(), "normalized code to LIR");
    Ok(program)
}

fn encode(method: &ProgramMethod) -> Result<Option<ProgramMethod>, RewriteError> {
    let Some(Code::Ir(ir)) = &method.code else {
        return Ok(None);
    };
    let lir = ir_to_lir(ir).map_err(|e| RewriteError::lir(&method.reference, e))?;
    Ok(Some(ProgramMethod {
        code: Some(lir.into()),
        ..method.clone()
    }))
}

fn log_rewrite(pass: Pass, stats: &RewriteStats) {
    tracing::debug!(
        %pass,
        unchanged = stats.unchanged,
        patched = stats.patched,
        rebuilt = stats.rebuilt,
        synthesized = stats.skipped,
        "rewrote code"
    );
}
