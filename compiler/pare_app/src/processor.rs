//! Parallel per-method processing of the whole program.
//!
//! # Architecture
//!
//! Classes are processed in parallel on the ambient rayon pool, methods of
//! one class sequentially. A class whose methods all came back unchanged is
//! reused as the same `Arc`; only touched classes are cloned. Results are
//! collected in type order, so the produced program never depends on
//! scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pare_ir::lir::ir_to_lir;
use pare_ir::{Code, MethodRef, Program, ProgramClass, ProgramMethod};
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::error::RewriteError;
use crate::lir_rewriter::{LirLensCodeRewriter, LirRewrite};
use crate::rewriter::LensCodeRewriter;
use crate::AppView;

/// How many bodies [`MethodProcessor::rewrite_code`] left alone, patched or
/// rebuilt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub unchanged: usize,
    pub patched: usize,
    pub rebuilt: usize,
    /// Bodies synthesized against the current lens.
    pub skipped: usize,
}

#[derive(Default)]
struct Counters {
    unchanged: AtomicUsize,
    patched: AtomicUsize,
    rebuilt: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RewriteStats {
        RewriteStats {
            unchanged: self.unchanged.load(Ordering::Relaxed),
            patched: self.patched.load(Ordering::Relaxed),
            rebuilt: self.rebuilt.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

pub struct MethodProcessor<'a> {
    app: &'a AppView,
    synthesized: FxHashSet<MethodRef>,
}

impl<'a> MethodProcessor<'a> {
    pub fn new(app: &'a AppView) -> Self {
        MethodProcessor {
            app,
            synthesized: FxHashSet::default(),
        }
    }

    /// Methods whose bodies are already written against the current lens.
    #[must_use]
    pub fn with_synthesized(mut self, methods: impl IntoIterator<Item = MethodRef>) -> Self {
        self.synthesized.extend(methods);
        self
    }

    /// Apply `f` to every method of every program class. `f` returns the
    /// replacement method, or `None` to keep it.
    pub fn process_methods<F, E>(&self, f: F) -> Result<Program, E>
    where
        F: Fn(&ProgramClass, &ProgramMethod) -> Result<Option<ProgramMethod>, E> + Sync,
        E: Send,
    {
        let classes: Vec<&Arc<ProgramClass>> = self.app.program().classes().collect();
        let processed = classes
            .par_iter()
            .map(|class| process_class(class, &f))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(processed.into_iter().collect())
    }

    /// Rewrite every body from the code lens to the current lens and encode
    /// it as LIR.
    pub fn rewrite_code(&self) -> Result<(Program, RewriteStats), RewriteError> {
        let counters = Counters::default();
        let rewriter = LensCodeRewriter::for_app(self.app);
        let lir_rewriter = LirLensCodeRewriter::for_app(self.app);
        let program = self.process_methods(|_, method| {
            let Some(code) = &method.code else {
                return Ok(None);
            };
            let reference = &method.reference;
            let rewritten: Code = match code {
                Code::Ir(ir) if self.synthesized.contains(reference) => {
                    Counters::bump(&counters.skipped);
                    ir_to_lir(ir)
                        .map_err(|e| RewriteError::lir(reference, e))?
                        .into()
                }
                Code::Lir(_) if self.synthesized.contains(reference) => {
                    Counters::bump(&counters.skipped);
                    return Ok(None);
                }
                Code::Ir(ir) => {
                    let ir = rewriter.rewrite((**ir).clone(), reference, method.is_static());
                    Counters::bump(&counters.rebuilt);
                    ir_to_lir(&ir)
                        .map_err(|e| RewriteError::lir(reference, e))?
                        .into()
                }
                Code::Lir(lir) => {
                    match lir_rewriter
                        .rewrite(lir, reference, method.is_static())
                        .map_err(|e| RewriteError::lir(reference, e))?
                    {
                        LirRewrite::Unchanged => {
                            Counters::bump(&counters.unchanged);
                            return Ok(None);
                        }
                        LirRewrite::Patched(code) => {
                            Counters::bump(&counters.patched);
                            code.into()
                        }
                        LirRewrite::Rebuilt(code) => {
                            Counters::bump(&counters.rebuilt);
                            code.into()
                        }
                    }
                }
            };
            Ok(Some(ProgramMethod {
                code: Some(rewritten),
                ..method.clone()
            }))
        })?;
        let stats = counters.snapshot();
        tracing::debug!(
            unchanged = stats.unchanged,
            patched = stats.patched,
            rebuilt = stats.rebuilt,
            skipped = stats.skipped,
            "rewrote code to current lens"
        );
        Ok((program, stats))
    }
}

fn process_class<F, E>(class: &Arc<ProgramClass>, f: &F) -> Result<Arc<ProgramClass>, E>
where
    F: Fn(&ProgramClass, &ProgramMethod) -> Result<Option<ProgramMethod>, E>,
{
    if class.is_library() {
        return Ok(Arc::clone(class));
    }
    let mut replaced: Option<Vec<ProgramMethod>> = None;
    for (i, method) in class.methods.iter().enumerate() {
        if let Some(new_method) = f(class, method)? {
            replaced.get_or_insert_with(|| class.methods.clone())[i] = new_method;
        }
    }
    Ok(match replaced {
        Some(methods) => Arc::new(ProgramClass {
            methods,
            ..(**class).clone()
        }),
        None => Arc::clone(class),
    })
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
