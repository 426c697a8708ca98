//! One generator pass over a compilation.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use ctfe_core::codes;
use ctfe_core::config::CtfeConfig;
use ctfe_core::diagnostic;
use ctfe_core::diagnostics::DiagnosticSink;
use ctfe_core::host::{Compilation, GeneratedUnit, InterceptionHost, PluginLoader};
use ctfe_core::model::{
    group_call_sites, AnnotatedFunction, CallSite, CallSiteKind, CallSiteOutcome, FunctionId,
    ValidationFailure,
};
use ctfe_core::shape::Shape;
use ctfe_interpret::const_eval;
use ctfe_interpret::{EvalError, EvaluationEngine, ImageEmitter, PreparedImage, ResolutionScope};
use ctfe_rust::{
    check_return_capability, discover_all, serialize, shape_of_text, synthesize, CallSiteAnalyzer,
    GroupResult, ParsedCrate, SymbolIndex,
};
use tracing::{debug, info, info_span, warn};

use crate::cancel::CancellationToken;
use crate::error::Result;

/// Discovery and call-site analysis joined by function identity.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Every marked function in discovery order, valid or not.
    pub functions: Vec<AnnotatedFunction>,
    /// Accepted call sites of valid functions.
    pub sites: HashMap<FunctionId, Vec<CallSite>>,
}

impl Analysis {
    pub fn sites_of(&self, function: &FunctionId) -> &[CallSite] {
        self.sites
            .get(function)
            .map(|sites| sites.as_slice())
            .unwrap_or_default()
    }
}

pub struct GeneratorPass<'a> {
    config: &'a CtfeConfig,
    host: &'a dyn InterceptionHost,
    plugins: &'a dyn PluginLoader,
    sink: &'a dyn DiagnosticSink,
    emitter: &'a dyn ImageEmitter,
    cancel: CancellationToken,
}

impl<'a> GeneratorPass<'a> {
    pub fn new(
        config: &'a CtfeConfig,
        host: &'a dyn InterceptionHost,
        plugins: &'a dyn PluginLoader,
        sink: &'a dyn DiagnosticSink,
        emitter: &'a dyn ImageEmitter,
    ) -> Self {
        Self {
            config,
            host,
            plugins,
            sink,
            emitter,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Discover marked functions and classify their call sites, reporting
    /// declaration and call-site diagnostics. `None` when cancelled.
    pub fn analyze(&self, compilation: &Compilation) -> Result<Option<Analysis>> {
        let parsed = ParsedCrate::parse(compilation)?;
        let cancelled = || self.cancel.is_cancelled();
        let Some(functions) = discover_all(&parsed, &self.config.markers, cancelled) else {
            return Ok(None);
        };
        debug!("Discovered {} compile-time function(s)", functions.len());
        for function in &functions {
            self.report_failures(function);
        }

        let index = SymbolIndex::build(&parsed);
        let analyzer = CallSiteAnalyzer::new(&index, &functions, self.host);
        let Some(outcomes) = analyzer.analyze(&parsed, cancelled) else {
            return Ok(None);
        };

        let valid: HashMap<&FunctionId, &AnnotatedFunction> = functions
            .iter()
            .filter(|f| f.is_valid())
            .map(|f| (&f.id, f))
            .collect();
        let mut sites: HashMap<FunctionId, Vec<CallSite>> = HashMap::new();
        for outcome in outcomes {
            match outcome {
                CallSiteOutcome::Site(site) => {
                    let Some(function) = valid.get(&site.function) else {
                        continue;
                    };
                    if let CallSiteKind::Rejected { offending } = &site.kind {
                        self.sink.report(diagnostic!(
                            codes::NON_LITERAL_ARGUMENT,
                            Some(site.location.clone()),
                            function.name,
                            offending
                        ));
                        continue;
                    }
                    sites.entry(site.function.clone()).or_default().push(site);
                }
                CallSiteOutcome::Skipped { function, location } => {
                    warn!("Call to `{}` at {} cannot be intercepted", function, location);
                    self.sink.report(diagnostic!(
                        codes::CALL_SITE_SKIPPED,
                        Some(location),
                        function
                    ));
                }
            }
        }

        Ok(Some(Analysis { functions, sites }))
    }

    /// Run a full pass: analyze, evaluate every argument group and
    /// synthesize one unit per function with results. `None` when
    /// cancelled.
    pub fn run(&self, compilation: &Compilation) -> Result<Option<Vec<GeneratedUnit>>> {
        let Some(analysis) = self.analyze(compilation)? else {
            return Ok(None);
        };
        let pending: Vec<&AnnotatedFunction> = analysis
            .functions
            .iter()
            .filter(|f| f.is_valid() && !analysis.sites_of(&f.id).is_empty())
            .collect();
        if pending.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let scope = ResolutionScope::acquire(&self.config.markers)?;
        let engine = EvaluationEngine::new(self.config, self.emitter, &scope, self.plugins);
        let mut units = Vec::new();
        for function in pending {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let _span = info_span!("function", id = %function.id).entered();
            let sites = analysis.sites_of(&function.id);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.generate(&engine, compilation, function, sites)
            }));
            match outcome {
                Ok(Some(unit)) => units.push(unit),
                Ok(None) => {}
                Err(payload) => {
                    self.sink.report(diagnostic!(
                        codes::INTERNAL_ERROR,
                        Some(function.location.clone()),
                        function.id,
                        panic_message(payload.as_ref())
                    ));
                }
            }
        }
        Ok(Some(units))
    }

    fn report_failures(&self, function: &AnnotatedFunction) {
        for failure in &function.failures {
            let location = Some(function.location.clone());
            let diagnostic = match failure {
                ValidationFailure::NotExtensible { container } => {
                    diagnostic!(codes::NOT_EXTENSIBLE, location, function.id, container)
                }
                ValidationFailure::NotStatic => diagnostic!(codes::NOT_STATIC, location, function.id),
                ValidationFailure::Async => diagnostic!(codes::ASYNC_FUNCTION, location, function.id),
                ValidationFailure::MalformedDirective { attribute, message } => diagnostic!(
                    codes::MALFORMED_DIRECTIVE,
                    location,
                    function.id,
                    attribute,
                    message
                ),
            };
            self.sink.report(diagnostic);
        }
    }

    fn shape(&self, function: &AnnotatedFunction) -> Option<Shape> {
        let location = Some(function.location.clone());
        let Some(return_type) = &function.return_type else {
            self.sink.report(diagnostic!(
                codes::UNSUPPORTED_RETURN_TYPE,
                location,
                function.id,
                "()",
                "it returns no value"
            ));
            return None;
        };
        let checked = shape_of_text(return_type)
            .and_then(|shape| check_return_capability(&shape).map(|_| shape));
        match checked {
            Ok(shape) => Some(shape),
            Err(err) => {
                let reason = match err {
                    ctfe_core::Error::UnsupportedType(reason) => reason,
                    other => other.to_string(),
                };
                self.sink.report(diagnostic!(
                    codes::UNSUPPORTED_RETURN_TYPE,
                    location,
                    function.id,
                    return_type,
                    reason
                ));
                None
            }
        }
    }

    fn prepare(
        &self,
        engine: &EvaluationEngine<'_>,
        compilation: &Compilation,
        function: &AnnotatedFunction,
    ) -> Option<PreparedImage> {
        match engine.prepare(compilation, function) {
            Ok(image) => Some(image),
            Err(err) => {
                let location = Some(function.location.clone());
                let diagnostic = match &err {
                    EvalError::Load(message) => {
                        diagnostic!(codes::LOAD_FAILED, location, function.id, message)
                    }
                    other => diagnostic!(
                        codes::EMIT_FAILED,
                        location,
                        function.id,
                        other.messages().join("\n")
                    ),
                };
                self.sink.report(diagnostic);
                None
            }
        }
    }

    fn generate(
        &self,
        engine: &EvaluationEngine<'_>,
        compilation: &Compilation,
        function: &AnnotatedFunction,
        sites: &[CallSite],
    ) -> Option<GeneratedUnit> {
        let shape = self.shape(function)?;
        let image = self.prepare(engine, compilation, function)?;

        let mut results = Vec::new();
        for group in group_call_sites(sites.iter().cloned()) {
            if self.cancel.is_cancelled() {
                return None;
            }
            let location = group.sites.first().map(|site| site.location.clone());
            let args = group.display_args();
            let evaluated = match engine.invoke(&image, &shape, &group.args, group.caller_module()) {
                Ok(evaluated) => evaluated,
                Err(EvalError::Decode(message)) => {
                    self.sink.report(diagnostic!(
                        codes::SERIALIZATION_FAILED,
                        location,
                        function.name,
                        args,
                        message
                    ));
                    continue;
                }
                Err(err) => {
                    self.sink.report(diagnostic!(
                        codes::INVOCATION_FAILED,
                        location,
                        function.name,
                        args,
                        err
                    ));
                    continue;
                }
            };

            let literal = match serialize(&evaluated.value, &shape) {
                Ok(literal) => literal,
                Err(err) => {
                    self.sink.report(diagnostic!(
                        codes::SERIALIZATION_FAILED,
                        location,
                        function.name,
                        args,
                        err
                    ));
                    continue;
                }
            };
            if self.config.evaluation.verify_round_trip {
                let reason = match const_eval::evaluate_text(literal.as_str(), &shape) {
                    Ok(value) if value == evaluated.value => None,
                    Ok(_) => Some(format!("`{}` does not evaluate back to the same value", literal)),
                    Err(err) => Some(err.to_string()),
                };
                if let Some(reason) = reason {
                    self.sink.report(diagnostic!(
                        codes::SERIALIZATION_FAILED,
                        location,
                        function.name,
                        args,
                        reason
                    ));
                    continue;
                }
            }
            debug!("`{}({})` = {}", function.name, args, literal);
            results.push(GroupResult {
                args: group.args,
                literal,
                sites: group.sites,
            });
        }

        if results.is_empty() {
            return None;
        }
        let serviced: usize = results.iter().map(|result| result.sites.len()).sum();
        let unit = synthesize(function, &shape, &results);
        info!("Generated {} for {} call site(s)", unit.name, serviced);
        self.sink.report(diagnostic!(
            codes::GENERATED,
            Some(function.location.clone()),
            function.id,
            results.len(),
            serviced
        ));
        Some(unit)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
