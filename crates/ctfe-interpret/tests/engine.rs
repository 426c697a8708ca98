use std::sync::Arc;

use ctfe_core::config::CtfeConfig;
use ctfe_core::host::{Compilation, ExternRef, PluginLoader, SourceGenerator, SourceUnit};
use ctfe_core::model::AnnotatedFunction;
use ctfe_core::shape::{Primitive, Shape};
use ctfe_core::value::Value;
use ctfe_interpret::{EvalError, EvaluationEngine, ResolutionScope, RustcEmitter};
use ctfe_rust::{discover_all, ParsedCrate};
use pretty_assertions::assert_eq;

struct NoPlugins;

impl PluginLoader for NoPlugins {
    fn load(&self, name: &str) -> ctfe_core::Result<Arc<dyn SourceGenerator>> {
        Err(ctfe_core::Error::Generic(format!("unknown plugin `{}`", name)))
    }
}

fn emitter(config: &CtfeConfig) -> Option<RustcEmitter> {
    let emitter = RustcEmitter::from_config(&config.evaluation);
    if !emitter.is_available() {
        eprintln!("skipping: {} is not available", emitter.program.display());
        return None;
    }
    Some(emitter)
}

fn function(compilation: &Compilation, config: &CtfeConfig, name: &str) -> AnnotatedFunction {
    let parsed = ParsedCrate::parse(compilation).unwrap();
    discover_all(&parsed, &config.markers, || false)
        .unwrap()
        .into_iter()
        .find(|f| f.name == name)
        .unwrap()
}

fn crate_under_test() -> Compilation {
    Compilation::new("demo")
        .with_unit(SourceUnit::root(
            "src/lib.rs",
            r#"
mod math;

pub const LIMIT: u64 = 5;

pub fn call() -> u64 {
    math::factorial(LIMIT)
}
"#,
        ))
        .with_unit(SourceUnit::new(
            "src/math.rs",
            vec!["math".to_string()],
            r#"
#[comptime]
pub fn factorial(n: u64) -> u64 {
    (1..=n).product()
}

#[comptime]
fn fib(count: usize) -> Vec<u64> {
    let mut out = vec![1, 1];
    while out.len() < count {
        let next = out[out.len() - 1] + out[out.len() - 2];
        out.push(next);
    }
    out.truncate(count);
    out
}

#[comptime]
fn broken() -> u8 {
    panic!("no value today")
}
"#,
        ))
}

#[test]
fn test_invokes_argument_groups() -> eyre::Result<()> {
    let config = CtfeConfig::default();
    let Some(emitter) = emitter(&config) else {
        return Ok(());
    };
    let scope = ResolutionScope::acquire(&config.markers)?;
    let engine = EvaluationEngine::new(&config, &emitter, &scope, &NoPlugins);
    let compilation = crate_under_test();

    let factorial = function(&compilation, &config, "factorial");
    let image = engine.prepare(&compilation, &factorial)?;
    assert_eq!(image.target, vec!["ctfe_image", "math", "factorial"]);
    let result = engine.invoke(&image, &Shape::Primitive(Primitive::U64), &["LIMIT".to_string()], &[])?;
    assert_eq!(result.value, Value::U64(120));

    let fib = function(&compilation, &config, "fib");
    let image = engine.prepare(&compilation, &fib)?;
    let shape = Shape::vec(Shape::Primitive(Primitive::U64));
    let result = engine.invoke(&image, &shape, &["10".to_string()], &["math".to_string()])?;
    let expected: Vec<Value> = [1u64, 1, 2, 3, 5, 8, 13, 21, 34, 55]
        .into_iter()
        .map(Value::U64)
        .collect();
    assert_eq!(result.value, Value::Seq(expected));
    Ok(())
}

#[test]
fn test_panics_are_group_failures() -> eyre::Result<()> {
    let config = CtfeConfig::default();
    let Some(emitter) = emitter(&config) else {
        return Ok(());
    };
    let scope = ResolutionScope::acquire(&config.markers)?;
    let engine = EvaluationEngine::new(&config, &emitter, &scope, &NoPlugins);
    let compilation = crate_under_test();

    let broken = function(&compilation, &config, "broken");
    let image = engine.prepare(&compilation, &broken)?;
    let err = engine
        .invoke(&image, &Shape::Primitive(Primitive::U8), &[], &[])
        .unwrap_err();
    match err {
        EvalError::Invocation(message) => assert!(message.contains("no value today"), "{}", message),
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[test]
fn test_image_errors_are_reported() -> eyre::Result<()> {
    let config = CtfeConfig::default();
    let Some(emitter) = emitter(&config) else {
        return Ok(());
    };
    let scope = ResolutionScope::acquire(&config.markers)?;
    let engine = EvaluationEngine::new(&config, &emitter, &scope, &NoPlugins);
    let compilation = Compilation::new("broken").with_unit(SourceUnit::root(
        "src/lib.rs",
        "#[comptime]\npub fn answer() -> i32 { missing_value }\n",
    ));
    let answer = function(&compilation, &config, "answer");
    let err = engine.prepare(&compilation, &answer).unwrap_err();
    match err {
        EvalError::Emit { messages } => {
            assert!(messages[0].contains("missing_value"), "{:?}", messages)
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[test]
fn test_source_dependencies_are_built() -> eyre::Result<()> {
    let config = CtfeConfig::default();
    let Some(emitter) = emitter(&config) else {
        return Ok(());
    };
    let scope = ResolutionScope::acquire(&config.markers)?;
    let engine = EvaluationEngine::new(&config, &emitter, &scope, &NoPlugins);
    let helper = Compilation::new("helper").with_unit(SourceUnit::root(
        "src/lib.rs",
        "pub fn greeting() -> &'static str { \"Hello\\nWorld\" }\n",
    ));
    let compilation = Compilation::new("app")
        .with_extern(ExternRef::source("helper", helper))
        .with_unit(SourceUnit::root(
            "src/lib.rs",
            "#[comptime]\npub fn message() -> String { helper::greeting().to_string() }\n",
        ));
    let message = function(&compilation, &config, "message");
    let image = engine.prepare(&compilation, &message)?;
    let result = engine.invoke(&image, &Shape::String, &[], &[])?;
    assert_eq!(result.value, Value::str("Hello\nWorld"));
    Ok(())
}
