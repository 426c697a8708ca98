//! `ctfe eval`: evaluate a constant expression and print its literal.

use clap::Args;
use ctfe_interpret::const_eval;
use ctfe_rust::{serialize, shape_of_text};
use tracing::debug;

use super::CommandContext;
use crate::diagnostics::ExpressionError;
use crate::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct EvalArgs {
    /// Constant expression, e.g. `vec![1, 2 + 3]`
    #[arg(short, long)]
    pub expr: String,

    /// Type the expression is evaluated at, e.g. `Vec<u8>`
    #[arg(short, long = "ty", value_name = "TYPE")]
    pub ty: String,
}

pub fn eval_command(args: EvalArgs, _ctx: &CommandContext) -> Result<()> {
    println!("{}", evaluate(&args.expr, &args.ty)?);
    Ok(())
}

/// Evaluate `expr` at `ty` and return the canonical literal.
pub fn evaluate(expr: &str, ty: &str) -> Result<String> {
    let shape = shape_of_text(ty)?;
    let parsed: syn::Expr =
        syn::parse_str(expr).map_err(|err| ExpressionError::from_syn(expr, &err))?;
    let value = const_eval::evaluate(&parsed, &shape).map_err(|err| {
        ExpressionError::new(expr, (0, expr.len()).into(), err.to_string())
    })?;
    debug!("Evaluated `{}` as {}", expr, shape);
    let literal = serialize(&value, &shape).map_err(CliError::from)?;
    Ok(literal.into_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_canonical_literals() {
        assert_eq!(evaluate("6 * 7", "i32").unwrap(), "42");
        assert_eq!(evaluate("vec![1, 2 + 3]", "Vec<u8>").unwrap(), "vec![1u8, 5u8]");
        assert_eq!(evaluate("f64::NAN", "f64").unwrap(), "f64::NAN");
        assert_eq!(
            evaluate(r#"Some("a\tb".to_string())"#, "Option<String>").unwrap(),
            r#"Some("a\tb".to_string())"#
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(evaluate("1 +", "i32"), Err(CliError::Expression(_))));
        assert!(matches!(evaluate("x + 1", "i32"), Err(CliError::Expression(_))));
        assert!(matches!(evaluate("300", "u8"), Err(CliError::Expression(_))));
        assert!(matches!(evaluate("1", "Box<u8>"), Err(CliError::Core(_))));
    }
}
