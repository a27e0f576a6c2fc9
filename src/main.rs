use clap::{Args, Parser, Subcommand};
use jsexpr::*;
use miette::{miette, IntoDiagnostic, WrapErr};
use std::path::PathBuf;
use std::sync::Once;
use std::{
    fs,
    io::{self, Write},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the tokens of an expression.
    Tokenize { expr: String },
    /// Print the reordered (RPN) form of an expression.
    Parse {
        expr: String,
        #[arg(long, default_value_t = DEFAULT_STEP_LIMIT)]
        step_limit: usize,
    },
    /// Evaluate an expression once.
    Eval {
        expr: String,
        #[command(flatten)]
        bindings: Bindings,
    },
    /// Read and evaluate expressions until `exit`.
    Repl {
        #[command(flatten)]
        bindings: Bindings,
    },
}

#[derive(Args, Debug)]
struct Bindings {
    /// JSON file holding an object of variables.
    #[arg(long)]
    env: Option<PathBuf>,
    /// A single variable as `name=<json>`. Values that are not JSON are strings.
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, serde_json::Value)>,
}

fn parse_var(arg: &str) -> Result<(String, serde_json::Value), String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, got `{arg}`"))?;
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

impl Bindings {
    fn environment(self) -> miette::Result<Environment> {
        let mut env = match self.env {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("reading '{}' failed", path.display()))?;
                let json: serde_json::Value = serde_json::from_str(&contents)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("parsing '{}' failed", path.display()))?;
                match json {
                    serde_json::Value::Object(map) => Environment::from(map),
                    _ => return Err(miette!("'{}' must hold a JSON object", path.display())),
                }
            }
            None => Environment::new(),
        };
        for (name, value) in self.vars {
            env.define(name, value);
        }
        Ok(env)
    }
}

fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_writer(io::stderr))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Undefined | Value::Callable(_) => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
            serde_json::Value::from(*n as i64)
        }
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), to_json(value)))
                .collect(),
        ),
    }
}

fn print_value(value: &Value) {
    match value {
        Value::Array(_) | Value::Mapping(_) | Value::String(_) => println!("{}", to_json(value)),
        _ => println!("{value}"),
    }
}

/// The tokens `tokenize` hands the parser, one per line with its offset.
fn token_lines(expr: &str) -> jsexpr::Result<Vec<String>> {
    Ok(tokenize(expr)?
        .iter()
        .map(|token| format!("{:>4}  {}", token.offset, token.kind))
        .collect())
}

fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tokenize { expr } => {
            for line in token_lines(&expr)? {
                println!("{line}");
            }
        }
        Commands::Parse { expr, step_limit } => {
            let rpn = jsexpr::Parser::with_step_limit(step_limit).parse(tokenize(&expr)?)?;
            println!("{rpn}");
        }
        Commands::Eval { expr, bindings } => {
            let env = bindings.environment()?;
            print_value(&eval(&expr, &env)?);
        }
        Commands::Repl { bindings } => {
            let env = bindings.environment()?;
            loop {
                print!("expr> ");
                io::stdout().flush().into_diagnostic()?;

                let mut input = String::new();
                if io::stdin().read_line(&mut input).into_diagnostic()? == 0 {
                    break;
                }
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("exit") {
                    break;
                }

                match eval(input, &env) {
                    Ok(value) => print_value(&value),
                    Err(e) => eprintln!("{:?}", miette::Report::new(e)),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lines_show_classified_tokens() {
        let lines = token_lines("{a: -x} - typeof y").unwrap();
        let kinds: Vec<&str> = lines.iter().map(|line| line[6..].trim()).collect();
        assert_eq!(kinds, vec!["{", "\"a\"", ":", "-", "\"x\"", "}", "-", "typeof", "y"]);
        assert_eq!(lines[0], "   0  {");
    }
}
