mod debug_report;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use weft::{Engine, Options, ShellBackend};

const IMPLICIT_RULE_FILE: &str = "Weftfile";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match run(&config) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("weft: {err}");
            std::process::exit(if err.is_internal() { 2 } else { 1 });
        }
    }
}

struct CliConfig {
    file: Option<PathBuf>,
    eval: Option<Vec<String>>,
    list: bool,
    terminals: Vec<String>,
    jobs: usize,
    verbose: bool,
    color: bool,
    positional: Vec<String>,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut config = CliConfig {
        file: None,
        eval: None,
        list: false,
        terminals: Vec::new(),
        jobs: 1,
        verbose: false,
        color: io::stdout().is_terminal(),
        positional: Vec::new(),
    };
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("weft {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => config.color = true,
            "--no-color" => config.color = false,
            "-v" | "--verbose" => config.verbose = true,
            "-l" | "--list" => config.list = true,
            "-e" | "--eval" => {
                // Everything after -e is an expression term.
                config.eval = Some(args.collect());
                break;
            }
            "-t" | "--terminal" => {
                let mut took = 0;
                while let Some(next) = args.peek() {
                    if next.starts_with('-') {
                        break;
                    }
                    config.terminals.push(args.next().unwrap_or_default());
                    took += 1;
                }
                if took == 0 {
                    return Err("error: --terminal expects one or more words".to_string());
                }
            }
            "-j" | "--jobs" => {
                let value = args.next().ok_or_else(|| "error: -j expects a value".to_string())?;
                config.jobs = value.parse().map_err(|_| format!("error: invalid -j value '{value}'"))?;
            }
            "-f" | "--file" => {
                let value = args.next().ok_or_else(|| "error: --file expects a path".to_string())?;
                config.file = Some(PathBuf::from(value));
            }
            "--" => {
                config.positional.extend(args);
                break;
            }
            _ if arg.starts_with("--file=") => {
                config.file = Some(PathBuf::from(arg.trim_start_matches("--file=")));
            }
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => config.positional.push(arg),
        }
    }

    Ok(config)
}

fn run(config: &CliConfig) -> weft::Result<()> {
    let mut engine = Engine::new();

    match &config.file {
        Some(path) => load_rule_file(&mut engine, path)?,
        None => {
            if Path::new(IMPLICIT_RULE_FILE).exists() {
                load_rule_file(&mut engine, Path::new(IMPLICIT_RULE_FILE))?;
            }
        }
    }

    for word in &config.terminals {
        engine.define_terminal(word)?;
    }

    // Positional args with a standalone separator are a definition;
    // otherwise they are goals to build.
    let mut defined = !config.terminals.is_empty();
    let mut goals: Vec<String> = Vec::new();
    if !config.positional.is_empty() {
        if config.positional.iter().any(|t| matches!(t.as_str(), ":" | "=" | "::")) {
            engine.define(&config.positional)?;
            defined = true;
        } else {
            goals = config.positional.clone();
        }
    }

    let mut backend = ShellBackend::new(config.jobs);
    let options = Options::default();

    if let Some(terms) = &config.eval {
        let out = engine.eval(terms, &mut backend)?;
        println!("{}", out.join(" "));
        return Ok(());
    }

    if config.list {
        for line in engine.rule_lines() {
            println!("{line}");
        }
        for line in engine.global_lines() {
            println!("{line}");
        }
        return Ok(());
    }

    if goals.is_empty() {
        goals = engine.default_goals().to_vec();
    }
    if goals.is_empty() {
        if defined {
            // Definition-only invocation: validated against the loaded rules.
            return Ok(());
        }
        return Err(weft::Error::Definition(format!(
            "nothing to do: no goals, no default goal list, and no definition (see `weft --help`; rules load from ./{IMPLICIT_RULE_FILE})"
        )));
    }

    if config.verbose {
        let (plan, details) = engine.solve_with_details(&goals, &mut backend, &options)?;
        debug_report::print_solve(&goals, &details, &plan, config.color);
        let report = engine.execute_plan(&plan, &mut backend, &options)?;
        debug_report::print_build(&report, config.color);
    } else {
        engine.build(&goals, &mut backend, &options)?;
    }
    Ok(())
}

fn load_rule_file(engine: &mut Engine, path: &Path) -> weft::Result<()> {
    let text = std::fs::read_to_string(path)?;
    engine.load_str(&text)
}

fn help_text() -> String {
    format!(
        "weft {version}

Equation-driven build engine CLI.

Usage:
  weft [OPTIONS] [--] <goals...>
  weft [OPTIONS] [--] <definition tokens...>
  weft [OPTIONS] -e <terms...>

A definition is any argument vector containing a standalone `:`, `=`, or
`::` separator; anything else is a goal list. With no goals, the default
goal list from the rule file is built. Rules load from ./{rule_file} when
present (one definition per line, `#` comments).

Options:
  -f, --file <path>          Rule file to load instead of ./{rule_file}.
  -e, --eval <terms...>      Expand terms through ungrounded equations and
                             print the result (must come last).
  -l, --list                 Print all rules, then all globals, in
                             definition order.
  -t, --terminal <words...>  Register each word as a terminal rule.
  -j, --jobs <n>             Concurrency hint passed to the backend
                             (exported as WEFT_JOBS to commands).
  -v, --verbose              Print solve phases and the plan before
                             building.
  --color / --no-color       Force or disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Exit codes:
  0  Success.
  1  User error (bad pattern, unsatisfiable goal, command failure).
  2  Internal invariant violation.
",
        version = env!("CARGO_PKG_VERSION"),
        rule_file = IMPLICIT_RULE_FILE
    )
}
