//! Command-line surface for the quern build engine.
//!
//! Definitions are loaded from a rules file (one definition per line), then
//! the arguments are interpreted: a definition if they contain a separator
//! token, goals to build otherwise.

use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    process,
};

use log::debug;
use quern::{backend::ShellBackend, Engine, Error, Params};

struct Args {
    eval: bool,
    list: bool,
    terminals: bool,
    jobs: usize,
    verbose: bool,
    file: Option<PathBuf>,
    rest: Vec<String>,
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [options] [definition | goals...]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e, --eval WORDS      expand words through the equations and print them");
    eprintln!("  -l, --list            print all rules, then all globals");
    eprintln!("  -t, --terminal WORDS  register each word as something that exists");
    eprintln!("  -j N                  concurrency hint for the backend");
    eprintln!(
        "  -f FILE               rules file (default: {})",
        Params::default().rules_file.display()
    );
    eprintln!("  -v                    verbose solver output");
    eprintln!("  -h, --help            show this help");
    eprintln!();
    eprintln!("Bare arguments containing `:`, `=` or `::` define a rule;");
    eprintln!("anything else is built.  With no arguments the default goals");
    eprintln!("from the rules file are built.");
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut args = Args {
        eval: false,
        list: false,
        terminals: false,
        jobs: 1,
        verbose: false,
        file: None,
        rest: Vec::new(),
    };
    let mut iter = argv.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-e" | "--eval" => args.eval = true,
            "-l" | "--list" => args.list = true,
            "-t" | "--terminal" => args.terminals = true,
            "-v" => args.verbose = true,
            "-j" => {
                let value = iter.next().ok_or("-j requires a number")?;
                args.jobs = value
                    .parse()
                    .map_err(|_| format!("-j requires a number, got {:?}", value))?;
            }
            "-f" => {
                let value = iter.next().ok_or("-f requires a path")?;
                args.file = Some(PathBuf::from(value));
            }
            "-h" | "--help" => return Err(String::new()),
            _ => args.rest.push(arg.clone()),
        }
    }
    Ok(args)
}

fn load_rules_file(engine: &mut Engine, path: &Path, explicit: bool) -> Result<(), Error> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        // A missing default rules file is fine; an explicit one is not.
        Err(err) if !explicit => {
            debug!("no rules file {:?}: {}", path, err);
            return Ok(());
        }
        Err(err) => {
            eprintln!("quern: cannot read {:?}: {}", path, err);
            process::exit(1);
        }
    };
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            continue;
        }
        engine.define(&tokens)?;
    }
    debug!("loaded rules from {:?}", path);
    Ok(())
}

fn is_separator(token: &str) -> bool {
    matches!(token, ":" | "=" | "::")
}

/// Definitions given on the command line outlive the invocation by being
/// appended to the rules file.
fn persist_definition(path: &Path, tokens: &[String]) {
    let result = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{}", tokens.join(" ")));
    if let Err(err) = result {
        eprintln!("quern: cannot append to {:?}: {}", path, err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let mut params = Params {
        jobs: args.jobs,
        ..Params::default()
    };
    if let Some(file) = &args.file {
        params.rules_file = file.clone();
    }
    let rules_file = params.rules_file.clone();
    let mut engine = Engine::new(params);
    load_rules_file(&mut engine, &rules_file, args.file.is_some())?;

    let mut backend = ShellBackend::new(args.jobs);

    if args.terminals {
        for word in &args.rest {
            engine.define_terminal(word)?;
            persist_definition(&rules_file, &[word.clone(), ":".to_string()]);
        }
        return Ok(());
    }
    if args.list {
        print!("{}", engine.registry());
        return Ok(());
    }
    if args.eval {
        let expanded = engine.eval(&args.rest, &mut backend)?;
        println!("{}", expanded.join(" "));
        return Ok(());
    }
    if args.rest.iter().any(|t| is_separator(t)) {
        engine.define(&args.rest)?;
        persist_definition(&rules_file, &args.rest);
        return Ok(());
    }

    let goals = if args.rest.is_empty() {
        engine.default_goals().to_vec()
    } else {
        args.rest.clone()
    };
    if goals.is_empty() {
        eprintln!("quern: nothing to build");
        return Ok(());
    }
    let plan = engine.build(&goals, &mut backend)?;
    debug!("completed {} step(s)", plan.len());
    Ok(())
}

fn main() {
    let argv: Vec<String> = env::args().collect();
    let args = match parse_args(&argv[1..]) {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("quern: {}", message);
            }
            print_usage(&argv[0]);
            process::exit(if message.is_empty() { 0 } else { 1 });
        }
    };

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_level));

    if let Err(err) = run(&args) {
        eprintln!("quern: {}", err);
        process::exit(err.exit_code());
    }
}
