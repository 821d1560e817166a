use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use thompson_re::{compile_with, render_dot, Config, NoopObserver, StateLabels, TracingObserver};
use tracing::{debug, info, trace};
use tracing_subscriber::{filter::LevelFilter, prelude::*};

/// Compile a regular expression to a minimal DFA and write each stage as Graphviz.
#[derive(Parser, Debug)]
#[command(name = "thompson", version)]
struct Args {
    /// Expression over ASCII letters, '|', '*', '(', ')' and the blank atom
    regex: String,

    /// Character treated as the blank (empty string) atom
    #[arg(long, default_value_t = ' ', value_parser = parse_blank)]
    blank: char,

    /// Directory the .dot files are written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Skip writing .dot files
    #[arg(long)]
    no_dot: bool,

    /// Words to run through the minimized DFA
    #[arg(short, long, num_args = 1..)]
    accepts: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// a single character that is neither a letter nor one of "|*.()"
fn parse_blank(s: &str) -> Result<char, String> {
    let mut chars = s.chars();
    let (Some(blank), None) = (chars.next(), chars.next()) else {
        return Err(format!("expected a single character, got {:?}", s));
    };
    Config { blank }.validate().map_err(|e| e.to_string())?;
    Ok(blank)
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let stderr_log = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

fn write_dot(args: &Args, file_name: &str, contents: String) -> Result<()> {
    let path = args.out_dir.join(file_name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let config = Config { blank: args.blank };
    debug!("compiling {:?} with {:?}", args.regex, config);

    // per-step narration only when it will actually be printed
    let compilation = if args.verbose >= 3 {
        compile_with(&args.regex, &config, &mut TracingObserver)
    } else {
        compile_with(&args.regex, &config, &mut NoopObserver)
    }
    .with_context(|| format!("failed to compile {:?}", args.regex))?;

    println!("postfix: {}", compilation.postfix);
    println!(
        "states: nfa {} (reachable {}), dfa {}, minimized {}",
        compilation.nfa.states().len(),
        compilation.nfa.reachable().len(),
        compilation.dfa.len(),
        compilation.minimized.len()
    );

    if !args.no_dot {
        fs::create_dir_all(&args.out_dir)
            .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
        write_dot(
            &args,
            "thompson_nfa.dot",
            render_dot("NFA", &compilation.nfa.to_graph()),
        )?;
        write_dot(
            &args,
            "dfa_output.dot",
            render_dot("DFA", &compilation.dfa.to_graph(StateLabels::Subset)),
        )?;
        write_dot(
            &args,
            "minimized_dfa_output.dot",
            render_dot(
                "MinimizedDFA",
                &compilation.minimized.to_graph(StateLabels::Id),
            ),
        )?;
    }

    for word in &args.accepts {
        let verdict = if compilation.minimized.simulate(word) {
            "accept"
        } else {
            "reject"
        };
        println!("{:?}: {}", word, verdict);
    }

    Ok(())
}
