//! ebconv - ebook converter

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ebconv::{Error, Feedback, Pipeline, PluginRegistry, UserOptions};

#[derive(Parser)]
#[command(name = "ebconv")]
#[command(version, about = "Ebook converter", long_about = None)]
#[command(after_help = "EXAMPLES:
    ebconv book.epub out.epub                          Normalize an EPUB
    ebconv notes.txt notes.epub -o epub_version=3      Text to EPUB 3
    ebconv book.opf book_dir                           Unpacked package to a directory")]
struct Cli {
    /// Input file (EPUB, OPF or TXT)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (EPUB), or a directory for an unpacked package
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Set an option, e.g. `flow_size=100`
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// JSON object of option values, applied before --option
    #[arg(long, value_name = "FILE")]
    options_file: Option<PathBuf>,

    /// Query for first level TOC entries
    #[arg(long, value_name = "QUERY")]
    level1_toc: Option<String>,

    /// Query for second level TOC entries
    #[arg(long, value_name = "QUERY")]
    level2_toc: Option<String>,

    /// Query for third level TOC entries
    #[arg(long, value_name = "QUERY")]
    level3_toc: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print feedback as JSON on stdout
    #[arg(long)]
    feedback_json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let user = match user_options(&cli) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let registry = PluginRegistry::builtin();
    let mut pipeline = Pipeline::new(&registry);
    let result = pipeline.run(&cli.input, &cli.output, &user);

    let mut feedback = pipeline.feedback().to_vec();
    if let Err(e) = &result
        && let Some(fb) = e.feedback()
    {
        feedback.push(fb.clone());
    }
    print_feedback(&feedback, cli.feedback_json);

    match result {
        Ok(report) => {
            log::info!("done: {} passes", report.passes.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn user_options(cli: &Cli) -> Result<UserOptions, Error> {
    let mut user = UserOptions::default();
    if let Some(path) = &cli.options_file {
        let text = fs::read_to_string(path)?;
        let json = serde_json::from_str(&text).map_err(|e| Error::InvalidOption {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        user.file = Some(json);
    }
    for raw in &cli.options {
        user.push_raw(raw)?;
    }
    let levels = [
        ("level1_toc", &cli.level1_toc),
        ("level2_toc", &cli.level2_toc),
        ("level3_toc", &cli.level3_toc),
    ];
    for (name, query) in levels {
        if let Some(query) = query {
            user.values.push((name.to_string(), query.clone()));
        }
    }
    Ok(user)
}

fn print_feedback(feedback: &[Feedback], json: bool) {
    if json {
        match serde_json::to_string_pretty(feedback) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("error: cannot serialize feedback: {e}"),
        }
        return;
    }
    for fb in feedback {
        println!("[{:?}] {fb}", fb.severity);
        if let Some(detail) = &fb.detail {
            println!("    {detail}");
        }
    }
}
