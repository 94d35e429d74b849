//! CLI tool to compile, check, watch, and format story scripts.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use notify::{EventKind, RecursiveMode, Watcher};
use storyscript::lexer::normalize_line_endings;
use storyscript::{CompileOptions, Diagnostic, report};

#[derive(Parser)]
#[command(name = "storyc", version, about = "Story script compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a story to a Lua module.
    Compile {
        /// Story script to compile.
        input: PathBuf,
        /// Write Lua here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Generate output even when there are errors.
        #[arg(long)]
        force: bool,
        /// Fold constants and drop dead branches first.
        #[arg(long)]
        optimize: bool,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Report diagnostics without writing anything.
    Check {
        /// Story script to check.
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Recompile whenever the input changes.
    Watch {
        /// Story script to watch.
        input: PathBuf,
        /// Where to write the Lua module.
        #[arg(short, long)]
        output: PathBuf,
        /// Poll the file system instead of using native change events.
        #[arg(long)]
        poll: bool,
        /// Polling interval in milliseconds, with `--poll`.
        #[arg(long, default_value_t = 500)]
        interval: u64,
        #[arg(long)]
        optimize: bool,
        #[command(flatten)]
        verbosity: Verbosity,
    },
    /// Rewrite a story in canonical form.
    Fmt {
        /// Story script to format.
        input: PathBuf,
        /// Write here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only report whether the file is already canonical.
        #[arg(long)]
        check: bool,
    },
}

#[derive(Args)]
struct Verbosity {
    /// Log pipeline progress to stderr.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Print errors only.
    #[arg(short, long)]
    quiet: bool,
}

impl Verbosity {
    const fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Warn
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Minimal stderr backend for the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Compile {
            input,
            output,
            force,
            optimize,
            format,
            verbosity,
        } => {
            init_logging(verbosity.level());
            let options = CompileOptions::default()
                .with_optimize(optimize)
                .with_force(force);
            run_compile(&input, output.as_deref(), &options, format, verbosity.quiet)
        }
        Command::Check {
            input,
            format,
            verbosity,
        } => {
            init_logging(verbosity.level());
            run_check(&input, format, verbosity.quiet)
        }
        Command::Watch {
            input,
            output,
            poll,
            interval,
            optimize,
            verbosity,
        } => {
            init_logging(verbosity.level());
            let options = CompileOptions::default().with_optimize(optimize);
            let poll = poll.then_some(Duration::from_millis(interval));
            run_watch(&input, &output, poll, &options)
        }
        Command::Fmt {
            input,
            output,
            check,
        } => {
            init_logging(LevelFilter::Warn);
            run_fmt(&input, output.as_deref(), check)
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
        }
        None => io::stdout()
            .lock()
            .write_all(content.as_bytes())
            .context("failed to write to stdout"),
    }
}

/// Print diagnostics as text excerpts plus a summary, or as one JSON
/// array. `quiet` drops warnings and the summary.
fn print_diagnostics(
    out: &mut dyn io::Write,
    diagnostics: &[Diagnostic],
    source: &str,
    filename: &str,
    format: Format,
    quiet: bool,
) -> Result<()> {
    let shown: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| !quiet || d.is_error())
        .collect();

    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&shown).context("failed to encode diagnostics")?;
            writeln!(out, "{json}")?;
        }
        Format::Text => {
            for diagnostic in &shown {
                writeln!(out, "{}\n", report::format(diagnostic, source, filename))?;
            }
            if !quiet {
                writeln!(out, "{filename}: {}", report::summarize(diagnostics))?;
            }
        }
    }
    Ok(())
}

fn run_compile(
    input: &Path,
    output: Option<&Path>,
    options: &CompileOptions,
    format: Format,
    quiet: bool,
) -> Result<ExitCode> {
    let source = read_source(input)?;
    let filename = input.display().to_string();
    let result = storyscript::compile(&source, &filename, options);

    print_diagnostics(
        &mut io::stderr().lock(),
        &result.diagnostics,
        &source,
        &filename,
        format,
        quiet,
    )?;

    if let Some(lua) = &result.output {
        write_output(output, lua)?;
    }

    let accepted = result.succeeded || (options.force && result.output.is_some());
    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_check(input: &Path, format: Format, quiet: bool) -> Result<ExitCode> {
    let source = read_source(input)?;
    let filename = input.display().to_string();
    let diagnostics = storyscript::check(&source, &filename);

    match format {
        // Machine-readable output goes to stdout so it can be piped.
        Format::Json => print_diagnostics(
            &mut io::stdout().lock(),
            &diagnostics,
            &source,
            &filename,
            format,
            quiet,
        )?,
        Format::Text => print_diagnostics(
            &mut io::stderr().lock(),
            &diagnostics,
            &source,
            &filename,
            format,
            quiet,
        )?,
    }

    Ok(if storyscript::has_errors(&diagnostics) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Events closer together than this trigger one rebuild.
const DEBOUNCE: Duration = Duration::from_millis(200);

fn run_watch(
    input: &Path,
    output: &Path,
    poll: Option<Duration>,
    options: &CompileOptions,
) -> Result<ExitCode> {
    if let Err(err) = rebuild(input, output, options) {
        eprintln!("build failed: {err:#}");
    }

    let (tx, rx) = channel::<notify::Result<notify::Event>>();
    let mut watcher: Box<dyn Watcher> = if let Some(interval) = poll {
        Box::new(
            notify::PollWatcher::new(tx, notify::Config::default().with_poll_interval(interval))
                .context("failed to start poll watcher")?,
        )
    } else {
        Box::new(notify::recommended_watcher(tx).context("failed to start watcher")?)
    };

    // Editors often save by replacing the file, so watch its directory.
    let dir = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    eprintln!(
        "watching {} for changes (press Ctrl+C to stop)...",
        input.display()
    );

    let mut last_build = Instant::now();
    loop {
        match rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => {
                if touches_input(&event, input) && last_build.elapsed() >= DEBOUNCE {
                    last_build = Instant::now();
                    log::debug!("change detected in {}", input.display());
                    if let Err(err) = rebuild(input, output, options) {
                        eprintln!("build failed: {err:#}");
                    }
                }
            }
            Ok(Err(err)) => eprintln!("watch error: {err}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn touches_input(event: &notify::Event, input: &Path) -> bool {
    !matches!(event.kind, EventKind::Access(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == input.file_name())
}

fn rebuild(input: &Path, output: &Path, options: &CompileOptions) -> Result<()> {
    let source = read_source(input)?;
    let filename = input.display().to_string();
    let result = storyscript::compile(&source, &filename, options);
    print_diagnostics(
        &mut io::stderr().lock(),
        &result.diagnostics,
        &source,
        &filename,
        Format::Text,
        false,
    )?;

    match (&result.output, result.succeeded) {
        (Some(lua), true) => {
            write_output(Some(output), lua)?;
            eprintln!("compiled {} -> {}", input.display(), output.display());
        }
        _ => eprintln!("{filename} has errors, {} left unchanged", output.display()),
    }
    Ok(())
}

fn run_fmt(input: &Path, output: Option<&Path>, check: bool) -> Result<ExitCode> {
    let source = read_source(input)?;
    let story = match storyscript::parse_str(&source) {
        Ok(story) => story,
        Err(err) => {
            eprintln!("{}: {err}", input.display());
            return Ok(ExitCode::FAILURE);
        }
    };
    let formatted = storyscript::write(&story);

    if check {
        return Ok(if formatted == normalize_line_endings(&source) {
            eprintln!("{}: formatted", input.display());
            ExitCode::SUCCESS
        } else {
            eprintln!("{}: not formatted", input.display());
            ExitCode::FAILURE
        });
    }

    write_output(output, &formatted)?;
    Ok(ExitCode::SUCCESS)
}
