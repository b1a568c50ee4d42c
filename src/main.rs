use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use tlox::ast::{Expr, Stmt};
use tlox::ast_printer::AstPrinter;
use tlox::error::LoxError;
use tlox::interpreter::Interpreter;
use tlox::parser::Parser;
use tlox::resolver::Resolver;
use tlox::scanner::Scanner;
use tlox::token::Token;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    /// Without a subcommand, starts an interactive session.
    #[command(subcommand)]
    commands: Option<Commands>,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Emit tokens as JSON instead of the line-per-token form
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program
    Run { filename: PathBuf },

    /// Starts an interactive session (also the default with no subcommand)
    Repl,
}

/// Maps the file into memory and hands back its contents as UTF-8.
///
/// Empty files cannot be mapped, so they short-circuit to an empty buffer.
fn read_file(filename: &PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    let len = file
        .metadata()
        .context(format!("Failed to stat file {:?}", filename))?
        .len();

    if len == 0 {
        info!("File {:?} is empty", filename);

        return Ok(String::new());
    }

    let mmap = unsafe { Mmap::map(&file) }
        .context(format!("Failed to memory-map file {:?}", filename))?;

    let source = std::str::from_utf8(&mmap)
        .context(format!("File {:?} is not valid UTF-8", filename))?
        .to_string();

    info!("Read {} bytes from {:?}", len, filename);

    Ok(source)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    // Write to file with module path and source line, stripping the crate
    // prefix for readability.
    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("tlox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Scans the whole source, reporting lexical errors to stderr as they
/// surface.  Returns the tokens plus whether any error occurred.
fn scan(source: &str) -> (Vec<Token>, bool) {
    let scanner = Scanner::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut had_error = false;

    for result in scanner {
        match result {
            Ok(token) => {
                debug!("Scanned token: {}", token);

                tokens.push(token);
            }

            Err(e) => {
                had_error = true;

                debug!("Scan error: {}", e);

                eprintln!("{}", e);
            }
        }
    }

    (tokens, had_error)
}

/// Front half of the pipeline: scan, parse, resolve.  All static errors go
/// to stderr; `Some` means the program is clean and ready to interpret.
fn prepare(source: &str, interpreter: &mut Interpreter) -> Option<Vec<Stmt>> {
    let (tokens, mut had_error) = scan(source);

    let mut parser = Parser::new(&tokens);
    let (statements, parse_errors) = parser.parse();

    for e in &parse_errors {
        debug!("Parse error: {}", e);

        eprintln!("{}", e);
    }

    had_error |= !parse_errors.is_empty();

    // Resolution is skipped when the syntax is already broken; hop counts
    // over a partial tree would be meaningless.
    if had_error {
        return None;
    }

    let resolve_errors: Vec<LoxError> = Resolver::new(interpreter).resolve(&statements);

    for e in &resolve_errors {
        debug!("Resolve error: {}", e);

        eprintln!("{}", e);
    }

    if resolve_errors.is_empty() {
        Some(statements)
    } else {
        None
    }
}

/// Parses the source as one full program and runs it.  Returns the exit
/// code: 0 on success, 65 for static errors, 70 for runtime errors.
fn run(source: &str, interpreter: &mut Interpreter) -> i32 {
    let Some(statements) = prepare(source, interpreter) else {
        return 65;
    };

    info!("Parsed {} statements", statements.len());

    match interpreter.interpret(&statements) {
        Ok(_) => {
            info!("Program executed successfully");

            0
        }

        Err(e) => {
            debug!("Runtime error: {}", e);

            eprintln!("{}", e);

            70
        }
    }
}

/// Interactive session: one line at a time against a persistent
/// interpreter, printing each line's result value.  Errors never end the
/// session.
fn repl() -> Result<()> {
    info!("Starting interactive session");

    let mut interpreter = Interpreter::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();

        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF ends the session.
            println!();

            return Ok(());
        }

        let Some(statements) = prepare(&line, &mut interpreter) else {
            continue;
        };

        match interpreter.interpret(&statements) {
            Ok(value) => println!("{}", value),

            Err(e) => eprintln!("{}", e),
        }
    }
}

/// Parses the source as a single expression, for the `parse` and `evaluate`
/// subcommands.
fn parse_expression(source: &str) -> Option<Expr> {
    let (tokens, had_error) = scan(source);

    if had_error {
        return None;
    }

    let mut parser = Parser::new(&tokens);

    match parser.parse_expression() {
        Ok(expr) => Some(expr),

        Err(e) => {
            debug!("Parse error: {}", e);

            eprintln!("{}", e);

            None
        }
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize the file logger only if --log was given; otherwise install
    // a muted one so log macros have a destination.
    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let Some(command) = args.commands else {
        return repl();
    };

    match command {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");

            let source = read_file(&filename)?;
            let (tokens, had_error) = scan(&source);

            if json {
                let rendered = serde_json::to_string_pretty(&tokens)
                    .context("Failed to serialize tokens")?;

                println!("{}", rendered);
            } else {
                for token in &tokens {
                    println!("{}", token);
                }
            }

            if had_error {
                debug!("Tokenization failed, exiting with code 65");

                std::process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");

            let source = read_file(&filename)?;

            let Some(expr) = parse_expression(&source) else {
                std::process::exit(65);
            };

            let ast_str = AstPrinter::print(&expr);

            debug!("AST: {}", ast_str);
            println!("{}", ast_str);

            info!("Parse subcommand completed");
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");

            let source = read_file(&filename)?;

            let Some(expr) = parse_expression(&source) else {
                std::process::exit(65);
            };

            let mut interpreter = Interpreter::new();

            match interpreter.evaluate(&expr) {
                Ok(value) => {
                    debug!("Evaluated to: {}", value);

                    println!("{}", value);
                }

                Err(e) => {
                    debug!("Evaluation error: {}", e);

                    eprintln!("{}", e);

                    std::process::exit(70);
                }
            }

            info!("Evaluate subcommand completed");
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");

            let source = read_file(&filename)?;
            let mut interpreter = Interpreter::new();

            let code = run(&source, &mut interpreter);

            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Repl => return repl(),
    }

    Ok(())
}
