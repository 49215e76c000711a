use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::Shell;
use norn_lexer::{Lexer, Token};
use norn_list::{evaluate, Environment, EvalError, SharedEnvironment};
use norn_parser::{ParseError, Parser};
use tracing::error;

mod console;
mod report;
mod store;
mod web;

use console::{join_recipients, Console};
use web::WebServer;

/// Mailing list expressions, from a console or over HTTP
#[derive(ClapParser)]
#[command(name = "norn", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Args)]
struct ServeArgs {
    /// Files of list definitions to load at startup
    files: Vec<PathBuf>,

    /// Port for the web server
    #[arg(long, default_value_t = web::DEFAULT_PORT)]
    port: u16,

    /// Run the console only
    #[arg(long)]
    no_web: bool,

    /// Run the web server only
    #[arg(long, conflicts_with = "no_web")]
    no_console: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one expression and print its recipients
    Eval {
        expr: String,
        /// Files to load before evaluating
        #[arg(long)]
        load: Vec<PathBuf>,
    },
    /// Evaluate every line of a file and report each error
    Check { file: PathBuf },
    /// Show lexer output (tokens)
    Lex { expr: String },
    /// Show parser output (syntax tree)
    Parse { expr: String },
    /// Print shell completions
    Completions { shell: Shell },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(true).with_level(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Command::Eval { expr, load }) => run_eval(&expr, &load),
        Some(Command::Check { file }) => run_check(&file),
        Some(Command::Lex { expr }) => run_lexer(&expr),
        Some(Command::Parse { expr }) => run_parser(&expr),
        Some(Command::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "norn", &mut io::stdout());
            ExitCode::SUCCESS
        }
        None => serve(cli.serve).await,
    }
}

async fn serve(args: ServeArgs) -> ExitCode {
    let env = SharedEnvironment::new();
    for file in &args.files {
        if let Err(e) = store::load(&env, file) {
            eprintln!("error: {}", e);
        }
    }

    let server = if args.no_web {
        None
    } else {
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        match WebServer::bind(addr, env.clone()).await {
            Ok(server) => Some(tokio::spawn(server.serve())),
            Err(e) => {
                error!(%addr, error = %e, "could not start web server");
                return ExitCode::FAILURE;
            }
        }
    };

    if args.no_console {
        let Some(server) = server else {
            return ExitCode::FAILURE;
        };
        return tokio::select! {
            _ = tokio::signal::ctrl_c() => ExitCode::SUCCESS,
            result = server => match result {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    error!(error = %e, "web server stopped");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    error!(error = %e, "web server task failed");
                    ExitCode::FAILURE
                }
            },
        };
    }

    let console = Console::new(env);
    let result = tokio::task::spawn_blocking(move || console.run()).await;
    if let Some(server) = server {
        server.abort();
    }
    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            eprintln!("console error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "console task failed");
            ExitCode::FAILURE
        }
    }
}

fn run_eval(expr: &str, load: &[PathBuf]) -> ExitCode {
    let env = SharedEnvironment::new();
    for file in load {
        if let Err(e) = store::load(&env, file) {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match env.evaluate(expr) {
        Ok(result) => {
            println!("{}", join_recipients(&result.recipients, ", "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprint!("{}", report::render(&e, "<expr>", expr, true));
            ExitCode::FAILURE
        }
    }
}

fn run_check(file: &Path) -> ExitCode {
    let text = match store::read(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut env = Environment::new();
    let mut errors = 0;
    for (index, line) in text.lines().enumerate() {
        if let Err(e) = evaluate(line, &mut env) {
            let name = format!("{}:{}", file.display(), index + 1);
            eprint!("{}", report::render(&e, &name, line, true));
            errors += 1;
        }
    }

    if errors == 0 {
        println!("{}: {} lists defined", file.display(), env.len());
        ExitCode::SUCCESS
    } else {
        eprintln!("{}: {} bad lines", file.display(), errors);
        ExitCode::FAILURE
    }
}

fn run_lexer(source: &str) -> ExitCode {
    println!("=== Lexer Output ===\n");

    match Lexer::tokenize(source) {
        Ok(tokens) => {
            println!("{:<8} {:<8} {:<12} {}", "SPAN", "LENGTH", "TOKEN TYPE", "VALUE");
            println!("{}", "-".repeat(48));

            for spanned in &tokens {
                let span_str = format!("{}..{}", spanned.span.start, spanned.span.end);
                println!(
                    "{:<8} {:<8} {:<12} {}",
                    span_str,
                    spanned.span.len(),
                    token_type_name(&spanned.token),
                    spanned.token
                );
            }

            println!("\n=== Summary ===");
            println!("Total tokens: {}", tokens.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprint!("{}", report::render(&EvalError::from(ParseError::from(e)), "<expr>", source, true));
            ExitCode::FAILURE
        }
    }
}

fn run_parser(source: &str) -> ExitCode {
    println!("=== Parser Output ===\n");

    match Parser::parse(source) {
        Ok(tree) => {
            print!("{}", tree.pretty_print());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprint!("{}", report::render(&EvalError::from(e), "<expr>", source, true));
            ExitCode::FAILURE
        }
    }
}

fn token_type_name(token: &Token) -> &'static str {
    match token {
        Token::Address(_) => "ADDRESS",
        Token::Name(_) => "NAME",
        Token::Comma | Token::Bang | Token::Star | Token::Eq | Token::Semi => "OPERATOR",
        Token::LParen | Token::RParen => "DELIMITER",
        Token::Eof => "EOF",
    }
}
