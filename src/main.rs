use std::io::{BufRead, IsTerminal, Read, Write};

use clap::Parser as ClapParser;
use quill::{Session, SessionError, EXIT_COMPILE_ERROR};
use quill_vm::VmConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();
    let mut session = Session::new(opt.vm_config());

    let (input, file) = if let Some(e) = opt.eval.clone() {
        (e, "<eval>".to_string())
    } else if let Some(f) = opt.file.clone() {
        match std::fs::read_to_string(&f) {
            Ok(src) => (src, f),
            Err(e) => {
                eprintln!("error: cannot read `{}`: {}", f, e);
                std::process::exit(EXIT_COMPILE_ERROR);
            }
        }
    } else if !std::io::stdin().is_terminal() {
        let mut s = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut s) {
            eprintln!("error: cannot read stdin: {}", e);
            std::process::exit(EXIT_COMPILE_ERROR);
        }
        (s, "<stdin>".to_string())
    } else {
        repl(&mut session);
        return;
    };

    if let Err(e) = run_source(&mut session, &opt, &input) {
        eprint!("{}", e.render(&input, &file));
        std::process::exit(e.exit_code());
    }
}

fn run_source(session: &mut Session, opt: &Opt, input: &str) -> Result<(), SessionError> {
    if opt.parse_only {
        let program = session.parse(input)?;
        print!("{}", program);
        return Ok(());
    }
    if opt.compile_only {
        let program = session.compile(input)?;
        print!("{}", session.disassemble(&program));
        return Ok(());
    }
    session.run(input)?;
    Ok(())
}

/// Read-eval-print loop. Errors are reported and the session continues.
fn repl(session: &mut Session) {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("error: cannot read stdin: {}", e);
                break;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match session.run(&line) {
            Ok(Some(v)) => println!("{}", session.display(v)),
            Ok(None) => {}
            Err(e) => eprint!("{}", e.render(&line, "<repl>")),
        }
    }
    println!();
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Run the given file as a Quill program.
    file: Option<String>,

    /// Evaluate the given string as a Quill program.
    #[clap(short, long)]
    eval: Option<String>,

    /// Only parse the input. Outputs the syntax tree.
    #[clap(long)]
    parse_only: bool,

    /// Only parse and compile the input. Outputs the disassembled bytecode.
    #[clap(long)]
    compile_only: bool,

    /// Number of live objects that triggers the first garbage collection.
    #[clap(long)]
    gc_threshold: Option<usize>,

    /// Capacity of the value stack.
    #[clap(long)]
    stack_size: Option<usize>,

    /// Maximum depth of nested calls.
    #[clap(long)]
    frames: Option<usize>,
}

impl Opt {
    fn vm_config(&self) -> VmConfig {
        let default = VmConfig::default();
        VmConfig {
            stack_capacity: self.stack_size.unwrap_or(default.stack_capacity),
            frame_capacity: self.frames.unwrap_or(default.frame_capacity),
            gc_threshold: self.gc_threshold.unwrap_or(default.gc_threshold),
            ..default
        }
    }
}
