//! Command-line driver: run a script through a bridge and print its output.

use std::path::PathBuf;
use std::process;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pybridge::{BridgeConfig, ExecMode, ProcessBridge, SubmitOutcome};

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("pybridge=info")
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");
    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

struct Args {
    script: PathBuf,
    virtualenv: Option<PathBuf>,
    interpreter: Option<String>,
    continuous: bool,
    stdin_data: bool,
    payload: String,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut script: Option<PathBuf> = None;
    let mut virtualenv = None;
    let mut interpreter = None;
    let mut continuous = false;
    let mut stdin_data = false;
    let mut payload = String::new();
    let mut payload_seen = false;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--venv" => {
                i += 1;
                virtualenv = Some(PathBuf::from(
                    args.get(i).ok_or("--venv requires a value")?,
                ));
            }
            "--interpreter" => {
                i += 1;
                interpreter = Some(
                    args.get(i)
                        .ok_or("--interpreter requires a value")?
                        .clone(),
                );
            }
            "--continuous" => continuous = true,
            "--stdin" => stdin_data = true,
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if script.is_none() {
                    script = Some(PathBuf::from(arg));
                } else if !payload_seen {
                    payload = arg.to_string();
                    payload_seen = true;
                } else {
                    return Err(format!("unexpected argument: {arg}"));
                }
            }
        }
        i += 1;
    }

    let script = script.ok_or("missing required argument: <script>")?;
    Ok(Args {
        script,
        virtualenv,
        interpreter,
        continuous,
        stdin_data,
        payload,
    })
}

#[tokio::main]
async fn main() {
    init_tracing();

    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("error: {message}");
                eprintln!();
            }
            eprintln!(
                "Usage: pybridge-run <script> [--venv <dir>] [--interpreter <name>] [--continuous] [--stdin] [payload]"
            );
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --venv <dir>          Resolve the interpreter from <dir>/bin");
            eprintln!("  --interpreter <name>  Interpreter executable [default: python]");
            eprintln!("  --continuous          Emit each output line as it arrives");
            eprintln!("  --stdin               Keep one process alive; forward our stdin to it");
            process::exit(2);
        }
    };

    if let Err(error) = run(args).await {
        eprintln!("error: {error}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mode = ExecMode::from_flags(args.continuous, args.stdin_data);
    let mut config = BridgeConfig::new(&args.script).with_mode(mode);
    if let Some(venv) = &args.virtualenv {
        config = config.with_virtualenv(venv);
    }
    if let Some(interpreter) = &args.interpreter {
        config = config.with_interpreter(interpreter);
    }

    let bridge = ProcessBridge::new(config)?;

    let mut status = bridge.subscribe_status();
    tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            tracing::info!(status = %event.to_payload(), "status");
        }
    });

    let outcome = bridge.submit(args.payload.as_str()).await;
    let Some(mut submission) = outcome.into_submission() else {
        bridge.close().await;
        return Ok(());
    };

    if mode == ExecMode::PersistentStdin {
        // forward our own stdin, line by line, until either side closes
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                event = submission.next_event() => match event {
                    Some(Ok(message)) => println!("{}", message.payload),
                    Some(Err(error)) => {
                        bridge.close().await;
                        return Err(error.into());
                    }
                    None => break,
                },
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let _ = bridge.submit(line.as_str()).await;
                    }
                    _ => break,
                },
            }
        }
    } else {
        while let Some(event) = submission.next_event().await {
            match event {
                Ok(message) => println!("{}", message.payload),
                Err(error) => {
                    bridge.close().await;
                    return Err(error.into());
                }
            }
        }
    }

    bridge.close().await;
    Ok(())
}
