use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lasergate::{
    init_logging_with, list_ports, Config, EngineEvent, GcodeFile, GrblEngine, LogFormat,
    MachineState,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long `home` and `unlock` wait for the controller's answer
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "lasergate", version, about = "Stream G-code to a GRBL controller")]
struct Cli {
    /// Log as JSON instead of plain text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ConnectionArgs {
    /// Serial port, overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Config file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports that look like CNC controllers
    Ports,
    /// Stream a G-code file
    Run {
        file: PathBuf,
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Run the homing cycle
    Home {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Clear an alarm lock
    Unlock {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging_with(if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    })?;
    tracing::debug!("lasergate {} built {}", lasergate::VERSION, lasergate::BUILD_DATE);

    match cli.command {
        Command::Ports => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No controller ports found");
            }
            for port in ports {
                println!("{}\t{}", port.port_name, port.description);
            }
            Ok(())
        }
        Command::Run { file, connection } => run(file, connection).await,
        Command::Home { connection } => system_command(connection, "$H").await,
        Command::Unlock { connection } => system_command(connection, "$X").await,
    }
}

async fn connect(args: &ConnectionArgs) -> anyhow::Result<GrblEngine> {
    let config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    let params = config.connection.to_params(args.port.as_deref());
    if params.port.is_empty() {
        bail!("no serial port given; use --port or set connection.port in the config file");
    }

    let engine = GrblEngine::new(config.streaming.to_stream_config());
    engine
        .open(&params)
        .await
        .with_context(|| format!("opening {}", params.port))?;
    Ok(engine)
}

async fn run(file: PathBuf, args: ConnectionArgs) -> anyhow::Result<()> {
    let engine = connect(&args).await?;
    let mut events = engine.subscribe();

    let job = match engine.submit_job(&mut GcodeFile::new(&file)).await {
        Ok(job) => job,
        Err(e) => {
            engine.close().await?;
            return Err(e).with_context(|| format!("submitting {}", file.display()));
        }
    };

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::JobCompleted(done)) if done == job => {
                    println!("{}", EngineEvent::JobCompleted(done));
                    break Ok(());
                }
                Ok(EngineEvent::StateChanged(MachineState::Alarmed)) => {
                    break Err(anyhow::anyhow!("controller alarmed, job aborted"));
                }
                Ok(EngineEvent::Disconnected) => {
                    break Err(anyhow::anyhow!("connection lost"));
                }
                Ok(EngineEvent::StateChanged(MachineState::Idle)) => {
                    // JobCompleted always precedes the Idle of a finished job
                    break Err(anyhow::anyhow!("job aborted"));
                }
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, stopping");
                engine.stop()?;
                break Ok(());
            }
        }
    };

    engine.close().await?;
    outcome
}

async fn system_command(args: ConnectionArgs, command: &str) -> anyhow::Result<()> {
    let engine = connect(&args).await?;
    let mut events = engine.subscribe();

    engine.send_command(command)?;

    let outcome = tokio::time::timeout(COMMAND_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(EngineEvent::Ack(line)) if line == command => return Ok(()),
                Ok(EngineEvent::ErrorRaised(error)) => {
                    return Err(anyhow::anyhow!("{}: {}", error, error.long_text))
                }
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow::anyhow!("engine stopped"))
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| {
        Err(anyhow::anyhow!(
            "no answer to {} within {:?}",
            command,
            COMMAND_TIMEOUT
        ))
    });

    engine.close().await?;
    outcome
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Queued(_) | EngineEvent::StatusChanged(_) => {}
        EngineEvent::ErrorRaised(error) => eprintln!("{}: {}", error, error.long_text),
        event => println!("{}", event),
    }
}
