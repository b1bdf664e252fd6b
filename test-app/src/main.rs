// dialphone test application -- console host for a rotary handset on a
// serial or TCP link, or on a built-in mock handset.
//
// Usage:
//   dialphone-test-app --port /dev/rfcomm0
//   dialphone-test-app --host 192.168.1.50:2000 monitor --duration 60
//   dialphone-test-app --mock
//   dialphone-test-app prefs show
//
// With no --port/--host/--mock, the handset saved in the preferences file
// is used.

mod console;
mod prefs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use dialphone::{
    BridgeBuilder, BridgeEvent, CallBridge, Connector, HostCallState, LinkState, SerialConfig,
    SerialConnector, TcpConnector,
};
use dialphone_test_harness::{MockConnector, MockHandle, MockTransport};

use console::ConsoleHost;
use prefs::Preferences;

/// Address the built-in mock handset answers on.
const MOCK_ADDRESS: &str = "mock";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// dialphone test application -- bridges a rotary handset with a console.
#[derive(Parser)]
#[command(name = "dialphone-test-app", version, about)]
struct Cli {
    /// Serial port of the handset (e.g. /dev/rfcomm0, COM5).
    #[arg(long)]
    port: Option<String>,

    /// Baud rate for --port.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// TCP serial bridge in front of the handset (host:port).
    #[arg(long)]
    host: Option<String>,

    /// Use a built-in mock handset instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Preferences file (default: ~/.config/dialphone/preferences.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the link to open.
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Terminate every command with a newline (for line-buffered bridges).
    #[arg(long)]
    newline: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive console session (the default).
    Run,

    /// Connect and print bridge events.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Show or clear the saved handset.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print the preferences file.
    Show,
    /// Forget the saved handset.
    Forget,
}

fn validate_options(cli: &Cli) -> Result<()> {
    let sources = [cli.port.is_some(), cli.host.is_some(), cli.mock];
    if sources.iter().filter(|s| **s).count() > 1 {
        bail!("--port, --host and --mock are mutually exclusive");
    }
    if cli.baud == 0 {
        bail!("--baud must be non-zero");
    }
    if cli.connect_timeout == 0 {
        bail!("--connect-timeout must be non-zero");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    bridge: CallBridge,
    host: Arc<ConsoleHost>,
    /// Handle to the mock handset, in --mock mode.
    mock: Option<MockHandle>,
    prefs_path: PathBuf,
    prefs: Preferences,
    /// Address to save once the connect in flight succeeds.
    pending_save: Option<String>,
    /// Address given on the command line, if any.
    initial_address: Option<String>,
}

fn create_session(cli: &Cli, prefs_path: PathBuf) -> Result<Session> {
    let prefs = Preferences::load(&prefs_path)?;
    let host = Arc::new(ConsoleHost::new());

    let mut mock = None;
    let (connector, initial_address): (Arc<dyn Connector>, Option<String>) = if cli.mock {
        let mut transport = MockTransport::new().with_name("DialPhone (mock)");
        // An idle handset answers the state request with its hook state.
        transport.expect(b"s", b"HANGUP\r\n");
        mock = Some(transport.handle());
        let connector = MockConnector::new();
        connector.add_device(MOCK_ADDRESS, transport);
        (Arc::new(connector), Some(MOCK_ADDRESS.to_string()))
    } else if let Some(addr) = &cli.host {
        (Arc::new(TcpConnector::new()), Some(addr.clone()))
    } else {
        let config = SerialConfig {
            baud_rate: cli.baud,
            ..Default::default()
        };
        (Arc::new(SerialConnector::new(config)), cli.port.clone())
    };

    let mut builder = BridgeBuilder::new().connect_timeout(Duration::from_secs(cli.connect_timeout));
    if cli.newline {
        builder = builder.command_terminator(b"\n");
    }
    let bridge = builder
        .build_with_connector(connector, host.clone())
        .context("failed to set up the bridge")?;

    Ok(Session {
        bridge,
        host,
        mock,
        prefs_path,
        prefs,
        pending_save: None,
        initial_address,
    })
}

impl Session {
    /// Connect to the command-line address, or else the saved one.
    async fn connect_initial(&mut self) {
        if let Some(addr) = self.initial_address.clone() {
            self.connect(&addr, addr != MOCK_ADDRESS).await;
        } else if let Some(addr) = self.prefs.last_device_address.clone() {
            println!("Connecting to saved handset {addr}");
            self.connect(&addr, false).await;
        } else {
            println!("No handset configured. Use `connect <address>` or --port/--host/--mock.");
        }
    }

    async fn connect(&mut self, address: &str, remember: bool) {
        self.pending_save = remember.then(|| address.to_string());
        self.bridge.connect(address).await;
    }

    fn remember(&mut self, address: String) -> Result<()> {
        if self.prefs.last_device_address.as_deref() == Some(address.as_str()) {
            return Ok(());
        }
        self.prefs.last_device_address = Some(address);
        self.prefs.save(&self.prefs_path)?;
        tracing::debug!(path = %self.prefs_path.display(), "preferences saved");
        Ok(())
    }

    async fn on_event(&mut self, event: BridgeEvent) -> Result<()> {
        match event {
            BridgeEvent::StateChanged {
                state: LinkState::Connected,
                remote_name,
            } => {
                let name = remote_name.unwrap_or_else(|| "handset".into());
                println!("[link] connected to {name}");
                if let Some(addr) = self.pending_save.take() {
                    self.remember(addr)?;
                }
            }
            BridgeEvent::StateChanged { state, .. } => {
                if state == LinkState::Disconnected {
                    self.pending_save = None;
                }
                println!("[link] {state}");
            }
            BridgeEvent::LinkError(failure) => println!("[link] error: {failure}"),
            BridgeEvent::DigitDialed(digit) => {
                let number = self.bridge.dialed_number().await;
                if number.is_empty() {
                    println!("[handset] dialed {digit}");
                } else {
                    println!("[handset] dialed {digit}: {number}");
                }
            }
            BridgeEvent::CallPlaced(number) => println!("[bridge] call placed to {number}"),
            BridgeEvent::CallFailed { number, reason } => {
                println!("[bridge] call to {number} failed: {reason}")
            }
            BridgeEvent::CallEnded => println!("[handset] hung up"),
            BridgeEvent::CallAnswered => println!("[handset] picked up"),
        }
        Ok(())
    }

    /// Run one console command. Returns `false` to quit.
    async fn handle_command(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Ok(true);
        };
        let arg = words.next();

        match cmd {
            "quit" | "exit" => return Ok(false),
            "help" | "?" => print_help(self.mock.is_some()),
            "ring" => self.host.set_call_state(HostCallState::Ringing),
            "ringing" | "idle" | "offhook" | "off-hook" => match cmd.parse::<HostCallState>() {
                Ok(state) => self.host.set_call_state(state),
                Err(e) => println!("{e}"),
            },
            "delete" => match self.bridge.delete_last_digit().await {
                Some(digit) => {
                    println!("removed {digit}: {}", self.bridge.dialed_number().await)
                }
                None => println!("nothing dialed"),
            },
            "call" => {
                if !self.bridge.request_call().await {
                    println!("nothing dialed");
                }
            }
            "number" => println!("{}", self.bridge.dialed_number().await),
            "status" => {
                let state = self.bridge.link_state().await;
                let name = self.bridge.link().remote_name().await;
                println!("link:    {state}");
                println!("device:  {}", name.as_deref().unwrap_or("-"));
                println!("number:  {}", self.bridge.dialed_number().await);
                println!("calls:   {}", self.host.calls().len());
            }
            "connect" => {
                let addr = arg
                    .map(str::to_string)
                    .or_else(|| self.initial_address.clone())
                    .or_else(|| self.prefs.last_device_address.clone());
                match addr {
                    Some(addr) => {
                        let remember = addr != MOCK_ADDRESS;
                        self.connect(&addr, remember).await;
                    }
                    None => println!("usage: connect <address>"),
                }
            }
            "disconnect" => self.bridge.disconnect().await,
            "dial" | "hangup" | "pickup" => self.handset_command(cmd, arg),
            other => println!("unknown command: {other} (try `help`)"),
        }
        Ok(true)
    }

    /// Make the mock handset print a line.
    fn handset_command(&self, cmd: &str, arg: Option<&str>) {
        let Some(handle) = &self.mock else {
            println!("`{cmd}` needs --mock");
            return;
        };
        match (cmd, arg) {
            ("dial", Some(digits)) if digits.chars().all(|c| c.is_ascii_digit()) => {
                for d in digits.chars() {
                    handle.push_line(&format!("DIAL{d}"));
                }
            }
            ("dial", _) => println!("usage: dial <digits>"),
            ("hangup", _) => handle.push_line("HANGUP"),
            _ => handle.push_line("PICKUP"),
        }
    }
}

fn print_help(mock: bool) {
    println!("Commands:");
    println!("  ring | idle | offhook   set the host call state");
    println!("  delete                  remove the last dialed digit");
    println!("  call                    call the digits dialed so far");
    println!("  number | status         show the number / link status");
    println!("  connect [address]       connect (and remember the handset)");
    println!("  disconnect              close the link");
    if mock {
        println!("  dial <digits>           turn the mock handset's dial");
        println!("  pickup | hangup         lift / replace the mock receiver");
    }
    println!("  quit                    exit");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run(mut session: Session) -> Result<()> {
    print_help(session.mock.is_some());

    let mut events = session.bridge.subscribe();
    session.connect_initial().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => match event {
                Ok(event) => session.on_event(event).await?,
                Err(RecvError::Lagged(n)) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => {
                    if !session.handle_command(line.trim()).await? {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    session.bridge.shutdown().await;
    Ok(())
}

async fn cmd_monitor(mut session: Session, duration_secs: u64) -> Result<()> {
    let mut events = session.bridge.subscribe();
    session.connect_initial().await;

    println!("Monitoring bridge events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            result = tokio::time::timeout(timeout, events.recv()) => match result {
                Ok(Ok(event)) => {
                    println!("[event] {event:?}");
                    let connected = matches!(
                        event,
                        BridgeEvent::StateChanged { state: LinkState::Connected, .. }
                    );
                    if connected {
                        if let Some(addr) = session.pending_save.take() {
                            session.remember(addr)?;
                        }
                    }
                }
                Ok(Err(RecvError::Lagged(n))) => {
                    println!("[warning] missed {n} events (consumer too slow)");
                }
                Ok(Err(RecvError::Closed)) => {
                    println!("Event channel closed.");
                    break;
                }
                // Deadline reached, or the hourly wake-up with no deadline.
                Err(_) => {}
            },
        }
    }

    session.bridge.shutdown().await;
    Ok(())
}

fn cmd_prefs(path: &std::path::Path, action: &PrefsAction) -> Result<()> {
    let mut prefs = Preferences::load(path)?;
    match action {
        PrefsAction::Show => {
            println!("{}", path.display());
            println!(
                "last_device_address = {}",
                prefs.last_device_address.as_deref().unwrap_or("(none)")
            );
        }
        PrefsAction::Forget => {
            prefs.last_device_address = None;
            prefs.save(path)?;
            println!("Saved handset forgotten.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    validate_options(&cli)?;

    let prefs_path = cli.config.clone().unwrap_or_else(prefs::default_path);

    match &cli.command {
        Some(Command::Prefs { action }) => cmd_prefs(&prefs_path, action),
        Some(Command::Monitor { duration }) => {
            let session = create_session(&cli, prefs_path)?;
            cmd_monitor(session, *duration).await
        }
        Some(Command::Run) | None => {
            let session = create_session(&cli, prefs_path)?;
            cmd_run(session).await
        }
    }
}
