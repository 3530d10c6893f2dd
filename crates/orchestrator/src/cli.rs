use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn, LevelFilter};
use shared::center::{CenterApi, CenterClient};
use shared::models::node::display_name;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{OrchestratorConfig, DEFAULT_BACKEND_URL};
use crate::view::{find_node, render_dashboard, state_line};
use crate::{DirectoryMonitor, NodeOutcome, ReportSink, SpeedtestRunner, StoreContext};

const INPUT_HINT: &str = "Enter a card number or node name to test it, 'all' to test every node, 'q' to quit.";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Speedtest center backend url
    #[arg(long, global = true, default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: Url,

    /// Node directory refresh interval in seconds
    #[arg(short = 'i', long, global = true, default_value = "5")]
    pub refresh_interval: u64,

    /// Delay before each test of a sequential run, in milliseconds
    #[arg(long, global = true, default_value = "1000")]
    pub test_delay_ms: u64,

    /// Timeout for a single backend request in seconds
    #[arg(long, global = true, default_value = "90")]
    pub request_timeout: u64,

    /// Append successful results to this JSON lines file
    #[arg(long, global = true)]
    pub report_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the live dashboard and take test triggers from stdin (default)
    Watch,

    /// Fetch the node directory once and print it
    Nodes,

    /// Run a speedtest on a single node
    Test {
        /// Node name, display name or card number
        node: String,
    },

    /// Test every discovered node, one after another
    RunAll,
}

impl Cli {
    pub fn log_level_filter(&self) -> LevelFilter {
        match self.log_level.as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        }
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            backend_url: self.backend_url.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval),
            test_delay: Duration::from_millis(self.test_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout),
            report_file: self.report_file.clone(),
        }
    }

    pub async fn run(self, cancellation_token: CancellationToken) -> Result<()> {
        let config = self.config();
        config.validate()?;
        debug!("Using backend {}", config.backend_url);

        let center: Arc<dyn CenterApi> = Arc::new(
            CenterClient::new(&config.backend_url, config.request_timeout)
                .context("failed to build backend client")?,
        );
        let store_context = Arc::new(StoreContext::new());
        let report_sink = config.report_file.clone().map(|path| {
            info!("Writing speedtest reports to {}", path.display());
            Arc::new(ReportSink::new(path))
        });
        let runner = Arc::new(SpeedtestRunner::new(
            store_context.clone(),
            center.clone(),
            config.test_delay,
            report_sink,
        ));
        let monitor = DirectoryMonitor::new(store_context.clone(), center, config.refresh_interval);

        let session = Session {
            backend_url: config.backend_url,
            store_context,
            runner,
        };
        match self.command.unwrap_or(Commands::Watch) {
            Commands::Watch => session.watch(monitor, cancellation_token).await,
            Commands::Nodes => {
                session.load_directory(&monitor).await?;
                print!("{}", session.dashboard().await);
                Ok(())
            }
            Commands::Test { node } => {
                session.load_directory(&monitor).await?;
                session.test_node(&node, cancellation_token).await
            }
            Commands::RunAll => {
                session.load_directory(&monitor).await?;
                session.run_all(monitor, cancellation_token).await
            }
        }
    }
}

struct Session {
    backend_url: Url,
    store_context: Arc<StoreContext>,
    runner: Arc<SpeedtestRunner>,
}

impl Session {
    async fn load_directory(&self, monitor: &DirectoryMonitor) -> Result<()> {
        monitor
            .refresh()
            .await
            .with_context(|| format!("failed to fetch nodes from {}", self.backend_url))?;
        Ok(())
    }

    async fn dashboard(&self) -> String {
        let directory = self.store_context.directory_store.snapshot().await;
        let states = self.store_context.test_state_store.snapshot().await;
        render_dashboard(&directory, &states, self.runner.is_running_all())
    }

    async fn test_node(&self, input: &str, cancellation_token: CancellationToken) -> Result<()> {
        let directory = self.store_context.directory_store.snapshot().await;
        let Some(node) = find_node(&directory, input) else {
            let known: Vec<String> = directory.nodes.iter().map(|n| n.display_name()).collect();
            anyhow::bail!("unknown node '{input}', known nodes: [{}]", known.join(", "));
        };

        println!("Testing {} at {}...", node.display_name(), node.endpoint());
        let state = tokio::select! {
            state = self.runner.run_node_test(&node.name) => state?,
            () = cancellation_token.cancelled() => {
                warn!("Speedtest interrupted");
                return Ok(());
            }
        };
        println!("{}: {}", node.display_name(), state_line(&state));
        Ok(())
    }

    async fn run_all(
        &self,
        monitor: DirectoryMonitor,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        let monitor_handle = monitor.spawn(cancellation_token.child_token());

        let run = self
            .runner
            .run_all_sequential_with_progress(|node_name, outcome| {
                let line = match outcome {
                    NodeOutcome::Finished(state) => state_line(state),
                    NodeOutcome::Skipped => "skipped, a test was already in flight".to_string(),
                };
                println!("{}: {line}", display_name(node_name));
            });
        let summary = tokio::select! {
            summary = run => summary,
            () = cancellation_token.cancelled() => {
                warn!("Sequential run interrupted");
                monitor_handle.stop().await;
                return Ok(());
            }
        };
        monitor_handle.stop().await;
        let summary = summary?;

        println!();
        print!("{}", self.dashboard().await);
        if summary.is_empty() {
            println!("No nodes to test.");
        } else {
            println!(
                "{} succeeded, {} failed, {} skipped",
                summary.succeeded(),
                summary.failed(),
                summary.skipped()
            );
        }
        Ok(())
    }

    async fn watch(
        &self,
        monitor: DirectoryMonitor,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        let mut events = self.store_context.subscribe();
        let monitor_handle = monitor.spawn(cancellation_token.child_token());
        let mut input = spawn_stdin_reader();
        let mut input_open = true;
        let mut triggers: JoinSet<()> = JoinSet::new();

        self.print_dashboard().await;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(_) | Err(RecvError::Lagged(_)) => self.print_dashboard().await,
                    Err(RecvError::Closed) => break,
                },
                line = input.recv(), if input_open => match line {
                    Some(line) => {
                        if !self.handle_input(line.trim(), &mut triggers).await {
                            break;
                        }
                    }
                    None => {
                        debug!("stdin closed, dashboard input disabled");
                        input_open = false;
                    }
                },
                // Re-render once the run-all flag is released
                Some(_) = triggers.join_next() => self.print_dashboard().await,
                () = cancellation_token.cancelled() => break,
            }
        }

        monitor_handle.stop().await;
        triggers.shutdown().await;
        Ok(())
    }

    /// Returns `false` when the user asked to quit.
    async fn handle_input(&self, input: &str, triggers: &mut JoinSet<()>) -> bool {
        match input {
            "" => {}
            "q" | "quit" => return false,
            "all" => {
                let runner = self.runner.clone();
                triggers.spawn(async move {
                    if let Err(e) = runner.run_all_sequential().await {
                        warn!("{e}");
                    }
                });
            }
            _ => {
                let directory = self.store_context.directory_store.snapshot().await;
                let Some(node) = find_node(&directory, input) else {
                    warn!("No node matches '{input}'");
                    return true;
                };
                let runner = self.runner.clone();
                let node_name = node.name.clone();
                triggers.spawn(async move {
                    if let Err(e) = runner.run_node_test(&node_name).await {
                        warn!("{e}");
                    }
                });
            }
        }
        true
    }

    async fn print_dashboard(&self) {
        println!();
        print!("{}", self.dashboard().await);
        println!("{INPUT_HINT}");
    }
}

// Blocking reads on a plain thread so that shutdown never waits for a line
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared::center::CenterError;
    use shared::models::{Node, NodeInfo, SpeedtestResult};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCenter {
        tested: Mutex<Vec<String>>,
    }

    impl RecordingCenter {
        fn tested(&self) -> Vec<String> {
            self.tested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CenterApi for RecordingCenter {
        async fn fetch_nodes(&self) -> Result<Vec<Node>, CenterError> {
            Ok(Vec::new())
        }

        async fn run_speedtest(&self, node_name: &str) -> Result<SpeedtestResult, CenterError> {
            self.tested.lock().unwrap().push(node_name.to_string());
            Ok(SpeedtestResult {
                speed_mbps: Some(10.0),
                ..Default::default()
            })
        }
    }

    async fn session_with_nodes(names: &[&str]) -> (Session, Arc<RecordingCenter>) {
        let store_context = Arc::new(StoreContext::new());
        store_context
            .directory_store
            .replace(
                names
                    .iter()
                    .map(|name| {
                        Node::new(
                            *name,
                            NodeInfo {
                                ip: "10.0.0.5".to_string(),
                                port: 7123,
                                status: "up".to_string(),
                            },
                        )
                    })
                    .collect(),
            )
            .await;
        let center = Arc::new(RecordingCenter::default());
        let runner = Arc::new(SpeedtestRunner::new(
            store_context.clone(),
            center.clone(),
            Duration::ZERO,
            None,
        ));
        let session = Session {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).unwrap(),
            store_context,
            runner,
        };
        (session, center)
    }

    async fn drain(triggers: &mut JoinSet<()>) {
        while let Some(res) = triggers.join_next().await {
            res.unwrap();
        }
    }

    const LAB_PI: &str = "Speedtest Node on lab-pi._speedtest._tcp.local.";

    #[tokio::test]
    async fn test_input_all_starts_sequential_run() {
        let (session, center) = session_with_nodes(&[LAB_PI, "N2"]).await;
        let mut triggers = JoinSet::new();

        assert!(session.handle_input("all", &mut triggers).await);
        assert_eq!(triggers.len(), 1);
        drain(&mut triggers).await;

        assert_eq!(center.tested(), vec![LAB_PI, "N2"]);
        assert!(!session.runner.is_running_all());
    }

    #[tokio::test]
    async fn test_input_card_number_and_display_name_trigger_node() {
        let (session, center) = session_with_nodes(&[LAB_PI, "N2"]).await;
        let mut triggers = JoinSet::new();

        assert!(session.handle_input("2", &mut triggers).await);
        drain(&mut triggers).await;
        assert!(session.handle_input("lab-pi", &mut triggers).await);
        drain(&mut triggers).await;

        assert_eq!(center.tested(), vec!["N2", LAB_PI]);
        let states = session.store_context.test_state_store.snapshot().await;
        assert_eq!(states["N2"].as_str(), "success");
        assert_eq!(states[LAB_PI].as_str(), "success");
    }

    #[tokio::test]
    async fn test_input_quit() {
        let (session, _) = session_with_nodes(&["N1"]).await;
        let mut triggers = JoinSet::new();

        assert!(!session.handle_input("q", &mut triggers).await);
        assert!(!session.handle_input("quit", &mut triggers).await);
        assert!(triggers.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_empty_input_spawns_nothing() {
        let (session, center) = session_with_nodes(&["N1"]).await;
        let mut triggers = JoinSet::new();

        assert!(session.handle_input("missing", &mut triggers).await);
        assert!(session.handle_input("5", &mut triggers).await);
        assert!(session.handle_input("", &mut triggers).await);
        assert!(triggers.is_empty());
        assert!(center.tested().is_empty());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["speedtest-orchestrator"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level_filter(), LevelFilter::Info);

        let config = cli.config();
        assert_eq!(config.backend_url.as_str(), "http://localhost:8082/");
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.test_delay, Duration::from_millis(1000));
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert!(config.report_file.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "speedtest-orchestrator",
            "test",
            "lab-pi",
            "--backend-url",
            "http://center.lan:9000",
            "--test-delay-ms",
            "250",
            "-l",
            "debug",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Some(Commands::Test {
                node: "lab-pi".to_string()
            })
        );
        assert_eq!(cli.log_level_filter(), LevelFilter::Debug);
        let config = cli.config();
        assert_eq!(config.backend_url.port(), Some(9000));
        assert_eq!(config.test_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_run_all_with_report_file() {
        let cli = Cli::try_parse_from([
            "speedtest-orchestrator",
            "run-all",
            "--report-file",
            "reports/speedtests.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::RunAll));
        assert_eq!(
            cli.config().report_file,
            Some(PathBuf::from("reports/speedtests.jsonl"))
        );
    }

    #[test]
    fn test_invalid_backend_url_is_rejected() {
        assert!(Cli::try_parse_from(["speedtest-orchestrator", "--backend-url", "not a url"]).is_err());
    }

    #[test]
    fn test_unknown_log_level_falls_back_to_info() {
        let cli = Cli::try_parse_from(["speedtest-orchestrator", "-l", "verbose"]).unwrap();
        assert_eq!(cli.log_level_filter(), LevelFilter::Info);
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_one_shot_commands() {
        let cli = Cli::try_parse_from([
            "speedtest-orchestrator",
            "nodes",
            "--backend-url",
            "http://127.0.0.1:1",
        ])
        .unwrap();
        let err = cli.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("failed to fetch nodes"));
    }

    #[tokio::test]
    async fn test_unknown_node_lists_known_nodes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/nodes")
            .with_status(200)
            .with_body(r#"{"nodes": {"Speedtest Node on lab-pi._speedtest._tcp.local.": {"ip": "10.0.0.5", "port": 7123, "status": "up"}}}"#)
            .create_async()
            .await;

        let backend_url = server.url();
        let cli = Cli::try_parse_from([
            "speedtest-orchestrator",
            "test",
            "missing",
            "--backend-url",
            backend_url.as_str(),
        ])
        .unwrap();
        let err = cli.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown node 'missing', known nodes: [lab-pi]"
        );
    }
}
