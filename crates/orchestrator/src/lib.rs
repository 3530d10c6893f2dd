pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod report;
pub mod speedtest;
pub mod store;
pub mod utils;
pub mod view;

pub use config::OrchestratorConfig;
pub use discovery::monitor::DirectoryMonitor;
pub use discovery::monitor::MonitorHandle;
pub use error::RunError;
pub use models::test_state::TestState;
pub use report::ReportSink;
pub use speedtest::NodeOutcome;
pub use speedtest::RunSummary;
pub use speedtest::SpeedtestRunner;
pub use store::core::StoreContext;
pub use store::core::StoreEvent;
