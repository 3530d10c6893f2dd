pub mod node;
pub mod speedtest;

pub use node::Node;
pub use node::NodeInfo;
pub use speedtest::SpeedtestResult;
