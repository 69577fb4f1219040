pub mod error;
pub mod explorer;
pub mod mock;
pub mod node;

pub use error::RpcError;
pub use explorer::{ExplorerClient, HttpExplorerClient};
pub use node::{BlockHeader, ContractCallResult, HttpNodeClient, NodeClient};
