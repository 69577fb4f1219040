pub mod addr_hist;
pub mod address;
pub mod block;
pub mod config;
pub mod event;
pub mod json;
pub mod sse;
pub mod stat;
pub mod user;
pub mod user_addr;

pub use addr_hist::AddrHist;
pub use address::{Address, AddressType};
pub use block::Block;
pub use config::Config;
pub use event::{Event, EventKind, EVENT_TTL_HOURS};
pub use json::JsonPatch;
pub use sse::{AddrHistResult, BlockSseEvent, BlockSseResult};
pub use stat::Stat;
pub use user::User;
pub use user_addr::{UserAddr, UserAddrHist};

/// Confirmation depth at which a block's address states are frozen and republished.
pub const MATURITY: u32 = 501;
