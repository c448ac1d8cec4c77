//! Reusable mock RPC nodes and fixtures.
//!
//! ```ignore
//! use tests::mock_infrastructure::RpcMockBuilder;
//!
//! let mut node = RpcMockBuilder::new().await;
//! node.mock_block_number(100).await;
//!
//! // Point the pool at node.url()
//! ```

pub mod rpc_mock;
pub mod test_helpers;

pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
