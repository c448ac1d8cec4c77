//! Mock JSON-RPC node built on mockito.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

fn method_matcher(method: &str) -> Matcher {
    Matcher::Regex(format!(r#""method"\s*:\s*"{method}""#))
}

fn result_body(result: &Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

/// One mock RPC node.
///
/// Requests that match no registered mock get mockito's `501`, which the pool treats
/// like any other HTTP failure.
pub struct RpcMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
    /// Mocks created with an explicit hit count.
    expectations: Vec<Mock>,
}

impl RpcMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await, mocks: Vec::new(), expectations: Vec::new() }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Answers `eth_blockNumber` with `block_number` as a hex quantity.
    pub async fn mock_block_number(&mut self, block_number: u64) -> &mut Self {
        self.mock_method("eth_blockNumber", &json!(format!("0x{block_number:x}"))).await
    }

    /// Answers `method` with `result`, any number of times.
    pub async fn mock_method(&mut self, method: &str, result: &Value) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(result))
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with `result` and expects exactly `hits` calls.
    pub async fn mock_method_times(&mut self, method: &str, result: &Value, hits: usize) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(result_body(result))
            .expect(hits)
            .create_async()
            .await;

        self.expectations.push(mock);
        self
    }

    /// Answers `method` with a JSON-RPC error object.
    pub async fn mock_rpc_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": code, "message": message }
                })
                .to_string(),
            )
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers `method` with a gateway timeout status.
    pub async fn mock_timeout(&mut self, method: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(504)
            .with_body("Gateway Timeout")
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Answers every request with a 500.
    pub async fn mock_server_error(&mut self) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        self.mocks.push(mock);
        self
    }

    /// Expects `method` never to reach this node.
    pub async fn expect_no_calls(&mut self, method: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(method_matcher(method))
            .with_status(500)
            .expect(0)
            .create_async()
            .await;

        self.expectations.push(mock);
        self
    }

    /// Removes every registered mock; later requests get `501` until new ones are added.
    pub async fn reset(&mut self) {
        for mock in self.mocks.drain(..).chain(self.expectations.drain(..)) {
            mock.remove_async().await;
        }
    }

    /// Panics unless every mock with an explicit hit count received exactly that many calls.
    pub async fn assert_expectations(&self) {
        for mock in &self.expectations {
            mock.assert_async().await;
        }
    }
}
