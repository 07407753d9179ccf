pub mod connectivity;
pub mod converter;
pub mod gemini;
pub mod retry;
pub mod sse;
pub mod types;

pub mod mock;

pub use connectivity::{StaticConnectivity, TcpProbe};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use mock::{MockGateway, MockReply};
pub use retry::{RetryConfig, RetryingGateway};
