pub mod connectivity;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod messages;
pub mod policy;
pub mod provider;
pub mod security;
pub mod stream;

pub use connectivity::ConnectivityProbe;
pub use errors::{ErrorKind, GatewayError};
pub use identity::Identity;
pub use ids::SessionId;
pub use messages::{Message, Role};
pub use policy::{CrisisResource, PromptPolicy, SystemPrompt, WellnessPolicy};
pub use provider::{ChunkStream, ConversationHandle, ProviderGateway};
pub use security::ApiKey;
pub use stream::StreamChunk;
