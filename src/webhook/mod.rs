pub mod auth;
pub mod server;
pub mod types;

pub use auth::{AuthError, JwtVerifier, PushAuthVerifier};
pub use server::{webhook_router, WebhookState};
pub use types::{PubSubEnvelope, PubSubMessage, WebhookAck};
