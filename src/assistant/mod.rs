/// Client-facing assistant ("Amy")
///
/// Replies to inbound client messages with a language model, limited to
/// document-collection topics.

mod claude;
pub mod prompt;

pub use claude::ClaudeClient;

use crate::{
    db::models::{Accountant, Message},
    error::ChaseResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared reply generator trait object
pub type DynReplyGenerator = Arc<dyn ReplyGenerator>;

/// Reply sent when the model returns nothing usable or fails
pub const FALLBACK_REPLY: &str =
    "Thanks for your message. I've passed it on to the team and someone will get back to you soon.";

/// Language model behind the assistant
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply; `None` when the model produced no text
    async fn generate(&self, system: &str, conversation: &str) -> ChaseResult<Option<String>>;
}

/// Compose the assistant's reply to an inbound message
///
/// `history` is oldest-first and should already be limited to recent
/// messages. Model failures degrade to [`FALLBACK_REPLY`].
pub async fn reply_to(
    generator: &dyn ReplyGenerator,
    accountant: &Accountant,
    history: &[Message],
    inbound: &str,
) -> String {
    let system = prompt::system_prompt(accountant);
    let conversation = prompt::conversation(history, inbound);

    match generator.generate(&system, &conversation).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            tracing::warn!(accountant_id = %accountant.id, "Assistant returned no text; using fallback");
            FALLBACK_REPLY.to_string()
        }
        Err(e) => {
            tracing::error!(accountant_id = %accountant.id, "Assistant reply failed: {}", e);
            FALLBACK_REPLY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::fixtures::accountant;
    use crate::error::ChaseError;
    use std::sync::Mutex;

    struct Scripted {
        result: Mutex<Option<ChaseResult<Option<String>>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(result: ChaseResult<Option<String>>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReplyGenerator for Scripted {
        async fn generate(&self, system: &str, conversation: &str) -> ChaseResult<Option<String>> {
            self.seen.lock().unwrap().push(format!("{}\n---\n{}", system, conversation));
            self.result.lock().unwrap().take().unwrap_or(Ok(None))
        }
    }

    #[tokio::test]
    async fn test_model_text_is_returned() {
        let gen = Scripted::new(Ok(Some("Got it, thanks!".into())));
        let reply = reply_to(&gen, &accountant(), &[], "here you go").await;
        assert_eq!(reply, "Got it, thanks!");
        assert!(gen.seen.lock().unwrap()[0].ends_with("here you go"));
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback() {
        let gen = Scripted::new(Ok(None));
        assert_eq!(reply_to(&gen, &accountant(), &[], "hi").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_vendor_error_uses_fallback() {
        let gen = Scripted::new(Err(ChaseError::vendor("Claude", "overloaded")));
        assert_eq!(reply_to(&gen, &accountant(), &[], "hi").await, FALLBACK_REPLY);
    }
}
