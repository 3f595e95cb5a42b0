//! LLM-backed draft composition.
//!
//! The composer is given the authoritative figure and terms and asked for
//! prose. Its output is returned verbatim: the engine's validation gate is
//! the only judge of whether the text is sendable.

use std::sync::Arc;

use async_trait::async_trait;

use parley_core::{ApplicationError, ComposeRequest, ComposeStage, MessageComposer};

use crate::llm::LlmClient;

pub struct LlmMessageComposer {
    client: Arc<dyn LlmClient>,
}

impl LlmMessageComposer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(request: &ComposeRequest) -> String {
        let goal = match request.stage {
            ComposeStage::Counter => "Counter their last message with our offer",
            ComposeStage::QuestionReply => {
                "Answer their question, then restate our current offer"
            }
        };
        format!(
            "You are writing a short, warm, professional email to {counterpart} in an ongoing \
             sponsorship negotiation.\n\
             {goal}. The offer is exactly ${price}; do not mention any other amount, do not \
             promise exclusivity, rights, or future work.\n\
             Deliverables to reference: {deliverables}.\n\
             Context from their reply: {context}\n\
             Write only the email body, no subject line.",
            counterpart = request.counterpart,
            price = request.authoritative_price,
            deliverables = request.deliverables.join("; "),
            context = request.style_context,
        )
    }
}

#[async_trait]
impl MessageComposer for LlmMessageComposer {
    async fn compose(&self, request: &ComposeRequest) -> Result<String, ApplicationError> {
        let prompt = Self::prompt(request);
        let draft = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ApplicationError::Collaborator(format!("composer: {error}")))?;
        Ok(draft.trim().to_string())
    }
}
