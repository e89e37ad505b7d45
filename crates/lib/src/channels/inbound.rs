//! Inbound message from a channel: handed to the conversion pipeline.

/// A text message from a channel, to be translated and answered in the same conversation.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub conversation_id: String,
    pub text: String,
}
