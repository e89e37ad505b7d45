//! Gateway: HTTP server and inbound dispatch.
//!
//! Single port serves the health probe (`GET /`) and the Telegram webhook
//! (`POST /telegram/webhook`). Inbound messages from either transport go through one
//! dispatcher that runs the conversion pipeline per message.

mod server;

pub use server::{router, run_gateway, GatewayState};
