//! Slack channel: Web API client and Socket Mode connector.
//!
//! Inbound envelopes are decoded into [`InboundEvent`]s and handed to the bot; outbound
//! calls go through the [`SlackApi`] trait so handlers can be driven by a fake in tests.

mod inbound;
mod slack;
mod socket_mode;

pub use inbound::{InboundEvent, SlackFile};
pub use slack::{PostedMessage, SlackApi, SlackClient, SlackError};
pub use socket_mode::{ack_frame, decode_envelope, Envelope, EnvelopeBody, SocketModeListener};
