//! Process messages: a name plus an argument list, addressed to a process role.
//!
//! A [`ProcessMessenger`] wraps a channel and stamps every outgoing message
//! with the local role and the role it is meant for. On the receiving side a
//! [`MessageDispatcher`] is installed as the channel handler; it decodes the
//! envelope and calls the listeners registered for the message name.

pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod message;
pub mod messenger;
pub mod role;

pub use dispatcher::{IncomingMessage, MessageDispatcher, MessageListener};
pub use envelope::{decode_envelope, encode_envelope, Envelope, ENVELOPE_VERSION};
pub use error::{MessageError, Result};
pub use message::ProcessMessage;
pub use messenger::ProcessMessenger;
pub use role::{ListenerScope, ProcessRole};
