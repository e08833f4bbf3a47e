// Messaging module - STOMP frames, chat events and inbound routing
pub mod event;
pub mod frame;
pub mod router;

pub use event::{ChatEvent, EventType, InboundPayload, ReadReceipt};
pub use frame::{Command, Frame, Inbound};
pub use router::MessageRouter;
