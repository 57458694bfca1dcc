mod client;
mod envelope;
mod message;

pub use client::{Client, RequestMethod, MESSAGE_SEND_PATH};
pub use envelope::Envelope;
pub use message::{
    Markdown, Message, MessageContent, SendMessageResponse, Text, TextCard, ALL_USERS,
};
