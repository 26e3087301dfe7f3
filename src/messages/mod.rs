//! Private messaging for userbase.
//!
//! A message has one sender and any number of recipients. Mailboxes are
//! views over the same rows:
//! - inbox: received and not trashed by the recipient
//! - outbox: sent and not trashed by the sender
//! - drafts: never sent
//! - trash: trashed by the user on either side

mod repository;
mod service;
mod types;

pub use repository::MessageRepository;
pub use service::MessageService;
pub use types::{
    parse_message_ids, Contact, Message, MessageContact, MessageDetail, MessageRecipient,
    NewMessage, MAX_BODY_LENGTH,
};
