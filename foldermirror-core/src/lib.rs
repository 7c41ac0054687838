mod client;
mod retry_after;

pub use client::{
    ApiErrorClass, ByteStream, DriveClient, DriveError, Entry, EntryKind, Folder, ItemPage,
};
pub use retry_after::parse_retry_after;
