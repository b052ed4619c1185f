//! Service layer for the watcher.
//!
//! This module contains the business logic for:
//! - Resource fetching (`HttpFetcher`, `fetch_resource`)
//! - Text extraction (`extract`)
//! - HTML section scoping (`sections`)
//! - Change notification (`Notifier`)

pub mod extract;
mod fetcher;
mod notifier;
pub mod sections;

pub use fetcher::{Fetched, HttpFetcher, ResourceFetcher, fetch_resource, find_link};
pub use notifier::{LogTransport, MailTransport, Message, Notifier, SendGridTransport};
