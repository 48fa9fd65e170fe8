//! Clients for the external collaborators: the pattern config server and the
//! chat backend. Both speak JSON over HTTP and are reached through the traits
//! in [`traits`] so hosts and tests can substitute their own transport.

pub mod chat;
pub mod config_server;
pub mod traits;

pub use chat::{send_turn, ChatClient, ChatMessage, ChatReply, Conversation, Role, FALLBACK_REPLY, GREETING};
pub use config_server::{ConfigClient, ConfigUpdate, RemoteConfig};
pub use traits::{ChatApi, ConfigApi};

use url::Url;

use crate::error::Result;

/// Parse a collaborator base URL so that relative joins append to its path.
pub(crate) fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
