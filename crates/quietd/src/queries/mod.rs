//! §4.4 Queries: read-only lookups over `&ReadStore`, dispatched by name the
//! same way `commands::CommandRegistry` dispatches command names. Grounded
//! on `original_source/protocols/quiet/queries.py`'s `{query_name: fn}`
//! dispatch table — the same translation applied to the original's command
//! dict. Unlike a command, a query never touches the pipeline: it has
//! nothing to sign, validate, or project, so it returns plain JSON rather
//! than envelopes.
//!
//! The capability split itself lives one level down, at the type level:
//! every query function below takes `&ReadStore`, which exposes no mutating
//! method at all (§6 "read-only cursor view", §7 `PermissionDenied`,
//! testable property #6) — there is no runtime check to bypass because
//! there is no write method to call.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::ReadStore;

mod dump_database;
mod get_channel;
mod get_event_row;
mod get_group;
mod get_identity;
mod get_invite;
mod get_user;
mod list_addresses_for_peer;
mod list_channels_for_group;
mod list_group_members;
mod list_groups_for_network;
mod list_identities_for_network;
mod list_messages_for_channel;
mod list_users_for_network;

pub trait Query: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, params: Value, store: &ReadStore) -> Result<Value>;
}

pub struct QueryRegistry {
    queries: Vec<Box<dyn Query>>,
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self { queries: Vec::new() }
    }

    pub fn register(&mut self, query: Box<dyn Query>) -> &mut Self {
        self.queries.push(query);
        self
    }

    pub fn dispatch(&self, name: &str, params: Value, store: &ReadStore) -> Result<Value> {
        let query = self.queries.iter().find(|q| q.name() == name);
        match query {
            Some(q) => q.run(params, store),
            None => Err(Error::UnknownQuery(name.to_string())),
        }
    }

    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(Box::new(get_identity::GetIdentity))
            .register(Box::new(list_identities_for_network::ListIdentitiesForNetwork))
            .register(Box::new(get_user::GetUser))
            .register(Box::new(list_users_for_network::ListUsersForNetwork))
            .register(Box::new(get_group::GetGroup))
            .register(Box::new(list_groups_for_network::ListGroupsForNetwork))
            .register(Box::new(list_group_members::ListGroupMembers))
            .register(Box::new(get_channel::GetChannel))
            .register(Box::new(list_channels_for_group::ListChannelsForGroup))
            .register(Box::new(list_messages_for_channel::ListMessagesForChannel))
            .register(Box::new(get_invite::GetInvite))
            .register(Box::new(list_addresses_for_peer::ListAddressesForPeer))
            .register(Box::new(get_event_row::GetEventRow))
            .register(Box::new(dump_database::DumpDatabase));
        r
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn required_str(params: &Value, field: &str) -> Result<String> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Core(quiet_core::Error::InputMalformed(format!("missing or non-string field: {field}"))))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Core(quiet_core::Error::from(e)))
}
