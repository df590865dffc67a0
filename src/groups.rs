//! Group directory
//!
//! Groups have no lifecycle of their own on the client: they exist exactly
//! insofar as the server reports blocks under them. Resolution is a single
//! round trip per call — nothing is cached, so re-resolving always reflects
//! current server state.

use crate::api::{ApiError, StorageApi};
use crate::identity::Identity;

/// Resolve the group names owned by `identity`. One `list_groups` call;
/// the returned sequence is finite and consumed once.
pub async fn resolve(
    identity: &Identity,
    api: &dyn StorageApi,
) -> Result<impl Iterator<Item = String>, ApiError> {
    let groups = api.list_groups(&identity.public_key()).await?;
    Ok(groups.into_iter())
}

/// Resolve the block keys within one of `identity`'s groups.
pub async fn resolve_keys(
    identity: &Identity,
    api: &dyn StorageApi,
    group: &str,
) -> Result<impl Iterator<Item = String>, ApiError> {
    let keys = api.list_keys(&identity.public_key(), group).await?;
    Ok(keys.into_iter())
}
