//! Client selection.
//!
//! Every run acts on a subset of the loaded client records. The subset is
//! described by a [`SelectionCriteria`] built from the command line: an
//! optional single client name plus at most one of an include list or an
//! exclude list. Inactive clients are never selected.

use crate::config::ClientRecord;
use std::collections::BTreeSet;

/// Membership test applied after the active and single-client checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientFilter {
    /// Every active client passes.
    #[default]
    All,
    /// Only clients whose lowercased name is listed.
    Include(BTreeSet<String>),
    /// Every client whose lowercased name is not listed.
    Exclude(BTreeSet<String>),
}

impl ClientFilter {
    /// Build an include filter, lowercasing the names.
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ClientFilter::Include(names.into_iter().map(|n| n.as_ref().to_lowercase()).collect())
    }

    /// Build an exclude filter, lowercasing the names.
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ClientFilter::Exclude(names.into_iter().map(|n| n.as_ref().to_lowercase()).collect())
    }

    fn admits(&self, key: &str) -> bool {
        match self {
            ClientFilter::All => true,
            ClientFilter::Include(names) => names.contains(key),
            ClientFilter::Exclude(names) => !names.contains(key),
        }
    }
}

/// Which clients a run acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    /// Case-insensitive exact client name
    pub client: Option<String>,
    pub filter: ClientFilter,
}

impl SelectionCriteria {
    /// Select every active client admitted by `filter`.
    pub fn all(filter: ClientFilter) -> Self {
        Self {
            client: None,
            filter,
        }
    }

    /// Select one client by name, still subject to `filter`.
    pub fn single(client: impl Into<String>, filter: ClientFilter) -> Self {
        Self {
            client: Some(client.into()),
            filter,
        }
    }

    /// Whether `client` passes the active check, the single-client check
    /// and the membership test.
    pub fn matches(&self, client: &ClientRecord) -> bool {
        if !client.active {
            return false;
        }
        let key = client.key();
        if let Some(wanted) = &self.client {
            if wanted.to_lowercase() != key {
                return false;
            }
        }
        self.filter.admits(&key)
    }
}

/// Filter `clients` by `criteria`, keeping input order. An empty result is
/// not an error.
pub fn select<'a>(
    clients: &'a [ClientRecord],
    criteria: &'a SelectionCriteria,
) -> impl Iterator<Item = &'a ClientRecord> + 'a {
    clients.iter().filter(move |client| {
        let selected = criteria.matches(client);
        if !selected {
            log::debug!("Client {} skipped by selection", client.name);
        }
        selected
    })
}
