//! OAuth2 client registry
//!
//! Clients are seeded once at startup and never change while the process
//! runs. Secrets are kept only as SHA-256 digests.

use std::collections::{BTreeSet, HashMap};

use sha2::{Digest, Sha256};

use crate::keys::constant_time_eq;

/// A registered machine client
#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,

    /// Hex SHA-256 of the client secret
    pub secret_hash: String,

    /// Scopes this client may be granted
    pub scopes: BTreeSet<String>,

    pub active: bool,
}

impl Client {
    pub fn new(client_id: &str, client_secret: &str, scopes: &[&str]) -> Self {
        Self {
            client_id: client_id.to_string(),
            secret_hash: hash_secret(client_secret),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Compare a presented secret against the stored digest in constant time
    pub fn verify_secret(&self, candidate: &str) -> bool {
        constant_time_eq(
            hash_secret(candidate).as_bytes(),
            self.secret_hash.as_bytes(),
        )
    }

    pub fn allows_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}

/// Hash a client secret for storage
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lookup of registered clients.
///
/// The token service only depends on this trait, so a database-backed
/// directory can replace the in-memory registry.
pub trait ClientDirectory: Send + Sync {
    fn lookup(&self, client_id: &str) -> Option<Client>;
}

/// Read-only, in-memory client table
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }

    /// The built-in seed list: one read/write client and one read-only client
    pub fn with_defaults() -> Self {
        Self::new([
            Client::new(
                "demo-client",
                "demo-secret-12345",
                &[super::SCOPE_READ, super::SCOPE_WRITE],
            ),
            Client::new("test-client", "test-secret-67890", &[super::SCOPE_READ]),
        ])
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ClientDirectory for ClientRegistry {
    fn lookup(&self, client_id: &str) -> Option<Client> {
        self.clients.get(client_id).cloned()
    }
}
