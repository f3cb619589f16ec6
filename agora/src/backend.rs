// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log, store and transport implementations a device runs on.
//!
//! Every device keeps one writer key per namespace. A namespace is the local name of a log on
//! this device: the user log lives in [`USER_NAMESPACE`], rooms use their id or, when joined
//! through an invite, a namespace derived from the invite code.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use agora_core::{EncryptionKey, Hash, PrivateKey, PublicKey};
use agora_pairing::{MemoryTransport, Transport};
use agora_store::{Batches, Log, LogError, MemoryLog, MemoryLogNetwork, MemoryStore, TableStore};
use tracing::debug;

/// Namespace of the user log on every device.
pub const USER_NAMESPACE: &str = "user";

/// Replica of a log together with the store its state gets materialized into.
pub struct OpenedLog<L, S> {
    pub log: L,
    pub batches: Batches,
    pub store: S,
}

pub trait Backend: Clone + Send + Sync + 'static {
    type Log: Log;

    type Store: TableStore;

    type Transport: Transport;

    fn transport(&self) -> &Self::Transport;

    /// Writer key of this device for the given namespace, stable for the lifetime of the backend.
    fn local_key(&self, namespace: &str) -> PublicKey;

    /// Create a log with the local key of `namespace` as bootstrap writer, or re-open it.
    fn create_log(
        &self,
        namespace: &str,
        encryption_key: EncryptionKey,
    ) -> impl Future<Output = Result<OpenedLog<Self::Log, Self::Store>, LogError>> + Send;

    /// Open a replica of an existing log.
    fn open_log(
        &self,
        namespace: &str,
        key: Hash,
        encryption_key: EncryptionKey,
    ) -> impl Future<Output = Result<OpenedLog<Self::Log, Self::Store>, LogError>> + Send;
}

/// Logs and transport shared by all devices living in one process.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    logs: MemoryLogNetwork,
    transport: MemoryTransport,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> &MemoryLogNetwork {
        &self.logs
    }

    pub fn transport(&self) -> &MemoryTransport {
        &self.transport
    }

    /// Backend of a new device on this network.
    pub fn device(&self) -> MemoryBackend {
        MemoryBackend {
            network: self.clone(),
            keys: Arc::default(),
        }
    }
}

/// Device on a [`MemoryNetwork`].
///
/// Every opened replica materializes into a fresh [`MemoryStore`], its state is rebuilt by
/// replaying the log from the start.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    network: MemoryNetwork,
    keys: Arc<Mutex<HashMap<String, PrivateKey>>>,
}

impl MemoryBackend {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Backend for MemoryBackend {
    type Log = MemoryLog;

    type Store = MemoryStore;

    type Transport = MemoryTransport;

    fn transport(&self) -> &Self::Transport {
        &self.network.transport
    }

    fn local_key(&self, namespace: &str) -> PublicKey {
        let mut keys = self.keys.lock().expect("acquire lock on device keys");
        keys.entry(namespace.to_string())
            .or_insert_with(|| {
                debug!(namespace, "generate local writer key");
                PrivateKey::new()
            })
            .public_key()
    }

    async fn create_log(
        &self,
        namespace: &str,
        encryption_key: EncryptionKey,
    ) -> Result<OpenedLog<Self::Log, Self::Store>, LogError> {
        let local_key = self.local_key(namespace);
        let (log, batches) = self.network.logs.create(local_key, encryption_key)?;
        Ok(OpenedLog {
            log,
            batches,
            store: MemoryStore::new(),
        })
    }

    async fn open_log(
        &self,
        namespace: &str,
        key: Hash,
        encryption_key: EncryptionKey,
    ) -> Result<OpenedLog<Self::Log, Self::Store>, LogError> {
        let local_key = self.local_key(namespace);
        let (log, batches) = self.network.logs.open(key, local_key, encryption_key)?;
        Ok(OpenedLog {
            log,
            batches,
            store: MemoryStore::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use agora_core::EncryptionKey;
    use agora_store::Log;

    use super::{Backend, MemoryNetwork, USER_NAMESPACE};

    #[tokio::test]
    async fn devices_have_separate_writer_keys() {
        let network = MemoryNetwork::new();
        let ant = network.device();
        let bat = network.device();

        assert_eq!(ant.local_key(USER_NAMESPACE), ant.local_key(USER_NAMESPACE));
        assert_ne!(ant.local_key(USER_NAMESPACE), ant.local_key("garden"));
        assert_ne!(ant.local_key(USER_NAMESPACE), bat.local_key(USER_NAMESPACE));

        // Scenario: bat opens the log ant created, but is not a writer of it.
        let encryption_key = EncryptionKey::random();
        let created = ant.create_log("garden", encryption_key).await.unwrap();
        assert!(created.log.is_writable());

        let opened = bat
            .open_log("garden", created.log.key(), encryption_key)
            .await
            .unwrap();
        assert_eq!(opened.log.key(), created.log.key());
        assert_eq!(opened.log.local_key(), bat.local_key("garden"));
        assert!(!opened.log.is_writable());

        assert!(
            bat.open_log("garden", created.log.key(), EncryptionKey::random())
                .await
                .is_err()
        );
    }
}
