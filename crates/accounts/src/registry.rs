use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::{debug, info};

use crate::{
    Error, Result,
    account::{BridgeAccount, RemoteId},
    protocol::ProtocolDescriptor,
};

/// Builds accounts for one backend family.
pub trait AccountFactory: Send + Sync {
    fn protocol(&self) -> Arc<ProtocolDescriptor>;

    fn create(&self, username: &str) -> Result<Arc<dyn BridgeAccount>>;
}

/// Shared account map keyed by [`RemoteId`].
pub type AccountMap = Arc<RwLock<HashMap<RemoteId, Arc<dyn BridgeAccount>>>>;

/// Entry point the bridge uses to reach accounts regardless of backend.
///
/// Accounts are created lazily on first reference to a (username, protocol)
/// pair and live until [`AccountRegistry::remove_account`].
#[derive(Default)]
pub struct AccountRegistry {
    factories: HashMap<String, Arc<dyn AccountFactory>>,
    accounts: AccountMap,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend family. A later registration for the same protocol
    /// id replaces the earlier factory.
    pub fn with_backend(mut self, factory: Arc<dyn AccountFactory>) -> Self {
        let protocol = factory.protocol();
        info!(protocol = protocol.id(), "registered account backend");
        self.factories.insert(protocol.id().to_string(), factory);
        self
    }

    pub fn protocols(&self) -> Vec<Arc<ProtocolDescriptor>> {
        let mut protocols: Vec<_> = self.factories.values().map(|f| f.protocol()).collect();
        protocols.sort_by(|a, b| a.id().cmp(b.id()));
        protocols
    }

    pub fn protocol(&self, id: &str) -> Option<Arc<ProtocolDescriptor>> {
        self.factories.get(id).map(|f| f.protocol())
    }

    /// Return the account for `(username, protocol_id)`, creating it on
    /// first use.
    pub fn account(&self, username: &str, protocol_id: &str) -> Result<Arc<dyn BridgeAccount>> {
        let remote_id = RemoteId::derive(username, protocol_id);
        {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            if let Some(account) = accounts.get(&remote_id) {
                return Ok(Arc::clone(account));
            }
        }

        let factory = self
            .factories
            .get(protocol_id)
            .ok_or_else(|| Error::UnknownProtocol {
                protocol_id: protocol_id.into(),
            })?;

        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        // Another caller may have created it between the two locks.
        if let Some(account) = accounts.get(&remote_id) {
            return Ok(Arc::clone(account));
        }
        let account = factory.create(username)?;
        debug!(remote_id = %remote_id, "created account");
        accounts.insert(remote_id, Arc::clone(&account));
        Ok(account)
    }

    pub fn get(&self, remote_id: &RemoteId) -> Option<Arc<dyn BridgeAccount>> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(remote_id).cloned()
    }

    pub fn remove_account(&self, remote_id: &RemoteId) -> Option<Arc<dyn BridgeAccount>> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.remove(remote_id)
    }

    pub fn remote_ids(&self) -> Vec<RemoteId> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use {
        super::*,
        crate::{
            account::{Buddy, JoinOption, JoinProperties, UserInfo},
            correlation::Pending,
            events::ChatJoined,
            message::BasicMessage,
            protocol::Capability,
        },
    };

    struct StubAccount {
        remote_id: RemoteId,
        protocol: Arc<ProtocolDescriptor>,
    }

    #[async_trait]
    impl BridgeAccount for StubAccount {
        fn remote_id(&self) -> &RemoteId {
            &self.remote_id
        }

        fn protocol(&self) -> &Arc<ProtocolDescriptor> {
            &self.protocol
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn find_account(&self) -> Result<()> {
            Ok(())
        }

        fn create_account(&self, _password: Option<&str>) -> Result<()> {
            Err(Error::not_supported("stub", "create_account"))
        }

        fn set_enabled(&self, _enabled: bool) -> Result<()> {
            Err(Error::not_supported("stub", "set_enabled"))
        }

        async fn send_direct_message(&self, _: &str, _: &BasicMessage) -> Result<()> {
            Ok(())
        }

        async fn send_room_message(&self, _: &str, _: &BasicMessage) -> Result<()> {
            Ok(())
        }

        async fn join_room(
            &self,
            _: JoinProperties,
            _: Duration,
            _: bool,
        ) -> Result<Pending<ChatJoined>> {
            Err(Error::not_supported("stub", "join_room"))
        }

        async fn leave_room(&self, _: &JoinProperties) -> Result<()> {
            Ok(())
        }

        fn is_in_room(&self, _: &str) -> bool {
            false
        }

        fn buddy(&self, _: &str) -> Result<Option<Buddy>> {
            Ok(None)
        }

        fn join_property(&self, _: &str, _: &str) -> Option<String> {
            None
        }

        fn set_join_properties(&self, _: &str, _: JoinProperties) {}

        async fn lookup_user_info(&self, _: &str) -> Result<Pending<UserInfo>> {
            Err(Error::not_supported("stub", "lookup_user_info"))
        }

        async fn fetch_avatar(&self, _: &str, _: &str) -> Result<Pending<Vec<u8>>> {
            Err(Error::not_supported("stub", "fetch_avatar"))
        }

        fn join_options(&self) -> Result<Vec<JoinOption>> {
            Ok(Vec::new())
        }
    }

    struct StubFactory {
        protocol: Arc<ProtocolDescriptor>,
        created: AtomicUsize,
    }

    impl AccountFactory for StubFactory {
        fn protocol(&self) -> Arc<ProtocolDescriptor> {
            Arc::clone(&self.protocol)
        }

        fn create(&self, username: &str) -> Result<Arc<dyn BridgeAccount>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubAccount {
                remote_id: RemoteId::derive(username, self.protocol.id()),
                protocol: Arc::clone(&self.protocol),
            }))
        }
    }

    fn factory(id: &str) -> Arc<StubFactory> {
        Arc::new(StubFactory {
            protocol: Arc::new(ProtocolDescriptor::new(id, id, [Capability::DirectMessages])),
            created: AtomicUsize::new(0),
        })
    }

    #[test]
    fn creates_account_once_per_pair() {
        let stub = factory("prpl-stub");
        let registry = AccountRegistry::new().with_backend(stub.clone());
        let a = registry.account("alice", "prpl-stub").unwrap();
        let b = registry.account("alice", "prpl-stub").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(stub.created.load(Ordering::SeqCst), 1);
        registry.account("bob", "prpl-stub").unwrap();
        assert_eq!(registry.remote_ids().len(), 2);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let registry = AccountRegistry::new();
        let err = registry.account("alice", "prpl-nope").err().unwrap();
        assert!(matches!(err, Error::UnknownProtocol { .. }));
    }

    #[test]
    fn lists_protocols_sorted() {
        let registry = AccountRegistry::new()
            .with_backend(factory("xmpp-js"))
            .with_backend(factory("prpl-irc"));
        let ids: Vec<_> = registry
            .protocols()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, ["prpl-irc", "xmpp-js"]);
        assert!(registry.protocol("xmpp-js").is_some());
        assert!(registry.protocol("prpl-nope").is_none());
    }

    #[test]
    fn removed_account_is_recreated_on_next_reference() {
        let stub = factory("prpl-stub");
        let registry = AccountRegistry::new().with_backend(stub.clone());
        let account = registry.account("alice", "prpl-stub").unwrap();
        let removed = registry.remove_account(account.remote_id()).unwrap();
        assert!(Arc::ptr_eq(&account, &removed));
        assert!(registry.get(account.remote_id()).is_none());
        registry.account("alice", "prpl-stub").unwrap();
        assert_eq!(stub.created.load(Ordering::SeqCst), 2);
    }
}
