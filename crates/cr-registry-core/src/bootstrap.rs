use cr_api_types::{ConnectionState, ContractAddress, WalletAddress};
use cr_chain_client::{RegistryContract, WalletProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info};

use crate::RegistryError;

/// Runs once; later account or network changes are not picked up.
pub struct Bootstrapper {
    contract_address: ContractAddress,
    started: AtomicBool,
    state: RwLock<ConnectionState>,
    registry: OnceCell<Arc<dyn RegistryContract>>,
}

impl Bootstrapper {
    pub fn new(contract_address: ContractAddress) -> Self {
        Self {
            contract_address,
            started: AtomicBool::new(false),
            state: RwLock::new(ConnectionState::Disconnected),
            registry: OnceCell::new(),
        }
    }

    pub fn contract_address(&self) -> &ContractAddress {
        &self.contract_address
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn registry(&self) -> Option<Arc<dyn RegistryContract>> {
        self.registry.get().cloned()
    }

    pub fn signer_address(&self) -> Option<WalletAddress> {
        self.registry.get().map(|registry| registry.signer_address().clone())
    }

    pub async fn bootstrap(
        &self,
        wallet: Option<&dyn WalletProvider>,
    ) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.registry().ok_or(RegistryError::NotConnected);
        }

        let Some(wallet) = wallet else {
            error!("Ethereum object not found");
            return Err(RegistryError::ProviderUnavailable);
        };

        self.set_state(ConnectionState::Connecting).await;

        match self.connect(wallet).await {
            Ok(registry) => {
                // `started` guarantees this is the only writer.
                let _ = self.registry.set(registry.clone());
                self.set_state(ConnectionState::Ready).await;
                info!(
                    "registry {} ready for signer {}",
                    self.contract_address,
                    registry.signer_address()
                );
                Ok(registry)
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected).await;
                error!("wallet bootstrap failed: {}", err);
                Err(err)
            }
        }
    }

    async fn connect(&self, wallet: &dyn WalletProvider) -> Result<Arc<dyn RegistryContract>, RegistryError> {
        let accounts = wallet
            .request_accounts()
            .await
            .map_err(|err| RegistryError::ConnectionFailed(format!("{err:#}")))?;

        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::ConnectionFailed("wallet returned no accounts".to_owned()))?;

        wallet
            .bind_registry(&account, &self.contract_address)
            .await
            .map_err(|err| RegistryError::ConnectionFailed(format!("{err:#}")))
    }

    async fn set_state(&self, next: ConnectionState) {
        *self.state.write().await = next;
    }
}
