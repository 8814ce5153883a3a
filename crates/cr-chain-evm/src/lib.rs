use alloy::{
    network::{EthereumWallet, ReceiptResponse},
    primitives::{Address, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use cr_api_types::{ContractAddress, TxHash, WalletAddress};
use cr_chain_client::{
    RegistryContract, StudentRecord, SubmittedTx, TxReceiptResult, WalletProvider,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Address of the deployed class registry.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "0x2F884f98f7CF70e66F1eae7E50Ae4ce5a8C951aa";
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

sol! {
    #[sol(rpc)]
    contract StudentRegistry {
        struct Student {
            uint256 id;
            string name;
        }

        function getAllStudents() external view returns (Student[] memory);
        function registerStudent(uint256 _id, string memory _name) external;
        function removeStudent(uint256 _id) external;
    }
}

/// Local-key wallet talking to an EVM node over HTTP JSON-RPC.
pub struct EvmWallet {
    rpc_url: String,
    signer: PrivateKeySigner,
}

impl EvmWallet {
    pub fn new(rpc_url: Option<String>, signer: PrivateKeySigner) -> Self {
        let rpc_url = rpc_url.unwrap_or_else(|| DEFAULT_RPC_URL.to_owned());
        Self {
            rpc_url: rpc_url.trim_end_matches('/').to_owned(),
            signer,
        }
    }

    pub fn from_private_key(rpc_url: Option<String>, private_key: &str) -> Result<Self> {
        let signer = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<PrivateKeySigner>()
            .context("invalid wallet private key")?;
        Ok(Self::new(rpc_url, signer))
    }

    pub fn address(&self) -> WalletAddress {
        WalletAddress(self.signer.address().to_string())
    }
}

#[async_trait]
impl WalletProvider for EvmWallet {
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>> {
        Ok(vec![self.address()])
    }

    async fn bind_registry(
        &self,
        account: &WalletAddress,
        address: &ContractAddress,
    ) -> Result<Arc<dyn RegistryContract>> {
        if *account != self.address() {
            bail!("account {account} is not managed by this wallet");
        }

        let contract_address: Address = address
            .0
            .parse()
            .with_context(|| format!("invalid registry address {address}"))?;
        let url = self
            .rpc_url
            .parse()
            .with_context(|| format!("invalid RPC url {}", self.rpc_url))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(url)
            .erased();

        debug!("bound registry {} for signer {} via {}", address, account, self.rpc_url);

        let registry: Arc<dyn RegistryContract> = Arc::new(EvmRegistry {
            address: address.clone(),
            signer: account.clone(),
            contract: StudentRegistry::new(contract_address, provider),
        });
        Ok(registry)
    }
}

pub struct EvmRegistry {
    address: ContractAddress,
    signer: WalletAddress,
    contract: StudentRegistry::StudentRegistryInstance<DynProvider>,
}

impl EvmRegistry {
    fn submitted(pending: PendingTransactionBuilder<alloy::network::Ethereum>) -> SubmittedTx {
        let tx_hash = TxHash(pending.tx_hash().to_string());
        info!("submitted registry transaction {}", tx_hash);
        SubmittedTx { tx_hash }
    }
}

#[async_trait]
impl RegistryContract for EvmRegistry {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    fn signer_address(&self) -> &WalletAddress {
        &self.signer
    }

    async fn get_all_students(&self) -> Result<Vec<StudentRecord>> {
        let students = self
            .contract
            .getAllStudents()
            .call()
            .await
            .context("getAllStudents call")?;

        Ok(students
            .into_iter()
            .map(|student| StudentRecord {
                id: student.id.to_string(),
                name: student.name,
            })
            .collect())
    }

    async fn register_student(&self, id: u64, name: &str) -> Result<SubmittedTx> {
        // Gas estimation runs the call first, so reverts surface here with their reason.
        let pending = self
            .contract
            .registerStudent(U256::from(id), name.to_owned())
            .send()
            .await?;
        Ok(Self::submitted(pending))
    }

    async fn remove_student(&self, id: u64) -> Result<SubmittedTx> {
        let pending = self.contract.removeStudent(U256::from(id)).send().await?;
        Ok(Self::submitted(pending))
    }

    async fn wait_for_confirmation(&self, tx: &SubmittedTx, confirmations: u64) -> Result<TxReceiptResult> {
        let hash = tx
            .tx_hash
            .0
            .parse()
            .with_context(|| format!("invalid transaction hash {}", tx.tx_hash))?;

        let receipt = PendingTransactionBuilder::new(self.contract.provider().root().clone(), hash)
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .with_context(|| format!("waiting for transaction {}", tx.tx_hash))?;

        Ok(TxReceiptResult {
            tx_hash: tx.tx_hash.clone(),
            block_number: receipt.block_number,
            success: receipt.status(),
        })
    }
}
