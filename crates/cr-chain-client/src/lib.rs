use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use cr_api_types::{ContractAddress, TxHash, WalletAddress};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// A student entry exactly as the contract returns it.
///
/// `id` carries the decimal rendering of the on-chain `uint256`; turning it
/// into a plain integer is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptResult {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// A registry contract bound to a signer.
#[async_trait]
pub trait RegistryContract: Send + Sync {
    fn address(&self) -> &ContractAddress;
    fn signer_address(&self) -> &WalletAddress;
    async fn get_all_students(&self) -> Result<Vec<StudentRecord>>;
    async fn register_student(&self, id: u64, name: &str) -> Result<SubmittedTx>;
    async fn remove_student(&self, id: u64) -> Result<SubmittedTx>;
    /// Resolves once `tx` has `confirmations` confirmations. There is no local
    /// timeout; the wait is bounded by the node only.
    async fn wait_for_confirmation(&self, tx: &SubmittedTx, confirmations: u64) -> Result<TxReceiptResult>;
}

/// The wallet the operator brings: account access plus signing.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Asks for account access. The first account is the one the operator approved.
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>>;
    async fn bind_registry(
        &self,
        account: &WalletAddress,
        address: &ContractAddress,
    ) -> Result<Arc<dyn RegistryContract>>;
}

enum PendingOp {
    Register { id: u64, name: String },
    Remove { id: u64 },
}

/// In-process stand-in for a deployed registry, with the same revert rules
/// (duplicate ids on register, unknown ids on remove). Submitted transactions
/// are only applied when someone waits for their confirmation.
pub struct InMemoryRegistry {
    address: ContractAddress,
    signer: WalletAddress,
    students: RwLock<Vec<(u64, String)>>,
    pending: RwLock<HashMap<TxHash, PendingOp>>,
    next_tx: AtomicU64,
    block_number: AtomicU64,
    read_calls: AtomicUsize,
    fail_reads: AtomicBool,
    reject_signing: AtomicBool,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(
            ContractAddress("0x0000000000000000000000000000000000001234".to_owned()),
            WalletAddress("0x00000000000000000000000000000000000000aa".to_owned()),
        )
    }
}

impl InMemoryRegistry {
    pub fn new(address: ContractAddress, signer: WalletAddress) -> Self {
        Self {
            address,
            signer,
            students: RwLock::new(Vec::new()),
            pending: RwLock::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            block_number: AtomicU64::new(0),
            read_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            reject_signing: AtomicBool::new(false),
        }
    }

    /// Seeds a record directly, as if registered by another client.
    pub async fn insert(&self, id: u64, name: &str) {
        self.students.write().await.push((id, name.to_owned()));
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_signing(&self, reject: bool) {
        self.reject_signing.store(reject, Ordering::SeqCst);
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    fn check(students: &[(u64, String)], op: &PendingOp) -> Result<()> {
        match op {
            PendingOp::Register { id, .. } if students.iter().any(|(existing, _)| existing == id) => {
                bail!("execution reverted: Student ID already exists")
            }
            PendingOp::Remove { id } if !students.iter().any(|(existing, _)| existing == id) => {
                bail!("execution reverted: Student does not exist")
            }
            _ => Ok(()),
        }
    }

    async fn submit(&self, op: PendingOp) -> Result<SubmittedTx> {
        if self.reject_signing.load(Ordering::SeqCst) {
            bail!("user rejected the request");
        }
        Self::check(&self.students.read().await, &op)?;

        let tx_hash = TxHash(format!("0x{:064x}", self.next_tx.fetch_add(1, Ordering::SeqCst)));
        self.pending.write().await.insert(tx_hash.clone(), op);
        Ok(SubmittedTx { tx_hash })
    }
}

#[async_trait]
impl RegistryContract for InMemoryRegistry {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    fn signer_address(&self) -> &WalletAddress {
        &self.signer
    }

    async fn get_all_students(&self) -> Result<Vec<StudentRecord>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("connection refused");
        }

        let students = self.students.read().await;
        Ok(students
            .iter()
            .map(|(id, name)| StudentRecord {
                id: id.to_string(),
                name: name.clone(),
            })
            .collect())
    }

    async fn register_student(&self, id: u64, name: &str) -> Result<SubmittedTx> {
        self.submit(PendingOp::Register {
            id,
            name: name.to_owned(),
        })
        .await
    }

    async fn remove_student(&self, id: u64) -> Result<SubmittedTx> {
        self.submit(PendingOp::Remove { id }).await
    }

    async fn wait_for_confirmation(&self, tx: &SubmittedTx, _confirmations: u64) -> Result<TxReceiptResult> {
        let op = self
            .pending
            .write()
            .await
            .remove(&tx.tx_hash)
            .ok_or_else(|| anyhow!("unknown transaction {}", tx.tx_hash))?;

        let block_number = self.block_number.fetch_add(1, Ordering::SeqCst) + 1;

        // Another transaction may have landed first.
        let mut students = self.students.write().await;
        if Self::check(&students, &op).is_err() {
            return Ok(TxReceiptResult {
                tx_hash: tx.tx_hash.clone(),
                block_number: Some(block_number),
                success: false,
            });
        }

        match op {
            PendingOp::Register { id, name } => students.push((id, name)),
            PendingOp::Remove { id } => students.retain(|(existing, _)| *existing != id),
        }

        Ok(TxReceiptResult {
            tx_hash: tx.tx_hash.clone(),
            block_number: Some(block_number),
            success: true,
        })
    }
}

/// Wallet double that hands out a shared [`InMemoryRegistry`].
pub struct InMemoryWallet {
    accounts: Vec<WalletAddress>,
    registry: Arc<InMemoryRegistry>,
}

impl InMemoryWallet {
    pub fn new(registry: Arc<InMemoryRegistry>) -> Self {
        let accounts = vec![registry.signer_address().clone()];
        Self { accounts, registry }
    }

    /// A wallet whose operator declines the account request.
    pub fn locked(registry: Arc<InMemoryRegistry>) -> Self {
        Self {
            accounts: Vec::new(),
            registry,
        }
    }
}

#[async_trait]
impl WalletProvider for InMemoryWallet {
    async fn request_accounts(&self) -> Result<Vec<WalletAddress>> {
        if self.accounts.is_empty() {
            bail!("user rejected the account request");
        }
        Ok(self.accounts.clone())
    }

    async fn bind_registry(
        &self,
        account: &WalletAddress,
        address: &ContractAddress,
    ) -> Result<Arc<dyn RegistryContract>> {
        if !self.accounts.contains(account) {
            bail!("account {account} is not managed by this wallet");
        }
        if address != self.registry.address() {
            bail!("no registry deployed at {address}");
        }
        let registry: Arc<dyn RegistryContract> = self.registry.clone();
        Ok(registry)
    }
}
