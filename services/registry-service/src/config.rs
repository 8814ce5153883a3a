use anyhow::{Context, Result, bail};
use cr_api_types::ContractAddress;
use cr_chain_evm::{DEFAULT_REGISTRY_ADDRESS, DEFAULT_RPC_URL};
use std::net::SocketAddr;
use zeroize::Zeroizing;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Start-up settings, read once from the environment.
///
/// `REGISTRY_PRIVATE_KEY` stands in for the browser wallet: when it is unset
/// the service runs without a wallet and stays disconnected.
pub(crate) struct ServiceConfig {
    pub(crate) rpc_url: String,
    pub(crate) private_key: Option<Zeroizing<String>>,
    pub(crate) contract_address: ContractAddress,
    pub(crate) confirmations: u64,
    pub(crate) bind_addr: SocketAddr,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let rpc_url = value("REGISTRY_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_owned());
        let private_key = value("REGISTRY_PRIVATE_KEY").map(Zeroizing::new);

        let contract_address =
            value("REGISTRY_CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_REGISTRY_ADDRESS.to_owned());
        if !is_evm_address(&contract_address) {
            bail!("REGISTRY_CONTRACT_ADDRESS is not a 20-byte hex address: {contract_address}");
        }

        let confirmations = match value("REGISTRY_CONFIRMATIONS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("REGISTRY_CONFIRMATIONS must be a positive integer, got {raw}"))?,
            None => 1,
        };
        if confirmations == 0 {
            bail!("REGISTRY_CONFIRMATIONS must be at least 1");
        }

        let bind_addr = value("REGISTRY_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("REGISTRY_BIND_ADDR must be host:port")?;

        Ok(Self {
            rpc_url,
            private_key,
            contract_address: ContractAddress(contract_address),
            confirmations,
            bind_addr,
        })
    }
}

fn is_evm_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
