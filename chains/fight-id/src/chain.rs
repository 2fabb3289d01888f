//! On-chain side of the lottery and mint tasks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{NetworkError, ProxyConfig};
use ethers::prelude::*;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Signs and broadcasts a call, returning as soon as the node accepts it.
    async fn send_call(&self, to: Address, data: Bytes, gas_limit: Option<u64>) -> Result<H256>;

    /// Like [`send_call`](Self::send_call) but waits for inclusion and fails on revert.
    async fn send_and_confirm(&self, to: Address, data: Bytes) -> Result<H256>;
}

/// EVM gateway that picks its RPC endpoint on first use.
pub struct EvmGateway {
    wallet: LocalWallet,
    rpc_urls: Vec<String>,
    probe_timeout: Duration,
    http: Client,
    signer: OnceCell<Arc<SignerClient>>,
}

impl EvmGateway {
    pub fn new(
        wallet: LocalWallet,
        chain_id: u64,
        rpc_urls: Vec<String>,
        probe_timeout: Duration,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));
        if let Some(proxy_conf) = proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_conf.url)?;
            if let (Some(u), Some(p)) = (&proxy_conf.username, &proxy_conf.password) {
                proxy = proxy.basic_auth(u, p);
            }
            builder = builder.proxy(proxy);
        }
        let http = builder.build().context("Failed to build RPC client")?;

        Ok(Self {
            wallet: wallet.with_chain_id(chain_id),
            rpc_urls,
            probe_timeout,
            http,
            signer: OnceCell::new(),
        })
    }

    async fn signer(&self) -> Result<&Arc<SignerClient>> {
        self.signer
            .get_or_try_init(|| async {
                let provider = select_rpc(&self.rpc_urls, &self.http, self.probe_timeout).await?;
                anyhow::Ok(Arc::new(SignerMiddleware::new(provider, self.wallet.clone())))
            })
            .await
    }

    fn call_request(&self, to: Address, data: Bytes, gas_limit: Option<u64>) -> TransactionRequest {
        let mut tx = TransactionRequest::new()
            .from(self.wallet.address())
            .to(to)
            .data(data)
            .chain_id(self.wallet.chain_id());
        if let Some(gas) = gas_limit {
            tx = tx.gas(gas);
        }
        tx
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn send_call(&self, to: Address, data: Bytes, gas_limit: Option<u64>) -> Result<H256> {
        let client = self.signer().await?;
        let pending = client
            .send_transaction(self.call_request(to, data, gas_limit), None)
            .await
            .context("Failed to send transaction")?;
        let hash = pending.tx_hash();
        info!("🚀 Tx sent: {:?}", hash);
        Ok(hash)
    }

    async fn send_and_confirm(&self, to: Address, data: Bytes) -> Result<H256> {
        let client = self.signer().await?;
        let pending = client
            .send_transaction(self.call_request(to, data, None), None)
            .await
            .context("Failed to send transaction")?;
        let hash = pending.tx_hash();
        info!("⏳ Tx pending: {:?}", hash);

        let receipt = pending
            .await
            .context("Failed to get receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction {:?} dropped from mempool", hash))?;

        if receipt.status != Some(U64::from(1)) {
            anyhow::bail!("Transaction {:?} reverted", hash);
        }
        Ok(hash)
    }
}

/// First endpoint in list order that answers `eth_blockNumber` within `timeout`.
pub async fn select_rpc(
    urls: &[String],
    client: &Client,
    timeout: Duration,
) -> Result<Provider<Http>, NetworkError> {
    for url in urls {
        let parsed: url::Url = match url.parse() {
            Ok(u) => u,
            Err(_) => {
                warn!("Skipping malformed RPC URL {}", url);
                continue;
            }
        };
        let provider = Provider::new(Http::new_with_client(parsed, client.clone()));

        match tokio::time::timeout(timeout, provider.get_block_number()).await {
            Ok(Ok(block)) => {
                debug!("RPC {} healthy at block {}", url, block);
                return Ok(provider);
            }
            Ok(Err(e)) => debug!("Health check failed for {}: {}", url, e),
            Err(_) => debug!("Health check timed out for {}", url),
        }
    }

    Err(NetworkError::NoHealthyEndpoint {
        tried: urls.len(),
    })
}
