use crate::utils::rpc_manager::ChainRpc;
use crate::utils::tx_sender::PreparedCall;
use core_logic::{FallbackGasLimits, GasConfig};
use ethers::types::{Address, Bytes, U256};
use tracing::debug;

/// Fills in gas limit and EIP-1559 fees for a call.
#[derive(Clone, Debug, Default)]
pub struct GasManager {
    config: GasConfig,
}

impl GasManager {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    pub fn limits(&self) -> &FallbackGasLimits {
        &self.config.limits
    }

    pub fn fees(&self) -> (U256, U256) {
        let max_fee = U256::from(self.config.max_fee_wei());
        let priority = U256::from(self.config.priority_fee_wei()).min(max_fee);
        (max_fee, priority)
    }

    /// Buffered `eth_estimateGas`, or `fallback` when estimation fails.
    pub async fn prepare(
        &self,
        rpc: &dyn ChainRpc,
        from: Address,
        to: Address,
        data: Bytes,
        fallback: u64,
    ) -> PreparedCall {
        let gas_limit = match rpc.estimate_gas(from, to, data.clone()).await {
            Ok(estimate) if estimate <= U256::from(u64::MAX) => {
                U256::from(self.config.buffered_limit(estimate.as_u64()))
            }
            Ok(estimate) => {
                debug!("Gas estimate {} out of range, using fallback {}", estimate, fallback);
                U256::from(fallback)
            }
            Err(e) => {
                debug!("Gas estimation failed, using fallback {}: {}", fallback, e);
                U256::from(fallback)
            }
        };

        let (max_fee_per_gas, max_priority_fee_per_gas) = self.fees();
        PreparedCall {
            to,
            data,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }
}
