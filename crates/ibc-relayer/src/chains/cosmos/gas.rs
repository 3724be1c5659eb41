// Gas estimation through tx simulation
use cosmos_sdk_proto::cosmos::tx::v1beta1::{SimulateRequest, SimulateResponse};
use prost::Message;
use prost_types::Any;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::RelayerError;

use super::tx::TxFactory;
use super::CosmosProvider;

const SIMULATE_PATH: &str = "/cosmos.tx.v1beta1.Service/Simulate";

/// Scale simulated gas by `adjustment`, bounded by `max_gas` when non-zero.
/// Zero gas used stays zero.
pub fn adjust_estimated_gas(gas_used: u64, adjustment: f64, max_gas: u64) -> Result<u64, RelayerError> {
    if gas_used == 0 {
        return Ok(0);
    }
    let mut gas = adjustment * gas_used as f64;
    if gas.is_infinite() && gas > 0.0 {
        return Err(RelayerError::InfiniteGas {
            gas_used,
            adjustment,
        });
    }
    if max_gas > 0 {
        gas = gas.min(max_gas as f64);
    }
    Ok(gas as u64)
}

impl CosmosProvider {
    pub fn adjust_estimated_gas(&self, gas_used: u64) -> Result<u64, RelayerError> {
        adjust_estimated_gas(
            gas_used,
            self.config.gas_adjustment,
            self.config.max_gas_amount,
        )
    }

    /// Simulate `msgs` under `txf` and return the response plus the adjusted gas
    pub async fn calculate_gas(
        &self,
        txf: &TxFactory,
        msgs: &[Any],
        cancel: &Cancellation,
    ) -> Result<(SimulateResponse, u64), RelayerError> {
        let policy = self.config.retry;

        let tx_bytes = policy
            .retry("build simulation tx", cancel, || async {
                self.build_sim_tx(txf, msgs)
            })
            .await?;

        let request = SimulateRequest {
            tx_bytes,
            ..Default::default()
        }
        .encode_to_vec();

        let res = policy
            .retry("simulate tx", cancel, || {
                self.query_abci(SIMULATE_PATH, request.clone(), 0, false)
            })
            .await?;

        let sim = SimulateResponse::decode(res.value.as_slice())?;
        let gas_used = sim.gas_info.as_ref().map(|g| g.gas_used).unwrap_or(0);
        let gas = self.adjust_estimated_gas(gas_used)?;

        debug!(
            chain_id = %self.config.chain_id,
            gas_used,
            adjusted = gas,
            "simulated transaction"
        );
        Ok((sim, gas))
    }
}
