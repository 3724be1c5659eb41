// Tendermint light-client headers and trusted-field injection
use std::time::Duration;

use ibc_proto::google::protobuf::Duration as ProtoDuration;
use ibc_proto::ibc::lightclients::tendermint::v1::{ClientState, Fraction, Header};
use tendermint_proto::types::{SignedHeader, ValidatorSet};
use tracing::{debug, warn};

use super::packet::{parse_chain_id, Height};
use super::provider::ChainProvider;
use crate::cancel::Cancellation;
use crate::chains::{CosmosProvider, LightBlock};
use crate::error::RelayerError;
use crate::retry::RetryPolicy;

/// Upgrade path every new client is created with
pub const DEFAULT_UPGRADE_PATH: [&str; 2] = ["upgrade", "upgradedIBCState"];

const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(10 * 60);

/// A signed header and the validator set that signed it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TendermintHeader {
    pub signed_header: SignedHeader,
    pub validator_set: ValidatorSet,
}

impl TendermintHeader {
    pub fn height(&self) -> u64 {
        self.signed_header
            .header
            .as_ref()
            .map(|h| h.height.max(0) as u64)
            .unwrap_or(0)
    }
}

impl TryFrom<LightBlock> for TendermintHeader {
    type Error = RelayerError;

    fn try_from(block: LightBlock) -> Result<Self, Self::Error> {
        let signed_header = block
            .signed_header
            .ok_or_else(|| RelayerError::InvalidQueryResponse("light block without signed header".to_string()))?;
        let validator_set = block
            .validator_set
            .ok_or_else(|| RelayerError::InvalidQueryResponse("light block without validator set".to_string()))?;
        Ok(Self {
            signed_header,
            validator_set,
        })
    }
}

/// Client update header for `latest`, trusting `trusted_height` and the
/// validators recorded in `trusted`
pub fn msg_update_client_header(
    latest: &TendermintHeader,
    trusted_height: Height,
    trusted: &TendermintHeader,
) -> Header {
    Header {
        signed_header: Some(latest.signed_header.clone()),
        validator_set: Some(latest.validator_set.clone()),
        trusted_height: Some(trusted_height.into()),
        trusted_validators: Some(trusted.validator_set.clone()),
    }
}

/// Tendermint client state tracking `dst_chain_id` from `header` onward.
/// Proof specs are left empty for the host chain to default.
#[allow(deprecated)]
pub fn new_client_state(
    dst_chain_id: &str,
    header: &TendermintHeader,
    trusting_period: Duration,
    unbonding_period: Duration,
    allow_update_after_expiry: bool,
    allow_update_after_misbehaviour: bool,
) -> ClientState {
    let latest_height = Height::new(parse_chain_id(dst_chain_id), header.height());

    ClientState {
        chain_id: dst_chain_id.to_string(),
        trust_level: Some(Fraction {
            numerator: 1,
            denominator: 3,
        }),
        trusting_period: Some(to_proto_duration(trusting_period)),
        unbonding_period: Some(to_proto_duration(unbonding_period)),
        max_clock_drift: Some(to_proto_duration(MAX_CLOCK_DRIFT)),
        frozen_height: Some(Height::zero().into()),
        latest_height: Some(latest_height.into()),
        upgrade_path: DEFAULT_UPGRADE_PATH.iter().map(|s| s.to_string()).collect(),
        allow_update_after_expiry,
        allow_update_after_misbehaviour,
        ..ClientState::default()
    }
}

fn to_proto_duration(d: Duration) -> ProtoDuration {
    ProtoDuration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}

/// Fill in the trusted height and trusted validators of `header` so it can
/// update `dst_client_id` on `dst`.
///
/// The trusted height is the latest height of the destination's client; the
/// trusted validators are the source's validator set at that height + 1,
/// since header H commits to the next validators.
pub async fn inject_trusted_fields(
    src: &dyn ChainProvider,
    mut header: Header,
    dst: &dyn ChainProvider,
    dst_client_id: &str,
    policy: &RetryPolicy,
    cancel: &Cancellation,
) -> Result<Header, RelayerError> {
    let query_height = Height::from_proto(header.trusted_height.as_ref()).revision_height;
    let trusted_height = cancel
        .guard(dst.client_latest_height(query_height, dst_client_id))
        .await?;

    header.trusted_height = Some(trusted_height.into());

    let validators_height = trusted_height.revision_height + 1;
    let trusted = policy
        .retry("query trusted header", cancel, || src.query_ibc_header(validators_height))
        .await
        .map_err(|e| {
            warn!(
                chain_id = %src.chain_id(),
                height = trusted_height.revision_height,
                error = %e,
                "failed to get trusted header"
            );
            RelayerError::PrunedHeader {
                height: trusted_height.revision_height,
                source: Box::new(e),
            }
        })?;

    debug!(
        src_chain = %src.chain_id(),
        dst_chain = %dst.chain_id(),
        client_id = dst_client_id,
        trusted_height = %trusted_height,
        "injected trusted fields"
    );

    header.trusted_validators = Some(trusted.validator_set);
    Ok(header)
}

impl CosmosProvider {
    /// Signed header and validator set at `height`
    pub async fn query_ibc_header(&self, height: u64) -> Result<TendermintHeader, RelayerError> {
        if height == 0 {
            return Err(RelayerError::InvalidHeight("height cannot be 0".to_string()));
        }
        let block = self
            .rpc
            .light_block(height)
            .await
            .inspect_err(|_| self.record_rpc_error())?;
        TendermintHeader::try_from(block)
    }

    /// Validator set that signed the block at `height`
    pub async fn query_validator_set(&self, height: u64) -> Result<ValidatorSet, RelayerError> {
        Ok(self.query_ibc_header(height).await?.validator_set)
    }

    /// [`inject_trusted_fields`] with this provider as the header's source chain
    pub async fn inject_trusted_fields(
        &self,
        header: Header,
        dst: &dyn ChainProvider,
        dst_client_id: &str,
        cancel: &Cancellation,
    ) -> Result<Header, RelayerError> {
        inject_trusted_fields(self, header, dst, dst_client_id, &self.config.retry, cancel).await
    }

    pub fn msg_update_client_header(
        &self,
        latest: &TendermintHeader,
        trusted_height: Height,
        trusted: &TendermintHeader,
    ) -> Header {
        msg_update_client_header(latest, trusted_height, trusted)
    }

    pub fn new_client_state(
        &self,
        dst_chain_id: &str,
        header: &TendermintHeader,
        trusting_period: Duration,
        unbonding_period: Duration,
        allow_update_after_expiry: bool,
        allow_update_after_misbehaviour: bool,
    ) -> ClientState {
        new_client_state(
            dst_chain_id,
            header,
            trusting_period,
            unbonding_period,
            allow_update_after_expiry,
            allow_update_after_misbehaviour,
        )
    }
}
