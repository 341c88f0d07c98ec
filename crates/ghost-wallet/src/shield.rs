//! Shield pipeline: move funds from the public account into the shielded
//! pool.
//!
//! One [`ShieldPipeline`] per request:
//!
//! ```text
//! Drafted -> ApprovalCheck -> [ApprovalRequired -> Approving -> Approved]
//!         -> Estimating -> Submitting -> Confirmed | Failed
//! ```
//!
//! Native assets skip the approval branch. For ERC-20 tokens the shield
//! contract's allowance is re-read at confirm time, and a short allowance
//! stops the pipeline in `ApprovalRequired` before anything is signed.
//! Approvals and submissions are sent exactly once per call and never
//! retried.

use std::fmt;

use chrono::{DateTime, Utc};
use ghost_core::constants::{
    EVM_GAS_TYPE_ACCESS_LIST, EVM_GAS_TYPE_LEGACY, EVM_GAS_TYPE_PRIORITY_FEE,
};
use ghost_core::traits::{ChainAccount, KeyValueStore, PrivacyEngine};
use ghost_core::types::{AssetRef, FeeData, GasDetails, ShieldPlan, TxRef, UnsignedTransaction};
use ghost_core::{Amount, AmountError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::{WalletController, chain_error, engine_error};
use crate::error::WalletError;
use crate::retry::with_retry;
use crate::session::WalletIdentity;

/// What the user asked to shield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldRequest {
    pub asset: AssetRef,
    /// Human decimal amount, e.g. `"0.25"`.
    pub amount: String,
    pub decimals: u8,
}

impl ShieldRequest {
    pub fn native(amount: impl Into<String>, decimals: u8) -> Self {
        Self {
            asset: AssetRef::Native,
            amount: amount.into(),
            decimals,
        }
    }

    pub fn erc20(token: impl Into<String>, amount: impl Into<String>, decimals: u8) -> Self {
        Self {
            asset: AssetRef::Erc20(token.into()),
            amount: amount.into(),
            decimals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShieldStage {
    Drafted,
    ApprovalCheck,
    ApprovalRequired,
    Approving,
    Approved,
    Estimating,
    Submitting,
    Confirmed,
    Failed,
}

impl ShieldStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for ShieldStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Proof of an `approve` sent for one token, one exact amount, until a
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub token: String,
    pub spender: String,
    /// Base units.
    pub amount: Amount,
    pub tx_ref: TxRef,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalTicket {
    /// Whether this ticket was issued for exactly `amount` of `token` and
    /// is still valid at `now`.
    pub fn covers(&self, token: &str, amount: &Amount, now: DateTime<Utc>) -> bool {
        self.token.eq_ignore_ascii_case(token) && &self.amount == amount && now < self.expires_at
    }
}

/// Result of a submitted shield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldReceipt {
    pub tx_ref: TxRef,
    pub gas: GasDetails,
    pub plan: ShieldPlan,
}

/// Fee fields for the network's EVM gas type.
///
/// Types 0 and 1 price with a single gas price, type 2 with max and
/// priority fees. Any other type, or fee data missing the needed fields,
/// is [`WalletError::UnsupportedGasModel`].
pub fn select_gas_details(
    evm_gas_type: u8,
    fee: &FeeData,
    gas_limit: Amount,
) -> Result<GasDetails, WalletError> {
    match evm_gas_type {
        EVM_GAS_TYPE_LEGACY | EVM_GAS_TYPE_ACCESS_LIST => {
            let gas_price = fee.gas_price.clone().ok_or_else(|| {
                WalletError::UnsupportedGasModel(format!(
                    "gas type {evm_gas_type} needs a gas price"
                ))
            })?;
            Ok(GasDetails::Legacy {
                gas_type: evm_gas_type,
                gas_limit,
                gas_price,
            })
        }
        EVM_GAS_TYPE_PRIORITY_FEE => match (&fee.max_fee_per_gas, &fee.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => Ok(GasDetails::PriorityFee {
                gas_limit,
                max_fee_per_gas: max_fee.clone(),
                max_priority_fee_per_gas: priority.clone(),
            }),
            _ => Err(WalletError::UnsupportedGasModel(
                "gas type 2 needs max and priority fees".into(),
            )),
        },
        other => Err(WalletError::UnsupportedGasModel(format!(
            "unknown gas type {other}"
        ))),
    }
}

fn parse_positive(amount: &str, decimals: u8) -> Result<Amount, WalletError> {
    let amount = Amount::parse_units(amount, decimals)?;
    if amount.is_zero() {
        return Err(AmountError::Zero.into());
    }
    Ok(amount)
}

impl<E, C, S> WalletController<E, C, S>
where
    E: PrivacyEngine + 'static,
    C: ChainAccount + 'static,
    S: KeyValueStore + 'static,
{
    /// Start a shield of `request` from the active wallet.
    pub fn draft_shield(
        &self,
        request: ShieldRequest,
    ) -> Result<ShieldPipeline<'_, E, C, S>, WalletError> {
        let wallet = self.active_identity()?;
        let amount = parse_positive(&request.amount, request.decimals)?;
        Ok(ShieldPipeline {
            controller: self,
            wallet,
            asset: request.asset,
            decimals: request.decimals,
            amount,
            stage: ShieldStage::Drafted,
            ticket: None,
        })
    }
}

/// One shield request in flight.
pub struct ShieldPipeline<'a, E, C, S> {
    controller: &'a WalletController<E, C, S>,
    wallet: WalletIdentity,
    asset: AssetRef,
    decimals: u8,
    amount: Amount,
    stage: ShieldStage,
    ticket: Option<ApprovalTicket>,
}

impl<E, C, S> fmt::Debug for ShieldPipeline<'_, E, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShieldPipeline")
            .field("wallet_id", &self.wallet.private_id)
            .field("asset", &self.asset)
            .field("amount", &self.amount)
            .field("stage", &self.stage)
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl<'a, E, C, S> ShieldPipeline<'a, E, C, S>
where
    E: PrivacyEngine + 'static,
    C: ChainAccount + 'static,
    S: KeyValueStore + 'static,
{
    pub fn stage(&self) -> ShieldStage {
        self.stage
    }

    /// Requested amount in base units.
    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    pub fn ticket(&self) -> Option<&ApprovalTicket> {
        self.ticket.as_ref()
    }

    fn expect_stage(&self, allowed: &[ShieldStage], action: &str) -> Result<(), WalletError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(WalletError::InvalidState(format!(
                "cannot {action} in stage {}",
                self.stage
            )))
        }
    }

    /// The wallet the pipeline was drafted for must still be active.
    fn ensure_same_wallet(&self) -> Result<(), WalletError> {
        let active = self.controller.active_identity()?;
        if active.private_id != self.wallet.private_id {
            return Err(WalletError::InvalidState(
                "active wallet changed since the shield was drafted".into(),
            ));
        }
        Ok(())
    }

    /// Replace the amount. The pipeline returns to `Drafted` and any
    /// approval ticket is discarded.
    pub fn set_amount(&mut self, amount: &str) -> Result<(), WalletError> {
        use ShieldStage::*;
        self.expect_stage(&[Drafted, ApprovalCheck, ApprovalRequired, Approved], "change amount")?;
        self.amount = parse_positive(amount, self.decimals)?;
        self.stage = Drafted;
        self.ticket = None;
        Ok(())
    }

    /// Compare the current allowance with the amount.
    ///
    /// Native assets go straight to `Approved`.
    pub async fn check_approval(&mut self) -> Result<ShieldStage, WalletError> {
        use ShieldStage::*;
        self.expect_stage(&[Drafted, ApprovalRequired, Approved], "check approval")?;
        self.ensure_same_wallet()?;
        self.stage = ApprovalCheck;

        let AssetRef::Erc20(token) = &self.asset else {
            self.stage = Approved;
            return Ok(self.stage);
        };
        match self
            .controller
            .read_allowance(token, &self.wallet.public_address)
            .await
        {
            Ok(allowance) => {
                self.stage = if allowance < self.amount {
                    ApprovalRequired
                } else {
                    Approved
                };
                Ok(self.stage)
            }
            Err(e) => {
                self.stage = Drafted;
                Err(e)
            }
        }
    }

    /// Approve the shield contract to spend exactly the requested amount.
    ///
    /// Only valid in `ApprovalRequired`. A failed approval returns the
    /// pipeline to `ApprovalRequired`.
    pub async fn approve(&mut self) -> Result<ApprovalTicket, WalletError> {
        self.expect_stage(&[ShieldStage::ApprovalRequired], "approve")?;
        self.ensure_same_wallet()?;
        let AssetRef::Erc20(token) = self.asset.clone() else {
            return Err(WalletError::InvalidState(
                "native assets need no approval".into(),
            ));
        };
        let ttl = chrono::Duration::from_std(self.controller.config().approval_ttl)
            .map_err(|e| WalletError::InvalidConfig(format!("approval_ttl: {e}")))?;
        let spender = self.controller.config().network.shield_contract.clone();

        self.stage = ShieldStage::Approving;
        let sent = self
            .controller
            .chain()
            .approve(&self.wallet.seed, &token, &spender, &self.amount)
            .await;
        match sent {
            Ok(tx_ref) => {
                info!(token = %token, amount = %self.amount, tx = %tx_ref, "approval sent");
                let ticket = ApprovalTicket {
                    token,
                    spender,
                    amount: self.amount.clone(),
                    tx_ref,
                    expires_at: Utc::now() + ttl,
                };
                self.ticket = Some(ticket.clone());
                self.stage = ShieldStage::Approved;
                Ok(ticket)
            }
            Err(e) => {
                warn!(token = %token, error = %e, "approval failed");
                self.stage = ShieldStage::ApprovalRequired;
                Err(WalletError::Submission(format!("approve: {e}")))
            }
        }
    }

    /// Estimate, build and submit the shield transaction.
    ///
    /// For tokens the allowance is checked again first; if it is short the
    /// pipeline moves to `ApprovalRequired` and
    /// [`WalletError::ApprovalRequired`] is returned without submitting.
    pub async fn confirm(&mut self) -> Result<ShieldReceipt, WalletError> {
        use ShieldStage::*;
        self.expect_stage(&[Drafted, ApprovalRequired, Approved], "confirm")?;
        self.ensure_same_wallet()?;

        if let AssetRef::Erc20(token) = self.asset.clone() {
            self.stage = ApprovalCheck;
            let allowance = match self
                .controller
                .read_allowance(&token, &self.wallet.public_address)
                .await
            {
                Ok(allowance) => allowance,
                Err(e) => {
                    self.stage = Drafted;
                    return Err(e);
                }
            };
            if allowance < self.amount {
                self.stage = ApprovalRequired;
                self.ticket = None;
                return Err(WalletError::ApprovalRequired {
                    token,
                    required: self.amount.clone(),
                    allowance,
                });
            }
            if self
                .ticket
                .as_ref()
                .is_some_and(|t| !t.covers(&token, &self.amount, Utc::now()))
            {
                self.ticket = None;
            }
        }
        self.stage = Approved;

        let plan = ShieldPlan {
            contract: self.controller.config().network.shield_contract.clone(),
            from_public_address: self.wallet.public_address.clone(),
            recipient_private_address: self.wallet.private_address.clone(),
            asset: self.asset.clone(),
            amount: self.amount.clone(),
        };

        self.stage = Estimating;
        let (tx, gas) = match self.prepare(&plan).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "shield preparation failed");
                self.stage = Failed;
                return Err(e);
            }
        };

        self.stage = Submitting;
        let sent = self
            .controller
            .chain()
            .send_transaction(&self.wallet.seed, &tx)
            .await;
        match sent {
            Ok(tx_ref) => {
                info!(
                    wallet_id = %self.wallet.private_id,
                    asset = %plan.asset,
                    amount = %plan.amount,
                    tx = %tx_ref,
                    "shield submitted"
                );
                self.stage = Confirmed;
                Ok(ShieldReceipt { tx_ref, gas, plan })
            }
            Err(e) => {
                warn!(error = %e, "shield submission failed");
                self.stage = Failed;
                Err(WalletError::Submission(e.to_string()))
            }
        }
    }

    /// Price the transaction, estimate its gas limit and build it.
    async fn prepare(
        &self,
        plan: &ShieldPlan,
    ) -> Result<(UnsignedTransaction, GasDetails), WalletError> {
        let controller = self.controller;
        let retry = &controller.config().retry;
        let chain_ref = controller.chain_ref();
        let chain = controller.chain();
        let engine = controller.engine();

        let fee = with_retry(retry, "fee_data", || chain.fee_data())
            .await
            .map_err(chain_error)?;
        let priced = select_gas_details(
            controller.config().network.evm_gas_type,
            &fee,
            Amount::zero(),
        )?;
        let gas_limit = with_retry(retry, "estimate_shield_gas", || {
            engine.estimate_shield_gas(&chain_ref, plan, &priced)
        })
        .await
        .map_err(engine_error)?;
        let gas = priced.with_gas_limit(gas_limit);

        let tx = engine
            .build_shield_transaction(&chain_ref, plan, &gas)
            .await
            .map_err(engine_error)?;
        Ok((tx, gas))
    }
}
