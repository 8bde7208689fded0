use crate::types::{ExecutionReceipt, ExecutionRequest, ExecutionStatus, Result, SwapError};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

/// Upper bound (exclusive) of the random transaction number
const TX_NUMBER_RANGE: u64 = 1_000_000;

/// Settles swaps without broadcasting anything.
///
/// Receipts always report success. When the caller does not supply an output
/// amount, 1% slippage is assumed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSimulator {
    shard: u64,
    realm: u64,
}

impl ExecutionSimulator {
    pub fn new(shard: u64, realm: u64) -> Self {
        Self { shard, realm }
    }

    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReceipt> {
        Self::validate(request)?;

        let amount_in = request
            .amount_in
            .ok_or_else(|| SwapError::InvalidInput("amountIn is required".to_string()))?;
        let amount_out = request
            .amount_out
            .unwrap_or_else(|| amount_in * Decimal::new(99, 2));

        let receipt = ExecutionReceipt {
            transaction_id: self.next_transaction_id(),
            status: ExecutionStatus::Success,
            from_token: request.from.clone(),
            to_token: request.to.clone(),
            amount_in,
            amount_out,
            timestamp: Utc::now(),
        };

        info!(
            "Simulated swap {}: {} {} -> {} {}",
            receipt.transaction_id,
            receipt.amount_in,
            receipt.from_token,
            receipt.amount_out,
            receipt.to_token
        );

        Ok(receipt)
    }

    fn validate(request: &ExecutionRequest) -> Result<()> {
        if request.from.trim().is_empty() || request.to.trim().is_empty() {
            return Err(SwapError::InvalidInput(
                "from and to tokens are required".to_string(),
            ));
        }

        match request.amount_in {
            None => Err(SwapError::InvalidInput("amountIn is required".to_string())),
            Some(amount) if amount.is_sign_negative() => Err(SwapError::InvalidAmount(format!(
                "amountIn must be non-negative, got {}",
                amount
            ))),
            Some(_) => match request.amount_out {
                Some(out) if out.is_sign_negative() => Err(SwapError::InvalidAmount(format!(
                    "amountOut must be non-negative, got {}",
                    out
                ))),
                _ => Ok(()),
            },
        }
    }

    /// `<shard>.<realm>.<n>` in the ledger's account/transaction id style
    fn next_transaction_id(&self) -> String {
        let number = rand::thread_rng().gen_range(0..TX_NUMBER_RANGE);
        format!("{}.{}.{}", self.shard, self.realm, number)
    }
}
