//! Steps and gates shared by every protocol: ERC-20 reads, balance checks
//! and allowance-aware approvals.

use crate::task::TaskContext;
use crate::utils::abi::{decode_uint, encode_call, format_amount, to_units};
use async_trait::async_trait;
use core_logic::{Gate, GateDecision, Step, StepOutcome, WorkflowError};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde_json::Value;
use tracing::debug;

pub async fn token_balance(ctx: &TaskContext, token: Address) -> Result<U256, WorkflowError> {
    let data = encode_call("balanceOf(address)", &[Token::Address(ctx.address())]);
    decode_uint(&ctx.call(token, data).await?)
}

pub async fn token_decimals(ctx: &TaskContext, token: Address) -> Result<u32, WorkflowError> {
    let data = encode_call("decimals()", &[]);
    let decimals = decode_uint(&ctx.call(token, data).await?)?;
    if decimals > U256::from(77) {
        return Err(WorkflowError::rpc("decimals", format!("{} is not a valid decimals value", decimals)));
    }
    Ok(decimals.as_u32())
}

pub async fn allowance(
    ctx: &TaskContext,
    token: Address,
    spender: Address,
) -> Result<U256, WorkflowError> {
    let data = encode_call(
        "allowance(address,address)",
        &[Token::Address(ctx.address()), Token::Address(spender)],
    );
    decode_uint(&ctx.call(token, data).await?)
}

/// Number that REST services send either as a JSON number or a string.
pub fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn json_u256(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => U256::from_dec_str(s.trim()).ok(),
        _ => None,
    }
}

/// Human-readable amount of an ERC-20, converted with the token's own decimals.
#[derive(Debug, Clone)]
pub struct TokenAmount {
    pub symbol: String,
    pub token: Address,
    pub amount: f64,
}

impl TokenAmount {
    pub fn new(symbol: impl Into<String>, token: Address, amount: f64) -> Self {
        Self {
            symbol: symbol.into(),
            token,
            amount,
        }
    }

    /// Amount in base units plus the decimals used.
    pub async fn resolve(&self, ctx: &TaskContext) -> Result<(U256, u32), WorkflowError> {
        let decimals = token_decimals(ctx, self.token).await?;
        Ok((to_units(self.amount, decimals)?, decimals))
    }
}

/// Fails with [`WorkflowError::InsufficientBalance`] when the account holds
/// less than the amount, which skips the rest of the workflow.
pub struct RequireBalance {
    name: String,
    asset: TokenAmount,
}

impl RequireBalance {
    pub fn new(asset: TokenAmount) -> Self {
        Self {
            name: format!("require_balance_{}", asset.symbol.to_lowercase()),
            asset,
        }
    }
}

#[async_trait]
impl Step<TaskContext> for RequireBalance {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let (required, decimals) = self.asset.resolve(ctx).await?;
        let available = token_balance(ctx, self.asset.token).await?;

        if available < required {
            return Err(WorkflowError::InsufficientBalance {
                asset: self.asset.symbol.clone(),
                required: format_amount(required, decimals),
                available: format_amount(available, decimals),
            });
        }

        Ok(StepOutcome::done(format!(
            "{} {} available",
            format_amount(available, decimals),
            self.asset.symbol
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAmount {
    Exact,
    Unlimited,
}

/// Approves `spender` unless the current allowance already covers the amount.
pub struct Approve {
    name: String,
    asset: TokenAmount,
    spender: Address,
    approval: ApprovalAmount,
}

impl Approve {
    pub fn new(asset: TokenAmount, spender: Address, approval: ApprovalAmount) -> Self {
        Self {
            name: format!("approve_{}", asset.symbol.to_lowercase()),
            asset,
            spender,
            approval,
        }
    }
}

#[async_trait]
impl Step<TaskContext> for Approve {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let (required, decimals) = self.asset.resolve(ctx).await?;
        let current = allowance(ctx, self.asset.token, self.spender).await?;

        if current >= required {
            return Ok(StepOutcome::satisfied(format!(
                "allowance {} {} already covers {}",
                format_amount(current, decimals),
                self.asset.symbol,
                format_amount(required, decimals)
            )));
        }

        let value = match self.approval {
            ApprovalAmount::Exact => required,
            ApprovalAmount::Unlimited => U256::MAX,
        };
        debug!("Approving {:?} for {} {}", self.spender, value, self.asset.symbol);

        let data = encode_call(
            "approve(address,uint256)",
            &[Token::Address(self.spender), Token::Uint(value)],
        );
        let outcome = ctx
            .send(self.asset.token, data, ctx.gas.limits().approve)
            .await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}

/// Skips the workflow when the account has no native balance to pay gas.
pub struct NativeBalanceGate;

#[async_trait]
impl Gate<TaskContext> for NativeBalanceGate {
    fn name(&self) -> &str {
        "native_balance"
    }

    async fn check(&self, ctx: &TaskContext) -> Result<GateDecision, WorkflowError> {
        let balance = ctx.rpc.balance(ctx.address()).await?;
        if balance.is_zero() {
            Ok(GateDecision::skip("no native balance for gas"))
        } else {
            Ok(GateDecision::Proceed)
        }
    }
}
