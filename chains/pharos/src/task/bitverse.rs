//! Bitverse perpetuals: margin deposit/withdraw on the position router and
//! signed market orders on the trade router.

use crate::config::{AmountRange, BitverseSettings};
use crate::task::common::{
    json_f64, json_u256, ApprovalAmount, Approve, RequireBalance, TokenAmount,
};
use crate::task::{parse_address, PharosWorkflow, TaskContext};
use crate::utils::abi::encode_call;
use async_trait::async_trait;
use core_logic::{ConfigError, Step, StepOutcome, Workflow, WorkflowError};
use ethers::abi::Token;
use ethers::types::{Address, U256};
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use tracing::info;

const USDT: &str = "0xD4071393f8716661958F766DF660033b3d35fD29";
const POSITION_ROUTER: &str = "0xA307cE75Bc6eF22794410D783e5D4265dEd1A24f";
const TRADE_ROUTER: &str = "0xbf428011d76eFbfaEE35a20dD6a0cA589B539c54";
const TRADE_PROVIDER: &str = "bvx17w0adeg64ky0daxwd2ugyuneellmjgnx53lm9l";

const HEADERS: [(&str, &str); 4] = [
    ("Chain-Id", "688688"),
    ("Origin", "https://testnet.bitverse.zone"),
    ("Referer", "https://testnet.bitverse.zone/"),
    ("Tenant-Id", "PHAROS"),
];

const PAIRS: [&str; 2] = ["BTC-USD", "ETH-USD"];
const SIDE_LONG: u64 = 1;
const ORDER_TYPE_MARKET: u64 = 2;
const LEVERAGE_E2: u64 = 500;
const ALLOWED_SLIPPAGE: &str = "10";
const PRICE_SCALE: f64 = 1e6;

const PLACE_ORDER: &str = "placeOrder(string,uint256,uint8,uint64,uint8,uint64,(address,uint256)[],uint256,uint256,uint256,uint256,uint256,bytes,bool)";

pub fn workflows(settings: &BitverseSettings) -> Result<Vec<PharosWorkflow>, ConfigError> {
    let usdt = parse_address("bitverse.usdt", USDT)?;
    let position_router = parse_address("bitverse.position_router", POSITION_ROUTER)?;
    let trade_router = parse_address("bitverse.trade_router", TRADE_ROUTER)?;
    let api = BitverseApi::new(&settings.api_base);

    let mut workflows = Vec::new();
    for action in &settings.actions {
        match action.as_str() {
            "deposit" => {
                let amount = TokenAmount::new("USDT", usdt, settings.deposit_amount);
                workflows.push(
                    Workflow::new("bitverse_deposit")
                        .step(RequireBalance::new(amount.clone()))
                        .step(Approve::new(amount.clone(), position_router, ApprovalAmount::Unlimited))
                        .step(RouterTransfer::deposit(position_router, amount)),
                );
            }
            "trade" => workflows.push(
                Workflow::new("bitverse_trade")
                    .repeat(settings.trade_count)
                    .step(PlaceOrder::new(api.clone(), trade_router, usdt, settings.trade_amount)),
            ),
            "withdraw" => {
                let amount = TokenAmount::new("USDT", usdt, settings.deposit_amount);
                workflows.push(
                    Workflow::new("bitverse_withdraw")
                        .step(RequireDepositedBalance::new(api.clone(), settings.deposit_amount))
                        .step(RouterTransfer::withdraw(position_router, amount)),
                );
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "bitverse.actions".to_string(),
                    reason: format!("unknown action '{}'", other),
                })
            }
        }
    }
    Ok(workflows)
}

#[derive(Debug, Clone)]
struct BitverseApi {
    base: String,
}

impl BitverseApi {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Unwraps `result`, failing on a non-zero `retCode`.
    fn result(endpoint: &str, response: Value) -> Result<Value, WorkflowError> {
        let code = response.get("retCode").and_then(Value::as_i64);
        if code != Some(0) {
            let message = response
                .get("retMsg")
                .and_then(Value::as_str)
                .unwrap_or("no retMsg");
            return Err(WorkflowError::service(
                endpoint,
                format!("retCode {:?}: {}", code, message),
            ));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn deposited_usdt(&self, ctx: &TaskContext) -> Result<f64, WorkflowError> {
        let url = format!("{}/trade-data/v1/account/balance/allCoinBalance", self.base);
        let body = json!({ "address": format!("{:?}", ctx.address()) });
        let result = Self::result(&url, ctx.api.post_json(&url, &body, &HEADERS).await?)?;

        Ok(result
            .get("coinBalance")
            .and_then(Value::as_array)
            .and_then(|coins| {
                coins
                    .iter()
                    .find(|c| c.get("coinName").and_then(Value::as_str) == Some("USDT"))
            })
            .and_then(|usdt| usdt.get("balanceSize"))
            .and_then(json_f64)
            .unwrap_or(0.0))
    }

    async fn last_price(&self, ctx: &TaskContext, pair: &str) -> Result<f64, WorkflowError> {
        let url = format!(
            "{}/quote-all-in-one/v1/public/market/ticker?symbol={}",
            self.base, pair
        );
        let result = Self::result(&url, ctx.api.get_json(&url, &HEADERS).await?)?;
        result
            .get("lastPrice")
            .and_then(json_f64)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| WorkflowError::service(&url, "ticker has no lastPrice"))
    }

    async fn simulate(
        &self,
        ctx: &TaskContext,
        pair: &str,
        price: u128,
        margin: f64,
    ) -> Result<OrderQuote, WorkflowError> {
        let url = format!("{}/trade-data/v1//order/simulation/pendingOrder", self.base);
        let body = json!({
            "address": TRADE_PROVIDER,
            "pair": pair,
            "price": price.to_string(),
            "orderType": ORDER_TYPE_MARKET,
            "leverageE2": LEVERAGE_E2,
            "side": SIDE_LONG,
            "margin": [{ "denom": "USDT", "amount": (margin.floor() as u64).to_string() }],
            "allowedSlippage": ALLOWED_SLIPPAGE,
            "isV2": "0",
        });
        let result = Self::result(&url, ctx.api.post_json(&url, &body, &HEADERS).await?)?;
        OrderQuote::from_result(&result).map_err(|reason| WorkflowError::service(&url, reason))
    }
}

/// Signed order parameters returned by the simulation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuote {
    pub pair: String,
    pub leverage_e2: U256,
    pub side: U256,
    pub slippage_e6: U256,
    pub long_oi: U256,
    pub short_oi: U256,
    pub timestamp: U256,
    pub signature: Vec<u8>,
    pub execute_immediately: bool,
}

impl OrderQuote {
    pub fn from_result(result: &Value) -> Result<Self, String> {
        let number = |key: &str| {
            result
                .get(key)
                .and_then(json_u256)
                .ok_or_else(|| format!("simulation result has no numeric {}", key))
        };
        let pair = result
            .get("pair")
            .and_then(Value::as_str)
            .ok_or("simulation result has no pair")?;
        let sign = result
            .get("sign")
            .and_then(Value::as_str)
            .ok_or("simulation result has no sign")?;
        let signature = hex::decode(sign.trim_start_matches("0x"))
            .map_err(|e| format!("sign is not hex: {}", e))?;

        Ok(Self {
            pair: pair.to_string(),
            leverage_e2: number("leverageE2")?,
            side: number("side")?,
            slippage_e6: number("allowedSlippage")?,
            long_oi: number("longOI")?,
            short_oi: number("shortOI")?,
            timestamp: number("signTimestamp")?,
            signature,
            execute_immediately: result
                .get("marketOpening")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// 1% above the market for longs, 1% below for shorts, scaled to 1e6.
pub fn acceptable_price(market: f64, side: u64) -> u128 {
    let adjusted = if side == SIDE_LONG {
        market * 1.01
    } else {
        market * 0.99
    };
    (adjusted * PRICE_SCALE).floor() as u128
}

/// Skips the rest of the workflow when the margin account holds too little USDT.
struct RequireDepositedBalance {
    api: BitverseApi,
    amount: f64,
}

impl RequireDepositedBalance {
    fn new(api: BitverseApi, amount: f64) -> Self {
        Self { api, amount }
    }
}

#[async_trait]
impl Step<TaskContext> for RequireDepositedBalance {
    fn name(&self) -> &str {
        "require_deposited_balance"
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let deposited = self.api.deposited_usdt(ctx).await?;
        if deposited < self.amount {
            return Err(WorkflowError::InsufficientBalance {
                asset: "deposited USDT".to_string(),
                required: self.amount.to_string(),
                available: deposited.to_string(),
            });
        }
        Ok(StepOutcome::done(format!("{} USDT deposited", deposited)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Deposit,
    Withdraw,
}

/// `deposit(token, amount)` / `withdraw(token, amount)` on the position router.
struct RouterTransfer {
    direction: Direction,
    router: Address,
    amount: TokenAmount,
}

impl RouterTransfer {
    fn deposit(router: Address, amount: TokenAmount) -> Self {
        Self {
            direction: Direction::Deposit,
            router,
            amount,
        }
    }

    fn withdraw(router: Address, amount: TokenAmount) -> Self {
        Self {
            direction: Direction::Withdraw,
            router,
            amount,
        }
    }
}

#[async_trait]
impl Step<TaskContext> for RouterTransfer {
    fn name(&self) -> &str {
        match self.direction {
            Direction::Deposit => "deposit",
            Direction::Withdraw => "withdraw",
        }
    }

    fn moves_value(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let (amount, _) = self.amount.resolve(ctx).await?;
        let signature = match self.direction {
            Direction::Deposit => "deposit(address,uint256)",
            Direction::Withdraw => "withdraw(address,uint256)",
        };
        let data = encode_call(
            signature,
            &[Token::Address(self.amount.token), Token::Uint(amount)],
        );
        let outcome = ctx
            .send(self.router, data, ctx.gas.limits().deposit)
            .await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}

/// One market order per round with a freshly drawn margin. A margin account
/// holding less than that margin skips the remaining rounds.
struct PlaceOrder {
    api: BitverseApi,
    router: Address,
    usdt: Address,
    margin: AmountRange,
}

impl PlaceOrder {
    fn new(api: BitverseApi, router: Address, usdt: Address, margin: AmountRange) -> Self {
        Self {
            api,
            router,
            usdt,
            margin,
        }
    }
}

#[async_trait]
impl Step<TaskContext> for PlaceOrder {
    fn name(&self) -> &str {
        "place_order"
    }

    fn moves_value(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &TaskContext) -> Result<StepOutcome, WorkflowError> {
        let pair = {
            let mut rng = rand::thread_rng();
            PAIRS.choose(&mut rng).copied().unwrap_or(PAIRS[0])
        };

        let amount = TokenAmount::new("USDT", self.usdt, self.margin.sample());
        let deposited = self.api.deposited_usdt(ctx).await?;
        if deposited < amount.amount {
            return Err(WorkflowError::InsufficientBalance {
                asset: "deposited USDT".to_string(),
                required: amount.amount.to_string(),
                available: deposited.to_string(),
            });
        }

        let market = self.api.last_price(ctx, pair).await?;
        let price = acceptable_price(market, SIDE_LONG);
        info!(pair, market, price = %price, margin = amount.amount, "Placing long order");

        let quote = self.api.simulate(ctx, pair, price, amount.amount).await?;
        let (margin, _) = amount.resolve(ctx).await?;

        let data = encode_call(
            PLACE_ORDER,
            &[
                Token::String(quote.pair),
                Token::Uint(U256::from(price)),
                Token::Uint(U256::from(ORDER_TYPE_MARKET)),
                Token::Uint(quote.leverage_e2),
                Token::Uint(quote.side),
                Token::Uint(quote.slippage_e6),
                Token::Array(vec![Token::Tuple(vec![
                    Token::Address(amount.token),
                    Token::Uint(margin),
                ])]),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
                Token::Uint(quote.long_oi),
                Token::Uint(quote.short_oi),
                Token::Uint(quote.timestamp),
                Token::Bytes(quote.signature),
                Token::Bool(quote.execute_immediately),
            ],
        );
        let outcome = ctx.send(self.router, data, ctx.gas.limits().trade).await?;
        Ok(StepOutcome::Confirmed(outcome))
    }
}
