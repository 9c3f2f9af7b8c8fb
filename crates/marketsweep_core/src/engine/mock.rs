//! In-process limit-order market used as the `mock` engine variant.
//!
//! The model is intentionally small: liquidity suppliers rest limit orders
//! around the reference price, liquidity demanders and market makers trade
//! against them, and a liquidity broker works a buy and a sell programme
//! bounded by `BkrBuy_Limit` / `BkrSel_Limit` until `PeriodtoEndExecution`
//! ticks after burn-in. Every crossing produces a transaction that is
//! visible through `list_transactions` until the next tick.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rustc_hash::FxHashMap;

use super::Engine;
use crate::error::EngineError;
use crate::model::Value;

const INITIAL_PRICE: f64 = 100.0;

/// Variables the model understands, with their defaults
const DEFAULT_VARIABLES: &[(&str, Value)] = &[
    ("SEED", Value::Int(0)),
    ("#_LiqSup", Value::Int(20)),
    ("#_LiqDem", Value::Int(10)),
    ("#_MktMkr", Value::Int(2)),
    ("BkrBuy_Limit", Value::Int(0)),
    ("BkrSel_Limit", Value::Int(0)),
    ("LiqBkr_OrderSizeMultiplier", Value::Float(1.0)),
    ("PeriodtoEndExecution", Value::Int(0)),
    ("endBurninTime", Value::Int(0)),
    ("liquidity_Supplier_Arrival_Rate", Value::Float(0.5)),
    ("liquidity_Demander_Arrival_Rate", Value::Float(0.3)),
    ("market_Makers_Arrival_Rate", Value::Float(0.8)),
    ("ProbabilityBuyofLiqyuidityDemander", Value::Float(0.5)),
    ("LiqSup_TradeLength", Value::Int(20)),
];

/// Reporters computed from model state; these cannot be assigned
const REPORTERS: &[&str] = &[
    "ticks",
    "last-price",
    "mean-price",
    "total-volume",
    "transaction-count",
    "broker-bought",
    "broker-sold",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderKind {
    LiquiditySupplier,
    LiquidityDemander,
    MarketMaker,
    Broker,
}

impl TraderKind {
    pub fn label(self) -> &'static str {
        match self {
            TraderKind::LiquiditySupplier => "LiqSup",
            TraderKind::LiquidityDemander => "LiqDem",
            TraderKind::MarketMaker => "MktMkr",
            TraderKind::Broker => "LiqBkr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
struct RestingOrder {
    trader: usize,
    price: f64,
    quantity: i64,
    placed_at: i64,
}

#[derive(Debug, Clone)]
struct Trade {
    id: i64,
    price: f64,
    time: f64,
    quantity: i64,
    buyer: usize,
    seller: usize,
}

/// Seeded in-process market engine
pub struct MockMarketEngine {
    variables: FxHashMap<String, Value>,
    rng: SmallRng,
    ready: bool,
    ticks: i64,
    kinds: Vec<TraderKind>,
    broker: usize,
    /// Resting buy orders, best (highest) price first
    bids: Vec<RestingOrder>,
    /// Resting sell orders, best (lowest) price first
    asks: Vec<RestingOrder>,
    price: f64,
    transactions: Vec<Trade>,
    next_trade_id: i64,
    total_volume: i64,
    trade_count: i64,
    notional: f64,
    broker_bought: i64,
    broker_sold: i64,
}

impl Default for MockMarketEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMarketEngine {
    pub fn new() -> Self {
        let variables = DEFAULT_VARIABLES
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Self {
            variables,
            rng: SmallRng::seed_from_u64(0),
            ready: false,
            ticks: 0,
            kinds: Vec::new(),
            broker: 0,
            bids: Vec::new(),
            asks: Vec::new(),
            price: INITIAL_PRICE,
            transactions: Vec::new(),
            next_trade_id: 0,
            total_volume: 0,
            trade_count: 0,
            notional: 0.0,
            broker_bought: 0,
            broker_sold: 0,
        }
    }

    fn int_var(&self, name: &str) -> i64 {
        self.variables
            .get(name)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    fn float_var(&self, name: &str) -> f64 {
        self.variables
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    fn arrives(&mut self, rate_var: &str) -> bool {
        let rate = self.float_var(rate_var).clamp(0.0, 1.0);
        self.rng.random::<f64>() < rate
    }

    fn random_side(&mut self, buy_probability: f64) -> Side {
        if self.rng.random::<f64>() < buy_probability {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    fn record_trade(&mut self, buyer: usize, seller: usize, price: f64, quantity: i64) {
        let sequence = self.transactions.len() as f64;
        self.transactions.push(Trade {
            id: self.next_trade_id,
            price,
            time: self.ticks as f64 + sequence / 1000.0,
            quantity,
            buyer,
            seller,
        });
        self.next_trade_id += 1;
        self.trade_count += 1;
        self.total_volume += quantity;
        self.notional += price * quantity as f64;
        self.price = price;

        if buyer == self.broker {
            self.broker_bought += quantity;
        }
        if seller == self.broker {
            self.broker_sold += quantity;
        }
    }

    /// Match an incoming order against the opposite side of the book.
    ///
    /// `limit` of `None` is a market order. Returns the unfilled quantity.
    fn match_order(&mut self, trader: usize, side: Side, limit: Option<f64>, quantity: i64) -> i64 {
        let mut remaining = quantity;
        while remaining > 0 {
            let best = match side {
                Side::Buy => self.asks.first(),
                Side::Sell => self.bids.first(),
            };
            let Some(best) = best else { break };
            let crosses = match (side, limit) {
                (_, None) => true,
                (Side::Buy, Some(px)) => best.price <= px,
                (Side::Sell, Some(px)) => best.price >= px,
            };
            if !crosses {
                break;
            }

            let (counterparty, price) = (best.trader, best.price);
            let fill = remaining.min(best.quantity);
            let book = match side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            book[0].quantity -= fill;
            if book[0].quantity == 0 {
                book.remove(0);
            }
            remaining -= fill;

            match side {
                Side::Buy => self.record_trade(trader, counterparty, price, fill),
                Side::Sell => self.record_trade(counterparty, trader, price, fill),
            }
        }
        remaining
    }

    fn rest_order(&mut self, trader: usize, side: Side, price: f64, quantity: i64) {
        let order = RestingOrder {
            trader,
            price,
            quantity,
            placed_at: self.ticks,
        };
        // Price priority, then time priority among equal prices
        match side {
            Side::Buy => {
                let pos = self.bids.partition_point(|o| o.price >= price);
                self.bids.insert(pos, order);
            }
            Side::Sell => {
                let pos = self.asks.partition_point(|o| o.price <= price);
                self.asks.insert(pos, order);
            }
        }
    }

    fn submit_limit(&mut self, trader: usize, side: Side, price: f64, quantity: i64) {
        let remaining = self.match_order(trader, side, Some(price), quantity);
        if remaining > 0 {
            self.rest_order(trader, side, price, remaining);
        }
    }

    fn expire_orders(&mut self) {
        let lifetime = self.int_var("LiqSup_TradeLength").max(1);
        let now = self.ticks;
        self.bids.retain(|o| now - o.placed_at < lifetime);
        self.asks.retain(|o| now - o.placed_at < lifetime);
    }

    fn step_market_makers(&mut self) {
        let spread = self.price * 0.002;
        for trader in 0..self.kinds.len() {
            if self.kinds[trader] != TraderKind::MarketMaker
                || !self.arrives("market_Makers_Arrival_Rate")
            {
                continue;
            }
            self.bids.retain(|o| o.trader != trader);
            self.asks.retain(|o| o.trader != trader);
            let size = self.rng.random_range(1..=5);
            let mid = self.price;
            self.submit_limit(trader, Side::Buy, mid - spread / 2.0, size);
            self.submit_limit(trader, Side::Sell, mid + spread / 2.0, size);
        }
    }

    fn step_suppliers(&mut self) {
        for trader in 0..self.kinds.len() {
            if self.kinds[trader] != TraderKind::LiquiditySupplier
                || !self.arrives("liquidity_Supplier_Arrival_Rate")
            {
                continue;
            }
            let side = self.random_side(0.5);
            let z: f64 = self.rng.sample(StandardNormal);
            let distance = (z * 0.002).abs();
            let price = match side {
                Side::Buy => self.price * (1.0 - distance),
                Side::Sell => self.price * (1.0 + distance),
            };
            let size = self.rng.random_range(1..=10);
            self.submit_limit(trader, side, price, size);
        }
    }

    fn step_demanders(&mut self) {
        let buy_probability = self
            .float_var("ProbabilityBuyofLiqyuidityDemander")
            .clamp(0.0, 1.0);
        for trader in 0..self.kinds.len() {
            if self.kinds[trader] != TraderKind::LiquidityDemander
                || !self.arrives("liquidity_Demander_Arrival_Rate")
            {
                continue;
            }
            let side = self.random_side(buy_probability);
            let size = self.rng.random_range(1..=5);
            self.match_order(trader, side, None, size);
        }
    }

    fn step_broker(&mut self) {
        let burn_in = self.int_var("endBurninTime");
        let period = self.int_var("PeriodtoEndExecution");
        let elapsed = self.ticks - burn_in;
        if elapsed <= 0 || elapsed > period {
            return;
        }
        let periods_left = (period - elapsed + 1).max(1);
        let multiplier = self.float_var("LiqBkr_OrderSizeMultiplier").max(0.0);

        for side in [Side::Buy, Side::Sell] {
            let (limit, done) = match side {
                Side::Buy => (self.int_var("BkrBuy_Limit"), self.broker_bought),
                Side::Sell => (self.int_var("BkrSel_Limit"), self.broker_sold),
            };
            let outstanding = limit - done;
            if outstanding <= 0 {
                continue;
            }
            let slice = (outstanding as f64 / periods_left as f64 * multiplier).ceil() as i64;
            let size = slice.clamp(1, outstanding);
            self.match_order(self.broker, side, None, size);
        }
    }

    fn transaction_field(&self, index: usize, field: &str) -> Option<Value> {
        let trade = self.transactions.get(index)?;
        let value = match field {
            "TrdID" => Value::Int(trade.id),
            "TrdPrice" => Value::Float(trade.price),
            "TrdTime" => Value::Float(trade.time),
            "TrdQuant" => Value::Int(trade.quantity),
            "TrdWhoBid" => Value::Int(trade.buyer as i64),
            "TrdWhoAsk" => Value::Int(trade.seller as i64),
            "TrdWhoBidType" => Value::Text(self.kinds[trade.buyer].label().to_string()),
            "TrdWhoAskType" => Value::Text(self.kinds[trade.seller].label().to_string()),
            _ => return None,
        };
        Some(value)
    }

    fn query_transaction(&self, expression: &str, args: &str) -> Result<Value, EngineError> {
        let (index, field) = args
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| EngineError::query(expression, "expected `<index> \"<field>\"`"))?;
        let index: usize = index
            .parse()
            .map_err(|_| EngineError::query(expression, "transaction index is not a number"))?;
        let field = field.trim().trim_matches('"');
        if index >= self.transactions.len() {
            return Err(EngineError::query(
                expression,
                format!(
                    "transaction {index} out of range ({} this tick)",
                    self.transactions.len()
                ),
            ));
        }
        self.transaction_field(index, field)
            .ok_or_else(|| EngineError::query(expression, format!("unknown field {field}")))
    }
}

impl Engine for MockMarketEngine {
    fn configure(&mut self, name: &str, value: &Value) -> Result<(), EngineError> {
        if REPORTERS.contains(&name) {
            return Err(EngineError::configuration(name, "is a read-only reporter"));
        }
        if name.starts_with("#_") || name.ends_with("_Limit") {
            match value.as_i64() {
                Some(n) if n >= 0 => {}
                _ => {
                    return Err(EngineError::configuration(
                        name,
                        format!("expected a non-negative integer, got {value}"),
                    ));
                }
            }
        }
        if name == "SEED" {
            let seed = value
                .as_i64()
                .ok_or_else(|| EngineError::configuration(name, "seed must be an integer"))?;
            self.rng = SmallRng::seed_from_u64(seed as u64);
        }
        self.variables.insert(name.to_string(), value.clone());
        Ok(())
    }

    fn setup(&mut self) -> Result<(), EngineError> {
        let counts = [
            (TraderKind::LiquiditySupplier, self.int_var("#_LiqSup")),
            (TraderKind::LiquidityDemander, self.int_var("#_LiqDem")),
            (TraderKind::MarketMaker, self.int_var("#_MktMkr")),
        ];
        if counts.iter().all(|(_, n)| *n == 0) {
            return Err(EngineError::Setup("market has no traders".to_string()));
        }

        self.kinds = counts
            .iter()
            .flat_map(|&(kind, n)| std::iter::repeat_n(kind, n.max(0) as usize))
            .collect();
        self.broker = self.kinds.len();
        self.kinds.push(TraderKind::Broker);

        self.bids.clear();
        self.asks.clear();
        self.transactions.clear();
        self.ticks = 0;
        self.price = INITIAL_PRICE;
        self.next_trade_id = 0;
        self.total_volume = 0;
        self.trade_count = 0;
        self.notional = 0.0;
        self.broker_bought = 0;
        self.broker_sold = 0;
        self.ready = true;
        Ok(())
    }

    fn step(&mut self) -> Result<(), EngineError> {
        if !self.ready {
            return Err(EngineError::Step("setup has not been run".to_string()));
        }
        self.ticks += 1;
        self.transactions.clear();
        self.expire_orders();

        self.step_market_makers();
        self.step_suppliers();
        self.step_demanders();
        self.step_broker();

        if self.transactions.is_empty() {
            let z: f64 = self.rng.sample(StandardNormal);
            self.price *= (z * 0.001).exp();
        }
        Ok(())
    }

    fn query(&mut self, expression: &str) -> Result<Value, EngineError> {
        let expr = expression.trim();
        if let Some(args) = expr.strip_prefix("prop_list_transactions ") {
            return self.query_transaction(expr, args);
        }
        let value = match expr {
            "ticks" => Value::Int(self.ticks),
            "length list_transactions" => Value::Int(self.transactions.len() as i64),
            "last-price" => Value::Float(self.price),
            "mean-price" if self.total_volume > 0 => {
                Value::Float(self.notional / self.total_volume as f64)
            }
            "mean-price" => Value::Float(self.price),
            "total-volume" => Value::Int(self.total_volume),
            "transaction-count" => Value::Int(self.trade_count),
            "broker-bought" => Value::Int(self.broker_bought),
            "broker-sold" => Value::Int(self.broker_sold),
            name => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::query(expr, "unknown reporter"))?,
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_engine(seed: i64) -> MockMarketEngine {
        let mut engine = MockMarketEngine::new();
        engine.configure("SEED", &Value::Int(seed)).unwrap();
        engine.setup().unwrap();
        engine
    }

    #[test]
    fn test_step_requires_setup() {
        let mut engine = MockMarketEngine::new();
        assert!(matches!(engine.step(), Err(EngineError::Step(_))));
    }

    #[test]
    fn test_ticks_advance() {
        let mut engine = ready_engine(1);
        engine.repeat_step(5).unwrap();
        assert_eq!(engine.query("ticks").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_market_trades() {
        let mut engine = ready_engine(42);
        engine.repeat_step(100).unwrap();
        let count = engine.query("transaction-count").unwrap().as_i64().unwrap();
        assert!(count > 0, "expected trades after 100 ticks");
        let price = engine.query("last-price").unwrap().as_f64().unwrap();
        assert!(price > 0.0);
    }

    #[test]
    fn test_transaction_fields_are_queryable() {
        let mut engine = ready_engine(7);
        let mut seen = false;
        for _ in 0..200 {
            engine.step().unwrap();
            let n = engine
                .query("length list_transactions")
                .unwrap()
                .as_i64()
                .unwrap();
            if n > 0 {
                let id = engine.query("prop_list_transactions 0 \"TrdID\"").unwrap();
                assert!(id.as_i64().is_some());
                let kind = engine
                    .query("prop_list_transactions 0 \"TrdWhoBidType\"")
                    .unwrap();
                assert!(kind.as_str().is_some());
                seen = true;
                break;
            }
        }
        assert!(seen, "no transactions in 200 ticks");
    }

    #[test]
    fn test_out_of_range_transaction_is_query_error() {
        let mut engine = ready_engine(3);
        let err = engine
            .query("prop_list_transactions 999 \"TrdID\"")
            .unwrap_err();
        assert!(matches!(err, EngineError::Query { .. }));
    }

    #[test]
    fn test_unknown_reporter_is_query_error() {
        let mut engine = ready_engine(3);
        assert!(matches!(
            engine.query("no-such-thing"),
            Err(EngineError::Query { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_population() {
        let mut engine = MockMarketEngine::new();
        let err = engine.configure("#_LiqSup", &Value::Int(-1)).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
        let err = engine.configure("ticks", &Value::Int(3)).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_empty_market_fails_setup() {
        let mut engine = MockMarketEngine::new();
        for name in ["#_LiqSup", "#_LiqDem", "#_MktMkr"] {
            engine.configure(name, &Value::Int(0)).unwrap();
        }
        assert!(matches!(engine.setup(), Err(EngineError::Setup(_))));
    }

    #[test]
    fn test_broker_respects_limits() {
        let mut engine = MockMarketEngine::new();
        engine.configure("SEED", &Value::Int(11)).unwrap();
        engine.configure("BkrBuy_Limit", &Value::Int(30)).unwrap();
        engine.configure("BkrSel_Limit", &Value::Int(0)).unwrap();
        engine.configure("PeriodtoEndExecution", &Value::Int(50)).unwrap();
        engine.setup().unwrap();
        engine.repeat_step(80).unwrap();

        let bought = engine.query("broker-bought").unwrap().as_i64().unwrap();
        let sold = engine.query("broker-sold").unwrap().as_i64().unwrap();
        assert!(bought <= 30);
        assert_eq!(sold, 0);
    }

    #[test]
    fn test_same_seed_same_path() {
        let mut a = ready_engine(99);
        let mut b = ready_engine(99);
        a.repeat_step(50).unwrap();
        b.repeat_step(50).unwrap();
        assert_eq!(
            a.query("last-price").unwrap(),
            b.query("last-price").unwrap()
        );
    }
}
