// =============================================================================
// Exchange Adapter — HMAC-SHA256 signed perpetual-futures REST client
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. All signed requests
// carry the API key as a header and a recvWindow to tolerate minor clock
// drift between this process and the venue.
//
// All outbound calls are classified via crate::errors::EngineError::classify
// so retry policy is decided once, centrally, rather than per call site.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use crate::errors::{EngineError, ErrorKind};
use crate::exchange::{ExchangePosition, RateLimitTracker};
use crate::market_data::{ticker_cache::ttl, Candle, TickerCache};
use crate::types::{BalanceInfo, Side};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW: u64 = 5000;

/// Key the batch ticker cache under: there is one venue-wide snapshot per
/// call, not one entry per symbol.
const TICKERS_CACHE_KEY: &str = "__all__";

/// Perpetual-futures REST client with HMAC-SHA256 request signing.
pub struct ExchangeClient {
    api_key: String,
    secret: String,
    base_url: String,
    client: reqwest::Client,
    pub rate_limit: RateLimitTracker,
    ohlcv_cache: TickerCache<Vec<Candle>>,
    tickers_cache: TickerCache<std::collections::HashMap<String, f64>>,
}

impl ExchangeClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!("ExchangeClient initialised (base_url=https://fapi.binance.com)");

        Self {
            api_key,
            secret,
            base_url: "https://fapi.binance.com".to_string(),
            client,
            rate_limit: RateLimitTracker::new(),
            ohlcv_cache: TickerCache::new(ttl::OHLCV),
            tickers_cache: TickerCache::new(ttl::TICKER),
        }
    }

    pub fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    fn classify_response(status: reqwest::StatusCode, body: &serde_json::Value) -> EngineError {
        let kind = EngineError::classify(status.as_u16(), &body.to_string());
        EngineError::new(kind, format!("venue returned {status}: {body}"))
    }

    // -------------------------------------------------------------------------
    // Account / balance / positions
    // -------------------------------------------------------------------------

    #[instrument(skip(self), name = "exchange::fetch_balance")]
    pub async fn fetch_balance(&self) -> Result<Vec<BalanceInfo>> {
        let qs = self.signed_query("");
        let url = format!("{}/fapi/v2/balance?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/balance request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse balance response")?;

        if !status.is_success() {
            anyhow::bail!(Self::classify_response(status, &body));
        }

        let raw = body.as_array().context("balance response is not an array")?;
        let balances = raw
            .iter()
            .map(|b| BalanceInfo {
                asset: b["asset"].as_str().unwrap_or_default().to_string(),
                free: b["availableBalance"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.0),
                locked: 0.0,
            })
            .collect();

        Ok(balances)
    }

    #[instrument(skip(self), name = "exchange::fetch_positions")]
    pub async fn fetch_positions(&self, symbol: Option<&str>) -> Result<Vec<ExchangePosition>> {
        let params = match symbol {
            Some(s) => format!("symbol={s}"),
            None => String::new(),
        };
        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v2/positionRisk?{}", self.base_url, qs);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v2/positionRisk request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse positionRisk response")?;

        if !status.is_success() {
            anyhow::bail!(Self::classify_response(status, &body));
        }

        let raw = body.as_array().context("positionRisk response is not an array")?;
        let mut out = Vec::new();
        for p in raw {
            let qty: f64 = p["positionAmt"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            if qty.abs() < 1e-12 {
                continue;
            }
            out.push(ExchangePosition {
                symbol: p["symbol"].as_str().unwrap_or_default().to_string(),
                side: if qty > 0.0 { Side::Long } else { Side::Short },
                qty: qty.abs(),
                entry_price: p["entryPrice"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                mark_price: p["markPrice"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                unrealized_pnl: p["unRealizedProfit"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.0),
            });
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, price, client_order_id), name = "exchange::create_order")]
    pub async fn create_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: &str,
        quantity: f64,
        price: Option<f64>,
        client_order_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        if !self.rate_limit.can_place_order() {
            anyhow::bail!(EngineError::new(ErrorKind::RateLimit, "local rate-limit guard tripped").with_symbol(symbol));
        }

        let venue_side = match side {
            Side::Long => "BUY",
            Side::Short => "SELL",
        };

        let mut params = format!("symbol={symbol}&side={venue_side}&type={order_type}&quantity={quantity}");
        if let Some(p) = price {
            params.push_str(&format!("&price={p}&timeInForce=GTC"));
        }
        if let Some(coid) = client_order_id {
            params.push_str(&format!("&newClientOrderId={coid}"));
        }

        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        debug!(symbol, venue_side, order_type, quantity, "placing order");

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .context("POST /fapi/v1/order request failed")?;

        self.rate_limit.update_from_headers(resp.headers());
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!(Self::classify_response(status, &body).with_symbol_mut(symbol));
        }

        self.rate_limit.record_order_sent();
        Ok(body)
    }

    #[instrument(skip(self), name = "exchange::cancel_order")]
    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let params = format!("symbol={symbol}&orderId={order_id}");
        let qs = self.signed_query(&params);
        let url = format!("{}/fapi/v1/order?{}", self.base_url, qs);

        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .context("DELETE /fapi/v1/order request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse cancel response")?;

        // An order-not-found response on cancel is treated as an idempotent
        // success, not a failure: the desired end state (no open order) holds.
        let kind = EngineError::classify(status.as_u16(), &body.to_string());
        if !status.is_success() && kind != ErrorKind::OrderNotFound {
            anyhow::bail!(EngineError::new(kind, body.to_string()).with_symbol(symbol));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/klines -- public, no signature required. Array indices:
    /// [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    /// [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades.
    #[instrument(skip(self), name = "exchange::fetch_ohlcv")]
    pub async fn fetch_ohlcv(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let cache_key = format!("{symbol}:{interval}:{limit}");
        if let Some(cached) = self.ohlcv_cache.get(&cache_key) {
            return Ok(cached);
        }

        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self.client.get(&url).send().await.context("GET /fapi/v1/klines request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!(Self::classify_response(status, &body));
        }

        let raw = body.as_array().context("klines response is not an array")?;
        let mut candles = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 8 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }

            let open_time = arr[0].as_i64().unwrap_or(0);
            let open = Self::parse_str_f64(&arr[1])?;
            let high = Self::parse_str_f64(&arr[2])?;
            let low = Self::parse_str_f64(&arr[3])?;
            let close = Self::parse_str_f64(&arr[4])?;
            let volume = Self::parse_str_f64(&arr[5])?;
            let close_time = arr[6].as_i64().unwrap_or(0);
            let quote_volume = Self::parse_str_f64(&arr[7]).unwrap_or(0.0);

            candles.push(Candle {
                open_time,
                close_time,
                open,
                high,
                low,
                close,
                volume,
                quote_volume,
                trades_count: arr.get(8).and_then(|v| v.as_u64()).unwrap_or(0),
                taker_buy_volume: 0.0,
                taker_buy_quote_volume: 0.0,
                is_closed: true,
            });
        }

        self.ohlcv_cache.set(cache_key, candles.clone());
        Ok(candles)
    }

    /// GET /fapi/v1/ticker/24hr for every symbol in one call -- the batch
    /// prefetch path the scorer uses ahead of scoring each candidate.
    #[instrument(skip(self), name = "exchange::fetch_tickers")]
    pub async fn fetch_tickers(&self) -> Result<std::collections::HashMap<String, f64>> {
        if let Some(cached) = self.tickers_cache.get(TICKERS_CACHE_KEY) {
            return Ok(cached);
        }

        let url = format!("{}/fapi/v1/ticker/24hr", self.base_url);
        let resp = self.client.get(&url).send().await.context("GET /fapi/v1/ticker/24hr request failed")?;
        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse ticker/24hr response")?;

        if !status.is_success() {
            anyhow::bail!(Self::classify_response(status, &body));
        }

        let raw = body.as_array().context("ticker/24hr response is not an array")?;
        let mut out = std::collections::HashMap::with_capacity(raw.len());
        for t in raw {
            let symbol = t["symbol"].as_str().unwrap_or_default().to_string();
            let quote_volume = t["quoteVolume"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            out.insert(symbol, quote_volume);
        }

        self.tickers_cache.set(TICKERS_CACHE_KEY, out.clone());
        Ok(out)
    }

    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Small helper trait so call sites can attach a symbol to an already-built
/// [`EngineError`] without destructuring it back out of an `anyhow::Error`.
trait WithSymbolMut {
    fn with_symbol_mut(self, symbol: &str) -> Self;
}

impl WithSymbolMut for EngineError {
    fn with_symbol_mut(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }
}
