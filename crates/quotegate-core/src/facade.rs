//! The four read operations, identical across backend variants.
//!
//! One session is opened lazily on first use and shared by every call; queries are
//! serialized through it. Results are never cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BackendVariant, GatewayConfig};
use crate::credential::{Clock, SystemClock};
use crate::schema::{self, RowShape};
use crate::session::{
    ConnectionStringSessionProvider, DiscreteFieldsSessionProvider, Session, SessionProvider,
    StoreDriver, StoreQuery, TokenSessionProvider,
};
use crate::{
    GatewayError, HistoryQuery, HistoryWindow, Market, PriceRecord, Symbol, ValidationError,
};

/// Point-in-time view of the gateway wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub backend: &'static str,
    pub shape: &'static str,
    pub session_open: bool,
}

pub struct FetchFacade {
    provider: Arc<dyn SessionProvider>,
    shape: RowShape,
    clock: Arc<dyn Clock>,
    session: Mutex<Option<Box<dyn Session>>>,
}

impl FetchFacade {
    pub fn new(provider: Arc<dyn SessionProvider>, shape: RowShape) -> Self {
        Self {
            provider,
            shape,
            clock: Arc::new(SystemClock),
            session: Mutex::new(None),
        }
    }

    /// Select the session provider for `config.variant` on top of `driver`.
    pub fn from_config(config: &GatewayConfig, driver: Arc<dyn StoreDriver>) -> Self {
        let descriptor = config.descriptor.clone();
        let provider: Arc<dyn SessionProvider> = match config.variant {
            BackendVariant::TokenAuthenticated => Arc::new(TokenSessionProvider::new(
                driver,
                descriptor,
                Arc::new(config.credential_cache()),
            )),
            BackendVariant::DirectConnectionString => {
                Arc::new(ConnectionStringSessionProvider::new(driver, descriptor))
            }
            BackendVariant::UserPasswordDriver => {
                Arc::new(DiscreteFieldsSessionProvider::new(driver, descriptor))
            }
        };
        Self::new(provider, config.shape)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn variant(&self) -> BackendVariant {
        self.provider.variant()
    }

    pub const fn shape(&self) -> RowShape {
        self.shape
    }

    /// Most recent record for `symbol`.
    pub async fn get_latest(&self, symbol: &str) -> Result<PriceRecord, GatewayError> {
        let symbol = Symbol::parse(symbol)?;
        self.latest(&symbol)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("No data found for symbol {symbol}")))
    }

    /// Latest record per symbol, one query each, in symbol order. Absent symbols map to `None`.
    pub async fn get_multiple<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<BTreeMap<String, Option<PriceRecord>>, GatewayError> {
        if symbols.is_empty() {
            return Err(ValidationError::EmptySymbolList.into());
        }
        let symbols = symbols
            .iter()
            .map(|symbol| Symbol::parse(symbol.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results: BTreeMap<String, Option<PriceRecord>> = BTreeMap::new();
        for symbol in symbols {
            if results.contains_key(symbol.as_str()) {
                continue;
            }
            let record = self.latest(&symbol).await?;
            results.insert(symbol.as_str().to_owned(), record);
        }

        let found = results.values().filter(|record| record.is_some()).count();
        info!(requested = results.len(), found, "batch lookup finished");
        Ok(results)
    }

    /// Records inside `window`, ascending by trade date; empty when nothing matches.
    pub async fn get_history(
        &self,
        symbol: &str,
        window: HistoryWindow,
    ) -> Result<Vec<PriceRecord>, GatewayError> {
        let query = HistoryQuery::new(Symbol::parse(symbol)?, window);
        let (start, end) = query.window.bounds(self.clock.now().date());
        self.run(self.shape.history_query(&query.symbol, start, end))
            .await
    }

    /// Trailing `days` window ending today; `days` must lie in `[1, 365]`.
    pub async fn get_history_days(
        &self,
        symbol: &str,
        days: i64,
    ) -> Result<Vec<PriceRecord>, GatewayError> {
        let window = HistoryWindow::days(days)?;
        self.get_history(symbol, window).await
    }

    /// Latest record per ticker in `market`, ordered by ticker.
    pub async fn get_market_snapshot(&self, market: &str) -> Result<Vec<PriceRecord>, GatewayError> {
        let market: Market = market.parse()?;
        let query = self
            .shape
            .snapshot_query(market)
            .ok_or(GatewayError::Unsupported {
                operation: "market snapshot",
                variant: self.variant().as_str(),
            })?;
        self.run(query).await
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            backend: self.variant().as_str(),
            shape: self.shape.as_str(),
            session_open: self.session.lock().await.is_some(),
        }
    }

    async fn latest(&self, symbol: &Symbol) -> Result<Option<PriceRecord>, GatewayError> {
        let mut records = self.run(self.shape.latest_query(symbol)).await?;
        Ok(if records.is_empty() {
            debug!(%symbol, "no rows for symbol");
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    async fn run(&self, query: StoreQuery) -> Result<Vec<PriceRecord>, GatewayError> {
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            *slot = Some(self.provider.open().await?);
        }
        let Some(session) = slot.as_mut() else {
            return Err(GatewayError::upstream(
                "database connection failed",
                "session unavailable",
            ));
        };

        match session.query(&query) {
            Ok(rows) => {
                debug!(rows = rows.len(), "query returned");
                Ok(rows.iter().map(|row| schema::map(row, self.shape)).collect())
            }
            Err(error) => {
                // dropped; the next call reopens
                warn!(%error, "query failed; discarding session");
                *slot = None;
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{RawRow, SqlValue};
    use crate::StoreError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Script {
        opens: AtomicUsize,
        queries: StdMutex<Vec<StoreQuery>>,
        rows: StdMutex<Vec<Result<Vec<RawRow>, StoreError>>>,
    }

    struct ScriptedSession(Arc<Script>);

    impl Session for ScriptedSession {
        fn query(&mut self, query: &StoreQuery) -> Result<Vec<RawRow>, StoreError> {
            self.0.queries.lock().expect("lock").push(query.clone());
            let mut rows = self.0.rows.lock().expect("lock");
            if rows.is_empty() {
                Ok(Vec::new())
            } else {
                rows.remove(0)
            }
        }
    }

    struct ScriptedProvider(Arc<Script>, BackendVariant);

    impl SessionProvider for ScriptedProvider {
        fn variant(&self) -> BackendVariant {
            self.1
        }

        fn open<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Session>, GatewayError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.0.opens.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedSession(Arc::clone(&self.0))) as Box<dyn Session>)
            })
        }
    }

    fn facade(script: &Arc<Script>, shape: RowShape) -> FetchFacade {
        let variant = match shape {
            RowShape::PrecomputedChange => BackendVariant::TokenAuthenticated,
            RowShape::Ohlcv => BackendVariant::DirectConnectionString,
        };
        FetchFacade::new(Arc::new(ScriptedProvider(Arc::clone(script), variant)), shape)
    }

    fn row(ticker: &str, close: f64) -> RawRow {
        RawRow::new()
            .with("ticker", SqlValue::from(ticker))
            .with("open", SqlValue::Float(100.0))
            .with("close", SqlValue::Float(close))
    }

    #[tokio::test]
    async fn session_is_opened_once_and_reused() {
        let script = Arc::new(Script::default());
        let facade = facade(&script, RowShape::Ohlcv);

        assert!(!facade.health().await.session_open);
        let _ = facade.get_multiple(&["VNM", "FPT", "HPG"]).await.expect("batch");

        assert_eq!(script.opens.load(Ordering::SeqCst), 1);
        assert_eq!(script.queries.lock().expect("lock").len(), 3);
        assert!(facade.health().await.session_open);
    }

    #[tokio::test]
    async fn batch_keeps_missing_symbols_and_collapses_duplicates() {
        let script = Arc::new(Script::default());
        script
            .rows
            .lock()
            .expect("lock")
            .extend([Ok(vec![row("VNM", 101.0)]), Ok(Vec::new())]);
        let facade = facade(&script, RowShape::Ohlcv);

        let results = facade
            .get_multiple(&["vnm", "ZZZZ", "VNM"])
            .await
            .expect("batch");

        assert_eq!(results.len(), 2);
        assert_eq!(results["VNM"].as_ref().map(|r| r.close), Some(101.0));
        assert_eq!(results["ZZZZ"], None);
        assert_eq!(script.queries.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let script = Arc::new(Script::default());
        let facade = facade(&script, RowShape::PrecomputedChange);

        let empty: [&str; 0] = [];
        assert_eq!(facade.get_multiple(&empty).await.expect_err("empty").status_code(), 400);
        assert_eq!(facade.get_history_days("VNM", 0).await.expect_err("days").status_code(), 400);
        assert_eq!(facade.get_history_days("VNM", 366).await.expect_err("days").status_code(), 400);
        assert_eq!(facade.get_market_snapshot("NASDAQ").await.expect_err("market").status_code(), 400);
        assert_eq!(facade.get_latest("1ABC").await.expect_err("symbol").status_code(), 400);

        assert_eq!(script.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn latest_reports_not_found() {
        let script = Arc::new(Script::default());
        let err = facade(&script, RowShape::Ohlcv)
            .get_latest("ZZZZ")
            .await
            .expect_err("absent");

        assert_eq!(err, GatewayError::not_found("No data found for symbol ZZZZ"));
    }

    #[tokio::test]
    async fn snapshot_is_unsupported_for_ohlcv_tables() {
        let script = Arc::new(Script::default());
        let err = facade(&script, RowShape::Ohlcv)
            .get_market_snapshot("HOSE")
            .await
            .expect_err("unsupported");

        assert_eq!(err.status_code(), 501);
        assert_eq!(script.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_and_next_call_reopens() {
        let script = Arc::new(Script::default());
        script
            .rows
            .lock()
            .expect("lock")
            .push(Err(StoreError::Query(String::from("Invalid object name 'Market_Data'"))));
        let facade = facade(&script, RowShape::Ohlcv);

        let err = facade.get_latest("VNM").await.expect_err("upstream");
        assert_eq!(err.status_code(), 500);
        assert!(err.detail().is_some_and(|detail| detail.contains("Invalid object name")));
        assert!(!facade.health().await.session_open);

        let _ = facade.get_latest("VNM").await;
        assert_eq!(script.opens.load(Ordering::SeqCst), 2);
    }
}
