use async_trait::async_trait;
use auditor_application::ports::{AuditPair, CatalogError, PairCatalog};
use shaku::Component;
use tracing::debug;

/// Pair catalog fixed at construction: every configured symbol crossed with
/// every configured timeframe.
#[derive(Component)]
#[shaku(interface = PairCatalog)]
pub struct StaticPairCatalog {
    #[shaku(default)]
    symbols: Vec<String>,
    #[shaku(default)]
    timeframes: Vec<String>,
}

impl StaticPairCatalog {
    pub fn new(symbols: Vec<String>, timeframes: Vec<String>) -> Self {
        Self {
            symbols,
            timeframes,
        }
    }
}

#[async_trait]
impl PairCatalog for StaticPairCatalog {
    async fn pairs(&self) -> Result<Vec<AuditPair>, CatalogError> {
        let pairs: Vec<AuditPair> = self
            .symbols
            .iter()
            .flat_map(|symbol| {
                self.timeframes
                    .iter()
                    .map(move |timeframe| AuditPair::new(symbol, timeframe))
            })
            .collect();

        debug!("Pair catalog resolved {} pairs", pairs.len());
        Ok(pairs)
    }
}
