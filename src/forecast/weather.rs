use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Result, VisibilityError};
use crate::geo::Coordinate;
use crate::scoring::WeatherSeries;

/// Hourly forecast source (a weather API client, a fixture, ...).
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn hourly(
        &self,
        coordinate: Coordinate,
        elevation_m: Option<f64>,
    ) -> anyhow::Result<WeatherSeries>;
}

/// A spot to fetch a forecast for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherQuery {
    pub coordinate: Coordinate,
    pub elevation_m: Option<f64>,
}

/// Fetch one forecast per query, at most `limit` requests in flight.
///
/// A failed spot yields its own `Err` and never cancels the others. Results
/// come back in query order.
pub async fn fetch_forecasts(
    provider: Arc<dyn WeatherProvider>,
    queries: &[WeatherQuery],
    limit: usize,
) -> Result<Vec<anyhow::Result<WeatherSeries>>> {
    if limit == 0 {
        return Err(VisibilityError::invalid("weather concurrency limit must be > 0"));
    }

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut fetches = JoinSet::new();

    for (index, query) in queries.iter().copied().enumerate() {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        fetches.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => provider.hourly(query.coordinate, query.elevation_m).await,
                Err(e) => Err(anyhow::Error::new(e)),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<anyhow::Result<WeatherSeries>>> =
        (0..queries.len()).map(|_| None).collect();
    while let Some(joined) = fetches.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(e) = &result {
                    let c = queries[index].coordinate;
                    let (lat, lon) = (c.latitude(), c.longitude());
                    warn!(lat, lon, error = %e, "weather fetch failed");
                }
                slots[index] = Some(result);
            }
            Err(join_err) => {
                warn!(error = %join_err, "weather task aborted");
            }
        }
    }

    let ok = slots.iter().filter(|s| matches!(s, Some(Ok(_)))).count();
    debug!(spots = queries.len(), ok, limit, "weather fan-out complete");

    Ok(slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(anyhow::anyhow!("weather task did not complete"))))
        .collect())
}
