pub mod energy_charts;
pub mod open_meteo;
pub mod payload;
pub mod series_fetcher;

pub use energy_charts::EnergyChartsClient;
pub use open_meteo::OpenMeteoClient;
pub use series_fetcher::{FetchError, RawPayload, SeriesFetcher};
