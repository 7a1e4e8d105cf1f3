mod series_point;
mod joined_record;
pub mod artifact;

pub use series_point::{SeriesKey, SeriesPoint, SourceKind};
pub use joined_record::{
    days_since_epoch, JoinedRecord, DAYS_SINCE_EPOCH, FEATURE_DIM, FEATURE_NAMES, PRICE_FIELD,
    PRICE_UNIT,
    WEATHER_FIELDS,
};
pub use artifact::{ModelArtifact, TrainingMode};
