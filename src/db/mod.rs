pub mod series_queries;
