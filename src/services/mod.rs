pub mod artifact_store;
pub mod batch_reader;
pub mod cancel;
pub mod evaluation_service;
pub mod extraction_service;
pub mod job_lock;
pub mod job_scheduler_service;
pub mod retry;
pub mod series_writer;
pub mod stats_service;
pub mod training_service;
pub mod watermark_service;
