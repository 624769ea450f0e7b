// Durable stores: job table and upload queue file

pub mod job;
pub mod queue;

pub use job::JobStore;
pub use queue::UploadQueueStore;
