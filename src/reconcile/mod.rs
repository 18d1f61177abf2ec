mod reconciler;
mod work_queue;

pub use reconciler::{load_processed, reconcile, ProcessedSet, ReconcileReport};
pub use work_queue::{read_work_queue, write_work_queue, WorkItem};
