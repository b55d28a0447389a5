pub mod comparator;
pub mod engine;
pub mod enrichment;
pub mod record;
pub mod request;
pub mod retry;
pub mod tally;

pub use comparator::{JobKind, JobPlan, KeyNormalizer, PlanContext, PlanSummary, PlannedAction, RecordComparator};
pub use engine::{SyncEngine, SyncReport};
pub use enrichment::EnrichmentTables;
pub use record::{FieldValue, LocalRecord, RecordStatus, RemoteRecord};
pub use request::{RemoteMutationRequest, RequestOptions};
pub use retry::{AttemptOutcome, AttemptState, Decision, RetryPolicy, Sleeper, TokioSleeper};
pub use tally::{OutcomeTally, RecordOutcome};
