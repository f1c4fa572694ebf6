//! Shared data types - rows, request bodies and response envelopes

pub mod account;
pub mod chat;
pub mod evaluation;
pub mod location;
pub mod relay;
pub mod response;
pub mod session;
pub mod sos;
pub mod task;

pub use account::{Account, AccountProfile, AccountRole, AccountUpdate, NewAccount, Sex};
pub use chat::{ChatMessage, ContactEntry, ContactSummary, MessageKind, PersistOutcome};
pub use evaluation::AccountEvaluation;
pub use location::{LocationUpdate, UserLocation};
pub use relay::{RelayEntry, RelayStatus};
pub use response::ApiResponse;
pub use session::Session;
pub use sos::{NewSos, SosError, SosRecord, SosStatus};
pub use task::{NearbyTask, NewTask, Task, TaskError, TaskStatus, VolunteerMatch, EMERGENCY_CATEGORY};
