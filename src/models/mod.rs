pub mod event;
pub mod hitl;

pub use event::{HitlDescriptor, HookEvent};
pub use hitl::{normalize_type, HitlKind, HitlRequest, HitlResponse, HitlStatus};
