//! Repository traits for metadata operations.

pub mod announcements;
pub mod bootstrap;
pub mod certificates;
pub mod content;
pub mod duty;
pub mod jobs;
pub mod notifications;
pub mod sessions;

pub use announcements::AnnouncementRepo;
pub use bootstrap::BootstrapRepo;
pub use certificates::CertificateRepo;
pub use content::ContentRepo;
pub use duty::DutyRepo;
pub use jobs::{JobRepo, JobState, JobTrigger, JobType};
pub use notifications::{NotificationRepo, NotificationState};
pub use sessions::SessionRepo;
