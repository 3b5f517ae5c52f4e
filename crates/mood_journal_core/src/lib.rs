pub mod domain;
pub mod journal;
pub mod ports;
pub mod selectors;
pub mod session;
pub mod state;
pub mod store;

pub use domain::{
    AudioClip, AuthSnapshot, DomainError, Emotion, Entry, EntryDraft, EntryId, EntryKind, Era,
    EraSample, EraSpan, MonthKey, MonthlyReport, MoodSample, MoodScore, ReminderTime, Settings,
    SettingsPatch, Tags, Theme, Trigger, TriggerEmotion, UserSession,
};
pub use journal::{ClassificationServices, InsightConfig, InsightError, Journal};
pub use ports::{
    DeviceStore, EraSegmentationService, IdentityError, IdentityErrorClass, IdentityResult,
    IdentityService, InMemoryDeviceStore, MoodClassificationService, PortError, PortResult,
    ReportGenerationService, SpeechToTextService,
};
pub use selectors::{MoodStats, TrailingWindow};
pub use session::{AuthSessionMonitor, AuthState, MonitorConfig, RefreshOutcome};
pub use state::{JournalState, SnapshotError};
pub use store::{JournalStore, Notice};
