pub mod connectivity;
pub mod device;
pub mod eras_llm;
pub mod identity;
pub mod llm;
pub mod mood_llm;
pub mod report_llm;
pub mod sst;

pub use connectivity::ConnectivityProbe;
pub use device::FileDeviceStore;
pub use eras_llm::OpenAiErasAdapter;
pub use identity::FirebaseIdentityAdapter;
pub use llm::ChatModel;
pub use mood_llm::OpenAiMoodAdapter;
pub use report_llm::OpenAiReportAdapter;
pub use sst::OpenAiSstAdapter;
