//! Study Buddy engine: backend transport, task polling and chat stream decoding.
mod decode;
mod engine;
mod poller;
mod transport;
mod types;

pub use decode::{ChatStream, RecordDecoder, MAX_RECORD_LEN, RECORD_PREFIX};
pub use engine::{EngineConfig, EngineHandle};
pub use poller::{ChannelEventSink, EventSink, PollOutcome, PollSettings, PollTerminal, TaskPoller};
pub use transport::{ByteStream, ClientSettings, ReqwestTransport, Transport};
pub use types::{
    ClientError, DocumentEntry, DocumentListing, EngineEvent, EngineStopped, ErrorClass, FailureKind,
    HealthStatus, UploadReceipt,
};
