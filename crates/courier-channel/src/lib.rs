//! Transport-side half of the relay: the outbound trait seam, the pacing
//! dispatcher, the per-correspondent batch coalescer, and the flush
//! pipeline that ties both halves together.

pub mod coalesce;
pub mod dispatch;
pub mod error;
pub mod flush;
pub mod transport;

pub use coalesce::{BatchCoalescer, FlushHandler};
pub use dispatch::Dispatcher;
pub use error::ChannelError;
pub use flush::{FlushPipeline, PipelineConfig};
pub use transport::{Outbound, SpeechSynthesizer, TransportError};
