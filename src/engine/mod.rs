//! Audio engine
//!
//! Buffers, file I/O and everything on the playback side: the session shared
//! by both sources, the realtime engine, seeking, the position readout and
//! transport control.

pub mod buffer;
pub mod io;
pub mod monitor;
#[cfg(feature = "device")]
pub mod output;
pub mod playback;
pub mod seek;
pub mod session;
pub mod transcode;
pub mod transport;

pub use buffer::{calculate_peak, calculate_rms, db_to_linear, linear_to_db, AudioBuffer};
pub use io::{export_audio, import_audio, ExportEncoding};
pub use monitor::{format_clock, PositionMonitor, PositionUpdate};
#[cfg(feature = "device")]
pub use output::CpalOutput;
pub use playback::{CallbackFlow, PlaybackEngine};
pub use seek::SeekController;
pub use session::{PlaybackSession, Source};
pub use transcode::{enhanced_output_path, load_recording, Transcoder};
pub use transport::{OutputDevice, Transport, TransportState};
