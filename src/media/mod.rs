//! Decoded frame handoff and presentation
//!
//! # Architecture
//!
//! ```text
//!    decode thread                         render tick
//!   ┌──────────────┐   borrow   ┌──────────────┐
//!   │   Producer   │◄───────────│  BufferPool  │◄──────────┐
//!   │              │            └──────────────┘  give back│
//!   │  convert +   │   push     ┌──────────────┐   pop   ┌──┴───────────┐
//!   │  timestamp   │───────────►│  FrameQueue  │────────►│ RenderPacer  │──► Surface
//!   └──────┬───────┘            └──────────────┘         └──────────────┘
//!          │ init / stop / duration (ScreenSink atomics)        ▲
//!          └────────────────────────────────────────────────────┘
//! ```

pub mod frame;
pub mod pacer;
pub mod pixel;
pub mod pool;
pub mod queue;
pub mod sink;
pub mod sizing;

pub use frame::{Frame, PixelBuffer, VideoInit};
pub use pacer::{MemorySurface, RenderPacer, Surface, TickOutcome};
pub use pool::BufferPool;
pub use queue::FrameQueue;
pub use sink::{FrameSink, ScreenSink};
pub use sizing::{fit_target, SizeLimits};
